use core::fmt;

use serde::{Deserialize, Serialize};

use crate::linalg::{Matrix, MatrixError, Quaternion};

use super::sensors::SensorArray;

/// Tuning and physical parameters of the estimator.
///
/// Missing fields take their [`Default`] value when deserializing.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttitudeConfig {
    /// Gyro noise, rad/s.
    pub sigma_gyro: f32,
    /// Magnetometer direction noise.
    pub sigma_magnetometer: f32,
    /// Sun sensor direction noise.
    pub sigma_sun: f32,
    /// Noise of the scalar part of the QUEST quaternion.
    pub sigma_quaternion_scalar: f32,
    /// Noise of the vector part of the QUEST quaternion.
    pub sigma_quaternion_vector: f32,
    /// Variance of unmodelled disturbance torques, N²·m².
    pub disturbance_torque_variance: f32,
    pub quest_tolerance: f32,
    pub quest_max_iterations: usize,
    /// Order of the series inverse in the Kalman gain.
    pub inverse_order: usize,
    /// kg·m², row major.
    pub satellite_inertia: [[f32; 3]; 3],
    /// kg·m², row major.
    pub wheel_inertia: [[f32; 3]; 3],
    /// `[w, x, y, z]`
    pub initial_quaternion: [f32; 4],
    /// rad/s
    pub initial_rate: [f32; 3],
    /// Diagonal of the initial error covariance. Derived from the sigmas
    /// when absent.
    pub initial_covariance: Option<[f32; 7]>,
    /// Expected cycle period, s.
    pub nominal_dt: f32,
}

impl Default for AttitudeConfig {
    fn default() -> Self {
        Self {
            sigma_gyro: 0.5 * core::f32::consts::PI / 180.0,
            sigma_magnetometer: 0.1,
            sigma_sun: 0.5,
            sigma_quaternion_scalar: 0.1,
            sigma_quaternion_vector: 0.1,
            disturbance_torque_variance: 1e-4,
            quest_tolerance: 1e-5,
            quest_max_iterations: 50,
            inverse_order: 3,
            satellite_inertia: [[27.0, 0.0, 0.0], [0.0, 17.0, 0.0], [0.0, 0.0, 25.0]],
            wheel_inertia: [[0.0; 3]; 3],
            initial_quaternion: [1.0, 0.0, 0.0, 0.0],
            initial_rate: [0.0; 3],
            initial_covariance: None,
            nominal_dt: 0.01,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// A standard deviation or variance is not finite and positive.
    InvalidNoise(&'static str),
    InvalidTolerance,
    ZeroIterations,
    InvalidTimestep,
    /// Principal moments must be positive and the tensor invertible.
    InvalidInertia,
    InvalidInitialState,
    /// The filter rejected the matrices built from the configuration.
    Filter(MatrixError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNoise(name) => write!(f, "{name} must be finite and positive"),
            Self::InvalidTolerance => write!(f, "QUEST tolerance must be finite and positive"),
            Self::ZeroIterations => write!(f, "QUEST needs at least one iteration"),
            Self::InvalidTimestep => write!(f, "nominal timestep must be finite and positive"),
            Self::InvalidInertia => write!(f, "inertia tensor is not physical"),
            Self::InvalidInitialState => write!(f, "initial state is not finite or quaternion is zero"),
            Self::Filter(e) => write!(f, "cannot build filter: {e}"),
        }
    }
}

impl core::error::Error for ConfigError {}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl AttitudeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, sigma) in [
            ("sigma_gyro", self.sigma_gyro),
            ("sigma_magnetometer", self.sigma_magnetometer),
            ("sigma_sun", self.sigma_sun),
            ("sigma_quaternion_scalar", self.sigma_quaternion_scalar),
            ("sigma_quaternion_vector", self.sigma_quaternion_vector),
        ] {
            if !positive(sigma) {
                return Err(ConfigError::InvalidNoise(name));
            }
        }
        if !self.disturbance_torque_variance.is_finite() || self.disturbance_torque_variance < 0.0 {
            return Err(ConfigError::InvalidNoise("disturbance_torque_variance"));
        }
        if let Some(diagonal) = self.initial_covariance {
            if diagonal.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(ConfigError::InvalidNoise("initial_covariance"));
            }
        }

        if !positive(self.quest_tolerance) {
            return Err(ConfigError::InvalidTolerance);
        }
        if self.quest_max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !positive(self.nominal_dt) {
            return Err(ConfigError::InvalidTimestep);
        }

        let principal = (0..3).all(|i| positive(self.satellite_inertia[i][i]));
        let invertible = self
            .satellite_matrix()
            .and_then(|m| m.inverse())
            .is_ok_and(|inv| inv.is_finite());
        let wheel_finite = self.wheel_inertia.iter().flatten().all(|v| v.is_finite());
        if !principal || !invertible || !wheel_finite {
            return Err(ConfigError::InvalidInertia);
        }

        let q = Quaternion(self.initial_quaternion);
        if q.normalize().is_err() || self.initial_rate.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidInitialState);
        }
        Ok(())
    }

    /// QUEST weights, the inverse variance of each vector sensor.
    pub fn weights(&self) -> SensorArray<f32> {
        SensorArray::new(
            1.0 / (self.sigma_magnetometer * self.sigma_magnetometer),
            1.0 / (self.sigma_sun * self.sigma_sun),
        )
    }

    pub fn satellite_matrix(&self) -> Result<Matrix, MatrixError> {
        Matrix::from_rows(&self.satellite_inertia)
    }

    pub fn wheel_matrix(&self) -> Result<Matrix, MatrixError> {
        Matrix::from_rows(&self.wheel_inertia)
    }
}
