//! Filter tuning after Hale, Vergez, Meerman and Hashida, "Kalman Filtering
//! and the Attitude Determination and Control Task".

use crate::attitude::AttitudeConfig;
use crate::linalg::{Matrix, MatrixError};

use super::STATE_SIZE;

/// Covariances handed to [`super::KalmanFilter::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNoise {
    /// Process noise `Q`, 7x7.
    pub process: Matrix,
    /// Measurement noise `R`, 7x7.
    pub measurement: Matrix,
    /// Initial error covariance `P₀`, 7x7.
    pub initial_covariance: Matrix,
}

impl FilterNoise {
    /// Derives `Q` from the disturbance torque variance acting over one
    /// nominal step, and `R`/`P₀` from the expected QUEST and gyro noise.
    pub fn from_config(config: &AttitudeConfig) -> Result<Self, MatrixError> {
        let variance_qs = config.sigma_quaternion_scalar * config.sigma_quaternion_scalar;
        let variance_qv = config.sigma_quaternion_vector * config.sigma_quaternion_vector;
        let variance_gyro = config.sigma_gyro * config.sigma_gyro;

        let measurement = Matrix::diagonal(&[
            variance_qs,
            variance_qv,
            variance_qv,
            variance_qv,
            variance_gyro,
            variance_gyro,
            variance_gyro,
        ])?;

        let dt = config.nominal_dt;
        let torque = config.disturbance_torque_variance * dt * dt * dt;
        let inertia = [
            config.satellite_inertia[0][0],
            config.satellite_inertia[1][1],
            config.satellite_inertia[2][2],
        ];
        let epsilon = [
            config.initial_quaternion[1],
            config.initial_quaternion[2],
            config.initial_quaternion[3],
        ];

        let mut process = Matrix::zeros(STATE_SIZE, STATE_SIZE)?;
        let mut scalar = 0.0;
        for i in 0..3 {
            let i_squared = inertia[i] * inertia[i];
            process.set(1 + i, 1 + i, torque / (12.0 * i_squared))?;
            process.set(4 + i, 4 + i, torque / i_squared)?;
            scalar += (epsilon[i] / inertia[i]) * (epsilon[i] / inertia[i]);
        }
        process.set(0, 0, torque / 12.0 * scalar)?;

        let initial_covariance = match config.initial_covariance {
            Some(diagonal) => Matrix::diagonal(&diagonal)?,
            None => measurement.clone(),
        };

        Ok(Self {
            process,
            measurement,
            initial_covariance,
        })
    }
}
