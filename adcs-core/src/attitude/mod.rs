//! One estimation cycle: read the sensors and the reference model, solve
//! for the attitude with QUEST, and fuse it with the gyro in the Kalman
//! filter.

use crate::filter::{Actuation, FilterNoise, KalmanFilter};
use crate::linalg::{Matrix, MatrixError, Quaternion};
use crate::quest::{QuestError, quest};

mod config;
mod reference;
mod sensors;

pub use config::{AttitudeConfig, ConfigError};
pub use reference::{GroundModel, ReferenceModel, ReferenceSource, az_el_to_ned};
pub use sensors::{AttitudeSensors, SensorArray, SensorId, SensorUnavailable};

/// Outcome of the last cycle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleStatus {
    /// QUEST succeeded and the filter was corrected.
    Corrected,
    /// QUEST failed, the filter only propagated its state.
    PropagatedOnly(QuestError),
    /// The filter step failed, the previous estimate is kept.
    Retained(MatrixError),
}

pub struct AttitudeCore<S, M> {
    config: AttitudeConfig,
    sensors: S,
    reference: M,
    filter: KalmanFilter,

    weights: SensorArray<f32>,
    body_vectors: SensorArray<[f32; 3]>,
    reference_vectors: SensorArray<[f32; 3]>,
    gyro: [f32; 3],

    last_update_us: Option<u64>,
    last_status: Option<CycleStatus>,
}

impl<S: AttitudeSensors, M: ReferenceModel> AttitudeCore<S, M> {
    pub fn new(config: AttitudeConfig, sensors: S, reference: M) -> Result<Self, ConfigError> {
        config.validate()?;

        let noise = FilterNoise::from_config(&config).map_err(ConfigError::Filter)?;
        let filter = KalmanFilter::new(
            config.satellite_matrix().map_err(ConfigError::Filter)?,
            config.wheel_matrix().map_err(ConfigError::Filter)?,
            Quaternion(config.initial_quaternion),
            config.initial_rate,
            noise,
            config.inverse_order,
        )
        .map_err(ConfigError::Filter)?;

        log_info!(
            "attitude: filter ready, dt {} s, series order {}",
            config.nominal_dt,
            config.inverse_order
        );

        Ok(Self {
            weights: config.weights(),
            config,
            sensors,
            reference,
            filter,
            body_vectors: SensorArray::default(),
            reference_vectors: SensorArray::default(),
            gyro: [0.0; 3],
            last_update_us: None,
            last_status: None,
        })
    }

    /// Runs a cycle at monotonic time `now_us`. The step is the time since
    /// the previous call, or the nominal step on the first call and when
    /// the clock did not advance.
    pub fn update(&mut self, now_us: u64, actuation: &Actuation) -> CycleStatus {
        let dt = match self.last_update_us {
            Some(last) if now_us > last => (now_us - last) as f32 * 1e-6,
            Some(last) => {
                log_warn!("attitude: timestamp {} us not after {} us", now_us, last);
                self.config.nominal_dt
            }
            None => self.config.nominal_dt,
        };
        self.last_update_us = Some(now_us);
        self.step(dt, actuation)
    }

    /// Runs a cycle of `dt` seconds.
    pub fn step(&mut self, dt: f32, actuation: &Actuation) -> CycleStatus {
        let dt = if dt.is_finite() && dt > 0.0 {
            dt
        } else {
            log_warn!("attitude: invalid step {} s, using nominal", dt);
            self.config.nominal_dt
        };
        log_debug!("attitude: dt {} s", dt);

        self.reference.update(dt);
        self.fetch_sensors();

        let status = match self.estimate() {
            Ok(q_measured) => match self.filter.filter(&q_measured, self.gyro, dt, actuation) {
                Ok(_) => CycleStatus::Corrected,
                Err(e) => {
                    log_warn!("attitude: filter step failed: {}", e);
                    CycleStatus::Retained(e)
                }
            },
            Err(quest_error) => {
                log_warn!("attitude: no attitude measurement: {}", quest_error);
                match self.filter.propagate(dt, actuation) {
                    Ok(_) => CycleStatus::PropagatedOnly(quest_error),
                    Err(e) => {
                        log_warn!("attitude: propagation failed: {}", e);
                        CycleStatus::Retained(e)
                    }
                }
            }
        };

        let q = self.filter.quaternion();
        log_trace!(
            "attitude: q [{} {} {} {}]",
            q.0[0],
            q.0[1],
            q.0[2],
            q.0[3]
        );
        self.last_status = Some(status);
        status
    }

    /// Stale sensors keep the vector of the previous cycle.
    fn fetch_sensors(&mut self) {
        for id in SensorId::ALL {
            self.reference_vectors[id] = self.reference.reference_vector(id);
            match self.sensors.read_vector(id) {
                Ok(v) => self.body_vectors[id] = v,
                Err(SensorUnavailable) => log_warn!("attitude: {} reading is stale", id),
            }
        }
        match self.sensors.read_gyro() {
            Ok(w) => self.gyro = w,
            Err(SensorUnavailable) => log_warn!("attitude: gyro reading is stale"),
        }
    }

    fn estimate(&self) -> Result<Quaternion, QuestError> {
        let references = self.reference_vectors.0.map(Matrix::from);
        let bodies = self.body_vectors.0.map(Matrix::from);
        quest(
            &references,
            &bodies,
            self.weights.as_array(),
            self.config.quest_tolerance,
            self.config.quest_max_iterations,
        )
    }

    /// Filtered attitude, `[w, x, y, z]`.
    pub fn quaternion(&self) -> [f32; 4] {
        self.filter.quaternion().0
    }

    /// Filtered body rate, rad/s.
    pub fn angular_rate(&self) -> [f32; 3] {
        self.filter.angular_rate()
    }

    /// Last gyro reading, rad/s.
    pub fn gyro(&self) -> [f32; 3] {
        self.gyro
    }

    /// Last body-frame reading of a vector sensor.
    pub fn body_vector(&self, id: SensorId) -> [f32; 3] {
        self.body_vectors[id]
    }

    /// Reference-frame vector the sensor was matched against.
    pub fn reference_vector(&self, id: SensorId) -> [f32; 3] {
        self.reference_vectors[id]
    }

    pub fn weights(&self) -> &SensorArray<f32> {
        &self.weights
    }

    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }

    pub fn reference_model(&self) -> &M {
        &self.reference
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn config(&self) -> &AttitudeConfig {
        &self.config
    }

    /// `None` until the first cycle has run.
    pub fn last_status(&self) -> Option<CycleStatus> {
        self.last_status
    }
}
