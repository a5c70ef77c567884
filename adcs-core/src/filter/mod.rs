//! 7-state extended Kalman filter over `[q; ω]`.
//!
//! The measurement is the full state (a QUEST quaternion and a gyro rate),
//! so the observation matrix is the identity and the gain reduces to
//! `K = P'·(P' + R)⁻¹`. The inverse is the bounded-order series of
//! [`Matrix::approximate_inverse`], which is always defined.

use serde::{Deserialize, Serialize};

use crate::linalg::{Matrix, MatrixError, Quaternion};

pub mod dynamics;
pub mod noise;

use dynamics::{RigidBody, propagate_quaternion};
pub use noise::FilterNoise;

pub const STATE_SIZE: usize = 7;

/// Wheel and torque inputs for one step, all in the body frame.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Actuation {
    /// Reaction wheel rates, rad/s.
    pub wheel_rate: [f32; 3],
    /// Disturbance and magnetorquer torque, N·m.
    pub external_torque: [f32; 3],
    /// Torque applied to the wheels by their motors, N·m.
    pub wheel_torque: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    body: RigidBody,

    q_predict: Quaternion,
    w_predict: [f32; 3],

    /// error covariance P
    p_predict: Matrix,

    /// process noise Q
    q: Matrix,

    /// measurement noise R
    r: Matrix,

    inverse_order: usize,
}

impl KalmanFilter {
    pub fn new(
        satellite_inertia: Matrix,
        wheel_inertia: Matrix,
        initial_quaternion: Quaternion,
        initial_rate: [f32; 3],
        noise: FilterNoise,
        inverse_order: usize,
    ) -> Result<Self, MatrixError> {
        let body = RigidBody::new(satellite_inertia, wheel_inertia)?;
        noise.initial_covariance.require_shape(STATE_SIZE, STATE_SIZE)?;
        noise.process.require_shape(STATE_SIZE, STATE_SIZE)?;
        noise.measurement.require_shape(STATE_SIZE, STATE_SIZE)?;

        Ok(Self {
            body,
            q_predict: initial_quaternion.normalize()?,
            w_predict: initial_rate,
            p_predict: noise.initial_covariance,
            q: noise.process,
            r: noise.measurement,
            inverse_order,
        })
    }

    /// Runs one predict/update cycle against a measured quaternion and rate
    /// and returns the corrected quaternion.
    ///
    /// On error the filter state is left as it was.
    pub fn filter(
        &mut self,
        q_measured: &Quaternion,
        w_measured: [f32; 3],
        dt: f32,
        actuation: &Actuation,
    ) -> Result<Quaternion, MatrixError> {
        // Predict
        let (q_prop, w_prop, p_prop) = self.predict(dt, actuation)?;

        // Update
        let innovation_covariance = p_prop.try_add(&self.r)?;
        let gain = p_prop.try_mul(&innovation_covariance.approximate_inverse(self.inverse_order)?)?;

        // q and -q are the same attitude, measure against the hemisphere of
        // the prediction
        let q_measured = if q_measured.dot(&q_prop) < 0.0 {
            Quaternion(q_measured.0.map(|v| -v))
        } else {
            *q_measured
        };

        let predicted = state_vector(&q_prop, w_prop)?;
        let innovation = state_vector(&q_measured, w_measured)?.try_sub(&predicted)?;
        let corrected = predicted.try_add(&gain.try_mul(&innovation)?)?;

        let q_new = Quaternion::try_from(&corrected.block(0, 0, 4, 1)?)?.normalize()?;
        let mut w_new = [0.0; 3];
        for (i, w) in w_new.iter_mut().enumerate() {
            let corrected = corrected.at(4 + i, 0);
            *w = if corrected.is_finite() { corrected } else { w_prop[i] };
        }

        let p_new = Matrix::identity(STATE_SIZE)?
            .try_sub(&gain)?
            .try_mul(&p_prop)?
            .symmetrize()?;

        self.q_predict = q_new;
        self.w_predict = w_new;
        self.p_predict = p_new;
        log_trace!(
            "filter: q [{} {} {} {}]",
            q_new.0[0],
            q_new.0[1],
            q_new.0[2],
            q_new.0[3]
        );
        Ok(q_new)
    }

    /// Prediction without a measurement, for cycles where no attitude
    /// measurement is available. The covariance grows by `Q`.
    pub fn propagate(&mut self, dt: f32, actuation: &Actuation) -> Result<Quaternion, MatrixError> {
        let (q_prop, w_prop, p_prop) = self.predict(dt, actuation)?;
        self.q_predict = q_prop;
        self.w_predict = w_prop;
        self.p_predict = p_prop;
        Ok(q_prop)
    }

    /// Propagated quaternion and rate after `dt`, without touching the
    /// filter.
    pub fn predict_state(&self, dt: f32, actuation: &Actuation) -> Result<(Quaternion, [f32; 3]), MatrixError> {
        let q = propagate_quaternion(&self.q_predict, self.w_predict, dt)?;
        let w_dot = self.body.angular_acceleration(
            self.w_predict,
            actuation.wheel_rate,
            actuation.external_torque,
            actuation.wheel_torque,
        )?;
        let w = Matrix::from(self.w_predict).try_add(&w_dot.scale(dt))?;
        Ok((q, (&w).try_into()?))
    }

    fn predict(&self, dt: f32, actuation: &Actuation) -> Result<(Quaternion, [f32; 3], Matrix), MatrixError> {
        // linearized about the previous state
        let f = self
            .body
            .jacobian(&self.q_predict, self.w_predict, actuation.wheel_rate)?;
        let phi = Matrix::identity(STATE_SIZE)?.try_add(&f.scale(dt))?;
        let p = phi
            .try_mul(&self.p_predict)?
            .try_mul(&phi.transpose())?
            .try_add(&self.q)?
            .symmetrize()?;

        let (q, w) = self.predict_state(dt, actuation)?;
        Ok((q, w, p))
    }

    pub fn quaternion(&self) -> Quaternion {
        self.q_predict
    }

    pub fn angular_rate(&self) -> [f32; 3] {
        self.w_predict
    }

    pub fn covariance(&self) -> &Matrix {
        &self.p_predict
    }

    pub fn satellite_inertia(&self) -> &Matrix {
        &self.body.satellite
    }

    pub fn wheel_inertia(&self) -> &Matrix {
        &self.body.wheel
    }

    pub fn inverse_order(&self) -> usize {
        self.inverse_order
    }
}

fn state_vector(q: &Quaternion, w: [f32; 3]) -> Result<Matrix, MatrixError> {
    Matrix::from_slice(STATE_SIZE, 1, &[q.0[0], q.0[1], q.0[2], q.0[3], w[0], w[1], w[2]])
}
