// only use std when feature = "std" is enabled or during testing
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod fmt;

pub mod attitude;
pub mod filter;
pub mod linalg;
pub mod quest;

pub use attitude::{
    AttitudeConfig, AttitudeCore, AttitudeSensors, CycleStatus, GroundModel, ReferenceModel,
    ReferenceSource, SensorId, SensorUnavailable,
};
pub use filter::{Actuation, KalmanFilter};
pub use linalg::{EulerAngles, Matrix, MatrixError, Quaternion};
pub use quest::{QuestError, quest};

#[cfg(test)]
mod tests;
