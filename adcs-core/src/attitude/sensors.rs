use core::fmt;
use core::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Returned by a sensor that has no new sample, e.g. before its data-ready
/// flag is raised.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorUnavailable;

impl fmt::Display for SensorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor data unavailable")
    }
}

impl core::error::Error for SensorUnavailable {}

/// Calibrated sensor readings in the body frame.
pub trait AttitudeSensors {
    /// Body angular rate, rad/s.
    fn read_gyro(&mut self) -> Result<[f32; 3], SensorUnavailable>;

    /// Magnetic field direction. Only the direction is used.
    fn read_magnetometer(&mut self) -> Result<[f32; 3], SensorUnavailable>;

    /// Sun direction. Only the direction is used.
    fn read_sun_direction(&mut self) -> Result<[f32; 3], SensorUnavailable>;

    fn read_vector(&mut self, id: SensorId) -> Result<[f32; 3], SensorUnavailable> {
        match id {
            SensorId::Magnetometer => self.read_magnetometer(),
            SensorId::Sun => self.read_sun_direction(),
        }
    }
}

/// The vector sensors fed to QUEST.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorId {
    Magnetometer,
    Sun,
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorId::Magnetometer => write!(f, "magnetometer"),
            SensorId::Sun => write!(f, "sun sensor"),
        }
    }
}

impl SensorId {
    pub const COUNT: usize = 2;
    pub const ALL: [SensorId; Self::COUNT] = [SensorId::Magnetometer, SensorId::Sun];

    pub const fn index(self) -> usize {
        match self {
            SensorId::Magnetometer => 0,
            SensorId::Sun => 1,
        }
    }
}

/// One value per [`SensorId`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorArray<T>(pub [T; SensorId::COUNT]);

impl<T> SensorArray<T> {
    pub const fn new(magnetometer: T, sun: T) -> Self {
        Self([magnetometer, sun])
    }

    pub fn iter(&self) -> impl Iterator<Item = (SensorId, &T)> {
        SensorId::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SensorArray<U> {
        SensorArray(self.0.map(f))
    }

    pub fn as_array(&self) -> &[T; SensorId::COUNT] {
        &self.0
    }
}

impl<T> Index<SensorId> for SensorArray<T> {
    type Output = T;

    fn index(&self, id: SensorId) -> &T {
        &self.0[id.index()]
    }
}

impl<T> IndexMut<SensorId> for SensorArray<T> {
    fn index_mut(&mut self, id: SensorId) -> &mut T {
        &mut self.0[id.index()]
    }
}
