use serde::{Deserialize, Serialize};

use super::sensors::SensorId;

/// Expected directions of the observed vectors in the reference frame.
pub trait ReferenceModel {
    /// Advances the model by `elapsed_s` seconds.
    fn update(&mut self, elapsed_s: f32);

    fn reference_magnetic_field(&self) -> [f32; 3];

    fn reference_sun_direction(&self) -> [f32; 3];

    fn reference_vector(&self, id: SensorId) -> [f32; 3] {
        match id {
            SensorId::Magnetometer => self.reference_magnetic_field(),
            SensorId::Sun => self.reference_sun_direction(),
        }
    }
}

/// Lab stand-in for an orbit model, in the local North-East-Down frame.
///
/// The field and "sun" directions are constant. On a test bench the sun is
/// usually replaced by gravity, see [`GroundModel::with_gravity`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundModel {
    magnetic_field: [f32; 3],
    sun_direction: [f32; 3],
    elapsed_s: f32,
}

impl GroundModel {
    pub fn new(magnetic_field: [f32; 3], sun_direction: [f32; 3]) -> Self {
        Self {
            magnetic_field,
            sun_direction,
            elapsed_s: 0.0,
        }
    }

    /// Uses the local vertical (NED down) as second reference, matched by an
    /// accelerometer in place of the sun sensor.
    pub fn with_gravity(magnetic_field: [f32; 3]) -> Self {
        Self::new(magnetic_field, [0.0, 0.0, 1.0])
    }

    /// Direction of a light source from its azimuth (from North, clockwise)
    /// and elevation, both in radians.
    pub fn with_sun_az_el(magnetic_field: [f32; 3], azimuth: f32, elevation: f32) -> Self {
        Self::new(magnetic_field, az_el_to_ned(azimuth, elevation))
    }

    /// Seconds accumulated through [`ReferenceModel::update`].
    pub fn elapsed(&self) -> f32 {
        self.elapsed_s
    }
}

impl ReferenceModel for GroundModel {
    fn update(&mut self, elapsed_s: f32) {
        self.elapsed_s += elapsed_s;
    }

    fn reference_magnetic_field(&self) -> [f32; 3] {
        self.magnetic_field
    }

    fn reference_sun_direction(&self) -> [f32; 3] {
        self.sun_direction
    }
}

/// Unit vector in North-East-Down for an azimuth/elevation pair.
pub fn az_el_to_ned(azimuth: f32, elevation: f32) -> [f32; 3] {
    let horizontal = libm::cosf(elevation);
    [
        horizontal * libm::cosf(azimuth),
        horizontal * libm::sinf(azimuth),
        -libm::sinf(elevation),
    ]
}

/// Reference model chosen at construction: a real orbit model in flight or
/// the [`GroundModel`] on the bench.
#[derive(Debug, Clone)]
pub enum ReferenceSource<O> {
    OrbitModel(O),
    GroundModel(GroundModel),
}

impl<O: ReferenceModel> ReferenceModel for ReferenceSource<O> {
    fn update(&mut self, elapsed_s: f32) {
        match self {
            Self::OrbitModel(orbit) => orbit.update(elapsed_s),
            Self::GroundModel(ground) => ground.update(elapsed_s),
        }
    }

    fn reference_magnetic_field(&self) -> [f32; 3] {
        match self {
            Self::OrbitModel(orbit) => orbit.reference_magnetic_field(),
            Self::GroundModel(ground) => ground.reference_magnetic_field(),
        }
    }

    fn reference_sun_direction(&self) -> [f32; 3] {
        match self {
            Self::OrbitModel(orbit) => orbit.reference_sun_direction(),
            Self::GroundModel(ground) => ground.reference_sun_direction(),
        }
    }
}
