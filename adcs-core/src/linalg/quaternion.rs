use core::ops::Mul;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::{Matrix, MatrixError};

/// Attitude quaternion stored scalar first, `[w, x, y, z]`.
///
/// The attitude matrix of `q` ([`Quaternion::to_rotation_matrix`]) maps
/// reference-frame vectors into the body frame: `body = A(q) · reference`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion(pub [f32; 4]);

/// ZYX Euler angles in radians.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0]);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self([w, x, y, z])
    }

    /// Rotation of `angle` radians about `axis`. The axis does not need to be
    /// normalized.
    pub fn from_axis_angle(axis: [f32; 3], angle: f32) -> Result<Self, MatrixError> {
        let axis = Matrix::from(axis).normalize()?;
        let s = libm::sinf(angle / 2.0);
        Ok(Self([
            libm::cosf(angle / 2.0),
            axis.at(0, 0) * s,
            axis.at(1, 0) * s,
            axis.at(2, 0) * s,
        ]))
    }

    pub fn w(&self) -> f32 {
        self.0[0]
    }

    pub fn x(&self) -> f32 {
        self.0[1]
    }

    pub fn y(&self) -> f32 {
        self.0[2]
    }

    pub fn z(&self) -> f32 {
        self.0[3]
    }

    /// Vector part `[x, y, z]`.
    pub fn vector(&self) -> [f32; 3] {
        [self.0[1], self.0[2], self.0[3]]
    }

    pub fn dot(&self, rhs: &Self) -> f32 {
        self.0.iter().zip(rhs.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn norm(&self) -> f32 {
        libm::sqrtf(self.dot(self))
    }

    pub fn normalize(&self) -> Result<Self, MatrixError> {
        let norm = self.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(MatrixError::ZeroNorm);
        }
        Ok(Self(self.0.map(|v| v / norm)))
    }

    pub fn conjugate(&self) -> Self {
        Self([self.0[0], -self.0[1], -self.0[2], -self.0[3]])
    }

    /// `conj(q) / ‖q‖²`
    pub fn inverse(&self) -> Result<Self, MatrixError> {
        let norm_squared = self.dot(self);
        if norm_squared == 0.0 || !norm_squared.is_finite() {
            return Err(MatrixError::ZeroNorm);
        }
        Ok(Self(self.conjugate().0.map(|v| v / norm_squared)))
    }

    /// Same rotation with a non-negative scalar part.
    pub fn canonical(&self) -> Self {
        if self.0[0] < 0.0 {
            Self(self.0.map(|v| -v))
        } else {
            *self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Angle in radians of the rotation taking `self` to `other`, ignoring
    /// the sign ambiguity of quaternions.
    pub fn angle_to(&self, other: &Self) -> f32 {
        let delta = self.conjugate() * *other;
        let [x, y, z] = delta.vector();
        2.0 * libm::atan2f(libm::sqrtf(x * x + y * y + z * z), libm::fabsf(delta.w()))
    }

    /// Attitude matrix, reference to body.
    pub fn to_rotation_matrix(&self) -> Result<Matrix, MatrixError> {
        let [w, x, y, z] = self.normalize()?.0;
        let (ww, xx, yy, zz) = (w * w, x * x, y * y, z * z);
        Matrix::from_rows(&[
            [
                ww + xx - yy - zz,
                2.0 * (x * y + w * z),
                2.0 * (x * z - w * y),
            ],
            [
                2.0 * (x * y - w * z),
                ww - xx + yy - zz,
                2.0 * (y * z + w * x),
            ],
            [
                2.0 * (x * z + w * y),
                2.0 * (y * z - w * x),
                ww - xx - yy + zz,
            ],
        ])
    }

    /// Inverse of [`Quaternion::to_rotation_matrix`] using Shepperd's method:
    /// the largest of the trace and the diagonal picks the component that
    /// is computed from a square root, so the divisor never approaches zero.
    pub fn from_rotation_matrix(rotation: &Matrix) -> Result<Self, MatrixError> {
        rotation.require_shape(3, 3)?;
        let a = |r, c| rotation.at(r, c);
        let trace = a(0, 0) + a(1, 1) + a(2, 2);

        let q = if trace >= a(0, 0) && trace >= a(1, 1) && trace >= a(2, 2) {
            let w = 0.5 * libm::sqrtf((1.0 + trace).max(0.0));
            let f = 0.25 / w;
            [
                w,
                (a(1, 2) - a(2, 1)) * f,
                (a(2, 0) - a(0, 2)) * f,
                (a(0, 1) - a(1, 0)) * f,
            ]
        } else if a(0, 0) >= a(1, 1) && a(0, 0) >= a(2, 2) {
            let x = 0.5 * libm::sqrtf((1.0 + a(0, 0) - a(1, 1) - a(2, 2)).max(0.0));
            let f = 0.25 / x;
            [
                (a(1, 2) - a(2, 1)) * f,
                x,
                (a(0, 1) + a(1, 0)) * f,
                (a(2, 0) + a(0, 2)) * f,
            ]
        } else if a(1, 1) >= a(2, 2) {
            let y = 0.5 * libm::sqrtf((1.0 - a(0, 0) + a(1, 1) - a(2, 2)).max(0.0));
            let f = 0.25 / y;
            [
                (a(2, 0) - a(0, 2)) * f,
                (a(0, 1) + a(1, 0)) * f,
                y,
                (a(1, 2) + a(2, 1)) * f,
            ]
        } else {
            let z = 0.5 * libm::sqrtf((1.0 - a(0, 0) - a(1, 1) + a(2, 2)).max(0.0));
            let f = 0.25 / z;
            [
                (a(0, 1) - a(1, 0)) * f,
                (a(2, 0) + a(0, 2)) * f,
                (a(1, 2) + a(2, 1)) * f,
                z,
            ]
        };

        Ok(Self(q).normalize()?.canonical())
    }

    pub fn to_euler(&self) -> Result<EulerAngles, MatrixError> {
        let [w, x, y, z] = self.normalize()?.0;
        Ok(EulerAngles {
            roll: libm::atan2f(2.0 * (w * x + y * z), 1.0 - 2.0 * (x * x + y * y)),
            pitch: libm::asinf((2.0 * (w * y - x * z)).clamp(-1.0, 1.0)),
            yaw: libm::atan2f(2.0 * (w * z + x * y), 1.0 - 2.0 * (y * y + z * z)),
        })
    }

    pub fn from_euler(euler: &EulerAngles) -> Result<Self, MatrixError> {
        let (sr, cr) = (libm::sinf(euler.roll * 0.5), libm::cosf(euler.roll * 0.5));
        let (sp, cp) = (libm::sinf(euler.pitch * 0.5), libm::cosf(euler.pitch * 0.5));
        let (sy, cy) = (libm::sinf(euler.yaw * 0.5), libm::cosf(euler.yaw * 0.5));

        Self([
            cy * cp * cr + sy * sp * sr,
            cy * cp * sr - sy * sp * cr,
            sy * cp * sr + cy * sp * cr,
            sy * cp * cr - cy * sp * sr,
        ])
        .normalize()
    }

    /// Expresses a reference-frame vector in the body frame.
    pub fn rotate(&self, reference: [f32; 3]) -> Result<[f32; 3], MatrixError> {
        let body = self
            .to_rotation_matrix()?
            .try_mul(&Matrix::from(reference))?;
        (&body).try_into()
    }

    /// The quaternion as a 4x1 column vector.
    pub fn to_matrix(&self) -> Matrix {
        let mut data = Vec::new();
        // 4 coefficients always fit
        let _ = data.extend_from_slice(&self.0);
        Matrix {
            rows: 4,
            cols: 1,
            data,
        }
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        let [a0, a1, a2, a3] = self.0;
        let [b0, b1, b2, b3] = rhs.0;
        Quaternion([
            a0 * b0 - a1 * b1 - a2 * b2 - a3 * b3,
            a0 * b1 + a1 * b0 + a2 * b3 - a3 * b2,
            a0 * b2 - a1 * b3 + a2 * b0 + a3 * b1,
            a0 * b3 + a1 * b2 - a2 * b1 + a3 * b0,
        ])
    }
}

impl TryFrom<&Matrix> for Quaternion {
    type Error = MatrixError;

    fn try_from(m: &Matrix) -> Result<Self, Self::Error> {
        m.require_vector()?;
        if m.len() != 4 {
            return Err(MatrixError::DimensionMismatch {
                left: m.shape(),
                right: (4, 1),
            });
        }
        let d = m.as_slice();
        Ok(Self([d[0], d[1], d[2], d[3]]))
    }
}

impl From<Quaternion> for [f32; 4] {
    fn from(q: Quaternion) -> Self {
        q.0
    }
}

impl Matrix {
    /// Frame rotation of `radians` about x.
    pub fn rot_x(radians: f32) -> Self {
        let (s, c) = (libm::sinf(radians), libm::cosf(radians));
        Self::rotation_from_rows([[1.0, 0.0, 0.0], [0.0, c, s], [0.0, -s, c]])
    }

    /// Frame rotation of `radians` about y.
    pub fn rot_y(radians: f32) -> Self {
        let (s, c) = (libm::sinf(radians), libm::cosf(radians));
        Self::rotation_from_rows([[c, 0.0, -s], [0.0, 1.0, 0.0], [s, 0.0, c]])
    }

    /// Frame rotation of `radians` about z.
    pub fn rot_z(radians: f32) -> Self {
        let (s, c) = (libm::sinf(radians), libm::cosf(radians));
        Self::rotation_from_rows([[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    fn rotation_from_rows(rows: [[f32; 3]; 3]) -> Self {
        let mut data = Vec::new();
        for row in rows.iter() {
            // 9 coefficients always fit
            let _ = data.extend_from_slice(row);
        }
        Self {
            rows: 3,
            cols: 3,
            data,
        }
    }

    /// Attitude matrix of ZYX Euler angles, `rot_x(roll)·rot_y(pitch)·rot_z(yaw)`.
    pub fn euler_to_rotation(euler: &EulerAngles) -> Result<Self, MatrixError> {
        Self::rot_x(euler.roll)
            .try_mul(&Self::rot_y(euler.pitch))?
            .try_mul(&Self::rot_z(euler.yaw))
    }

    /// ZYX Euler angles of an attitude matrix. At gimbal lock the yaw is
    /// reported as zero and the whole rotation goes into the roll.
    pub fn rotation_to_euler(&self) -> Result<EulerAngles, MatrixError> {
        self.require_shape(3, 3)?;
        let sin_pitch = (-self.at(0, 2)).clamp(-1.0, 1.0);
        let pitch = libm::asinf(sin_pitch);

        if libm::fabsf(sin_pitch) > 1.0 - 1e-6 {
            return Ok(EulerAngles {
                roll: libm::atan2f(sin_pitch * self.at(1, 0), self.at(1, 1)),
                pitch,
                yaw: 0.0,
            });
        }

        Ok(EulerAngles {
            roll: libm::atan2f(self.at(1, 2), self.at(2, 2)),
            pitch,
            yaw: libm::atan2f(self.at(0, 1), self.at(0, 0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use core::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    use approx::assert_relative_eq;

    use super::*;

    fn assert_same_rotation(a: &Quaternion, b: &Quaternion) {
        let angle = a.angle_to(b);
        assert!(angle < 1e-3, "quaternions {a:?} and {b:?} differ by {angle} rad");
    }

    #[test]
    fn normalization_is_idempotent() {
        let q = Quaternion::new(0.3, -1.2, 4.0, 0.05);
        let once = q.normalize().unwrap();
        let twice = once.normalize().unwrap();
        assert_relative_eq!(once.norm(), 1.0, epsilon = 1e-5);
        for i in 0..4 {
            assert_relative_eq!(once.0[i], twice.0[i], epsilon = 1e-6);
        }
        assert_eq!(
            Quaternion::new(0.0, 0.0, 0.0, 0.0).normalize(),
            Err(MatrixError::ZeroNorm)
        );
    }

    #[test]
    fn hamilton_product() {
        let i = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let j = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        let k = Quaternion::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(i * j, k);
        assert_eq!(j * i, Quaternion::new(0.0, 0.0, 0.0, -1.0));
        assert_eq!(i * i, Quaternion::new(-1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn inverse_cancels() {
        let q = Quaternion::new(2.0, -1.0, 0.5, 3.0);
        let product = q * q.inverse().unwrap();
        assert_same_rotation(&product, &Quaternion::IDENTITY);
        assert_relative_eq!(product.w(), 1.0, epsilon = 1e-6);
        assert_eq!(q.conjugate().conjugate(), q);
    }

    #[test]
    fn rotation_matrix_is_a_frame_rotation() {
        // rotating the frame by +90° about z makes the reference x axis
        // point along body -y
        let q = Quaternion::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2).unwrap();
        let body = q.rotate([1.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(body[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(body[1], -1.0, epsilon = 1e-6);

        let r = q.to_rotation_matrix().unwrap();
        assert!(r.max_abs_diff(&Matrix::rot_z(FRAC_PI_2)).unwrap() < 1e-6);
        assert_relative_eq!(r.determinant().unwrap(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn shepperd_round_trip_covers_every_branch() {
        let cases = [
            Quaternion::IDENTITY,
            Quaternion::from_axis_angle([1.0, 0.0, 0.0], 3.1).unwrap(),
            Quaternion::from_axis_angle([0.0, 1.0, 0.0], 3.0).unwrap(),
            Quaternion::from_axis_angle([0.0, 0.0, 1.0], 2.9).unwrap(),
            Quaternion::from_axis_angle([1.0, -2.0, 0.5], 1.3).unwrap(),
            Quaternion::new(0.0, 0.0, 1.0, 0.0),
        ];
        for q in cases {
            let r = q.to_rotation_matrix().unwrap();
            let back = Quaternion::from_rotation_matrix(&r).unwrap();
            assert_relative_eq!(back.norm(), 1.0, epsilon = 1e-5);
            assert!(back.w() >= 0.0);
            assert_same_rotation(&q, &back);
        }

        assert!(Quaternion::from_rotation_matrix(&Matrix::identity(2).unwrap()).is_err());
    }

    #[test]
    fn euler_round_trip() {
        let euler = EulerAngles {
            roll: 0.4,
            pitch: -0.7,
            yaw: 2.1,
        };
        let q = Quaternion::from_euler(&euler).unwrap();
        let back = q.to_euler().unwrap();
        assert_relative_eq!(back.roll, euler.roll, epsilon = 1e-5);
        assert_relative_eq!(back.pitch, euler.pitch, epsilon = 1e-5);
        assert_relative_eq!(back.yaw, euler.yaw, epsilon = 1e-5);

        let from_euler = Matrix::euler_to_rotation(&euler).unwrap();
        let from_quaternion = q.to_rotation_matrix().unwrap();
        assert!(from_euler.max_abs_diff(&from_quaternion).unwrap() < 1e-5);

        let back = from_euler.rotation_to_euler().unwrap();
        assert_relative_eq!(back.roll, euler.roll, epsilon = 1e-4);
        assert_relative_eq!(back.pitch, euler.pitch, epsilon = 1e-4);
        assert_relative_eq!(back.yaw, euler.yaw, epsilon = 1e-4);
    }

    #[test]
    fn euler_at_gimbal_lock() {
        let euler = EulerAngles {
            roll: FRAC_PI_4,
            pitch: FRAC_PI_2,
            yaw: 0.0,
        };
        let r = Matrix::euler_to_rotation(&euler).unwrap();
        let back = r.rotation_to_euler().unwrap();
        assert_relative_eq!(back.pitch, FRAC_PI_2, epsilon = 1e-3);
        assert_relative_eq!(back.roll, FRAC_PI_4, epsilon = 1e-3);
        assert_eq!(back.yaw, 0.0);
    }

    #[test]
    fn matrix_conversions() {
        let q = Quaternion::new(0.5, 0.5, -0.5, 0.5);
        let m = q.to_matrix();
        assert_eq!(m.shape(), (4, 1));
        assert_eq!(Quaternion::try_from(&m), Ok(q));
        assert!(Quaternion::try_from(&Matrix::zeros(3, 1).unwrap()).is_err());
    }
}
