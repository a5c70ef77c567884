//! Rigid body with reaction wheels, `I·ω̇ = τ_ext − ω×(I·ω) − ω×h − τ_wheel`,
//! and quaternion kinematics `q̇ = ½·Ω(ω)·q`.

use crate::linalg::{Matrix, MatrixError, Quaternion};

use super::STATE_SIZE;

/// `Ω(ω)` such that `Ω(ω)·q = q ⊗ [0, ω]`.
pub fn omega(w: [f32; 3]) -> Result<Matrix, MatrixError> {
    let [w1, w2, w3] = w;
    Matrix::from_rows(&[
        [0.0, -w1, -w2, -w3],
        [w1, 0.0, w3, -w2],
        [w2, -w3, 0.0, w1],
        [w3, w2, -w1, 0.0],
    ])
}

/// `Ξ(q)` such that `Ξ(q)·ω = q ⊗ [0, ω]`.
pub fn xi(q: &Quaternion) -> Result<Matrix, MatrixError> {
    let [q0, q1, q2, q3] = q.0;
    Matrix::from_rows(&[
        [-q1, -q2, -q3],
        [q0, -q3, q2],
        [q3, q0, -q1],
        [-q2, q1, q0],
    ])
}

/// Inertia tensors of the spacecraft and the wheel assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub satellite: Matrix,
    pub satellite_inv: Matrix,
    pub wheel: Matrix,
}

impl RigidBody {
    pub fn new(satellite: Matrix, wheel: Matrix) -> Result<Self, MatrixError> {
        satellite.require_shape(3, 3)?;
        wheel.require_shape(3, 3)?;
        let satellite_inv = satellite.inverse()?;
        Ok(Self {
            satellite,
            satellite_inv,
            wheel,
        })
    }

    /// Wheel angular momentum `h = I_wheel·ω_wheel`.
    pub fn wheel_momentum(&self, wheel_rate: [f32; 3]) -> Result<Matrix, MatrixError> {
        self.wheel.try_mul(&Matrix::from(wheel_rate))
    }

    /// `ω̇` from Euler's rotation equation.
    pub fn angular_acceleration(
        &self,
        w: [f32; 3],
        wheel_rate: [f32; 3],
        external_torque: [f32; 3],
        wheel_torque: [f32; 3],
    ) -> Result<Matrix, MatrixError> {
        let w = Matrix::from(w);
        let h = self.wheel_momentum(wheel_rate)?;
        let gyroscopic = w.cross(&self.satellite.try_mul(&w)?)?;
        let torque = Matrix::from(external_torque)
            .try_sub(&gyroscopic)?
            .try_sub(&w.cross(&h)?)?
            .try_sub(&Matrix::from(wheel_torque))?;
        self.satellite_inv.try_mul(&torque)
    }

    /// `∂ω̇/∂ω = I⁻¹·([(I·ω)×] − [ω×]·I + [h×])`
    pub fn rate_jacobian(&self, w: [f32; 3], wheel_rate: [f32; 3]) -> Result<Matrix, MatrixError> {
        let w = Matrix::from(w);
        let h = self.wheel_momentum(wheel_rate)?;
        let inner = self
            .satellite
            .try_mul(&w)?
            .skew()?
            .try_sub(&w.skew()?.try_mul(&self.satellite)?)?
            .try_add(&h.skew()?)?;
        self.satellite_inv.try_mul(&inner)
    }

    /// Linearized dynamics `F = ∂ẋ/∂x` of the 7-state `[q; ω]` about the
    /// given state.
    ///
    /// ```text
    /// F = | ½Ω(ω)   ½Ξ(q)   |
    ///     |   0     ∂ω̇/∂ω |
    /// ```
    pub fn jacobian(&self, q: &Quaternion, w: [f32; 3], wheel_rate: [f32; 3]) -> Result<Matrix, MatrixError> {
        let mut f = Matrix::zeros(STATE_SIZE, STATE_SIZE)?;
        f.set_block(0, 0, &omega(w)?.scale(0.5))?;
        f.set_block(0, 4, &xi(q)?.scale(0.5))?;
        f.set_block(4, 4, &self.rate_jacobian(w, wheel_rate)?)?;
        Ok(f)
    }
}

/// One Euler step of the kinematics, renormalized.
pub fn propagate_quaternion(q: &Quaternion, w: [f32; 3], dt: f32) -> Result<Quaternion, MatrixError> {
    let q_dot = omega(w)?.try_mul(&q.to_matrix())?.scale(0.5 * dt);
    Quaternion::try_from(&q.to_matrix().try_add(&q_dot)?)?.normalize()
}
