use super::{Matrix, MatrixError};

impl Matrix {
    /// Euclidean norm of a row or column vector.
    pub fn norm(&self) -> Result<f32, MatrixError> {
        self.require_vector()?;
        Ok(libm::sqrtf(self.data.iter().map(|v| v * v).sum()))
    }

    /// Unit vector with the same direction.
    pub fn normalize(&self) -> Result<Self, MatrixError> {
        let norm = self.norm()?;
        if norm == 0.0 || !norm.is_finite() {
            return Err(MatrixError::ZeroNorm);
        }
        Ok(self.clone() / norm)
    }

    /// Scalar product of two vectors of equal length. Row and column vectors
    /// can be mixed.
    pub fn dot(&self, rhs: &Self) -> Result<f32, MatrixError> {
        self.require_vector()?;
        rhs.require_vector()?;
        if self.len() != rhs.len() {
            return Err(MatrixError::DimensionMismatch {
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        Ok(self.data.iter().zip(rhs.data.iter()).map(|(a, b)| a * b).sum())
    }

    /// Cross product of two 3-vectors, returned as a column vector.
    pub fn cross(&self, rhs: &Self) -> Result<Self, MatrixError> {
        let a: [f32; 3] = self.try_into()?;
        let b: [f32; 3] = rhs.try_into()?;
        Ok(Self::from([
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]))
    }

    /// Skew-symmetric matrix `[v×]` such that `[v×]·u = v × u`.
    pub fn skew(&self) -> Result<Self, MatrixError> {
        let v: [f32; 3] = self.try_into()?;
        Self::from_rows(&[
            [0.0, -v[2], v[1]],
            [v[2], 0.0, -v[0]],
            [-v[1], v[0], 0.0],
        ])
    }
}
