use core::ops::{Div, DivAssign, Mul, MulAssign, Neg};

use super::{Matrix, MatrixError};

impl Matrix {
    /// Elementwise sum, both operands must have the same shape.
    pub fn try_add(&self, rhs: &Self) -> Result<Self, MatrixError> {
        self.zip_with(rhs, |a, b| a + b)
    }

    /// Elementwise difference, both operands must have the same shape.
    pub fn try_sub(&self, rhs: &Self) -> Result<Self, MatrixError> {
        self.zip_with(rhs, |a, b| a - b)
    }

    /// Matrix product of a rows x K and a K x cols matrix.
    pub fn try_mul(&self, rhs: &Self) -> Result<Self, MatrixError> {
        if self.cols != rhs.rows {
            return Err(MatrixError::DimensionMismatch {
                left: self.shape(),
                right: rhs.shape(),
            });
        }

        let mut out = Self::zeros(self.rows, rhs.cols)?;
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut acc = 0.0;
                for k in 0..self.cols {
                    acc += self.at(r, k) * rhs.at(k, c);
                }
                *out.at_mut(r, c) = acc;
            }
        }
        Ok(out)
    }

    /// In-place elementwise sum.
    pub fn try_add_assign(&mut self, rhs: &Self) -> Result<(), MatrixError> {
        self.require_same_shape(rhs)?;
        self.data
            .iter_mut()
            .zip(rhs.data.iter())
            .for_each(|(a, b)| *a += b);
        Ok(())
    }

    fn zip_with(&self, rhs: &Self, f: impl Fn(f32, f32) -> f32) -> Result<Self, MatrixError> {
        self.require_same_shape(rhs)?;
        let mut out = self.clone();
        out.data
            .iter_mut()
            .zip(rhs.data.iter())
            .for_each(|(a, b)| *a = f(*a, *b));
        Ok(out)
    }

    fn require_same_shape(&self, rhs: &Self) -> Result<(), MatrixError> {
        if self.shape() == rhs.shape() {
            Ok(())
        } else {
            Err(MatrixError::DimensionMismatch {
                left: self.shape(),
                right: rhs.shape(),
            })
        }
    }

    pub fn scale(&self, factor: f32) -> Self {
        let mut out = self.clone();
        out *= factor;
        out
    }

    pub fn transpose(&self) -> Self {
        let mut out = self.clone();
        out.rows = self.cols;
        out.cols = self.rows;
        for r in 0..self.rows {
            for c in 0..self.cols {
                *out.at_mut(c, r) = self.at(r, c);
            }
        }
        out
    }

    pub fn trace(&self) -> Result<f32, MatrixError> {
        let n = self.require_square()?;
        Ok((0..n).map(|i| self.at(i, i)).sum())
    }

    /// `0.5 * (M + Mᵀ)`, keeps covariance matrices symmetric.
    pub fn symmetrize(&self) -> Result<Self, MatrixError> {
        let n = self.require_square()?;
        let mut out = self.clone();
        for r in 0..n {
            for c in (r + 1)..n {
                let mean = 0.5 * (self.at(r, c) + self.at(c, r));
                *out.at_mut(r, c) = mean;
                *out.at_mut(c, r) = mean;
            }
        }
        Ok(out)
    }

    /// Diagonal coefficients of a square matrix.
    pub fn diagonal_of(&self) -> Result<Self, MatrixError> {
        let n = self.require_square()?;
        let mut out = Self::zeros(n, 1)?;
        for i in 0..n {
            *out.at_mut(i, 0) = self.at(i, i);
        }
        Ok(out)
    }
}

impl MulAssign<f32> for Matrix {
    fn mul_assign(&mut self, rhs: f32) {
        self.data.iter_mut().for_each(|v| *v *= rhs);
    }
}

impl DivAssign<f32> for Matrix {
    fn div_assign(&mut self, rhs: f32) {
        self.data.iter_mut().for_each(|v| *v /= rhs);
    }
}

impl Mul<f32> for Matrix {
    type Output = Matrix;

    fn mul(mut self, rhs: f32) -> Matrix {
        self *= rhs;
        self
    }
}

impl Mul<f32> for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: f32) -> Matrix {
        self.scale(rhs)
    }
}

impl Mul<Matrix> for f32 {
    type Output = Matrix;

    fn mul(self, rhs: Matrix) -> Matrix {
        rhs * self
    }
}

impl Div<f32> for Matrix {
    type Output = Matrix;

    fn div(mut self, rhs: f32) -> Matrix {
        self /= rhs;
        self
    }
}

impl Neg for Matrix {
    type Output = Matrix;

    fn neg(self) -> Matrix {
        self * -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(rows: &[[f32; 3]; 2]) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    #[test]
    fn add_and_sub() {
        let a = m(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = Matrix::ones(2, 3).unwrap();
        assert_eq!(a.try_add(&b).unwrap(), m(&[[2.0, 3.0, 4.0], [5.0, 6.0, 7.0]]));
        assert_eq!(a.try_sub(&b).unwrap(), m(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]));

        let mut c = a.clone();
        c.try_add_assign(&a).unwrap();
        assert_eq!(c, a.scale(2.0));
    }

    #[test]
    fn non_conformable_operands_are_rejected() {
        let a = Matrix::zeros(2, 3).unwrap();
        let b = Matrix::zeros(3, 2).unwrap();
        assert_eq!(
            a.try_add(&b),
            Err(MatrixError::DimensionMismatch {
                left: (2, 3),
                right: (3, 2)
            })
        );
        assert!(a.try_mul(&a).is_err());
        assert!(a.trace().is_err());
    }

    #[test]
    fn product() {
        let a = m(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = a.transpose();
        assert_eq!(b.shape(), (3, 2));
        assert_eq!(b.get(2, 1), Ok(6.0));

        let ab = a.try_mul(&b).unwrap();
        assert_eq!(ab, Matrix::from_rows(&[[14.0, 32.0], [32.0, 77.0]]).unwrap());
        assert_eq!(ab.trace(), Ok(91.0));

        let eye = Matrix::identity(3).unwrap();
        assert_eq!(a.try_mul(&eye).unwrap(), a);
    }

    #[test]
    fn scalar_operators() {
        let a = m(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!((&a * 2.0).get(1, 2), Ok(12.0));
        assert_eq!((2.0 * a.clone()).get(0, 0), Ok(2.0));
        assert_eq!((a.clone() / 2.0).get(0, 1), Ok(1.0));
        assert_eq!((-a).get(1, 0), Ok(-4.0));
    }

    #[test]
    fn symmetrize_averages_off_diagonal() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [4.0, 3.0]]).unwrap();
        let s = a.symmetrize().unwrap();
        assert_eq!(s, Matrix::from_rows(&[[1.0, 3.0], [3.0, 3.0]]).unwrap());
        assert_eq!(s.diagonal_of().unwrap().as_slice(), &[1.0, 3.0]);
    }
}
