use super::{Matrix, MatrixError};

impl Matrix {
    /// Determinant of a square matrix.
    ///
    /// 2x2 and 3x3 use closed forms. Larger matrices fall back to cofactor
    /// expansion along the first row, O(n!), which is fine for the 7x7
    /// matrices of the filter but should stay off the per-cycle path.
    pub fn determinant(&self) -> Result<f32, MatrixError> {
        let n = self.require_square()?;
        let det = match n {
            0 => 1.0,
            1 => self.at(0, 0),
            2 => self.at(0, 0) * self.at(1, 1) - self.at(0, 1) * self.at(1, 0),
            3 => {
                // rule of Sarrus
                self.at(0, 0) * self.at(1, 1) * self.at(2, 2)
                    + self.at(0, 1) * self.at(1, 2) * self.at(2, 0)
                    + self.at(0, 2) * self.at(1, 0) * self.at(2, 1)
                    - self.at(0, 2) * self.at(1, 1) * self.at(2, 0)
                    - self.at(0, 0) * self.at(1, 2) * self.at(2, 1)
                    - self.at(0, 1) * self.at(1, 0) * self.at(2, 2)
            }
            _ => {
                let mut det = 0.0;
                for c in 0..n {
                    let a = self.at(0, c);
                    if a != 0.0 {
                        det += cofactor_sign(0, c) * a * self.minor(0, c)?.determinant()?;
                    }
                }
                det
            }
        };
        Ok(det)
    }

    /// The matrix with row `row` and column `col` removed.
    pub fn minor(&self, row: usize, col: usize) -> Result<Self, MatrixError> {
        let n = self.require_square()?;
        if row >= n || col >= n {
            return Err(MatrixError::IndexOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }

        let mut out = Self::zeros(n - 1, n - 1)?;
        let mut i = 0;
        for r in (0..n).filter(|r| *r != row) {
            for c in (0..n).filter(|c| *c != col) {
                out.data[i] = self.at(r, c);
                i += 1;
            }
        }
        Ok(out)
    }

    /// Transpose of the cofactor matrix.
    pub fn adjugate(&self) -> Result<Self, MatrixError> {
        let n = self.require_square()?;
        match n {
            0 => Ok(self.clone()),
            1 => Self::identity(1),
            2 => Self::from_rows(&[
                [self.at(1, 1), -self.at(0, 1)],
                [-self.at(1, 0), self.at(0, 0)],
            ]),
            3 => {
                let m = |r, c| self.at(r, c);
                Self::from_rows(&[
                    [
                        m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1),
                        -(m(0, 1) * m(2, 2) - m(0, 2) * m(2, 1)),
                        m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1),
                    ],
                    [
                        -(m(1, 0) * m(2, 2) - m(1, 2) * m(2, 0)),
                        m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0),
                        -(m(0, 0) * m(1, 2) - m(0, 2) * m(1, 0)),
                    ],
                    [
                        m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0),
                        -(m(0, 0) * m(2, 1) - m(0, 1) * m(2, 0)),
                        m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0),
                    ],
                ])
            }
            _ => {
                let mut adj = Self::zeros(n, n)?;
                for r in 0..n {
                    for c in 0..n {
                        *adj.at_mut(c, r) = cofactor_sign(r, c) * self.minor(r, c)?.determinant()?;
                    }
                }
                Ok(adj)
            }
        }
    }

    /// Exact inverse through the adjugate.
    ///
    /// Returns [`MatrixError::SingularMatrix`] when the determinant is zero
    /// or not finite.
    pub fn inverse(&self) -> Result<Self, MatrixError> {
        self.require_square()?;
        let det = self.determinant()?;
        if det == 0.0 || !det.is_finite() {
            return Err(MatrixError::SingularMatrix);
        }
        Ok(self.adjugate()? / det)
    }

    /// Truncated Neumann series inverse.
    ///
    /// With `D` the diagonal and `N` the off-diagonal part,
    /// `(D + N)⁻¹ ≈ Σₖ₌₀..order (-D⁻¹N)ᵏ D⁻¹`. Only accurate when `N` is small
    /// relative to `D`. A zero diagonal entry inverts to zero, so the result
    /// is always finite for finite input.
    pub fn approximate_inverse(&self, order: usize) -> Result<Self, MatrixError> {
        let n = self.require_square()?;

        let mut diagonal_inv = Self::zeros(n, n)?;
        let mut off_diagonal = self.clone();
        for i in 0..n {
            let d = self.at(i, i);
            *diagonal_inv.at_mut(i, i) = if d != 0.0 {
                1.0 / d
            } else {
                log_warn!("series inverse: zero diagonal at {}", i);
                0.0
            };
            *off_diagonal.at_mut(i, i) = 0.0;
        }

        let step = -diagonal_inv.try_mul(&off_diagonal)?;
        let mut term = diagonal_inv.clone();
        let mut sum = diagonal_inv;
        for _ in 0..order {
            term = step.try_mul(&term)?;
            sum.try_add_assign(&term)?;
        }
        Ok(sum)
    }

    /// Strict row diagonal dominance, the regime where
    /// [`Matrix::approximate_inverse`] converges.
    pub fn is_diagonally_dominant(&self) -> bool {
        if !self.is_square() {
            return false;
        }
        (0..self.rows).all(|r| {
            let off: f32 = (0..self.cols)
                .filter(|c| *c != r)
                .map(|c| libm::fabsf(self.at(r, c)))
                .sum();
            libm::fabsf(self.at(r, r)) > off
        })
    }
}

fn cofactor_sign(row: usize, col: usize) -> f32 {
    if (row + col) % 2 == 0 { 1.0 } else { -1.0 }
}
