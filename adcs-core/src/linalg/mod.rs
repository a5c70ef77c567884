//! Small dense linear algebra for the attitude estimator.
//!
//! Every matrix lives on the stack in a fixed-capacity buffer, so nothing in
//! here allocates. Operations that can fail on shape return
//! [`MatrixError`] instead of producing a sentinel matrix.

use core::fmt;

use heapless::Vec;

mod inverse;
mod ops;
mod quaternion;
mod vector;

pub use quaternion::{EulerAngles, Quaternion};

/// Number of coefficients a [`Matrix`] can hold, enough for 8x8.
pub const MAX_ELEMENTS: usize = 64;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixError {
    /// Operand shapes are not conformable for the requested operation.
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    NotSquare { rows: usize, cols: usize },
    NotVector { rows: usize, cols: usize },
    IndexOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    /// Exact inverse requested on a matrix whose determinant is zero.
    SingularMatrix,
    /// Normalizing a vector with zero or non-finite norm.
    ZeroNorm,
    CapacityExceeded { rows: usize, cols: usize },
}

impl fmt::Display for MatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { left, right } => write!(
                f,
                "dimension mismatch: {}x{} and {}x{}",
                left.0, left.1, right.0, right.1
            ),
            Self::NotSquare { rows, cols } => write!(f, "{rows}x{cols} matrix is not square"),
            Self::NotVector { rows, cols } => write!(f, "{rows}x{cols} matrix is not a vector"),
            Self::IndexOutOfRange {
                row,
                col,
                rows,
                cols,
            } => write!(f, "index ({row}, {col}) out of range for {rows}x{cols} matrix"),
            Self::SingularMatrix => write!(f, "matrix is singular"),
            Self::ZeroNorm => write!(f, "vector has zero norm"),
            Self::CapacityExceeded { rows, cols } => write!(
                f,
                "{rows}x{cols} matrix exceeds capacity of {MAX_ELEMENTS} elements"
            ),
        }
    }
}

impl core::error::Error for MatrixError {}

/// Row-major matrix of `f32` with dimensions fixed at construction.
///
/// A matrix with a single row or column is also a vector and supports
/// [`Matrix::norm`], [`Matrix::dot`] and [`Matrix::cross`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32, MAX_ELEMENTS>,
}

impl Matrix {
    /// Zero-filled `rows` x `cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Result<Self, MatrixError> {
        Self::filled(rows, cols, 0.0)
    }

    /// Builds a matrix from row-major coefficients. The slice must hold
    /// exactly `rows * cols` values.
    pub fn from_slice(rows: usize, cols: usize, coefficients: &[f32]) -> Result<Self, MatrixError> {
        Self::check_capacity(rows, cols)?;
        if coefficients.len() != rows * cols {
            return Err(MatrixError::DimensionMismatch {
                left: (rows, cols),
                right: (coefficients.len(), 1),
            });
        }

        let mut data = Vec::new();
        data.extend_from_slice(coefficients)
            .map_err(|_| MatrixError::CapacityExceeded { rows, cols })?;
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix from an array of rows.
    pub fn from_rows<const R: usize, const C: usize>(
        rows: &[[f32; C]; R],
    ) -> Result<Self, MatrixError> {
        let mut m = Self::new(R, C)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                m.data[r * C + c] = *value;
            }
        }
        Ok(m)
    }

    /// Column vector holding `coefficients`.
    pub fn column_vector(coefficients: &[f32]) -> Result<Self, MatrixError> {
        Self::from_slice(coefficients.len(), 1, coefficients)
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Self, MatrixError> {
        Self::filled(rows, cols, 0.0)
    }

    pub fn ones(rows: usize, cols: usize) -> Result<Self, MatrixError> {
        Self::filled(rows, cols, 1.0)
    }

    pub fn identity(size: usize) -> Result<Self, MatrixError> {
        let mut m = Self::zeros(size, size)?;
        for i in 0..size {
            m.data[i * size + i] = 1.0;
        }
        Ok(m)
    }

    /// Square matrix with `diagonal` on its diagonal and zeros elsewhere.
    pub fn diagonal(diagonal: &[f32]) -> Result<Self, MatrixError> {
        let size = diagonal.len();
        let mut m = Self::zeros(size, size)?;
        for (i, value) in diagonal.iter().enumerate() {
            m.data[i * size + i] = *value;
        }
        Ok(m)
    }

    fn filled(rows: usize, cols: usize, value: f32) -> Result<Self, MatrixError> {
        Self::check_capacity(rows, cols)?;
        let mut data = Vec::new();
        data.resize(rows * cols, value)
            .map_err(|_| MatrixError::CapacityExceeded { rows, cols })?;
        Ok(Self { rows, cols, data })
    }

    fn check_capacity(rows: usize, cols: usize) -> Result<(), MatrixError> {
        match rows.checked_mul(cols) {
            Some(len) if len <= MAX_ELEMENTS => Ok(()),
            _ => Err(MatrixError::CapacityExceeded { rows, cols }),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of coefficients.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major coefficients.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f32, MatrixError> {
        self.offset(row, col).map(|i| self.data[i])
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Result<&mut f32, MatrixError> {
        let i = self.offset(row, col)?;
        Ok(&mut self.data[i])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<(), MatrixError> {
        *self.get_mut(row, col)? = value;
        Ok(())
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize, MatrixError> {
        if row < self.rows && col < self.cols {
            Ok(row * self.cols + col)
        } else {
            Err(MatrixError::IndexOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    /// Unchecked read for indices the caller has already validated.
    #[inline(always)]
    pub(crate) fn at(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    #[inline(always)]
    pub(crate) fn at_mut(&mut self, row: usize, col: usize) -> &mut f32 {
        &mut self.data[row * self.cols + col]
    }

    /// Changes the shape in place. The overlapping top-left block is kept,
    /// new coefficients are zero.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<(), MatrixError> {
        let mut resized = Self::zeros(rows, cols)?;
        for r in 0..rows.min(self.rows) {
            for c in 0..cols.min(self.cols) {
                *resized.at_mut(r, c) = self.at(r, c);
            }
        }
        *self = resized;
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0)
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Row `row` as a 1 x cols matrix.
    pub fn row(&self, row: usize) -> Result<Self, MatrixError> {
        self.block(row, 0, 1, self.cols)
    }

    /// Column `col` as a rows x 1 matrix.
    pub fn column(&self, col: usize) -> Result<Self, MatrixError> {
        self.block(0, col, self.rows, 1)
    }

    /// Copies the `rows` x `cols` block whose top-left corner is at
    /// (`row`, `col`).
    pub fn block(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Self, MatrixError> {
        if !fits(row, rows, self.rows) || !fits(col, cols, self.cols) {
            return Err(MatrixError::IndexOutOfRange {
                row: row.saturating_add(rows.saturating_sub(1)),
                col: col.saturating_add(cols.saturating_sub(1)),
                rows: self.rows,
                cols: self.cols,
            });
        }

        let mut out = Self::zeros(rows, cols)?;
        for r in 0..rows {
            for c in 0..cols {
                *out.at_mut(r, c) = self.at(row + r, col + c);
            }
        }
        Ok(out)
    }

    /// Overwrites the block starting at (`row`, `col`) with `source`.
    pub fn set_block(&mut self, row: usize, col: usize, source: &Self) -> Result<(), MatrixError> {
        if !fits(row, source.rows, self.rows) || !fits(col, source.cols, self.cols) {
            return Err(MatrixError::DimensionMismatch {
                left: self.shape(),
                right: (
                    row.saturating_add(source.rows),
                    col.saturating_add(source.cols),
                ),
            });
        }

        for r in 0..source.rows {
            for c in 0..source.cols {
                *self.at_mut(row + r, col + c) = source.at(r, c);
            }
        }
        Ok(())
    }

    /// Coefficient `i` of a vector, whatever its orientation.
    pub fn element(&self, i: usize) -> Result<f32, MatrixError> {
        self.require_vector()?;
        self.data.get(i).copied().ok_or(MatrixError::IndexOutOfRange {
            row: i,
            col: 0,
            rows: self.rows,
            cols: self.cols,
        })
    }

    pub(crate) fn require_vector(&self) -> Result<(), MatrixError> {
        if self.is_vector() {
            Ok(())
        } else {
            Err(MatrixError::NotVector {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    pub(crate) fn require_square(&self) -> Result<usize, MatrixError> {
        if self.is_square() {
            Ok(self.rows)
        } else {
            Err(MatrixError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    pub(crate) fn require_shape(&self, rows: usize, cols: usize) -> Result<(), MatrixError> {
        if self.shape() == (rows, cols) {
            Ok(())
        } else {
            Err(MatrixError::DimensionMismatch {
                left: self.shape(),
                right: (rows, cols),
            })
        }
    }

    /// Maximum absolute elementwise difference, `None` when shapes differ.
    pub fn max_abs_diff(&self, other: &Self) -> Option<f32> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(other.data.iter())
                .fold(0.0f32, |acc, (a, b)| acc.max(libm::fabsf(a - b))),
        )
    }
}

/// Whether `len` entries starting at `start` stay within `bound`.
fn fits(start: usize, len: usize, bound: usize) -> bool {
    start.checked_add(len).is_some_and(|end| end <= bound)
}

impl From<[f32; 3]> for Matrix {
    fn from(v: [f32; 3]) -> Self {
        let mut data = Vec::new();
        // three coefficients always fit
        let _ = data.extend_from_slice(&v);
        Self {
            rows: 3,
            cols: 1,
            data,
        }
    }
}

impl TryFrom<&Matrix> for [f32; 3] {
    type Error = MatrixError;

    fn try_from(m: &Matrix) -> Result<Self, Self::Error> {
        m.require_vector()?;
        if m.len() != 3 {
            return Err(MatrixError::DimensionMismatch {
                left: m.shape(),
                right: (3, 1),
            });
        }
        Ok([m.data[0], m.data[1], m.data[2]])
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for r in 0..self.rows {
            for c in 0..self.cols {
                write!(f, "{}", self.at(r, c))?;
                if c + 1 < self.cols {
                    write!(f, " ")?;
                }
            }
            if r + 1 < self.rows {
                write!(f, "; ")?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let m = Matrix::new(2, 3).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert!(m.is_zero());

        let ones = Matrix::ones(3, 2).unwrap();
        assert_eq!(ones.sum(), 6.0);

        let eye = Matrix::identity(4).unwrap();
        assert_eq!(eye.get(2, 2), Ok(1.0));
        assert_eq!(eye.get(2, 1), Ok(0.0));

        let d = Matrix::diagonal(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(d.get(1, 1), Ok(2.0));
        assert_eq!(d.sum(), 6.0);

        let m = Matrix::from_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), Ok(3.0));
        assert_eq!(
            Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap(),
            m
        );
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(matches!(
            Matrix::from_slice(2, 2, &[1.0, 2.0, 3.0]),
            Err(MatrixError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn capacity_is_enforced() {
        assert_eq!(
            Matrix::zeros(9, 9),
            Err(MatrixError::CapacityExceeded { rows: 9, cols: 9 })
        );
        assert!(Matrix::zeros(8, 8).is_ok());
        assert!(Matrix::zeros(1, MAX_ELEMENTS).is_ok());
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut m = Matrix::zeros(3, 3).unwrap();
        assert_eq!(
            m.get(3, 0),
            Err(MatrixError::IndexOutOfRange {
                row: 3,
                col: 0,
                rows: 3,
                cols: 3
            })
        );
        assert!(m.set(0, 5, 1.0).is_err());
        assert!(m.set(2, 2, 1.0).is_ok());
        assert_eq!(m.get(2, 2), Ok(1.0));
    }

    #[test]
    fn resize_keeps_top_left_block() {
        let mut m = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        m.resize(3, 3).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert_eq!(m.get(1, 1), Ok(4.0));
        assert_eq!(m.get(2, 2), Ok(0.0));

        m.resize(1, 2).unwrap();
        assert_eq!(m.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn blocks_rows_and_columns() {
        let m = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]).unwrap();
        assert_eq!(m.row(1).unwrap().as_slice(), &[4.0, 5.0, 6.0]);
        assert_eq!(m.column(2).unwrap().as_slice(), &[3.0, 6.0, 9.0]);
        assert_eq!(m.block(1, 1, 2, 2).unwrap().as_slice(), &[5.0, 6.0, 8.0, 9.0]);
        assert!(m.block(2, 2, 2, 2).is_err());

        let mut target = Matrix::zeros(4, 4).unwrap();
        target.set_block(2, 1, &m.block(0, 0, 2, 2).unwrap()).unwrap();
        assert_eq!(target.get(3, 2), Ok(5.0));
        assert!(target.set_block(3, 3, &m).is_err());
    }

    #[test]
    fn huge_block_offsets_are_out_of_range() {
        let m = Matrix::identity(2).unwrap();
        assert!(matches!(
            m.block(usize::MAX, 0, 2, 1),
            Err(MatrixError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            m.block(0, 1, 1, usize::MAX),
            Err(MatrixError::IndexOutOfRange { .. })
        ));

        let mut target = Matrix::zeros(3, 3).unwrap();
        assert!(matches!(
            target.set_block(usize::MAX, 0, &m),
            Err(MatrixError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            target.set_block(0, usize::MAX, &m),
            Err(MatrixError::DimensionMismatch { .. })
        ));
        assert!(target.is_zero());
    }

    #[test]
    fn display_uses_matlab_layout() {
        let m = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.5]]).unwrap();
        assert_eq!(format!("{m}"), "[1 2; 3 4.5]");
    }
}
