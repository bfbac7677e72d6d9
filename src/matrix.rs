//! Immutable rectangular matrices of `f64`.

use std::{fmt, sync::Arc};

/// An immutable, rectangular matrix of `f64` values.
///
/// Elements are stored contiguously in row-major order behind an [`Arc`], so cloning a [`Matrix`]
/// is cheap and worker threads can read the same storage concurrently without locking.
///
/// A [`Matrix`] always has at least one row. Rows may be empty (zero columns), but they all have
/// the same length; ragged input is rejected at construction.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Arc<[f64]>,
}

impl Matrix {
    /// Creates a matrix from a list of rows.
    ///
    /// Fails if `rows` is empty or if not all rows have the same length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let first = rows.first().ok_or(MatrixError::NoRows)?;
        let cols = first.as_ref().len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(MatrixError::Ragged {
                    row: index,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: data.into(),
        })
    }

    /// Creates a `rows` × `cols` matrix by calling `f(row, col)` for every element.
    ///
    /// # Panics
    ///
    /// This method will panic if `rows` is 0.
    pub fn from_fn<F: FnMut(usize, usize) -> f64>(rows: usize, cols: usize, mut f: F) -> Self {
        assert_ne!(rows, 0, "a matrix must have at least one row");
        let data = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| f(r, c))
            .collect();
        Self { rows, cols, data }
    }

    /// Creates a `rows` × `cols` matrix with every element set to `value`.
    ///
    /// # Panics
    ///
    /// This method will panic if `rows` is 0.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_fn(rows, cols, |_, _| value)
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns, which is the length of every row.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns row `index`, or [`None`] if it is out of bounds.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    /// Returns the element at `row`, `col`, or [`None`] if either is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.cols {
            return None;
        }
        self.row(row).map(|r| r[col])
    }

    /// Iterates over the rows of the matrix, in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |r| &self.data[r * self.cols..(r + 1) * self.cols])
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter_rows()).finish()
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = MatrixError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Self::from_rows(&rows)
    }
}

impl<const R: usize, const C: usize> From<[[f64; C]; R]> for Matrix {
    /// # Panics
    ///
    /// Panics if `R` is 0.
    fn from(rows: [[f64; C]; R]) -> Self {
        Self::from_fn(R, C, |r, c| rows[r][c])
    }
}

/// Errors returned when constructing a [`Matrix`] from malformed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatrixError {
    #[error("a matrix must have at least one row")]
    NoRows,
    #[error("row {row} has {found} columns, but the matrix has {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_is_row_major() {
        let m = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(m.get(0, 2), Some(3.0));
        assert_eq!(m.get(0, 3), None);
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::try_from(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::Ragged {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn empty_matrix_is_rejected() {
        let rows: Vec<Vec<f64>> = Vec::new();
        assert_eq!(Matrix::try_from(rows).unwrap_err(), MatrixError::NoRows);
    }

    #[test]
    fn zero_columns_are_allowed() {
        let m = Matrix::from_rows(&[[0.0; 0]; 3]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 0);
        assert_eq!(m.iter_rows().count(), 3);
        assert!(m.iter_rows().all(|row| row.is_empty()));
    }

    #[test]
    fn from_array() {
        let m = Matrix::from([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(m, Matrix::from_fn(2, 2, |r, c| (r * 2 + c + 1) as f64));
        assert_eq!(format!("{m:?}"), "[[1.0, 2.0], [3.0, 4.0]]");
    }
}
