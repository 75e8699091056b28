//! Sparse assembly of constraint Jacobians.
//!
//! Direct and simplex-style solvers need the explicit constraint matrix.
//! Constraints paste their raw Jacobian blocks into a [`SparseAssembler`] at
//! the row (or column, for the transpose) they were enumerated at, with the
//! other index taken from each block's session offset.
//!
//! # Sparsity Pattern
//!
//! For a system with M scalar constraints over blocks of total dimension N,
//! `Cq` is M x N. A two-body constraint between rigid bodies has at most 12
//! non-zeros in its row.
//!
//! # Paste Semantics
//!
//! Writes overwrite: pasting twice at the same position keeps the last
//! value, and pasting a value at or below the drop tolerance removes the
//! entry. Export to CSR sorts entries by `(row, col)`, so results do not
//! depend on paste order.

use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{LcpError, Result};

/// Accumulates entries of a sparse matrix with overwrite semantics.
#[derive(Debug, Clone)]
pub struct SparseAssembler {
    entries: HashMap<(usize, usize), f64>,
    num_rows: usize,
    num_cols: usize,
    drop_tolerance: f64,
}

impl SparseAssembler {
    /// Create an empty `num_rows` x `num_cols` matrix.
    #[must_use]
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        // ~12 non-zeros per two-body constraint row
        Self {
            entries: HashMap::with_capacity(num_rows.min(num_cols) * 12),
            num_rows,
            num_cols,
            drop_tolerance: 0.0,
        }
    }

    /// Set the magnitude at or below which values are not stored.
    #[must_use]
    pub fn with_drop_tolerance(mut self, tolerance: f64) -> Self {
        self.drop_tolerance = tolerance.max(0.0);
        self
    }

    /// Get the number of rows.
    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.num_rows
    }

    /// Get the number of columns.
    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.num_cols
    }

    /// Get the number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Remove every entry, keeping the shape.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every entry and change the shape.
    pub fn reset(&mut self, num_rows: usize, num_cols: usize) {
        self.entries.clear();
        self.num_rows = num_rows;
        self.num_cols = num_cols;
    }

    /// Fail unless the `rows` x `cols` block at `(row, col)` fits.
    pub fn check_span(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<()> {
        let fits = |start: usize, len: usize, limit: usize| {
            len == 0 || start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if fits(row, rows, self.num_rows) && fits(col, cols, self.num_cols) {
            Ok(())
        } else {
            Err(LcpError::AssemblyOutOfBounds {
                row: row.saturating_add(rows.saturating_sub(1)),
                col: col.saturating_add(cols.saturating_sub(1)),
                rows: self.num_rows,
                cols: self.num_cols,
            })
        }
    }

    /// Write a single entry.
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        self.check_span(row, col, 1, 1)?;
        self.store(row, col, value);
        Ok(())
    }

    /// Read an entry (zero if not stored).
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    /// Write `values` along `row`, starting at column `col`.
    pub fn paste_row(&mut self, row: usize, col: usize, values: &[f64]) -> Result<()> {
        self.check_span(row, col, 1, values.len())?;
        for (j, &v) in values.iter().enumerate() {
            self.store(row, col + j, v);
        }
        Ok(())
    }

    /// Write `values` down `col`, starting at row `row`.
    pub fn paste_transposed(&mut self, row: usize, col: usize, values: &[f64]) -> Result<()> {
        self.check_span(row, col, values.len(), 1)?;
        for (i, &v) in values.iter().enumerate() {
            self.store(row + i, col, v);
        }
        Ok(())
    }

    fn store(&mut self, row: usize, col: usize, value: f64) {
        if value.abs() <= self.drop_tolerance {
            self.entries.remove(&(row, col));
        } else {
            self.entries.insert((row, col), value);
        }
    }

    /// Stored entries sorted by `(row, col)`.
    #[must_use]
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut triplets: Vec<_> = self
            .entries
            .iter()
            .map(|(&(r, c), &v)| (r, c, v))
            .collect();
        triplets.sort_unstable_by_key(|&(r, c, _)| (r, c));
        triplets
    }

    /// Export in coordinate format.
    #[must_use]
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let mut coo = CooMatrix::new(self.num_rows, self.num_cols);
        for (row, col, val) in self.triplets() {
            coo.push(row, col, val);
        }
        coo
    }

    /// Export in CSR format.
    #[must_use]
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        tracing::debug!(
            rows = self.num_rows,
            cols = self.num_cols,
            nnz = self.entries.len(),
            "assembled sparse matrix"
        );
        CsrMatrix::from(&self.to_coo())
    }

    /// Convert to dense matrix (for testing or small systems).
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.num_rows, self.num_cols);
        for (&(row, col), &val) in &self.entries {
            dense[(row, col)] = val;
        }
        dense
    }

    /// Compute `A * v`.
    pub fn mul_vec(&self, v: &DVector<f64>) -> Result<DVector<f64>> {
        if v.len() < self.num_cols {
            return Err(LcpError::VectorTooShort {
                required: self.num_cols,
                actual: v.len(),
            });
        }
        let mut result = DVector::zeros(self.num_rows);

        // CSR format allows efficient row-wise iteration
        let csr = self.to_csr();
        for (row_idx, row) in csr.row_iter().enumerate() {
            let mut sum = 0.0;
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                sum += val * v[col_idx];
            }
            result[row_idx] = sum;
        }

        Ok(result)
    }

    /// Compute `A^T * v`.
    pub fn mul_transpose_vec(&self, v: &DVector<f64>) -> Result<DVector<f64>> {
        if v.len() < self.num_rows {
            return Err(LcpError::VectorTooShort {
                required: self.num_rows,
                actual: v.len(),
            });
        }
        let mut result = DVector::zeros(self.num_cols);

        // For CSR, transpose multiply requires column-wise accumulation
        let csr = self.to_csr();
        for (row_idx, row) in csr.row_iter().enumerate() {
            let v_row = v[row_idx];
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                result[col_idx] += val * v_row;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_paste_overwrites() {
        let mut m = SparseAssembler::new(2, 3);
        m.set(0, 1, 2.0).unwrap();
        m.set(0, 1, 5.0).unwrap();
        assert_relative_eq!(m.get(0, 1), 5.0);
        assert_eq!(m.nnz(), 1);

        // Zero removes the entry
        m.set(0, 1, 0.0).unwrap();
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn test_paste_row_and_transposed() {
        let mut m = SparseAssembler::new(3, 4);
        m.paste_row(1, 1, &[1.0, 0.0, -1.0]).unwrap();
        m.paste_transposed(0, 0, &[7.0, 8.0]).unwrap();

        let dense = m.to_dense();
        assert_relative_eq!(dense[(1, 1)], 1.0);
        assert_relative_eq!(dense[(1, 3)], -1.0);
        assert_relative_eq!(dense[(0, 0)], 7.0);
        assert_relative_eq!(dense[(1, 0)], 8.0);
        assert_eq!(m.nnz(), 4);
    }

    #[test]
    fn test_out_of_bounds_writes_nothing() {
        let mut m = SparseAssembler::new(2, 2);
        let err = m.paste_row(0, 1, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, LcpError::AssemblyOutOfBounds { .. }));
        assert_eq!(m.nnz(), 0);

        assert!(m.paste_transposed(2, 0, &[1.0]).is_err());
        assert!(m.paste_row(0, 0, &[]).is_ok());
    }

    #[test]
    fn test_drop_tolerance() {
        let mut m = SparseAssembler::new(1, 3).with_drop_tolerance(1e-9);
        m.paste_row(0, 0, &[1e-12, 1.0, -1e-10]).unwrap();
        assert_eq!(m.nnz(), 1);
    }

    #[test]
    fn test_csr_export_is_sorted() {
        let mut m = SparseAssembler::new(2, 3);
        m.set(1, 2, 4.0).unwrap();
        m.set(0, 2, 3.0).unwrap();
        m.set(0, 0, 1.0).unwrap();

        let csr = m.to_csr();
        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.row_offsets(), &[0, 2, 3]);
        assert_eq!(csr.col_indices(), &[0, 2, 2]);
        assert_eq!(csr.values(), &[1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mul_vec() {
        let mut m = SparseAssembler::new(2, 2);
        m.paste_row(0, 0, &[1.0, 2.0]).unwrap();
        m.paste_row(1, 0, &[3.0, 4.0]).unwrap();
        let v = DVector::from_vec(vec![1.0, 2.0]);

        // [1 2] [1]   [5]
        // [3 4] [2] = [11]
        let result = m.mul_vec(&v).unwrap();
        assert_relative_eq!(result[0], 5.0, epsilon = 1e-10);
        assert_relative_eq!(result[1], 11.0, epsilon = 1e-10);

        // [1 3] [1]   [7]
        // [2 4] [2] = [10]
        let result = m.mul_transpose_vec(&v).unwrap();
        assert_relative_eq!(result[0], 7.0, epsilon = 1e-10);
        assert_relative_eq!(result[1], 10.0, epsilon = 1e-10);

        assert!(m.mul_vec(&DVector::zeros(1)).is_err());
    }

    #[test]
    fn test_reset() {
        let mut m = SparseAssembler::new(1, 1);
        m.set(0, 0, 1.0).unwrap();
        m.reset(3, 3);
        assert_eq!(m.nnz(), 0);
        assert_eq!((m.nrows(), m.ncols()), (3, 3));
        assert!(m.set(2, 2, 1.0).is_ok());
    }
}
