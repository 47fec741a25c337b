#![allow(clippy::needless_range_loop)]
//! Sparse matrix operations backed by sprs.
//!
//! Compressed-column storage, the layout sparse GRM files compress to.
//! The variance matrix V = VG*A + VR*I is assembled here and handed to
//! the simplicial LDLT in `decomposition`.

use sprs::{CsMatI, TriMatI};

/// A symmetric-capable sparse matrix in CSC form.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
}

impl SparseMatrix {
    /// Create a sparse matrix from COO triplets. Duplicate entries are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMatI::new((nrows, ncols));
        for i in 0..rows.len() {
            tri.add_triplet(rows[i], cols[i], vals[i]);
        }
        Self {
            inner: tri.to_csc(),
        }
    }

    /// Create a sparse identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut tri = TriMatI::new((n, n));
        for i in 0..n {
            tri.add_triplet(i, i, 1.0);
        }
        Self {
            inner: tri.to_csc(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.inner.rows()
    }

    pub fn ncols(&self) -> usize {
        self.inner.cols()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Get element at (row, col). Returns 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.inner.get(row, col) {
            Some(&v) => v,
            None => 0.0,
        }
    }

    /// Column pointers of the CSC storage (length ncols + 1).
    pub fn col_ptr(&self) -> Vec<usize> {
        let indptr = self.inner.indptr();
        indptr.as_slice().unwrap().to_vec()
    }

    /// Row indices of the CSC storage.
    pub fn row_indices(&self) -> &[usize] {
        self.inner.indices()
    }

    /// Stored values of the CSC storage.
    pub fn values(&self) -> &[f64] {
        self.inner.data()
    }

    /// Sparse matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols());
        let mut result = vec![0.0; self.nrows()];
        let indptr = self.inner.indptr();
        let indptr = indptr.as_slice().unwrap();
        let indices = self.inner.indices();
        let data = self.inner.data();
        for j in 0..self.ncols() {
            let vj = v[j];
            for idx in indptr[j]..indptr[j + 1] {
                result[indices[idx]] += data[idx] * vj;
            }
        }
        result
    }

    /// Extract the diagonal entries.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        (0..n).map(|i| self.get(i, i)).collect()
    }

    /// Compute a*self + b*I for a square matrix. Used to assemble
    /// V = VG*A + VR*I from the sparse GRM.
    pub fn scale_add_identity(&self, a: f64, b: f64) -> SparseMatrix {
        assert_eq!(self.nrows(), self.ncols());
        let scaled = self.inner.map(|v| v * a);
        let eye = SparseMatrix::identity(self.nrows()).inner.map(|v| v * b);
        SparseMatrix {
            inner: &scaled + &eye,
        }
    }

    /// Dump all stored entries as (row, col, value) triplets in column order.
    pub fn to_triplets(&self) -> Vec<(usize, usize, f64)> {
        let indptr = self.inner.indptr();
        let indptr = indptr.as_slice().unwrap();
        let indices = self.inner.indices();
        let data = self.inner.data();
        let mut out = Vec::with_capacity(self.nnz());
        for j in 0..self.ncols() {
            for idx in indptr[j]..indptr[j + 1] {
                out.push((indices[idx], j, data[idx]));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = SparseMatrix::identity(3);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn test_mat_vec() {
        let m =
            SparseMatrix::from_triplets(3, 3, &[0, 1, 2, 0], &[0, 1, 2, 2], &[1.0, 2.0, 3.0, 0.5]);
        let r = m.mat_vec(&[1.0, 1.0, 1.0]);
        assert!((r[0] - 1.5).abs() < 1e-12);
        assert!((r[1] - 2.0).abs() < 1e-12);
        assert!((r[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_add_identity() {
        let a = SparseMatrix::from_triplets(2, 2, &[0, 1, 0, 1], &[0, 1, 1, 0], &[1.0, 1.0, 0.5, 0.5]);
        let v = a.scale_add_identity(2.0, 3.0);
        assert!((v.get(0, 0) - 5.0).abs() < 1e-12);
        assert!((v.get(0, 1) - 1.0).abs() < 1e-12);
        assert!((v.get(1, 0) - 1.0).abs() < 1e-12);
        assert!((v.get(1, 1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_triplet_round_trip() {
        let a = SparseMatrix::from_triplets(
            3,
            3,
            &[0, 1, 2, 1, 0],
            &[0, 1, 2, 0, 1],
            &[1.0, 1.1, 1.2, 0.3, 0.3],
        );
        let trip = a.to_triplets();
        let rows: Vec<usize> = trip.iter().map(|t| t.0).collect();
        let cols: Vec<usize> = trip.iter().map(|t| t.1).collect();
        let vals: Vec<f64> = trip.iter().map(|t| t.2).collect();
        let b = SparseMatrix::from_triplets(3, 3, &rows, &cols, &vals);
        for i in 0..3 {
            for j in 0..3 {
                assert!((a.get(i, j) - b.get(i, j)).abs() < 1e-15);
            }
        }
    }
}
