#![allow(clippy::needless_range_loop)]
//! Matrix factorizations and solvers.
//!
//! Dense Cholesky for symmetric positive definite systems (bxy covariance
//! inversion), dense LDLT without pivoting for symmetric-indefinite systems
//! (IRLS normal equations, covariate conditioning, the D/R solves of the
//! multi-covariate adjustment), and a simplicial sparse LDLT for
//! V = VG*A + VR*I, mirroring Eigen's SimplicialLDLT used by the original.

use crate::dense::DenseMatrix;
use crate::sparse::SparseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Matrix is not positive definite (pivot {pivot} at column {column})")]
    NotPositiveDefinite { column: usize, pivot: f64 },

    #[error("Singular matrix encountered")]
    SingularMatrix,
}

/// Dense Cholesky decomposition A = L * L' of an SPD matrix.
pub struct CholeskyDecomp {
    l: DenseMatrix,
}

impl CholeskyDecomp {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        assert_eq!(n, a.ncols());
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let pivot = a.get(j, j) - sum;
            if pivot <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite { column: j, pivot });
            }
            l.set(j, j, pivot.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }

    /// Inverse of the factored matrix, one unit column at a time.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.l.nrows();
        let mut inv = DenseMatrix::zeros(n, n);
        let mut e = vec![0.0; n];
        for j in 0..n {
            e[j] = 1.0;
            let col = self.solve(&e);
            inv.set_col(j, &col);
            e[j] = 0.0;
        }
        inv
    }
}

/// Dense LDLT decomposition A = L * D * L' of a symmetric matrix,
/// no pivoting. Handles indefinite matrices; fails only on (near-)zero
/// pivots.
pub struct LdltDecomp {
    l: DenseMatrix,
    d: Vec<f64>,
}

impl LdltDecomp {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        assert_eq!(n, a.ncols());
        let mut l = DenseMatrix::identity(n);
        let mut d = vec![0.0; n];

        // scale for the zero-pivot test
        let mut amax = 0.0f64;
        for i in 0..n {
            amax = amax.max(a.get(i, i).abs());
        }
        let tiny = 1e-12 * amax.max(1.0);

        for j in 0..n {
            let mut dj = a.get(j, j);
            for k in 0..j {
                dj -= l.get(j, k) * l.get(j, k) * d[k];
            }
            if dj.abs() < tiny {
                return Err(LinalgError::SingularMatrix);
            }
            d[j] = dj;
            for i in (j + 1)..n {
                let mut s = a.get(i, j);
                for k in 0..j {
                    s -= l.get(i, k) * l.get(j, k) * d[k];
                }
                l.set(i, j, s / dj);
            }
        }

        Ok(LdltDecomp { l, d })
    }

    /// Solve L * D * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.d.len();
        assert_eq!(b.len(), n);

        let mut x = b.to_vec();
        for i in 0..n {
            for j in 0..i {
                x[i] -= self.l.get(i, j) * x[j];
            }
        }
        for i in 0..n {
            x[i] /= self.d[i];
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                x[i] -= self.l.get(j, i) * x[j];
            }
        }
        x
    }
}

/// Solve a symmetric system A*x = b via LDLT.
pub fn solve_sym(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    Ok(LdltDecomp::new(a)?.solve(b))
}

/// Simplicial LDLT factorization of a sparse SPD matrix in CSC form.
///
/// Two passes: a symbolic pass computing the elimination tree and the
/// nonzero count of each column of L, then an up-looking numeric pass.
/// Only the strict upper triangle of the (symmetric) input is referenced.
pub struct SparseLdlt {
    n: usize,
    /// Column pointers of L (strict lower triangle, unit diagonal implicit).
    lp: Vec<usize>,
    /// Row indices of L.
    li: Vec<usize>,
    /// Values of L.
    lx: Vec<f64>,
    /// Diagonal of D.
    d: Vec<f64>,
}

impl SparseLdlt {
    pub fn new(a: &SparseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        assert_eq!(n, a.ncols());
        let ap = a.col_ptr();
        let ai = a.row_indices();
        let ax = a.values();

        // Symbolic: elimination tree and column counts.
        let none = usize::MAX;
        let mut parent = vec![none; n];
        let mut flag = vec![none; n];
        let mut lnz = vec![0usize; n];
        for k in 0..n {
            flag[k] = k;
            for p in ap[k]..ap[k + 1] {
                let mut i = ai[p];
                if i >= k {
                    continue;
                }
                while flag[i] != k {
                    if parent[i] == none {
                        parent[i] = k;
                    }
                    lnz[i] += 1;
                    flag[i] = k;
                    i = parent[i];
                }
            }
        }
        let mut lp = vec![0usize; n + 1];
        for k in 0..n {
            lp[k + 1] = lp[k] + lnz[k];
        }

        // Numeric: up-looking factorization.
        let nz = lp[n];
        let mut li = vec![0usize; nz];
        let mut lx = vec![0.0f64; nz];
        let mut d = vec![0.0f64; n];
        let mut y = vec![0.0f64; n];
        let mut pattern = vec![0usize; n];
        let mut stack = vec![0usize; n];
        let mut filled = vec![0usize; n];
        for f in flag.iter_mut() {
            *f = none;
        }

        for k in 0..n {
            let mut top = n;
            flag[k] = k;
            for p in ap[k]..ap[k + 1] {
                let entry = ai[p];
                if entry > k {
                    continue;
                }
                y[entry] += ax[p];
                let mut i = entry;
                let mut len = 0;
                while flag[i] != k {
                    pattern[len] = i;
                    len += 1;
                    flag[i] = k;
                    i = parent[i];
                }
                while len > 0 {
                    len -= 1;
                    top -= 1;
                    stack[top] = pattern[len];
                }
            }
            d[k] = y[k];
            y[k] = 0.0;
            for s in top..n {
                let i = stack[s];
                let yi = y[i];
                y[i] = 0.0;
                for p in lp[i]..(lp[i] + filled[i]) {
                    y[li[p]] -= lx[p] * yi;
                }
                let lki = yi / d[i];
                d[k] -= lki * yi;
                let slot = lp[i] + filled[i];
                li[slot] = k;
                lx[slot] = lki;
                filled[i] += 1;
            }
            if d[k] <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite {
                    column: k,
                    pivot: d[k],
                });
            }
        }

        Ok(SparseLdlt { n, lp, li, lx, d })
    }

    /// Solve L * D * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        assert_eq!(b.len(), self.n);
        let mut x = b.to_vec();
        for j in 0..self.n {
            let xj = x[j];
            for p in self.lp[j]..self.lp[j + 1] {
                x[self.li[p]] -= self.lx[p] * xj;
            }
        }
        for i in 0..self.n {
            x[i] /= self.d[i];
        }
        for j in (0..self.n).rev() {
            let mut s = x[j];
            for p in self.lp[j]..self.lp[j + 1] {
                s -= self.lx[p] * x[self.li[p]];
            }
            x[j] = s;
        }
        x
    }

    /// Dense inverse of the factored matrix, solving one unit column at
    /// a time. The result is dense even though the factor is sparse.
    pub fn inverse_dense(&self) -> DenseMatrix {
        let mut inv = DenseMatrix::zeros(self.n, self.n);
        let mut e = vec![0.0; self.n];
        for j in 0..self.n {
            e[j] = 1.0;
            let col = self.solve(&e);
            inv.set_col(j, &col);
            e[j] = 0.0;
        }
        inv
    }
}
