//! gcta-linalg: Linear algebra for gcta-rs
//!
//! Dense matrix operations backed by faer, sparse matrices backed by sprs,
//! and the factorizations the mtCOJO and fastFAM pipelines rely on:
//! dense Cholesky/LDLT for the small symmetric systems and a simplicial
//! sparse LDLT for the variance matrix V = VG*A + VR*I.

pub mod dense;
pub mod sparse;
pub mod decomposition;

pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
pub use decomposition::{CholeskyDecomp, LdltDecomp, LinalgError, SparseLdlt};
