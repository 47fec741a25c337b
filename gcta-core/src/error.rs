//! Typed errors raised by the statistical pipelines.
//!
//! Every variant is fatal to the current run; the CLI reports it and
//! exits nonzero. File-format and missing-file errors surface from
//! gcta-geno as `anyhow` errors with path/line context.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Duplicated SNP ID found: {0}")]
    DuplicateSnp(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Not enough SNPs {stage}: {found} found, at least {required} required")]
    InsufficientSnps {
        stage: &'static str,
        found: usize,
        required: usize,
    },

    #[error("The variance-covariance matrix of bxy is not invertible")]
    SingularCovariance,

    #[error("Singular normal equations in the weighted least-squares fit")]
    SingularNormalEquations,

    #[error(
        "The number of relatives is not large enough for the fastFAM analysis \
         (HE regression p = {pval:.4})"
    )]
    InsufficientRelatedness { pval: f64 },

    #[error("Negative SNP heritability estimate for {trait_name} ({value:.4})")]
    NegativeHeritability { trait_name: String, value: f64 },
}
