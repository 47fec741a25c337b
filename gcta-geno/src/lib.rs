//! gcta-geno: File readers for gcta-rs
//!
//! PLINK bed/bim/fam genotypes, sparse GRM files (.grm.id/.grm.sp),
//! GCTA-format phenotype/covariate/ID lists, COJO summary statistics with
//! the mtCOJO metafile list, and LD-score tiles.

pub mod traits;
pub mod plink;
pub mod sparse_grm;
pub mod phenotype;
pub mod cojo;
pub mod ldscore;
