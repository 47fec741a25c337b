//! fastFAM subcommand.
//!
//! gcta-rs fast-fam --bfile cohort --grm-sparse cohort_sp \
//!     --pheno pheno.txt --qcovar covar.txt --out result

use anyhow::Result;
use clap::Args;
use tracing::info;

use gcta_core::fastfam::{run_fastfam, FastFamOptions};
use gcta_geno::plink::PlinkReader;
use gcta_geno::traits::GenotypeReader;

#[derive(Args)]
pub struct FastFamArgs {
    /// PLINK prefix of the study genotypes (bed/bim/fam)
    #[arg(long)]
    bfile: String,

    /// Prefix of the sparse GRM (.grm.id/.grm.sp)
    #[arg(long)]
    grm_sparse: String,

    /// Phenotype file (FID IID value...); defaults to the .fam phenotype
    #[arg(long)]
    pheno: Option<String>,

    /// 1-based phenotype column of --pheno
    #[arg(long, default_value = "1")]
    mpheno: usize,

    /// Quantitative covariate file (FID IID value...)
    #[arg(long)]
    qcovar: Option<String>,

    /// Keep only these individuals (FID IID file)
    #[arg(long)]
    keep: Option<String>,

    /// Remove these individuals (FID IID file)
    #[arg(long)]
    remove: Option<String>,

    /// Fixed variance components VG and VR, skipping the HE regression
    #[arg(long, num_args = 2, value_names = ["VG", "VR"])]
    ge: Option<Vec<f64>>,

    /// Output prefix
    #[arg(long)]
    out: String,
}

pub fn run(args: FastFamArgs) -> Result<()> {
    info!("=== fastFAM analysis ===");

    let mut reader = PlinkReader::new(&args.bfile)?;
    info!(
        "Genotype file: {} markers x {} samples",
        reader.n_markers(),
        reader.n_samples()
    );

    let ge = args.ge.as_ref().map(|v| (v[0], v[1]));
    let options = FastFamOptions {
        grm_prefix: args.grm_sparse,
        pheno_file: args.pheno,
        mpheno: args.mpheno,
        qcovar_file: args.qcovar,
        keep_file: args.keep,
        remove_file: args.remove,
        ge,
        out: args.out,
    };

    run_fastfam(&mut reader, &options)
}
