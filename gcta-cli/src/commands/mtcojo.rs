//! mtCOJO subcommand.
//!
//! gcta-rs mtcojo --mtcojo-file traits.list --bfile ref_panel \
//!     --ref-ld-chr eur_w_ld_chr/ --w-ld-chr eur_w_ld_chr/ --out result

use anyhow::Result;
use clap::Args;
use tracing::info;

use gcta_core::gsmr::GsmrParams;
use gcta_core::mtcojo::{run_mtcojo, MtcojoOptions};
use gcta_geno::phenotype::read_id_list;
use gcta_geno::plink::PlinkReader;
use gcta_geno::traits::GenotypeReader;

#[derive(Args)]
pub struct MtcojoArgs {
    /// Metafile list: line 1 the target trait, following lines the
    /// covariate traits (name, COJO summary file, optional prevalences)
    #[arg(long)]
    mtcojo_file: String,

    /// PLINK prefix of the reference genotype panel (bed/bim/fam)
    #[arg(long)]
    bfile: String,

    /// Directory prefix of the reference LD score tiles
    #[arg(long)]
    ref_ld_chr: String,

    /// Directory prefix of the regression-weight LD score tiles
    #[arg(long)]
    w_ld_chr: String,

    /// Output prefix
    #[arg(long)]
    out: String,

    /// Genome-wide significance threshold for instrument selection
    #[arg(long, default_value = "5e-8")]
    gwas_thresh: f64,

    /// Clumping index p-value threshold
    #[arg(long, default_value = "5e-8")]
    clump_p1: f64,

    /// Clumping window half-width in kb
    #[arg(long, default_value = "1000")]
    clump_kb: u32,

    /// Clumping r2 threshold
    #[arg(long, default_value = "0.05")]
    clump_r2: f64,

    /// HEIDI-outlier p-value threshold
    #[arg(long, default_value = "0.01")]
    heidi_thresh: f64,

    /// FDR threshold for the LD-r sparsification
    #[arg(long, default_value = "0.05")]
    ld_fdr_thresh: f64,

    /// Minimum number of instruments for the GSMR estimate
    #[arg(long, default_value = "10")]
    nsnp_gsmr: usize,

    /// Minimum number of instruments for the HEIDI-outlier test
    #[arg(long, default_value = "10")]
    nsnp_heidi: usize,

    /// Keep only these individuals of the reference panel (FID IID file)
    #[arg(long)]
    keep: Option<String>,

    /// Remove these individuals from the reference panel (FID IID file)
    #[arg(long)]
    remove: Option<String>,
}

pub fn run(args: MtcojoArgs) -> Result<()> {
    info!("=== mtCOJO analysis ===");

    let mut reader = PlinkReader::new(&args.bfile)?;
    info!(
        "Reference panel: {} markers x {} samples",
        reader.n_markers(),
        reader.n_samples()
    );

    if args.keep.is_some() || args.remove.is_some() {
        let keep = match &args.keep {
            Some(path) => Some(read_id_list(path)?),
            None => None,
        };
        let remove = match &args.remove {
            Some(path) => Some(read_id_list(path)?),
            None => None,
        };
        let ids = reader.sample_ids().to_vec();
        let kept = gcta_geno::phenotype::apply_keep_remove(&ids, keep.as_deref(), remove.as_deref());
        let kept_ids: Vec<String> = kept.iter().map(|&i| ids[i].clone()).collect();
        reader.set_sample_subset(&kept_ids)?;
        info!("{} reference-panel samples after keep/remove", reader.n_samples());
    }

    let options = MtcojoOptions {
        mtcojo_file: args.mtcojo_file,
        ref_ld_dir: args.ref_ld_chr,
        w_ld_dir: args.w_ld_chr,
        out: args.out,
        gwas_thresh: args.gwas_thresh,
        gsmr: GsmrParams {
            clump_p1: args.clump_p1,
            clump_wind_kb: args.clump_kb,
            clump_r2: args.clump_r2,
            heidi_thresh: args.heidi_thresh,
            ld_fdr_thresh: args.ld_fdr_thresh,
            nsnp_gsmr: args.nsnp_gsmr,
            nsnp_heidi: args.nsnp_heidi,
        },
    };

    run_mtcojo(&reader, &options)
}
