//! gcta-rs: a Rust implementation of GCTA's mtCOJO and fastFAM analyses.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gcta-rs",
    version,
    about = "mtCOJO and fastFAM analyses over GWAS summary and genotype data",
    long_about = "A Rust implementation of GCTA's mtCOJO (multi-trait conditional & joint\n\
                  analysis of GWAS summary statistics) and fastFAM (sparse-GRM mixed-model\n\
                  association scan)."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Condition a target trait's summary statistics on covariate traits
    Mtcojo(commands::mtcojo::MtcojoArgs),

    /// Mixed-model association scan with a sparse GRM
    FastFam(commands::fast_fam::FastFamArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("gcta-rs v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} thread(s)", cli.threads);

    match cli.command {
        Commands::Mtcojo(args) => commands::mtcojo::run(args),
        Commands::FastFam(args) => commands::fast_fam::run(args),
    }
}
