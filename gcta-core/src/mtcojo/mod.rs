//! mtCOJO: multi-trait conditional and joint analysis.
//!
//! Drives the whole summary-statistics pipeline: metafile reading, the
//! SNP registry lifecycle, QC/harmonization, the per-covariate GSMR
//! estimates, LD score regression, and the closed-form conditional
//! adjustment of the target trait, written to `<out>.mtcojo.cma`.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::info;

use gcta_geno::cojo::{read_cojo_file, read_cojo_snp_names, read_metafile_list};
use gcta_geno::traits::GenotypeReader;
use gcta_linalg::{DenseMatrix, LdltDecomp};

use crate::error::CoreError;
use crate::gsmr::{gsmr_estimate, GsmrInputs, GsmrParams};
use crate::ldsc::ldsc_matrices;
use crate::meta::qc::harmonize_and_filter;
use crate::meta::registry::{check_duplicates, SnpRegistry};
use crate::meta::summary::GwasData;
use crate::util::stats::chisq_pval;

#[derive(Debug, Clone)]
pub struct MtcojoOptions {
    /// Metafile list naming the target and covariate traits.
    pub mtcojo_file: String,
    /// Reference LD score directory prefix.
    pub ref_ld_dir: String,
    /// Regression-weight LD score directory prefix.
    pub w_ld_dir: String,
    /// Output prefix.
    pub out: String,
    /// Genome-wide significance threshold for instrument selection.
    pub gwas_thresh: f64,
    pub gsmr: GsmrParams,
}

/// Conditional estimate for one SNP.
struct CondEstimate {
    bc: f64,
    se: f64,
    pval: f64,
}

/// Single-covariate adjustment: bC = bzy - bzx*bxy with the sampling
/// covariance supplied by the LDSC cross-trait intercept.
fn cond_single_covar(
    bzy: &[f64],
    bzy_se: &[f64],
    bzx: &[f64],
    bzx_se: &[f64],
    bxy: f64,
    intercept_xy: f64,
) -> Vec<CondEstimate> {
    let mut out = Vec::with_capacity(bzy.len());
    for i in 0..bzy.len() {
        let bc = bzy[i] - bzx[i] * bxy;
        let var_bzx = bxy * bxy * bzx_se[i] * bzx_se[i];
        let cov_bzx_bzy = bxy * intercept_xy * bzx_se[i] * bzy_se[i];
        let se = (bzy_se[i] * bzy_se[i] + var_bzx - 2.0 * cov_bzx_bzy).sqrt();
        let pval = chisq_pval(bc * bc / (se * se));
        out.push(CondEstimate { bc, se, pval });
    }
    out
}

/// Multi-covariate adjustment. Marginal bxy estimates are converted to
/// joint effects through the genetic-correlation structure,
/// bjxy = D^-1 R^-1 (D bxy), then each SNP's target effect is adjusted
/// by the joint contribution of all covariates.
#[allow(clippy::too_many_arguments)]
fn cond_multiple_covars(
    bzy: &[f64],
    bzy_se: &[f64],
    bzx: &DenseMatrix,
    bzx_se: &DenseMatrix,
    bxy: &[f64],
    ldsc_intercept: &DenseMatrix,
    ldsc_slope: &DenseMatrix,
    vp: &[f64],
) -> Result<Vec<CondEstimate>> {
    let ncovar = bxy.len();

    let mut d_diag = vec![0.0; ncovar];
    let mut r_mat = DenseMatrix::identity(ncovar);
    for i in 0..ncovar {
        d_diag[i] = (ldsc_slope.get(i + 1, i + 1) * vp[i + 1]).sqrt();
        for j in (i + 1)..ncovar {
            let rg = ldsc_slope.get(i + 1, j + 1);
            r_mat.set(i, j, rg);
            r_mat.set(j, i, rg);
        }
    }

    let d_bxy: Vec<f64> = (0..ncovar).map(|i| d_diag[i] * bxy[i]).collect();
    let r_solved = LdltDecomp::new(&r_mat)
        .map_err(|_| CoreError::SingularNormalEquations)?
        .solve(&d_bxy);
    let bjxy: Vec<f64> = (0..ncovar).map(|i| r_solved[i] / d_diag[i]).collect();

    let mut r_intercept = DenseMatrix::identity(ncovar);
    for i in 0..ncovar {
        for j in (i + 1)..ncovar {
            let v = ldsc_intercept.get(i + 1, j + 1);
            r_intercept.set(i, j, v);
            r_intercept.set(j, i, v);
        }
    }

    let nsnp = bzy.len();
    let mut out = Vec::with_capacity(nsnp);
    for i in 0..nsnp {
        let mut adjustment = 0.0;
        let mut cov_bzx_bzy = 0.0;
        let mut scaled = vec![0.0; ncovar];
        for j in 0..ncovar {
            adjustment += bzx.get(i, j) * bjxy[j];
            cov_bzx_bzy +=
                bzx_se.get(i, j) * bzy_se[i] * bjxy[j] * ldsc_intercept.get(0, j + 1);
            scaled[j] = bzx_se.get(i, j) * bjxy[j];
        }
        let var_bzx = r_intercept.quad_form(&scaled);
        let bc = bzy[i] - adjustment;
        let se = (bzy_se[i] * bzy_se[i] + var_bzx - 2.0 * cov_bzx_bzy).sqrt();
        let pval = chisq_pval(bc * bc / (se * se));
        out.push(CondEstimate { bc, se, pval });
    }
    Ok(out)
}

/// Run the full mtCOJO analysis against a reference genotype panel.
pub fn run_mtcojo(reader: &dyn GenotypeReader, options: &MtcojoOptions) -> Result<()> {
    info!("Reading GWAS SNPs from [{}] ...", options.mtcojo_file);
    let meta = read_metafile_list(&options.mtcojo_file)?;
    let ncovar = meta.covariates.len();
    let ntrait = ncovar + 1;

    // registry: first covariate seeds it, every other trait intersects
    let first_names = read_cojo_snp_names(&meta.covariates[0].file, None)?;
    let mut registry = SnpRegistry::new(first_names)?;
    for cov in &meta.covariates[1..] {
        let names = read_cojo_snp_names(&cov.file, None)?;
        check_duplicates(&names)?;
        registry.intersect_keep(&names);
    }
    let target_names = read_cojo_snp_names(&meta.target.file, None)?;
    check_duplicates(&target_names)?;
    registry.intersect_keep(&target_names);
    registry.compact();
    info!(
        "{} SNPs in common between the target trait and the covariate trait(s)",
        registry.len()
    );
    if registry.is_empty() {
        bail!("No SNPs in common between the target and covariate traits");
    }

    // per-trait summary arrays
    info!(
        "Reading GWAS summary-level statistics of {} trait(s) ...",
        ntrait
    );
    let mut data = GwasData::new(ntrait, registry.len());
    data.fill_trait(
        0,
        &meta.target.name,
        &read_cojo_file(&meta.target.file)?,
        &registry,
    )?;
    for (i, cov) in meta.covariates.iter().enumerate() {
        data.fill_trait(i + 1, &cov.name, &read_cojo_file(&cov.file)?, &registry)?;
    }

    // reference panel: allele orientations and the marker include list
    let mut ref_alleles = HashMap::new();
    let mut include = Vec::new();
    for m in 0..reader.n_markers() {
        let info = reader.marker_info(m)?;
        if registry.index_of(&info.id).is_some() {
            ref_alleles.insert(info.id.clone(), (info.allele1, info.allele2));
            include.push(m);
        }
    }

    // QC
    info!("Filtering out SNPs with multiple alleles or missing values ...");
    let badsnps = harmonize_and_filter(&mut data, &registry, &ref_alleles, Some(&options.out))?;
    if !badsnps.is_empty() {
        registry.intersect_remove(&badsnps);
    }
    if registry.n_remain() == 0 {
        bail!("No SNPs are retained after filtering");
    }
    info!("{} SNPs are retained after filtering", registry.n_remain());

    // keep only instrument candidates in the reference panel
    let pval_thresh = options.gwas_thresh.min(options.gsmr.clump_p1);
    let mut kept_names = HashSet::new();
    for &row in registry.remain() {
        for t in 1..ntrait {
            if data.valid[t][row] && data.pval[t][row] < pval_thresh {
                kept_names.insert(registry.name(row).to_string());
                break;
            }
        }
    }
    if kept_names.len() < options.gsmr.nsnp_gsmr {
        return Err(CoreError::InsufficientSnps {
            stage: "for the mtCOJO analysis",
            found: kept_names.len(),
            required: options.gsmr.nsnp_gsmr,
        }
        .into());
    }
    include.retain(|&m| {
        reader
            .marker_info(m)
            .map(|info| kept_names.contains(&info.id))
            .unwrap_or(false)
    });
    info!(
        "{} significant SNPs in common with those in the reference sample",
        include.len()
    );

    // GSMR per covariate
    let mut bxy_est = vec![0.0; ncovar];
    for i in 1..ntrait {
        info!(
            "GSMR analysis for covariate #{} [{}] ...",
            i,
            meta.covariates[i - 1].name
        );
        let flags: Vec<bool> = (0..registry.len())
            .map(|row| data.pair_valid(0, i, row))
            .collect();
        let inputs = GsmrInputs {
            bzx: &data.beta[i],
            bzx_se: &data.se[i],
            bzx_pval: &data.pval[i],
            bzy: &data.beta[0],
            bzy_se: &data.se[0],
            flags: &flags,
        };
        let result = gsmr_estimate(reader, &include, &registry, &inputs, &options.gsmr)?;
        info!(
            "bxy = {:.4}, se = {:.4}, p = {:.3e} ({} instruments)",
            result.bxy, result.se, result.pval, result.n_snps
        );
        bxy_est[i - 1] = result.bxy;
    }

    // LDSC intercept and slope matrices
    let trait_names: Vec<String> = meta.traits().map(|t| t.name.clone()).collect();
    let prevalences: Vec<(Option<f64>, Option<f64>)> = meta
        .traits()
        .map(|t| (t.sample_prev, t.pop_prev))
        .collect();
    let (ldsc_intercept, ldsc_slope) = ldsc_matrices(
        &data,
        &registry,
        &trait_names,
        &prevalences,
        &options.ref_ld_dir,
        &options.w_ld_dir,
    )?;

    // restrict to SNPs observed in every trait
    let common: Vec<String> = registry
        .remain()
        .iter()
        .filter(|&&row| (0..ntrait).all(|t| data.valid[t][row]))
        .map(|&row| registry.name(row).to_string())
        .collect();
    registry.intersect_keep(&common);
    let nsnp = registry.n_remain();
    info!("mtCOJO analysis to adjust the target trait ...");
    info!("{} SNPs in common across all the traits", nsnp);

    let rows: Vec<usize> = registry.remain().to_vec();
    let bzy: Vec<f64> = rows.iter().map(|&r| data.beta[0][r]).collect();
    let bzy_se: Vec<f64> = rows.iter().map(|&r| data.se[0][r]).collect();
    let estimates = if ncovar == 1 {
        let bzx: Vec<f64> = rows.iter().map(|&r| data.beta[1][r]).collect();
        let bzx_se: Vec<f64> = rows.iter().map(|&r| data.se[1][r]).collect();
        cond_single_covar(
            &bzy,
            &bzy_se,
            &bzx,
            &bzx_se,
            bxy_est[0],
            ldsc_intercept.get(0, 1),
        )
    } else {
        let mut bzx = DenseMatrix::zeros(nsnp, ncovar);
        let mut bzx_se = DenseMatrix::zeros(nsnp, ncovar);
        for (i, &r) in rows.iter().enumerate() {
            for j in 0..ncovar {
                bzx.set(i, j, data.beta[j + 1][r]);
                bzx_se.set(i, j, data.se[j + 1][r]);
            }
        }
        cond_multiple_covars(
            &bzy,
            &bzy_se,
            &bzx,
            &bzx_se,
            &bxy_est,
            &ldsc_intercept,
            &ldsc_slope,
            &data.vp,
        )?
    };

    // output
    let out_path = format!("{}.mtcojo.cma", options.out);
    info!(
        "Saving the mtCOJO results of {} SNPs to [{}] ...",
        nsnp, out_path
    );
    let mut file = std::fs::File::create(&out_path)
        .with_context(|| format!("Cannot open the file [{}] to write", out_path))?;
    writeln!(file, "SNP\tA1\tA2\tfreq\tb\tse\tp\tN\tbC\tbC_se\tbC_pval")?;
    for (i, &r) in rows.iter().enumerate() {
        writeln!(
            file,
            "{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}\t{}\t{:.6}\t{:.6}\t{:.6e}",
            registry.name(r),
            data.a1[0][r],
            data.a2[0][r],
            data.freq[0][r],
            data.beta[0][r],
            data.se[0][r],
            data.pval[0][r],
            data.n[0][r],
            estimates[i].bc,
            estimates[i].se,
            estimates[i].pval,
        )?;
    }
    info!("mtCOJO analysis completed");
    Ok(())
}
