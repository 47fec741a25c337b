//! GSMR: generalized summary-data-based Mendelian randomization.
//!
//! Estimates the causal effect bxy of an exposure on an outcome from
//! their summary statistics. Pipeline per exposure: LD clumping of the
//! exposure p-values, redundancy pruning and FDR sparsification of the
//! index-SNP LD matrix, per-SNP bxy with its full covariance, the
//! HEIDI-outlier filter, and a generalized inverse-variance-weighted
//! estimate over the retained instruments.

use anyhow::Result;
use tracing::info;

use gcta_geno::traits::GenotypeReader;
use gcta_linalg::{CholeskyDecomp, DenseMatrix};

use crate::error::CoreError;
use crate::ld::clump::{clump_markers, ClumpParams};
use crate::ld::ld_matrix;
use crate::ld::prune::{fdr_adjust_ld, redundancy_prune};
use crate::meta::registry::SnpRegistry;
use crate::util::stats::{chisq_pval, quantile};

#[derive(Debug, Clone, Copy)]
pub struct GsmrParams {
    /// Clumping index p-value threshold.
    pub clump_p1: f64,
    /// Clumping window half-width in kb.
    pub clump_wind_kb: u32,
    /// Clumping r2 threshold.
    pub clump_r2: f64,
    /// HEIDI-outlier p-value threshold.
    pub heidi_thresh: f64,
    /// FDR threshold for the LD-r sparsification.
    pub ld_fdr_thresh: f64,
    /// Minimum instruments for the GSMR estimate.
    pub nsnp_gsmr: usize,
    /// Minimum instruments for the HEIDI-outlier test.
    pub nsnp_heidi: usize,
}

impl Default for GsmrParams {
    fn default() -> Self {
        Self {
            clump_p1: 5e-8,
            clump_wind_kb: 1000,
            clump_r2: 0.05,
            heidi_thresh: 0.01,
            ld_fdr_thresh: 0.05,
            nsnp_gsmr: 10,
            nsnp_heidi: 10,
        }
    }
}

/// Summary statistics for one exposure/outcome pair, indexed by registry
/// position.
pub struct GsmrInputs<'a> {
    pub bzx: &'a [f64],
    pub bzx_se: &'a [f64],
    pub bzx_pval: &'a [f64],
    pub bzy: &'a [f64],
    pub bzy_se: &'a [f64],
    /// Joint validity of each SNP in both traits.
    pub flags: &'a [bool],
}

#[derive(Debug, Clone)]
pub struct GsmrResult {
    pub bxy: f64,
    pub se: f64,
    pub pval: f64,
    /// Instruments entering the final estimate.
    pub n_snps: usize,
    pub index_snps: Vec<String>,
}

/// Run the full GSMR pipeline for one exposure/outcome pair.
pub fn gsmr_estimate(
    reader: &dyn GenotypeReader,
    include: &[usize],
    registry: &SnpRegistry,
    inputs: &GsmrInputs,
    params: &GsmrParams,
) -> Result<GsmrResult> {
    if include.len() < params.nsnp_gsmr {
        return Err(CoreError::InsufficientSnps {
            stage: "for the GSMR analysis before clumping",
            found: include.len(),
            required: params.nsnp_gsmr,
        }
        .into());
    }

    // clumping on the exposure p-values
    let mut index_snps = clump_markers(
        reader,
        include,
        registry,
        inputs.bzx_pval,
        inputs.flags,
        ClumpParams {
            p1: params.clump_p1,
            wind_kb: params.clump_wind_kb,
            r2: params.clump_r2,
        },
    )?;
    if index_snps.len() < params.nsnp_gsmr {
        return Err(CoreError::InsufficientSnps {
            stage: "after the clumping analysis",
            found: index_snps.len(),
            required: params.nsnp_gsmr,
        }
        .into());
    }

    // LD among index SNPs, then redundancy pruning at sqrt(r2)
    let markers: Vec<usize> = index_snps
        .iter()
        .map(|name| {
            reader
                .marker_index(name)
                .ok_or_else(|| anyhow::anyhow!("Index SNP [{}] not in the reference panel", name))
        })
        .collect::<Result<_>>()?;
    let r_full = ld_matrix(reader, &markers)?;
    let kept = redundancy_prune(&r_full, params.clump_r2.sqrt());
    let n_removed = index_snps.len() - kept.len();
    index_snps = kept.iter().map(|&k| index_snps[k].clone()).collect();
    info!(
        "After LD pruning, {} index SNPs remain ({} removed)",
        index_snps.len(),
        n_removed
    );
    if index_snps.len() < params.nsnp_gsmr {
        return Err(CoreError::InsufficientSnps {
            stage: "after LD pruning",
            found: index_snps.len(),
            required: params.nsnp_gsmr,
        }
        .into());
    }
    if index_snps.len() < params.nsnp_heidi {
        return Err(CoreError::InsufficientSnps {
            stage: "for the HEIDI-outlier analysis",
            found: index_snps.len(),
            required: params.nsnp_heidi,
        }
        .into());
    }

    let k = index_snps.len();
    let mut r_mat = DenseMatrix::identity(k);
    for i in 0..k {
        for j in 0..k {
            r_mat.set(i, j, r_full.get(kept[i], kept[j]));
        }
    }
    fdr_adjust_ld(&mut r_mat, reader.n_samples(), params.ld_fdr_thresh);

    // per-SNP causal estimates and their covariance
    let rows: Vec<usize> = index_snps
        .iter()
        .map(|name| {
            registry
                .index_of(name)
                .ok_or_else(|| anyhow::anyhow!("Index SNP [{}] not in the SNP registry", name))
        })
        .collect::<Result<_>>()?;
    let bxy: Vec<f64> = rows
        .iter()
        .map(|&r| inputs.bzy[r] / inputs.bzx[r])
        .collect();
    let zinv_x: Vec<f64> = rows
        .iter()
        .map(|&r| inputs.bzx_se[r] / inputs.bzx[r])
        .collect();
    let zinv_y: Vec<f64> = rows
        .iter()
        .map(|&r| inputs.bzy_se[r] / inputs.bzx[r])
        .collect();

    let mut cov = DenseMatrix::zeros(k, k);
    for i in 0..k {
        for j in i..k {
            let r = if i == j { 1.0 } else { r_mat.get(i, j) };
            let value =
                r * zinv_y[i] * zinv_y[j] + r * zinv_x[i] * zinv_x[j] * bxy[i] * bxy[j];
            cov.set(i, j, value);
            cov.set(j, i, value);
        }
    }

    // HEIDI-outlier filter
    let pzx: Vec<f64> = rows.iter().map(|&r| inputs.bzx_pval[r]).collect();
    let retained = heidi_outlier(&bxy, &cov, &pzx, params.heidi_thresh);
    info!(
        "{} index SNPs retained after the HEIDI-outlier analysis",
        retained.len()
    );
    if retained.len() < params.nsnp_gsmr {
        return Err(CoreError::InsufficientSnps {
            stage: "after the HEIDI-outlier analysis",
            found: retained.len(),
            required: params.nsnp_gsmr,
        }
        .into());
    }

    // generalized inverse-variance-weighted estimate
    let m = retained.len();
    let mut cov_sub = DenseMatrix::zeros(m, m);
    let mut bxy_sub = vec![0.0; m];
    for i in 0..m {
        bxy_sub[i] = bxy[retained[i]];
        for j in 0..m {
            cov_sub.set(i, j, cov.get(retained[i], retained[j]));
        }
    }
    let cov_inv = CholeskyDecomp::new(&cov_sub)
        .map_err(|_| CoreError::SingularCovariance)?
        .inverse();

    let ones = vec![1.0; m];
    let var = 1.0 / cov_inv.quad_form(&ones);
    let weighted: f64 = cov_inv
        .mat_vec(&bxy_sub)
        .iter()
        .sum();
    let bxy_gsmr = var * weighted;
    let pval = chisq_pval(bxy_gsmr * bxy_gsmr / var);

    Ok(GsmrResult {
        bxy: bxy_gsmr,
        se: var.sqrt(),
        pval,
        n_snps: m,
        index_snps: retained.iter().map(|&i| index_snps[i].clone()).collect(),
    })
}

/// HEIDI-outlier test. The pivot is the smallest-pzx SNP in the
/// [40%, 60%] quantile band of bxy; every other SNP is tested on the
/// difference d = bxy - bxy_pivot against its variance under the
/// covariance matrix, and SNPs with p below `heidi_thresh` are dropped.
///
/// Returns the retained indices, pivot included, ascending.
pub fn heidi_outlier(
    bxy: &[f64],
    cov: &DenseMatrix,
    pzx: &[f64],
    heidi_thresh: f64,
) -> Vec<usize> {
    let n = bxy.len();
    let mut sorted = bxy.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let lower = quantile(&sorted, 0.4);
    let upper = quantile(&sorted, 0.6);

    let mut pivot = None;
    let mut min_pzx = f64::INFINITY;
    for i in 0..n {
        if bxy[i] >= lower && bxy[i] <= upper && pzx[i] < min_pzx {
            min_pzx = pzx[i];
            pivot = Some(i);
        }
    }
    // no SNP landed in the band (tiny sets): fall back to the strongest
    // instrument overall
    let pivot = pivot.unwrap_or_else(|| {
        (0..n)
            .min_by(|&a, &b| pzx[a].partial_cmp(&pzx[b]).unwrap())
            .unwrap()
    });

    let mut retained = Vec::new();
    for i in 0..n {
        if i == pivot {
            retained.push(i);
            continue;
        }
        let diff = bxy[i] - bxy[pivot];
        let var_diff = cov.get(pivot, pivot) + cov.get(i, i) - 2.0 * cov.get(pivot, i);
        let pval = chisq_pval(diff * diff / var_diff);
        if pval >= heidi_thresh {
            retained.push(i);
        }
    }
    retained
}
