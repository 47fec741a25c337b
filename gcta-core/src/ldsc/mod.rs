//! LD score regression.
//!
//! Univariate heritability by the two-step estimator (intercept on the
//! chi2 < 30 subset, then the slope through the origin on the
//! intercept-adjusted statistics) and bivariate genetic covariance by a
//! one-step fit of z1*z2, both with three rounds of iteratively
//! reweighted least squares. The weight updates share the analytic LDSC
//! variance forms; the fits themselves are two small weighted
//! least-squares primitives.

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use gcta_linalg::{decomposition::solve_sym, DenseMatrix};

use crate::error::CoreError;
use crate::meta::registry::SnpRegistry;
use crate::meta::summary::GwasData;
use crate::util::stats::liability_scale_factor;

const IRLS_ROUNDS: usize = 3;
const STEP1_CHI_MAX: f64 = 30.0;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// LDSC regression weights for a univariate fit: the inverse of
/// 2 * w_ld * (intercept + h2/M * N*l)^2, with h2 clamped to [0, 1] and
/// both LD scores floored at 1.
fn hsq_weights(
    intercept: f64,
    hsq: f64,
    m_total: f64,
    ld: &[f64],
    w_ld: &[f64],
    n: &[f64],
) -> Vec<f64> {
    let hsq = hsq.clamp(0.0, 1.0);
    let mut weights = Vec::with_capacity(ld.len());
    for i in 0..ld.len() {
        let l = ld[i].max(1.0);
        let w = w_ld[i].max(1.0);
        let expected = intercept + hsq / m_total * n[i] * l;
        weights.push(1.0 / (2.0 * w * expected * expected));
    }
    weights
}

/// Weights for the bivariate fit, from the analytic variance of z1*z2
/// under the LDSC model.
#[allow(clippy::too_many_arguments)]
fn gcov_weights(
    intercept1: f64,
    hsq1: f64,
    intercept2: f64,
    hsq2: f64,
    intercept_gcov: f64,
    gcov: f64,
    m_total: f64,
    ld: &[f64],
    w_ld: &[f64],
    n1: &[f64],
    n2: &[f64],
    n_gcov: &[f64],
) -> Vec<f64> {
    let hsq1 = hsq1.clamp(0.0, 1.0);
    let hsq2 = hsq2.clamp(0.0, 1.0);
    let gcov = gcov.clamp(-1.0, 1.0);
    let mut weights = Vec::with_capacity(ld.len());
    for i in 0..ld.len() {
        let l = ld[i].max(1.0);
        let w = w_ld[i].max(1.0);
        let d1 = n1[i] * hsq1 * l / m_total + intercept1;
        let d2 = n2[i] * hsq2 * l / m_total + intercept2;
        let d3 = n_gcov[i] * gcov * l / m_total + intercept_gcov;
        weights.push(1.0 / (w * (d1 * d2 + d3 * d3)));
    }
    weights
}

/// One weighted least-squares fit of y ~ intercept + slope*x.
/// Weights enter as sqrt(w) normalized to unit sum, applied to both
/// sides, matching the original's scaling.
fn weighted_fit_with_intercept(x: &[f64], y: &[f64], wt: &[f64]) -> Result<(f64, f64), CoreError> {
    let sum_sqrt: f64 = wt.iter().map(|w| w.sqrt()).sum();
    let u: Vec<f64> = wt.iter().map(|w| w.sqrt() / sum_sqrt).collect();

    let xs: Vec<f64> = x.iter().zip(u.iter()).map(|(a, b)| a * b).collect();
    let ys: Vec<f64> = y.iter().zip(u.iter()).map(|(a, b)| a * b).collect();

    let xx: f64 = xs.iter().map(|v| v * v).sum();
    let xi: f64 = xs.iter().zip(u.iter()).map(|(a, b)| a * b).sum();
    let ii: f64 = u.iter().map(|v| v * v).sum();
    let xy: f64 = xs.iter().zip(ys.iter()).map(|(a, b)| a * b).sum();
    let iy: f64 = u.iter().zip(ys.iter()).map(|(a, b)| a * b).sum();

    let normal = DenseMatrix::from_row_major(2, 2, &[xx, xi, xi, ii]);
    let coeff =
        solve_sym(&normal, &[xy, iy]).map_err(|_| CoreError::SingularNormalEquations)?;
    Ok((coeff[0], coeff[1]))
}

/// Weighted least-squares slope through the origin.
fn weighted_fit_origin(x: &[f64], y: &[f64], wt: &[f64]) -> Result<f64, CoreError> {
    let sum_sqrt: f64 = wt.iter().map(|w| w.sqrt()).sum();
    let u: Vec<f64> = wt.iter().map(|w| w.sqrt() / sum_sqrt).collect();

    let xs: Vec<f64> = x.iter().zip(u.iter()).map(|(a, b)| a * b).collect();
    let ys: Vec<f64> = y.iter().zip(u.iter()).map(|(a, b)| a * b).collect();
    let xx: f64 = xs.iter().map(|v| v * v).sum();
    if xx == 0.0 {
        return Err(CoreError::SingularNormalEquations);
    }
    let xy: f64 = xs.iter().zip(ys.iter()).map(|(a, b)| a * b).sum();
    Ok(xy / xx)
}

#[derive(Debug, Clone, Copy)]
pub struct HsqEstimate {
    pub intercept: f64,
    pub hsq: f64,
}

/// Two-step univariate heritability estimate.
pub fn est_hsq_two_step(
    chisq: &[f64],
    n: &[f64],
    ref_ld: &[f64],
    w_ld: &[f64],
    m_total: f64,
) -> Result<HsqEstimate, CoreError> {
    let n_snp = chisq.len();
    if n_snp == 0 {
        return Err(CoreError::InsufficientSnps {
            stage: "for the LD score regression",
            found: 0,
            required: 1,
        });
    }
    let mean_n = mean(n);
    let x0: Vec<f64> = (0..n_snp).map(|i| ref_ld[i] * n[i] / mean_n).collect();

    // weight priors
    let nld: Vec<f64> = (0..n_snp).map(|i| ref_ld[i] * n[i]).collect();
    let mut hsq = (mean(chisq) - 1.0) * m_total / mean(&nld);
    let mut intercept = 1.0;
    let wt_prior = hsq_weights(intercept, hsq, m_total, ref_ld, w_ld, n);

    // step 1: intercept from the chi2 < 30 subset
    let subset: Vec<usize> = (0..n_snp).filter(|&i| chisq[i] < STEP1_CHI_MAX).collect();
    if !subset.is_empty() {
        let x0_s: Vec<f64> = subset.iter().map(|&i| x0[i]).collect();
        let chi_s: Vec<f64> = subset.iter().map(|&i| chisq[i]).collect();
        let n_s: Vec<f64> = subset.iter().map(|&i| n[i]).collect();
        let wld_s: Vec<f64> = subset.iter().map(|&i| w_ld[i]).collect();
        let mean_n_s = mean(&n_s);
        let mut wt_s: Vec<f64> = subset.iter().map(|&i| wt_prior[i]).collect();
        for _ in 0..IRLS_ROUNDS {
            let (slope, itc) = weighted_fit_with_intercept(&x0_s, &chi_s, &wt_s)?;
            hsq = slope * m_total / mean_n_s;
            intercept = itc;
            wt_s = hsq_weights(intercept, hsq, m_total, &x0_s, &wld_s, &n_s);
        }
    }
    let intercept_step1 = intercept;

    // step 2: slope through the origin on intercept-adjusted statistics
    let y_adj: Vec<f64> = chisq.iter().map(|c| c - intercept_step1).collect();
    let mut wt = wt_prior;
    for _ in 0..IRLS_ROUNDS {
        let slope = weighted_fit_origin(&x0, &y_adj, &wt)?;
        hsq = slope * m_total / mean_n;
        wt = hsq_weights(intercept_step1, hsq, m_total, ref_ld, w_ld, n);
    }

    Ok(HsqEstimate {
        intercept: intercept_step1,
        hsq,
    })
}

/// Per-trait context entering the bivariate fit.
pub struct GcovTrait<'a> {
    pub intercept: f64,
    pub hsq: f64,
    pub n: &'a [f64],
}

/// One-step bivariate genetic-covariance estimate. Returns the gcov
/// intercept and the genetic correlation gcov/sqrt(h1*h2).
pub fn est_gcov_one_step(
    z1z2: &[f64],
    n_gcov: &[f64],
    ref_ld: &[f64],
    w_ld: &[f64],
    trait1: &GcovTrait,
    trait2: &GcovTrait,
    m_total: f64,
) -> Result<(f64, f64), CoreError> {
    let n_snp = z1z2.len();
    if n_snp == 0 {
        return Err(CoreError::InsufficientSnps {
            stage: "for the bivariate LD score regression",
            found: 0,
            required: 1,
        });
    }
    let mean_ng = mean(n_gcov);
    let x0: Vec<f64> = (0..n_snp).map(|i| ref_ld[i] * n_gcov[i] / mean_ng).collect();

    let ngld: Vec<f64> = (0..n_snp).map(|i| ref_ld[i] * n_gcov[i]).collect();
    let mut gcov = mean(z1z2) * m_total / mean(&ngld);
    let mut intercept_gcov = 0.0;
    let mut wt = gcov_weights(
        trait1.intercept,
        trait1.hsq,
        trait2.intercept,
        trait2.hsq,
        intercept_gcov,
        gcov,
        m_total,
        ref_ld,
        w_ld,
        trait1.n,
        trait2.n,
        n_gcov,
    );

    for _ in 0..IRLS_ROUNDS {
        let (slope, itc) = weighted_fit_with_intercept(&x0, z1z2, &wt)?;
        gcov = slope * m_total / mean_ng;
        intercept_gcov = itc;
        wt = gcov_weights(
            trait1.intercept,
            trait1.hsq,
            trait2.intercept,
            trait2.hsq,
            intercept_gcov,
            gcov,
            m_total,
            ref_ld,
            w_ld,
            trait1.n,
            trait2.n,
            n_gcov,
        );
    }

    Ok((intercept_gcov, gcov / (trait1.hsq * trait2.hsq).sqrt()))
}

/// Run the full LDSC analysis over the traits of a loaded summary set:
/// per-trait heritabilities on the diagonal, pairwise intercepts and
/// genetic correlations off it.
///
/// `prevalences` holds per-trait (sample, population) prevalence; when
/// both are present the liability-scale h2 is logged alongside the
/// observed-scale estimate.
pub fn ldsc_matrices(
    data: &GwasData,
    registry: &SnpRegistry,
    trait_names: &[String],
    prevalences: &[(Option<f64>, Option<f64>)],
    ref_ld_dir: &str,
    w_ld_dir: &str,
) -> Result<(DenseMatrix, DenseMatrix)> {
    let ntrait = data.n_traits;
    let n_remain = registry.n_remain();

    let slot_map: HashMap<String, usize> = registry
        .remain()
        .iter()
        .enumerate()
        .map(|(slot, &row)| (registry.name(row).to_string(), slot))
        .collect();

    let m_total = gcta_geno::ldscore::read_marker_total(ref_ld_dir)?;
    let (ref_scores, ref_names) =
        gcta_geno::ldscore::read_ld_scores(ref_ld_dir, &slot_map, n_remain)?;
    let (w_scores, w_names) = gcta_geno::ldscore::read_ld_scores(w_ld_dir, &slot_map, n_remain)?;

    // SNPs scored in both bundles
    let w_set: std::collections::HashSet<&str> = w_names.iter().map(|s| s.as_str()).collect();
    let common: Vec<&String> = ref_names.iter().filter(|s| w_set.contains(s.as_str())).collect();
    info!(
        "{} SNPs in common between the LD score files and the GWAS data",
        common.len()
    );

    let n_common = common.len();
    let mut ref_ld = vec![0.0; n_common];
    let mut w_ld = vec![0.0; n_common];
    let mut z = vec![vec![0.0; n_common]; ntrait];
    let mut n_obs = vec![vec![0.0; n_common]; ntrait];
    let mut flags = vec![vec![false; n_common]; ntrait];
    for (i, name) in common.iter().enumerate() {
        let slot = slot_map[name.as_str()];
        let row = registry.remain()[slot];
        ref_ld[i] = ref_scores[slot];
        w_ld[i] = w_scores[slot];
        for t in 0..ntrait {
            if !data.valid[t][row] {
                continue;
            }
            flags[t][i] = true;
            z[t][i] = data.beta[t][row] / data.se[t][row];
            n_obs[t][i] = data.n[t][row];
        }
    }

    info!("LD score regression analysis to estimate SNP heritability ...");
    let mut intercept_mat = DenseMatrix::identity(ntrait);
    let mut slope_mat = DenseMatrix::zeros(ntrait, ntrait);
    let mut estimates = Vec::with_capacity(ntrait);
    for t in 0..ntrait {
        let idx: Vec<usize> = (0..n_common).filter(|&i| flags[t][i]).collect();
        let chi: Vec<f64> = idx.iter().map(|&i| z[t][i] * z[t][i]).collect();
        let n_t: Vec<f64> = idx.iter().map(|&i| n_obs[t][i]).collect();
        let ref_t: Vec<f64> = idx.iter().map(|&i| ref_ld[i]).collect();
        let w_t: Vec<f64> = idx.iter().map(|&i| w_ld[i]).collect();

        let est = est_hsq_two_step(&chi, &n_t, &ref_t, &w_t, m_total)?;
        if est.hsq <= 0.0 {
            return Err(CoreError::NegativeHeritability {
                trait_name: trait_names[t].clone(),
                value: est.hsq,
            }
            .into());
        }
        intercept_mat.set(t, t, est.intercept);
        slope_mat.set(t, t, est.hsq);
        info!(
            "Trait [{}]: intercept = {:.4}, h2 = {:.4}",
            trait_names[t], est.intercept, est.hsq
        );
        if let (Some(sample_prev), Some(pop_prev)) = prevalences[t] {
            let factor = liability_scale_factor(pop_prev, sample_prev);
            info!(
                "Trait [{}]: h2 on the liability scale = {:.4}",
                trait_names[t],
                est.hsq * factor
            );
        }
        estimates.push(est);
    }

    info!("LD score regression analysis to estimate genetic correlation ...");
    for t1 in 0..ntrait {
        for t2 in (t1 + 1)..ntrait {
            let idx: Vec<usize> = (0..n_common)
                .filter(|&i| flags[t1][i] && flags[t2][i])
                .collect();
            let z1z2: Vec<f64> = idx.iter().map(|&i| z[t1][i] * z[t2][i]).collect();
            let n_g: Vec<f64> = idx
                .iter()
                .map(|&i| (n_obs[t1][i] * n_obs[t2][i]).sqrt())
                .collect();
            let ref_p: Vec<f64> = idx.iter().map(|&i| ref_ld[i]).collect();
            let w_p: Vec<f64> = idx.iter().map(|&i| w_ld[i]).collect();
            let n1: Vec<f64> = idx.iter().map(|&i| n_obs[t1][i]).collect();
            let n2: Vec<f64> = idx.iter().map(|&i| n_obs[t2][i]).collect();

            let (intercept_g, rg) = est_gcov_one_step(
                &z1z2,
                &n_g,
                &ref_p,
                &w_p,
                &GcovTrait {
                    intercept: estimates[t1].intercept,
                    hsq: estimates[t1].hsq,
                    n: &n1,
                },
                &GcovTrait {
                    intercept: estimates[t2].intercept,
                    hsq: estimates[t2].hsq,
                    n: &n2,
                },
                m_total,
            )?;
            intercept_mat.set(t1, t2, intercept_g);
            intercept_mat.set(t2, t1, intercept_g);
            slope_mat.set(t1, t2, rg);
            slope_mat.set(t2, t1, rg);
        }
    }
    info!("LD score regression analysis completed");

    Ok((intercept_mat, slope_mat))
}
