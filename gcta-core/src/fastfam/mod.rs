//! fastFAM: mixed-linear-model association scan over a sparse GRM.
//!
//! The phenotype is residualized against the covariates and centered,
//! the genetic variance is estimated by Haseman-Elston regression on the
//! off-diagonal GRM entries, V = VG*A + VR*I is factorized by a
//! simplicial sparse LDLT and inverted, and every marker is tested by
//! GLS regression under the fitted covariance. The per-marker loop runs
//! on the rayon pool within genotype blocks; results land in
//! marker-index order regardless of scheduling.

use std::io::Write;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

use gcta_geno::phenotype::{apply_keep_remove, read_id_list, read_value_table};
use gcta_geno::plink::PlinkReader;
use gcta_geno::sparse_grm::read_sparse_grm;
use gcta_geno::traits::GenotypeReader;
use gcta_linalg::decomposition::SparseLdlt;
use gcta_linalg::dense::dot;
use gcta_linalg::{DenseMatrix, SparseMatrix};

use crate::error::CoreError;
use crate::ld::standardized_vector;
use crate::util::stats::chisq_pval;

const HE_PVAL_MAX: f64 = 0.05;
const SCAN_BLOCK: usize = 512;
const PROGRESS_EVERY: usize = 30_000;

#[derive(Debug, Clone)]
pub struct FastFamOptions {
    pub grm_prefix: String,
    /// Phenotype file; the .fam phenotype column is used when absent.
    pub pheno_file: Option<String>,
    /// 1-based phenotype column (with `pheno_file`).
    pub mpheno: usize,
    pub qcovar_file: Option<String>,
    pub keep_file: Option<String>,
    pub remove_file: Option<String>,
    /// Fixed (VG, VR); skips the HE regression.
    pub ge: Option<(f64, f64)>,
    pub out: String,
}

/// Residualize y against [1, covariates] by ordinary least squares and
/// center the residuals.
pub fn residualize_covariates(y: &mut [f64], covars: &[Vec<f64>]) -> Result<()> {
    let n = y.len();
    if !covars.is_empty() {
        let p = covars.len() + 1;
        let mut x_data = vec![1.0; n]; // intercept column
        for c in covars {
            assert_eq!(c.len(), n);
            x_data.extend_from_slice(c);
        }
        let x = DenseMatrix::from_col_major(n, p, &x_data);
        let xtx = x.gram();
        let xty = x.tr_mat_vec(y);
        let beta = gcta_linalg::decomposition::solve_sym(&xtx, &xty)
            .context("Covariate design matrix is singular")?;
        let fitted = x.mat_vec(&beta);
        for i in 0..n {
            y[i] -= fitted[i];
        }
    }
    let mean = y.iter().sum::<f64>() / n as f64;
    for v in y.iter_mut() {
        *v -= mean;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct HeResult {
    pub vg: f64,
    pub se: f64,
    pub pval: f64,
}

/// Haseman-Elston regression of y_i*y_j on the off-diagonal GRM entries.
pub fn he_regression(grm: &SparseMatrix, y: &[f64]) -> Result<HeResult, CoreError> {
    let col_ptr = grm.col_ptr();
    let rows = grm.row_indices();
    let values = grm.values();

    let mut a_ij = Vec::new();
    let mut z_ij = Vec::new();
    for j in 0..grm.ncols() {
        for idx in col_ptr[j]..col_ptr[j + 1] {
            let i = rows[idx];
            if i < j {
                a_ij.push(values[idx]);
                z_ij.push(y[i] * y[j]);
            }
        }
    }

    let m = a_ij.len();
    if m < 2 {
        return Err(CoreError::InsufficientRelatedness { pval: f64::NAN });
    }
    let a_mean = a_ij.iter().sum::<f64>() / m as f64;
    let z_mean = z_ij.iter().sum::<f64>() / m as f64;
    for a in a_ij.iter_mut() {
        *a -= a_mean;
    }
    for z in z_ij.iter_mut() {
        *z -= z_mean;
    }

    let a2: f64 = a_ij.iter().map(|a| a * a).sum();
    if a2 < 1e-6 {
        // no variance in relatedness, nothing to regress on
        return Err(CoreError::InsufficientRelatedness { pval: f64::NAN });
    }
    let az: f64 = a_ij.iter().zip(z_ij.iter()).map(|(a, z)| a * z).sum();
    let vg = az / a2;

    let rss: f64 = a_ij
        .iter()
        .zip(z_ij.iter())
        .map(|(a, z)| {
            let r = z - a * vg;
            r * r
        })
        .sum();
    let delta = rss / (m - 2) as f64;
    let se = (delta / a2).sqrt();
    let z_stat = vg / se;
    let pval = chisq_pval(z_stat * z_stat);

    info!("HE regression: beta = {:.4}, se = {:.4}, p = {:.3e}", vg, se, pval);
    if pval >= HE_PVAL_MAX {
        return Err(CoreError::InsufficientRelatedness { pval });
    }
    Ok(HeResult { vg, se, pval })
}

/// Assemble V = VG*A + VR*I, factorize, and invert it densely.
pub fn build_v_inverse(grm: &SparseMatrix, vg: f64, vr: f64) -> Result<DenseMatrix> {
    info!("Inverting the variance matrix V (this may take a while) ...");
    let v = grm.scale_add_identity(vg, vr);
    let ldlt = SparseLdlt::new(&v).context("Cannot factorize the variance matrix V")?;
    Ok(ldlt.inverse_dense())
}

/// Association result for one marker.
#[derive(Debug, Clone)]
pub struct MarkerAssoc {
    pub chrom: String,
    pub id: String,
    pub pos: u64,
    pub a1: String,
    pub a2: String,
    pub af: f64,
    pub beta: f64,
    pub se: f64,
    pub pval: f64,
}

/// GLS scan of every marker under the fitted covariance: beta =
/// (x'V^-1 y)/(x'V^-1 x), se = (x'V^-1 x)^-1/2.
pub fn scan_markers(
    reader: &dyn GenotypeReader,
    v_inverse: &DenseMatrix,
    y: &[f64],
) -> Result<Vec<MarkerAssoc>> {
    let n_markers = reader.n_markers();
    let mut results = Vec::with_capacity(n_markers);
    let mut last_progress = 0;

    let mut block_start = 0;
    while block_start < n_markers {
        let block_end = (block_start + SCAN_BLOCK).min(n_markers);
        let block: Vec<_> = (block_start..block_end)
            .map(|m| reader.read_marker(m))
            .collect::<Result<_>>()?;

        let mut block_results: Vec<MarkerAssoc> = block
            .par_iter()
            .map(|marker| {
                let (beta, se, pval) = if marker.af > 0.0 && marker.af < 1.0 {
                    let x = standardized_vector(&marker.dosages);
                    let u = v_inverse.mat_vec(&x);
                    let denom = dot(&u, &x);
                    let beta = dot(&u, y) / denom;
                    let se = (1.0 / denom).sqrt();
                    let z = beta / se;
                    (beta, se, chisq_pval(z * z))
                } else {
                    (f64::NAN, f64::NAN, f64::NAN)
                };
                MarkerAssoc {
                    chrom: marker.info.chrom.clone(),
                    id: marker.info.id.clone(),
                    pos: marker.info.pos,
                    a1: marker.info.allele1.clone(),
                    a2: marker.info.allele2.clone(),
                    af: marker.af,
                    beta,
                    se,
                    pval,
                }
            })
            .collect();
        results.append(&mut block_results);

        if results.len() - last_progress >= PROGRESS_EVERY {
            last_progress = results.len();
            info!("{} markers finished", results.len());
        }
        block_start = block_end;
    }
    Ok(results)
}

fn write_assoc(path: &str, results: &[MarkerAssoc]) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Cannot open the file [{}] to write", path))?;
    writeln!(file, "CHR\tSNP\tPOS\tA1\tA2\tAF1\tbeta\tse\tp")?;
    for r in results {
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}",
            r.chrom, r.id, r.pos, r.a1, r.a2, r.af, r.beta, r.se, r.pval
        )?;
    }
    Ok(())
}

/// Run the full fastFAM analysis.
pub fn run_fastfam(reader: &mut PlinkReader, options: &FastFamOptions) -> Result<()> {
    // phenotype source: --pheno file or the .fam sixth column
    let (mut ids, mut pheno): (Vec<String>, Vec<f64>) = match &options.pheno_file {
        Some(path) => {
            let table = read_value_table(path)?;
            let values = table.select_column(options.mpheno)?.to_vec();
            (table.ids, values)
        }
        None => (reader.sample_ids().to_vec(), reader.fam_phenotypes()),
    };

    // --keep / --remove
    let keep = match &options.keep_file {
        Some(path) => Some(read_id_list(path)?),
        None => None,
    };
    let remove = match &options.remove_file {
        Some(path) => Some(read_id_list(path)?),
        None => None,
    };
    if keep.is_some() || remove.is_some() {
        let kept = apply_keep_remove(&ids, keep.as_deref(), remove.as_deref());
        ids = kept.iter().map(|&i| ids[i].clone()).collect();
        pheno = kept.iter().map(|&i| pheno[i]).collect();
        info!("After keeping/removing subjects, {} remain", ids.len());
    }

    // drop missing phenotypes
    let observed: Vec<usize> = (0..pheno.len()).filter(|&i| pheno[i].is_finite()).collect();
    let mut ids: Vec<String> = observed.iter().map(|&i| ids[i].clone()).collect();
    let mut pheno: Vec<f64> = observed.iter().map(|&i| pheno[i]).collect();
    info!(
        "After removing NAs in the phenotype, {} subjects remain",
        ids.len()
    );

    // quantitative covariates
    let qcovar = match &options.qcovar_file {
        Some(path) => {
            let table = read_value_table(path)?;
            let pos: std::collections::HashMap<&str, usize> = table
                .ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), i))
                .collect();
            let merged: Vec<usize> = (0..ids.len())
                .filter(|&i| {
                    pos.get(ids[i].as_str()).is_some_and(|&row| {
                        table.columns.iter().all(|c| c[row].is_finite())
                    })
                })
                .collect();
            let rows: Vec<usize> = merged.iter().map(|&i| pos[ids[i].as_str()]).collect();
            ids = merged.iter().map(|&i| ids[i].clone()).collect();
            pheno = merged.iter().map(|&i| pheno[i]).collect();
            info!("After merging with the covariates, {} subjects remain", ids.len());
            Some((table, rows))
        }
        None => None,
    };

    // align everything to the genotype panel's sample order
    reader.set_sample_subset(&ids)?;
    let panel_ids = reader.sample_ids().to_vec();
    let row_of: std::collections::HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    // sparse GRM, intersected with the panel samples
    let grm_data = read_sparse_grm(&options.grm_prefix)?;
    let (grm, kept_positions) = grm_data.subset_matrix(&panel_ids)?;
    let final_ids: Vec<String> = kept_positions
        .iter()
        .map(|&p| panel_ids[p].clone())
        .collect();
    if final_ids.len() != panel_ids.len() {
        reader.set_sample_subset(&final_ids)?;
    }
    info!("After merging with the GRM, {} subjects remain", final_ids.len());

    let order: Vec<usize> = final_ids.iter().map(|id| row_of[id.as_str()]).collect();
    let mut y: Vec<f64> = order.iter().map(|&i| pheno[i]).collect();
    let covars: Vec<Vec<f64>> = match &qcovar {
        Some((table, rows)) => table
            .columns
            .iter()
            .map(|col| order.iter().map(|&i| col[rows[i]]).collect())
            .collect(),
        None => Vec::new(),
    };

    // condition on covariates and center
    residualize_covariates(&mut y, &covars)?;
    let n = y.len();
    let vp = y.iter().map(|v| v * v).sum::<f64>() / (n - 1) as f64;

    let (vg, vr) = match options.ge {
        Some((vg, vr)) => {
            info!("Using the supplied variance components: VG = {}, VR = {}", vg, vr);
            (vg, vr)
        }
        None => {
            info!("Estimating VG by HE regression ...");
            let he = he_regression(&grm, &y)?;
            let vg = he.vg;
            let vr = vp - vg;
            info!("Vg = {:.4}, Ve = {:.4}, hsq = {:.4}", vg, vr, vg / vp);
            (vg, vr)
        }
    };

    let v_inverse = build_v_inverse(&grm, vg, vr)?;

    info!("Scanning {} markers ...", reader.n_markers());
    let results = scan_markers(&*reader, &v_inverse, &y)?;

    let out_path = format!("{}.fastFAM.assoc", options.out);
    write_assoc(&out_path, &results)?;
    info!("Saved the association results to [{}]", out_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockPanel;

    #[test]
    fn test_residualize_centers() {
        let mut y = vec![1.0, 2.0, 3.0, 4.0];
        residualize_covariates(&mut y, &[]).unwrap();
        assert!(y.iter().sum::<f64>().abs() < 1e-12);
        assert_eq!(y, vec![-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn test_residualize_removes_covariate_effect() {
        // y = 2*c exactly; residuals vanish
        let c = vec![1.0, 2.0, 3.0, 4.0];
        let mut y: Vec<f64> = c.iter().map(|v| 2.0 * v).collect();
        residualize_covariates(&mut y, &[c]).unwrap();
        for v in y {
            assert!(v.abs() < 1e-10);
        }
    }

    fn grm_with_offdiags(n: usize, pairs: &[(usize, usize, f64)]) -> SparseMatrix {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for i in 0..n {
            rows.push(i);
            cols.push(i);
            vals.push(1.0);
        }
        for &(i, j, v) in pairs {
            rows.push(i);
            cols.push(j);
            vals.push(v);
            rows.push(j);
            cols.push(i);
            vals.push(v);
        }
        SparseMatrix::from_triplets(n, n, &rows, &cols, &vals)
    }

    /// Constant off-diagonals carry no relatedness signal.
    #[test]
    fn test_he_constant_offdiagonals_rejected() {
        let pairs: Vec<(usize, usize, f64)> = (0..20).map(|k| (k, k + 20, 0.01)).collect();
        let grm = grm_with_offdiags(40, &pairs);
        let y: Vec<f64> = (0..40).map(|i| ((i * 37 % 11) as f64 - 5.0) / 3.0).collect();
        let err = he_regression(&grm, &y).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientRelatedness { .. }));
    }

    /// A phenotype exactly balanced against the relatedness pattern:
    /// every distinct GRM value sees as many positive as negative
    /// products, so the HE slope is ~0 and the test rejects.
    #[test]
    fn test_he_unrelated_phenotype_rejected() {
        let pairs: Vec<(usize, usize, f64)> = (0..20)
            .map(|k| (k, k + 20, 0.01 + 0.001 * (k % 5) as f64))
            .collect();
        let grm = grm_with_offdiags(40, &pairs);
        let mut y = vec![0.0; 40];
        for k in 0..20 {
            y[k] = 1.0;
            y[k + 20] = if (k / 5) % 2 == 0 { 1.0 } else { -1.0 };
        }
        let err = he_regression(&grm, &y).unwrap_err();
        match err {
            CoreError::InsufficientRelatedness { pval } => {
                assert!(pval >= 0.05, "p = {pval}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Strong block relatedness with a phenotype that mirrors it: HE
    /// accepts and recovers a positive VG.
    #[test]
    fn test_he_detects_relatedness() {
        // 30 pairs; phenotype products track the GRM entries
        let mut pairs = Vec::new();
        let n = 60;
        for k in 0..30 {
            let v = if k % 2 == 0 { 0.5 } else { 0.05 };
            pairs.push((k, k + 30, v));
        }
        let grm = grm_with_offdiags(n, &pairs);
        let mut y = vec![0.0; n];
        for k in 0..30 {
            // y_i * y_j tracks the GRM entry, with a little jitter so the
            // fit is not exact
            let base: f64 = if k % 2 == 0 { 1.0 } else { 0.1 };
            let scale = base + 0.01 * (k as f64 / 30.0);
            y[k] = scale.sqrt();
            y[k + 30] = scale.sqrt();
        }
        let he = he_regression(&grm, &y).unwrap();
        assert!(he.vg > 0.0);
        assert!(he.pval < 0.05);
    }

    /// V = I: the GLS scan collapses to ordinary regression,
    /// beta = x'y/(x'x), se = 1/sqrt(x'x).
    #[test]
    fn test_scan_identity_v_matches_ols() {
        let dosages = vec![0.0, 1.0, 2.0, 1.0, 0.0, 2.0];
        let panel = MockPanel::new(vec![MockPanel::marker("1", 1000, "rs1", dosages.clone())]);
        let n = dosages.len();
        let v_inv = DenseMatrix::identity(n);
        let mut y = vec![0.3, -0.1, 0.8, 0.2, -0.4, 1.1];
        residualize_covariates(&mut y, &[]).unwrap();

        let results = scan_markers(&panel, &v_inv, &y).unwrap();
        assert_eq!(results.len(), 1);

        let x = standardized_vector(&dosages);
        let xx = dot(&x, &x);
        let expected_beta = dot(&x, &y) / xx;
        let expected_se = (1.0 / xx).sqrt();
        assert!((results[0].beta - expected_beta).abs() < 1e-12);
        assert!((results[0].se - expected_se).abs() < 1e-12);
    }

    #[test]
    fn test_scan_monomorphic_marker_is_nan() {
        let panel = MockPanel::new(vec![MockPanel::marker("1", 500, "rs_mono", vec![2.0; 4])]);
        let v_inv = DenseMatrix::identity(4);
        let y = vec![0.1, -0.1, 0.2, -0.2];
        let results = scan_markers(&panel, &v_inv, &y).unwrap();
        assert!(results[0].beta.is_nan());
        assert!(results[0].pval.is_nan());
    }

    /// Results are ordered by marker index, whatever the scheduling.
    #[test]
    fn test_scan_order_deterministic() {
        let markers: Vec<_> = (0..50)
            .map(|m| {
                let dosages: Vec<f64> =
                    (0..8).map(|i| ((i + m) % 3) as f64).collect();
                MockPanel::marker("1", 1000 + m as u64, &format!("rs{m}"), dosages)
            })
            .collect();
        let panel = MockPanel::new(markers);
        let v_inv = DenseMatrix::identity(8);
        let mut y: Vec<f64> = (0..8).map(|i| i as f64 * 0.1).collect();
        residualize_covariates(&mut y, &[]).unwrap();
        let results = scan_markers(&panel, &v_inv, &y).unwrap();
        for (m, r) in results.iter().enumerate() {
            assert_eq!(r.id, format!("rs{m}"));
        }
    }
}
