//! Post-clump sparsification of the LD-r matrix.
//!
//! Two passes over the index-SNP LD matrix:
//! 1. a redundancy pruner that removes the minimum set of SNPs so no
//!    remaining pair correlates above sqrt(r2); when a pair conflicts,
//!    the SNP involved in more high-correlation pairs goes;
//! 2. an FDR pass that tests every remaining pair for nonzero LD
//!    (chi2 on n*r^2), Benjamini-Hochberg adjusts the p-values in
//!    descending order, and zeroes the correlations that fail the
//!    threshold.

use std::collections::{HashMap, HashSet};

use gcta_linalg::DenseMatrix;

use crate::util::stats::{bh_adjust_descending, chisq_pval};

/// Remove correlated SNPs. `r_abs_thresh` is compared against |r|.
/// Returns the kept indices, ascending.
pub fn redundancy_prune(r_mat: &DenseMatrix, r_abs_thresh: f64) -> Vec<usize> {
    let n = r_mat.nrows();
    let mut pair_first = Vec::new();
    let mut pair_second = Vec::new();
    for i in 0..n {
        for j in 0..i {
            if r_mat.get(i, j).abs() > r_abs_thresh {
                pair_first.push(i);
                pair_second.push(j);
            }
        }
    }
    if pair_first.is_empty() {
        return (0..n).collect();
    }

    let mut degree: HashMap<usize, usize> = HashMap::new();
    for &id in pair_first.iter().chain(pair_second.iter()) {
        *degree.entry(id).or_insert(0) += 1;
    }

    // orient each pair so the higher-degree SNP comes first, then remove
    // the first elements
    let mut removed = HashSet::new();
    for k in 0..pair_first.len() {
        let (a, b) = (pair_first[k], pair_second[k]);
        if degree[&a] < degree[&b] {
            removed.insert(b);
        } else {
            removed.insert(a);
        }
    }

    (0..n).filter(|i| !removed.contains(i)).collect()
}

/// Test every pair (i < j) for nonzero LD and zero out the correlations
/// whose BH-adjusted p-value fails `fdr_thresh`. `n_ref` is the reference
/// panel sample count behind each r estimate.
pub fn fdr_adjust_ld(r_mat: &mut DenseMatrix, n_ref: usize, fdr_thresh: f64) {
    let m = r_mat.nrows();
    let mut pairs: Vec<(f64, usize)> = Vec::with_capacity(m * (m - 1) / 2);
    for i in 0..m {
        for j in (i + 1)..m {
            let r = r_mat.get(i, j);
            pairs.push((chisq_pval(r * r * n_ref as f64), i * m + j));
        }
    }
    // descending raw p, the orientation the BH adjustment expects here
    pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));

    let pvals: Vec<f64> = pairs.iter().map(|p| p.0).collect();
    let adjusted = bh_adjust_descending(&pvals);

    for (k, &(_, packed)) in pairs.iter().enumerate() {
        if adjusted[k] < fdr_thresh {
            break;
        }
        let (i, j) = (packed / m, packed % m);
        r_mat.set(i, j, 0.0);
        r_mat.set(j, i, 0.0);
    }
}
