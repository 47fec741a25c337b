//! p-value ordered LD clumping.
//!
//! Candidates below the index p-value threshold are visited in ascending
//! p order. Each unclumped candidate becomes an index SNP; its window is
//! walked left and right along the reference panel (same chromosome,
//! within the bp window) and any candidate in LD at or above the r2
//! threshold is marked clumped. Clumped SNPs stay in the registry; they
//! are only barred from election.

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use gcta_geno::traits::GenotypeReader;

use crate::ld::{ld_r, standardized_vector};
use crate::meta::registry::SnpRegistry;

#[derive(Debug, Clone, Copy)]
pub struct ClumpParams {
    /// Index-SNP p-value threshold.
    pub p1: f64,
    /// Window half-width in kb.
    pub wind_kb: u32,
    /// r2 threshold binding a neighbor to an index SNP.
    pub r2: f64,
}

/// Run clumping over the panel markers in `include` (ascending bim
/// order). `pvals` and `flags` are indexed by registry position.
///
/// Returns index SNP names in election order.
pub fn clump_markers(
    reader: &dyn GenotypeReader,
    include: &[usize],
    registry: &SnpRegistry,
    pvals: &[f64],
    flags: &[bool],
    params: ClumpParams,
) -> Result<Vec<String>> {
    let wind_bp = params.wind_kb as i64 * 1000;
    let include_pos: HashMap<usize, usize> = include
        .iter()
        .enumerate()
        .map(|(pos, &marker)| (marker, pos))
        .collect();

    // candidates present in the panel, sorted by ascending p
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new(); // (p, registry row, include pos)
    for &row in registry.remain() {
        if !flags[row] {
            continue;
        }
        let marker = match reader.marker_index(registry.name(row)) {
            Some(m) => m,
            None => continue,
        };
        let pos = match include_pos.get(&marker) {
            Some(&p) => p,
            None => continue,
        };
        if pvals[row] < params.p1 {
            candidates.push((pvals[row], row, pos));
        }
    }
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));

    // candidate lookup by include position
    let mut clumped: HashMap<usize, bool> = candidates.iter().map(|c| (c.2, false)).collect();

    let mut index_snps = Vec::new();
    for &(_, row, center_pos) in &candidates {
        if clumped[&center_pos] {
            continue;
        }
        let center_info = reader.marker_info(include[center_pos])?;
        let x = standardized_vector(&reader.read_marker(include[center_pos])?.dosages);

        // left side
        let mut j = center_pos;
        while j > 0 {
            j -= 1;
            let info = reader.marker_info(include[j])?;
            if info.chrom != center_info.chrom
                || (info.pos as i64 - center_info.pos as i64).abs() >= wind_bp
            {
                break;
            }
            if let Some(mark) = clumped.get_mut(&j) {
                let r = ld_r(&x, &standardized_vector(&reader.read_marker(include[j])?.dosages));
                if r * r >= params.r2 {
                    *mark = true;
                }
            }
        }
        // right side
        let mut j = center_pos + 1;
        while j < include.len() {
            let info = reader.marker_info(include[j])?;
            if info.chrom != center_info.chrom
                || (info.pos as i64 - center_info.pos as i64).abs() >= wind_bp
            {
                break;
            }
            if let Some(mark) = clumped.get_mut(&j) {
                let r = ld_r(&x, &standardized_vector(&reader.read_marker(include[j])?.dosages));
                if r * r >= params.r2 {
                    *mark = true;
                }
            }
            j += 1;
        }

        index_snps.push(registry.name(row).to_string());
    }

    info!(
        "{} index SNPs obtained from the clumping analysis",
        index_snps.len()
    );
    Ok(index_snps)
}
