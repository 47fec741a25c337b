//! Sparse GRM reader.
//!
//! GCTA's sparse GRM comes in two files:
//! - `<prefix>.grm.id`: FID and IID per line, defining the index order
//! - `<prefix>.grm.sp`: one `i j value` triple per line, 0-indexed into
//!   the id list with i >= j
//!
//! Off-diagonal entries are mirrored when the symmetric matrix is built.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use gcta_linalg::SparseMatrix;

use crate::phenotype::read_id_list;

/// Parsed sparse GRM, still in file index space.
#[derive(Debug, Clone)]
pub struct SparseGrmData {
    /// "FID\tIID" identifiers in file order.
    pub ids: Vec<String>,
    /// Lower-triangle triples (i, j, value) with i >= j.
    pub entries: Vec<(usize, usize, f64)>,
}

/// Read `<prefix>.grm.id` and `<prefix>.grm.sp`.
pub fn read_sparse_grm<P: AsRef<Path>>(prefix: P) -> Result<SparseGrmData> {
    let prefix = prefix.as_ref();
    let id_path = prefix.with_extension("grm.id");
    let sp_path = prefix.with_extension("grm.sp");

    let ids = read_id_list(&id_path)?;
    let n = ids.len();

    let contents = std::fs::read_to_string(&sp_path)
        .with_context(|| format!("Cannot open the file [{}] to read", sp_path.display()))?;

    let mut entries = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            bail!(
                "Format of file [{}] is not correct, line {}",
                sp_path.display(),
                line_num + 1
            );
        }
        let i: usize = fields[0].parse().with_context(|| {
            format!("Bad index in [{}], line {}", sp_path.display(), line_num + 1)
        })?;
        let j: usize = fields[1].parse().with_context(|| {
            format!("Bad index in [{}], line {}", sp_path.display(), line_num + 1)
        })?;
        let value: f64 = fields[2].parse().with_context(|| {
            format!("Bad value in [{}], line {}", sp_path.display(), line_num + 1)
        })?;
        if i >= n || j >= n {
            bail!(
                "Index ({}, {}) in [{}] exceeds the {} IDs of the .grm.id file",
                i,
                j,
                sp_path.display(),
                n
            );
        }
        entries.push((i, j, value));
    }

    info!(
        "{} individuals and {} stored pairs read from [{}]",
        n,
        entries.len(),
        prefix.display()
    );
    Ok(SparseGrmData { ids, entries })
}

impl SparseGrmData {
    /// Build the symmetric matrix over the individuals in `wanted` that
    /// are present in the GRM. Matrix row k corresponds to
    /// `wanted[kept[k]]`, with `kept` sorted ascending, so rows follow the
    /// caller's sample order.
    pub fn subset_matrix(&self, wanted: &[String]) -> Result<(SparseMatrix, Vec<usize>)> {
        let grm_pos: std::collections::HashMap<&str, usize> = self
            .ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.as_str(), pos))
            .collect();

        let mut grm_to_new = vec![usize::MAX; self.ids.len()];
        let mut kept_positions = Vec::new();
        for (pos, id) in wanted.iter().enumerate() {
            if let Some(&grm_idx) = grm_pos.get(id.as_str()) {
                grm_to_new[grm_idx] = kept_positions.len();
                kept_positions.push(pos);
            }
        }
        let n_kept = kept_positions.len();
        if n_kept == 0 {
            bail!("No overlapping individuals between the sparse GRM and the phenotype data");
        }

        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for &(i, j, value) in &self.entries {
            let (ni, nj) = (grm_to_new[i], grm_to_new[j]);
            if ni == usize::MAX || nj == usize::MAX {
                continue;
            }
            rows.push(ni);
            cols.push(nj);
            vals.push(value);
            if ni != nj {
                rows.push(nj);
                cols.push(ni);
                vals.push(value);
            }
        }

        let matrix = SparseMatrix::from_triplets(n_kept, n_kept, &rows, &cols, &vals);
        Ok((matrix, kept_positions))
    }
}
