//! GCTA-format phenotype, covariate and individual-list files.
//!
//! All of these share the layout `FID IID [values...]`, whitespace
//! separated, no header. Individuals are identified by the composite
//! "FID\tIID" key throughout.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Parse a value column, treating non-numeric tokens as missing.
fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "NaN" | "nan" | "." | "-9" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

/// Read an ID list (`FID IID` per line) into composite keys.
pub fn read_id_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;
    let mut ids = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            bail!(
                "The subject list file [{}], line {} has fewer than 2 fields",
                path.display(),
                line_num + 1
            );
        }
        ids.push(format!("{}\t{}", fields[0], fields[1]));
    }
    info!("{} subjects read from [{}]", ids.len(), path.display());
    Ok(ids)
}

/// A phenotype or quantitative-covariate table.
#[derive(Debug, Clone)]
pub struct ValueTable {
    /// "FID\tIID" per row.
    pub ids: Vec<String>,
    /// Column-major values: columns[c][row]. NaN where missing.
    pub columns: Vec<Vec<f64>>,
}

/// Read a `FID IID v1 v2 ...` table. Every row must carry the same number
/// of value columns as the first.
pub fn read_value_table<P: AsRef<Path>>(path: P) -> Result<ValueTable> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;

    let mut ids = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            bail!(
                "The file [{}], line {} has fewer than 3 fields",
                path.display(),
                line_num + 1
            );
        }
        if columns.is_empty() {
            columns = vec![Vec::new(); fields.len() - 2];
        } else if fields.len() - 2 != columns.len() {
            bail!(
                "The file [{}], line {} has a different number of columns",
                path.display(),
                line_num + 1
            );
        }
        ids.push(format!("{}\t{}", fields[0], fields[1]));
        for (c, field) in fields[2..].iter().enumerate() {
            columns[c].push(parse_value(field));
        }
    }
    info!("{} subjects read from [{}]", ids.len(), path.display());
    Ok(ValueTable { ids, columns })
}

impl ValueTable {
    /// Select a 1-based phenotype column (`--mpheno`).
    pub fn select_column(&self, mpheno: usize) -> Result<&[f64]> {
        if mpheno == 0 || mpheno > self.columns.len() {
            bail!(
                "--mpheno {} is out of range: the phenotype file has {} value column(s)",
                mpheno,
                self.columns.len()
            );
        }
        Ok(&self.columns[mpheno - 1])
    }
}

/// Apply --keep and --remove lists to an ID vector, returning the surviving
/// row indices. Removal has priority over keeping.
pub fn apply_keep_remove(
    ids: &[String],
    keep: Option<&[String]>,
    remove: Option<&[String]>,
) -> Vec<usize> {
    use std::collections::HashSet;
    let keep_set: Option<HashSet<&str>> =
        keep.map(|list| list.iter().map(|s| s.as_str()).collect());
    let remove_set: Option<HashSet<&str>> =
        remove.map(|list| list.iter().map(|s| s.as_str()).collect());

    let mut kept = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        if let Some(rm) = &remove_set {
            if rm.contains(id.as_str()) {
                continue;
            }
        }
        if let Some(kp) = &keep_set {
            if !kp.contains(id.as_str()) {
                continue;
            }
        }
        kept.push(i);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1.5"), 1.5);
        assert!(parse_value("NA").is_nan());
        assert!(parse_value(".").is_nan());
        assert!(parse_value("-9").is_nan());
        assert!(parse_value("abc").is_nan());
    }

    #[test]
    fn test_read_value_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pheno.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "F1 I1 1.2 0").unwrap();
        writeln!(f, "F2 I2 NA 1").unwrap();

        let table = read_value_table(&path).unwrap();
        assert_eq!(table.ids, vec!["F1\tI1", "F2\tI2"]);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0][0], 1.2);
        assert!(table.columns[0][1].is_nan());
        assert_eq!(table.select_column(2).unwrap()[1], 1.0);
        assert!(table.select_column(3).is_err());
        assert!(table.select_column(0).is_err());
    }

    #[test]
    fn test_ragged_table_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pheno.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "F1 I1 1.2 0").unwrap();
        writeln!(f, "F2 I2 0.4").unwrap();
        assert!(read_value_table(&path).is_err());
    }

    #[test]
    fn test_keep_remove_priority() {
        let ids: Vec<String> = ["F1\tI1", "F2\tI2", "F3\tI3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let keep = vec!["F1\tI1".to_string(), "F2\tI2".to_string()];
        let remove = vec!["F2\tI2".to_string()];
        // removed even though it is on the keep list
        let kept = apply_keep_remove(&ids, Some(&keep), Some(&remove));
        assert_eq!(kept, vec![0]);
    }
}
