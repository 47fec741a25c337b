//! Allele harmonization and bad-SNP filtering.
//!
//! For each surviving SNP, a reference allele pair is fixed (reference
//! panel first, else the first trait carrying the SNP) and every trait's
//! effect is flipped onto that orientation. SNPs with missing statistics,
//! near-zero SE, or more than two distinct allele letters across sources
//! are collected, written to `<out>.badsnps`, and reported back for
//! removal.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use tracing::info;

use crate::meta::registry::SnpRegistry;
use crate::meta::summary::GwasData;

const SE_EPSILON: f64 = 1e-6;

/// Harmonize alleles in place and return the sorted list of bad SNPs.
///
/// `ref_alleles` maps SNP names to the reference panel's (A1, A2).
/// When `out_prefix` is given, bad SNP names are written to
/// `<out_prefix>.badsnps`.
pub fn harmonize_and_filter(
    data: &mut GwasData,
    registry: &SnpRegistry,
    ref_alleles: &HashMap<String, (String, String)>,
    out_prefix: Option<&str>,
) -> Result<Vec<String>> {
    let n_traits = data.n_traits;
    let mut bad_snps = Vec::new();

    for &row in registry.remain() {
        let name = registry.name(row);
        let mut allele_buf: Vec<String> = Vec::new();
        let mut good = true;

        match ref_alleles.get(name) {
            Some((a1, a2)) => {
                allele_buf.push(a1.clone());
                allele_buf.push(a2.clone());
            }
            None => {
                for t in 0..n_traits {
                    if data.valid[t][row] {
                        allele_buf.push(data.a1[t][row].clone());
                        allele_buf.push(data.a2[t][row].clone());
                        break;
                    }
                }
            }
        }

        for t in 0..n_traits {
            if !data.valid[t][row] {
                continue;
            }
            allele_buf.push(data.a1[t][row].clone());
            allele_buf.push(data.a2[t][row].clone());

            if !data.beta[t][row].is_finite()
                || !data.se[t][row].is_finite()
                || !data.pval[t][row].is_finite()
                || !data.n[t][row].is_finite()
            {
                good = false;
                break;
            }
            if data.se[t][row] < SE_EPSILON {
                good = false;
                break;
            }
            if !allele_buf.is_empty() && allele_buf[0] != data.a1[t][row] {
                data.beta[t][row] = -data.beta[t][row];
                data.freq[t][row] = 1.0 - data.freq[t][row];
                let (a1, a2) = (data.a1[t][row].clone(), data.a2[t][row].clone());
                data.a1[t][row] = a2;
                data.a2[t][row] = a1;
            }
        }

        allele_buf.sort();
        allele_buf.dedup();
        if allele_buf.len() != 2 {
            good = false;
        }

        if !good {
            bad_snps.push(name.to_string());
        }
    }

    bad_snps.sort();
    if !bad_snps.is_empty() {
        if let Some(prefix) = out_prefix {
            let path = format!("{}.badsnps", prefix);
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("Cannot open the file [{}] to write", path))?;
            for snp in &bad_snps {
                writeln!(file, "{}", snp)?;
            }
            info!(
                "{} SNPs have missing values or mismatched alleles, saved to [{}]",
                bad_snps.len(),
                path
            );
        }
    }
    Ok(bad_snps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcta_geno::cojo::CojoRecord;

    fn record(snp: &str, a1: &str, a2: &str, beta: f64, se: f64) -> CojoRecord {
        CojoRecord {
            snp: snp.to_string(),
            a1: a1.to_string(),
            a2: a2.to_string(),
            freq: 0.3,
            beta,
            se,
            pval: 1e-5,
            n: 10000.0,
        }
    }

    fn setup(records_per_trait: Vec<Vec<CojoRecord>>, names: &[&str]) -> (GwasData, SnpRegistry) {
        let registry =
            SnpRegistry::new(names.iter().map(|s| s.to_string()).collect()).unwrap();
        let mut data = GwasData::new(records_per_trait.len(), registry.len());
        for (t, records) in records_per_trait.iter().enumerate() {
            data.fill_trait(t, &format!("t{t}"), records, &registry).unwrap();
        }
        (data, registry)
    }

    #[test]
    fn test_strand_flip() {
        let (mut data, registry) = setup(
            vec![
                vec![record("rs1", "A", "G", 0.10, 0.01)],
                vec![record("rs1", "G", "A", 0.20, 0.01)],
            ],
            &["rs1"],
        );
        let ref_alleles = HashMap::new();
        let bad = harmonize_and_filter(&mut data, &registry, &ref_alleles, None).unwrap();
        assert!(bad.is_empty());
        // covariate flipped onto the target's orientation
        assert_eq!(data.a1[1][0], "A");
        assert_eq!(data.a2[1][0], "G");
        assert!((data.beta[1][0] + 0.20).abs() < 1e-12);
        assert!((data.freq[1][0] - 0.7).abs() < 1e-12);
        // target untouched
        assert!((data.beta[0][0] - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_harmonization_is_fixed_point() {
        let (mut data, registry) = setup(
            vec![
                vec![record("rs1", "A", "G", 0.10, 0.01)],
                vec![record("rs1", "G", "A", 0.20, 0.01)],
            ],
            &["rs1"],
        );
        let ref_alleles = HashMap::new();
        harmonize_and_filter(&mut data, &registry, &ref_alleles, None).unwrap();
        let snapshot = data.clone();
        harmonize_and_filter(&mut data, &registry, &ref_alleles, None).unwrap();
        assert_eq!(data.a1, snapshot.a1);
        assert_eq!(data.beta[1][0], snapshot.beta[1][0]);
        assert_eq!(data.freq[1][0], snapshot.freq[1][0]);
    }

    #[test]
    fn test_reference_panel_orientation_wins() {
        let (mut data, registry) =
            setup(vec![vec![record("rs1", "A", "G", 0.10, 0.01)]], &["rs1"]);
        let mut ref_alleles = HashMap::new();
        ref_alleles.insert("rs1".to_string(), ("G".to_string(), "A".to_string()));
        harmonize_and_filter(&mut data, &registry, &ref_alleles, None).unwrap();
        assert_eq!(data.a1[0][0], "G");
        assert!((data.beta[0][0] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_multi_allelic_rejected() {
        let (mut data, registry) = setup(
            vec![
                vec![record("rs1", "A", "G", 0.10, 0.01)],
                vec![record("rs1", "A", "C", 0.20, 0.01)],
            ],
            &["rs1"],
        );
        let bad =
            harmonize_and_filter(&mut data, &registry, &HashMap::new(), None).unwrap();
        assert_eq!(bad, vec!["rs1"]);
    }

    #[test]
    fn test_tiny_se_rejected() {
        let (mut data, registry) =
            setup(vec![vec![record("rs1", "A", "G", 0.10, 1e-8)]], &["rs1"]);
        let bad =
            harmonize_and_filter(&mut data, &registry, &HashMap::new(), None).unwrap();
        assert_eq!(bad, vec!["rs1"]);
    }

    /// Checks are addressed through remain[i] itself, not remain[remain[i]]:
    /// after a removal shifts the remain list, a bad SNP at a high registry
    /// index must still be caught.
    #[test]
    fn test_indexing_after_removal() {
        let (mut data, mut registry) = setup(
            vec![vec![
                record("rs1", "A", "G", 0.10, 0.01),
                record("rs2", "A", "G", 0.10, 0.01),
                record("rs3", "A", "G", 0.10, 1e-9),
            ]],
            &["rs1", "rs2", "rs3"],
        );
        registry.intersect_remove(&["rs1".to_string()]);
        assert_eq!(registry.remain(), &[1, 2]);
        let bad =
            harmonize_and_filter(&mut data, &registry, &HashMap::new(), None).unwrap();
        assert_eq!(bad, vec!["rs3"]);
    }

    #[test]
    fn test_badsnps_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run").display().to_string();
        let (mut data, registry) =
            setup(vec![vec![record("rs1", "A", "G", 0.10, 1e-9)]], &["rs1"]);
        harmonize_and_filter(&mut data, &registry, &HashMap::new(), Some(&prefix)).unwrap();
        let written = std::fs::read_to_string(format!("{}.badsnps", prefix)).unwrap();
        assert_eq!(written.trim(), "rs1");
    }
}
