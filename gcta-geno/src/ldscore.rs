//! LD-score tile reader.
//!
//! LD scores come as per-chromosome files under a directory prefix:
//! `<prefix>1.l2.ldscore` .. `<prefix>22.l2.ldscore`, plain text or
//! gzipped (`.gz`), six tab/space-separated columns with the SNP name in
//! column 2 and the score in column 6, plus a header row. Each chromosome
//! also carries a `<prefix><chr>.l2.M_5_50` companion holding a single
//! float, the marker count entering the regression denominator.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use tracing::info;

const CHR_COUNT: usize = 22;

/// Sum the `.l2.M_5_50` marker counts over chromosomes 1..22.
pub fn read_marker_total(prefix: &str) -> Result<f64> {
    let mut total = 0.0;
    for chr in 1..=CHR_COUNT {
        let path = format!("{}{}.l2.M_5_50", prefix, chr);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Cannot open the file [{}] to read", path))?;
        let fields: Vec<&str> = contents.split_whitespace().collect();
        if fields.len() != 1 {
            bail!("Format of file [{}] is not correct", path);
        }
        let count: f64 = fields[0]
            .parse()
            .with_context(|| format!("Format of file [{}] is not correct", path))?;
        total += count;
    }
    Ok(total)
}

fn scan_ldscore_lines<R: BufRead>(
    reader: R,
    path: &str,
    wanted: &HashMap<String, usize>,
    scores: &mut [f64],
    matched: &mut Vec<String>,
) -> Result<()> {
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read [{}]", path))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 6 {
            bail!("Format of file [{}] is not correct, line {}", path, line_num + 1);
        }
        if line_num == 0 {
            continue; // header
        }
        let snp = fields[1];
        if let Some(&idx) = wanted.get(snp) {
            let score: f64 = fields[5].parse().with_context(|| {
                format!("Format of file [{}] is not correct, line {}", path, line_num + 1)
            })?;
            scores[idx] = score;
            matched.push(snp.to_string());
        }
    }
    Ok(())
}

/// Read LD scores for the SNPs in `wanted` (name -> slot) across all
/// chromosome tiles under `prefix`. Slots without a score stay at -9.
///
/// Returns the score vector and the names found, in tile order.
pub fn read_ld_scores(
    prefix: &str,
    wanted: &HashMap<String, usize>,
    nsnp: usize,
) -> Result<(Vec<f64>, Vec<String>)> {
    let mut scores = vec![-9.0; nsnp];
    let mut matched = Vec::new();

    for chr in 1..=CHR_COUNT {
        let txt_path = format!("{}{}.l2.ldscore", prefix, chr);
        let gz_path = format!("{}{}.l2.ldscore.gz", prefix, chr);
        if Path::new(&txt_path).exists() {
            let file = std::fs::File::open(&txt_path)
                .with_context(|| format!("Cannot open the file [{}] to read", txt_path))?;
            scan_ldscore_lines(
                BufReader::new(file),
                &txt_path,
                wanted,
                &mut scores,
                &mut matched,
            )?;
        } else if Path::new(&gz_path).exists() {
            let file = std::fs::File::open(&gz_path)
                .with_context(|| format!("Cannot open the file [{}] to read", gz_path))?;
            scan_ldscore_lines(
                BufReader::new(MultiGzDecoder::new(file)),
                &gz_path,
                wanted,
                &mut scores,
                &mut matched,
            )?;
        } else {
            bail!(
                "Cannot open the file [{}] or [{}] to read",
                txt_path,
                gz_path
            );
        }
    }

    info!(
        "LD scores for {} SNPs read from [{}1..{}.l2.ldscore]",
        matched.len(),
        prefix,
        CHR_COUNT
    );
    Ok((scores, matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_tiles(dir: &Path, gz_chr: usize) -> String {
        let prefix = format!("{}/", dir.display());
        for chr in 1..=CHR_COUNT {
            let m_path = format!("{}{}.l2.M_5_50", prefix, chr);
            std::fs::write(&m_path, "1000.0\n").unwrap();

            let body = if chr == 1 {
                "CHR SNP BP CM MAF L2\n1 rs1 1000 0 0.3 12.5\n1 rs2 2000 0 0.4 3.25\n"
            } else {
                "CHR SNP BP CM MAF L2\n"
            };
            if chr == gz_chr {
                let f = std::fs::File::create(format!("{}{}.l2.ldscore.gz", prefix, chr)).unwrap();
                let mut enc = GzEncoder::new(f, Compression::default());
                enc.write_all(body.as_bytes()).unwrap();
                enc.finish().unwrap();
            } else {
                std::fs::write(format!("{}{}.l2.ldscore", prefix, chr), body).unwrap();
            }
        }
        prefix
    }

    #[test]
    fn test_marker_total() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_tiles(dir.path(), 0);
        let total = read_marker_total(&prefix).unwrap();
        assert!((total - 22_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_scores_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_tiles(dir.path(), 1); // chromosome 1 gzipped

        let mut wanted = HashMap::new();
        wanted.insert("rs1".to_string(), 0);
        wanted.insert("rs2".to_string(), 1);
        wanted.insert("rs_absent".to_string(), 2);

        let (scores, matched) = read_ld_scores(&prefix, &wanted, 3).unwrap();
        assert!((scores[0] - 12.5).abs() < 1e-12);
        assert!((scores[1] - 3.25).abs() < 1e-12);
        assert_eq!(scores[2], -9.0);
        assert_eq!(matched, vec!["rs1", "rs2"]);
    }

    #[test]
    fn test_missing_tile() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/", dir.path().display());
        let wanted = HashMap::new();
        assert!(read_ld_scores(&prefix, &wanted, 0).is_err());
    }
}
