//! COJO-format GWAS summary statistics and the mtCOJO metafile list.
//!
//! A COJO summary file has a header row and 8 whitespace-separated columns:
//! `SNP A1 A2 freq b se p N`. Missing numerics are `NA`, `NAN` or `.`
//! (case-insensitive). The metafile list names the target trait on the
//! first line and one covariate trait per following line:
//! `name summary_file [sample_prevalence population_prevalence]`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

/// One trait declared in the metafile list.
#[derive(Debug, Clone)]
pub struct TraitMeta {
    pub name: String,
    pub file: PathBuf,
    pub sample_prev: Option<f64>,
    pub pop_prev: Option<f64>,
}

/// Parsed metafile list: the target trait plus its covariate traits.
#[derive(Debug, Clone)]
pub struct MetaList {
    pub target: TraitMeta,
    pub covariates: Vec<TraitMeta>,
}

impl MetaList {
    /// Traits in analysis order: target first, then covariates.
    pub fn traits(&self) -> impl Iterator<Item = &TraitMeta> {
        std::iter::once(&self.target).chain(self.covariates.iter())
    }

    pub fn n_traits(&self) -> usize {
        1 + self.covariates.len()
    }
}

/// Is this token one of the missing-value spellings?
fn is_missing(token: &str) -> bool {
    matches!(token.to_uppercase().as_str(), "NA" | "NAN" | ".")
}

fn parse_numeric(token: &str) -> f64 {
    if is_missing(token) {
        f64::NAN
    } else {
        token.parse().unwrap_or(f64::NAN)
    }
}

fn parse_prevalence(token: &str, what: &str, trait_name: &str) -> Result<Option<f64>> {
    if is_missing(token) {
        return Ok(None);
    }
    let value: f64 = token
        .parse()
        .with_context(|| format!("Invalid {} for trait [{}]", what, trait_name))?;
    if !(0.0..=1.0).contains(&value) {
        bail!("Invalid {} for trait [{}]: {}", what, trait_name, value);
    }
    Ok(Some(value))
}

fn parse_meta_line(fields: &[&str], path: &Path, line_num: usize) -> Result<TraitMeta> {
    if fields.len() != 2 && fields.len() != 4 {
        bail!(
            "Format of file [{}] is not correct, line {}",
            path.display(),
            line_num
        );
    }
    let name = fields[0].to_string();
    let file = PathBuf::from(fields[1]);
    let (sample_prev, pop_prev) = if fields.len() == 4 {
        (
            parse_prevalence(fields[2], "sample prevalence", &name)?,
            parse_prevalence(fields[3], "population prevalence", &name)?,
        )
    } else {
        (None, None)
    };
    Ok(TraitMeta {
        name,
        file,
        sample_prev,
        pop_prev,
    })
}

/// Read the metafile list. The first line is the target trait; at least
/// one covariate line must follow.
pub fn read_metafile_list<P: AsRef<Path>>(path: P) -> Result<MetaList> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;

    let mut target = None;
    let mut covariates = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let meta = parse_meta_line(&fields, path, line_num + 1)?;
        if target.is_none() {
            target = Some(meta);
        } else {
            covariates.push(meta);
        }
    }

    let target = match target {
        Some(t) => t,
        None => bail!("The file [{}] is empty", path.display()),
    };
    if covariates.is_empty() {
        bail!(
            "The file [{}] lists no covariate traits for the mtCOJO analysis",
            path.display()
        );
    }
    Ok(MetaList { target, covariates })
}

/// One row of a COJO summary file. Missing numerics are NaN.
#[derive(Debug, Clone)]
pub struct CojoRecord {
    pub snp: String,
    pub a1: String,
    pub a2: String,
    pub freq: f64,
    pub beta: f64,
    pub se: f64,
    pub pval: f64,
    pub n: f64,
}

fn split_cojo_line<'a>(line: &'a str, path: &Path, line_num: usize) -> Result<Vec<&'a str>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 8 {
        bail!(
            "The GWAS summary data file [{}] should be in GCTA-COJO format, line {}",
            path.display(),
            line_num
        );
    }
    Ok(fields)
}

/// Read every row of a COJO summary file.
pub fn read_cojo_file<P: AsRef<Path>>(path: P) -> Result<Vec<CojoRecord>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;

    let mut records = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_cojo_line(line, path, line_num + 1)?;
        if line_num == 0 {
            continue; // header
        }
        records.push(CojoRecord {
            snp: fields[0].to_string(),
            a1: fields[1].to_uppercase(),
            a2: fields[2].to_uppercase(),
            freq: parse_numeric(fields[3]),
            beta: parse_numeric(fields[4]),
            se: parse_numeric(fields[5]),
            pval: parse_numeric(fields[6]),
            n: parse_numeric(fields[7]),
        });
    }
    info!("{} SNPs read from [{}]", records.len(), path.display());
    Ok(records)
}

/// Scan only the SNP names of a COJO summary file, optionally keeping
/// just those with p below `pval_thresh`.
pub fn read_cojo_snp_names<P: AsRef<Path>>(
    path: P,
    pval_thresh: Option<f64>,
) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;

    let mut names = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_cojo_line(line, path, line_num + 1)?;
        if line_num == 0 {
            continue;
        }
        match pval_thresh {
            Some(thresh) => {
                let pval = parse_numeric(fields[6]);
                if pval < thresh {
                    names.push(fields[0].to_string());
                }
            }
            None => names.push(fields[0].to_string()),
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_summary(dir: &Path) -> PathBuf {
        let path = dir.join("trait.cojo");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "SNP A1 A2 freq b se p N").unwrap();
        writeln!(f, "rs1 A G 0.3 0.10 0.01 1e-20 10000").unwrap();
        writeln!(f, "rs2 C T 0.4 NA 0.01 0.5 10000").unwrap();
        writeln!(f, "rs3 a g 0.2 -0.05 0.012 1e-3 9000").unwrap();
        path
    }

    #[test]
    fn test_read_cojo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary(dir.path());
        let records = read_cojo_file(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].snp, "rs1");
        assert!((records[0].beta - 0.10).abs() < 1e-12);
        assert!(records[1].beta.is_nan());
        // alleles uppercased
        assert_eq!(records[2].a1, "A");
        assert_eq!(records[2].a2, "G");
    }

    #[test]
    fn test_wrong_column_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cojo");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "SNP A1 A2 freq b se p N").unwrap();
        writeln!(f, "rs1 A G 0.3 0.10 0.01 1e-20").unwrap();
        assert!(read_cojo_file(&path).is_err());
    }

    #[test]
    fn test_snp_name_scan_with_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary(dir.path());
        let all = read_cojo_snp_names(&path, None).unwrap();
        assert_eq!(all, vec!["rs1", "rs2", "rs3"]);
        let sig = read_cojo_snp_names(&path, Some(1e-2)).unwrap();
        assert_eq!(sig, vec!["rs1", "rs3"]);
    }

    #[test]
    fn test_metafile_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traits.list");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "bmi bmi.cojo").unwrap();
        writeln!(f, "t2d t2d.cojo 0.3 0.08").unwrap();
        writeln!(f, "height height.cojo NA .").unwrap();

        let list = read_metafile_list(&path).unwrap();
        assert_eq!(list.target.name, "bmi");
        assert_eq!(list.covariates.len(), 2);
        assert_eq!(list.covariates[0].sample_prev, Some(0.3));
        assert_eq!(list.covariates[0].pop_prev, Some(0.08));
        assert_eq!(list.covariates[1].sample_prev, None);
        assert_eq!(list.n_traits(), 3);
    }

    #[test]
    fn test_invalid_prevalence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traits.list");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "bmi bmi.cojo").unwrap();
        writeln!(f, "t2d t2d.cojo 1.3 0.08").unwrap();
        assert!(read_metafile_list(&path).is_err());
    }

    #[test]
    fn test_metafile_bad_column_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traits.list");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "bmi bmi.cojo 0.5").unwrap();
        assert!(read_metafile_list(&path).is_err());
    }
}
