//! PLINK bed/bim/fam reader using memory-mapped files.
//!
//! PLINK 1 binary layout: a 3-byte header (magic 0x6C 0x1B, mode 0x01 for
//! SNP-major), then ceil(N/4) bytes per marker with 2 bits per genotype.
//! Reference: https://www.cog-genomics.org/plink/1.9/formats#bed

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use crate::traits::{GenotypeReader, MarkerData, MarkerInfo};

/// One .bim row.
#[derive(Debug, Clone)]
pub struct BimEntry {
    pub chrom: String,
    pub id: String,
    pub pos: u64,
    pub allele1: String,
    pub allele2: String,
}

/// One .fam row.
#[derive(Debug, Clone)]
pub struct FamEntry {
    pub fid: String,
    pub iid: String,
    /// Sixth column; NaN when coded missing (-9, NA).
    pub pheno: f64,
}

/// Memory-mapped reader over a PLINK fileset.
pub struct PlinkReader {
    mmap: Mmap,
    bim: Vec<BimEntry>,
    fam: Vec<FamEntry>,
    marker_map: HashMap<String, usize>,
    n_samples_total: usize,
    bytes_per_marker: usize,
    /// "FID\tIID" for the selected samples.
    sample_ids: Vec<String>,
    /// Raw fam indices of the selected samples, panel order.
    sample_subset: Option<Vec<usize>>,
}

impl PlinkReader {
    /// Open `<prefix>.bed`, `<prefix>.bim` and `<prefix>.fam`.
    pub fn new<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let base = prefix.as_ref();
        let bed_path = base.with_extension("bed");
        let bim_path = base.with_extension("bim");
        let fam_path = base.with_extension("fam");

        let fam = Self::parse_fam(&fam_path)?;
        let bim = Self::parse_bim(&bim_path)?;
        let n_samples = fam.len();

        let bed_file = std::fs::File::open(&bed_path)
            .with_context(|| format!("Cannot open the file [{}] to read", bed_path.display()))?;
        let mmap = unsafe { Mmap::map(&bed_file)? };

        if mmap.len() < 3 {
            bail!("Bed file [{}] is truncated", bed_path.display());
        }
        if mmap[0] != 0x6C || mmap[1] != 0x1B {
            bail!("Invalid PLINK bed magic number in [{}]", bed_path.display());
        }
        if mmap[2] != 0x01 {
            bail!("Only SNP-major bed files are supported (mode byte 0x01)");
        }

        let bytes_per_marker = n_samples.div_ceil(4);
        let expected = 3 + bytes_per_marker * bim.len();
        if mmap.len() < expected {
            bail!(
                "Bed file [{}] too small: expected {} bytes, found {}",
                bed_path.display(),
                expected,
                mmap.len()
            );
        }

        let mut marker_map = HashMap::with_capacity(bim.len());
        for (i, entry) in bim.iter().enumerate() {
            marker_map.insert(entry.id.clone(), i);
        }

        let sample_ids: Vec<String> = fam
            .iter()
            .map(|f| format!("{}\t{}", f.fid, f.iid))
            .collect();

        Ok(Self {
            mmap,
            bim,
            fam,
            marker_map,
            n_samples_total: n_samples,
            bytes_per_marker,
            sample_ids,
            sample_subset: None,
        })
    }

    fn parse_fam(path: &Path) -> Result<Vec<FamEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!(
                    "Fam file [{}] line {} has fewer than 6 fields",
                    path.display(),
                    line_num + 1
                );
            }
            let pheno = match fields[5] {
                "-9" | "NA" | "." => f64::NAN,
                v => v.parse().unwrap_or(f64::NAN),
            };
            entries.push(FamEntry {
                fid: fields[0].to_string(),
                iid: fields[1].to_string(),
                pheno,
            });
        }
        Ok(entries)
    }

    fn parse_bim(path: &Path) -> Result<Vec<BimEntry>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open the file [{}] to read", path.display()))?;
        let mut entries = Vec::new();
        for (line_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                bail!(
                    "Bim file [{}] line {} has fewer than 6 fields",
                    path.display(),
                    line_num + 1
                );
            }
            entries.push(BimEntry {
                chrom: fields[0].to_string(),
                id: fields[1].to_string(),
                pos: fields[3].parse().unwrap_or(0),
                allele1: fields[4].to_uppercase(),
                allele2: fields[5].to_uppercase(),
            });
        }
        Ok(entries)
    }

    /// Decode one 2-bit genotype as a dosage of allele1.
    #[inline]
    fn decode_genotype(byte: u8, offset: usize) -> f64 {
        match (byte >> (offset * 2)) & 0x03 {
            0b00 => 2.0,
            0b01 => f64::NAN, // missing
            0b10 => 1.0,
            0b11 => 0.0,
            _ => unreachable!(),
        }
    }

    fn read_marker_raw(&self, index: usize) -> Vec<f64> {
        let offset = 3 + index * self.bytes_per_marker;
        let mut dosages = Vec::with_capacity(self.n_samples_total);
        for sample_idx in 0..self.n_samples_total {
            let byte = self.mmap[offset + sample_idx / 4];
            dosages.push(Self::decode_genotype(byte, sample_idx % 4));
        }
        dosages
    }

    pub fn fam(&self) -> &[FamEntry] {
        &self.fam
    }

    pub fn bim(&self) -> &[BimEntry] {
        &self.bim
    }

    /// Phenotype column of the .fam file, in the order of the current
    /// sample selection.
    pub fn fam_phenotypes(&self) -> Vec<f64> {
        match &self.sample_subset {
            Some(indices) => indices.iter().map(|&i| self.fam[i].pheno).collect(),
            None => self.fam.iter().map(|f| f.pheno).collect(),
        }
    }
}

impl GenotypeReader for PlinkReader {
    fn n_markers(&self) -> usize {
        self.bim.len()
    }

    fn n_samples(&self) -> usize {
        match &self.sample_subset {
            Some(indices) => indices.len(),
            None => self.n_samples_total,
        }
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn set_sample_subset(&mut self, ids: &[String]) -> Result<()> {
        let wanted: std::collections::HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let mut indices = Vec::new();
        let mut new_ids = Vec::new();
        for (i, f) in self.fam.iter().enumerate() {
            let mark = format!("{}\t{}", f.fid, f.iid);
            if wanted.contains(mark.as_str()) {
                indices.push(i);
                new_ids.push(mark);
            }
        }
        self.sample_subset = Some(indices);
        self.sample_ids = new_ids;
        Ok(())
    }

    fn read_marker(&self, index: usize) -> Result<MarkerData> {
        if index >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }

        let all_dosages = self.read_marker_raw(index);
        let dosages = match &self.sample_subset {
            Some(indices) => indices.iter().map(|&i| all_dosages[i]).collect(),
            None => all_dosages,
        };

        let (af, n_valid) = MarkerData::compute_af(&dosages);
        Ok(MarkerData {
            info: self.marker_info(index)?,
            dosages,
            af,
            n_valid,
        })
    }

    fn marker_info(&self, index: usize) -> Result<MarkerInfo> {
        if index >= self.bim.len() {
            bail!("Marker index {} out of range ({})", index, self.bim.len());
        }
        let entry = &self.bim[index];
        Ok(MarkerInfo {
            chrom: entry.chrom.clone(),
            pos: entry.pos,
            id: entry.id.clone(),
            allele1: entry.allele1.clone(),
            allele2: entry.allele2.clone(),
        })
    }

    fn marker_index(&self, id: &str) -> Option<usize> {
        self.marker_map.get(id).copied()
    }
}
