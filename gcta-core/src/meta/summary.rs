//! Per-trait summary-statistic arrays aligned to the SNP registry.
//!
//! Column layout is fixed: trait 0 is the target, traits 1.. are the
//! covariates in metafile order. Arrays keep full registry length; the
//! registry's remain list decides which rows are alive.

use gcta_geno::cojo::CojoRecord;
use tracing::info;

use crate::error::CoreError;
use crate::meta::registry::SnpRegistry;
use crate::util::stats::median;

#[derive(Debug, Clone)]
pub struct GwasData {
    pub n_traits: usize,
    /// Effect allele per trait and SNP, harmonized in place by QC.
    pub a1: Vec<Vec<String>>,
    pub a2: Vec<Vec<String>>,
    /// Effect-allele frequency, [trait][snp].
    pub freq: Vec<Vec<f64>>,
    pub beta: Vec<Vec<f64>>,
    pub se: Vec<Vec<f64>>,
    pub pval: Vec<Vec<f64>>,
    pub n: Vec<Vec<f64>>,
    /// Whether the SNP appeared in trait t's file with all fields finite.
    pub valid: Vec<Vec<bool>>,
    /// Median phenotypic variance per trait.
    pub vp: Vec<f64>,
}

impl GwasData {
    pub fn new(n_traits: usize, nsnp: usize) -> Self {
        Self {
            n_traits,
            a1: vec![vec![String::new(); nsnp]; n_traits],
            a2: vec![vec![String::new(); nsnp]; n_traits],
            freq: vec![vec![f64::NAN; nsnp]; n_traits],
            beta: vec![vec![f64::NAN; nsnp]; n_traits],
            se: vec![vec![f64::NAN; nsnp]; n_traits],
            pval: vec![vec![f64::NAN; nsnp]; n_traits],
            n: vec![vec![f64::NAN; nsnp]; n_traits],
            valid: vec![vec![false; nsnp]; n_traits],
            vp: vec![f64::NAN; n_traits],
        }
    }

    /// Fill trait t's arrays from parsed summary records, skipping SNPs
    /// absent from the registry, and estimate the trait's phenotypic
    /// variance as the median of 2f(1-f)*(b^2 + N*se^2) over SNPs with
    /// complete fields.
    pub fn fill_trait(
        &mut self,
        t: usize,
        trait_name: &str,
        records: &[CojoRecord],
        registry: &SnpRegistry,
    ) -> Result<(), CoreError> {
        let mut vp_values = Vec::new();
        let mut n_matched = 0usize;
        for rec in records {
            let idx = match registry.index_of(&rec.snp) {
                Some(i) => i,
                None => continue,
            };
            n_matched += 1;
            self.a1[t][idx] = rec.a1.clone();
            self.a2[t][idx] = rec.a2.clone();
            self.freq[t][idx] = rec.freq;
            self.beta[t][idx] = rec.beta;
            self.se[t][idx] = rec.se;
            self.pval[t][idx] = rec.pval;
            self.n[t][idx] = rec.n;

            let complete = rec.freq.is_finite()
                && rec.beta.is_finite()
                && rec.se.is_finite()
                && rec.pval.is_finite()
                && rec.n.is_finite();
            self.valid[t][idx] = complete;
            if complete {
                let het = 2.0 * rec.freq * (1.0 - rec.freq);
                vp_values.push(het * rec.beta * rec.beta + het * rec.n * rec.se * rec.se);
            }
        }

        let vp = if vp_values.is_empty() {
            0.0
        } else {
            median(&vp_values)
        };
        if vp < 0.0 {
            return Err(CoreError::InvalidParameter(format!(
                "Negative phenotypic variance for trait [{}]",
                trait_name
            )));
        }
        self.vp[t] = vp;
        info!(
            "Trait [{}]: {} SNPs matched, Vp = {:.4}",
            trait_name, n_matched, vp
        );
        Ok(())
    }

    /// Joint validity of a SNP across two traits.
    pub fn pair_valid(&self, t1: usize, t2: usize, snp: usize) -> bool {
        self.valid[t1][snp] && self.valid[t2][snp]
    }
}
