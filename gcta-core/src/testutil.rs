//! In-memory genotype panel for unit tests.

use std::collections::HashMap;

use anyhow::{bail, Result};
use gcta_geno::traits::{GenotypeReader, MarkerData, MarkerInfo};

pub struct MockPanel {
    markers: Vec<MarkerInfo>,
    dosages: Vec<Vec<f64>>,
    sample_ids: Vec<String>,
    marker_map: HashMap<String, usize>,
}

impl MockPanel {
    pub fn new(markers: Vec<(MarkerInfo, Vec<f64>)>) -> Self {
        let n_samples = markers.first().map(|m| m.1.len()).unwrap_or(0);
        let sample_ids = (0..n_samples).map(|i| format!("F{i}\tI{i}")).collect();
        let marker_map = markers
            .iter()
            .enumerate()
            .map(|(i, m)| (m.0.id.clone(), i))
            .collect();
        let (markers, dosages) = markers.into_iter().unzip();
        Self {
            markers,
            dosages,
            sample_ids,
            marker_map,
        }
    }

    pub fn marker(chrom: &str, pos: u64, id: &str, dosages: Vec<f64>) -> (MarkerInfo, Vec<f64>) {
        (
            MarkerInfo {
                chrom: chrom.to_string(),
                pos,
                id: id.to_string(),
                allele1: "A".to_string(),
                allele2: "G".to_string(),
            },
            dosages,
        )
    }
}

impl GenotypeReader for MockPanel {
    fn n_markers(&self) -> usize {
        self.markers.len()
    }

    fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn set_sample_subset(&mut self, _ids: &[String]) -> Result<()> {
        bail!("MockPanel does not support sample subsetting")
    }

    fn read_marker(&self, index: usize) -> Result<MarkerData> {
        let dosages = self.dosages[index].clone();
        let (af, n_valid) = MarkerData::compute_af(&dosages);
        Ok(MarkerData {
            info: self.markers[index].clone(),
            dosages,
            af,
            n_valid,
        })
    }

    fn marker_info(&self, index: usize) -> Result<MarkerInfo> {
        Ok(self.markers[index].clone())
    }

    fn marker_index(&self, id: &str) -> Option<usize> {
        self.marker_map.get(id).copied()
    }
}
