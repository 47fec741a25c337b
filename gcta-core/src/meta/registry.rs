//! Canonical SNP registry.
//!
//! Maps SNP names to dense indices and tracks the ordered "remain" list of
//! SNPs still alive after filtering. All per-SNP vectors and matrices in
//! the mtCOJO pipeline are indexed by registry position; filtering only
//! shrinks `remain`, never the arrays, until `compact` is called.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct SnpRegistry {
    names: Vec<String>,
    name_map: HashMap<String, usize>,
    /// Indices of surviving SNPs, always sorted ascending.
    remain: Vec<usize>,
}

/// Reject lists that name the same SNP twice.
pub fn check_duplicates(names: &[String]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(CoreError::DuplicateSnp(name.clone()));
        }
    }
    Ok(())
}

impl SnpRegistry {
    /// Build a registry from a SNP name list; every SNP starts alive.
    pub fn new(names: Vec<String>) -> Result<Self, CoreError> {
        check_duplicates(&names)?;
        let name_map = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let remain = (0..names.len()).collect();
        Ok(Self {
            names,
            name_map,
            remain,
        })
    }

    /// Total number of registered SNPs (alive or not).
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of surviving SNPs.
    pub fn n_remain(&self) -> usize {
        self.remain.len()
    }

    /// Surviving registry indices, ascending.
    pub fn remain(&self) -> &[usize] {
        &self.remain
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_map.get(name).copied()
    }

    /// Retain only the surviving SNPs whose name is in `names`.
    pub fn intersect_keep(&mut self, names: &[String]) {
        let wanted: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        self.remain
            .retain(|&i| wanted.contains(self.names[i].as_str()));
    }

    /// Drop the given names from the surviving set.
    pub fn intersect_remove(&mut self, names: &[String]) {
        let unwanted: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        self.remain
            .retain(|&i| !unwanted.contains(self.names[i].as_str()));
    }

    /// Rebuild contiguous indices over the surviving SNPs.
    ///
    /// Returns the permutation: element k is the old index of the SNP now
    /// registered at index k. Callers use it to reindex their arrays.
    pub fn compact(&mut self) -> Vec<usize> {
        let permutation = std::mem::take(&mut self.remain);
        self.names = permutation.iter().map(|&i| self.names[i].clone()).collect();
        self.name_map = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        self.remain = (0..self.names.len()).collect();
        permutation
    }
}
