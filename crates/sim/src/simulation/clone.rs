//! Clones and clone-list maintenance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::base::Genotype;
use crate::errors::Result;

/// A group of individuals sharing one genotype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneRecord {
    pub genotype: Genotype,
    pub clone_size: u64,
    /// Value of every trait for this genotype
    pub traits: Vec<f64>,
    /// Log-fitness
    pub fitness: f64,
}

/// Accumulates `(genotype, count)` pairs, merging identical genotypes
/// through a genotype → slot index.
#[derive(Debug, Default)]
pub(crate) struct CloneTally {
    slots: HashMap<Genotype, usize>,
    entries: Vec<(Genotype, u64)>,
}

impl CloneTally {
    /// Reserve room for `capacity` distinct genotypes up front.
    pub(crate) fn try_with_capacity(capacity: usize) -> Result<Self> {
        let mut tally = Self::default();
        tally.slots.try_reserve(capacity)?;
        tally.entries.try_reserve_exact(capacity)?;
        Ok(tally)
    }

    /// Add `count` individuals of `genotype`.
    pub(crate) fn add(&mut self, genotype: Genotype, count: u64) {
        if count == 0 {
            return;
        }
        match self.slots.get(&genotype) {
            Some(&slot) => self.entries[slot].1 += count,
            None => {
                self.slots.insert(genotype.clone(), self.entries.len());
                self.entries.push((genotype, count));
            }
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    /// Distinct genotypes with positive counts, in order of first appearance.
    pub(crate) fn finish(self) -> Vec<(Genotype, u64)> {
        self.entries
    }
}
