//! Population summary statistics shared by both engines.
//!
//! Both engines describe their population through the allele frequencies and
//! the raw second moments `<s_i s_j>` of the ±1 spins; everything else
//! (connected correlations, linkage disequilibrium, pair frequencies and
//! entropies) follows from those and is provided by [`PopulationStatistics`].

use serde::{Deserialize, Serialize};

use crate::errors::{PopulationError, Result};

/// Statistics available from any population engine.
pub trait PopulationStatistics {
    /// Number of loci `L`.
    fn number_of_loci(&self) -> usize;

    /// Frequency of allele 1 at `locus`.
    fn allele_frequency(&self, locus: usize) -> Result<f64>;

    /// Raw moment `<s_i s_j>` of the spins at two loci (1 when `l1 == l2`).
    fn moment(&self, l1: usize, l2: usize) -> Result<f64>;

    /// Shannon entropy `-sum p_g ln p_g` of the genotype distribution.
    fn genotype_entropy(&self) -> f64;

    /// Mean spin `chi_i = 2 nu_i - 1` at `locus`.
    fn chi(&self, locus: usize) -> Result<f64> {
        Ok(2.0 * self.allele_frequency(locus)? - 1.0)
    }

    /// Connected correlation `<s_i s_j> - chi_i chi_j`.
    fn chi2(&self, l1: usize, l2: usize) -> Result<f64> {
        Ok(self.moment(l1, l2)? - self.chi(l1)? * self.chi(l2)?)
    }

    /// Linkage disequilibrium `D_ij = chi2 / 4`.
    fn ld(&self, l1: usize, l2: usize) -> Result<f64> {
        Ok(0.25 * self.chi2(l1, l2)?)
    }

    /// Joint frequency of allele 1 at both loci.
    fn pair_frequency(&self, l1: usize, l2: usize) -> Result<f64> {
        Ok(0.25 * (1.0 + self.chi(l1)? + self.chi(l2)? + self.moment(l1, l2)?))
    }

    /// Sum over loci of the single-locus allele entropies.
    fn allele_entropy(&self) -> f64 {
        self.allele_frequencies()
            .into_iter()
            .map(|nu| -(xlogx(nu) + xlogx(1.0 - nu)))
            .sum()
    }

    /// Allele-1 frequency at every locus.
    fn allele_frequencies(&self) -> Vec<f64> {
        (0..self.number_of_loci())
            .map(|l| self.allele_frequency(l).unwrap_or(0.0))
            .collect()
    }
}

/// `x ln x`, continued with 0 at 0.
#[inline]
pub fn xlogx(x: f64) -> f64 {
    if x > 0.0 {
        x * x.ln()
    } else {
        0.0
    }
}

/// Mean and variance of a sample or of a weighted population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStatistic {
    pub mean: f64,
    pub variance: f64,
}

impl SampleStatistic {
    /// Mean and (population) variance of `values`; zero for an empty slice.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self { mean, variance }
    }

    /// Weighted mean and variance; zero if the weights sum to zero.
    pub fn from_weighted<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)> + Clone,
    {
        let total: f64 = pairs.clone().into_iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Self::default();
        }
        let mean = pairs.clone().into_iter().map(|(v, w)| v * w).sum::<f64>() / total;
        let variance = pairs
            .into_iter()
            .map(|(v, w)| w * (v - mean).powi(2))
            .sum::<f64>()
            / total;
        Self { mean, variance }
    }
}

/// Histogram with `counts.len()` equal-width bins delimited by `edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width bins spanning their range.
    ///
    /// The last bin is closed on the right. A sample of identical values
    /// is spread over a unit-width range centred on that value.
    pub fn from_values(values: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(PopulationError::InvalidArgument(
                "histogram needs at least one bin".into(),
            ));
        }
        if values.is_empty() {
            return Err(PopulationError::InvalidArgument(
                "histogram of an empty sample".into(),
            ));
        }
        let (mut lo, mut hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0u64; bins];
        for &v in values {
            let bin = (((v - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Ok(Self { edges, counts })
    }

    /// Total number of binned values.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
