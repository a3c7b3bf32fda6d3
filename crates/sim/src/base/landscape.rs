//! Sparse epistatic landscapes for genomes too long to enumerate.
//!
//! A trait is written in the same ±1 basis as [`crate::base::Hypercube`], but
//! only the non-zero coefficients are stored:
//!
//! ```text
//! trait(g) = sum_k value_k * prod_{i in loci_k} s_i(g)
//! ```

use serde::{Deserialize, Serialize};

use crate::base::Genotype;
use crate::errors::{PopulationError, Result};

/// One term of a sparse landscape: `value` times the spin product over `loci`.
///
/// An empty locus list is a constant offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub value: f64,
    pub loci: Vec<usize>,
}

/// Sparse landscape over genomes of a fixed length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitLandscape {
    loci: usize,
    coefficients: Vec<Coefficient>,
}

impl TraitLandscape {
    /// The flat (all-zero) landscape.
    pub fn new(loci: usize) -> Self {
        Self {
            loci,
            coefficients: Vec::new(),
        }
    }

    /// Number of loci this landscape is defined on.
    pub fn number_of_loci(&self) -> usize {
        self.loci
    }

    /// Stored terms.
    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// `true` if no term is stored.
    pub fn is_flat(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Remove every term.
    pub fn clear(&mut self) {
        self.coefficients.clear();
    }

    /// Add a term. Loci must be distinct and in range.
    pub fn add_coefficient(&mut self, value: f64, loci: &[usize]) -> Result<()> {
        if !value.is_finite() {
            return Err(PopulationError::InvalidRate {
                name: "landscape coefficient",
                value,
            });
        }
        let mut sorted = loci.to_vec();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(PopulationError::InvalidArgument(format!(
                    "locus {} listed twice in one coefficient",
                    pair[0]
                )));
            }
        }
        if let Some(&last) = sorted.last() {
            PopulationError::check_locus(last, self.loci)?;
        }
        self.coefficients.push(Coefficient {
            value,
            loci: sorted,
        });
        Ok(())
    }

    /// Replace the landscape by first-order terms, one per locus.
    ///
    /// Zero coefficients are skipped.
    pub fn set_additive(&mut self, coeffs: &[f64]) -> Result<()> {
        PopulationError::check_len("additive coefficients", self.loci, coeffs.len())?;
        let mut next = Self::new(self.loci);
        for (locus, &c) in coeffs.iter().enumerate() {
            if c != 0.0 {
                next.add_coefficient(c, &[locus])?;
            }
        }
        *self = next;
        Ok(())
    }

    /// Evaluate the landscape on `genotype`.
    pub fn evaluate(&self, genotype: &Genotype) -> f64 {
        self.coefficients
            .iter()
            .map(|c| c.value * genotype.spin_product(&c.loci))
            .sum()
    }
}
