//! Options shared by both population engines.

use serde::{Deserialize, Serialize};

use crate::errors::{PopulationError, Result};
use crate::evolution::{RecombinationModel, SizeRegulation};

/// Construction options of a population.
///
/// Can be deserialized from a run configuration file. Everything except the
/// number of loci can also be changed on the engine later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of loci `L`, fixed for the lifetime of the population
    pub loci: usize,
    /// Optional RNG seed for reproducibility
    #[serde(default)]
    pub seed: Option<u64>,
    /// Whether locus `L - 1` is adjacent to locus 0
    #[serde(default)]
    pub circular: bool,
    /// Carrying capacity; defaults to the size given at initialization
    #[serde(default)]
    pub carrying_capacity: Option<f64>,
    /// Probability that an individual reproduces sexually
    #[serde(default)]
    pub outcrossing_rate: f64,
    #[serde(default)]
    pub recombination_model: RecombinationModel,
    #[serde(default)]
    pub size_regulation: SizeRegulation,
    /// Number of quantitative traits (clone engine only)
    #[serde(default = "default_traits")]
    pub number_of_traits: usize,
}

fn default_traits() -> usize {
    1
}

impl PopulationConfig {
    /// Default options for `loci` loci.
    pub fn new(loci: usize) -> Self {
        Self {
            loci,
            seed: None,
            circular: false,
            carrying_capacity: None,
            outcrossing_rate: 0.0,
            recombination_model: RecombinationModel::default(),
            size_regulation: SizeRegulation::default(),
            number_of_traits: default_traits(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    pub fn carrying_capacity(mut self, capacity: f64) -> Self {
        self.carrying_capacity = Some(capacity);
        self
    }

    pub fn outcrossing_rate(mut self, rate: f64) -> Self {
        self.outcrossing_rate = rate;
        self
    }

    pub fn recombination_model(mut self, model: RecombinationModel) -> Self {
        self.recombination_model = model;
        self
    }

    pub fn size_regulation(mut self, policy: SizeRegulation) -> Self {
        self.size_regulation = policy;
        self
    }

    pub fn number_of_traits(mut self, traits: usize) -> Self {
        self.number_of_traits = traits;
        self
    }

    /// Check the options that do not depend on the engine.
    pub fn validate(&self) -> Result<()> {
        if self.loci == 0 {
            return Err(PopulationError::InvalidArgument(
                "a population needs at least one locus".into(),
            ));
        }
        check_outcrossing_rate(self.outcrossing_rate)?;
        if let Some(k) = self.carrying_capacity {
            check_carrying_capacity(k)?;
        }
        if self.number_of_traits == 0 {
            return Err(PopulationError::InvalidArgument(
                "at least one trait is required".into(),
            ));
        }
        if self.circular && self.recombination_model == RecombinationModel::SingleCrossover {
            return Err(PopulationError::InvalidArgument(
                "single crossover is not available on circular genomes".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_outcrossing_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && (0.0..=1.0).contains(&rate)) {
        return Err(PopulationError::InvalidRate {
            name: "outcrossing rate",
            value: rate,
        });
    }
    Ok(())
}

pub(crate) fn check_carrying_capacity(capacity: f64) -> Result<()> {
    if !(capacity.is_finite() && capacity > 0.0) {
        return Err(PopulationError::InvalidRate {
            name: "carrying capacity",
            value: capacity,
        });
    }
    Ok(())
}

/// Validate a generation count given at the API.
pub(crate) fn check_generations(generations: i64) -> Result<u64> {
    u64::try_from(generations).map_err(|_| {
        PopulationError::InvalidArgument(format!(
            "number of generations must be non-negative, got {generations}"
        ))
    })
}
