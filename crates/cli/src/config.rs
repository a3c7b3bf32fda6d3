//! JSON run configuration consumed by `hapsim run`.

use anyhow::{bail, Context, Result};
use hapsim::evolution::{MutationRates, RecombinationMap, RecombinationModel};
use hapsim::PopulationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::defaults;

/// Which engine evolves the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Full genotype distribution, up to 20 loci
    Exact,
    /// Sparse clone list, any number of loci
    Clone,
}

/// Population at generation 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialState {
    Wildtype { size: u64 },
    AlleleFrequencies { frequencies: Vec<f64>, size: u64 },
    /// Each genotype is given by its derived loci.
    Genotypes { genotypes: Vec<Vec<usize>>, counts: Vec<u64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationSpec {
    Uniform(f64),
    Asymmetric { forward: f64, backward: f64 },
    PerLocus(Vec<f64>),
    Table { forward: Vec<f64>, backward: Vec<f64> },
}

impl MutationSpec {
    pub fn rates(&self, loci: usize) -> Result<MutationRates> {
        let rates = match self {
            Self::Uniform(mu) => MutationRates::uniform(*mu, loci),
            Self::Asymmetric { forward, backward } => {
                MutationRates::asymmetric(*forward, *backward, loci)
            }
            Self::PerLocus(rates) => MutationRates::per_locus(rates),
            Self::Table { forward, backward } => {
                MutationRates::new(forward.clone(), backward.clone())
            }
        };
        Ok(rates?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecombinationSpec {
    Uniform(f64),
    PerInterval(Vec<f64>),
}

impl RecombinationSpec {
    /// Rates for the map of `population`, one per interval.
    pub fn rates(&self, population: &PopulationConfig) -> Vec<f64> {
        match self {
            Self::Uniform(rate) => {
                let intervals = RecombinationMap::intervals(population.loci, population.circular);
                vec![*rate; intervals]
            }
            Self::PerInterval(rates) => rates.clone(),
        }
    }
}

/// One epistatic log-fitness term over a set of loci.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub value: f64,
    pub loci: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessSpec {
    /// First-order coefficient of every locus
    #[serde(default)]
    pub additive: Option<Vec<f64>>,
    #[serde(default)]
    pub epistasis: Vec<Term>,
}

impl FitnessSpec {
    pub fn is_flat(&self) -> bool {
        self.additive.is_none() && self.epistasis.is_empty()
    }

    /// All terms as `(locus bitmask, value)`, summing repeated subsets.
    /// Only meaningful for genomes of at most 64 loci.
    pub fn subset_coefficients(&self) -> Result<(Vec<usize>, Vec<f64>)> {
        let mut merged = BTreeMap::new();
        for (locus, &c) in self.additive.iter().flatten().enumerate() {
            *merged.entry(1usize << locus).or_insert(0.0) += c;
        }
        for term in &self.epistasis {
            let mut subset = 0usize;
            for &locus in &term.loci {
                if locus >= usize::BITS as usize {
                    bail!("locus {locus} is out of range for the exact engine");
                }
                subset |= 1 << locus;
            }
            *merged.entry(subset).or_insert(0.0) += term.value;
        }
        Ok(merged.into_iter().unzip())
    }
}

/// Everything `hapsim run` needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub engine: EngineKind,
    pub population: PopulationConfig,
    pub initial: InitialState,
    #[serde(default)]
    pub mutation: Option<MutationSpec>,
    #[serde(default)]
    pub recombination: Option<RecombinationSpec>,
    #[serde(default)]
    pub fitness: FitnessSpec,
    /// Skip recombination even when outcrossing is enabled
    #[serde(default)]
    pub no_recombination: bool,
    /// Deterministic (infinite population) dynamics, exact engine only
    #[serde(default)]
    pub deterministic: bool,
    pub generations: i64,
    #[serde(default = "default_report_every")]
    pub report_every: i64,
}

fn default_report_every() -> i64 {
    defaults::REPORT_EVERY
}

impl RunConfig {
    /// Starting configuration printed by `hapsim template`.
    pub fn template(engine: EngineKind) -> Self {
        let loci = match engine {
            EngineKind::Exact => defaults::LOCI,
            EngineKind::Clone => 100 * defaults::LOCI,
        };
        let population = PopulationConfig::new(loci)
            .seed(defaults::SEED)
            .outcrossing_rate(defaults::OUTCROSSING_RATE)
            .recombination_model(RecombinationModel::Crossovers);
        Self {
            engine,
            population,
            initial: InitialState::Wildtype {
                size: defaults::POPULATION_SIZE,
            },
            mutation: Some(MutationSpec::Uniform(defaults::MUTATION_RATE)),
            recombination: Some(RecombinationSpec::Uniform(defaults::RECOMBINATION_RATE)),
            fitness: FitnessSpec {
                additive: Some(vec![defaults::SELECTION_COEFFICIENT; loci]),
                epistasis: Vec::new(),
            },
            no_recombination: false,
            deterministic: false,
            generations: defaults::GENERATIONS,
            report_every: defaults::REPORT_EVERY,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.population.validate().context("Invalid population options")?;
        if self.generations < 0 {
            bail!("generations must be non-negative, got {}", self.generations);
        }
        if self.report_every <= 0 {
            bail!("report_every must be positive, got {}", self.report_every);
        }
        if self.deterministic && self.engine == EngineKind::Clone {
            bail!("deterministic dynamics are only available with the exact engine");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trips_through_json() {
        for engine in [EngineKind::Exact, EngineKind::Clone] {
            let config = RunConfig::template(engine);
            let json = serde_json::to_string_pretty(&config).unwrap();
            let back: RunConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back, config);
            assert!(back.validate().is_ok());
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let json = r#"{
            "engine": "exact",
            "population": { "loci": 3 },
            "initial": { "wildtype": { "size": 100 } },
            "generations": 5
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.report_every, defaults::REPORT_EVERY);
        assert!(config.mutation.is_none());
        assert!(config.fitness.is_flat());
        assert_eq!(config.population.number_of_traits, 1);
    }

    #[test]
    fn test_subset_coefficients_merge_terms() {
        let fitness = FitnessSpec {
            additive: Some(vec![0.1, 0.2]),
            epistasis: vec![
                Term { value: 0.5, loci: vec![0, 1] },
                Term { value: 0.05, loci: vec![1] },
            ],
        };
        let (subsets, values) = fitness.subset_coefficients().unwrap();
        assert_eq!(subsets, vec![1, 2, 3]);
        assert!((values[1] - 0.25).abs() < 1e-12);
        assert_eq!(values[2], 0.5);
    }

    #[test]
    fn test_deterministic_clone_run_is_rejected() {
        let mut config = RunConfig::template(EngineKind::Clone);
        config.deterministic = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uniform_recombination_matches_topology() {
        let population = PopulationConfig::new(5).circular(true);
        assert_eq!(RecombinationSpec::Uniform(0.1).rates(&population).len(), 5);
        let population = PopulationConfig::new(5);
        assert_eq!(RecombinationSpec::Uniform(0.1).rates(&population).len(), 4);
    }
}
