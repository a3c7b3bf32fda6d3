use anyhow::{Context, Result};
use hapsim::base::Genotype;
use hapsim::evolution::RecombinationModel;
use hapsim::stats::{PopulationStatistics, SampleStatistic};
use hapsim::{ClonePopulation, ExactPopulation};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::{EngineKind, InitialState, RunConfig};
use crate::printing::{print_report, print_run_parameters};

/// Either engine, driven the same way.
enum Population {
    Exact(ExactPopulation),
    Clone(ClonePopulation),
}

/// Summary printed every `report_every` generations.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generation: u64,
    pub population_size: u64,
    pub fitness: SampleStatistic,
    pub allele_entropy: f64,
    pub genotype_entropy: f64,
    pub mean_allele_frequency: f64,
    /// Clone engine only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_clones: Option<usize>,
}

impl Population {
    fn build(config: &RunConfig) -> Result<Self> {
        let population = match config.engine {
            EngineKind::Exact => Self::Exact(
                ExactPopulation::new(&config.population)
                    .context("Failed to create exact population")?,
            ),
            EngineKind::Clone => Self::Clone(
                ClonePopulation::new(&config.population)
                    .context("Failed to create clone population")?,
            ),
        };
        Ok(population)
    }

    fn initialize(&mut self, initial: &InitialState, loci: usize) -> Result<()> {
        match (self, initial) {
            (Self::Exact(pop), InitialState::Wildtype { size }) => pop.set_wildtype(*size)?,
            (Self::Clone(pop), InitialState::Wildtype { size }) => pop.set_wildtype(*size)?,
            (Self::Exact(pop), InitialState::AlleleFrequencies { frequencies, size }) => {
                pop.set_allele_frequencies(frequencies, *size)?
            }
            (Self::Clone(pop), InitialState::AlleleFrequencies { frequencies, size }) => {
                pop.set_allele_frequencies(frequencies, *size)?
            }
            (Self::Exact(pop), InitialState::Genotypes { genotypes, counts }) => {
                let indices = genotypes
                    .iter()
                    .map(|derived| Genotype::from_loci(loci, derived)?.to_index())
                    .collect::<hapsim::Result<Vec<_>>>()?;
                pop.set_genotypes(&indices, counts)?
            }
            (Self::Clone(pop), InitialState::Genotypes { genotypes, counts }) => {
                let genotypes = genotypes
                    .iter()
                    .map(|derived| Genotype::from_loci(loci, derived))
                    .collect::<hapsim::Result<Vec<_>>>()?;
                pop.set_genotypes(&genotypes, counts)?
            }
        }
        Ok(())
    }

    fn configure(&mut self, config: &RunConfig) -> Result<()> {
        let loci = config.population.loci;
        let mutation = config
            .mutation
            .as_ref()
            .map(|spec| spec.rates(loci))
            .transpose()
            .context("Invalid mutation rates")?;
        let model = config.population.recombination_model;
        let recombination = match (&config.recombination, model) {
            (_, RecombinationModel::FreeRecombination) | (None, _) => None,
            (Some(spec), _) => Some(spec.rates(&config.population)),
        };

        match self {
            Self::Exact(pop) => {
                if let Some(rates) = mutation {
                    pop.set_mutation_rates(rates)?;
                }
                if let Some(rates) = &recombination {
                    pop.set_recombination_rates(rates, Some(model))
                        .context("Invalid recombination rates")?;
                }
                if !config.fitness.is_flat() {
                    let (subsets, values) = config.fitness.subset_coefficients()?;
                    pop.set_fitness_coefficients(&subsets, &values)
                        .context("Invalid fitness landscape")?;
                }
            }
            Self::Clone(pop) => {
                if let Some(rates) = mutation {
                    pop.set_mutation_rates(rates)?;
                }
                if let Some(rates) = &recombination {
                    pop.set_recombination_rates(rates, Some(model))
                        .context("Invalid recombination rates")?;
                }
                if let Some(additive) = &config.fitness.additive {
                    pop.set_fitness_additive(additive, 0)
                        .context("Invalid additive fitness")?;
                }
                for term in &config.fitness.epistasis {
                    pop.add_trait_coefficient(term.value, &term.loci, 0)
                        .context("Invalid epistatic term")?;
                }
            }
        }
        Ok(())
    }

    fn evolve(&mut self, generations: i64, config: &RunConfig) -> hapsim::Result<()> {
        match self {
            Self::Exact(pop) if config.deterministic => pop.evolve_deterministic(generations),
            Self::Exact(pop) if config.no_recombination => pop.evolve_norec(generations),
            Self::Exact(pop) => pop.evolve(generations),
            Self::Clone(pop) if config.no_recombination => pop.evolve_norec(generations),
            Self::Clone(pop) => pop.evolve(generations),
        }
    }

    fn stats(&self) -> &dyn PopulationStatistics {
        match self {
            Self::Exact(pop) => pop,
            Self::Clone(pop) => pop,
        }
    }

    fn report(&self) -> Report {
        let (generation, population_size, fitness, number_of_clones) = match self {
            Self::Exact(pop) => (
                pop.generation(),
                pop.population_size(),
                pop.fitness_statistics(),
                None,
            ),
            Self::Clone(pop) => (
                pop.generation(),
                pop.population_size(),
                pop.fitness_statistics(),
                Some(pop.number_of_clones()),
            ),
        };
        let stats = self.stats();
        let frequencies = stats.allele_frequencies();
        let mean_allele_frequency = if frequencies.is_empty() {
            0.0
        } else {
            frequencies.iter().sum::<f64>() / frequencies.len() as f64
        };
        Report {
            generation,
            population_size,
            fitness,
            allele_entropy: stats.allele_entropy(),
            genotype_entropy: stats.genotype_entropy(),
            mean_allele_frequency,
            number_of_clones,
        }
    }
}

pub fn run_simulation(
    path: &Path,
    seed_override: Option<u64>,
    show_progress: bool,
    json: bool,
) -> Result<()> {
    let mut config = RunConfig::from_file(path)?;
    if let Some(seed) = seed_override {
        config.population.seed = Some(seed);
    }

    let mut population = Population::build(&config)?;
    population
        .initialize(&config.initial, config.population.loci)
        .context("Failed to initialize population")?;
    population.configure(&config)?;

    if !json {
        print_run_parameters(&config);
    }
    print_report(&population.report(), json)?;

    let pb = if show_progress {
        let pb = ProgressBar::new(config.generations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .context("Invalid progress template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut done = 0;
    while done < config.generations {
        let chunk = config.report_every.min(config.generations - done);
        population
            .evolve(chunk, &config)
            .with_context(|| format!("Evolution failed after generation {done}"))?;
        done += chunk;

        let report = population.report();
        if let Some(pb) = &pb {
            pb.inc(chunk as u64);
            pb.suspend(|| print_report(&report, json))?;
        } else {
            print_report(&report, json)?;
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    info!(generations = config.generations, "Run complete");
    Ok(())
}
