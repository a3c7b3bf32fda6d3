//! Clone-based population engine for long genomes.
//!
//! The population is a list of clones, each a genotype with a size, trait
//! values and a log-fitness. A generation draws offspring counts from the
//! clone fitnesses, pairs up outcrossing offspring for recombination,
//! mutates individuals and merges identical genotypes again.
//!
//! Every random draw of a generation is taken from the population stream in
//! clone order. Per-clone mutation runs in parallel on sub-streams whose
//! seeds are drawn from the population stream first, so a seed reproduces a
//! run exactly regardless of the thread count.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Binomial, Distribution, Poisson};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::clone::{CloneRecord, CloneTally};
use super::config::{
    check_carrying_capacity, check_generations, check_outcrossing_rate, PopulationConfig,
};
use super::seeded_rng;
use crate::base::{Genotype, TraitLandscape};
use crate::errors::{PopulationError, Result};
use crate::evolution::{
    multinomial, Direction, MutationRates, RateQuery, RecombinationMap, RecombinationModel,
    SizeRegulation,
};
use crate::stats::{xlogx, Histogram, PopulationStatistics, SampleStatistic};

/// Statistics refreshed after every successful change of the clone list.
#[derive(Debug, Clone, Default)]
struct StatisticsCache {
    allele_frequencies: Vec<f64>,
    fitness: SampleStatistic,
    traits: Vec<SampleStatistic>,
    participation_ratio: f64,
}

impl StatisticsCache {
    fn compute(clones: &[CloneRecord], loci: usize, traits: usize) -> Self {
        let size: u64 = clones.iter().map(|c| c.clone_size).sum();
        if size == 0 {
            return Self {
                allele_frequencies: vec![0.0; loci],
                traits: vec![SampleStatistic::default(); traits],
                ..Self::default()
            };
        }
        let n = size as f64;
        let mut counts = vec![0u64; loci];
        for clone in clones {
            for locus in clone.genotype.derived_loci() {
                counts[locus] += clone.clone_size;
            }
        }
        Self {
            allele_frequencies: counts.iter().map(|&c| c as f64 / n).collect(),
            fitness: weighted_statistic(clones, |c| c.fitness),
            traits: (0..traits)
                .map(|t| weighted_statistic(clones, move |c| c.traits[t]))
                .collect(),
            participation_ratio: clones
                .iter()
                .map(|c| (c.clone_size as f64 / n).powi(2))
                .sum(),
        }
    }
}

/// Size-weighted mean and variance of `value` over clones.
fn weighted_statistic<F>(clones: &[CloneRecord], value: F) -> SampleStatistic
where
    F: Fn(&CloneRecord) -> f64 + Clone,
{
    SampleStatistic::from_weighted(clones.iter().map(move |c| (value(c), c.clone_size as f64)))
}

/// Haploid population of arbitrarily many loci stored as clones.
#[derive(Debug, Clone)]
pub struct ClonePopulation {
    loci: usize,
    clones: Vec<CloneRecord>,
    traits: Vec<TraitLandscape>,
    trait_weights: Vec<f64>,
    fitness_overrides: HashMap<Genotype, f64>,
    mutation: MutationRates,
    recombination: RecombinationMap,
    outcrossing_rate: f64,
    carrying_capacity: Option<f64>,
    size_regulation: SizeRegulation,
    population_size: u64,
    generation: u64,
    rng: Xoshiro256PlusPlus,
    cache: StatisticsCache,
}

impl ClonePopulation {
    /// Create an empty population with flat trait landscapes. Fitness is the
    /// first trait unless other weights are set.
    pub fn new(config: &PopulationConfig) -> Result<Self> {
        config.validate()?;
        let loci = config.loci;
        let recombination = match config.recombination_model {
            RecombinationModel::FreeRecombination => RecombinationMap::free(loci, config.circular),
            model => RecombinationMap::uniform(model, 0.0, loci, config.circular)?,
        };
        let mut trait_weights = vec![0.0; config.number_of_traits];
        trait_weights[0] = 1.0;
        debug!(
            loci,
            traits = config.number_of_traits,
            seed = ?config.seed,
            "Creating clone population"
        );
        Ok(Self {
            loci,
            clones: Vec::new(),
            traits: vec![TraitLandscape::new(loci); config.number_of_traits],
            trait_weights,
            fitness_overrides: HashMap::new(),
            mutation: MutationRates::zero(loci),
            recombination,
            outcrossing_rate: config.outcrossing_rate,
            carrying_capacity: config.carrying_capacity,
            size_regulation: config.size_regulation,
            population_size: 0,
            generation: 0,
            rng: seeded_rng(config.seed),
            cache: StatisticsCache::compute(&[], loci, config.number_of_traits),
        })
    }

    // ----- initialization -------------------------------------------------

    /// Every individual carries the wildtype genome.
    pub fn set_wildtype(&mut self, size: u64) -> Result<()> {
        self.set_genotypes(&[Genotype::new(self.loci)], &[size])
    }

    /// Draw `size` genomes with independent loci carrying allele 1 with the
    /// given frequencies.
    pub fn set_allele_frequencies(&mut self, frequencies: &[f64], size: u64) -> Result<()> {
        PopulationError::check_len("allele frequencies", self.loci, frequencies.len())?;
        if let Some(&bad) = frequencies.iter().find(|f| !(0.0..=1.0).contains(*f)) {
            return Err(PopulationError::InvalidRate {
                name: "allele frequency",
                value: bad,
            });
        }
        check_size(size)?;
        let loci = self.loci;
        let mut rng = self.rng.clone();
        let mut seeds: Vec<u64> = Vec::new();
        seeds.try_reserve_exact(allocation_len("genomes", size)?)?;
        seeds.extend((0..size).map(|_| rng.random::<u64>()));
        let genomes: Vec<Genotype> = seeds
            .par_iter()
            .map(|&seed| {
                let mut local_rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let mut g = Genotype::new(loci);
                for (locus, &nu) in frequencies.iter().enumerate() {
                    if local_rng.random::<f64>() < nu {
                        g.set(locus, true);
                    }
                }
                g
            })
            .collect();
        let mut tally = CloneTally::try_with_capacity(genomes.len())?;
        for g in genomes {
            tally.add(g, 1);
        }
        let clones = self.assemble(tally.finish(), &[])?;
        self.rng = rng;
        self.commit_initial(clones, size);
        Ok(())
    }

    /// Population made of the listed genomes with the given counts.
    /// Repeated genomes are merged.
    pub fn set_genotypes(&mut self, genotypes: &[Genotype], counts: &[u64]) -> Result<()> {
        PopulationError::check_len("genotype counts", genotypes.len(), counts.len())?;
        for g in genotypes {
            PopulationError::check_len("genotype", self.loci, g.len())?;
        }
        let size: u64 = counts.iter().sum();
        check_size(size)?;
        let mut tally = CloneTally::try_with_capacity(genotypes.len())?;
        for (g, &n) in genotypes.iter().zip(counts) {
            tally.add(g.clone(), n);
        }
        let clones = self.assemble(tally.finish(), &[])?;
        self.commit_initial(clones, size);
        Ok(())
    }

    fn commit_initial(&mut self, clones: Vec<CloneRecord>, size: u64) {
        self.clones = clones;
        self.population_size = size;
        self.carrying_capacity.get_or_insert(size as f64);
        self.refresh_cache();
        debug!(size, clones = self.clones.len(), "Initialized clone population");
    }

    // ----- landscape ------------------------------------------------------

    pub fn number_of_traits(&self) -> usize {
        self.traits.len()
    }

    /// Landscape of trait `index`.
    pub fn trait_landscape(&self, index: usize) -> Result<&TraitLandscape> {
        self.check_trait(index)?;
        Ok(&self.traits[index])
    }

    /// Replace trait `index` by a first-order landscape: allele 1 at locus
    /// `i` adds `2 coeffs[i]` relative to allele 0.
    pub fn set_fitness_additive(&mut self, coeffs: &[f64], index: usize) -> Result<()> {
        self.check_trait(index)?;
        let mut landscape = self.traits[index].clone();
        landscape.set_additive(coeffs)?;
        self.replace_trait(index, landscape);
        Ok(())
    }

    /// Add an epistatic term over `loci` to trait `index`.
    pub fn add_trait_coefficient(
        &mut self,
        value: f64,
        loci: &[usize],
        index: usize,
    ) -> Result<()> {
        self.check_trait(index)?;
        let mut landscape = self.traits[index].clone();
        landscape.add_coefficient(value, loci)?;
        self.replace_trait(index, landscape);
        Ok(())
    }

    /// Make trait `index` flat.
    pub fn clear_trait(&mut self, index: usize) -> Result<()> {
        self.check_trait(index)?;
        self.replace_trait(index, TraitLandscape::new(self.loci));
        Ok(())
    }

    /// Fitness is `sum_t weights[t] * trait_t`.
    pub fn set_trait_weights(&mut self, weights: &[f64]) -> Result<()> {
        PopulationError::check_len("trait weights", self.traits.len(), weights.len())?;
        if let Some(&bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(PopulationError::InvalidRate {
                name: "trait weight",
                value: bad,
            });
        }
        self.trait_weights = weights.to_vec();
        self.update_phenotypes();
        Ok(())
    }

    pub fn trait_weights(&self) -> &[f64] {
        &self.trait_weights
    }

    /// Fix the log-fitness of the listed genomes, bypassing the traits.
    /// Replaces any previous overrides; empty lists remove them all.
    pub fn set_fitness_function(&mut self, genotypes: &[Genotype], values: &[f64]) -> Result<()> {
        PopulationError::check_len("fitness values", genotypes.len(), values.len())?;
        let mut overrides = HashMap::new();
        overrides.try_reserve(genotypes.len())?;
        for (g, &v) in genotypes.iter().zip(values) {
            PopulationError::check_len("genotype", self.loci, g.len())?;
            if !v.is_finite() {
                return Err(PopulationError::InvalidRate {
                    name: "fitness value",
                    value: v,
                });
            }
            overrides.insert(g.clone(), v);
        }
        self.fitness_overrides = overrides;
        self.update_phenotypes();
        Ok(())
    }

    fn replace_trait(&mut self, index: usize, landscape: TraitLandscape) {
        self.traits[index] = landscape;
        self.update_phenotypes();
    }

    fn check_trait(&self, index: usize) -> Result<()> {
        if index >= self.traits.len() {
            return Err(PopulationError::InvalidArgument(format!(
                "trait {index} out of range for {} traits",
                self.traits.len()
            )));
        }
        Ok(())
    }

    /// Trait values and log-fitness of `genotype`.
    fn phenotype(&self, genotype: &Genotype) -> (Vec<f64>, f64) {
        let traits: Vec<f64> = self.traits.iter().map(|t| t.evaluate(genotype)).collect();
        let fitness = match self.fitness_overrides.get(genotype) {
            Some(&f) => f,
            None => traits.iter().zip(&self.trait_weights).map(|(t, w)| t * w).sum(),
        };
        (traits, fitness)
    }

    fn update_phenotypes(&mut self) {
        let phenotypes: Vec<(Vec<f64>, f64)> = self
            .clones
            .par_iter()
            .map(|c| self.phenotype(&c.genotype))
            .collect();
        for (clone, (traits, fitness)) in self.clones.iter_mut().zip(phenotypes) {
            clone.traits = traits;
            clone.fitness = fitness;
        }
        self.refresh_cache();
    }

    /// Build clone records, reusing the phenotypes of `previous` clones.
    fn assemble(
        &self,
        entries: Vec<(Genotype, u64)>,
        previous: &[CloneRecord],
    ) -> Result<Vec<CloneRecord>> {
        let mut known: HashMap<&Genotype, &CloneRecord> = HashMap::new();
        known.try_reserve(previous.len())?;
        known.extend(previous.iter().map(|c| (&c.genotype, c)));
        let mut records = Vec::new();
        records.try_reserve_exact(entries.len())?;
        records.par_extend(entries.into_par_iter().map(|(genotype, clone_size)| {
            let (traits, fitness) = match known.get(&genotype) {
                Some(c) => (c.traits.clone(), c.fitness),
                None => self.phenotype(&genotype),
            };
            CloneRecord {
                genotype,
                clone_size,
                traits,
                fitness,
            }
        }));
        Ok(records)
    }

    // ----- rates and options ----------------------------------------------

    pub fn set_mutation_rates(&mut self, rates: MutationRates) -> Result<()> {
        PopulationError::check_len("mutation rates", self.loci, rates.number_of_loci())?;
        debug!(uniform = ?rates.as_uniform(), "Setting mutation rates");
        self.mutation = rates;
        Ok(())
    }

    /// Query the mutation table, see [`MutationRates::query`].
    pub fn mutation_rates(
        &self,
        locus: Option<usize>,
        direction: Option<Direction>,
    ) -> Result<RateQuery> {
        self.mutation.query(locus, direction)
    }

    /// Replace the recombination rates, optionally switching model.
    ///
    /// On error the previous rates stay in place.
    pub fn set_recombination_rates(
        &mut self,
        rates: &[f64],
        model: Option<RecombinationModel>,
    ) -> Result<()> {
        let model = model.unwrap_or(self.recombination.model());
        let circular = self.recombination.is_circular();
        let map = RecombinationMap::new(model, rates.to_vec(), self.loci, circular)?;
        debug!(%model, "Setting recombination rates");
        self.recombination = map;
        Ok(())
    }

    pub fn recombination_rates(&self) -> &[f64] {
        self.recombination.rates()
    }

    pub fn recombination_model(&self) -> RecombinationModel {
        self.recombination.model()
    }

    pub fn set_recombination_model(&mut self, model: RecombinationModel) -> Result<()> {
        self.recombination = self.recombination.with_model(model)?;
        Ok(())
    }

    pub fn circular(&self) -> bool {
        self.recombination.is_circular()
    }

    pub fn set_circular(&mut self, circular: bool) -> Result<()> {
        self.recombination = self.recombination.with_topology(circular)?;
        Ok(())
    }

    pub fn outcrossing_rate(&self) -> f64 {
        self.outcrossing_rate
    }

    pub fn set_outcrossing_rate(&mut self, rate: f64) -> Result<()> {
        check_outcrossing_rate(rate)?;
        self.outcrossing_rate = rate;
        Ok(())
    }

    /// Carrying capacity; equal to the initial size unless set explicitly.
    pub fn carrying_capacity(&self) -> f64 {
        self.carrying_capacity.unwrap_or(self.population_size as f64)
    }

    pub fn set_carrying_capacity(&mut self, capacity: f64) -> Result<()> {
        check_carrying_capacity(capacity)?;
        self.carrying_capacity = Some(capacity);
        Ok(())
    }

    pub fn size_regulation(&self) -> SizeRegulation {
        self.size_regulation
    }

    pub fn set_size_regulation(&mut self, policy: SizeRegulation) {
        self.size_regulation = policy;
    }

    pub fn population_size(&self) -> u64 {
        self.population_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ----- evolution ------------------------------------------------------

    /// Advance by `generations` generations.
    pub fn evolve(&mut self, generations: i64) -> Result<()> {
        self.advance(generations, true)
    }

    /// Advance without outcrossing: every offspring is clonal.
    pub fn evolve_norec(&mut self, generations: i64) -> Result<()> {
        self.advance(generations, false)
    }

    fn advance(&mut self, generations: i64, recombine: bool) -> Result<()> {
        let generations = check_generations(generations)?;
        if self.clones.is_empty() {
            return Err(PopulationError::InvalidArgument(
                "population must be initialized before evolving".into(),
            ));
        }
        debug!(generations, from = self.generation, recombine, "Evolving clone population");

        let recombine = recombine && self.outcrossing_rate > 0.0;
        let mut clones = self.clones.clone();
        let mut rng = self.rng.clone();
        for _ in 0..generations {
            clones = self
                .next_generation(&clones, recombine, &mut rng)
                .inspect_err(|e| {
                    warn!(
                        generation = self.generation,
                        error = %e,
                        "Clone population failed to evolve"
                    );
                })?;
        }
        self.population_size = clones.iter().map(|c| c.clone_size).sum();
        self.clones = clones;
        self.rng = rng;
        self.generation += generations;
        self.refresh_cache();
        Ok(())
    }

    fn next_generation(
        &self,
        clones: &[CloneRecord],
        recombine: bool,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Vec<CloneRecord>> {
        let offspring = self.offspring_counts(clones, rng)?;

        // Outcrossing offspring leave their clone as gametes.
        let mut entries: Vec<(Genotype, u64)> = Vec::new();
        entries.try_reserve_exact(clones.len())?;
        let mut gametes: Vec<usize> = Vec::new();
        for (index, (clone, &n)) in clones.iter().zip(&offspring).enumerate() {
            let sexual = if recombine && n > 0 {
                binomial(n, self.outcrossing_rate, rng)?
            } else {
                0
            };
            let sexual_count = allocation_len("gametes", sexual)?;
            gametes.try_reserve(sexual_count)?;
            gametes.extend(std::iter::repeat(index).take(sexual_count));
            entries.push((clone.genotype.clone(), n - sexual));
        }
        gametes.shuffle(rng);
        entries.try_reserve(gametes.len())?;
        let mut pairs = gametes.chunks_exact(2);
        for pair in pairs.by_ref() {
            let (a, b) = (&clones[pair[0]].genotype, &clones[pair[1]].genotype);
            let mask = self.recombination.sample_mask(rng)?;
            entries.push((Genotype::recombine(a, b, &mask), 1));
            entries.push((Genotype::recombine(b, a, &mask), 1));
        }
        if let [leftover] = pairs.remainder() {
            entries[*leftover].1 += 1;
        }

        let mut tally = CloneTally::try_with_capacity(entries.len())?;
        if self.mutation.is_zero() {
            for (g, n) in entries {
                tally.add(g, n);
            }
        } else {
            let sampler = self.mutation.sampler();
            let mut seeds: Vec<u64> = Vec::new();
            seeds.try_reserve_exact(entries.len())?;
            seeds.extend(entries.iter().map(|_| rng.random::<u64>()));
            let mutated: Vec<(u64, Vec<Genotype>)> = entries
                .par_iter()
                .zip(seeds.par_iter())
                .map(|((genotype, n), &seed)| {
                    let mut local_rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                    let mutants = sampler.mutant_count(genotype, *n, &mut local_rng);
                    let mut genomes = Vec::new();
                    genomes.try_reserve_exact(allocation_len("mutant genomes", mutants)?)?;
                    for _ in 0..mutants {
                        let mut g = genotype.clone();
                        for locus in sampler.sample_flips(genotype, &mut local_rng) {
                            g.flip(locus);
                        }
                        genomes.push(g);
                    }
                    Ok((*n - mutants, genomes))
                })
                .collect::<Result<_>>()?;
            for ((genotype, _), (remaining, mutants)) in entries.into_iter().zip(mutated) {
                tally.add(genotype, remaining);
                for g in mutants {
                    tally.add(g, 1);
                }
            }
        }

        if tally.total() == 0 {
            return Err(PopulationError::Computation("population went extinct".into()));
        }
        self.assemble(tally.finish(), clones)
    }

    /// Offspring per clone with mean `K n_i w_i / sum_j n_j w_j`,
    /// `w = exp(F - max F)`.
    fn offspring_counts(
        &self,
        clones: &[CloneRecord],
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Vec<u64>> {
        let max = clones.iter().map(|c| c.fitness).fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(PopulationError::Computation("clone fitness is not finite".into()));
        }
        let weights: Vec<f64> = clones
            .iter()
            .map(|c| c.clone_size as f64 * (c.fitness - max).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        let capacity = self.carrying_capacity();
        match self.size_regulation {
            SizeRegulation::Deterministic => multinomial(capacity.round() as u64, &weights, rng),
            SizeRegulation::Poisson => weights
                .iter()
                .map(|&w| {
                    let mean = capacity * w / total;
                    if mean <= 0.0 {
                        return Ok(0);
                    }
                    let poisson = Poisson::new(mean)
                        .map_err(|e| PopulationError::Computation(format!("offspring draw: {e}")))?;
                    Ok(poisson.sample(rng) as u64)
                })
                .collect(),
        }
    }

    fn refresh_cache(&mut self) {
        self.cache = StatisticsCache::compute(&self.clones, self.loci, self.traits.len());
    }

    // ----- queries --------------------------------------------------------

    pub fn number_of_clones(&self) -> usize {
        self.clones.len()
    }

    pub fn clones(&self) -> &[CloneRecord] {
        &self.clones
    }

    /// Clone number `index`.
    pub fn clone_record(&self, index: usize) -> Result<&CloneRecord> {
        self.clones.get(index).ok_or_else(|| {
            PopulationError::InvalidArgument(format!(
                "clone {index} out of range for {} clones",
                self.clones.len()
            ))
        })
    }

    pub fn genotype(&self, index: usize) -> Result<&Genotype> {
        Ok(&self.clone_record(index)?.genotype)
    }

    pub fn clone_size(&self, index: usize) -> Result<u64> {
        Ok(self.clone_record(index)?.clone_size)
    }

    /// Fraction of the population carrying exactly `genotype`; zero when no
    /// clone has it.
    pub fn genotype_frequency(&self, genotype: &Genotype) -> Result<f64> {
        PopulationError::check_len("genotype", self.loci, genotype.len())?;
        Ok(self
            .clones
            .iter()
            .find(|c| &c.genotype == genotype)
            .map_or(0.0, |c| self.frequency(c)))
    }

    /// Value of trait `trait_index` for clone `index`.
    pub fn trait_value(&self, index: usize, trait_index: usize) -> Result<f64> {
        self.check_trait(trait_index)?;
        Ok(self.clone_record(index)?.traits[trait_index])
    }

    /// Log-fitness of clone `index`.
    pub fn fitness(&self, index: usize) -> Result<f64> {
        Ok(self.clone_record(index)?.fitness)
    }

    /// Log-fitness of an arbitrary genome.
    pub fn fitness_of_genotype(&self, genotype: &Genotype) -> Result<f64> {
        PopulationError::check_len("genotype", self.loci, genotype.len())?;
        Ok(self.phenotype(genotype).1)
    }

    /// Mean and variance of log-fitness over individuals.
    pub fn fitness_statistics(&self) -> SampleStatistic {
        self.cache.fitness
    }

    /// Mean and variance of trait `index` over individuals.
    pub fn trait_statistics(&self, index: usize) -> Result<SampleStatistic> {
        self.check_trait(index)?;
        Ok(self.cache.traits[index])
    }

    /// Probability that two random individuals belong to the same clone.
    pub fn participation_ratio(&self) -> f64 {
        self.cache.participation_ratio
    }

    /// Indices of `n` clones drawn proportionally to their sizes, in
    /// random order.
    pub fn random_clones(&mut self, n: usize) -> Result<Vec<usize>> {
        if self.clones.is_empty() {
            return Err(PopulationError::InvalidArgument(
                "cannot sample from an empty population".into(),
            ));
        }
        let sizes: Vec<f64> = self.clones.iter().map(|c| c.clone_size as f64).collect();
        let counts = multinomial(n as u64, &sizes, &mut self.rng)?;
        let mut sample = Vec::new();
        sample.try_reserve_exact(n)?;
        for (index, &c) in counts.iter().enumerate() {
            sample.extend(std::iter::repeat(index).take(c as usize));
        }
        sample.shuffle(&mut self.rng);
        Ok(sample)
    }

    /// Genomes of `n` randomly drawn individuals.
    pub fn random_genomes(&mut self, n: usize) -> Result<Vec<Genotype>> {
        Ok(self
            .random_clones(n)?
            .into_iter()
            .map(|i| self.clones[i].genotype.clone())
            .collect())
    }

    /// Hamming distance between two genomes, optionally counting only the
    /// loci `start, start + every, ...` of each chunk `[start, end)`.
    pub fn distance_hamming(
        &self,
        a: &Genotype,
        b: &Genotype,
        chunks: Option<&[(usize, usize)]>,
        every: usize,
    ) -> Result<usize> {
        PopulationError::check_len("genotype", self.loci, a.len())?;
        PopulationError::check_len("genotype", self.loci, b.len())?;
        match chunks {
            Some(chunks) => a.hamming_distance_in_chunks(b, chunks, every),
            None if every <= 1 => Ok(a.hamming_distance(b)),
            None => a.hamming_distance_in_chunks(b, &[(0, self.loci)], every),
        }
    }

    fn divergence_sample(&mut self, n: usize) -> Result<Vec<f64>> {
        Ok(self
            .random_clones(n)?
            .into_iter()
            .map(|i| self.clones[i].genotype.count_ones() as f64)
            .collect())
    }

    fn diversity_sample(&mut self, n: usize) -> Result<Vec<f64>> {
        let first = self.random_clones(n)?;
        let second = self.random_clones(n)?;
        Ok(first
            .into_iter()
            .zip(second)
            .map(|(i, j)| self.clones[i].genotype.hamming_distance(&self.clones[j].genotype) as f64)
            .collect())
    }

    /// Distance from the wildtype of `n` random individuals.
    pub fn divergence_statistics(&mut self, n: usize) -> Result<SampleStatistic> {
        Ok(SampleStatistic::from_values(&self.divergence_sample(n)?))
    }

    /// Distance between `n` pairs of random individuals.
    pub fn diversity_statistics(&mut self, n: usize) -> Result<SampleStatistic> {
        Ok(SampleStatistic::from_values(&self.diversity_sample(n)?))
    }

    pub fn divergence_histogram(&mut self, bins: usize, n: usize) -> Result<Histogram> {
        Histogram::from_values(&self.divergence_sample(n)?, bins)
    }

    pub fn diversity_histogram(&mut self, bins: usize, n: usize) -> Result<Histogram> {
        Histogram::from_values(&self.diversity_sample(n)?, bins)
    }

    fn frequency(&self, clone: &CloneRecord) -> f64 {
        clone.clone_size as f64 / self.population_size as f64
    }
}

impl PopulationStatistics for ClonePopulation {
    fn number_of_loci(&self) -> usize {
        self.loci
    }

    fn allele_frequency(&self, locus: usize) -> Result<f64> {
        PopulationError::check_locus(locus, self.loci)?;
        Ok(self.cache.allele_frequencies[locus])
    }

    fn moment(&self, l1: usize, l2: usize) -> Result<f64> {
        PopulationError::check_locus(l1, self.loci)?;
        PopulationError::check_locus(l2, self.loci)?;
        if l1 == l2 {
            return Ok(1.0);
        }
        if self.population_size == 0 {
            return Ok(0.0);
        }
        Ok(self
            .clones
            .iter()
            .map(|c| self.frequency(c) * c.genotype.spin(l1) * c.genotype.spin(l2))
            .sum())
    }

    fn genotype_entropy(&self) -> f64 {
        if self.population_size == 0 {
            return 0.0;
        }
        -self.clones.iter().map(|c| xlogx(self.frequency(c))).sum::<f64>()
    }

    fn allele_frequencies(&self) -> Vec<f64> {
        self.cache.allele_frequencies.clone()
    }
}

fn check_size(size: u64) -> Result<()> {
    if size == 0 {
        return Err(PopulationError::InvalidArgument(
            "population size must be positive".into(),
        ));
    }
    Ok(())
}

/// An individual count as a buffer length.
fn allocation_len(what: &str, count: u64) -> Result<usize> {
    usize::try_from(count).map_err(|_| {
        PopulationError::AllocationFailure(format!("{what}: {count} entries do not fit in memory"))
    })
}

fn binomial<R: Rng + ?Sized>(n: u64, p: f64, rng: &mut R) -> Result<u64> {
    if p <= 0.0 {
        return Ok(0);
    }
    if p >= 1.0 {
        return Ok(n);
    }
    let b = Binomial::new(n, p)
        .map_err(|e| PopulationError::Computation(format!("binomial draw: {e}")))?;
    Ok(b.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn population(loci: usize) -> ClonePopulation {
        ClonePopulation::new(&PopulationConfig::new(loci).seed(42)).unwrap()
    }

    #[test]
    fn test_set_genotypes_merges_duplicates() {
        let mut pop = population(100);
        let a = Genotype::from_loci(100, &[3]).unwrap();
        let b = Genotype::new(100);
        pop.set_genotypes(&[a.clone(), b, a], &[10, 5, 5]).unwrap();
        assert_eq!(pop.number_of_clones(), 2);
        assert_eq!(pop.clone_size(0).unwrap(), 15);
        assert_eq!(pop.population_size(), 20);
        assert!(approx_eq(pop.allele_frequency(3).unwrap(), 0.75, 1e-12));
        assert!(pop.set_genotypes(&[Genotype::new(99)], &[1]).is_err());
        assert!(pop.clone_record(2).is_err());
    }

    #[test]
    fn test_fitness_from_traits_and_overrides() {
        let config = PopulationConfig::new(10).number_of_traits(2).seed(1);
        let mut pop = ClonePopulation::new(&config).unwrap();
        pop.set_wildtype(10).unwrap();
        let mut coeffs = vec![0.0; 10];
        coeffs[0] = 0.5;
        pop.set_fitness_additive(&coeffs, 0).unwrap();
        pop.add_trait_coefficient(0.25, &[1, 2], 1).unwrap();
        assert!(approx_eq(pop.fitness(0).unwrap(), -0.5, 1e-12));
        assert!(approx_eq(pop.trait_value(0, 1).unwrap(), 0.25, 1e-12));

        pop.set_trait_weights(&[1.0, 2.0]).unwrap();
        assert!(approx_eq(pop.fitness(0).unwrap(), 0.0, 1e-12));

        let carrier = Genotype::from_loci(10, &[0]).unwrap();
        assert!(approx_eq(pop.fitness_of_genotype(&carrier).unwrap(), 1.0, 1e-12));
        pop.set_fitness_function(&[carrier.clone()], &[7.0]).unwrap();
        assert!(approx_eq(pop.fitness_of_genotype(&carrier).unwrap(), 7.0, 1e-12));

        pop.clear_trait(1).unwrap();
        assert!(approx_eq(pop.fitness(0).unwrap(), -0.5, 1e-12));
        assert!(pop.clear_trait(2).is_err());
    }

    #[test]
    fn test_selection_favours_fitter_clone() {
        let mut pop = population(4);
        let fit = Genotype::from_loci(4, &[0]).unwrap();
        pop.set_genotypes(&[Genotype::new(4), fit], &[500, 500]).unwrap();
        pop.set_fitness_additive(&[0.1, 0.0, 0.0, 0.0], 0).unwrap();
        pop.evolve(20).unwrap();
        assert!(pop.allele_frequency(0).unwrap() > 0.8);
        assert_eq!(pop.generation(), 20);
    }

    #[test]
    fn test_mutation_creates_new_clones() {
        let mut pop = population(1000);
        pop.set_wildtype(1000).unwrap();
        pop.set_mutation_rates(MutationRates::uniform(1e-3, 1000).unwrap()).unwrap();
        pop.evolve(1).unwrap();
        assert!(pop.number_of_clones() > 1);
        let div = pop.divergence_statistics(500).unwrap();
        assert!(div.mean > 0.5 && div.mean < 1.5, "mean divergence {}", div.mean);
    }

    #[test]
    fn test_outcrossing_recombines() {
        let mut pop = population(50);
        pop.set_genotypes(&[Genotype::new(50), Genotype::ones(50)], &[500, 500]).unwrap();
        pop.set_outcrossing_rate(1.0).unwrap();
        pop.evolve(1).unwrap();
        assert!(pop.number_of_clones() > 2);
        pop.evolve_norec(1).unwrap();
        assert_eq!(pop.generation(), 2);
    }

    #[test]
    fn test_evolution_is_reproducible() {
        let run = || {
            let mut pop = population(200);
            pop.set_allele_frequencies(&vec![0.3; 200], 300).unwrap();
            pop.set_mutation_rates(MutationRates::uniform(1e-3, 200).unwrap()).unwrap();
            pop.set_recombination_rates(&vec![0.01; 199], Some(RecombinationModel::Crossovers))
                .unwrap();
            pop.set_outcrossing_rate(0.5).unwrap();
            pop.evolve(5).unwrap();
            pop.clones().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_extinction_leaves_state_unchanged() {
        let mut pop = population(5);
        pop.set_wildtype(10).unwrap();
        pop.set_carrying_capacity(1e-9).unwrap();
        let before = pop.clones().to_vec();
        assert!(pop.evolve(1).is_err());
        assert_eq!(pop.clones(), before.as_slice());
        assert_eq!(pop.generation(), 0);
        assert_eq!(pop.population_size(), 10);
    }

    #[test]
    fn test_participation_ratio_and_entropy() {
        let mut pop = population(3);
        pop.set_genotypes(
            &[Genotype::new(3), Genotype::ones(3)],
            &[50, 50],
        )
        .unwrap();
        assert!(approx_eq(pop.participation_ratio(), 0.5, 1e-12));
        assert!(approx_eq(pop.genotype_entropy(), 2f64.ln(), 1e-12));
        assert!(approx_eq(pop.moment(0, 1).unwrap(), 1.0, 1e-12));
    }

    #[test]
    fn test_genotype_frequency() {
        let mut pop = population(8);
        let carrier = Genotype::from_loci(8, &[2, 5]).unwrap();
        pop.set_genotypes(&[Genotype::new(8), carrier.clone()], &[30, 10]).unwrap();
        assert!(approx_eq(pop.genotype_frequency(&carrier).unwrap(), 0.25, 1e-12));
        assert!(approx_eq(pop.genotype_frequency(&Genotype::new(8)).unwrap(), 0.75, 1e-12));
        let absent = Genotype::ones(8);
        assert_eq!(pop.genotype_frequency(&absent).unwrap(), 0.0);
        let short = Genotype::new(7);
        assert!(pop.genotype_frequency(&short).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_deterministic_size_is_rounded_capacity() {
        let config = PopulationConfig::new(20)
            .size_regulation(SizeRegulation::Deterministic)
            .carrying_capacity(777.4)
            .seed(3);
        let mut pop = ClonePopulation::new(&config).unwrap();
        pop.set_allele_frequencies(&vec![0.5; 20], 500).unwrap();
        pop.set_mutation_rates(MutationRates::uniform(1e-3, 20).unwrap()).unwrap();
        for _ in 0..3 {
            pop.evolve(1).unwrap();
            assert_eq!(pop.population_size(), 777);
            let total: u64 = pop.clones().iter().map(|c| c.clone_size).sum();
            assert_eq!(total, 777);
        }
    }

    #[test]
    fn test_circular_crossovers_evolve() {
        let loci = 40;
        let config = PopulationConfig::new(loci)
            .circular(true)
            .recombination_model(RecombinationModel::Crossovers)
            .outcrossing_rate(1.0)
            .seed(9);
        let mut pop = ClonePopulation::new(&config).unwrap();
        pop.set_recombination_rates(&vec![0.05; loci], None).unwrap();
        pop.set_genotypes(&[Genotype::new(loci), Genotype::ones(loci)], &[300, 300])
            .unwrap();
        pop.evolve(5).unwrap();
        assert_eq!(pop.generation(), 5);
        assert!(pop.population_size() > 0);
        assert!(pop.number_of_clones() > 2);
        let total: u64 = pop.clones().iter().map(|c| c.clone_size).sum();
        assert_eq!(total, pop.population_size());
    }

    #[test]
    fn test_single_crossover_offspring_are_prefix_and_suffix() {
        let loci = 30;
        let config = PopulationConfig::new(loci)
            .recombination_model(RecombinationModel::SingleCrossover)
            .outcrossing_rate(1.0)
            .seed(5);
        let mut pop = ClonePopulation::new(&config).unwrap();
        pop.set_recombination_rates(&vec![0.1; loci - 1], None).unwrap();
        pop.set_genotypes(&[Genotype::new(loci), Genotype::ones(loci)], &[400, 400])
            .unwrap();
        pop.evolve(1).unwrap();
        assert!(pop.number_of_clones() > 2);

        for clone in pop.clones() {
            let derived: Vec<usize> = (0..loci).filter(|&i| clone.genotype.get(i)).collect();
            let (Some(&first), Some(&last)) = (derived.first(), derived.last()) else {
                continue;
            };
            assert_eq!(last - first + 1, derived.len(), "split run in {:?}", derived);
            assert!(first == 0 || last == loci - 1, "interior run {:?}", derived);
        }
    }
}
