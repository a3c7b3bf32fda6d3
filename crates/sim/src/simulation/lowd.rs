//! Exact population engine for short genomes.
//!
//! The population is the full distribution over the `2^L` genotypes, kept
//! in a [`Hypercube`] together with its subset coefficients. Each generation
//! applies selection, recombination, mutation and multinomial resampling.
//! Advances are computed on a scratch copy and committed only when every
//! generation succeeded.

use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use tracing::{debug, warn};

use super::config::{
    check_carrying_capacity, check_generations, check_outcrossing_rate, PopulationConfig,
};
use super::seeded_rng;
use crate::base::Hypercube;
use crate::errors::{try_zeroed, PopulationError, Result};
use crate::evolution::recombination::PATTERN_CACHE_MAX_LOCI;
use crate::evolution::{
    multinomial, next_population_size, Direction, MutationRates, RateQuery, RecombinationMap,
    RecombinationModel, RecombinationPatterns, SizeRegulation,
};
use crate::stats::{xlogx, PopulationStatistics, SampleStatistic};

/// Largest tolerated deviation of the total probability from one.
const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Rounding noise below this magnitude is treated as zero probability.
const NEGATIVE_TOLERANCE: f64 = 1e-12;

/// Which optional steps a generation runs.
#[derive(Debug, Clone, Copy)]
struct Steps {
    recombine: bool,
    resample: bool,
}

/// What one advance does in every generation.
struct Plan {
    selection: Option<Vec<f64>>,
    steps: Steps,
}

/// Haploid population over all `2^L` genotypes of `L <= 20` loci.
#[derive(Debug, Clone)]
pub struct ExactPopulation {
    loci: usize,
    population: Hypercube,
    fitness: Hypercube,
    mutation: MutationRates,
    recombination: RecombinationMap,
    patterns: Option<RecombinationPatterns>,
    outcrossing_rate: f64,
    carrying_capacity: Option<f64>,
    size_regulation: SizeRegulation,
    population_size: u64,
    generation: u64,
    rng: Xoshiro256PlusPlus,
}

impl ExactPopulation {
    /// Create an empty population. It must be initialized with one of the
    /// `set_*` methods before it can evolve.
    ///
    /// # Errors
    /// `InvalidArgument` for invalid options or more than
    /// [`crate::base::MAX_DIMENSION`] loci, `AllocationFailure` if the
    /// state arrays cannot be allocated.
    pub fn new(config: &PopulationConfig) -> Result<Self> {
        config.validate()?;
        let loci = config.loci;
        let recombination = match config.recombination_model {
            RecombinationModel::FreeRecombination => RecombinationMap::free(loci, config.circular),
            model => RecombinationMap::uniform(model, 0.0, loci, config.circular)?,
        };
        debug!(loci, seed = ?config.seed, "Creating exact population");
        Ok(Self {
            loci,
            population: Hypercube::new(loci)?,
            fitness: Hypercube::new(loci)?,
            mutation: MutationRates::zero(loci),
            recombination,
            patterns: None,
            outcrossing_rate: config.outcrossing_rate,
            carrying_capacity: config.carrying_capacity,
            size_regulation: config.size_regulation,
            population_size: 0,
            generation: 0,
            rng: seeded_rng(config.seed),
        })
    }

    // ----- initialization -------------------------------------------------

    /// Every individual carries the wildtype genotype 0.
    pub fn set_wildtype(&mut self, size: u64) -> Result<()> {
        self.set_genotypes(&[0], &[size])
    }

    /// Independent loci with the given allele-1 frequencies (linkage
    /// equilibrium).
    pub fn set_allele_frequencies(&mut self, frequencies: &[f64], size: u64) -> Result<()> {
        PopulationError::check_len("allele frequencies", self.loci, frequencies.len())?;
        if let Some(&bad) = frequencies.iter().find(|f| !(0.0..=1.0).contains(*f)) {
            return Err(PopulationError::InvalidRate {
                name: "allele frequency",
                value: bad,
            });
        }
        check_size(size)?;
        // Moments of independent loci factorise over the subset.
        let mut coeff = try_zeroed(1 << self.loci, "allele frequency moments")?;
        coeff[0] = 1.0;
        for (locus, &nu) in frequencies.iter().enumerate() {
            let chi = 2.0 * nu - 1.0;
            let half = 1 << locus;
            let (lower, upper) = coeff.split_at_mut(half);
            for (with, &without) in upper[..half].iter_mut().zip(lower.iter()) {
                *with = without * chi;
            }
        }
        let scale = 1.0 / (1u64 << self.loci) as f64;
        coeff.iter_mut().for_each(|c| *c *= scale);

        let mut next = self.population.clone();
        next.set_coeff(&coeff)?;
        self.commit_initial(next, size);
        Ok(())
    }

    /// Population made of the listed genotypes with the given counts.
    pub fn set_genotypes(&mut self, genotypes: &[usize], counts: &[u64]) -> Result<()> {
        PopulationError::check_len("genotype counts", genotypes.len(), counts.len())?;
        let size: u64 = counts.iter().sum();
        check_size(size)?;
        let values: Vec<f64> = counts.iter().map(|&c| c as f64 / size as f64).collect();
        let mut next = self.population.clone();
        next.reset();
        for (&g, &v) in genotypes.iter().zip(&values) {
            if g >= next.len() {
                return Err(PopulationError::GenotypeOutOfRange {
                    genotype: g,
                    loci: self.loci,
                });
            }
            next.func_mut()[g] += v;
        }
        next.fft_func_to_coeff();
        self.commit_initial(next, size);
        Ok(())
    }

    fn commit_initial(&mut self, population: Hypercube, size: u64) {
        self.population = population;
        self.population_size = size;
        self.carrying_capacity.get_or_insert(size as f64);
        debug!(size, "Initialized exact population");
    }

    // ----- landscape ------------------------------------------------------

    /// Log-fitness equal to `values` at the listed genotypes and zero
    /// everywhere else.
    pub fn set_fitness_function(&mut self, genotypes: &[usize], values: &[f64]) -> Result<()> {
        let mut next = self.fitness.clone();
        next.init_list(genotypes, values)?;
        self.fitness = next;
        Ok(())
    }

    /// First-order log-fitness landscape: allele 1 at locus `i` adds
    /// `2 coeffs[i]` relative to allele 0.
    pub fn set_fitness_additive(&mut self, coeffs: &[f64]) -> Result<()> {
        let mut next = self.fitness.clone();
        next.init_additive(coeffs)?;
        self.fitness = next;
        Ok(())
    }

    /// Log-fitness landscape given by sparse epistatic coefficients.
    pub fn set_fitness_coefficients(&mut self, subsets: &[usize], values: &[f64]) -> Result<()> {
        let mut next = self.fitness.clone();
        next.init_coeff_list(subsets, values)?;
        self.fitness = next;
        Ok(())
    }

    /// Current log-fitness landscape.
    pub fn fitness_landscape(&self) -> &Hypercube {
        &self.fitness
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
        self.install_recombination(map);
        Ok(())
    }

    pub fn recombination_rates(&self) -> &[f64] {
        self.recombination.rates()
    }

    pub fn recombination_model(&self) -> RecombinationModel {
        self.recombination.model()
    }

    pub fn set_recombination_model(&mut self, model: RecombinationModel) -> Result<()> {
        let map = self.recombination.with_model(model)?;
        self.install_recombination(map);
        Ok(())
    }

    pub fn circular(&self) -> bool {
        self.recombination.is_circular()
    }

    pub fn set_circular(&mut self, circular: bool) -> Result<()> {
        let map = self.recombination.with_topology(circular)?;
        self.install_recombination(map);
        Ok(())
    }

    fn install_recombination(&mut self, map: RecombinationMap) {
        self.recombination = map;
        self.patterns = None;
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

    /// Advance by `generations` generations with all four steps.
    pub fn evolve(&mut self, generations: i64) -> Result<()> {
        self.advance(generations, Steps { recombine: true, resample: true })
    }

    /// Advance without resampling: the distribution evolves deterministically.
    pub fn evolve_deterministic(&mut self, generations: i64) -> Result<()> {
        self.advance(generations, Steps { recombine: true, resample: false })
    }

    /// Advance without recombination.
    pub fn evolve_norec(&mut self, generations: i64) -> Result<()> {
        self.advance(generations, Steps { recombine: false, resample: true })
    }

    fn advance(&mut self, generations: i64, steps: Steps) -> Result<()> {
        let generations = check_generations(generations)?;
        if self.population_size == 0 {
            return Err(PopulationError::InvalidArgument(
                "population must be initialized before evolving".into(),
            ));
        }
        // Nobody outcrosses at rate zero.
        let steps = Steps {
            recombine: steps.recombine && self.outcrossing_rate > 0.0,
            ..steps
        };
        debug!(generations, from = self.generation, ?steps, "Evolving exact population");

        if steps.recombine
            && self.patterns.is_none()
            && self.recombination.model() != RecombinationModel::FreeRecombination
            && self.loci <= PATTERN_CACHE_MAX_LOCI
        {
            self.patterns = Some(RecombinationPatterns::build(&self.recombination)?);
        }
        let plan = Plan {
            selection: self.selection_weights()?,
            steps,
        };

        let mut population = self.population.clone();
        let mut rng = self.rng.clone();
        let mut size = self.population_size;
        for _ in 0..generations {
            size = self
                .step(&mut population, size, &mut rng, &plan)
                .inspect_err(|e| {
                    warn!(
                        generation = self.generation,
                        error = %e,
                        "Exact population failed to evolve"
                    );
                })?;
        }
        self.population = population;
        self.rng = rng;
        self.population_size = size;
        self.generation += generations;
        Ok(())
    }

    /// One generation on the scratch state. Returns the new population size.
    fn step(
        &self,
        population: &mut Hypercube,
        size: u64,
        rng: &mut Xoshiro256PlusPlus,
        plan: &Plan,
    ) -> Result<u64> {
        if let Some(weights) = &plan.selection {
            select(population, weights)?;
        }
        if plan.steps.recombine {
            self.recombine(population)?;
        }
        if !self.mutation.is_zero() {
            self.mutation.diffuse(population.coeff_mut())?;
            population.fft_coeff_to_func();
        }
        let size = if plan.steps.resample {
            self.resample(population, size, rng)?
        } else {
            size
        };
        check_distribution(population)?;
        Ok(size)
    }

    /// Selection factors `exp(F - max F)`, or `None` for a flat landscape.
    fn selection_weights(&self) -> Result<Option<Vec<f64>>> {
        let values = self.fitness.func();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        if !(max.is_finite() && min.is_finite()) {
            return Err(PopulationError::Computation("fitness landscape is not finite".into()));
        }
        if max == min {
            return Ok(None);
        }
        let mut weights = try_zeroed(values.len(), "selection weights")?;
        weights
            .par_iter_mut()
            .zip(values.par_iter())
            .for_each(|(w, &f)| *w = (f - max).exp());
        Ok(Some(weights))
    }

    fn recombine(&self, population: &mut Hypercube) -> Result<()> {
        let scale = population.len() as f64;
        let mut moments = try_zeroed(population.len(), "moments")?;
        moments
            .iter_mut()
            .zip(population.coeff())
            .for_each(|(m, &c)| *m = c * scale);
        let recombined = self.recombination.convolve(&moments, self.patterns.as_ref())?;
        let r = self.outcrossing_rate;
        population
            .coeff_mut()
            .par_iter_mut()
            .zip(recombined.par_iter())
            .for_each(|(c, &m)| *c = (1.0 - r) * *c + r * m / scale);
        population.fft_coeff_to_func();
        Ok(())
    }

    fn resample(
        &self,
        population: &mut Hypercube,
        size: u64,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<u64> {
        let next = next_population_size(size, self.carrying_capacity(), self.size_regulation, rng)?;
        if next == 0 {
            return Err(PopulationError::Computation("population went extinct".into()));
        }
        let probabilities = clean_probabilities(population.func())?;
        let counts = multinomial(next, &probabilities, rng)?;
        let inv = 1.0 / next as f64;
        population
            .func_mut()
            .iter_mut()
            .zip(counts)
            .for_each(|(p, c)| *p = c as f64 * inv);
        population.fft_func_to_coeff();
        Ok(next)
    }

    // ----- queries --------------------------------------------------------

    /// Frequency of genotype `genotype`.
    pub fn genotype_frequency(&self, genotype: usize) -> Result<f64> {
        self.check_genotype(genotype)?;
        Ok(self.population.get_func(genotype))
    }

    /// Frequencies of all genotypes, indexed by genotype.
    pub fn genotype_frequencies(&self) -> &[f64] {
        self.population.func()
    }

    /// Population distribution and its subset coefficients.
    pub fn distribution(&self) -> &Hypercube {
        &self.population
    }

    /// Spin moments `m[S] = <prod_{i in S} s_i>` for every locus subset `S`,
    /// indexed by bitmask. `m[0]` is one.
    pub fn moments(&self) -> Result<Vec<f64>> {
        let coeff = self.population.coeff();
        let scale = coeff.len() as f64;
        let mut moments = try_zeroed(coeff.len(), "moments")?;
        moments
            .par_iter_mut()
            .zip(coeff.par_iter())
            .for_each(|(m, &c)| *m = scale * c);
        Ok(moments)
    }

    /// Log-fitness of genotype `genotype`.
    pub fn fitness(&self, genotype: usize) -> Result<f64> {
        self.check_genotype(genotype)?;
        Ok(self.fitness.get_func(genotype))
    }

    /// Mean and variance of log-fitness over the population.
    pub fn fitness_statistics(&self) -> SampleStatistic {
        SampleStatistic::from_weighted(
            self.fitness
                .func()
                .iter()
                .copied()
                .zip(self.population.func().iter().copied()),
        )
    }

    /// Draw `n` genomes (as genotype indices) from the population, in random
    /// order.
    pub fn random_genomes(&mut self, n: usize) -> Result<Vec<usize>> {
        if self.population_size == 0 {
            return Err(PopulationError::InvalidArgument(
                "cannot sample from an uninitialized population".into(),
            ));
        }
        let probabilities = clean_probabilities(self.population.func())?;
        let counts = multinomial(n as u64, &probabilities, &mut self.rng)?;
        let mut genomes = Vec::new();
        genomes.try_reserve_exact(n)?;
        for (g, &c) in counts.iter().enumerate() {
            genomes.extend(std::iter::repeat(g).take(c as usize));
        }
        genomes.shuffle(&mut self.rng);
        Ok(genomes)
    }

    fn check_genotype(&self, genotype: usize) -> Result<()> {
        if genotype >= self.population.len() {
            return Err(PopulationError::GenotypeOutOfRange {
                genotype,
                loci: self.loci,
            });
        }
        Ok(())
    }

    fn moment_scale(&self) -> f64 {
        self.population.len() as f64
    }
}

impl PopulationStatistics for ExactPopulation {
    fn number_of_loci(&self) -> usize {
        self.loci
    }

    fn allele_frequency(&self, locus: usize) -> Result<f64> {
        PopulationError::check_locus(locus, self.loci)?;
        Ok(0.5 * (1.0 + self.moment_scale() * self.population.get_coeff(1 << locus)))
    }

    fn moment(&self, l1: usize, l2: usize) -> Result<f64> {
        PopulationError::check_locus(l1, self.loci)?;
        PopulationError::check_locus(l2, self.loci)?;
        if l1 == l2 {
            return Ok(1.0);
        }
        Ok(self.moment_scale() * self.population.get_coeff((1 << l1) | (1 << l2)))
    }

    fn genotype_entropy(&self) -> f64 {
        -self.population.func().par_iter().map(|&p| xlogx(p)).sum::<f64>()
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

/// Multiply the distribution by the selection factors and renormalise.
fn select(population: &mut Hypercube, weights: &[f64]) -> Result<()> {
    population
        .func_mut()
        .par_iter_mut()
        .zip(weights.par_iter())
        .for_each(|(p, &w)| *p *= w);
    population.normalize()
}

/// Copy of `values` with rounding noise below zero removed.
fn clean_probabilities(values: &[f64]) -> Result<Vec<f64>> {
    let mut out = try_zeroed(values.len(), "resampling probabilities")?;
    for (o, &p) in out.iter_mut().zip(values) {
        if p < -NEGATIVE_TOLERANCE || !p.is_finite() {
            return Err(PopulationError::Computation(format!(
                "genotype probability {p} is not a probability"
            )));
        }
        *o = p.max(0.0);
    }
    Ok(out)
}

fn check_distribution(population: &Hypercube) -> Result<()> {
    let total = population.get_coeff(0) * population.len() as f64;
    if !total.is_finite() || (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
        return Err(PopulationError::Computation(format!(
            "genotype distribution sums to {total}"
        )));
    }
    if population.func().iter().any(|p| !p.is_finite()) {
        return Err(PopulationError::Computation(
            "genotype distribution is not finite".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    fn population(loci: usize) -> ExactPopulation {
        ExactPopulation::new(&PopulationConfig::new(loci).seed(42)).unwrap()
    }

    #[test]
    fn test_new_rejects_too_many_loci() {
        assert!(ExactPopulation::new(&PopulationConfig::new(21)).is_err());
        assert!(ExactPopulation::new(&PopulationConfig::new(0)).is_err());
    }

    #[test]
    fn test_evolve_requires_initialization() {
        let mut pop = population(3);
        assert!(pop.evolve(1).is_err());
        pop.set_wildtype(100).unwrap();
        assert!(pop.evolve(-1).unwrap_err().is_invalid_argument());
        assert_eq!(pop.generation(), 0);
        pop.evolve(0).unwrap();
        assert_eq!(pop.generation(), 0);
    }

    #[test]
    fn test_set_genotypes_validates() {
        let mut pop = population(3);
        assert!(pop.set_genotypes(&[0, 8], &[1, 1]).is_err());
        assert!(pop.set_genotypes(&[0, 1], &[1]).is_err());
        assert!(pop.set_genotypes(&[0], &[0]).is_err());
        pop.set_genotypes(&[1, 6], &[30, 10]).unwrap();
        assert_eq!(pop.population_size(), 40);
        assert!(approx_eq(pop.genotype_frequency(1).unwrap(), 0.75, 1e-12));
        assert!(approx_eq(pop.allele_frequency(1).unwrap(), 0.25, 1e-12));
        assert!(approx_eq(pop.carrying_capacity(), 40.0, 1e-12));
    }

    #[test]
    fn test_selection_on_single_locus() {
        let mut pop = population(1);
        pop.set_allele_frequencies(&[0.5], 1000).unwrap();
        pop.set_fitness_additive(&[0.5]).unwrap();
        assert!(approx_eq(pop.fitness(1).unwrap() - pop.fitness(0).unwrap(), 1.0, 1e-12));
        pop.evolve_deterministic(1).unwrap();
        let e = 1f64.exp();
        assert!(approx_eq(pop.allele_frequency(0).unwrap(), e / (1.0 + e), 1e-12));
        assert_eq!(pop.generation(), 1);
    }

    #[test]
    fn test_mutation_on_single_locus() {
        let mut pop = population(1);
        pop.set_wildtype(100).unwrap();
        pop.set_mutation_rates(MutationRates::uniform(0.1, 1).unwrap()).unwrap();
        pop.evolve_deterministic(2).unwrap();
        // 0.1 after one generation, then 0.1 * 0.9 + 0.9 * 0.1
        assert!(approx_eq(pop.allele_frequency(0).unwrap(), 0.18, 1e-12));
    }

    #[test]
    fn test_free_recombination_halves_ld() {
        let mut pop = population(2);
        pop.set_genotypes(&[0b00, 0b11], &[50, 50]).unwrap();
        pop.set_outcrossing_rate(1.0).unwrap();
        assert!(approx_eq(pop.ld(0, 1).unwrap(), 0.25, 1e-12));
        pop.evolve_deterministic(1).unwrap();
        assert!(approx_eq(pop.ld(0, 1).unwrap(), 0.125, 1e-12));
        assert!(approx_eq(pop.allele_frequency(0).unwrap(), 0.5, 1e-12));
    }

    #[test]
    fn test_crossover_recombination_rate() {
        let mut pop = population(2);
        pop.set_genotypes(&[0b00, 0b11], &[50, 50]).unwrap();
        pop.set_outcrossing_rate(1.0).unwrap();
        pop.set_recombination_rates(&[0.1], Some(RecombinationModel::Crossovers)).unwrap();
        pop.evolve_deterministic(1).unwrap();
        assert!(approx_eq(pop.ld(0, 1).unwrap(), 0.25 * 0.9, 1e-12));
    }

    #[test]
    fn test_options() {
        let mut pop = population(4);
        assert!(pop.set_outcrossing_rate(-0.1).is_err());
        assert!(pop.set_carrying_capacity(0.0).is_err());
        pop.set_recombination_rates(&[0.1, 0.2, 0.3], Some(RecombinationModel::Crossovers))
            .unwrap();
        pop.set_circular(true).unwrap();
        assert_eq!(pop.recombination_rates(), &[0.1, 0.2, 0.3, 0.0]);
        assert!(pop.set_recombination_model(RecombinationModel::SingleCrossover).is_err());
        assert_eq!(pop.recombination_model(), RecombinationModel::Crossovers);
    }

    #[test]
    fn test_stochastic_evolution_is_reproducible() {
        let run = || {
            let mut pop = population(4);
            pop.set_allele_frequencies(&[0.2, 0.4, 0.6, 0.8], 200).unwrap();
            pop.set_mutation_rates(MutationRates::uniform(0.01, 4).unwrap()).unwrap();
            pop.set_outcrossing_rate(0.5).unwrap();
            pop.evolve(10).unwrap();
            pop.genotype_frequencies().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_poisson_size_regulation() {
        let mut pop = population(2);
        pop.set_wildtype(100).unwrap();
        pop.set_carrying_capacity(1000.0).unwrap();
        pop.evolve(1).unwrap();
        assert!(pop.population_size() > 800 && pop.population_size() < 1200);

        pop.set_size_regulation(SizeRegulation::Deterministic);
        pop.set_carrying_capacity(321.4).unwrap();
        pop.evolve(1).unwrap();
        assert_eq!(pop.population_size(), 321);
    }

    #[test]
    fn test_fitness_statistics() {
        let mut pop = population(1);
        pop.set_genotypes(&[0, 1], &[1, 3]).unwrap();
        pop.set_fitness_function(&[1], &[2.0]).unwrap();
        let stats = pop.fitness_statistics();
        assert!(approx_eq(stats.mean, 1.5, 1e-12));
        assert!(approx_eq(stats.variance, 0.75, 1e-12));
    }

    #[test]
    fn test_moments_are_spin_expectations() {
        let mut pop = population(3);
        let nu = [0.2, 0.7, 0.5];
        pop.set_allele_frequencies(&nu, 1000).unwrap();
        let moments = pop.moments().unwrap();
        assert_eq!(moments.len(), 8);
        assert!(approx_eq(moments[0], 1.0, 1e-12));
        for (i, &f) in nu.iter().enumerate() {
            assert!(approx_eq(moments[1 << i], 2.0 * f - 1.0, 1e-12));
        }
        // Independent loci: the pair moment factorises.
        assert!(approx_eq(moments[0b011], (2.0 * 0.2 - 1.0) * (2.0 * 0.7 - 1.0), 1e-12));
    }

    #[test]
    fn test_no_outcrossing_skips_recombination() {
        let mut pop = population(2);
        pop.set_genotypes(&[0b00, 0b11], &[50, 50]).unwrap();
        pop.set_recombination_rates(&[0.5], Some(RecombinationModel::Crossovers)).unwrap();
        pop.evolve_deterministic(3).unwrap();
        assert!(approx_eq(pop.ld(0, 1).unwrap(), 0.25, 1e-12));
        assert_eq!(pop.generation(), 3);
    }
}
