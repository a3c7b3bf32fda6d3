//! Per-locus mutation between the two alleles.
//!
//! Every locus has a forward rate (0 → 1) and a backward rate (1 → 0), stored
//! as a 2×L table. The exact engine applies the table as a linear diffusion in
//! the subset basis, which the single-locus mutation operator diagonalises
//! (up to a shift when the two rates differ). The clone engine flips alleles
//! of individual genomes at random.

use rand::Rng;
use rand_distr::{Binomial, Distribution, Geometric};
use serde::{Deserialize, Serialize};

use crate::base::hypercube::butterfly;
use crate::base::Genotype;
use crate::errors::{PopulationError, Result};

/// Direction of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Allele 0 → allele 1.
    Forward,
    /// Allele 1 → allele 0.
    Backward,
}

/// Answer to a mutation-rate query.
///
/// Whenever all selected entries are equal the answer collapses to `Scalar`.
#[derive(Debug, Clone, PartialEq)]
pub enum RateQuery {
    Scalar(f64),
    /// One rate per locus for a fixed direction.
    PerLocus(Vec<f64>),
    /// Both directions at a fixed locus.
    PerDirection { forward: f64, backward: f64 },
    /// The full table.
    Table { forward: Vec<f64>, backward: Vec<f64> },
}

impl RateQuery {
    /// The scalar value, if the query collapsed to one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

fn all_equal(values: &[f64]) -> Option<f64> {
    let first = *values.first()?;
    values.iter().all(|&v| v == first).then_some(first)
}

fn check_rate(value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
        return Err(PopulationError::InvalidRate {
            name: "mutation rate",
            value,
        });
    }
    Ok(())
}

/// Forward and backward mutation probabilities per locus and generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRates {
    forward: Vec<f64>,
    backward: Vec<f64>,
}

impl MutationRates {
    /// Build from explicit forward and backward tables.
    ///
    /// # Errors
    /// `LengthMismatch` if the tables differ in length, `InvalidRate` if a
    /// rate is not a probability.
    pub fn new(forward: Vec<f64>, backward: Vec<f64>) -> Result<Self> {
        PopulationError::check_len("backward mutation rates", forward.len(), backward.len())?;
        for &r in forward.iter().chain(&backward) {
            check_rate(r)?;
        }
        Ok(Self { forward, backward })
    }

    /// No mutation at any of `loci` loci.
    pub fn zero(loci: usize) -> Self {
        Self {
            forward: vec![0.0; loci],
            backward: vec![0.0; loci],
        }
    }

    /// The same rate in both directions at every locus.
    pub fn uniform(mu: f64, loci: usize) -> Result<Self> {
        Self::new(vec![mu; loci], vec![mu; loci])
    }

    /// One forward and one backward rate shared by all loci.
    pub fn asymmetric(forward: f64, backward: f64, loci: usize) -> Result<Self> {
        Self::new(vec![forward; loci], vec![backward; loci])
    }

    /// Symmetric rates that vary along the genome.
    pub fn per_locus(rates: &[f64]) -> Result<Self> {
        Self::new(rates.to_vec(), rates.to_vec())
    }

    /// Number of loci covered by the table.
    pub fn number_of_loci(&self) -> usize {
        self.forward.len()
    }

    /// Forward (0 → 1) rates.
    pub fn forward(&self) -> &[f64] {
        &self.forward
    }

    /// Backward (1 → 0) rates.
    pub fn backward(&self) -> &[f64] {
        &self.backward
    }

    /// Probability that `locus` leaves `allele` in one generation.
    #[inline]
    pub fn rate_from(&self, locus: usize, allele: bool) -> f64 {
        if allele {
            self.backward[locus]
        } else {
            self.forward[locus]
        }
    }

    /// The common rate if every entry of the table coincides.
    pub fn as_uniform(&self) -> Option<f64> {
        let f = all_equal(&self.forward)?;
        let b = all_equal(&self.backward)?;
        (f == b).then_some(f)
    }

    /// `true` if no mutation can happen.
    pub fn is_zero(&self) -> bool {
        self.forward.iter().chain(&self.backward).all(|&r| r == 0.0)
    }

    /// Query the table, optionally restricted to one locus and/or one direction.
    ///
    /// A restricted or unrestricted selection whose entries all coincide is
    /// returned as [`RateQuery::Scalar`].
    pub fn query(&self, locus: Option<usize>, direction: Option<Direction>) -> Result<RateQuery> {
        if let Some(l) = locus {
            PopulationError::check_locus(l, self.number_of_loci())?;
        }
        let answer = match (locus, direction) {
            (Some(l), Some(Direction::Forward)) => RateQuery::Scalar(self.forward[l]),
            (Some(l), Some(Direction::Backward)) => RateQuery::Scalar(self.backward[l]),
            (Some(l), None) => {
                let (forward, backward) = (self.forward[l], self.backward[l]);
                if forward == backward {
                    RateQuery::Scalar(forward)
                } else {
                    RateQuery::PerDirection { forward, backward }
                }
            }
            (None, Some(dir)) => {
                let rates = match dir {
                    Direction::Forward => &self.forward,
                    Direction::Backward => &self.backward,
                };
                match all_equal(rates) {
                    Some(v) => RateQuery::Scalar(v),
                    None => RateQuery::PerLocus(rates.clone()),
                }
            }
            (None, None) => match self.as_uniform() {
                Some(v) => RateQuery::Scalar(v),
                None => RateQuery::Table {
                    forward: self.forward.clone(),
                    backward: self.backward.clone(),
                },
            },
        };
        Ok(answer)
    }

    /// Apply one generation of mutation to subset coefficients of a
    /// probability distribution on `L = number_of_loci()` loci.
    ///
    /// For every locus `i` and subset `S` containing `i`:
    /// `c[S] <- (1 - mu_f - mu_b) c[S] + (mu_f - mu_b) c[S \ {i}]`.
    /// Subsets without `i` are unchanged, so the total mass `c[0]` is preserved.
    pub fn diffuse(&self, coeff: &mut [f64]) -> Result<()> {
        PopulationError::check_len("moment array", 1 << self.number_of_loci(), coeff.len())?;
        for (locus, (&mu_f, &mu_b)) in self.forward.iter().zip(&self.backward).enumerate() {
            if mu_f == 0.0 && mu_b == 0.0 {
                continue;
            }
            let decay = 1.0 - mu_f - mu_b;
            let shift = mu_f - mu_b;
            butterfly(coeff, 1 << locus, |without, with| {
                (without, decay * with + shift * without)
            });
        }
        Ok(())
    }

    /// Sampler for the clone engine, precomputing what does not depend on
    /// the genotype.
    pub fn sampler(&self) -> MutationSampler<'_> {
        MutationSampler {
            rates: self,
            uniform: self.as_uniform(),
        }
    }
}

/// Draws mutations for individual genomes.
///
/// Every locus flips independently with its direction-specific rate. Clones
/// are handled by first drawing how many of their members mutate at all and
/// then drawing the flipped loci of each mutant conditioned on at least one
/// flip.
#[derive(Debug, Clone, Copy)]
pub struct MutationSampler<'a> {
    rates: &'a MutationRates,
    uniform: Option<f64>,
}

impl MutationSampler<'_> {
    /// Probability that a genome `genotype` acquires at least one mutation.
    pub fn mutant_probability(&self, genotype: &Genotype) -> f64 {
        if let Some(mu) = self.uniform {
            return 1.0 - (1.0 - mu).powi(genotype.len() as i32);
        }
        let unmutated: f64 = (0..genotype.len())
            .map(|l| 1.0 - self.rates.rate_from(l, genotype.get(l)))
            .product();
        1.0 - unmutated
    }

    /// Number of mutants among `size` copies of `genotype`.
    pub fn mutant_count<R: Rng + ?Sized>(
        &self,
        genotype: &Genotype,
        size: u64,
        rng: &mut R,
    ) -> u64 {
        let p = self.mutant_probability(genotype).clamp(0.0, 1.0);
        if p == 0.0 || size == 0 {
            return 0;
        }
        match Binomial::new(size, p) {
            Ok(b) => b.sample(rng),
            Err(_) => 0,
        }
    }

    /// Loci flipped in one mutant copy of `genotype`, in increasing order and
    /// never empty when the mutant probability is positive.
    pub fn sample_flips<R: Rng + ?Sized>(&self, genotype: &Genotype, rng: &mut R) -> Vec<usize> {
        match self.uniform {
            Some(mu) => Self::sample_flips_uniform(genotype.len(), mu, rng),
            None => self.sample_flips_general(genotype, rng),
        }
    }

    fn sample_flips_uniform<R: Rng + ?Sized>(loci: usize, mu: f64, rng: &mut R) -> Vec<usize> {
        if loci == 0 || mu <= 0.0 {
            return Vec::new();
        }
        // First flipped locus: geometric law truncated to [0, loci).
        let any = 1.0 - (1.0 - mu).powi(loci as i32);
        let u: f64 = rng.random();
        let first = if mu >= 1.0 {
            0
        } else {
            ((1.0 - u * any).ln() / (1.0 - mu).ln()).floor() as usize
        };
        let mut flips = vec![first.min(loci - 1)];

        let Ok(skip) = Geometric::new(mu) else {
            return flips;
        };
        let mut next = flips[0] + 1;
        loop {
            next = next.saturating_add(skip.sample(rng) as usize);
            if next >= loci {
                break;
            }
            flips.push(next);
            next += 1;
        }
        flips
    }

    fn sample_flips_general<R: Rng + ?Sized>(
        &self,
        genotype: &Genotype,
        rng: &mut R,
    ) -> Vec<usize> {
        let loci = genotype.len();
        let any = self.mutant_probability(genotype);
        if any <= 0.0 {
            return Vec::new();
        }
        // Locate the first flip by inverting its conditional distribution.
        let mut u = rng.random::<f64>() * any;
        let mut survive = 1.0;
        let mut first = loci - 1;
        for l in 0..loci {
            let r = self.rates.rate_from(l, genotype.get(l));
            let p_first = survive * r;
            if u < p_first {
                first = l;
                break;
            }
            u -= p_first;
            survive *= 1.0 - r;
        }
        let mut flips = vec![first];
        for l in first + 1..loci {
            if rng.random::<f64>() < self.rates.rate_from(l, genotype.get(l)) {
                flips.push(l);
            }
        }
        flips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Hypercube;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_new_validates() {
        assert!(MutationRates::new(vec![0.1; 3], vec![0.1; 2]).is_err());
        assert!(MutationRates::new(vec![-0.1; 3], vec![0.1; 3]).is_err());
        assert!(MutationRates::new(vec![0.1; 3], vec![1.5; 3]).is_err());
        assert!(MutationRates::uniform(f64::NAN, 3).is_err());
        assert!(MutationRates::uniform(0.01, 3).is_ok());
    }

    #[test]
    fn test_symmetric_query_collapses_to_scalar() {
        let rates = MutationRates::uniform(0.01, 5).unwrap();
        assert_eq!(rates.query(None, None).unwrap(), RateQuery::Scalar(0.01));
        assert_eq!(
            rates.query(None, Some(Direction::Backward)).unwrap(),
            RateQuery::Scalar(0.01)
        );
        assert_eq!(rates.query(Some(2), None).unwrap(), RateQuery::Scalar(0.01));
    }

    #[test]
    fn test_asymmetric_queries() {
        let rates = MutationRates::new(vec![0.1, 0.2, 0.1], vec![0.3, 0.3, 0.3]).unwrap();
        assert_eq!(
            rates.query(None, None).unwrap(),
            RateQuery::Table {
                forward: vec![0.1, 0.2, 0.1],
                backward: vec![0.3, 0.3, 0.3]
            }
        );
        assert_eq!(
            rates.query(None, Some(Direction::Forward)).unwrap(),
            RateQuery::PerLocus(vec![0.1, 0.2, 0.1])
        );
        assert_eq!(
            rates.query(None, Some(Direction::Backward)).unwrap(),
            RateQuery::Scalar(0.3)
        );
        assert_eq!(
            rates.query(Some(1), None).unwrap(),
            RateQuery::PerDirection {
                forward: 0.2,
                backward: 0.3
            }
        );
        assert_eq!(
            rates.query(Some(1), Some(Direction::Forward)).unwrap().as_scalar(),
            Some(0.2)
        );
        assert!(rates.query(Some(3), None).is_err());
    }

    #[test]
    fn test_diffuse_single_locus_matches_markov_chain() {
        let rates = MutationRates::asymmetric(0.1, 0.05, 1).unwrap();
        let mut h = Hypercube::new(1).unwrap();
        h.set_func(&[0.7, 0.3]).unwrap();
        let mut coeff = h.coeff().to_vec();
        rates.diffuse(&mut coeff).unwrap();
        h.set_coeff(&coeff).unwrap();

        let p1 = 0.3 * (1.0 - 0.05) + 0.7 * 0.1;
        assert!((h.get_func(1) - p1).abs() < 1e-12);
        assert!((h.get_func(0) - (1.0 - p1)).abs() < 1e-12);
    }

    #[test]
    fn test_diffuse_preserves_mass_and_reaches_equilibrium() {
        let rates = MutationRates::asymmetric(0.02, 0.06, 3).unwrap();
        let mut h = Hypercube::new(3).unwrap();
        h.set_func(&[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let mut coeff = h.coeff().to_vec();
        for _ in 0..2000 {
            rates.diffuse(&mut coeff).unwrap();
        }
        h.set_coeff(&coeff).unwrap();
        assert!((h.func().iter().sum::<f64>() - 1.0).abs() < 1e-10);
        // Equilibrium allele-1 frequency is mu_f / (mu_f + mu_b) = 0.25 per locus
        let p_all_ones = 0.25f64.powi(3);
        assert!((h.get_func(7) - p_all_ones).abs() < 1e-8);
    }

    #[test]
    fn test_diffuse_length_check() {
        let rates = MutationRates::uniform(0.01, 3).unwrap();
        let mut wrong = vec![0.0; 4];
        assert!(rates.diffuse(&mut wrong).is_err());
    }

    #[test]
    fn test_sampler_uniform_flips_nonempty_and_sorted() {
        let rates = MutationRates::uniform(0.001, 500).unwrap();
        let sampler = rates.sampler();
        let g = Genotype::new(500);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..200 {
            let flips = sampler.sample_flips(&g, &mut rng);
            assert!(!flips.is_empty());
            assert!(flips.windows(2).all(|w| w[0] < w[1]));
            assert!(*flips.last().unwrap() < 500);
        }
    }

    #[test]
    fn test_sampler_general_respects_zero_rates() {
        // Only locus 3 can mutate forward; loci carrying 1 cannot mutate back.
        let mut forward = vec![0.0; 8];
        forward[3] = 0.2;
        let rates = MutationRates::new(forward, vec![0.0; 8]).unwrap();
        let sampler = rates.sampler();
        let g = Genotype::new(8);
        assert!((sampler.mutant_probability(&g) - 0.2).abs() < 1e-12);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(sampler.sample_flips(&g, &mut rng), vec![3]);
        }
        let carrier = Genotype::from_loci(8, &[3]).unwrap();
        assert_eq!(sampler.mutant_probability(&carrier), 0.0);
        assert_eq!(sampler.mutant_count(&carrier, 1000, &mut rng), 0);
    }

    #[test]
    fn test_mutant_count_mean() {
        let rates = MutationRates::uniform(0.01, 10).unwrap();
        let sampler = rates.sampler();
        let g = Genotype::new(10);
        let p = sampler.mutant_probability(&g);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let trials = 2000;
        let total: u64 = (0..trials).map(|_| sampler.mutant_count(&g, 100, &mut rng)).sum();
        let mean = total as f64 / trials as f64;
        assert!((mean - 100.0 * p).abs() < 0.5, "mean {mean} vs {}", 100.0 * p);
    }
}
