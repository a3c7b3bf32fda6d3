//! Recombination between two parental genomes.
//!
//! Offspring inherit the loci selected by a random *mask* from the first
//! parent and the remaining loci from the second. The three models differ in
//! the law of that mask:
//!
//! - **Free recombination**: every locus is drawn independently.
//! - **Crossovers**: strands switch between adjacent loci `i` and `i + 1`
//!   independently with probability `rates[i]`; on circular genomes the last
//!   rate joins locus `L - 1` to locus 0 and only an even number of
//!   crossovers is allowed.
//! - **Single crossover**: exactly one breakpoint, chosen with probability
//!   proportional to the rates (linear genomes only).
//!
//! The exact engine needs, for every subset `S` of loci, the probability
//! that a given `T ⊆ S` is inherited from the first parent. Those
//! *patterns* are indexed compactly: entry `k` of the pattern of `S`
//! belongs to the `k`-th submask of `S` in increasing numeric order.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, Geometric};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::base::Genotype;
use crate::errors::{try_zeroed, PopulationError, Result};

/// Above this many loci the exact engine recomputes patterns on the fly
/// instead of caching all `3^L` of them.
pub const PATTERN_CACHE_MAX_LOCI: usize = 14;

/// Number of circular crossover walks tried before giving up on drawing an
/// even number of crossovers.
const MAX_PARITY_RETRIES: usize = 10_000;

/// Rule used to combine two parental genomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecombinationModel {
    #[default]
    FreeRecombination = 0,
    SingleCrossover = 1,
    Crossovers = 2,
}

impl TryFrom<u8> for RecombinationModel {
    type Error = PopulationError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::FreeRecombination),
            1 => Ok(Self::SingleCrossover),
            2 => Ok(Self::Crossovers),
            other => Err(PopulationError::InvalidArgument(format!(
                "unknown recombination model {other}"
            ))),
        }
    }
}

impl fmt::Display for RecombinationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FreeRecombination => "free recombination",
            Self::SingleCrossover => "single crossover",
            Self::Crossovers => "crossovers",
        };
        f.write_str(name)
    }
}

/// A validated recombination model together with its per-interval rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecombinationMap {
    model: RecombinationModel,
    rates: Vec<f64>,
    loci: usize,
    circular: bool,
}

impl RecombinationMap {
    /// Validate and build a recombination map.
    ///
    /// There must be one rate per interval: `L` on circular genomes, `L - 1`
    /// on linear ones. Free recombination also accepts an empty slice and
    /// does not keep the rates once they are validated.
    ///
    /// # Errors
    /// `InvalidArgument` family if a rate is negative or not finite, a
    /// crossover probability exceeds one, the length is wrong, the single
    /// crossover model is requested on a circular genome, or a circular map
    /// can never produce an even number of crossovers.
    pub fn new(
        model: RecombinationModel,
        rates: Vec<f64>,
        loci: usize,
        circular: bool,
    ) -> Result<Self> {
        if loci == 0 {
            return Err(PopulationError::InvalidArgument(
                "recombination needs at least one locus".into(),
            ));
        }
        if model == RecombinationModel::SingleCrossover && circular {
            return Err(PopulationError::InvalidArgument(
                "single crossover is not available on circular genomes".into(),
            ));
        }
        let free = model == RecombinationModel::FreeRecombination;
        if !(free && rates.is_empty()) {
            PopulationError::check_len(
                "recombination rates",
                Self::intervals(loci, circular),
                rates.len(),
            )?;
        }
        let upper = if model == RecombinationModel::Crossovers {
            1.0
        } else {
            f64::INFINITY
        };
        if let Some(&bad) = rates
            .iter()
            .find(|&&r| !(r.is_finite() && r >= 0.0 && r <= upper))
        {
            return Err(PopulationError::InvalidRate {
                name: "recombination rate",
                value: bad,
            });
        }
        let map = Self {
            model,
            rates: if free { Vec::new() } else { rates },
            loci,
            circular,
        };
        if map.model == RecombinationModel::Crossovers
            && map.circular
            && map.even_crossover_probability() <= 0.0
        {
            return Err(PopulationError::InvalidArgument(
                "circular crossover rates never yield an even number of crossovers".into(),
            ));
        }
        Ok(map)
    }

    /// Same rate on every interval.
    pub fn uniform(
        model: RecombinationModel,
        rate: f64,
        loci: usize,
        circular: bool,
    ) -> Result<Self> {
        Self::new(model, vec![rate; Self::intervals(loci, circular)], loci, circular)
    }

    /// Free recombination on `loci` loci.
    pub fn free(loci: usize, circular: bool) -> Self {
        Self {
            model: RecombinationModel::FreeRecombination,
            rates: Vec::new(),
            loci,
            circular,
        }
    }

    /// Number of recombination intervals for a genome topology.
    pub fn intervals(loci: usize, circular: bool) -> usize {
        if circular {
            loci
        } else {
            loci.saturating_sub(1)
        }
    }

    pub fn model(&self) -> RecombinationModel {
        self.model
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn number_of_loci(&self) -> usize {
        self.loci
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    /// The same rates under another model. Rates are kept when they fit,
    /// otherwise replaced by zeros.
    pub fn with_model(&self, model: RecombinationModel) -> Result<Self> {
        let rates = if self.rates.len() == Self::intervals(self.loci, self.circular) {
            self.rates.clone()
        } else {
            vec![0.0; Self::intervals(self.loci, self.circular)]
        };
        Self::new(model, rates, self.loci, self.circular)
    }

    /// The same rates on the other topology: the interval joining the last
    /// locus to the first is added with rate zero or dropped.
    pub fn with_topology(&self, circular: bool) -> Result<Self> {
        let mut rates = self.rates.clone();
        if self.model != RecombinationModel::FreeRecombination {
            rates.resize(Self::intervals(self.loci, circular), 0.0);
        }
        Self::new(self.model, rates, self.loci, circular)
    }

    /// Probability of an even number of crossovers around a circular genome.
    fn even_crossover_probability(&self) -> f64 {
        0.5 * (1.0 + self.rates.iter().map(|r| 1.0 - 2.0 * r).product::<f64>())
    }

    /// Probability of an odd number of crossovers in intervals `from..to`,
    /// wrapping past the last interval on circular genomes.
    fn odd_crossovers(&self, from: usize, to: usize) -> f64 {
        let product: f64 = if from <= to {
            self.rates[from..to].iter().map(|r| 1.0 - 2.0 * r).product()
        } else {
            self.rates[from..]
                .iter()
                .chain(&self.rates[..to])
                .map(|r| 1.0 - 2.0 * r)
                .product()
        };
        0.5 * (1.0 - product)
    }

    /// Inheritance pattern of subset `subset`.
    ///
    /// Entry `k` is the probability that exactly the `k`-th submask of
    /// `subset` (in increasing order) comes from the first parent. The
    /// entries sum to one.
    pub fn subset_pattern(&self, subset: usize) -> Vec<f64> {
        let members: Vec<usize> = (0..self.loci).filter(|&l| subset >> l & 1 == 1).collect();
        let k = members.len();
        let size = 1usize << k;
        let mut pattern = vec![0.0; size];
        if k == 0 {
            pattern[0] = 1.0;
            return pattern;
        }
        match self.model {
            RecombinationModel::FreeRecombination => pattern.fill(1.0 / size as f64),
            RecombinationModel::Crossovers => {
                // Probability that the strand switches an odd number of times
                // between consecutive members.
                let mut odd: Vec<f64> = members
                    .windows(2)
                    .map(|w| self.odd_crossovers(w[0], w[1]))
                    .collect();
                let norm = if self.circular && k > 1 {
                    odd.push(self.odd_crossovers(members[k - 1], members[0]));
                    self.even_crossover_probability()
                } else {
                    1.0
                };
                for (compact, p) in pattern.iter_mut().enumerate() {
                    let mut weight = 0.5 / norm;
                    for (a, &q) in odd.iter().enumerate() {
                        let here = compact >> a & 1;
                        let next = compact >> ((a + 1) % k) & 1;
                        weight *= if here != next { q } else { 1.0 - q };
                    }
                    *p = weight;
                }
            }
            RecombinationModel::SingleCrossover => {
                let total: f64 = self.rates.iter().sum();
                let all = size - 1;
                if self.rates.is_empty() {
                    pattern[0] += 0.5;
                    pattern[all] += 0.5;
                    return pattern;
                }
                for (point, &r) in self.rates.iter().enumerate() {
                    let w = if total > 0.0 {
                        r / total
                    } else {
                        1.0 / self.rates.len() as f64
                    };
                    // Members at or before the breakpoint are the lowest bits.
                    let before = members.iter().take_while(|&&m| m <= point).count();
                    let head = (1usize << before) - 1;
                    pattern[head] += 0.5 * w;
                    pattern[all ^ head] += 0.5 * w;
                }
            }
        }
        pattern
    }

    /// Recombine frequency moments: returns
    /// `m'[S] = sum over T ⊆ S of pattern_S(T) m[T] m[S \ T]`,
    /// the moments of the offspring of two independently drawn parents.
    ///
    /// `patterns` is used when given, otherwise patterns are computed for
    /// every subset as needed.
    pub fn convolve(
        &self,
        moments: &[f64],
        patterns: Option<&RecombinationPatterns>,
    ) -> Result<Vec<f64>> {
        PopulationError::check_len("moment array", 1 << self.loci, moments.len())?;
        let mut out = try_zeroed(moments.len(), "recombined moments")?;
        out.par_iter_mut().enumerate().for_each(|(subset, slot)| {
            let computed;
            let pattern: &[f64] = match patterns {
                Some(p) => p.subset(subset),
                None if self.model == RecombinationModel::FreeRecombination => &[],
                None => {
                    computed = self.subset_pattern(subset);
                    &computed
                }
            };
            let free_weight = 0.5f64.powi(subset.count_ones() as i32);
            let mut acc = 0.0;
            let mut part = 0usize;
            let mut compact = 0usize;
            loop {
                let w = pattern.get(compact).copied().unwrap_or(free_weight);
                acc += w * moments[part] * moments[subset ^ part];
                if part == subset {
                    break;
                }
                part = part.wrapping_sub(subset) & subset;
                compact += 1;
            }
            *slot = acc;
        });
        Ok(out)
    }

    /// Draw a mask: loci set in the mask are inherited from the first parent.
    ///
    /// # Errors
    /// `Computation` if a circular crossover walk keeps producing an odd
    /// number of crossovers.
    pub fn sample_mask<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Genotype> {
        match self.model {
            RecombinationModel::FreeRecombination => Ok(Genotype::random(self.loci, rng)),
            RecombinationModel::SingleCrossover => {
                let total: f64 = self.rates.iter().sum();
                let point = if self.rates.is_empty() {
                    self.loci
                } else if total > 0.0 {
                    let mut u = rng.random::<f64>() * total;
                    let mut chosen = self.rates.len() - 1;
                    for (i, &r) in self.rates.iter().enumerate() {
                        if u < r {
                            chosen = i;
                            break;
                        }
                        u -= r;
                    }
                    chosen + 1
                } else {
                    rng.random_range(0..self.rates.len()) + 1
                };
                Ok(Genotype::prefix(self.loci, point))
            }
            RecombinationModel::Crossovers => {
                for _ in 0..MAX_PARITY_RETRIES {
                    let (mask, crossovers) = self.crossover_walk(rng);
                    if !self.circular || crossovers % 2 == 0 {
                        return Ok(mask);
                    }
                }
                Err(PopulationError::Computation(format!(
                    "no even crossover configuration after {MAX_PARITY_RETRIES} attempts"
                )))
            }
        }
    }

    /// Walk along the genome toggling the source strand at every crossover.
    /// Returns the mask and the number of crossovers drawn.
    fn crossover_walk<R: Rng + ?Sized>(&self, rng: &mut R) -> (Genotype, usize) {
        let breakpoints = self.sample_breakpoints(rng);
        let mut mask = Genotype::new(self.loci);
        let mut from_first: bool = rng.random();
        let mut next = breakpoints.iter().peekable();
        for locus in 0..self.loci {
            if from_first {
                mask.set(locus, true);
            }
            if next.next_if(|&&b| b == locus).is_some() {
                from_first = !from_first;
            }
        }
        (mask, breakpoints.len())
    }

    /// Intervals hit by a crossover, in increasing order.
    fn sample_breakpoints<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let n = self.rates.len();
        let first = self.rates.first().copied().unwrap_or(0.0);
        let uniform = self.rates.iter().all(|&r| r == first);
        if uniform && first > 0.0 && first < 1.0 {
            let mut points = Vec::new();
            let Ok(skip) = Geometric::new(first) else {
                return points;
            };
            let mut pos = 0usize;
            loop {
                pos = pos.saturating_add(skip.sample(rng) as usize);
                if pos >= n {
                    break;
                }
                points.push(pos);
                pos += 1;
            }
            return points;
        }
        self.rates
            .iter()
            .enumerate()
            .filter(|&(_, &r)| rng.random::<f64>() < r)
            .map(|(i, _)| i)
            .collect()
    }
}

/// All `3^L` inheritance patterns of a [`RecombinationMap`], stored flat.
#[derive(Debug, Clone)]
pub struct RecombinationPatterns {
    offsets: Vec<usize>,
    weights: Vec<f64>,
}

impl RecombinationPatterns {
    /// Compute every pattern of `map`.
    ///
    /// # Errors
    /// `AllocationFailure` if the table cannot be allocated.
    pub fn build(map: &RecombinationMap) -> Result<Self> {
        let subsets = 1usize << map.number_of_loci();
        let total = 3usize
            .checked_pow(map.number_of_loci() as u32)
            .ok_or_else(|| {
                PopulationError::AllocationFailure("recombination pattern table".into())
            })?;
        let mut offsets = Vec::new();
        offsets.try_reserve_exact(subsets + 1)?;
        let mut weights = Vec::new();
        weights.try_reserve_exact(total)?;
        offsets.push(0);
        for subset in 0..subsets {
            weights.extend(map.subset_pattern(subset));
            offsets.push(weights.len());
        }
        Ok(Self { offsets, weights })
    }

    /// Pattern of subset `subset`.
    #[inline]
    pub fn subset(&self, subset: usize) -> &[f64] {
        &self.weights[self.offsets[subset]..self.offsets[subset + 1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecombinationModel::{Crossovers, SingleCrossover};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_model_from_u8() {
        assert_eq!(RecombinationModel::try_from(0).unwrap(), RecombinationModel::FreeRecombination);
        assert_eq!(RecombinationModel::try_from(1).unwrap(), RecombinationModel::SingleCrossover);
        assert_eq!(RecombinationModel::try_from(2).unwrap(), RecombinationModel::Crossovers);
        assert!(RecombinationModel::try_from(3).is_err());
    }

    #[test]
    fn test_validation() {
        use RecombinationModel::*;
        assert!(RecombinationMap::new(Crossovers, vec![0.1; 3], 4, false).is_ok());
        assert!(RecombinationMap::new(Crossovers, vec![0.1; 4], 4, false).is_err());
        assert!(RecombinationMap::new(Crossovers, vec![0.1; 4], 4, true).is_ok());
        assert!(RecombinationMap::new(Crossovers, vec![-0.1, 0.1, 0.1], 4, false)
            .unwrap_err()
            .is_invalid_argument());
        assert!(RecombinationMap::new(Crossovers, vec![1.5, 0.1, 0.1], 4, false).is_err());
        assert!(RecombinationMap::new(SingleCrossover, vec![2.0, 1.0, 0.0], 4, false).is_ok());
        assert!(RecombinationMap::new(SingleCrossover, vec![0.1; 4], 4, true).is_err());
        // One certain crossover on a circle cannot be even
        assert!(RecombinationMap::new(Crossovers, vec![1.0, 0.0, 0.0], 3, true).is_err());
    }

    #[test]
    fn test_free_recombination_still_checks_rates() {
        use RecombinationModel::FreeRecombination;
        assert!(RecombinationMap::new(FreeRecombination, vec![], 4, false).is_ok());
        let map = RecombinationMap::new(FreeRecombination, vec![0.1; 3], 4, false).unwrap();
        assert!(map.rates().is_empty());
        assert!(RecombinationMap::new(FreeRecombination, vec![0.1, -0.2, 0.3], 4, false)
            .unwrap_err()
            .is_invalid_argument());
        assert!(RecombinationMap::new(FreeRecombination, vec![0.1; 7], 4, false)
            .unwrap_err()
            .is_invalid_argument());
        assert!(RecombinationMap::new(FreeRecombination, vec![f64::NAN; 4], 4, true).is_err());
    }

    #[test]
    fn test_patterns_sum_to_one() {
        let maps = [
            RecombinationMap::free(4, false),
            RecombinationMap::new(Crossovers, vec![0.1, 0.3, 0.05], 4, false).unwrap(),
            RecombinationMap::new(Crossovers, vec![0.1, 0.3, 0.05, 0.2], 4, true).unwrap(),
            RecombinationMap::new(SingleCrossover, vec![1.0, 2.0, 3.0], 4, false).unwrap(),
        ];
        for map in &maps {
            for subset in 0..16 {
                let p = map.subset_pattern(subset);
                assert_eq!(p.len(), 1 << (subset as u32).count_ones());
                assert!(approx_eq(p.iter().sum(), 1.0, 1e-12), "{:?} {subset}", map.model());
                // Mask and complement are equally likely
                let n = p.len();
                for k in 0..n {
                    assert!(approx_eq(p[k], p[n - 1 - k], 1e-12));
                }
            }
        }
    }

    #[test]
    fn test_two_locus_crossover_pattern() {
        let map = RecombinationMap::new(Crossovers, vec![0.2], 2, false).unwrap();
        let p = map.subset_pattern(0b11);
        // Both from the same parent: 0.4 each, split: 0.1 each
        assert!(approx_eq(p[0], 0.4, 1e-12));
        assert!(approx_eq(p[3], 0.4, 1e-12));
        assert!(approx_eq(p[1], 0.1, 1e-12));
        assert!(approx_eq(p[2], 0.1, 1e-12));
    }

    #[test]
    fn test_cached_patterns_match() {
        let map = RecombinationMap::new(Crossovers, vec![0.1, 0.2, 0.3, 0.4], 4, true).unwrap();
        let cache = RecombinationPatterns::build(&map).unwrap();
        for subset in 0..16 {
            assert_eq!(cache.subset(subset), map.subset_pattern(subset).as_slice());
        }
    }

    #[test]
    fn test_convolve_linkage_equilibrium_is_fixed_point() {
        // Independent loci: moments factorise and recombination leaves them unchanged.
        let chi = [0.2, -0.4, 0.6];
        let moments: Vec<f64> = (0..8)
            .map(|s: usize| (0..3).filter(|l| s >> l & 1 == 1).map(|l| chi[l]).product())
            .collect();
        let map = RecombinationMap::new(Crossovers, vec![0.3, 0.1], 3, false).unwrap();
        let out = map.convolve(&moments, None).unwrap();
        for (a, b) in out.iter().zip(&moments) {
            assert!(approx_eq(*a, *b, 1e-12));
        }
    }

    #[test]
    fn test_free_convolve_halves_linkage_disequilibrium() {
        // Only genotypes 00 and 11, each with frequency 1/2
        let moments = vec![1.0, 0.0, 0.0, 1.0];
        let map = RecombinationMap::free(2, false);
        let out = map.convolve(&moments, None).unwrap();
        assert!(approx_eq(out[0], 1.0, 1e-12));
        assert!(approx_eq(out[3], 0.5, 1e-12));
    }

    #[test]
    fn test_sample_mask_free_and_single() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let free = RecombinationMap::free(100, false);
        let ones: usize = (0..200).map(|_| free.sample_mask(&mut rng).unwrap().count_ones()).sum();
        assert!((ones as f64 / 200.0 - 50.0).abs() < 3.0);

        let single = RecombinationMap::new(SingleCrossover, vec![0.0, 1.0, 0.0], 4, false).unwrap();
        for _ in 0..10 {
            let mask = single.sample_mask(&mut rng).unwrap();
            assert_eq!(mask, Genotype::prefix(4, 2));
        }
    }

    #[test]
    fn test_crossover_mask_breakpoints() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let none = RecombinationMap::uniform(Crossovers, 0.0, 50, false).unwrap();
        for _ in 0..20 {
            let c = none.sample_mask(&mut rng).unwrap().count_ones();
            assert!(c == 0 || c == 50);
        }

        let circular = RecombinationMap::uniform(Crossovers, 0.05, 200, true).unwrap();
        for _ in 0..50 {
            let mask = circular.sample_mask(&mut rng).unwrap();
            let switches = (0..200).filter(|&l| mask.get(l) != mask.get((l + 1) % 200)).count();
            assert_eq!(switches % 2, 0);
        }
    }

    #[test]
    fn test_topology_and_model_changes() {
        let map = RecombinationMap::new(Crossovers, vec![0.1, 0.2], 3, false).unwrap();
        let circ = map.with_topology(true).unwrap();
        assert_eq!(circ.rates(), &[0.1, 0.2, 0.0]);
        assert!(circ.with_model(RecombinationModel::SingleCrossover).is_err());
        let single = map.with_model(RecombinationModel::SingleCrossover).unwrap();
        assert_eq!(single.rates(), &[0.1, 0.2]);
    }
}
