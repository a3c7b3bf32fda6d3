//! Finite-population resampling and population-size regulation.

use rand::Rng;
use rand_distr::{Binomial, Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::errors::{PopulationError, Result};

/// How the size of the next generation is regulated toward the carrying
/// capacity `K` when the current size differs from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeRegulation {
    /// Next size drawn from `Poisson(K)`.
    #[default]
    Poisson,
    /// Next size is `K` rounded to the nearest integer.
    Deterministic,
}

/// Size of the next generation.
///
/// Populations already at their carrying capacity keep their size.
pub fn next_population_size<R: Rng + ?Sized>(
    current: u64,
    carrying_capacity: f64,
    policy: SizeRegulation,
    rng: &mut R,
) -> Result<u64> {
    if !(carrying_capacity.is_finite() && carrying_capacity > 0.0) {
        return Err(PopulationError::InvalidRate {
            name: "carrying capacity",
            value: carrying_capacity,
        });
    }
    if current as f64 == carrying_capacity {
        return Ok(current);
    }
    let next = match policy {
        SizeRegulation::Deterministic => carrying_capacity.round() as u64,
        SizeRegulation::Poisson => {
            let poisson = Poisson::new(carrying_capacity)
                .map_err(|e| PopulationError::Computation(format!("population size draw: {e}")))?;
            poisson.sample(rng) as u64
        }
    };
    Ok(next)
}

/// Draw `n` individuals among categories with the given probabilities.
///
/// Probabilities need not be normalised; they are divided by their sum.
/// Sampled by sequential conditional binomials, so categories with zero
/// weight always get zero counts.
pub fn multinomial<R: Rng + ?Sized>(
    n: u64,
    probabilities: &[f64],
    rng: &mut R,
) -> Result<Vec<u64>> {
    let mut remaining_mass: f64 = probabilities.iter().sum();
    if !(remaining_mass.is_finite() && remaining_mass > 0.0) {
        return Err(PopulationError::Computation(format!(
            "multinomial weights sum to {remaining_mass}"
        )));
    }
    let mut counts = Vec::new();
    counts.try_reserve_exact(probabilities.len())?;
    let mut remaining = n;
    for &p in probabilities {
        if p < 0.0 {
            return Err(PopulationError::Computation(format!("negative multinomial weight {p}")));
        }
        let draw = if remaining == 0 || p == 0.0 {
            0
        } else if p >= remaining_mass {
            remaining
        } else {
            let binomial = Binomial::new(remaining, (p / remaining_mass).min(1.0))
                .map_err(|e| PopulationError::Computation(format!("multinomial draw: {e}")))?;
            binomial.sample(rng)
        };
        counts.push(draw);
        remaining -= draw;
        remaining_mass -= p;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_multinomial_total_and_zeros() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let counts = multinomial(1000, &[0.2, 0.0, 0.5, 0.3], &mut rng).unwrap();
        assert_eq!(counts.iter().sum::<u64>(), 1000);
        assert_eq!(counts[1], 0);
    }

    #[test]
    fn test_multinomial_rejects_bad_weights() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(multinomial(10, &[0.0, 0.0], &mut rng).is_err());
        assert!(multinomial(10, &[f64::NAN, 1.0], &mut rng).is_err());
        assert!(multinomial(10, &[], &mut rng).is_err());
    }

    #[test]
    fn test_multinomial_variance() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);
        let p = [0.1, 0.3, 0.6];
        let n = 500u64;
        let trials = 4000;
        let mut sum = [0.0; 3];
        let mut sum_sq = [0.0; 3];
        for _ in 0..trials {
            let c = multinomial(n, &p, &mut rng).unwrap();
            for i in 0..3 {
                sum[i] += c[i] as f64;
                sum_sq[i] += (c[i] * c[i]) as f64;
            }
        }
        for i in 0..3 {
            let mean = sum[i] / trials as f64;
            let var = sum_sq[i] / trials as f64 - mean * mean;
            let expected = n as f64 * p[i] * (1.0 - p[i]);
            assert!((mean - n as f64 * p[i]).abs() < 1.0);
            assert!((var / expected - 1.0).abs() < 0.1, "variance {var} vs {expected}");
        }
    }

    #[test]
    fn test_next_population_size() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        assert_eq!(
            next_population_size(100, 100.0, SizeRegulation::Poisson, &mut rng).unwrap(),
            100
        );
        assert_eq!(
            next_population_size(100, 250.4, SizeRegulation::Deterministic, &mut rng).unwrap(),
            250
        );
        let draws: Vec<u64> = (0..2000)
            .map(|_| next_population_size(100, 250.0, SizeRegulation::Poisson, &mut rng).unwrap())
            .collect();
        let mean = draws.iter().sum::<u64>() as f64 / draws.len() as f64;
        assert!((mean - 250.0).abs() < 2.0);
        assert!(next_population_size(100, -1.0, SizeRegulation::Poisson, &mut rng).is_err());
    }
}
