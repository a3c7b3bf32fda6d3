//! Population engines.
//!
//! - `ExactPopulation`: the full genotype distribution of a short genome,
//!   advanced exactly in the subset basis (drift aside).
//! - `ClonePopulation`: a sparse list of clones for long genomes, advanced
//!   by stochastic reproduction, outcrossing and mutation.
//! - `PopulationConfig`: construction options shared by both.

pub mod clone;
pub mod config;
pub mod highd;
pub mod lowd;

pub use clone::CloneRecord;
pub use config::PopulationConfig;
pub use highd::ClonePopulation;
pub use lowd::ExactPopulation;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Population random stream: seeded when a seed is given, from OS entropy
/// otherwise.
pub(crate) fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_seed(rand::rng().random()),
    }
}
