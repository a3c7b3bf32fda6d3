//! Evolutionary operators shared by both population engines.
//!
//! - **Mutation**: forward/backward rates per locus
//! - **Recombination**: free, single crossover and crossover models
//! - **Drift**: multinomial resampling and population-size regulation

pub mod drift;
pub mod mutation;
pub mod recombination;

pub use drift::{multinomial, next_population_size, SizeRegulation};
pub use mutation::{Direction, MutationRates, MutationSampler, RateQuery};
pub use recombination::{RecombinationMap, RecombinationModel, RecombinationPatterns};
