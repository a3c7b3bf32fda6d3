//! Commonly used imports for convenience.
//!
//! # Example
//!
//! ```
//! use hapsim::prelude::*;
//!
//! let mut pop = ExactPopulation::new(&PopulationConfig::new(4).seed(1)).unwrap();
//! pop.set_allele_frequencies(&[0.5; 4], 1000).unwrap();
//! pop.evolve_deterministic(10).unwrap();
//! assert!((pop.allele_frequency(0).unwrap() - 0.5).abs() < 1e-9);
//! ```

pub use crate::base::{Genotype, Hypercube, TraitLandscape};
pub use crate::errors::{ErrorKind, PopulationError};
pub use crate::evolution::{
    Direction, MutationRates, RateQuery, RecombinationMap, RecombinationModel, SizeRegulation,
};
pub use crate::simulation::{ClonePopulation, CloneRecord, ExactPopulation, PopulationConfig};
pub use crate::stats::{Histogram, PopulationStatistics, SampleStatistic};
