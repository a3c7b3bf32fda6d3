//! # hapsim
//!
//! Forward simulation of haploid populations under mutation, recombination,
//! selection and genetic drift. Two engines share one set of operators:
//!
//! - [`ExactPopulation`] tracks the full distribution over the `2^L`
//!   genotypes of a short genome, using the hypercube (Walsh-Hadamard)
//!   expansion for landscapes, moments and mutation.
//! - [`ClonePopulation`] tracks a sparse list of clones for long genomes.
//!
//! Both expose allele frequencies, linkage disequilibrium and entropies
//! through [`stats::PopulationStatistics`].

pub mod base;
pub mod errors;
pub mod evolution;
pub mod prelude;
pub mod simulation;
pub mod stats;

pub use errors::{ErrorKind, PopulationError, Result};
pub use simulation::{ClonePopulation, ExactPopulation, PopulationConfig};
