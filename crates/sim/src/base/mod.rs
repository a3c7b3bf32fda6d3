//! Genotype representation shared by both engines.
//!
//! - [`Genotype`]: packed bit vector for arbitrarily long genomes; short
//!   genomes are also addressed by plain `usize` indices (bit `i` = locus `i`).
//! - [`Hypercube`]: a function over all `2^L` genotypes together with its
//!   subset (epistatic) expansion.
//! - [`TraitLandscape`]: the sparse counterpart of a hypercube used for long
//!   genomes.

pub mod genotype;
pub mod hypercube;
pub mod landscape;

pub use genotype::{spin, spin_product, Genotype};
pub use hypercube::{coeff_to_func, func_to_coeff, Hypercube, MAX_DIMENSION};
pub use landscape::{Coefficient, TraitLandscape};
