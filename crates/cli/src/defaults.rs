//! Default values of the run configuration written by `hapsim template`.

pub const LOCI: usize = 10;
pub const POPULATION_SIZE: u64 = 10_000;
pub const GENERATIONS: i64 = 1000;
pub const REPORT_EVERY: i64 = 100;

pub const MUTATION_RATE: f64 = 1e-4;
pub const RECOMBINATION_RATE: f64 = 1e-2;
pub const OUTCROSSING_RATE: f64 = 0.1;
pub const SELECTION_COEFFICIENT: f64 = 1e-3;

pub const SEED: u64 = 42;
