//! Functions on the genotype hypercube and their subset (±1) expansion.
//!
//! A function `f` on the `2^L` genotypes is expanded as
//!
//! ```text
//! f(g) = sum over subsets S of coeff[S] * prod_{i in S} s_i(g)
//! ```
//!
//! with `s_i(g) = +1` when locus `i` carries allele 1 and `-1` otherwise. The
//! coefficient `coeff[S]` is the epistatic contribution of the loci in `S`;
//! `coeff[0]` is the mean of `f` over genotypes. Both representations are
//! arrays of length `2^L` (subsets are encoded as bit masks exactly like
//! genotypes) and the conversion is a Walsh-Hadamard butterfly of cost
//! `O(L * 2^L)`.

use rayon::prelude::*;

use crate::errors::{try_zeroed, PopulationError, Result};

/// Largest supported dimension (number of loci) of a [`Hypercube`].
pub const MAX_DIMENSION: usize = 20;

/// Arrays shorter than this are transformed on the calling thread.
const PARALLEL_THRESHOLD: usize = 1 << 12;

fn check_power_of_two(len: usize) -> Result<()> {
    if !len.is_power_of_two() {
        return Err(PopulationError::InvalidArgument(format!(
            "hypercube arrays must have length 2^L, got {len}"
        )));
    }
    Ok(())
}

/// One butterfly pass over every pair of entries differing at the locus with
/// stride `half`.
pub(crate) fn butterfly<F>(values: &mut [f64], half: usize, op: F)
where
    F: Fn(f64, f64) -> (f64, f64) + Sync,
{
    let apply = |block: &mut [f64]| {
        let (lo, hi) = block.split_at_mut(half);
        for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
            let (x, y) = op(*a, *b);
            *a = x;
            *b = y;
        }
    };
    if values.len() >= PARALLEL_THRESHOLD {
        values
            .par_chunks_mut(2 * half)
            .with_min_len(PARALLEL_THRESHOLD / (2 * half).min(PARALLEL_THRESHOLD))
            .for_each(apply);
    } else {
        values.chunks_mut(2 * half).for_each(apply);
    }
}

fn forward(values: &mut [f64]) {
    let mut half = 1;
    while half < values.len() {
        butterfly(values, half, |f0, f1| (0.5 * (f0 + f1), 0.5 * (f1 - f0)));
        half <<= 1;
    }
}

fn inverse(values: &mut [f64]) {
    let mut half = 1;
    while half < values.len() {
        butterfly(values, half, |c0, c1| (c0 - c1, c0 + c1));
        half <<= 1;
    }
}

/// Transform genotype-space values into subset coefficients in place,
/// including the `2^-L` normalisation.
///
/// # Errors
/// `InvalidArgument` if the length is not a power of two; `values` is left
/// untouched.
pub fn func_to_coeff(values: &mut [f64]) -> Result<()> {
    check_power_of_two(values.len())?;
    forward(values);
    Ok(())
}

/// Expand subset coefficients into genotype-space values in place.
/// Inverse of [`func_to_coeff`], with the same error.
pub fn coeff_to_func(values: &mut [f64]) -> Result<()> {
    check_power_of_two(values.len())?;
    inverse(values);
    Ok(())
}

/// A real function on the `L`-dimensional genotype hypercube, kept in both
/// genotype space (`func`) and subset space (`coeff`).
///
/// Every public mutator leaves the two arrays consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypercube {
    dim: usize,
    func: Vec<f64>,
    coeff: Vec<f64>,
}

impl Hypercube {
    /// The zero function on `dim` loci.
    ///
    /// # Errors
    /// `InvalidArgument` if `dim` is 0 or exceeds [`MAX_DIMENSION`];
    /// `AllocationFailure` if the `2^dim` arrays cannot be allocated.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 || dim > MAX_DIMENSION {
            return Err(PopulationError::InvalidArgument(format!(
                "hypercube dimension must be between 1 and {MAX_DIMENSION}, got {dim}"
            )));
        }
        let len = 1usize << dim;
        Ok(Self {
            dim,
            func: try_zeroed(len, "hypercube function")?,
            coeff: try_zeroed(len, "hypercube coefficients")?,
        })
    }

    /// Number of loci.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of genotypes, `2^L`.
    #[inline]
    pub fn len(&self) -> usize {
        self.func.len()
    }

    /// Always `false`: a hypercube has at least one locus.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.func.is_empty()
    }

    /// Genotype-space values.
    #[inline]
    pub fn func(&self) -> &[f64] {
        &self.func
    }

    /// Subset-space coefficients.
    #[inline]
    pub fn coeff(&self) -> &[f64] {
        &self.coeff
    }

    /// Value at genotype `genotype`. Panics if out of range.
    #[inline]
    pub fn get_func(&self, genotype: usize) -> f64 {
        self.func[genotype]
    }

    /// Coefficient of subset `subset`. Panics if out of range.
    #[inline]
    pub fn get_coeff(&self, subset: usize) -> f64 {
        self.coeff[subset]
    }

    /// Mutable genotype-space values. Call [`Hypercube::fft_func_to_coeff`]
    /// afterwards to restore consistency.
    #[inline]
    pub(crate) fn func_mut(&mut self) -> &mut [f64] {
        &mut self.func
    }

    /// Mutable coefficients. Call [`Hypercube::fft_coeff_to_func`]
    /// afterwards to restore consistency.
    #[inline]
    pub(crate) fn coeff_mut(&mut self) -> &mut [f64] {
        &mut self.coeff
    }

    /// Recompute the coefficients from the genotype-space values.
    pub fn fft_func_to_coeff(&mut self) {
        self.coeff.copy_from_slice(&self.func);
        forward(&mut self.coeff);
    }

    /// Recompute the genotype-space values from the coefficients.
    pub fn fft_coeff_to_func(&mut self) {
        self.func.copy_from_slice(&self.coeff);
        inverse(&mut self.func);
    }

    /// Replace the genotype-space values.
    pub fn set_func(&mut self, values: &[f64]) -> Result<()> {
        PopulationError::check_len("hypercube values", self.len(), values.len())?;
        self.func.copy_from_slice(values);
        self.fft_func_to_coeff();
        Ok(())
    }

    /// Replace the coefficients.
    pub fn set_coeff(&mut self, values: &[f64]) -> Result<()> {
        PopulationError::check_len("hypercube coefficients", self.len(), values.len())?;
        self.coeff.copy_from_slice(values);
        self.fft_coeff_to_func();
        Ok(())
    }

    /// Change a single genotype-space value and refresh the coefficients.
    pub fn set_func_entry(&mut self, genotype: usize, value: f64) -> Result<()> {
        self.check_indices(&[genotype])?;
        self.func[genotype] = value;
        self.fft_func_to_coeff();
        Ok(())
    }

    /// Change a single coefficient and refresh the genotype-space values.
    pub fn set_coeff_entry(&mut self, subset: usize, value: f64) -> Result<()> {
        self.check_indices(&[subset])?;
        self.coeff[subset] = value;
        self.fft_coeff_to_func();
        Ok(())
    }

    /// Set every entry to zero.
    pub fn reset(&mut self) {
        self.func.fill(0.0);
        self.coeff.fill(0.0);
    }

    /// First-order function: `coeff[{i}] = coeffs[i]`, every other
    /// coefficient (including the constant) zero.
    pub fn init_additive(&mut self, coeffs: &[f64]) -> Result<()> {
        PopulationError::check_len("additive coefficients", self.dim, coeffs.len())?;
        self.coeff.fill(0.0);
        for (locus, &c) in coeffs.iter().enumerate() {
            self.coeff[1 << locus] = c;
        }
        self.fft_coeff_to_func();
        Ok(())
    }

    /// Genotype-space function that is zero everywhere except at the listed
    /// genotypes.
    pub fn init_list(&mut self, genotypes: &[usize], values: &[f64]) -> Result<()> {
        PopulationError::check_len("genotype values", genotypes.len(), values.len())?;
        self.check_indices(genotypes)?;
        self.func.fill(0.0);
        for (&g, &v) in genotypes.iter().zip(values) {
            self.func[g] = v;
        }
        self.fft_func_to_coeff();
        Ok(())
    }

    /// Function given by a sparse list of subset coefficients; all other
    /// coefficients are zero.
    pub fn init_coeff_list(&mut self, subsets: &[usize], values: &[f64]) -> Result<()> {
        PopulationError::check_len("coefficient values", subsets.len(), values.len())?;
        self.check_indices(subsets)?;
        self.coeff.fill(0.0);
        for (&s, &v) in subsets.iter().zip(values) {
            self.coeff[s] = v;
        }
        self.fft_coeff_to_func();
        Ok(())
    }

    /// Rescale the genotype-space values to sum to one.
    ///
    /// # Errors
    /// `Computation` if the sum is not a positive finite number.
    pub fn normalize(&mut self) -> Result<()> {
        let total: f64 = if self.len() >= PARALLEL_THRESHOLD {
            self.func.par_iter().sum()
        } else {
            self.func.iter().sum()
        };
        if !(total.is_finite() && total > 0.0) {
            return Err(PopulationError::Computation(format!(
                "cannot normalize hypercube with total {total}"
            )));
        }
        let inv = 1.0 / total;
        self.func.iter_mut().for_each(|v| *v *= inv);
        self.fft_func_to_coeff();
        Ok(())
    }

    fn check_indices(&self, indices: &[usize]) -> Result<()> {
        match indices.iter().find(|&&g| g >= self.len()) {
            Some(&genotype) => Err(PopulationError::GenotypeOutOfRange {
                genotype,
                loci: self.dim,
            }),
            None => Ok(()),
        }
    }
}
