//! Error types shared by both population engines.

use std::collections::TryReserveError;

use thiserror::Error;

/// Coarse classification of a [`PopulationError`].
///
/// Callers that only need to distinguish usage errors from resource
/// exhaustion or internal defects can match on this instead of the
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed an out-of-range index, a mismatched array, a
    /// negative rate or an unsupported configuration.
    InvalidArgument,
    /// A working buffer could not be allocated.
    AllocationFailure,
    /// An internal consistency check failed while evolving.
    InternalComputation,
}

/// Errors returned by population construction, configuration and evolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PopulationError {
    #[error("Locus {locus} out of range for {loci} loci")]
    LocusOutOfRange { locus: usize, loci: usize },

    #[error("Genotype {genotype} out of range for {loci} loci")]
    GenotypeOutOfRange { genotype: usize, loci: usize },

    #[error("Length mismatch for {what}: expected {expected}, got {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidRate { name: &'static str, value: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Internal computation error: {0}")]
    Computation(String),
}

impl PopulationError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LocusOutOfRange { .. }
            | Self::GenotypeOutOfRange { .. }
            | Self::LengthMismatch { .. }
            | Self::InvalidRate { .. }
            | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AllocationFailure(_) => ErrorKind::AllocationFailure,
            Self::Computation(_) => ErrorKind::InternalComputation,
        }
    }

    /// Returns `true` for every usage error.
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Check that `locus` is a valid locus index for `loci` loci.
    pub(crate) fn check_locus(locus: usize, loci: usize) -> Result<()> {
        if locus >= loci {
            return Err(Self::LocusOutOfRange { locus, loci });
        }
        Ok(())
    }

    /// Check that two parallel arrays have the same length.
    pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
        if expected != found {
            return Err(Self::LengthMismatch {
                what,
                expected,
                found,
            });
        }
        Ok(())
    }
}

impl From<TryReserveError> for PopulationError {
    fn from(e: TryReserveError) -> Self {
        Self::AllocationFailure(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PopulationError>;

/// Allocate a zero-filled buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed(len: usize, what: &str) -> Result<Vec<f64>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| PopulationError::AllocationFailure(format!("{what} ({len} entries): {e}")))?;
    buf.resize(len, 0.0);
    Ok(buf)
}
