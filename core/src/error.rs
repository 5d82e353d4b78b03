//! Error types for the tracking filter
use thiserror::Error;

/// Errors raised by the particle filter and its supporting I/O.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A weight outside `[0, 1]` reached the resampler. This indicates a normalization defect
    /// upstream and is never clamped.
    #[error("particle {index} has weight {weight} outside [0, 1]")]
    InvalidWeight { index: usize, weight: f64 },

    /// An estimate or resample was requested on a population with no particles.
    #[error("particle population is empty")]
    EmptyPopulation,

    /// A configuration value is out of its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two per-particle vectors that must line up have different lengths.
    #[error("expected {expected} weights, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// An observer index other than 0 or 1 was requested.
    #[error("unknown observer {0}")]
    UnknownObserver(usize),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing errors.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
