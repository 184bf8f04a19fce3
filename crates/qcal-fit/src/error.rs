//! Error types for the fitting crate.

use thiserror::Error;

/// Errors that can occur while fitting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    /// Not enough samples to constrain the model.
    #[error("Too few points: got {got}, need at least {need}")]
    TooFewPoints {
        /// Samples provided.
        got: usize,
        /// Samples required.
        need: usize,
    },

    /// `t` and `y` differ in length.
    #[error("Length mismatch: {t} time points but {y} values")]
    LengthMismatch {
        /// Length of `t`.
        t: usize,
        /// Length of `y`.
        y: usize,
    },

    /// NaN or infinite input.
    #[error("Non-finite value at index {0}")]
    NonFiniteData(usize),

    /// Time axis is not strictly increasing.
    #[error("Time axis must be strictly increasing (index {0})")]
    UnsortedTime(usize),

    /// The normal matrix cannot be inverted.
    #[error("Singular normal matrix: parameters are not identifiable")]
    SingularMatrix,

    /// The solver hit its iteration limit.
    #[error("No convergence after {iterations} iterations")]
    NoConvergence {
        /// Iterations performed.
        iterations: usize,
    },
}

/// Result type for fits.
pub type FitResult<T> = Result<T, FitError>;
