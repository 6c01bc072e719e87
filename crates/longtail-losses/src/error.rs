//! Error types for the longtail-losses crate.

use longtail_core::ConfigError;
use longtail_tensor::TensorError;
use thiserror::Error;

/// Error type for loss computation.
#[derive(Debug, Error)]
pub enum LossError {
    /// Inputs disagree on the number of rows or columns.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which input was inconsistent.
        context: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        actual: usize,
    },

    /// The objective cannot run with the supplied labels or settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error raised by the tensor helpers.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for loss computation.
pub type LossResult<T> = Result<T, LossError>;

pub(crate) fn check_len(context: &'static str, expected: usize, actual: usize) -> LossResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(LossError::ShapeMismatch {
            context,
            expected,
            actual,
        })
    }
}
