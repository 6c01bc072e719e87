//! Error types for the longtail-layers crate.
//!
//! Covers shape mismatches between a configured layer and the batch it is
//! fed, invalid construction parameters, and failures from the tensor backend.

use longtail_tensor::TensorError;
use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Error raised by the tensor helpers.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
