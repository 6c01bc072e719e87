//! Error types for the longtail-tensor crate.

use thiserror::Error;

/// Error type for device and tensor helper operations.
#[derive(Debug, Error)]
pub enum TensorError {
    /// The requested device is not available in this build or on this host.
    #[error("Device `{spec}` is unavailable: {source}")]
    UnsupportedDevice {
        /// Device specification as configured.
        spec: String,
        /// Backend error.
        #[source]
        source: candle_core::Error,
    },

    /// Host buffer length does not match the requested shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual} elements")]
    ShapeMismatch {
        /// The requested shape.
        expected: Vec<usize>,
        /// Number of elements actually provided.
        actual: usize,
    },

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type for tensor helpers.
pub type TensorResult<T> = Result<T, TensorError>;
