//! Error types for the longtail-training crate.

use std::path::PathBuf;

use longtail_checkpoint::CheckpointError;
use longtail_core::ConfigError;
use longtail_data::DataError;
use longtail_layers::LayerError;
use longtail_losses::LossError;
use longtail_optimizer::OptimizerError;
use longtail_tensor::TensorError;
use thiserror::Error;

/// Errors raised by a [`Recorder`](crate::Recorder).
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The output file could not be written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The output directory does not exist.
    #[error("Recorder directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    /// A value could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Error type for training, evaluation and prediction.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Invalid configuration, including empty splits.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The data collaborator failed.
    #[error(transparent)]
    Data(#[from] DataError),

    /// A model component failed.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// An objective failed.
    #[error(transparent)]
    Loss(#[from] LossError),

    /// The optimizer failed.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Snapshot or persistence failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The recorder failed.
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    /// Device selection or a tensor helper failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;
