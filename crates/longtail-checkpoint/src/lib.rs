//! Parameter snapshots and on-disk persistence for longtail models.
//!
//! This crate provides functionality for:
//!
//! - **Snapshots**: deep in-memory copies of every trainable variable, taken
//!   when validation improves and restored when training ends
//! - **Persistence**: one safetensors file per model component
//!
//! # Core Components
//!
//! - [`ParameterSnapshot`]: all variables of a `VarMap`, copied atomically
//! - [`save_components`] / [`load_component`]: per-component files under a
//!   save directory
//!
//! Variables are named `<component>.<path>` (`encoder.fc_in.weight`,
//! `memory.prototypes`, ...); the component is the first path segment.
//!
//! # Example
//!
//! ```no_run
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//! use longtail_checkpoint::{load_component, ParameterSnapshot};
//!
//! fn main() -> longtail_checkpoint::Result<()> {
//!     let varmap = VarMap::new();
//!     let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//!     let _ = candle_nn::linear(4, 1, vb.pp("encoder").pp("fc_out"))?;
//!
//!     let best = ParameterSnapshot::capture(&varmap)?;
//!     best.restore(&varmap)?;
//!     best.save_components("/tmp/run")?;
//!
//!     load_component("/tmp/run", "encoder", &varmap)?;
//!     Ok(())
//! }
//! ```

pub mod persistence;
pub mod snapshot;

pub use persistence::{component_file, load_component, save_components, write_tensors};
pub use snapshot::{component_of, ParameterSnapshot};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during snapshot and persistence operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// I/O error during checkpoint operations.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file not found.
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    /// The save directory does not exist; it is never created implicitly.
    #[error("Save directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    /// A variable of the model has no tensor in the file.
    #[error("Tensor `{name}` missing from {path}")]
    MissingTensor {
        /// File being loaded.
        path: PathBuf,
        /// Name of the missing tensor.
        name: String,
    },

    /// The file holds a tensor the model does not have.
    #[error("Unexpected tensor `{name}` in {path}")]
    UnexpectedTensor {
        /// File being loaded.
        path: PathBuf,
        /// Name of the extra tensor.
        name: String,
    },

    /// A tensor's shape differs from the model variable's.
    #[error("Shape mismatch for `{name}`: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Name of the tensor.
        name: String,
        /// Shape of the model variable.
        expected: Vec<usize>,
        /// Shape stored in the file or snapshot.
        found: Vec<usize>,
    },

    /// The variable map's lock was poisoned by a panicking thread.
    #[error("Variable map lock poisoned")]
    Poisoned,

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
