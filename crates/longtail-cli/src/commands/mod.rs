//! CLI Command Implementations
//!
//! - [`train`]: fit and persist a model
//! - [`predict`]: reload a model and write scores

mod predict;
mod train;

pub use predict::PredictCommand;
pub use train::{TrainCommand, CONFIG_OBJECT, REPRESENTATIONS_FILE};
