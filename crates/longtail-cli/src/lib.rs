//! Longtail CLI Library
//!
//! Command-line front end for the longtail training harness:
//!
//! - **Train**: fit a model on `train.csv` / `valid.csv` / `test.csv` and keep
//!   the best-validation-IC parameters
//! - **Predict**: reload a trained model and score a CSV file
//!
//! # Example
//!
//! ```bash
//! # Train with a config file, overriding the batch size
//! longtail train --data-dir /data/csi300 --save-dir /models/run1 \
//!     --config alstm.json --batch-size 800
//!
//! # Score new rows with the saved model
//! longtail predict --model-dir /models/run1 --input /data/latest.csv --output scores.csv
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{PredictCommand, TrainCommand, CONFIG_OBJECT, REPRESENTATIONS_FILE};

/// Longtail - contrastive and prototype-memory return predictors
#[derive(Parser, Debug)]
#[command(name = "longtail")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and save its best parameters
    Train(TrainCommand),

    /// Score a CSV file with a trained model
    Predict(PredictCommand),
}
