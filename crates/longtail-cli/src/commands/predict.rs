//! Predict Command Implementation
//!
//! Rebuilds the model from the configuration saved by `train`, reloads its
//! components and scores every row of a CSV file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use longtail_core::TrainerConfig;
use longtail_data::read_frame;
use longtail_training::{Predictions, Trainer};
use serde::Serialize;
use tracing::info;

use super::train::CONFIG_OBJECT;

/// Score a CSV file with a trained model
///
/// The input uses the training layout; label columns are optional and
/// ignored. The output has one `datetime,instrument,score` row per input row.
///
/// # Example
///
/// ```bash
/// longtail predict --model-dir /models/run1 --input latest.csv --output scores.csv
/// ```
#[derive(Args, Debug, Clone)]
pub struct PredictCommand {
    /// Directory written by `longtail train`
    #[arg(long, short = 'm', env = "LONGTAIL_MODEL_DIR")]
    pub model_dir: PathBuf,

    /// Configuration file; defaults to the one saved in the model directory
    #[arg(long, short = 'c', env = "LONGTAIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// CSV file to score
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Output CSV file
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct ScoreRow<'a> {
    datetime: &'a str,
    instrument: &'a str,
    score: f32,
}

impl PredictCommand {
    /// Path of the configuration used to rebuild the model.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.model_dir.join(format!("{CONFIG_OBJECT}.json")))
    }

    /// Execute the predict command
    pub fn run(&self) -> Result<()> {
        let config_path = self.config_path();
        info!("Loading configuration from {:?}", config_path);
        let mut config = TrainerConfig::from_json_file(&config_path)
            .with_context(|| format!("Failed to load config file {}", config_path.display()))?;
        config.save_dir = Some(self.model_dir.clone());

        let mut trainer = Trainer::new(config).context("Failed to build model")?;
        trainer
            .load_components(&self.model_dir)
            .context("Failed to load model components")?;

        let frame = read_frame(&self.input)
            .with_context(|| format!("Failed to read input {}", self.input.display()))?;
        let predictions = trainer.predict(&frame).context("Prediction failed")?;
        write_scores(&self.output, &predictions)?;
        info!(rows = predictions.scores.len(), "Scores written to {:?}", self.output);
        Ok(())
    }
}

/// Writes `datetime,instrument,score` rows.
pub fn write_scores(path: &Path, predictions: &Predictions) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output {}", path.display()))?;
    for ((datetime, instrument), score) in predictions.index.iter().zip(&predictions.scores) {
        writer
            .serialize(ScoreRow {
                datetime,
                instrument,
                score: *score,
            })
            .context("Failed to write score row")?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(())
}
