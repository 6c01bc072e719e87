//! Train Command Implementation
//!
//! Fits a model on the CSV splits of a data directory. Configuration comes
//! from an optional JSON file, with command-line flags taking precedence.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use longtail_core::{
    ContrastiveConfig, ContrastiveKind, DataRegion, DeviceSpec, EncoderKind, MemoryConfig, OptimizerKind,
    TrainerConfig,
};
use longtail_data::{CsvProvider, Split};
use longtail_training::{JsonlRecorder, Recorder, Trainer};
use tracing::{info, warn};

/// Recorder object holding the resolved configuration, reused by `predict`.
pub const CONFIG_OBJECT: &str = "config";

/// File written by `--dump-representations` inside the save directory.
pub const REPRESENTATIONS_FILE: &str = "representations.safetensors";

/// Train a model and keep the parameters of the best validation IC
///
/// # Example
///
/// ```bash
/// longtail train \
///     --data-dir /data/csi300 \
///     --save-dir /models/run1 \
///     --encoder alstm --contrastive sampling --prototypes 64
/// ```
#[derive(Args, Debug, Clone, Default)]
pub struct TrainCommand {
    /// Directory holding train.csv, valid.csv and test.csv
    #[arg(long, env = "LONGTAIL_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Directory receiving parameters, metrics and the fit report
    #[arg(long, short = 'd', env = "LONGTAIL_SAVE_DIR")]
    pub save_dir: PathBuf,

    /// Training configuration file (JSON format)
    #[arg(long, short = 'c', env = "LONGTAIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Encoder variant (alstm, gru, tcn, transformer, gat)
    #[arg(long, env = "LONGTAIL_ENCODER")]
    pub encoder: Option<String>,

    /// Features per time step
    #[arg(long)]
    pub feature_dim: Option<usize>,

    /// Encoder hidden size
    #[arg(long)]
    pub hidden_size: Option<usize>,

    /// Mini-batch size
    #[arg(long, short = 'b', env = "LONGTAIL_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Maximum number of epochs
    #[arg(long, env = "LONGTAIL_EPOCHS")]
    pub epochs: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Optimizer (adam, gd)
    #[arg(long)]
    pub optimizer: Option<String>,

    /// Epochs without validation IC improvement before stopping
    #[arg(long)]
    pub early_stop: Option<usize>,

    /// Seed for shuffling, sampling and initialization
    #[arg(long, env = "LONGTAIL_SEED")]
    pub seed: Option<u64>,

    /// Market whose label layout selects the primary horizon (cn, us)
    #[arg(long)]
    pub region: Option<String>,

    /// Contrastive objective name, e.g. multi_horizon or sampling
    #[arg(long)]
    pub contrastive: Option<String>,

    /// Explicit contrastive blend weight
    #[arg(long)]
    pub lam: Option<f64>,

    /// Enable the prototype memory with this many prototypes
    #[arg(long)]
    pub prototypes: Option<usize>,

    /// Predict through the hyper-predictor (requires --prototypes)
    #[arg(long, default_value = "false")]
    pub hyper_predictor: bool,

    /// Compute device (cpu, cuda:N, metal:N)
    #[arg(long, env = "LONGTAIL_DEVICE")]
    pub device: Option<String>,

    /// Also dump the first test batch's representations
    #[arg(long, default_value = "false")]
    pub dump_representations: bool,
}

impl TrainCommand {
    /// Loads the configuration file, if any, and overlays the flags.
    pub fn build_config(&self) -> Result<TrainerConfig> {
        let mut config = match &self.config {
            Some(path) => TrainerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => {
                warn!("No config file provided, using default configuration");
                TrainerConfig::default()
            }
        };

        if let Some(name) = &self.encoder {
            config.encoder.variant = EncoderKind::from_name(name).context("Invalid --encoder")?;
        }
        if let Some(feature_dim) = self.feature_dim {
            config.encoder.feature_dim = feature_dim;
        }
        if let Some(hidden_size) = self.hidden_size {
            config.encoder.hidden_size = hidden_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(optimizer) = &self.optimizer {
            config.optimizer = optimizer.parse::<OptimizerKind>().context("Invalid --optimizer")?;
        }
        if let Some(early_stop) = self.early_stop {
            config.early_stop = early_stop;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(region) = &self.region {
            config.data_region = region.parse::<DataRegion>().context("Invalid --region")?;
        }
        if let Some(name) = &self.contrastive {
            let objective = ContrastiveKind::from_name(name).context("Invalid --contrastive")?;
            config.contrastive = Some(ContrastiveConfig::new(objective));
        }
        if let Some(lam) = self.lam {
            let contrastive = config
                .contrastive
                .as_mut()
                .context("--lam needs a contrastive objective")?;
            contrastive.lam = Some(lam);
        }
        if let Some(prototypes) = self.prototypes {
            config.memory = Some(MemoryConfig {
                prototypes,
                hyper_predictor: self.hyper_predictor,
            });
        } else if self.hyper_predictor {
            let memory = config
                .memory
                .as_mut()
                .context("--hyper-predictor needs the prototype memory")?;
            memory.hyper_predictor = true;
        }
        if let Some(device) = &self.device {
            config.device = device.parse::<DeviceSpec>().context("Invalid --device")?;
        }
        config.save_dir = Some(self.save_dir.clone());

        config.validate().context("Invalid training configuration")?;
        Ok(config)
    }

    /// Execute the train command
    pub fn run(&self) -> Result<()> {
        info!("Starting training...");
        info!("Data directory: {:?}", self.data_dir);
        info!("Save directory: {:?}", self.save_dir);

        if !self.save_dir.exists() {
            std::fs::create_dir_all(&self.save_dir).context("Failed to create save directory")?;
            info!("Created save directory: {:?}", self.save_dir);
        }

        let config = self.build_config()?;
        let mut recorder = JsonlRecorder::new(&self.save_dir).context("Failed to open recorder")?;
        let resolved = serde_json::to_value(&config).context("Failed to serialize configuration")?;
        recorder
            .save_object(CONFIG_OBJECT, &resolved)
            .context("Failed to save resolved configuration")?;

        let provider = CsvProvider::new(&self.data_dir);
        let mut trainer = Trainer::new(config).context("Failed to build trainer")?;
        let report = trainer.fit(&provider, &mut recorder).context("Training failed")?;
        info!(
            best_epoch = ?report.best_epoch,
            best_valid_ic = report.best_valid_ic,
            epochs_run = report.epochs_run,
            stop_reason = ?report.stop_reason,
            "Training finished"
        );

        if self.dump_representations {
            let test = trainer
                .prepare(&provider, Split::Test)
                .context("Failed to load the test split")?;
            let path = self.save_dir.join(REPRESENTATIONS_FILE);
            trainer
                .dump_representations(test.frame(), &path)
                .context("Failed to dump representations")?;
            info!("Representations written to {:?}", path);
        }
        Ok(())
    }
}
