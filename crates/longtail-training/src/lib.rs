//! Training orchestration for the longtail return predictor.
//!
//! This crate ties the model components, objectives and data collaborator
//! together:
//!
//! - **Trainer**: epoch loop with shuffled full batches, gradient clipping,
//!   per-split evaluation, early stopping and best-model restore
//! - **Objectives**: dispatch from the configured contrastive kind to its loss
//! - **Metrics**: daily Pearson / Spearman correlations and their IC / ICIR
//! - **Recorders**: sinks for per-epoch metrics and the final fit report
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Trainer                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ LongtailModel│  │ EarlyStopping│  │    Recorder    │  │
//! │  └──────────────┘  └──────────────┘  └────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!             ┌───────────────┼───────────────┐
//!             ▼               ▼               ▼
//!           fit()         evaluate()       predict()
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use longtail_core::{EncoderConfig, EncoderKind, TrainerConfig};
//! use longtail_data::CsvProvider;
//! use longtail_training::{JsonlRecorder, Trainer};
//!
//! let encoder = EncoderConfig::new(EncoderKind::Gru).with_feature_dim(6);
//! let config = TrainerConfig::new(encoder)
//!     .with_batch_size(800)
//!     .with_save_dir("/tmp/longtail");
//!
//! let mut trainer = Trainer::new(config).unwrap();
//! let mut recorder = JsonlRecorder::new("/tmp/longtail").unwrap();
//! let report = trainer.fit(&CsvProvider::new("/data/csi300"), &mut recorder).unwrap();
//! println!("best valid IC {:.4}", report.best_valid_ic);
//! ```

pub mod error;
pub mod hooks;
pub mod metrics;
pub mod model;
pub mod objective;
pub mod recorder;
pub mod trainer;

pub use error::{RecorderError, RecorderResult, TrainingError, TrainingResult};
pub use hooks::{EarlyStopping, StopDecision};
pub use metrics::{
    average_ranks, daily_correlations, format_metrics, ic_summary, nanmean, nanstd, pearson, spearman,
    EvalMetrics, IcSummary,
};
pub use model::{LongtailModel, ModelOutput, ENCODER, MEMORY, PREDICTOR, WEIGHTER};
pub use objective::{contrastive_loss, BatchContext, ObjectiveOutput};
pub use recorder::{JsonlRecorder, MemoryRecorder, Recorder};
pub use trainer::{
    EpochStats, FitReport, PreparedSplit, Predictions, StopReason, Trainer, TrainerState, DUMP_TENSORS,
};
