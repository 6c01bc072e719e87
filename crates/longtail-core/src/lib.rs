//! Shared configuration for the longtail training harness.
//!
//! This crate owns the configuration surface of every other crate in the
//! workspace:
//!
//! - **Encoders**: [`EncoderKind`] / [`EncoderConfig`]
//! - **Prototype memory**: [`MemoryConfig`]
//! - **Contrastive objectives**: [`ContrastiveKind`] and its parameter structs
//! - **Training**: [`TrainerConfig`], optimizer, loss, region and device selection
//!
//! All selections are closed enums; unknown names surface as [`ConfigError`]
//! carrying the offending value.
//!
//! # Example
//!
//! ```
//! use longtail_core::{EncoderConfig, EncoderKind, TrainerConfig};
//!
//! let encoder = EncoderConfig::new(EncoderKind::from_name("gru").unwrap()).with_hidden_size(32);
//! let config = TrainerConfig::new(encoder).with_epochs(10).with_seed(7);
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod error;

pub use config::{
    ClassicParams, ContrastiveConfig, ContrastiveKind, DataRegion, DeviceSpec, EncoderConfig,
    EncoderKind, FeatureSimParams, HorizonRankingParams, LossKind, MemoryConfig,
    MultiCriterionParams, MultiHorizonParams, OptimizerKind, PairWeight, PrototypicalParams,
    RankNParams, RnnKind, SamplingParams, SelfAugmentedParams, SimilarityMetric, TcnParams,
    TrainerConfig, TransformerParams, MULTI_HORIZON_WIDTH,
};
pub use error::{ConfigError, ConfigResult};
