//! Training configuration.
//!
//! Every name-selected component is a closed enum. JSON configs use
//! `#[serde(tag = "kind")]` objects for parameterized variants and plain
//! snake_case strings for the rest; command-line flags go through the
//! `from_name` constructors, which fill in the documented defaults.
//!
//! # Example
//!
//! ```
//! use longtail_core::{ContrastiveConfig, ContrastiveKind, EncoderConfig, TrainerConfig};
//!
//! let config = TrainerConfig::new(EncoderConfig::default())
//!     .with_batch_size(128)
//!     .with_contrastive(ContrastiveConfig::new(ContrastiveKind::from_name("proxy").unwrap()));
//! config.validate().unwrap();
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Number of label horizons assumed by the fixed multi-horizon weightings.
pub const MULTI_HORIZON_WIDTH: usize = 11;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Recurrent cell used inside the ALSTM and GAT encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RnnKind {
    /// Gated recurrent unit.
    #[default]
    Gru,
    /// Long short-term memory.
    Lstm,
}

impl FromStr for RnnKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gru" => Ok(Self::Gru),
            "lstm" => Ok(Self::Lstm),
            _ => Err(ConfigError::unknown("rnn_type", s)),
        }
    }
}

/// Parameters of the temporal convolution encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcnParams {
    /// Output channels of each residual level; the last entry is the representation width.
    pub channels: Vec<usize>,
    /// Convolution kernel width.
    pub kernel_size: usize,
    /// Dropout inside each residual block.
    pub dropout: f32,
}

impl Default for TcnParams {
    fn default() -> Self {
        Self {
            channels: vec![128; 5],
            kernel_size: 3,
            dropout: 0.5,
        }
    }
}

/// Parameters of the transformer-recurrent hybrid encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerParams {
    /// Attention heads; must divide the hidden size.
    pub heads: usize,
    /// Width of the position-wise feed-forward block.
    pub feedforward_dim: usize,
}

impl Default for TransformerParams {
    fn default() -> Self {
        Self {
            heads: 2,
            feedforward_dim: 2048,
        }
    }
}

/// Encoder variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderKind {
    /// Recurrent encoder with temporal attention pooling.
    Alstm {
        /// Recurrent cell type.
        #[serde(default)]
        rnn: RnnKind,
    },
    /// Plain stacked GRU, last time step.
    Gru,
    /// Temporal convolution network.
    Tcn(TcnParams),
    /// Localformer encoder followed by a GRU.
    Transformer(TransformerParams),
    /// Recurrent encoder with cross-sample graph attention.
    Gat {
        /// Recurrent cell type.
        #[serde(default)]
        rnn: RnnKind,
    },
}

impl Default for EncoderKind {
    fn default() -> Self {
        Self::Alstm { rnn: RnnKind::Gru }
    }
}

impl EncoderKind {
    /// Builds the variant named `name` with default parameters.
    pub fn from_name(name: &str) -> ConfigResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "alstm" => Ok(Self::Alstm { rnn: RnnKind::Gru }),
            "gru" => Ok(Self::Gru),
            "tcn" => Ok(Self::Tcn(TcnParams::default())),
            "transformer" => Ok(Self::Transformer(TransformerParams::default())),
            "gat" => Ok(Self::Gat { rnn: RnnKind::Gru }),
            _ => Err(ConfigError::unknown("encoder", name)),
        }
    }

    /// Short name used in logs and file names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Alstm { .. } => "alstm",
            Self::Gru => "gru",
            Self::Tcn(_) => "tcn",
            Self::Transformer(_) => "transformer",
            Self::Gat { .. } => "gat",
        }
    }
}

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Variant and its specific parameters.
    pub variant: EncoderKind,
    /// Per-timestep feature count `F`.
    pub feature_dim: usize,
    /// Hidden width of recurrent and attention stacks.
    pub hidden_size: usize,
    /// Recurrent / transformer depth.
    pub num_layers: usize,
    /// Dropout between stacked layers and inside attention nets.
    pub dropout: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            variant: EncoderKind::default(),
            feature_dim: 6,
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.2,
        }
    }
}

impl EncoderConfig {
    /// Creates a config for `variant` with default widths.
    pub fn new(variant: EncoderKind) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// Sets the per-timestep feature count.
    pub fn with_feature_dim(mut self, feature_dim: usize) -> Self {
        self.feature_dim = feature_dim;
        self
    }

    /// Sets the hidden width.
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Sets the stack depth.
    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    /// Sets the dropout probability.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Width `D` of the representation produced by this encoder.
    pub fn repr_dim(&self) -> usize {
        match &self.variant {
            EncoderKind::Alstm { .. } => 2 * self.hidden_size,
            EncoderKind::Tcn(params) => params.channels.last().copied().unwrap_or(0),
            EncoderKind::Gru | EncoderKind::Transformer(_) | EncoderKind::Gat { .. } => {
                self.hidden_size
            }
        }
    }

    /// Checks widths, depths and variant parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.feature_dim == 0 {
            return Err(ConfigError::invalid("encoder.feature_dim", "must be positive, got 0"));
        }
        if self.hidden_size < 2 {
            return Err(ConfigError::invalid(
                "encoder.hidden_size",
                format!("must be at least 2, got {}", self.hidden_size),
            ));
        }
        if self.num_layers == 0 {
            return Err(ConfigError::invalid("encoder.num_layers", "must be positive, got 0"));
        }
        check_probability("encoder.dropout", self.dropout)?;
        match &self.variant {
            EncoderKind::Tcn(params) => {
                if params.channels.is_empty() || params.channels.contains(&0) {
                    return Err(ConfigError::invalid(
                        "encoder.channels",
                        format!("must be non-empty and positive, got {:?}", params.channels),
                    ));
                }
                if params.kernel_size == 0 {
                    return Err(ConfigError::invalid("encoder.kernel_size", "must be positive, got 0"));
                }
                check_probability("encoder.tcn.dropout", params.dropout)?;
            }
            EncoderKind::Transformer(params) => {
                if params.heads == 0 || self.hidden_size % params.heads != 0 {
                    return Err(ConfigError::invalid(
                        "encoder.heads",
                        format!(
                            "{} heads do not divide hidden size {}",
                            params.heads, self.hidden_size
                        ),
                    ));
                }
                if params.feedforward_dim == 0 {
                    return Err(ConfigError::invalid(
                        "encoder.feedforward_dim",
                        "must be positive, got 0",
                    ));
                }
            }
            EncoderKind::Alstm { .. } | EncoderKind::Gru | EncoderKind::Gat { .. } => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Optimizer / loss / region / device
// ---------------------------------------------------------------------------

/// Optimizer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Adam without weight decay.
    #[default]
    Adam,
    /// Plain stochastic gradient descent.
    Gd,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "gd" => Ok(Self::Gd),
            _ => Err(ConfigError::unknown("optimizer", s)),
        }
    }
}

/// Primary regression loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Mean squared error over rows with a finite label.
    #[default]
    Mse,
}

impl FromStr for LossKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(Self::Mse),
            _ => Err(ConfigError::unknown("loss", s)),
        }
    }
}

/// Market the labels come from; decides which horizon is the primary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRegion {
    /// China A-shares: the primary label is the fourth column from the end.
    #[default]
    Cn,
    /// US equities: the primary label is the fifth column from the end.
    Us,
}

impl DataRegion {
    /// Index of the primary label among `horizons` label columns.
    pub fn primary_label_index(&self, horizons: usize) -> ConfigResult<usize> {
        let offset = match self {
            Self::Cn => 4,
            Self::Us => 5,
        };
        horizons.checked_sub(offset).ok_or_else(|| {
            ConfigError::invalid(
                "data_region",
                format!("{self} needs at least {offset} label columns, got {horizons}"),
            )
        })
    }
}

impl fmt::Display for DataRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cn => write!(f, "cn"),
            Self::Us => write!(f, "us"),
        }
    }
}

impl FromStr for DataRegion {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cn" => Ok(Self::Cn),
            "us" | "usa" => Ok(Self::Us),
            _ => Err(ConfigError::unknown("data_region", s)),
        }
    }
}

/// Compute device. Serialized as `"cpu"`, `"cuda:N"` or `"metal:N"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    /// Host CPU.
    #[default]
    Cpu,
    /// CUDA device ordinal.
    Cuda(usize),
    /// Metal device ordinal.
    Metal(usize),
}

impl FromStr for DeviceSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let lower = s.to_ascii_lowercase();
        let (name, ordinal) = match lower.split_once(':') {
            Some((name, ordinal)) => {
                let ordinal = ordinal
                    .parse::<usize>()
                    .map_err(|_| ConfigError::unknown("device", s))?;
                (name, ordinal)
            }
            None => (lower.as_str(), 0),
        };
        match name {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(ordinal)),
            "metal" => Ok(Self::Metal(ordinal)),
            _ => Err(ConfigError::unknown("device", s)),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = ConfigError;

    fn try_from(value: String) -> ConfigResult<Self> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(value: DeviceSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
            Self::Metal(ordinal) => write!(f, "metal:{ordinal}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Prototype memory settings. Presence of this section enables the memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of prototypes `K`.
    pub prototypes: usize,
    /// Predict through the hyper-predictor instead of the encoder head.
    pub hyper_predictor: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            prototypes: 256,
            hyper_predictor: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Contrastive objectives
// ---------------------------------------------------------------------------

/// Weight applied to each positive pair in the contrastive average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairWeight {
    /// Uniform weight.
    #[default]
    All1,
    /// Externally supplied (possibly learned) pairwise similarity.
    XSim,
    /// `-log(|y_i - y_j| + 0.01)`.
    RuleGaze,
    /// `exp(-(y_i - y_j)^2 / 2)`.
    RuleProxy,
}

impl FromStr for PairWeight {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all1" => Ok(Self::All1),
            "x_sim" => Ok(Self::XSim),
            "rule_gaze" => Ok(Self::RuleGaze),
            "rule_proxy" => Ok(Self::RuleProxy),
            _ => Err(ConfigError::unknown("pair_weight", s)),
        }
    }
}

/// Source of the signed label similarity used by the ranking objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Pearson correlation between two samples' horizon vectors.
    #[default]
    Ic,
    /// One minus the weighted mean absolute horizon difference.
    WeightedL1,
    /// One minus the absolute primary-label difference, clamped to `[-1, 1]`.
    SingleY,
}

/// Parameters of the default multi-horizon contrastive objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiHorizonParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Positive threshold on the primary label distance.
    pub threshold: f32,
    /// Use the weighted multi-horizon proximity criterion for positives.
    pub use_multi_y: bool,
    /// Positive pair weighting.
    pub pair_weight: PairWeight,
    /// Treat every non-self pair as a negative.
    pub all_negative: bool,
}

impl Default for MultiHorizonParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            threshold: 0.2,
            use_multi_y: false,
            pair_weight: PairWeight::All1,
            all_negative: false,
        }
    }
}

/// Parameters of the threshold-averaged objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiCriterionParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Positive pair weighting.
    pub pair_weight: PairWeight,
}

impl Default for MultiCriterionParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            pair_weight: PairWeight::All1,
        }
    }
}

/// Parameters of the signed-similarity ranking objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonRankingParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Label similarity metric.
    pub metric: SimilarityMetric,
}

impl Default for HorizonRankingParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            metric: SimilarityMetric::Ic,
        }
    }
}

/// Parameters of the neighbor-sampling objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Positive threshold between batch and pool labels.
    pub threshold: f32,
    /// Target positive count per anchor; defaults to the batch maximum.
    pub max_num: Option<usize>,
    /// Epochs before prototype attention is used as pair weight and prior.
    pub warmup_epochs: usize,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            threshold: 0.2,
            max_num: None,
            warmup_epochs: 5,
        }
    }
}

/// Parameters of the rank-N-contrast objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankNParams {
    /// Temperature applied to negative L2 feature distances.
    pub temperature: f32,
}

impl Default for RankNParams {
    fn default() -> Self {
        Self { temperature: 2.0 }
    }
}

/// Parameters of the representation-similarity prior objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSimParams {
    /// Fraction of the most similar pairs kept per anchor.
    pub ratio: f32,
    /// Logit temperature.
    pub temperature: f32,
    /// Positive threshold on the primary label distance.
    pub threshold: f32,
}

impl Default for FeatureSimParams {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            temperature: 0.1,
            threshold: 0.2,
        }
    }
}

/// Parameters of the two-threshold batch contrastive objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Pairs closer than this are positives.
    pub threshold_pos: f32,
    /// Pairs farther than this are negatives.
    pub threshold_neg: f32,
    /// Positives also need `y_i * y_j` above this.
    pub threshold_cluster: f32,
    /// Weight positives by `-log(|y_i - y_j| + 0.01)`.
    pub use_loss_weight: bool,
}

impl Default for ClassicParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            threshold_pos: 0.2,
            threshold_neg: 0.3,
            threshold_cluster: 0.0,
            use_loss_weight: false,
        }
    }
}

/// Parameters of the dropout-augmented self contrast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfAugmentedParams {
    /// Logit temperature.
    pub temperature: f32,
    /// Pairs farther apart than this stay as negatives.
    pub negative_threshold: f32,
}

impl Default for SelfAugmentedParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            negative_threshold: 0.3,
        }
    }
}

/// Parameters of the label-bin prototype objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrototypicalParams {
    /// Prototype temperature.
    pub temperature: f32,
    /// Number of label bins.
    pub bins: usize,
    /// Evenly spaced bins; otherwise bins widen towards the tails.
    pub uniform_split: bool,
}

impl Default for PrototypicalParams {
    fn default() -> Self {
        Self {
            temperature: 0.01,
            bins: 30,
            uniform_split: true,
        }
    }
}

/// Contrastive objective selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContrastiveKind {
    /// Label-proximity contrast with optional multi-horizon positives.
    MultiHorizon(MultiHorizonParams),
    /// Mean of the label-proximity contrast over five thresholds.
    MultiCriterion(MultiCriterionParams),
    /// Signed-similarity ranking consistency.
    HorizonRanking(HorizonRankingParams),
    /// Contrast against a pool densified with sampled neighbors.
    Sampling(SamplingParams),
    /// Rank-N-contrast.
    RankN(RankNParams),
    /// Every pair positive, Gaussian-kernel weighted, cosine logits.
    Proxy,
    /// Every pair positive, log-distance weighted, cosine logits.
    Gaze,
    /// Positives restricted to the most similar representations.
    FeatureSim(FeatureSimParams),
    /// Two-threshold batch contrast.
    Classic(ClassicParams),
    /// Dropout-augmented self contrast.
    SelfAugmented(SelfAugmentedParams),
    /// Label-bin prototype classification.
    Prototypical(PrototypicalParams),
}

impl Default for ContrastiveKind {
    fn default() -> Self {
        Self::MultiHorizon(MultiHorizonParams::default())
    }
}

impl ContrastiveKind {
    /// Builds the variant named `name` with default parameters.
    pub fn from_name(name: &str) -> ConfigResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "multi_horizon" => Ok(Self::MultiHorizon(MultiHorizonParams::default())),
            "multi_criterion" => Ok(Self::MultiCriterion(MultiCriterionParams::default())),
            "horizon_ranking" => Ok(Self::HorizonRanking(HorizonRankingParams::default())),
            "sampling" => Ok(Self::Sampling(SamplingParams::default())),
            "rank_n" => Ok(Self::RankN(RankNParams::default())),
            "proxy" => Ok(Self::Proxy),
            "gaze" => Ok(Self::Gaze),
            "feature_sim" => Ok(Self::FeatureSim(FeatureSimParams::default())),
            "classic" => Ok(Self::Classic(ClassicParams::default())),
            "self_augmented" => Ok(Self::SelfAugmented(SelfAugmentedParams::default())),
            "prototypical" => Ok(Self::Prototypical(PrototypicalParams::default())),
            _ => Err(ConfigError::unknown("contrastive", name)),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MultiHorizon(_) => "multi_horizon",
            Self::MultiCriterion(_) => "multi_criterion",
            Self::HorizonRanking(_) => "horizon_ranking",
            Self::Sampling(_) => "sampling",
            Self::RankN(_) => "rank_n",
            Self::Proxy => "proxy",
            Self::Gaze => "gaze",
            Self::FeatureSim(_) => "feature_sim",
            Self::Classic(_) => "classic",
            Self::SelfAugmented(_) => "self_augmented",
            Self::Prototypical(_) => "prototypical",
        }
    }

    /// Whether the objective needs the learned pairwise sample weighter.
    pub fn needs_sample_weighter(&self) -> bool {
        matches!(self, Self::MultiHorizon(p) if p.pair_weight == PairWeight::XSim)
    }

    /// Whether the objective reads all label horizons with the fixed 11-wide weighting.
    pub fn needs_full_horizons(&self) -> bool {
        match self {
            Self::MultiHorizon(p) => p.use_multi_y,
            Self::HorizonRanking(p) => p.metric == SimilarityMetric::WeightedL1,
            _ => false,
        }
    }

    /// Checks temperatures, thresholds and counts.
    pub fn validate(&self) -> ConfigResult<()> {
        let temperature = match self {
            Self::MultiHorizon(p) => p.temperature,
            Self::MultiCriterion(p) => p.temperature,
            Self::HorizonRanking(p) => p.temperature,
            Self::Sampling(p) => p.temperature,
            Self::RankN(p) => p.temperature,
            Self::Proxy | Self::Gaze => 2.0,
            Self::FeatureSim(p) => p.temperature,
            Self::Classic(p) => p.temperature,
            Self::SelfAugmented(p) => p.temperature,
            Self::Prototypical(p) => p.temperature,
        };
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(ConfigError::invalid(
                "contrastive.temperature",
                format!("must be positive, got {temperature}"),
            ));
        }
        match self {
            Self::FeatureSim(p) if !(p.ratio > 0.0 && p.ratio <= 1.0) => {
                Err(ConfigError::invalid(
                    "contrastive.ratio",
                    format!("must be in (0, 1], got {}", p.ratio),
                ))
            }
            Self::Prototypical(p) if p.bins == 0 => {
                Err(ConfigError::invalid("contrastive.bins", "must be positive, got 0"))
            }
            Self::MultiCriterion(p) if p.pair_weight == PairWeight::XSim => {
                Err(ConfigError::invalid(
                    "contrastive.pair_weight",
                    "x_sim is only available to multi_horizon",
                ))
            }
            Self::Sampling(p) if p.max_num == Some(0) => {
                Err(ConfigError::invalid("contrastive.max_num", "must be positive, got 0"))
            }
            _ => Ok(()),
        }
    }
}

/// Contrastive objective plus how it is blended into the total loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastiveConfig {
    /// Selected objective.
    pub objective: ContrastiveKind,
    /// Explicit blend weight; takes precedence over `divisor`.
    pub lam: Option<f64>,
    /// Divisor applied when no explicit weight is given.
    pub divisor: f64,
}

impl Default for ContrastiveConfig {
    fn default() -> Self {
        Self {
            objective: ContrastiveKind::default(),
            lam: None,
            divisor: 5.0,
        }
    }
}

impl ContrastiveConfig {
    /// Creates a blend for `objective` with the default divisor.
    pub fn new(objective: ContrastiveKind) -> Self {
        Self {
            objective,
            ..Self::default()
        }
    }

    /// Sets an explicit blend weight.
    pub fn with_lam(mut self, lam: f64) -> Self {
        self.lam = Some(lam);
        self
    }

    /// Multiplier applied to the contrastive loss.
    pub fn scale(&self) -> f64 {
        match self.lam {
            Some(lam) => lam,
            None => 1.0 / self.divisor,
        }
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Complete training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Encoder variant and widths.
    pub encoder: EncoderConfig,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Optimizer selection.
    pub optimizer: OptimizerKind,
    /// Primary regression loss.
    pub loss: LossKind,
    /// Epochs without validation IC improvement before stopping.
    pub early_stop: usize,
    /// Elementwise gradient value clip.
    pub grad_clip: f64,
    /// Seed for shuffling, sampling, initialization and dropout.
    pub seed: Option<u64>,
    /// Primary label selection.
    pub data_region: DataRegion,
    /// Prototype memory; absent means disabled.
    pub memory: Option<MemoryConfig>,
    /// Auxiliary contrastive objective; absent means disabled.
    pub contrastive: Option<ContrastiveConfig>,
    /// Compute device.
    pub device: DeviceSpec,
    /// Existing directory receiving the best parameters.
    pub save_dir: Option<PathBuf>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            batch_size: 256,
            epochs: 100,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            loss: LossKind::Mse,
            early_stop: 15,
            grad_clip: 3.0,
            seed: None,
            data_region: DataRegion::Cn,
            memory: None,
            contrastive: None,
            device: DeviceSpec::Cpu,
            save_dir: None,
        }
    }
}

impl TrainerConfig {
    /// Creates a configuration around `encoder` with default training settings.
    pub fn new(encoder: EncoderConfig) -> Self {
        Self {
            encoder,
            ..Self::default()
        }
    }

    /// Parses a JSON configuration string.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the maximum number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the early-stop patience.
    pub fn with_early_stop(mut self, early_stop: usize) -> Self {
        self.early_stop = early_stop;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the data region.
    pub fn with_data_region(mut self, data_region: DataRegion) -> Self {
        self.data_region = data_region;
        self
    }

    /// Enables the prototype memory.
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Enables a contrastive objective.
    pub fn with_contrastive(mut self, contrastive: ContrastiveConfig) -> Self {
        self.contrastive = Some(contrastive);
        self
    }

    /// Sets the compute device.
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Sets the directory receiving the best parameters.
    pub fn with_save_dir(mut self, save_dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    /// Whether the hyper-predictor produces the final prediction.
    pub fn uses_hyper_predictor(&self) -> bool {
        self.memory.as_ref().is_some_and(|m| m.hyper_predictor)
    }

    /// Checks every section; the first problem found is returned.
    pub fn validate(&self) -> ConfigResult<()> {
        self.encoder.validate()?;
        if self.batch_size < 2 {
            return Err(ConfigError::invalid(
                "batch_size",
                format!("must be at least 2, got {}", self.batch_size),
            ));
        }
        if self.epochs == 0 {
            return Err(ConfigError::invalid("epochs", "must be positive, got 0"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if self.early_stop == 0 {
            return Err(ConfigError::invalid("early_stop", "must be positive, got 0"));
        }
        if !(self.grad_clip.is_finite() && self.grad_clip > 0.0) {
            return Err(ConfigError::invalid(
                "grad_clip",
                format!("must be positive, got {}", self.grad_clip),
            ));
        }
        if let Some(memory) = &self.memory {
            if memory.prototypes < 2 {
                return Err(ConfigError::invalid(
                    "memory.prototypes",
                    format!("must be at least 2, got {}", memory.prototypes),
                ));
            }
        }
        if let Some(contrastive) = &self.contrastive {
            contrastive.objective.validate()?;
            if contrastive.lam.is_none() && !(contrastive.divisor > 0.0) {
                return Err(ConfigError::invalid(
                    "contrastive.divisor",
                    format!("must be positive, got {}", contrastive.divisor),
                ));
            }
        }
        Ok(())
    }
}

fn check_probability(field: &'static str, p: f32) -> ConfigResult<()> {
    if (0.0..1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be in [0, 1), got {p}")))
    }
}
