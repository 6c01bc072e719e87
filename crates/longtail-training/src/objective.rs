//! Dispatch from the configured contrastive objective to its loss.

use candle_core::Tensor;
use longtail_core::{ContrastiveKind, PairWeight};
use longtail_layers::Encoder;
use longtail_losses::{
    all_pairs_contrast, classic_contrast, feature_sim_contrast, horizon_ranking_loss, multi_criterion_contrast,
    multi_horizon_proximity, prototypical_contrast, rank_n_contrast, sample_positive, sampled_contrast,
    self_augmented_contrast, supervised_contrast, ContrastOutput, ContrastSettings, PairInputs, SortedPool,
};
use longtail_tensor::PairMask;
use rand::Rng;

use crate::error::TrainingResult;
use crate::model::{LongtailModel, ModelOutput};

/// Per-batch inputs shared by every objective.
pub struct BatchContext<'a> {
    /// Zero-based epoch.
    pub epoch: usize,
    /// `[n, F * T]` batch features.
    pub xs: &'a Tensor,
    /// Row-major copy of `xs`, used to build sampled pools.
    pub features: &'a [f32],
    /// Primary labels.
    pub labels: &'a [f32],
    /// Every label horizon, one row per sample.
    pub horizons: &'a [Vec<f32>],
    /// Positions of the batch rows in the label-sorted training set.
    pub ranks: &'a [usize],
    /// Label-sorted training set, present for the sampling objective.
    pub pool: Option<&'a SortedPool>,
}

/// A contrastive loss plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct ObjectiveOutput {
    /// Scalar loss, before blending.
    pub loss: Tensor,
    /// Positive pairs, for objectives that count them.
    pub positive_num: usize,
    /// Negative pairs, for objectives that count them.
    pub negative_num: usize,
    /// Collapsed memory batches seen while computing the loss.
    pub collapsed: usize,
}

impl ObjectiveOutput {
    fn plain(loss: Tensor) -> Self {
        Self {
            loss,
            positive_num: 0,
            negative_num: 0,
            collapsed: 0,
        }
    }
}

impl From<ContrastOutput> for ObjectiveOutput {
    fn from(out: ContrastOutput) -> Self {
        Self {
            loss: out.loss,
            positive_num: out.positive_num,
            negative_num: out.negative_num,
            collapsed: 0,
        }
    }
}

/// Computes `objective` for one batch whose forward pass is `out`.
pub fn contrastive_loss<R: Rng + ?Sized>(
    objective: &ContrastiveKind,
    model: &LongtailModel,
    out: &ModelOutput,
    ctx: &BatchContext<'_>,
    rng: &mut R,
) -> TrainingResult<ObjectiveOutput> {
    let y = ctx.labels;
    let reprs = &out.reprs;
    let result = match objective {
        ContrastiveKind::MultiHorizon(p) => {
            let features = out.contrast_reprs();
            let settings = ContrastSettings::new(p.temperature, p.threshold)
                .with_all_negative(p.all_negative)
                .with_pair_weight(p.pair_weight);
            let positives = if p.use_multi_y {
                Some(multi_horizon_proximity(ctx.horizons, y)?)
            } else {
                None
            };
            let weights = match (p.pair_weight, model.weighter()) {
                (PairWeight::XSim, Some(weighter)) => Some(weighter.forward(features)?),
                _ => None,
            };
            let inputs = PairInputs {
                positives: positives.as_ref(),
                prior: out.memory.as_ref().map(|m| &m.same_prototype),
                weights: weights.as_ref(),
            };
            supervised_contrast(features, features, y, y, &settings, inputs)?.into()
        }
        ContrastiveKind::MultiCriterion(p) => {
            ObjectiveOutput::plain(multi_criterion_contrast(reprs, y, p.temperature, p.pair_weight)?)
        }
        ContrastiveKind::HorizonRanking(p) => {
            ObjectiveOutput::plain(horizon_ranking_loss(reprs, ctx.horizons, p.temperature, p.metric)?)
        }
        ContrastiveKind::Sampling(p) => return sampling_loss(p, model, out, ctx, rng),
        ContrastiveKind::RankN(p) => ObjectiveOutput::plain(rank_n_contrast(reprs, y, p.temperature)?),
        ContrastiveKind::Proxy => all_pairs_contrast(reprs, y, PairWeight::RuleProxy)?.into(),
        ContrastiveKind::Gaze => all_pairs_contrast(reprs, y, PairWeight::RuleGaze)?.into(),
        ContrastiveKind::FeatureSim(p) => {
            feature_sim_contrast(reprs, y, p.ratio, p.temperature, p.threshold)?.into()
        }
        ContrastiveKind::Classic(p) => classic_contrast(reprs, y, p)?.into(),
        ContrastiveKind::SelfAugmented(p) => {
            let augmented = model.encoder().represent(ctx.xs, true)?;
            ObjectiveOutput::plain(self_augmented_contrast(
                reprs,
                &augmented,
                y,
                p.temperature,
                p.negative_threshold,
            )?)
        }
        ContrastiveKind::Prototypical(p) => ObjectiveOutput::plain(prototypical_contrast(
            reprs,
            y,
            p.temperature,
            p.bins,
            p.uniform_split,
        )?),
    };
    Ok(result)
}

fn sampling_loss<R: Rng + ?Sized>(
    params: &longtail_core::SamplingParams,
    model: &LongtailModel,
    out: &ModelOutput,
    ctx: &BatchContext<'_>,
    rng: &mut R,
) -> TrainingResult<ObjectiveOutput> {
    let Some(pool) = ctx.pool else {
        return Err(longtail_core::ConfigError::invalid(
            "contrastive",
            "sampling needs the label-sorted training pool",
        )
        .into());
    };
    let n = ctx.labels.len();
    let sampled = sample_positive(ctx.features, ctx.labels, pool, ctx.ranks, params.max_num, rng)?;
    let m = sampled.len();
    let pool_x = Tensor::from_slice(&sampled.features, (m, pool.width()), model.device())?;
    let pool_reprs = model.encoder().represent(&pool_x, true)?;

    let mut collapsed = 0;
    let mut prior: Option<PairMask> = None;
    let mut weights: Option<Tensor> = None;
    let pool_features = match model.memory() {
        Some(memory) => {
            let pool_memory = memory.memory_enhance(&pool_reprs, true)?;
            if pool_memory.collapsed {
                collapsed += 1;
            }
            if ctx.epoch > params.warmup_epochs {
                prior = Some(pool_memory.same_prototype.head_rows(n));
                let batch_attention = out.memory.as_ref().and_then(|m| m.attention.as_ref());
                if let (Some(batch), Some(pool)) = (batch_attention, pool_memory.attention.as_ref()) {
                    weights = Some(batch.matmul(&pool.t()?.contiguous()?)?);
                }
            }
            pool_memory.enhanced
        }
        None => pool_reprs,
    };
    let pair_weight = if weights.is_some() {
        PairWeight::XSim
    } else {
        PairWeight::All1
    };
    let settings = ContrastSettings::new(params.temperature, params.threshold).with_pair_weight(pair_weight);
    let contrast = sampled_contrast(
        out.contrast_reprs(),
        &pool_features,
        ctx.labels,
        &sampled.labels,
        &settings,
        prior.as_ref(),
        weights.as_ref(),
    )?;
    let mut result = ObjectiveOutput::from(contrast);
    result.collapsed = collapsed;
    Ok(result)
}
