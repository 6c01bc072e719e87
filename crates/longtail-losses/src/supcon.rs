//! Label-supervised contrastive loss.
//!
//! Positives are pairs whose continuous targets are close (and, by default,
//! share a sign); negatives are pairs whose targets are far apart. Each anchor
//! row is normalized over its positives and negatives only, and the loss is
//! the negative weighted mean log-probability of the positives.
//!
//! The same routine serves square batches and rectangular batch-versus-pool
//! contrasts. In the rectangular case the first pool columns must hold the
//! anchors themselves so that self-pairs sit on the leading diagonal.

use candle_core::Tensor;
use longtail_core::{ConfigError, PairWeight};
use longtail_tensor::{ops, PairMask};

use crate::error::{check_len, LossResult};
use crate::mask::{proximity, rule_weights, same_class, separation};

/// Added to every denominator so empty rows contribute zero instead of NaN.
pub const EPS: f64 = 1e-20;

/// Thresholds of the threshold-averaged variant.
pub const CRITERION_THRESHOLDS: [f32; 5] = [0.1, 0.15, 0.2, 0.25, 0.3];

/// How representation pairs are scored before the temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogitKind {
    /// Raw dot product.
    #[default]
    Dot,
    /// Cosine similarity.
    Cosine,
}

/// Settings of one contrastive evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastSettings {
    /// Logit temperature.
    pub temperature: f32,
    /// Pairs closer than this are positives.
    pub positive_threshold: f32,
    /// Pairs farther than this are negatives.
    pub negative_threshold: f32,
    /// Positives must satisfy `y_i * y_j > t`; `None` disables the filter.
    pub class_threshold: Option<f32>,
    /// Every pair is a negative.
    pub all_negative: bool,
    /// Pair scoring.
    pub logits: LogitKind,
    /// Positive pair weighting.
    pub pair_weight: PairWeight,
}

impl ContrastSettings {
    /// Defaults around a positive threshold: negatives start `0.1` further out,
    /// positives must share a sign, dot-product logits, uniform weights.
    pub fn new(temperature: f32, threshold: f32) -> Self {
        Self {
            temperature,
            positive_threshold: threshold,
            negative_threshold: threshold + 0.1,
            class_threshold: Some(0.0),
            all_negative: false,
            logits: LogitKind::Dot,
            pair_weight: PairWeight::All1,
        }
    }

    /// Sets the negative threshold.
    pub fn with_negative_threshold(mut self, threshold: f32) -> Self {
        self.negative_threshold = threshold;
        self
    }

    /// Sets or disables the same-class filter.
    pub fn with_class_threshold(mut self, threshold: Option<f32>) -> Self {
        self.class_threshold = threshold;
        self
    }

    /// Treats every pair as a negative.
    pub fn with_all_negative(mut self, all_negative: bool) -> Self {
        self.all_negative = all_negative;
        self
    }

    /// Sets the pair scoring.
    pub fn with_logits(mut self, logits: LogitKind) -> Self {
        self.logits = logits;
        self
    }

    /// Sets the positive pair weighting.
    pub fn with_pair_weight(mut self, pair_weight: PairWeight) -> Self {
        self.pair_weight = pair_weight;
        self
    }
}

/// Optional inputs beyond representations and targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct PairInputs<'a> {
    /// Replaces the threshold criterion for positives.
    pub positives: Option<&'a PairMask>,
    /// ANDed into the positives.
    pub prior: Option<&'a PairMask>,
    /// External `[N, M]` pair weights, required by [`PairWeight::XSim`].
    pub weights: Option<&'a Tensor>,
}

/// Host-side relations of one evaluation, after self-exclusion.
#[derive(Debug, Clone)]
pub struct ContrastMasks {
    rows: usize,
    cols: usize,
    positives: Vec<f32>,
    logits_mask: Vec<f32>,
    positive_num: usize,
    negative_num: usize,
}

impl ContrastMasks {
    /// Builds positive and normalization masks for `anchor_y x pool_y`.
    pub fn build(
        anchor_y: &[f32],
        pool_y: &[f32],
        settings: &ContrastSettings,
        positives: Option<&PairMask>,
        prior: Option<&PairMask>,
    ) -> LossResult<Self> {
        let (rows, cols) = (anchor_y.len(), pool_y.len());
        let mut pos = match positives {
            Some(mask) => {
                check_len("positive mask rows", rows, mask.rows())?;
                check_len("positive mask cols", cols, mask.cols())?;
                mask.clone()
            }
            None => proximity(anchor_y, pool_y, settings.positive_threshold),
        };
        if let Some(prior) = prior {
            pos = pos.and(prior)?;
        }
        if let Some(threshold) = settings.class_threshold {
            pos = pos.and(&same_class(anchor_y, pool_y, threshold))?;
        }
        let neg = if settings.all_negative {
            PairMask::ones(rows, cols)
        } else {
            separation(anchor_y, pool_y, settings.negative_threshold)
        };

        let mut logits_mask: Vec<f32> = pos
            .values()
            .iter()
            .zip(neg.values())
            .map(|(p, n)| p + n)
            .collect();
        for i in 0..rows.min(cols) {
            logits_mask[i * cols + i] = 0.0;
        }
        let positives = pos
            .values()
            .iter()
            .zip(&logits_mask)
            .map(|(p, l)| p * l)
            .collect();

        Ok(Self {
            rows,
            cols,
            positives,
            logits_mask,
            positive_num: pos.count(),
            negative_num: neg.count(),
        })
    }

    /// Positive weights after self-exclusion, row-major.
    pub fn positives(&self) -> &[f32] {
        &self.positives
    }

    /// Pairs entering each anchor's normalization, row-major.
    pub fn logits_mask(&self) -> &[f32] {
        &self.logits_mask
    }

    /// Positive pairs before self-exclusion.
    pub fn positive_num(&self) -> usize {
        self.positive_num
    }

    /// Negative pairs.
    pub fn negative_num(&self) -> usize {
        self.negative_num
    }

    /// Whether any diagonal entry survives in either mask.
    pub fn has_self_pair(&self) -> bool {
        (0..self.rows.min(self.cols)).any(|i| {
            let k = i * self.cols + i;
            self.positives[k] != 0.0 || self.logits_mask[k] != 0.0
        })
    }
}

/// Loss value plus the pair counts reported per epoch.
#[derive(Debug, Clone)]
pub struct ContrastOutput {
    /// Scalar loss.
    pub loss: Tensor,
    /// Positive pairs before self-exclusion.
    pub positive_num: usize,
    /// Negative pairs.
    pub negative_num: usize,
}

/// Contrasts `anchors` (`[N, D]`) against `pool` (`[M, D]`).
pub fn supervised_contrast(
    anchors: &Tensor,
    pool: &Tensor,
    anchor_y: &[f32],
    pool_y: &[f32],
    settings: &ContrastSettings,
    inputs: PairInputs<'_>,
) -> LossResult<ContrastOutput> {
    check_len("anchor labels", anchors.dim(0)?, anchor_y.len())?;
    check_len("pool labels", pool.dim(0)?, pool_y.len())?;
    let masks = ContrastMasks::build(anchor_y, pool_y, settings, inputs.positives, inputs.prior)?;

    let sim = match settings.logits {
        LogitKind::Dot => ops::pairwise_dot(anchors, pool)?,
        LogitKind::Cosine => ops::pairwise_cosine(anchors, pool)?,
    };
    let logits = sim.affine(1.0 / settings.temperature as f64, 0.0)?;

    let device = anchors.device();
    let rule = rule_weights(settings.pair_weight, anchor_y, pool_y);
    let weights = match (settings.pair_weight, inputs.weights, rule) {
        (PairWeight::XSim, Some(external), _) => Some(external.clone()),
        (PairWeight::XSim, None, _) => {
            return Err(ConfigError::invalid(
                "contrastive.pair_weight",
                "x_sim needs externally supplied pair weights",
            )
            .into())
        }
        (_, _, Some(rule)) => Some(ops::matrix(&rule, anchor_y.len(), pool_y.len(), device)?),
        _ => None,
    };

    let loss = contrast_from_logits(&logits, &masks, weights.as_ref())?;
    Ok(ContrastOutput {
        loss,
        positive_num: masks.positive_num,
        negative_num: masks.negative_num,
    })
}

/// The masked log-likelihood part of [`supervised_contrast`], starting from
/// temperature-scaled logits. Row maxima are subtracted first, so adding a
/// constant to every logit leaves the loss unchanged.
pub fn contrast_from_logits(
    logits: &Tensor,
    masks: &ContrastMasks,
    weights: Option<&Tensor>,
) -> LossResult<Tensor> {
    let (rows, cols) = logits.dims2()?;
    check_len("logit rows", masks.rows, rows)?;
    check_len("logit cols", masks.cols, cols)?;
    let device = logits.device();
    let logits_mask = ops::matrix(&masks.logits_mask, rows, cols, device)?;
    let positives = ops::matrix(&masks.positives, rows, cols, device)?;

    let logits = ops::subtract_row_max(logits)?;
    let denom = (logits.exp()? * logits_mask)?
        .sum_keepdim(1)?
        .affine(1.0, EPS)?
        .log()?;
    let log_prob = logits.broadcast_sub(&denom)?;

    let weighted = match weights {
        Some(w) => (positives * w)?,
        None => positives,
    };
    let numerator = (&weighted * log_prob)?.sum(1)?;
    let denominator = weighted.sum(1)?.affine(1.0, EPS)?;
    Ok((numerator / denominator)?.mean_all()?.neg()?)
}

/// Mean of the square batch contrast over [`CRITERION_THRESHOLDS`].
pub fn multi_criterion_contrast(
    reprs: &Tensor,
    y: &[f32],
    temperature: f32,
    pair_weight: PairWeight,
) -> LossResult<Tensor> {
    let mut total = Tensor::new(0f32, reprs.device())?;
    for threshold in CRITERION_THRESHOLDS {
        let settings = ContrastSettings::new(temperature, threshold).with_pair_weight(pair_weight);
        let out = supervised_contrast(reprs, reprs, y, y, &settings, PairInputs::default())?;
        total = (total + out.loss)?;
    }
    Ok(total.affine(1.0 / CRITERION_THRESHOLDS.len() as f64, 0.0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn labels() -> Vec<f32> {
        vec![0.1, 0.15, -0.2, 0.9, 0.12, -0.25]
    }

    #[test]
    fn test_masks_never_keep_self_pairs() {
        let y = labels();
        for settings in [
            ContrastSettings::new(0.1, 0.2),
            ContrastSettings::new(2.0, 100.0)
                .with_all_negative(true)
                .with_class_threshold(None),
        ] {
            let masks = ContrastMasks::build(&y, &y, &settings, None, None).unwrap();
            assert!(!masks.has_self_pair());
        }
        let pool: Vec<f32> = y.iter().chain([0.11, 0.13].iter()).copied().collect();
        let masks =
            ContrastMasks::build(&y, &pool, &ContrastSettings::new(0.1, 0.2), None, None).unwrap();
        assert!(!masks.has_self_pair());
    }

    #[test]
    fn test_counts_include_self_before_exclusion() {
        let y = [0.1, 0.15];
        let masks =
            ContrastMasks::build(&y, &y, &ContrastSettings::new(0.1, 0.2), None, None).unwrap();
        assert_eq!(masks.positive_num(), 4);
        assert_eq!(masks.negative_num(), 0);
        assert_eq!(masks.positives(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_logit_shift_invariance() {
        let y = labels();
        let n = y.len();
        let masks =
            ContrastMasks::build(&y, &y, &ContrastSettings::new(0.1, 0.2), None, None).unwrap();
        let logits = Tensor::randn(0f32, 3.0, (n, n), &Device::Cpu).unwrap();
        let base = contrast_from_logits(&logits, &masks, None)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let shifted = contrast_from_logits(&logits.affine(1.0, 7.5).unwrap(), &masks, None)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((base - shifted).abs() < 1e-4, "{base} vs {shifted}");
    }

    #[test]
    fn test_no_positives_gives_zero_loss() {
        let y = [0.1, 0.9, -0.8];
        let reprs = Tensor::randn(0f32, 1.0, (3, 4), &Device::Cpu).unwrap();
        let out = supervised_contrast(
            &reprs,
            &reprs,
            &y,
            &y,
            &ContrastSettings::new(0.1, 0.2),
            PairInputs::default(),
        )
        .unwrap();
        assert_eq!(out.loss.to_scalar::<f32>().unwrap(), 0.0);
    }

    #[test]
    fn test_two_sample_loss_matches_closed_form() {
        // Two positives, no negatives: each row normalizes over its single
        // partner, so log_prob = 0 and the loss is zero regardless of reprs.
        let y = [0.1, 0.15];
        let reprs = Tensor::from_slice(&[1f32, 0., 0., 1.], (2, 2), &Device::Cpu).unwrap();
        let out = supervised_contrast(
            &reprs,
            &reprs,
            &y,
            &y,
            &ContrastSettings::new(0.5, 0.2),
            PairInputs::default(),
        )
        .unwrap();
        assert!(out.loss.to_scalar::<f32>().unwrap().abs() < 1e-6);

        // Add a negative: row 0 sees partner 1 (logit 0) and negative 2 (logit 2).
        let y = [0.1, 0.15, 0.9];
        let reprs =
            Tensor::from_slice(&[1f32, 0., 0., 1., 1., 0.], (3, 2), &Device::Cpu).unwrap();
        let out = supervised_contrast(
            &reprs,
            &reprs,
            &y,
            &y,
            &ContrastSettings::new(0.5, 0.2),
            PairInputs::default(),
        )
        .unwrap();
        let row0 = -(0f32 - (1f32 + 2f32.exp()).ln());
        let row1 = -(0f32 - (1f32 + 1f32).ln());
        let expected = (row0 + row1) / 3.0;
        assert!((out.loss.to_scalar::<f32>().unwrap() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_x_sim_without_weights_is_config_error() {
        let y = labels();
        let reprs = Tensor::randn(0f32, 1.0, (y.len(), 3), &Device::Cpu).unwrap();
        let settings = ContrastSettings::new(0.1, 0.2).with_pair_weight(PairWeight::XSim);
        let err =
            supervised_contrast(&reprs, &reprs, &y, &y, &settings, PairInputs::default()).unwrap_err();
        assert!(err.to_string().contains("x_sim"));
    }

    #[test]
    fn test_multi_criterion_is_finite() {
        let y = labels();
        let reprs = Tensor::randn(0f32, 1.0, (y.len(), 3), &Device::Cpu).unwrap();
        let loss = multi_criterion_contrast(&reprs, &y, 0.1, PairWeight::All1).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap().is_finite());
    }

    #[test]
    fn test_multi_criterion_averages_every_threshold() {
        let y = labels();
        let reprs = Tensor::randn(0f32, 1.0, (y.len(), 3), &Device::Cpu).unwrap();
        let mean = multi_criterion_contrast(&reprs, &y, 0.1, PairWeight::All1)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let mut sum = 0f32;
        for threshold in CRITERION_THRESHOLDS {
            let settings = ContrastSettings::new(0.1, threshold);
            let out = supervised_contrast(&reprs, &reprs, &y, &y, &settings, PairInputs::default()).unwrap();
            sum += out.loss.to_scalar::<f32>().unwrap();
        }
        let expected = sum / CRITERION_THRESHOLDS.len() as f32;
        assert!((mean - expected).abs() < 1e-5, "{mean} vs {expected}");
    }
}
