//! Fixed-setting contrastive objectives built on [`supervised_contrast`],
//! plus the two cross-entropy formulations.

use candle_core::Tensor;
use longtail_core::{ClassicParams, PairWeight};
use longtail_tensor::{ops, PairMask};

use crate::error::{check_len, LossResult};
use crate::mask::top_similarity_prior;
use crate::supcon::{supervised_contrast, ContrastOutput, ContrastSettings, LogitKind, PairInputs};

/// Logit assigned to pairs excluded from the self-augmented contrast.
const MASKED_LOGIT: f32 = -100.0;

/// Two-threshold batch contrast with a configurable same-class cutoff.
pub fn classic_contrast(reprs: &Tensor, y: &[f32], params: &ClassicParams) -> LossResult<ContrastOutput> {
    let weight = if params.use_loss_weight {
        PairWeight::RuleGaze
    } else {
        PairWeight::All1
    };
    let settings = ContrastSettings::new(params.temperature, params.threshold_pos)
        .with_negative_threshold(params.threshold_neg)
        .with_class_threshold(Some(params.threshold_cluster))
        .with_pair_weight(weight);
    supervised_contrast(reprs, reprs, y, y, &settings, PairInputs::default())
}

/// Settings shared by the proxy and gaze objectives: every pair competes,
/// cosine logits at temperature 2, no same-class filter.
pub fn all_pairs_settings(pair_weight: PairWeight) -> ContrastSettings {
    ContrastSettings::new(2.0, 100.0)
        .with_all_negative(true)
        .with_class_threshold(None)
        .with_logits(LogitKind::Cosine)
        .with_pair_weight(pair_weight)
}

/// Every-pair contrast weighted by a label-distance kernel.
pub fn all_pairs_contrast(reprs: &Tensor, y: &[f32], pair_weight: PairWeight) -> LossResult<ContrastOutput> {
    supervised_contrast(reprs, reprs, y, y, &all_pairs_settings(pair_weight), PairInputs::default())
}

/// Contrast restricted to the most similar representation pairs.
pub fn feature_sim_contrast(
    reprs: &Tensor,
    y: &[f32],
    ratio: f32,
    temperature: f32,
    threshold: f32,
) -> LossResult<ContrastOutput> {
    let similarity = ops::to_rows(&ops::pairwise_dot(&reprs.detach(), &reprs.detach())?)?;
    let prior: PairMask = top_similarity_prior(&similarity, ratio);
    let settings = ContrastSettings::new(temperature, threshold);
    supervised_contrast(
        reprs,
        reprs,
        y,
        y,
        &settings,
        PairInputs {
            prior: Some(&prior),
            ..PairInputs::default()
        },
    )
}

/// Cross-entropy of `reprs · augmentedᵀ / τ` against the diagonal, where
/// only the diagonal and pairs farther apart than `negative_threshold` keep
/// their logits.
pub fn self_augmented_contrast(
    reprs: &Tensor,
    augmented: &Tensor,
    y: &[f32],
    temperature: f32,
    negative_threshold: f32,
) -> LossResult<Tensor> {
    let n = reprs.dim(0)?;
    check_len("augmented rows", n, augmented.dim(0)?)?;
    check_len("labels", n, y.len())?;
    let device = reprs.device();

    let mut keep = vec![0f32; n * n];
    let mut fill = vec![0f32; n * n];
    for i in 0..n {
        for j in 0..n {
            if i == j || (y[i] - y[j]).abs() > negative_threshold {
                keep[i * n + j] = 1.0;
            } else {
                fill[i * n + j] = MASKED_LOGIT;
            }
        }
    }
    let logits = ops::pairwise_dot(reprs, augmented)?.affine(1.0 / temperature as f64, 0.0)?;
    let logits = ((logits * ops::matrix(&keep, n, n, device)?)? + ops::matrix(&fill, n, n, device)?)?;
    let targets = Tensor::arange(0u32, n as u32, device)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
}

/// `bins + 1` evenly spaced boundaries over `[min, max]`.
pub fn uniform_boundaries(min: f32, max: f32, bins: usize) -> Vec<f32> {
    (0..=bins)
        .map(|i| min + (max - min) * i as f32 / bins as f32)
        .collect()
}

/// `bins + 1` boundaries centred on the midpoint. The gaps next to the
/// midpoint are the widest and shrink linearly towards both ends. With an odd
/// bin count the last boundary is `max`.
pub fn imbalanced_boundaries(min: f32, max: f32, bins: usize) -> Vec<f32> {
    let half = bins / 2;
    let half_f = bins as f32 / 2.0;
    let delta = (max - min) / ((1.0 + half_f) * half_f);
    let mut boundary = vec![0f32; bins + 1];
    boundary[half] = (min + max) / 2.0;
    for i in 1..=half {
        let step = (half - i + 1) as f32 * delta;
        boundary[half + i] = boundary[half + i - 1] + step;
        boundary[half - i] = boundary[half - i + 1] - step;
    }
    if bins % 2 == 1 {
        boundary[bins] = max;
    }
    boundary
}

/// Label-bin prototype classification.
///
/// Each non-empty bin `[b_k, b_{k+1}]` (inclusive) averages its members'
/// representations into a prototype scaled by `1 / τ`; every sample is then
/// classified against the prototypes, the target being the first bin that
/// contains it.
pub fn prototypical_contrast(
    reprs: &Tensor,
    y: &[f32],
    temperature: f32,
    bins: usize,
    uniform_split: bool,
) -> LossResult<Tensor> {
    let n = reprs.dim(0)?;
    check_len("labels", n, y.len())?;
    let device = reprs.device();
    let min = y.iter().copied().fold(f32::INFINITY, f32::min);
    let max = y.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let boundary = if uniform_split {
        uniform_boundaries(min, max, bins)
    } else {
        imbalanced_boundaries(min, max, bins)
    };

    let mut membership = Vec::new();
    let mut counts = Vec::new();
    let mut targets = vec![u32::MAX; n];
    for k in 0..bins {
        let row: Vec<f32> = y
            .iter()
            .map(|v| if *v >= boundary[k] && *v <= boundary[k + 1] { 1.0 } else { 0.0 })
            .collect();
        let count = row.iter().filter(|v| **v > 0.0).count();
        if count == 0 {
            continue;
        }
        let slot = counts.len() as u32;
        for (target, member) in targets.iter_mut().zip(&row) {
            if *target == u32::MAX && *member > 0.0 {
                *target = slot;
            }
        }
        membership.extend(row);
        counts.push(count as f32 * temperature);
    }
    let kept = counts.len();
    if kept == 0 {
        return Ok(Tensor::new(0f32, device)?);
    }
    // Rows missed through rounding at the range ends fall back to the first bin.
    for target in targets.iter_mut().filter(|t| **t == u32::MAX) {
        *target = 0;
    }

    let mask = ops::matrix(&membership, kept, n, device)?;
    let scale = Tensor::from_slice(&counts, (kept, 1), device)?;
    let prototypes = mask.matmul(reprs)?.broadcast_div(&scale)?;
    let logits = ops::pairwise_dot(reprs, &prototypes)?;
    let targets = Tensor::from_slice(&targets, n, device)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn reprs(n: usize) -> Tensor {
        Tensor::randn(0f32, 1.0, (n, 4), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_imbalanced_boundaries_span_range() {
        let b = imbalanced_boundaries(-1.0, 1.0, 4);
        assert_eq!(b.len(), 5);
        assert!((b[0] + 1.0).abs() < 1e-6);
        assert!((b[4] - 1.0).abs() < 1e-6);
        let expected = [-1.0, -2.0 / 3.0, 0.0, 2.0 / 3.0, 1.0];
        for (got, want) in b.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{b:?}");
        }
        // inner gaps are wider than outer ones
        assert!(b[2] - b[1] > b[1] - b[0]);
        let odd = imbalanced_boundaries(0.0, 1.0, 5);
        assert_eq!(odd[5], 1.0);
    }

    #[test]
    fn test_uniform_boundaries() {
        assert_eq!(uniform_boundaries(0.0, 1.0, 4), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_classic_cluster_threshold_drops_small_products() {
        let y = [0.05, 0.1, 0.5, -0.4];
        let loose = classic_contrast(&reprs(4), &y, &ClassicParams::default()).unwrap();
        let strict = classic_contrast(
            &reprs(4),
            &y,
            &ClassicParams {
                threshold_cluster: 0.01,
                ..ClassicParams::default()
            },
        )
        .unwrap();
        assert!(strict.positive_num < loose.positive_num);
    }

    #[test]
    fn test_all_pairs_counts_every_negative() {
        let y = [0.1, -0.2, 0.3];
        let out = all_pairs_contrast(&reprs(3), &y, PairWeight::RuleProxy).unwrap();
        assert_eq!(out.negative_num, 9);
        assert_eq!(out.positive_num, 9);
        assert!(out.loss.to_scalar::<f32>().unwrap().is_finite());
    }

    #[test]
    fn test_feature_sim_full_ratio_matches_plain_contrast() {
        let y = [0.1, 0.15, -0.2, 0.12];
        let r = reprs(4);
        let with_prior = feature_sim_contrast(&r, &y, 1.0, 0.1, 0.2).unwrap();
        let plain = supervised_contrast(
            &r,
            &r,
            &y,
            &y,
            &ContrastSettings::new(0.1, 0.2),
            PairInputs::default(),
        )
        .unwrap();
        // rank 0 of each row is dropped by the strict cutoff
        assert!(with_prior.positive_num <= plain.positive_num);
    }

    #[test]
    fn test_self_augmented_identical_views() {
        let y = [0.0, 0.1, 1.0];
        let r = Tensor::from_slice(&[1f32, 0., 0., 1., -1., 0.], (3, 2), &Device::Cpu).unwrap();
        let loss = self_augmented_contrast(&r, &r, &y, 1.0, 0.3)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        // row 0 masks row 1 out; rows 1 and 2 keep every far partner
        let e = 1f32.exp();
        let row0 = -(1.0 - (e + (-100f32).exp() + (-1f32).exp()).ln());
        let row1 = -(1.0 - (e + 1.0).ln());
        let row2 = -(1.0 - (1.0 / e + 1.0 + e).ln());
        let expected = (row0 + row1 + row2) / 3.0;
        assert!((loss - expected).abs() < 1e-4, "{loss} vs {expected}");
    }

    #[test]
    fn test_prototypical_skips_empty_bins() {
        let y = [0.0, 0.01, 1.0, 0.99];
        let loss = prototypical_contrast(&reprs(4), &y, 0.1, 10, true).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap().is_finite());
        let loss = prototypical_contrast(&reprs(4), &y, 0.1, 10, false).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap().is_finite());
    }
}
