//! Label-derived pair relations and pair weights.
//!
//! Every relation is `anchors x pool`: square when a batch is contrasted with
//! itself, rectangular when the pool is a batch extended with sampled rows.
//! Self-pairs are removed later, right before normalization.

use longtail_core::{ConfigError, PairWeight, MULTI_HORIZON_WIDTH};
use longtail_tensor::PairMask;

use crate::error::{check_len, LossResult};

/// Horizon weights of the multi-horizon proximity criterion.
pub const HORIZON_WEIGHTS: [f32; MULTI_HORIZON_WIDTH] =
    [0.0, 0.0, 0.0, 0.0, 0.125, 0.25, 0.5, 1.0, 0.5, 0.25, 0.125];

/// `|y_i - y_j| < threshold`.
pub fn proximity(anchor_y: &[f32], pool_y: &[f32], threshold: f32) -> PairMask {
    PairMask::from_fn(anchor_y.len(), pool_y.len(), |i, j| {
        (anchor_y[i] - pool_y[j]).abs() < threshold
    })
}

/// `|y_i - y_j| > threshold`.
pub fn separation(anchor_y: &[f32], pool_y: &[f32], threshold: f32) -> PairMask {
    PairMask::from_fn(anchor_y.len(), pool_y.len(), |i, j| {
        (anchor_y[i] - pool_y[j]).abs() > threshold
    })
}

/// `y_i * y_j > threshold`; with a zero threshold, same direction of return.
pub fn same_class(anchor_y: &[f32], pool_y: &[f32], threshold: f32) -> PairMask {
    PairMask::from_fn(anchor_y.len(), pool_y.len(), |i, j| {
        anchor_y[i] * pool_y[j] > threshold
    })
}

/// Multi-horizon positives: weighted L1 over all horizons below 2 and a
/// primary-label distance below 0.3.
///
/// `multi_y` holds one row of [`MULTI_HORIZON_WIDTH`] horizons per sample.
pub fn multi_horizon_proximity(multi_y: &[Vec<f32>], primary: &[f32]) -> LossResult<PairMask> {
    check_len("multi_horizon rows", primary.len(), multi_y.len())?;
    if let Some(row) = multi_y.iter().find(|row| row.len() != MULTI_HORIZON_WIDTH) {
        return Err(ConfigError::invalid(
            "labels",
            format!(
                "multi-horizon weighting needs {MULTI_HORIZON_WIDTH} horizons, got {}",
                row.len()
            ),
        )
        .into());
    }
    let n = primary.len();
    Ok(PairMask::from_fn(n, n, |i, j| {
        let weighted: f32 = multi_y[i]
            .iter()
            .zip(&multi_y[j])
            .zip(HORIZON_WEIGHTS)
            .map(|((a, b), w)| (a - b).abs() * w)
            .sum();
        weighted < 2.0 && (primary[i] - primary[j]).abs() < 0.3
    }))
}

/// Positive criterion used to decide whether an anchor needs sampled
/// neighbors: close in absolute terms or within a ratio band.
pub fn sampling_positive(a: f32, b: f32) -> bool {
    let ratio = a / b;
    (a - b).abs() < 0.2 || (ratio > 0.6 && ratio < 1.67)
}

/// Count of pool rows each anchor counts as positive under [`sampling_positive`].
pub fn sampling_positive_counts(anchor_y: &[f32], pool_y: &[f32]) -> Vec<usize> {
    anchor_y
        .iter()
        .map(|a| pool_y.iter().filter(|b| sampling_positive(*a, **b)).count())
        .collect()
}

/// Keeps, per row, the pairs whose similarity rank (ascending, ties by
/// position) exceeds `n * (1 - ratio)`.
pub fn top_similarity_prior(similarity: &[Vec<f32>], ratio: f32) -> PairMask {
    let n = similarity.len();
    let cols = similarity.first().map_or(0, Vec::len);
    let cutoff = n as f32 * (1.0 - ratio);
    let mut ranks = vec![0usize; n * cols];
    for (i, row) in similarity.iter().enumerate() {
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|a, b| row[*a].total_cmp(&row[*b]));
        for (rank, j) in order.into_iter().enumerate() {
            ranks[i * cols + j] = rank;
        }
    }
    PairMask::from_fn(n, cols, |i, j| ranks[i * cols + j] as f32 > cutoff)
}

/// Rule-based pair weights for the label-driven policies; `None` for the
/// policies that weigh uniformly or take external weights.
pub fn rule_weights(policy: PairWeight, anchor_y: &[f32], pool_y: &[f32]) -> Option<Vec<f32>> {
    let weigh: fn(f32) -> f32 = match policy {
        PairWeight::RuleGaze => |d| -(d.abs() + 1e-2).ln(),
        PairWeight::RuleProxy => |d| (-(d * d) / 2.0).exp(),
        PairWeight::All1 | PairWeight::XSim => return None,
    };
    let mut weights = Vec::with_capacity(anchor_y.len() * pool_y.len());
    for a in anchor_y {
        for b in pool_y {
            weights.push(weigh(a - b));
        }
    }
    Some(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proximity_and_separation_are_disjoint() {
        let y = [0.0, 0.1, 0.5, -0.4];
        let pos = proximity(&y, &y, 0.2);
        let neg = separation(&y, &y, 0.3);
        for i in 0..4 {
            for j in 0..4 {
                assert!(!(pos.get(i, j) && neg.get(i, j)));
            }
        }
        assert!(pos.get(0, 1));
        assert!(neg.get(2, 3));
    }

    #[test]
    fn test_same_class_with_cluster_threshold() {
        let y = [0.5, 0.2, -0.3];
        let strict = same_class(&y, &y, 0.0);
        assert!(strict.get(0, 1));
        assert!(!strict.get(0, 2));
        let clustered = same_class(&y, &y, 0.2);
        assert!(!clustered.get(0, 1));
        assert!(clustered.get(0, 0));
    }

    #[test]
    fn test_multi_horizon_requires_full_width() {
        let rows = vec![vec![0.0; 5], vec![0.0; 5]];
        let err = multi_horizon_proximity(&rows, &[0.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("11"));
    }

    #[test]
    fn test_multi_horizon_weighting() {
        let mut far = vec![0.0; MULTI_HORIZON_WIDTH];
        far[7] = 2.5;
        let near = vec![0.0; MULTI_HORIZON_WIDTH];
        let mut early = vec![0.0; MULTI_HORIZON_WIDTH];
        early[0] = 100.0;
        let mask = multi_horizon_proximity(&[near, far, early], &[0.0, 0.1, 0.0]).unwrap();
        assert!(!mask.get(0, 1));
        assert!(mask.get(0, 2));
    }

    #[test]
    fn test_sampling_positive_ratio_band() {
        assert!(sampling_positive(1.0, 1.5));
        assert!(sampling_positive(0.05, -0.1));
        assert!(!sampling_positive(1.0, 3.0));
        assert!(!sampling_positive(1.0, 0.0));
        assert_eq!(sampling_positive_counts(&[1.0], &[1.0, 1.5, 3.0]), vec![2]);
    }

    #[test]
    fn test_top_similarity_prior() {
        let sim = vec![vec![3.0, 1.0, 2.0, 0.0], vec![0.0, 1.0, 2.0, 3.0]];
        let mask = top_similarity_prior(&sim, 0.5);
        // n = 2 rows, cutoff 1.0: ranks 2 and 3 survive
        assert_eq!(mask.row_counts(), vec![2, 2]);
        assert!(mask.get(0, 0) && mask.get(0, 2));
        assert!(mask.get(1, 2) && mask.get(1, 3));
    }

    #[test]
    fn test_rule_weights() {
        assert!(rule_weights(PairWeight::All1, &[0.0], &[0.0]).is_none());
        let proxy = rule_weights(PairWeight::RuleProxy, &[0.0], &[0.0, 2.0]).unwrap();
        assert_eq!(proxy[0], 1.0);
        assert!((proxy[1] - (-2f32).exp()).abs() < 1e-6);
        let gaze = rule_weights(PairWeight::RuleGaze, &[0.0], &[0.0]).unwrap();
        assert!((gaze[0] - 100f32.ln()).abs() < 1e-4);
    }
}
