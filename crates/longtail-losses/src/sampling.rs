//! Neighbor sampling for the pooled contrast.
//!
//! Anchors with few in-batch positives get extra training rows drawn from a
//! window around their own position in the label-sorted training set. The
//! batch is then contrasted against the batch plus those rows.

use std::collections::BTreeSet;

use candle_core::Tensor;
use longtail_tensor::PairMask;
use rand::Rng;
use tracing::debug;

use crate::error::{check_len, LossResult};
use crate::mask::{sampling_positive, sampling_positive_counts};
use crate::supcon::{supervised_contrast, ContrastOutput, ContrastSettings, PairInputs};

/// Training rows sorted by primary label, plus each original row's rank.
#[derive(Debug, Clone)]
pub struct SortedPool {
    width: usize,
    features: Vec<f32>,
    labels: Vec<f32>,
    ranks: Vec<usize>,
}

impl SortedPool {
    /// Sorts `labels.len()` rows of `width` features by label, ascending.
    pub fn new(features: &[f32], labels: &[f32], width: usize) -> LossResult<Self> {
        check_len("pool features", labels.len() * width, features.len())?;
        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.sort_by(|a, b| labels[*a].total_cmp(&labels[*b]));
        let mut ranks = vec![0; labels.len()];
        let mut sorted_features = Vec::with_capacity(features.len());
        let mut sorted_labels = Vec::with_capacity(labels.len());
        for (rank, &row) in order.iter().enumerate() {
            ranks[row] = rank;
            sorted_features.extend_from_slice(&features[row * width..(row + 1) * width]);
            sorted_labels.push(labels[row]);
        }
        Ok(Self {
            width,
            features: sorted_features,
            labels: sorted_labels,
            ranks,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Feature width per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Position of original row `row` in label order.
    pub fn rank(&self, row: usize) -> usize {
        self.ranks[row]
    }

    /// Label at sorted position `rank`.
    pub fn label(&self, rank: usize) -> f32 {
        self.labels[rank]
    }

    /// Features at sorted position `rank`.
    pub fn row(&self, rank: usize) -> &[f32] {
        &self.features[rank * self.width..(rank + 1) * self.width]
    }
}

/// A batch followed by the rows sampled for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPool {
    /// Row-major features, batch rows first.
    pub features: Vec<f32>,
    /// Labels in the same order.
    pub labels: Vec<f32>,
    /// Number of leading rows that are the batch itself.
    pub batch_len: usize,
    /// Sorted positions of the appended rows.
    pub sampled: Vec<usize>,
}

impl SampledPool {
    /// Total rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the pool has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Densifies a batch with positives drawn near each under-served anchor.
///
/// `batch_ranks[i]` is the sorted position of batch row `i`. The target count
/// is `max_num`, or the largest in-batch positive count (self included).
pub fn sample_positive<R: Rng + ?Sized>(
    batch_x: &[f32],
    batch_y: &[f32],
    pool: &SortedPool,
    batch_ranks: &[usize],
    max_num: Option<usize>,
    rng: &mut R,
) -> LossResult<SampledPool> {
    let n = batch_y.len();
    check_len("batch features", n * pool.width(), batch_x.len())?;
    check_len("batch ranks", n, batch_ranks.len())?;

    let mut counts = sampling_positive_counts(batch_y, batch_y);
    let target = max_num.unwrap_or_else(|| counts.iter().copied().max().unwrap_or(0));
    let total = pool.len();
    let mut drawn: BTreeSet<usize> = BTreeSet::new();
    let mut sampled = Vec::new();

    for i in 0..n {
        if counts[i] >= target {
            continue;
        }
        let low = batch_ranks[i].saturating_sub(target);
        let high = (batch_ranks[i] + target).min(total.saturating_sub(1));
        if high <= low {
            continue;
        }
        let fresh: BTreeSet<usize> = (0..target - counts[i])
            .map(|_| rng.gen_range(low..high))
            .filter(|idx| !drawn.contains(idx))
            .collect();
        for idx in fresh {
            let y = pool.label(idx);
            for (count, anchor) in counts.iter_mut().zip(batch_y) {
                if sampling_positive(*anchor, y) {
                    *count += 1;
                }
            }
            drawn.insert(idx);
            sampled.push(idx);
        }
    }

    let mut features = batch_x.to_vec();
    let mut labels = batch_y.to_vec();
    for &idx in &sampled {
        features.extend_from_slice(pool.row(idx));
        labels.push(pool.label(idx));
    }
    debug!(batch = n, target, sampled = sampled.len(), "Sampled positives");
    Ok(SampledPool {
        features,
        labels,
        batch_len: n,
        sampled,
    })
}

/// Contrasts batch representations (`[n, D]`) against pool representations
/// (`[M, D]`) whose first `n` rows are the batch.
///
/// `prior` and `weights`, when present, are `n x M`.
pub fn sampled_contrast(
    batch_reprs: &Tensor,
    pool_reprs: &Tensor,
    batch_y: &[f32],
    pool_y: &[f32],
    settings: &ContrastSettings,
    prior: Option<&PairMask>,
    weights: Option<&Tensor>,
) -> LossResult<ContrastOutput> {
    let settings = settings.clone().with_class_threshold(Some(0.0));
    supervised_contrast(
        batch_reprs,
        pool_reprs,
        batch_y,
        pool_y,
        &settings,
        PairInputs {
            positives: None,
            prior,
            weights,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool() -> SortedPool {
        let labels: Vec<f32> = (0..40).map(|i| (i as f32 - 20.0) * 0.05).rev().collect();
        let features: Vec<f32> = labels.iter().flat_map(|y| [*y, 2.0 * y]).collect();
        SortedPool::new(&features, &labels, 2).unwrap()
    }

    #[test]
    fn test_sorted_pool_ranks() {
        let pool = pool();
        // the input was descending, so row 0 holds the largest label
        assert_eq!(pool.rank(0), 39);
        assert_eq!(pool.rank(39), 0);
        assert!(pool.label(0) < pool.label(1));
        assert_eq!(pool.row(39), &[pool.label(39), 2.0 * pool.label(39)]);
    }

    #[test]
    fn test_satisfied_batch_is_unchanged() {
        let pool = pool();
        let batch_y = [0.5, 0.55, 0.6];
        let batch_x = [0.5, 1.0, 0.55, 1.1, 0.6, 1.2];
        let ranks = [30, 31, 32];
        let mut rng = StdRng::seed_from_u64(3);
        let out = sample_positive(&batch_x, &batch_y, &pool, &ranks, None, &mut rng).unwrap();
        assert!(out.sampled.is_empty());
        assert_eq!(out.features, batch_x);
        assert_eq!(out.labels, batch_y);

        let again = sample_positive(&out.features, &out.labels, &pool, &ranks, None, &mut rng).unwrap();
        assert_eq!(again, out);
    }

    #[test]
    fn test_sampling_fills_sparse_anchor() {
        let pool = pool();
        // anchor 2 has no in-batch positive besides itself
        let batch_y = [-0.5, -0.45, 0.9];
        let batch_x: Vec<f32> = batch_y.iter().flat_map(|y| [*y, 2.0 * y]).collect();
        let ranks = [10, 11, 38];
        let mut rng = StdRng::seed_from_u64(11);
        let out = sample_positive(&batch_x, &batch_y, &pool, &ranks, Some(4), &mut rng).unwrap();

        assert_eq!(out.batch_len, 3);
        assert_eq!(&out.labels[..3], &batch_y);
        assert_eq!(&out.features[..6], batch_x.as_slice());
        assert!(!out.sampled.is_empty());
        let unique: BTreeSet<_> = out.sampled.iter().collect();
        assert_eq!(unique.len(), out.sampled.len());
        for (k, idx) in out.sampled.iter().enumerate() {
            assert_eq!(out.labels[3 + k], pool.label(*idx));
            assert_eq!(&out.features[(3 + k) * 2..(4 + k) * 2], pool.row(*idx));
        }
    }

    #[test]
    fn test_sampled_contrast_masks_first_columns() {
        let pool = pool();
        let batch_y = [0.9, -0.5];
        let batch_x: Vec<f32> = batch_y.iter().flat_map(|y| [*y, 2.0 * y]).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let sampled = sample_positive(&batch_x, &batch_y, &pool, &[38, 10], Some(3), &mut rng).unwrap();
        let m = sampled.len();
        let device = Device::Cpu;
        let batch = Tensor::from_slice(&batch_x, (2, 2), &device).unwrap();
        let full = Tensor::from_slice(&sampled.features, (m, 2), &device).unwrap();
        let out = sampled_contrast(
            &batch,
            &full,
            &batch_y,
            &sampled.labels,
            &ContrastSettings::new(0.1, 0.2),
            None,
            None,
        )
        .unwrap();
        assert!(out.loss.to_scalar::<f32>().unwrap().is_finite());
        assert!(out.positive_num >= 2);
    }
}
