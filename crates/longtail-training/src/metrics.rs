//! Evaluation metrics.
//!
//! Predictions are scored per day against the primary label. Each day yields
//! a Pearson and a Spearman correlation; the split-level IC is the NaN-aware
//! mean of the daily values and ICIR divides it by their population standard
//! deviation.

use std::collections::BTreeMap;

use longtail_data::DailyGroups;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Split-level correlation summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IcSummary {
    /// Mean daily Pearson correlation.
    pub ic: f64,
    /// `ic` over the standard deviation of the daily values.
    pub icir: f64,
    /// Mean daily Spearman correlation.
    pub rank_ic: f64,
    /// `rank_ic` over the standard deviation of the daily values.
    pub rank_icir: f64,
}

/// Metrics of one evaluation pass over a split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Masked MSE over the split.
    pub loss: f64,
    /// `-loss`.
    pub score: f64,
    /// Daily correlation summary.
    pub ic: IcSummary,
}

impl EvalMetrics {
    /// Writes the metrics into `out` with keys prefixed by `split`.
    pub fn insert_into(&self, split: &str, out: &mut BTreeMap<String, f64>) {
        out.insert(format!("{split}_loss"), self.loss);
        out.insert(format!("{split}_score"), self.score);
        out.insert(format!("{split}_ic"), self.ic.ic);
        out.insert(format!("{split}_icir"), self.ic.icir);
        out.insert(format!("{split}_rank_ic"), self.ic.rank_ic);
        out.insert(format!("{split}_rank_icir"), self.ic.rank_icir);
    }
}

/// Pearson correlation over the pairs where both values are finite.
///
/// Fewer than two such pairs, or zero variance on either side, give NaN.
pub fn pearson(x: &[f32], y: &[f32]) -> f64 {
    let (a, b) = finite_pairs(x, y);
    pearson_f64(&a, &b)
}

/// Spearman correlation: Pearson over average ranks of the finite pairs.
pub fn spearman(x: &[f32], y: &[f32]) -> f64 {
    let (a, b) = finite_pairs(x, y);
    pearson_f64(&average_ranks(&a), &average_ranks(&b))
}

fn finite_pairs(x: &[f32], y: &[f32]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a as f64, *b as f64))
        .unzip()
}

fn pearson_f64(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return f64::NAN;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

/// One-based ranks; tied values share the mean of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Mean of the non-NaN values; NaN when there are none.
pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation of the non-NaN values.
pub fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    let kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return f64::NAN;
    }
    (kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / kept.len() as f64).sqrt()
}

fn ratio(mean: f64, std: f64) -> f64 {
    if std == 0.0 {
        f64::NAN
    } else {
        mean / std
    }
}

/// Daily Pearson and Spearman correlations, in day order.
pub fn daily_correlations(preds: &[f32], labels: &[f32], groups: &DailyGroups) -> (Vec<f64>, Vec<f64>) {
    let ranges: Vec<_> = groups.ranges().collect();
    ranges
        .par_iter()
        .map(|r| {
            let (p, y) = (&preds[r.clone()], &labels[r.clone()]);
            (pearson(p, y), spearman(p, y))
        })
        .unzip()
}

/// Summarizes the daily correlations of `preds` against `labels`.
pub fn ic_summary(preds: &[f32], labels: &[f32], groups: &DailyGroups) -> IcSummary {
    let (ics, rank_ics) = daily_correlations(preds, labels, groups);
    let (ic, rank_ic) = (nanmean(&ics), nanmean(&rank_ics));
    IcSummary {
        ic,
        icir: ratio(ic, nanstd(&ics)),
        rank_ic,
        rank_icir: ratio(rank_ic, nanstd(&rank_ics)),
    }
}

/// `key: 1.23e-2` pairs joined for log lines.
pub fn format_metrics(metrics: &BTreeMap<String, f64>) -> String {
    metrics
        .iter()
        .map(|(k, v)| format!("{k}: {v:.2e}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_ranks_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
    }

    #[test]
    fn test_pearson_and_spearman() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [1.0, 4.0, 9.0, 16.0];
        assert!((spearman(&x, &y) - 1.0).abs() < 1e-12);
        assert!(pearson(&x, &y) < 1.0);
        assert!((pearson(&x, &[4.0, 3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_days_are_nan() {
        assert!(pearson(&[1.0], &[2.0]).is_nan());
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_nan());
        // only one finite pair remains
        assert!(spearman(&[1.0, f32::NAN, 2.0], &[1.0, 2.0, f32::NAN]).is_nan());
    }

    #[test]
    fn test_nan_aware_aggregation() {
        assert_eq!(nanmean(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(nanmean(&[f64::NAN]).is_nan());
        assert_eq!(nanstd(&[1.0, 3.0, f64::NAN]), 1.0);
    }

    #[test]
    fn test_perfect_days_give_nan_icir() {
        let groups = DailyGroups::from_counts(vec![3, 3]);
        let preds = [0.1, 0.2, 0.3, -1.0, 0.0, 1.0];
        let labels = [1.0, 2.0, 3.0, 5.0, 6.0, 7.0];
        let summary = ic_summary(&preds, &labels, &groups);
        assert!((summary.ic - 1.0).abs() < 1e-9);
        assert!((summary.rank_ic - 1.0).abs() < 1e-9);
        assert!(summary.icir.is_nan());
        assert!(summary.rank_icir.is_nan());
    }

    #[test]
    fn test_two_days_of_two_rows() {
        let groups = DailyGroups::from_counts(vec![2, 2]);
        let values = [0.1, 0.2, 0.3, 0.4];
        let (ics, rank_ics) = daily_correlations(&values, &values, &groups);
        assert_eq!(ics, vec![1.0, 1.0]);
        assert_eq!(rank_ics, vec![1.0, 1.0]);

        let summary = ic_summary(&values, &values, &groups);
        assert_eq!(summary.ic, 1.0);
        assert_eq!(summary.rank_ic, 1.0);
        assert!(summary.icir.is_nan());
        assert!(summary.rank_icir.is_nan());
    }

    #[test]
    fn test_format_metrics() {
        let mut m = BTreeMap::new();
        m.insert("valid_ic".to_string(), 0.0512);
        m.insert("loss".to_string(), 1.5);
        assert_eq!(format_metrics(&m), "loss: 1.50e0, valid_ic: 5.12e-2");
    }
}
