//! Signed-similarity ranking objective.
//!
//! Label similarity `s_ij` lies in `[-1, 1]`. For a similar pair (`s_ij > 0`)
//! every less similar partner `p` of the anchor competes in the denominator,
//! scaled by `s_ip / s_ij`; a dissimilar pair (`s_ij < 0`) is pushed away from
//! partners that are even more dissimilar. Pairs with zero similarity,
//! including the self-pair, contribute nothing.

use candle_core::{Tensor, D};
use longtail_core::{ConfigError, SimilarityMetric, MULTI_HORIZON_WIDTH};
use longtail_tensor::ops;

use crate::error::{check_len, LossResult};

const EPS: f64 = 1e-20;

/// Horizon compared by [`SimilarityMetric::WeightedL1`].
pub const WEIGHTED_L1_HORIZON: usize = 7;

/// Pairwise label similarity between samples under `metric`.
///
/// `horizons` holds one label row per sample. The diagonal is zeroed and
/// undefined entries (a constant row under `ic`) are replaced by zero.
pub fn label_similarity(horizons: &[Vec<f32>], metric: SimilarityMetric) -> LossResult<Vec<Vec<f32>>> {
    let width = horizons.first().map_or(0, Vec::len);
    if let Some(row) = horizons.iter().find(|row| row.len() != width) {
        return Err(ConfigError::invalid(
            "labels",
            format!("ragged label rows: {} and {} horizons", width, row.len()),
        )
        .into());
    }
    let mut sim = match metric {
        SimilarityMetric::Ic => pearson_rows(horizons),
        SimilarityMetric::WeightedL1 => {
            if width != MULTI_HORIZON_WIDTH {
                return Err(ConfigError::invalid(
                    "labels",
                    format!("weighted_l1 needs {MULTI_HORIZON_WIDTH} horizons, got {width}"),
                )
                .into());
            }
            pairwise(horizons, |a, b| {
                1.0 - (a[WEIGHTED_L1_HORIZON] - b[WEIGHTED_L1_HORIZON]).abs() / width as f32
            })
        }
        SimilarityMetric::SingleY => {
            let col = width.checked_sub(4).ok_or_else(|| {
                ConfigError::invalid("labels", format!("single_y needs at least 4 horizons, got {width}"))
            })?;
            pairwise(horizons, |a, b| (1.0 - (a[col] - b[col]).abs()).clamp(-1.0, 1.0))
        }
    };
    for (i, row) in sim.iter_mut().enumerate() {
        for v in row.iter_mut() {
            if v.is_nan() {
                *v = 0.0;
            }
        }
        row[i] = 0.0;
    }
    Ok(sim)
}

fn pairwise(rows: &[Vec<f32>], f: impl Fn(&[f32], &[f32]) -> f32) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|a| rows.iter().map(|b| f(a, b)).collect())
        .collect()
}

fn pearson_rows(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let centered: Vec<(Vec<f64>, f64)> = rows
        .iter()
        .map(|row| {
            let mean = row.iter().map(|v| *v as f64).sum::<f64>() / row.len() as f64;
            let c: Vec<f64> = row.iter().map(|v| *v as f64 - mean).collect();
            let norm = c.iter().map(|v| v * v).sum::<f64>().sqrt();
            (c, norm)
        })
        .collect();
    centered
        .iter()
        .map(|(a, na)| {
            centered
                .iter()
                .map(|(b, nb)| {
                    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    (dot / (na * nb)) as f32
                })
                .collect()
        })
        .collect()
}

/// Competition coefficient of partner `p` for pair `(i, j)`.
fn coefficient(s_ij: f32, s_ip: f32) -> f32 {
    if !(s_ip < s_ij && (s_ij < 0.0 || s_ip > 0.0)) {
        0.0
    } else if s_ij > 0.0 {
        s_ip / s_ij
    } else {
        s_ij / s_ip
    }
}

/// Ranking-consistency loss between host similarities `sim` (`N x N`) and
/// exponentiated logits `exp_logits` (`[N, N]`).
pub fn cal_con_loss(sim: &[Vec<f32>], exp_logits: &Tensor) -> LossResult<Tensor> {
    let n = sim.len();
    let (rows, cols) = exp_logits.dims2()?;
    check_len("similarity rows", rows, n)?;
    check_len("similarity cols", cols, n)?;
    let device = exp_logits.device();

    let mut coeff = vec![0f32; n * n * n];
    let mut positive = vec![0f32; n * n];
    let mut negative = vec![0f32; n * n];
    let mut scale = vec![0f32; n * n];
    for i in 0..n {
        for j in 0..n {
            let s_ij = sim[i][j];
            let base = (i * n + j) * n;
            for p in 0..n {
                coeff[base + p] = coefficient(s_ij, sim[i][p]);
            }
            let k = i * n + j;
            if s_ij > 0.0 {
                positive[k] = 1.0;
                scale[k] = s_ij;
            } else if s_ij < 0.0 {
                negative[k] = 1.0;
                scale[k] = -0.5 * s_ij;
            }
        }
    }

    let coeff = Tensor::from_slice(&coeff, (n, n, n), device)?;
    let sigma = coeff.matmul(&exp_logits.unsqueeze(2)?)?.squeeze(2)?;
    let positive = ops::matrix(&positive, n, n, device)?;
    let negative = ops::matrix(&negative, n, n, device)?;
    let scale = ops::matrix(&scale, n, n, device)?;

    let numerator = ((exp_logits * positive)? + negative)?;
    let ratio = (numerator / (exp_logits + sigma)?)?;
    let log_ratio = ratio.affine(1.0, EPS)?.log()?;
    Ok((log_ratio * scale)?.mean_all()?.neg()?)
}

/// Cosine logits of `reprs` against themselves, row-max stabilized and
/// exponentiated.
pub fn exp_cosine_logits(reprs: &Tensor, temperature: f32) -> LossResult<Tensor> {
    let logits = ops::pairwise_cosine(reprs, reprs)?.affine(1.0 / temperature as f64, 0.0)?;
    let max = logits.max_keepdim(D::Minus1)?.detach();
    Ok(logits.broadcast_sub(&max)?.exp()?)
}

/// The full ranking objective over a batch.
pub fn horizon_ranking_loss(
    reprs: &Tensor,
    horizons: &[Vec<f32>],
    temperature: f32,
    metric: SimilarityMetric,
) -> LossResult<Tensor> {
    check_len("label rows", reprs.dim(0)?, horizons.len())?;
    let sim = label_similarity(horizons, metric)?;
    let exp_logits = exp_cosine_logits(reprs, temperature)?;
    cal_con_loss(&sim, &exp_logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_coefficient_regions() {
        assert_eq!(coefficient(0.8, 0.4), 0.5);
        assert_eq!(coefficient(0.8, -0.4), 0.0);
        assert_eq!(coefficient(0.8, 0.9), 0.0);
        assert_eq!(coefficient(-0.4, -0.8), 0.5);
        assert_eq!(coefficient(-0.4, 0.3), 0.0);
        assert_eq!(coefficient(0.0, -0.5), 0.0);
    }

    #[test]
    fn test_similarity_diagonal_is_zero() {
        let rows = vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2, 0.1], vec![1.0, 1.0, 1.0, 1.0]];
        let sim = label_similarity(&rows, SimilarityMetric::Ic).unwrap();
        for (i, row) in sim.iter().enumerate() {
            assert_eq!(row[i], 0.0);
        }
        assert!((sim[0][1] + 1.0).abs() < 1e-5);
        // constant row has no correlation
        assert_eq!(sim[0][2], 0.0);
    }

    #[test]
    fn test_single_y_uses_fourth_from_end() {
        let rows = vec![vec![9.0, 0.0, 0.0, 0.0, 0.0], vec![-9.0, 0.5, 0.0, 0.0, 0.0]];
        let sim = label_similarity(&rows, SimilarityMetric::SingleY).unwrap();
        assert!((sim[0][1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_l1_requires_full_width() {
        let rows = vec![vec![0.0; 5]; 2];
        assert!(label_similarity(&rows, SimilarityMetric::WeightedL1).is_err());
    }

    #[test]
    fn test_zero_similarity_gives_zero_loss() {
        let sim = vec![vec![0.0; 3]; 3];
        let exp_logits = Tensor::ones((3, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
        let loss = cal_con_loss(&sim, &exp_logits).unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_two_level_reference_value() {
        // Anchor 0: partner 1 at s = 0.8, partner 2 at s = 0.4.
        let sim = vec![vec![0.0, 0.8, 0.4], vec![0.8, 0.0, 0.0], vec![0.4, 0.0, 0.0]];
        let e = [1.0f32, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let exp_logits = Tensor::from_slice(&e, (3, 3), &Device::Cpu).unwrap();
        let loss = cal_con_loss(&sim, &exp_logits).unwrap().to_scalar::<f32>().unwrap();
        // L_01 = -0.8 log(2 / (2 + 0.5 * 3)), L_02 = -0.4 log(3 / 3) = 0,
        // L_10 = -0.8 log(1 / 1), L_20 = -0.4 log(1 / 1).
        let expected = -0.8 * (2.0f32 / 3.5).ln() / 9.0;
        assert!((loss - expected).abs() < 1e-5, "{loss} vs {expected}");
    }

    #[test]
    fn test_horizon_ranking_is_finite() {
        let rows: Vec<Vec<f32>> = (0..6)
            .map(|i| (0..11).map(|h| ((i * 7 + h * 3) % 5) as f32 * 0.1 - 0.2).collect())
            .collect();
        let reprs = Tensor::randn(0f32, 1.0, (6, 4), &Device::Cpu).unwrap();
        for metric in [SimilarityMetric::Ic, SimilarityMetric::WeightedL1, SimilarityMetric::SingleY] {
            let loss = horizon_ranking_loss(&reprs, &rows, 0.1, metric).unwrap();
            assert!(loss.to_scalar::<f32>().unwrap().is_finite());
        }
    }
}
