//! Rank-N-contrast.
//!
//! For every anchor `i` and partner `j`, the partner competes against all
//! samples `k` whose label is at least as far from `y_i` as `y_j` is.
//! Feature similarity is the negative Euclidean distance over a temperature,
//! label distance is L1.

use candle_core::Tensor;
use longtail_tensor::ops;

use crate::error::{check_len, LossResult};

const EPS: f64 = 1e-20;

/// `k != i` and `|y_i - y_k| >= |y_i - y_j|`, laid out `[i, j, k]`.
fn competitor_mask(y: &[f32]) -> Vec<f32> {
    let n = y.len();
    let mut mask = vec![0f32; n * n * n];
    for i in 0..n {
        for j in 0..n {
            let reference = (y[i] - y[j]).abs();
            let base = (i * n + j) * n;
            for k in 0..n {
                if k != i && (y[i] - y[k]).abs() >= reference {
                    mask[base + k] = 1.0;
                }
            }
        }
    }
    mask
}

/// Rank-N-contrast loss of `reprs` (`[N, D]`) against targets `y`.
///
/// Batches with fewer than two rows have no pairs and yield zero.
pub fn rank_n_contrast(reprs: &Tensor, y: &[f32], temperature: f32) -> LossResult<Tensor> {
    let n = reprs.dim(0)?;
    check_len("rank_n labels", n, y.len())?;
    let device = reprs.device();
    if n < 2 {
        return Ok(Tensor::new(0f32, device)?);
    }

    let logits = ops::pairwise_l2(reprs, reprs)?.affine(-1.0 / temperature as f64, 0.0)?;
    let logits = ops::subtract_row_max(&logits)?;
    let exp_logits = logits.exp()?;

    let mask = Tensor::from_slice(&competitor_mask(y), (n, n, n), device)?;
    let denom = mask.matmul(&exp_logits.unsqueeze(2)?)?.squeeze(2)?;
    let log_prob = (logits - denom.affine(1.0, EPS)?.log()?)?;

    let off_diagonal: Vec<f32> = (0..n * n)
        .map(|k| if k / n == k % n { 0.0 } else { 1.0 })
        .collect();
    let off_diagonal = ops::matrix(&off_diagonal, n, n, device)?;
    let total = (log_prob * off_diagonal)?.sum_all()?;
    Ok(total.affine(-1.0 / (n * (n - 1)) as f64, 0.0)?)
}
