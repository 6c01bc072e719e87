//! Primary regression loss.

use candle_core::Tensor;
use longtail_tensor::ops;

use crate::error::{check_len, LossResult};

/// Mean squared error over the rows whose label is finite.
///
/// `pred` is an `[N]` tensor; gradients flow through it. Rows with a NaN
/// label are excluded from both the sum and the count. With no finite label
/// the result is NaN.
pub fn masked_mse(pred: &Tensor, labels: &[f32]) -> LossResult<Tensor> {
    check_len("masked_mse labels", pred.dim(0)?, labels.len())?;
    let mask: Vec<f32> = labels
        .iter()
        .map(|y| if y.is_finite() { 1.0 } else { 0.0 })
        .collect();
    let count = mask.iter().sum::<f32>();
    let filled: Vec<f32> = labels
        .iter()
        .map(|y| if y.is_finite() { *y } else { 0.0 })
        .collect();
    let device = pred.device();
    let target = ops::vector(&filled, device)?;
    let mask = ops::vector(&mask, device)?;
    let sq = (pred - target)?.sqr()?.mul(&mask)?.sum_all()?;
    if count == 0.0 {
        return Ok(sq.affine(0.0, f64::NAN)?);
    }
    Ok(sq.affine(1.0 / count as f64, 0.0)?)
}

/// Host-side [`masked_mse`] used by evaluation.
pub fn masked_mse_host(pred: &[f32], labels: &[f32]) -> f64 {
    let (sum, count) = pred
        .iter()
        .zip(labels)
        .filter(|(_, y)| y.is_finite())
        .fold((0f64, 0usize), |(sum, count), (p, y)| {
            let d = (*p - *y) as f64;
            (sum + d * d, count + 1)
        });
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
