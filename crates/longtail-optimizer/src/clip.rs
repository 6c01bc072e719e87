//! Elementwise gradient clipping.

use candle_core::backprop::GradStore;
use candle_core::Var;
use tracing::debug;

use crate::{OptimizerError, OptimizerResult};

/// Clamps every gradient of `vars` into `[-clip, clip]` in place.
///
/// Returns how many variables had a gradient.
pub fn clip_grad_value(grads: &mut GradStore, vars: &[Var], clip: f64) -> OptimizerResult<usize> {
    if !(clip.is_finite() && clip > 0.0) {
        return Err(OptimizerError::InvalidParameter(format!(
            "clip value must be positive, got {clip}"
        )));
    }
    let bound = clip as f32;
    let mut clipped = 0;
    for var in vars {
        if let Some(grad) = grads.remove(var.as_tensor()) {
            grads.insert(var.as_tensor(), grad.clamp(-bound, bound)?);
            clipped += 1;
        }
    }
    debug!(vars = clipped, clip, "Gradients clipped");
    Ok(clipped)
}
