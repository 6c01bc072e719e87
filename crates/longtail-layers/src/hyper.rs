//! Prototype-conditioned prediction head.

use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};

use crate::error::{LayerError, LayerResult};

/// Predicts through a per-sample linear map generated from the memory summary,
/// averaged with a direct linear head on the representation.
pub struct HyperPredictor {
    hyper_w: Linear,
    hyper_b: Linear,
    fc_out: Linear,
    dim: usize,
}

impl HyperPredictor {
    /// Creates a head for representations of width `dim`.
    pub fn new(dim: usize, vb: VarBuilder) -> LayerResult<Self> {
        Ok(Self {
            hyper_w: linear(dim, dim, vb.pp("hyper_w"))?,
            hyper_b: linear(2 * dim, 1, vb.pp("hyper_b"))?,
            fc_out: linear(dim, 1, vb.pp("fc_out"))?,
            dim,
        })
    }

    /// `reprs` is `[N, D]`, `enhanced` the `[N, 2D]` memory output; returns `[N]`.
    pub fn forward(&self, reprs: &Tensor, enhanced: &Tensor) -> LayerResult<Tensor> {
        let (n, width) = enhanced.dims2()?;
        if width != 2 * self.dim {
            return Err(LayerError::ShapeMismatch {
                expected: vec![n, 2 * self.dim],
                actual: vec![n, width],
            });
        }
        let prompt = enhanced.narrow(1, 0, self.dim)?;
        let weight = self.hyper_w.forward(&prompt)?.tanh()?;
        let bias = self.hyper_b.forward(enhanced)?.tanh()?;
        let generated = ((weight * reprs)?.sum_keepdim(1)? + bias)?;
        let direct = self.fc_out.forward(reprs)?;
        Ok(((generated + direct)? * 0.5)?.squeeze(1)?)
    }
}
