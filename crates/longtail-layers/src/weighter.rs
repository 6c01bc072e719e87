//! Learned pairwise sample weighting.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use longtail_tensor::ops;

use crate::error::LayerResult;
use crate::initializer::Initializer;

/// Scores every pair of a batch as `left·r_j + right·r_i`.
pub struct SampleWeighter {
    left: Tensor,
    right: Tensor,
}

impl SampleWeighter {
    /// Creates weighting vectors for representations of width `dim`.
    pub fn new(dim: usize, vb: VarBuilder) -> LayerResult<Self> {
        let init = Initializer::xavier_relu().to_init(&[1, dim]);
        Ok(Self {
            left: vb.get_with_hints((1, dim), "left", init)?,
            right: vb.get_with_hints((1, dim), "right", init)?,
        })
    }

    /// `[N, D]` representations to an `[N, N]` pair-weight matrix.
    pub fn forward(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        let left = ops::pairwise_dot(&self.left, reprs)?;
        let right = ops::pairwise_dot(&self.right, reprs)?.t()?;
        Ok(left.broadcast_add(&right)?)
    }
}
