//! Recurrent encoder with cross-sample graph attention.
//!
//! Every sample in the batch attends to every other sample; the attended
//! summary is added back to the sample's own last hidden state.

use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
use longtail_core::RnnKind;

use crate::error::LayerResult;
use crate::initializer::Initializer;
use crate::layer::{last_step, leaky_relu, to_sequence, Encoder};
use crate::recurrent::StackedRnn;

/// GAT over the last recurrent state of each sample.
pub struct GatEncoder {
    feature_dim: usize,
    hidden_size: usize,
    rnn: StackedRnn,
    transformation: Linear,
    a: Tensor,
    fc_out: Linear,
}

impl GatEncoder {
    /// Builds the encoder under `vb`.
    pub fn new(
        rnn: RnnKind,
        feature_dim: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        let a_shape = [2 * hidden_size, 1];
        let a = vb.get_with_hints(
            (2 * hidden_size, 1),
            "a",
            Initializer::StandardNormal.to_init(&a_shape),
        )?;
        Ok(Self {
            feature_dim,
            hidden_size,
            rnn: StackedRnn::new(rnn, feature_dim, hidden_size, num_layers, dropout, vb.pp("rnn"))?,
            transformation: linear(hidden_size, hidden_size, vb.pp("transformation"))?,
            a,
            fc_out: linear(hidden_size, 1, vb.pp("fc_out"))?,
        })
    }

    /// `[N, N]` attention; row `i` holds the weights sample `i` puts on each `j`.
    pub fn attention(&self, hidden: &Tensor) -> LayerResult<Tensor> {
        let u = self.transformation.forward(hidden)?;
        let a_neighbor = self.a.narrow(0, 0, self.hidden_size)?;
        let a_self = self.a.narrow(0, self.hidden_size, self.hidden_size)?;
        let neighbor_scores = u.matmul(&a_neighbor)?.t()?;
        let self_scores = u.matmul(&a_self)?;
        let scores = self_scores.broadcast_add(&neighbor_scores)?;
        let scores = leaky_relu(&scores)?;
        Ok(candle_nn::ops::softmax(&scores, 1)?)
    }
}

impl Encoder for GatEncoder {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let seq = to_sequence(xs, self.feature_dim)?;
        let hidden = last_step(&self.rnn.forward(&seq, train)?)?;
        let att = self.attention(&hidden)?;
        Ok((att.matmul(&hidden)? + hidden)?)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        Ok(self.fc_out.forward(reprs)?.squeeze(1)?)
    }

    fn repr_dim(&self) -> usize {
        self.hidden_size
    }

    fn name(&self) -> &str {
        "gat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_gat_attention_rows_normalized() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enc = GatEncoder::new(RnnKind::Gru, 2, 4, 1, 0.0, vb).unwrap();
        let hidden = Tensor::randn(0f32, 1.0, (5, 4), &Device::Cpu).unwrap();
        let att = enc.attention(&hidden).unwrap();
        assert_eq!(att.dims(), &[5, 5]);
        for row in att.to_vec2::<f32>().unwrap() {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        let x = Tensor::randn(0f32, 1.0, (5, 2 * 4), &Device::Cpu).unwrap();
        assert_eq!(enc.represent(&x, false).unwrap().dims(), &[5, 4]);
    }
}
