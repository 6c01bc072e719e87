//! Plain stacked GRU encoder.

use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
use longtail_core::RnnKind;

use crate::error::LayerResult;
use crate::layer::{last_step, to_sequence, Encoder};
use crate::recurrent::StackedRnn;

/// Stacked GRU over raw features; the representation is the last hidden state.
pub struct GruEncoder {
    feature_dim: usize,
    rnn: StackedRnn,
    fc_out: Linear,
}

impl GruEncoder {
    /// Builds the encoder under `vb`.
    pub fn new(
        feature_dim: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        Ok(Self {
            feature_dim,
            rnn: StackedRnn::new(
                RnnKind::Gru,
                feature_dim,
                hidden_size,
                num_layers,
                dropout,
                vb.pp("rnn"),
            )?,
            fc_out: linear(hidden_size, 1, vb.pp("fc_out"))?,
        })
    }
}

impl Encoder for GruEncoder {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let seq = to_sequence(xs, self.feature_dim)?;
        let out = self.rnn.forward(&seq, train)?;
        last_step(&out)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        Ok(self.fc_out.forward(reprs)?.squeeze(1)?)
    }

    fn repr_dim(&self) -> usize {
        self.rnn.hidden_size()
    }

    fn name(&self) -> &str {
        "gru"
    }
}
