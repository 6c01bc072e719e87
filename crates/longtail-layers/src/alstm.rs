//! Recurrent encoder with temporal attention pooling.
//!
//! The representation concatenates the last hidden state with an
//! attention-weighted sum over every timestep, so its width is twice the
//! recurrent hidden size.

use candle_core::{Tensor, D};
use candle_nn::{linear, linear_no_bias, Dropout, Linear, Module, VarBuilder};
use longtail_core::RnnKind;

use crate::error::LayerResult;
use crate::layer::{last_step, to_sequence, Encoder};
use crate::recurrent::StackedRnn;

/// Two-layer bottleneck net scoring each timestep, softmax-normalized over time.
pub struct TemporalAttention {
    fc_in: Linear,
    dropout: Dropout,
    fc_out: Linear,
}

impl TemporalAttention {
    /// Creates the scorer for hidden width `hidden_size`.
    pub fn new(hidden_size: usize, dropout: f32, vb: VarBuilder) -> LayerResult<Self> {
        let bottleneck = (hidden_size / 2).max(1);
        Ok(Self {
            fc_in: linear(hidden_size, bottleneck, vb.pp("fc_in"))?,
            dropout: Dropout::new(dropout),
            fc_out: linear_no_bias(bottleneck, 1, vb.pp("fc_out"))?,
        })
    }

    /// Returns `[N, T, 1]` weights summing to one over `T`.
    pub fn forward(&self, seq: &Tensor, train: bool) -> LayerResult<Tensor> {
        let hidden = self.fc_in.forward(seq)?;
        let hidden = self.dropout.forward(&hidden, train)?.tanh()?;
        let scores = self.fc_out.forward(&hidden)?;
        Ok(candle_nn::ops::softmax(&scores, D::Minus2)?)
    }
}

/// ALSTM: input projection, stacked GRU/LSTM, temporal attention.
pub struct AlstmEncoder {
    feature_dim: usize,
    fc_in: Linear,
    rnn: StackedRnn,
    attention: TemporalAttention,
    fc_out: Linear,
}

impl AlstmEncoder {
    /// Builds the encoder under `vb`.
    pub fn new(
        rnn: RnnKind,
        feature_dim: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        Ok(Self {
            feature_dim,
            fc_in: linear(feature_dim, hidden_size, vb.pp("fc_in"))?,
            rnn: StackedRnn::new(rnn, hidden_size, hidden_size, num_layers, dropout, vb.pp("rnn"))?,
            attention: TemporalAttention::new(hidden_size, dropout, vb.pp("att_net"))?,
            fc_out: linear(2 * hidden_size, 1, vb.pp("fc_out"))?,
        })
    }
}

impl Encoder for AlstmEncoder {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let seq = to_sequence(xs, self.feature_dim)?;
        let hidden = self.fc_in.forward(&seq)?.tanh()?;
        let out = self.rnn.forward(&hidden, train)?;
        let weights = self.attention.forward(&out, train)?;
        let pooled = out.broadcast_mul(&weights)?.sum(1)?;
        let last = last_step(&out)?;
        Ok(Tensor::cat(&[&last, &pooled], 1)?)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        Ok(self.fc_out.forward(reprs)?.squeeze(1)?)
    }

    fn repr_dim(&self) -> usize {
        2 * self.rnn.hidden_size()
    }

    fn name(&self) -> &str {
        "alstm"
    }
}
