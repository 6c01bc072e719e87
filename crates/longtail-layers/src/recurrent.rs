//! Stacked batch-first recurrent networks.

use candle_core::Tensor;
use candle_nn::rnn::{gru, lstm, GRUConfig, LSTMConfig, GRU, LSTM, RNN};
use candle_nn::{Dropout, VarBuilder};
use longtail_core::RnnKind;

use crate::error::LayerResult;

enum RnnLayer {
    Gru(GRU),
    Lstm(LSTM),
}

impl RnnLayer {
    fn sequence(&self, xs: &Tensor) -> LayerResult<Tensor> {
        let out = match self {
            RnnLayer::Gru(cell) => {
                let states = cell.seq(xs)?;
                cell.states_to_tensor(&states)?
            }
            RnnLayer::Lstm(cell) => {
                let states = cell.seq(xs)?;
                cell.states_to_tensor(&states)?
            }
        };
        Ok(out)
    }
}

/// `num_layers` recurrent cells applied in sequence over `[N, T, F]` input,
/// with dropout between layers during training.
pub struct StackedRnn {
    layers: Vec<RnnLayer>,
    dropout: Dropout,
    hidden_size: usize,
}

impl StackedRnn {
    /// Builds the stack; layer `i` lives under `layer{i}`.
    pub fn new(
        kind: RnnKind,
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let in_dim = if i == 0 { input_size } else { hidden_size };
            let layer_vb = vb.pp(format!("layer{i}"));
            let layer = match kind {
                RnnKind::Gru => RnnLayer::Gru(gru(in_dim, hidden_size, GRUConfig::default(), layer_vb)?),
                RnnKind::Lstm => {
                    RnnLayer::Lstm(lstm(in_dim, hidden_size, LSTMConfig::default(), layer_vb)?)
                }
            };
            layers.push(layer);
        }
        Ok(Self {
            layers,
            dropout: Dropout::new(dropout),
            hidden_size,
        })
    }

    /// Runs the stack and returns every timestep of the top layer, `[N, T, H]`.
    pub fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let mut out = xs.clone();
        let depth = self.layers.len();
        for (i, layer) in self.layers.iter().enumerate() {
            out = layer.sequence(&out)?;
            if i + 1 < depth {
                out = self.dropout.forward(&out, train)?;
            }
        }
        Ok(out)
    }

    /// Hidden width of every layer.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_stacked_shapes() {
        for kind in [RnnKind::Gru, RnnKind::Lstm] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let rnn = StackedRnn::new(kind, 3, 5, 2, 0.1, vb).unwrap();
            let xs = Tensor::randn(0f32, 1.0, (4, 7, 3), &Device::Cpu).unwrap();
            let out = rnn.forward(&xs, true).unwrap();
            assert_eq!(out.dims(), &[4, 7, 5]);
            assert_eq!(rnn.hidden_size(), 5);
        }
    }
}
