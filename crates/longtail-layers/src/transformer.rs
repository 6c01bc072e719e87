//! Transformer-recurrent hybrid encoder.
//!
//! Features are projected to the model width, position-encoded, passed
//! through a Localformer stack (a transformer encoder whose layers each get an
//! extra local convolution branch) and summarised by a GRU.

use candle_core::{Device, Tensor, D};
use candle_nn::{
    conv1d, layer_norm, linear, Conv1d, Conv1dConfig, Dropout, LayerNorm, Linear, Module,
    VarBuilder,
};
use longtail_core::{RnnKind, TransformerParams};

use crate::error::{LayerError, LayerResult};
use crate::layer::{last_step, to_sequence, Encoder};
use crate::recurrent::StackedRnn;

const MAX_POSITIONS: usize = 1000;

/// Fixed sinusoidal position table of shape `[max_len, d_model]`.
pub struct PositionalEncoding {
    table: Tensor,
}

impl PositionalEncoding {
    /// Builds the table on `device`.
    pub fn new(d_model: usize, max_len: usize, device: &Device) -> LayerResult<Self> {
        let mut data = vec![0f32; max_len * d_model];
        for pos in 0..max_len {
            for i in (0..d_model).step_by(2) {
                let div = (-(i as f64) * (10000f64).ln() / d_model as f64).exp();
                let angle = pos as f64 * div;
                data[pos * d_model + i] = angle.sin() as f32;
                if i + 1 < d_model {
                    data[pos * d_model + i + 1] = angle.cos() as f32;
                }
            }
        }
        Ok(Self {
            table: Tensor::from_vec(data, (max_len, d_model), device)?,
        })
    }

    /// Adds the encoding to a `[N, T, d_model]` sequence.
    pub fn forward(&self, xs: &Tensor) -> LayerResult<Tensor> {
        let steps = xs.dim(1)?;
        let max_len = self.table.dim(0)?;
        if steps > max_len {
            return Err(LayerError::InvalidInputDimension {
                expected: max_len,
                actual: steps,
            });
        }
        let pe = self.table.narrow(0, 0, steps)?.unsqueeze(0)?;
        Ok(xs.broadcast_add(&pe)?)
    }
}

/// Multi-head self-attention with a packed input projection.
struct SelfAttention {
    in_proj: Linear,
    out_proj: Linear,
    heads: usize,
    head_dim: usize,
    dropout: Dropout,
}

impl SelfAttention {
    fn new(d_model: usize, heads: usize, dropout: f32, vb: VarBuilder) -> LayerResult<Self> {
        if heads == 0 || d_model % heads != 0 {
            return Err(LayerError::ConfigError {
                message: format!("{heads} heads do not divide model width {d_model}"),
            });
        }
        Ok(Self {
            in_proj: linear(d_model, 3 * d_model, vb.pp("in_proj"))?,
            out_proj: linear(d_model, d_model, vb.pp("out_proj"))?,
            heads,
            head_dim: d_model / heads,
            dropout: Dropout::new(dropout),
        })
    }

    fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let (n, steps, d_model) = xs.dims3()?;
        let qkv = self.in_proj.forward(xs)?;
        let split = |offset: usize| -> LayerResult<Tensor> {
            Ok(qkv
                .narrow(2, offset, d_model)?
                .reshape((n, steps, self.heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };
        let q = split(0)?;
        let k = split(d_model)?;
        let v = split(2 * d_model)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.t()?.contiguous()?)? * scale)?;
        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let weights = self.dropout.forward(&weights, train)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((n, steps, d_model))?;
        Ok(self.out_proj.forward(&context)?)
    }
}

/// Post-norm transformer encoder layer with a relu feed-forward block.
struct EncoderLayer {
    attention: SelfAttention,
    linear1: Linear,
    linear2: Linear,
    norm1: LayerNorm,
    norm2: LayerNorm,
    dropout: Dropout,
}

impl EncoderLayer {
    fn new(
        d_model: usize,
        params: &TransformerParams,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        Ok(Self {
            attention: SelfAttention::new(d_model, params.heads, dropout, vb.pp("self_attn"))?,
            linear1: linear(d_model, params.feedforward_dim, vb.pp("linear1"))?,
            linear2: linear(params.feedforward_dim, d_model, vb.pp("linear2"))?,
            norm1: layer_norm(d_model, 1e-5, vb.pp("norm1"))?,
            norm2: layer_norm(d_model, 1e-5, vb.pp("norm2"))?,
            dropout: Dropout::new(dropout),
        })
    }

    fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let attended = self.attention.forward(xs, train)?;
        let xs = self
            .norm1
            .forward(&(xs + self.dropout.forward(&attended, train)?)?)?;
        let ff = self.linear1.forward(&xs)?.relu()?;
        let ff = self.linear2.forward(&self.dropout.forward(&ff, train)?)?;
        Ok(self.norm2.forward(&(xs + self.dropout.forward(&ff, train)?)?)?)
    }
}

/// Transformer layers interleaved with width-preserving local convolutions.
struct Localformer {
    layers: Vec<EncoderLayer>,
    convs: Vec<Conv1d>,
}

impl Localformer {
    fn new(
        d_model: usize,
        num_layers: usize,
        params: &TransformerParams,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        let conv_cfg = Conv1dConfig {
            padding: 1,
            ..Default::default()
        };
        let mut layers = Vec::with_capacity(num_layers);
        let mut convs = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            layers.push(EncoderLayer::new(d_model, params, dropout, vb.pp(format!("layers.{i}")))?);
            convs.push(conv1d(d_model, d_model, 3, conv_cfg, vb.pp(format!("conv.{i}")))?);
        }
        Ok(Self { layers, convs })
    }

    fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let mut output = xs.clone();
        let mut branch = xs.clone();
        for (layer, conv) in self.layers.iter().zip(&self.convs) {
            branch = conv
                .forward(&output.transpose(1, 2)?.contiguous()?)?
                .transpose(1, 2)?
                .contiguous()?;
            output = layer.forward(&(&output + &branch)?, train)?;
        }
        Ok((output + branch)?)
    }
}

/// Feature projection, positional encoding, Localformer, then GRU.
pub struct TransformerEncoder {
    feature_dim: usize,
    feature_layer: Linear,
    positions: PositionalEncoding,
    localformer: Localformer,
    rnn: StackedRnn,
    decoder: Linear,
}

impl TransformerEncoder {
    /// Builds the encoder with model width `hidden_size`.
    pub fn new(
        feature_dim: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f32,
        params: &TransformerParams,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        let positions = PositionalEncoding::new(hidden_size, MAX_POSITIONS, vb.device())?;
        Ok(Self {
            feature_dim,
            feature_layer: linear(feature_dim, hidden_size, vb.pp("feature_layer"))?,
            positions,
            localformer: Localformer::new(
                hidden_size,
                num_layers,
                params,
                dropout,
                vb.pp("transformer_encoder"),
            )?,
            rnn: StackedRnn::new(
                RnnKind::Gru,
                hidden_size,
                hidden_size,
                num_layers,
                dropout,
                vb.pp("rnn"),
            )?,
            decoder: linear(hidden_size, 1, vb.pp("decoder_layer"))?,
        })
    }
}

impl Encoder for TransformerEncoder {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let seq = to_sequence(xs, self.feature_dim)?;
        let hidden = self.feature_layer.forward(&seq)?;
        let hidden = self.positions.forward(&hidden)?;
        let hidden = self.localformer.forward(&hidden, train)?;
        let out = self.rnn.forward(&hidden, train)?;
        last_step(&out)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        Ok(self.decoder.forward(reprs)?.squeeze(1)?)
    }

    fn repr_dim(&self) -> usize {
        self.rnn.hidden_size()
    }

    fn name(&self) -> &str {
        "transformer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_positional_encoding_first_rows() {
        let pe = PositionalEncoding::new(4, 8, &Device::Cpu).unwrap();
        let zeros = Tensor::zeros((1, 2, 4), DType::F32, &Device::Cpu).unwrap();
        let out = pe.forward(&zeros).unwrap().squeeze(0).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out[0], vec![0.0, 1.0, 0.0, 1.0]);
        assert!((out[1][0] - 1f32.sin()).abs() < 1e-6);
        assert!((out[1][1] - 1f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn test_transformer_shapes() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let params = TransformerParams {
            heads: 2,
            feedforward_dim: 16,
        };
        let enc = TransformerEncoder::new(3, 8, 2, 0.1, &params, vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (4, 3 * 6), &Device::Cpu).unwrap();
        let repr = enc.represent(&x, true).unwrap();
        assert_eq!(repr.dims(), &[4, 8]);
        assert_eq!(enc.predict(&repr).unwrap().dims(), &[4]);
    }

    #[test]
    fn test_heads_must_divide_width() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let params = TransformerParams {
            heads: 3,
            feedforward_dim: 16,
        };
        assert!(matches!(
            TransformerEncoder::new(3, 8, 1, 0.1, &params, vb),
            Err(LayerError::ConfigError { .. })
        ));
    }
}
