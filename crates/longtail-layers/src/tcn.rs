//! Temporal convolution network encoder.

use candle_core::Tensor;
use candle_nn::{conv1d, linear, Conv1d, Conv1dConfig, Dropout, Linear, Module, VarBuilder};
use longtail_core::TcnParams;

use crate::error::{LayerError, LayerResult};
use crate::layer::Encoder;

/// Drops the trailing `padding` steps added by symmetric padding, which
/// leaves a causal convolution of the original length.
fn chomp(xs: &Tensor, padding: usize) -> LayerResult<Tensor> {
    if padding == 0 {
        return Ok(xs.clone());
    }
    let len = xs.dim(2)?;
    Ok(xs.narrow(2, 0, len - padding)?)
}

/// One dilated residual level.
struct TemporalBlock {
    conv1: Conv1d,
    conv2: Conv1d,
    downsample: Option<Conv1d>,
    padding: usize,
    dropout: Dropout,
}

impl TemporalBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> LayerResult<Self> {
        let padding = (kernel_size - 1) * dilation;
        let cfg = Conv1dConfig {
            padding,
            dilation,
            ..Default::default()
        };
        let downsample = if in_channels != out_channels {
            Some(conv1d(
                in_channels,
                out_channels,
                1,
                Conv1dConfig::default(),
                vb.pp("downsample"),
            )?)
        } else {
            None
        };
        Ok(Self {
            conv1: conv1d(in_channels, out_channels, kernel_size, cfg, vb.pp("conv1"))?,
            conv2: conv1d(out_channels, out_channels, kernel_size, cfg, vb.pp("conv2"))?,
            downsample,
            padding,
            dropout: Dropout::new(dropout),
        })
    }

    fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let out = chomp(&self.conv1.forward(xs)?, self.padding)?.relu()?;
        let out = self.dropout.forward(&out, train)?;
        let out = chomp(&self.conv2.forward(&out)?, self.padding)?.relu()?;
        let out = self.dropout.forward(&out, train)?;
        let res = match &self.downsample {
            Some(downsample) => downsample.forward(xs)?,
            None => xs.clone(),
        };
        Ok((out + res)?.relu()?)
    }
}

/// TCN over the `[N, F, T]` channel layout; the representation is the last step.
pub struct TcnEncoder {
    feature_dim: usize,
    blocks: Vec<TemporalBlock>,
    fc_out: Linear,
    repr_dim: usize,
}

impl TcnEncoder {
    /// Builds one level per entry of `params.channels`, level `i` dilated by `2^i`.
    pub fn new(feature_dim: usize, params: &TcnParams, vb: VarBuilder) -> LayerResult<Self> {
        let repr_dim = params.channels.last().copied().ok_or_else(|| LayerError::ConfigError {
            message: "TCN needs at least one channel level".to_string(),
        })?;
        let mut blocks = Vec::with_capacity(params.channels.len());
        let mut in_channels = feature_dim;
        for (i, &out_channels) in params.channels.iter().enumerate() {
            blocks.push(TemporalBlock::new(
                in_channels,
                out_channels,
                params.kernel_size,
                1 << i,
                params.dropout,
                vb.pp(format!("network.{i}")),
            )?);
            in_channels = out_channels;
        }
        Ok(Self {
            feature_dim,
            blocks,
            fc_out: linear(repr_dim, 1, vb.pp("fc_out"))?,
            repr_dim,
        })
    }
}

impl Encoder for TcnEncoder {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let (n, flat) = xs.dims2()?;
        if flat % self.feature_dim != 0 {
            return Err(LayerError::InvalidInputDimension {
                expected: self.feature_dim,
                actual: flat,
            });
        }
        let mut out = xs.reshape((n, self.feature_dim, flat / self.feature_dim))?;
        for block in &self.blocks {
            out = block.forward(&out, train)?;
        }
        let steps = out.dim(2)?;
        Ok(out.narrow(2, steps - 1, 1)?.squeeze(2)?)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        Ok(self.fc_out.forward(reprs)?.squeeze(1)?)
    }

    fn repr_dim(&self) -> usize {
        self.repr_dim
    }

    fn name(&self) -> &str {
        "tcn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_tcn_keeps_length_and_uses_last_channels() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let params = TcnParams {
            channels: vec![4, 4, 3],
            kernel_size: 3,
            dropout: 0.0,
        };
        let enc = TcnEncoder::new(2, &params, vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (5, 2 * 12), &Device::Cpu).unwrap();
        let repr = enc.represent(&x, false).unwrap();
        assert_eq!(repr.dims(), &[5, 3]);
        assert_eq!(enc.forward(&x, false).unwrap().dims(), &[5]);
    }

    #[test]
    fn test_chomp() {
        let x = Tensor::arange(0f32, 6.0, &Device::Cpu)
            .unwrap()
            .reshape((1, 1, 6))
            .unwrap();
        let y = chomp(&x, 2).unwrap();
        assert_eq!(y.flatten_all().unwrap().to_vec1::<f32>().unwrap(), vec![0., 1., 2., 3.]);
    }
}
