//! Encoder trait definition.
//!
//! Every sequence encoder shares one two-stage contract: a batch of flattened
//! windows is mapped to fixed-width representations, and a linear head maps
//! each representation to a scalar prediction. Losses and the prototype
//! memory operate on the intermediate representation, so the two stages are
//! exposed separately.

use candle_core::Tensor;

use crate::error::{LayerError, LayerResult};

/// A sequence encoder with a separate representation stage.
///
/// # Example
///
/// ```
/// use candle_core::{DType, Device, Tensor};
/// use candle_nn::{VarBuilder, VarMap};
/// use longtail_core::{EncoderConfig, EncoderKind};
/// use longtail_layers::{Encoder, EncoderModel};
///
/// let varmap = VarMap::new();
/// let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
/// let config = EncoderConfig::new(EncoderKind::Gru).with_hidden_size(8);
/// let encoder = EncoderModel::new(&config, vb.pp("encoder")).unwrap();
///
/// // 4 samples, 6 features x 5 timesteps flattened feature-major
/// let x = Tensor::zeros((4, 30), DType::F32, &Device::Cpu).unwrap();
/// let repr = encoder.represent(&x, false).unwrap();
/// assert_eq!(repr.dims(), &[4, 8]);
/// assert_eq!(encoder.predict(&repr).unwrap().dims(), &[4]);
/// ```
pub trait Encoder {
    /// Maps `[N, F * T]` flattened windows to `[N, repr_dim]` representations.
    ///
    /// Dropout is active only when `train` is set.
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor>;

    /// Maps `[N, repr_dim]` representations to `[N]` predictions.
    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor>;

    /// `predict(represent(xs))`.
    fn forward(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        let reprs = self.represent(xs, train)?;
        self.predict(&reprs)
    }

    /// Width of the representation produced by [`Encoder::represent`].
    fn repr_dim(&self) -> usize;

    /// Returns the name of the encoder for logging purposes.
    fn name(&self) -> &str {
        "Encoder"
    }
}

/// Reshapes feature-major flattened windows `[N, F * T]` into `[N, T, F]`.
pub fn to_sequence(xs: &Tensor, feature_dim: usize) -> LayerResult<Tensor> {
    let (n, flat) = xs.dims2()?;
    if feature_dim == 0 || flat % feature_dim != 0 {
        return Err(LayerError::InvalidInputDimension {
            expected: feature_dim,
            actual: flat,
        });
    }
    let steps = flat / feature_dim;
    if steps == 0 {
        return Err(LayerError::ConfigError {
            message: format!("window has no timesteps: {flat} features per row"),
        });
    }
    Ok(xs
        .reshape((n, feature_dim, steps))?
        .transpose(1, 2)?
        .contiguous()?)
}

/// Selects the last timestep of a `[N, T, H]` sequence as `[N, H]`.
pub fn last_step(seq: &Tensor) -> LayerResult<Tensor> {
    let steps = seq.dim(1)?;
    if steps == 0 {
        return Err(LayerError::ShapeMismatch {
            expected: vec![seq.dim(0)?, 1, seq.dim(2)?],
            actual: seq.dims().to_vec(),
        });
    }
    Ok(seq.narrow(1, steps - 1, 1)?.squeeze(1)?)
}

/// `max(x, 0.01 * x)`.
pub fn leaky_relu(xs: &Tensor) -> LayerResult<Tensor> {
    let pos = xs.relu()?;
    let neg = xs.neg()?.relu()?.affine(-0.01, 0.0)?;
    Ok((pos + neg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_to_sequence_is_feature_major() {
        // two features, three steps: [f0t0 f0t1 f0t2 f1t0 f1t1 f1t2]
        let x = Tensor::from_slice(&[0f32, 1., 2., 10., 11., 12.], (1, 6), &Device::Cpu).unwrap();
        let seq = to_sequence(&x, 2).unwrap();
        assert_eq!(seq.dims(), &[1, 3, 2]);
        let rows = seq.squeeze(0).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(rows, vec![vec![0., 10.], vec![1., 11.], vec![2., 12.]]);
        assert_eq!(
            last_step(&seq).unwrap().to_vec2::<f32>().unwrap(),
            vec![vec![2., 12.]]
        );
    }

    #[test]
    fn test_to_sequence_rejects_ragged_width() {
        let x = Tensor::zeros((2, 7), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            to_sequence(&x, 2),
            Err(LayerError::InvalidInputDimension { expected: 2, actual: 7 })
        ));
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let x = Tensor::zeros((3, 0), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(to_sequence(&x, 2), Err(LayerError::ConfigError { .. })));
        let seq = Tensor::zeros((3, 0, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(last_step(&seq), Err(LayerError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_leaky_relu() {
        let x = Tensor::from_slice(&[-2f32, 0., 3.], 3, &Device::Cpu).unwrap();
        let y = leaky_relu(&x).unwrap().to_vec1::<f32>().unwrap();
        assert!((y[0] + 0.02).abs() < 1e-6);
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 3.0);
    }
}
