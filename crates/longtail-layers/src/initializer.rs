//! Weight initialization schemes expressed as candle [`Init`] hints.

use candle_nn::Init;
use serde::{Deserialize, Serialize};

/// Gain recommended for relu activations.
pub const RELU_GAIN: f64 = std::f64::consts::SQRT_2;

/// Initialization scheme for a learned tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier normal with the given gain.
    XavierNormal {
        /// Multiplier on the Glorot standard deviation.
        gain: f64,
    },
    /// Unit normal.
    #[default]
    StandardNormal,
    /// All zeros.
    Zeros,
}

impl Initializer {
    /// Xavier normal with relu gain, the scheme used for prototypes and
    /// pairwise weighting vectors.
    pub fn xavier_relu() -> Self {
        Self::XavierNormal { gain: RELU_GAIN }
    }

    /// Resolves the scheme for a tensor of `shape`.
    pub fn to_init(&self, shape: &[usize]) -> Init {
        match self {
            Initializer::XavierNormal { gain } => {
                let (fan_in, fan_out) = fan_in_out(shape);
                Init::Randn {
                    mean: 0.0,
                    stdev: gain * (2.0 / (fan_in + fan_out) as f64).sqrt(),
                }
            }
            Initializer::StandardNormal => Init::Randn {
                mean: 0.0,
                stdev: 1.0,
            },
            Initializer::Zeros => Init::Const(0.0),
        }
    }
}

/// Fans of a row-major weight: `[out, in, receptive...]`.
fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [dim] => ((*dim).max(1), (*dim).max(1)),
        [rows, cols, rest @ ..] => {
            let receptive: usize = rest.iter().product();
            ((cols * receptive).max(1), (rows * receptive).max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xavier_relu_std() {
        match Initializer::xavier_relu().to_init(&[256, 128]) {
            Init::Randn { mean, stdev } => {
                assert_eq!(mean, 0.0);
                let expected = 2f64.sqrt() * (2.0 / 384.0f64).sqrt();
                assert!((stdev - expected).abs() < 1e-12);
            }
            other => panic!("unexpected init {other:?}"),
        }
    }

    #[test]
    fn test_fans_include_receptive_field() {
        assert_eq!(fan_in_out(&[8, 4, 3]), (12, 24));
        assert_eq!(fan_in_out(&[5]), (5, 5));
    }
}
