//! Optimizers for the longtail training loop.
//!
//! Both optimizers update candle [`Var`]s in place from a [`GradStore`]:
//!
//! - [`Sgd`] - plain gradient descent (`gd`)
//! - [`Adam`] - Adam without weight decay (`adam`)
//!
//! Gradients are clipped elementwise with [`clip_grad_value`] before a step.
//!
//! # Example
//!
//! ```
//! use candle_core::{Device, Var};
//! use longtail_optimizer::{create_optimizer, OptimizerConfig};
//!
//! let w = Var::new(&[1.0f32, -2.0], &Device::Cpu).unwrap();
//! let config = OptimizerConfig::Sgd { learning_rate: 0.1 };
//! let mut optimizer = create_optimizer(config, vec![w.clone()]).unwrap();
//!
//! let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
//! let grads = loss.backward().unwrap();
//! optimizer.step(&grads).unwrap();
//! let w = w.to_vec1::<f32>().unwrap();
//! assert!((w[0] - 0.8).abs() < 1e-6 && (w[1] + 1.6).abs() < 1e-6);
//! ```

use candle_core::backprop::GradStore;
use candle_core::Var;
use longtail_core::OptimizerKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

mod adam;
mod clip;
mod sgd;

pub use adam::Adam;
pub use clip::clip_grad_value;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer being built.
        expected: String,
        /// Configuration variant supplied.
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error raised by the candle backend.
    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Configuration for the supported optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic gradient descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f64,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f64,
        /// Exponential decay rate for first moment estimates.
        beta1: f64,
        /// Exponential decay rate for second moment estimates.
        beta2: f64,
        /// Small constant for numerical stability.
        epsilon: f64,
    },
}

impl OptimizerConfig {
    /// Configuration for `kind` at `learning_rate`, with Adam's usual moments.
    pub fn from_kind(kind: OptimizerKind, learning_rate: f64) -> Self {
        match kind {
            OptimizerKind::Gd => Self::Sgd { learning_rate },
            OptimizerKind::Adam => Self::Adam {
                learning_rate,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    fn check(&self) -> OptimizerResult<()> {
        let lr = self.learning_rate();
        if lr.is_finite() && lr > 0.0 {
            Ok(())
        } else {
            Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {lr}"
            )))
        }
    }
}

/// Trait for optimizers over candle variables.
pub trait Optimizer: Sized {
    /// Creates an optimizer updating `vars`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig, vars: Vec<Var>) -> OptimizerResult<Self>;

    /// Applies one update from `grads`. Variables without a gradient are left
    /// untouched.
    fn step(&mut self, grads: &GradStore) -> OptimizerResult<()>;

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

/// Object-safe view of [`Optimizer`].
pub trait OptimizerDyn {
    /// See [`Optimizer::step`].
    fn step(&mut self, grads: &GradStore) -> OptimizerResult<()>;

    /// See [`Optimizer::config`].
    fn config(&self) -> &OptimizerConfig;
}

impl<T: Optimizer> OptimizerDyn for T {
    fn step(&mut self, grads: &GradStore) -> OptimizerResult<()> {
        Optimizer::step(self, grads)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }
}

/// Creates the optimizer matching `config` over `vars`.
pub fn create_optimizer(config: OptimizerConfig, vars: Vec<Var>) -> OptimizerResult<Box<dyn OptimizerDyn>> {
    config.check()?;
    info!(
        optimizer = config.name(),
        learning_rate = config.learning_rate(),
        variables = vars.len(),
        "Optimizer created"
    );
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config, vars)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config, vars)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind() {
        assert_eq!(
            OptimizerConfig::from_kind(OptimizerKind::Gd, 0.5),
            OptimizerConfig::Sgd { learning_rate: 0.5 }
        );
        let adam = OptimizerConfig::from_kind(OptimizerKind::Adam, 1e-3);
        assert_eq!(adam.name(), "Adam");
        assert_eq!(adam.learning_rate(), 1e-3);
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        let err = create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.0 }, vec![]).err();
        assert!(matches!(err, Some(OptimizerError::InvalidParameter(_))));
    }

    #[test]
    fn test_step_under_debug_logging() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let w = Var::new(&[4.0f32], &candle_core::Device::Cpu).unwrap();
            let mut optimizer =
                create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.5 }, vec![w.clone()]).unwrap();
            let mut grads = w.as_tensor().sqr().unwrap().sum_all().unwrap().backward().unwrap();
            assert_eq!(clip_grad_value(&mut grads, &[w.clone()], 1.0).unwrap(), 1);
            optimizer.step(&grads).unwrap();
            assert_eq!(w.to_vec1::<f32>().unwrap(), vec![3.5]);
        });
    }
}
