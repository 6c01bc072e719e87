//! Stochastic gradient descent.

use candle_core::backprop::GradStore;
use candle_core::Var;

use crate::{Optimizer, OptimizerConfig, OptimizerError, OptimizerResult};

/// Stochastic gradient descent optimizer.
///
/// Updates each variable using `var = var - learning_rate * gradient`.
pub struct Sgd {
    vars: Vec<Var>,
    learning_rate: f64,
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates an optimizer over `vars` with the given learning rate.
    pub fn with_learning_rate(learning_rate: f64, vars: Vec<Var>) -> Self {
        Self {
            vars,
            learning_rate,
            config: OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig, vars: Vec<Var>) -> OptimizerResult<Self> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self::with_learning_rate(learning_rate, vars)),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn step(&mut self, grads: &GradStore) -> OptimizerResult<()> {
        for var in &self.vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                var.set(&var.sub(&grad.affine(self.learning_rate, 0.0)?)?)?;
            }
        }
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_sgd_update() {
        let w = Var::new(&[1.0f32, 2.0, 3.0], &Device::Cpu).unwrap();
        let mut sgd = Sgd::with_learning_rate(0.5, vec![w.clone()]);
        let loss = w.as_tensor().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        sgd.step(&grads).unwrap();
        assert_eq!(w.to_vec1::<f32>().unwrap(), vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_config_mismatch() {
        let config = OptimizerConfig::from_kind(longtail_core::OptimizerKind::Adam, 0.1);
        let err = Sgd::new(config, vec![]).err().unwrap();
        assert!(err.to_string().contains("expected Sgd, got Adam"));
    }
}
