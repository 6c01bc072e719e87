//! Adam optimizer.
//!
//! Adam maintains exponential moving averages of the gradients (first
//! moment) and squared gradients (second moment):
//!
//! ```text
//! m = beta1 * m + (1 - beta1) * gradient
//! v = beta2 * v + (1 - beta2) * gradient^2
//! m_hat = m / (1 - beta1^t)
//! v_hat = v / (1 - beta2^t)
//! var = var - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
//! ```
//!
//! The moments live in candle's AdamW with a zero weight decay.

use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::optim::{AdamW, Optimizer as _, ParamsAdamW};

use crate::{Optimizer, OptimizerConfig, OptimizerError, OptimizerResult};

/// Adam optimizer with adaptive learning rates and momentum.
pub struct Adam {
    inner: AdamW,
    config: OptimizerConfig,
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig, vars: Vec<Var>) -> OptimizerResult<Self> {
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let params = ParamsAdamW {
                    lr: learning_rate,
                    beta1,
                    beta2,
                    eps: epsilon,
                    weight_decay: 0.0,
                };
                Ok(Self {
                    inner: AdamW::new(vars, params)?,
                    config,
                })
            }
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn step(&mut self, grads: &GradStore) -> OptimizerResult<()> {
        self.inner.step(grads)?;
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
    use longtail_core::OptimizerKind;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let w = Var::new(&[1.0f32, -3.0], &Device::Cpu).unwrap();
        let config = OptimizerConfig::from_kind(OptimizerKind::Adam, 0.01);
        let mut adam = Adam::new(config, vec![w.clone()]).unwrap();
        let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        Optimizer::step(&mut adam, &grads).unwrap();
        let updated = w.to_vec1::<f32>().unwrap();
        assert!((updated[0] - 0.99).abs() < 1e-5);
        assert!((updated[1] + 2.99).abs() < 1e-5);
    }

    #[test]
    fn test_config_mismatch() {
        let err = Adam::new(OptimizerConfig::Sgd { learning_rate: 0.1 }, vec![]).err().unwrap();
        assert!(matches!(err, OptimizerError::ConfigMismatch { .. }));
    }
}
