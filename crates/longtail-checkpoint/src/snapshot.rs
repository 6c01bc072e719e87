//! Deep in-memory parameter snapshots.

use std::collections::BTreeMap;
use std::path::Path;

use candle_core::Tensor;
use candle_nn::VarMap;

use crate::{CheckpointError, Result};

/// First segment of a variable name.
pub fn component_of(name: &str) -> &str {
    name.split_once('.').map_or(name, |(component, _)| component)
}

/// A copy of every variable in a `VarMap`, detached from the live model.
#[derive(Debug, Clone, Default)]
pub struct ParameterSnapshot {
    tensors: BTreeMap<String, Tensor>,
}

impl ParameterSnapshot {
    /// Copies all variables of `varmap` under one lock.
    pub fn capture(varmap: &VarMap) -> Result<Self> {
        let data = varmap.data().lock().map_err(|_| CheckpointError::Poisoned)?;
        let mut tensors = BTreeMap::new();
        for (name, var) in data.iter() {
            tensors.insert(name.clone(), var.as_tensor().detach().copy()?);
        }
        Ok(Self { tensors })
    }

    /// Writes the snapshot back into `varmap`. Every snapshot tensor must
    /// match a variable of the same shape.
    pub fn restore(&self, varmap: &VarMap) -> Result<()> {
        let data = varmap.data().lock().map_err(|_| CheckpointError::Poisoned)?;
        for (name, tensor) in &self.tensors {
            let var = data.get(name).ok_or_else(|| CheckpointError::UnexpectedTensor {
                path: "<snapshot>".into(),
                name: name.clone(),
            })?;
            if var.dims() != tensor.dims() {
                return Err(CheckpointError::ShapeMismatch {
                    name: name.clone(),
                    expected: var.dims().to_vec(),
                    found: tensor.dims().to_vec(),
                });
            }
            var.set(tensor)?;
        }
        Ok(())
    }

    /// Number of tensors held.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the snapshot holds no tensor.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Tensor stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Distinct components, in name order.
    pub fn components(&self) -> Vec<&str> {
        let mut components: Vec<&str> = self.tensors.keys().map(|n| component_of(n)).collect();
        components.dedup();
        components
    }

    /// Tensors of `component`, keyed by their name inside the component.
    pub fn component(&self, component: &str) -> BTreeMap<String, Tensor> {
        self.tensors
            .iter()
            .filter(|(name, _)| component_of(name) == component)
            .map(|(name, t)| {
                let local = name
                    .strip_prefix(component)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .unwrap_or(name);
                (local.to_string(), t.clone())
            })
            .collect()
    }

    /// Persists each component to `<dir>/<component>.safetensors`.
    pub fn save_components(&self, dir: impl AsRef<Path>) -> Result<Vec<std::path::PathBuf>> {
        crate::persistence::save_components(self, dir.as_ref())
    }
}
