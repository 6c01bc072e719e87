//! Per-component safetensors files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use candle_nn::VarMap;
use tracing::info;

use crate::snapshot::ParameterSnapshot;
use crate::{CheckpointError, Result};

/// Path of `component`'s file inside `dir`.
pub fn component_file(dir: &Path, component: &str) -> PathBuf {
    dir.join(format!("{component}.safetensors"))
}

/// Writes `tensors` to a safetensors file at `path`. The parent directory
/// must already exist.
pub fn write_tensors(path: &Path, tensors: &HashMap<String, Tensor>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(CheckpointError::MissingDirectory(parent.to_path_buf()));
        }
    }
    candle_core::safetensors::save(tensors, path)?;
    info!(path = %path.display(), tensors = tensors.len(), "Tensors saved");
    Ok(())
}

/// Writes every component of `snapshot` to `<dir>/<component>.safetensors`.
pub fn save_components(snapshot: &ParameterSnapshot, dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CheckpointError::MissingDirectory(dir.to_path_buf()));
    }
    let mut written = Vec::new();
    for component in snapshot.components() {
        let path = component_file(dir, component);
        let tensors: HashMap<String, Tensor> = snapshot.component(component).into_iter().collect();
        write_tensors(&path, &tensors)?;
        written.push(path);
    }
    Ok(written)
}

/// Loads `<dir>/<component>.safetensors` into the matching variables of
/// `varmap`.
///
/// The file must hold exactly the component's variables with identical
/// shapes; nothing is written unless every tensor checks out.
pub fn load_component(dir: impl AsRef<Path>, component: &str, varmap: &VarMap) -> Result<()> {
    let path = component_file(dir.as_ref(), component);
    if !path.is_file() {
        return Err(CheckpointError::NotFound(path));
    }
    info!(path = %path.display(), component, "Loading component");

    let data = varmap.data().lock().map_err(|_| CheckpointError::Poisoned)?;
    let prefix = format!("{component}.");
    let device = match data.values().next() {
        Some(var) => var.device().clone(),
        None => candle_core::Device::Cpu,
    };
    let loaded = candle_core::safetensors::load(&path, &device)?;

    let mut updates = Vec::new();
    let members = data
        .iter()
        .filter_map(|(name, var)| name.strip_prefix(&prefix).map(|local| (name, local, var)));
    for (name, local, var) in members {
        let tensor = loaded.get(local).ok_or_else(|| CheckpointError::MissingTensor {
            path: path.clone(),
            name: local.to_string(),
        })?;
        if tensor.dims() != var.dims() {
            return Err(CheckpointError::ShapeMismatch {
                name: name.clone(),
                expected: var.dims().to_vec(),
                found: tensor.dims().to_vec(),
            });
        }
        updates.push((var, tensor.to_dtype(var.dtype())?));
    }
    if let Some(extra) = loaded
        .keys()
        .find(|local| !data.contains_key(&format!("{prefix}{local}")))
    {
        return Err(CheckpointError::UnexpectedTensor {
            path,
            name: extra.clone(),
        });
    }
    for (var, tensor) in updates {
        var.set(&tensor)?;
    }
    Ok(())
}
