//! Device selection.

use candle_core::Device;
use longtail_core::DeviceSpec;
use tracing::{debug, info};

use crate::error::{TensorError, TensorResult};

/// Returns the best available device (GPU if compiled in, otherwise CPU).
///
/// On macOS with the `metal` feature this returns a Metal device, with the
/// `cuda` feature a CUDA device. Otherwise it falls back to CPU.
pub fn best_device() -> Device {
    #[cfg(feature = "metal")]
    {
        Device::new_metal(0).unwrap_or(Device::Cpu)
    }
    #[cfg(all(feature = "cuda", not(feature = "metal")))]
    {
        Device::new_cuda(0).unwrap_or(Device::Cpu)
    }
    #[cfg(not(any(feature = "metal", feature = "cuda")))]
    {
        Device::Cpu
    }
}

/// Opens the device named by `spec`.
///
/// Accelerator devices fail with [`TensorError::UnsupportedDevice`] when the
/// binary was built without the matching feature.
pub fn device_for(spec: DeviceSpec) -> TensorResult<Device> {
    let device = match spec {
        DeviceSpec::Cpu => Device::Cpu,
        DeviceSpec::Cuda(ordinal) => {
            Device::new_cuda(ordinal).map_err(|source| TensorError::UnsupportedDevice {
                spec: spec.to_string(),
                source,
            })?
        }
        DeviceSpec::Metal(ordinal) => {
            Device::new_metal(ordinal).map_err(|source| TensorError::UnsupportedDevice {
                spec: spec.to_string(),
                source,
            })?
        }
    };
    info!(device = %spec, "Using compute device");
    Ok(device)
}

/// Seeds the device generator used for parameter init and dropout masks.
///
/// candle's CPU backend draws from the thread RNG and cannot be seeded, so
/// this is a no-op there.
pub fn seed_device(device: &Device, seed: u64) -> TensorResult<()> {
    if device.is_cpu() {
        debug!(seed, "CPU generator is not seedable, skipping device seed");
        return Ok(());
    }
    device.set_seed(seed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_device() {
        let device = device_for(DeviceSpec::Cpu).unwrap();
        assert!(device.is_cpu());
        seed_device(&device, 42).unwrap();
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_error() {
        let err = device_for(DeviceSpec::Cuda(0)).unwrap_err();
        assert!(err.to_string().contains("cuda:0"));
    }
}
