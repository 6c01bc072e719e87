//! Candle device selection and tensor helpers for longtail.
//!
//! The harness computes on [`candle_core::Tensor`] directly; this crate only
//! adds device plumbing and the few pairwise operations that both the layers
//! and the contrastive losses need.
//!
//! # Example
//!
//! ```
//! use longtail_tensor::{ops, Device};
//!
//! let device = Device::Cpu;
//! let reprs = ops::matrix(&[1.0, 0.0, 0.0, 1.0], 2, 2, &device).unwrap();
//! let sim = ops::pairwise_cosine(&reprs, &reprs).unwrap();
//! assert_eq!(sim.dims(), &[2, 2]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod device;
pub mod error;
pub mod mask;
pub mod ops;

pub use candle_core::{DType, Device, Tensor};
pub use device::{best_device, device_for, seed_device};
pub use error::{TensorError, TensorResult};
pub use mask::PairMask;
