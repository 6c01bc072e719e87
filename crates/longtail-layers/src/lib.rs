//! Neural network components for the longtail training harness.
//!
//! This crate provides the learned modules that sit between the data and the
//! losses:
//!
//! - **Encoders**: [`AlstmEncoder`], [`GruEncoder`], [`TcnEncoder`],
//!   [`TransformerEncoder`] and [`GatEncoder`], unified by [`EncoderModel`]
//!   and the [`Encoder`] trait
//! - **Prototype memory**: [`PrototypeMemory`] and its [`MemoryOutput`]
//! - **Auxiliary heads**: [`HyperPredictor`] and [`SampleWeighter`]
//!
//! All modules are built from a candle [`candle_nn::VarBuilder`], so their
//! parameters live in the caller's `VarMap` under the prefix the caller picks.
//!
//! # Example
//!
//! ```
//! use candle_core::{DType, Device, Tensor};
//! use candle_nn::{VarBuilder, VarMap};
//! use longtail_core::{EncoderConfig, EncoderKind};
//! use longtail_layers::{Encoder, EncoderModel, PrototypeMemory};
//!
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//! let config = EncoderConfig::new(EncoderKind::from_name("alstm").unwrap()).with_hidden_size(4);
//! let encoder = EncoderModel::new(&config, vb.pp("encoder")).unwrap();
//! let memory = PrototypeMemory::new(8, encoder.repr_dim(), vb.pp("memory")).unwrap();
//!
//! let x = Tensor::randn(0f32, 1.0, (3, 6 * 5), &Device::Cpu).unwrap();
//! let repr = encoder.represent(&x, false).unwrap();
//! let out = memory.memory_enhance(&repr, false).unwrap();
//! assert_eq!(out.enhanced.dims(), &[3, 16]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod alstm;
pub mod encoder;
pub mod error;
pub mod gat;
pub mod gru;
pub mod hyper;
pub mod initializer;
pub mod layer;
pub mod memory;
pub mod recurrent;
pub mod tcn;
pub mod transformer;
pub mod weighter;

pub use alstm::{AlstmEncoder, TemporalAttention};
pub use encoder::EncoderModel;
pub use error::{LayerError, LayerResult};
pub use gat::GatEncoder;
pub use gru::GruEncoder;
pub use hyper::HyperPredictor;
pub use initializer::{Initializer, RELU_GAIN};
pub use layer::Encoder;
pub use memory::{MemoryOutput, PrototypeMemory};
pub use recurrent::StackedRnn;
pub use tcn::TcnEncoder;
pub use transformer::{PositionalEncoding, TransformerEncoder};
pub use weighter::SampleWeighter;
