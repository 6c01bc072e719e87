//! Configuration-driven encoder selection.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use longtail_core::{EncoderConfig, EncoderKind};
use tracing::debug;

use crate::alstm::AlstmEncoder;
use crate::error::{LayerError, LayerResult};
use crate::gat::GatEncoder;
use crate::gru::GruEncoder;
use crate::layer::Encoder;
use crate::tcn::TcnEncoder;
use crate::transformer::TransformerEncoder;

/// Every encoder variant behind one closed type.
pub enum EncoderModel {
    /// Recurrent encoder with temporal attention.
    Alstm(AlstmEncoder),
    /// Plain stacked GRU.
    Gru(GruEncoder),
    /// Temporal convolution network.
    Tcn(TcnEncoder),
    /// Localformer plus GRU.
    Transformer(TransformerEncoder),
    /// Recurrent encoder with cross-sample attention.
    Gat(GatEncoder),
}

impl EncoderModel {
    /// Builds the variant selected by `config` under `vb`.
    pub fn new(config: &EncoderConfig, vb: VarBuilder) -> LayerResult<Self> {
        config.validate().map_err(|e| LayerError::ConfigError {
            message: e.to_string(),
        })?;
        let EncoderConfig {
            feature_dim,
            hidden_size,
            num_layers,
            dropout,
            ..
        } = *config;
        let model = match &config.variant {
            EncoderKind::Alstm { rnn } => EncoderModel::Alstm(AlstmEncoder::new(
                *rnn,
                feature_dim,
                hidden_size,
                num_layers,
                dropout,
                vb,
            )?),
            EncoderKind::Gru => EncoderModel::Gru(GruEncoder::new(
                feature_dim,
                hidden_size,
                num_layers,
                dropout,
                vb,
            )?),
            EncoderKind::Tcn(params) => EncoderModel::Tcn(TcnEncoder::new(feature_dim, params, vb)?),
            EncoderKind::Transformer(params) => EncoderModel::Transformer(TransformerEncoder::new(
                feature_dim,
                hidden_size,
                num_layers,
                dropout,
                params,
                vb,
            )?),
            EncoderKind::Gat { rnn } => EncoderModel::Gat(GatEncoder::new(
                *rnn,
                feature_dim,
                hidden_size,
                num_layers,
                dropout,
                vb,
            )?),
        };
        debug!(
            encoder = model.name(),
            repr_dim = model.repr_dim(),
            "Built encoder"
        );
        Ok(model)
    }

    fn inner(&self) -> &dyn Encoder {
        match self {
            EncoderModel::Alstm(e) => e,
            EncoderModel::Gru(e) => e,
            EncoderModel::Tcn(e) => e,
            EncoderModel::Transformer(e) => e,
            EncoderModel::Gat(e) => e,
        }
    }
}

impl Encoder for EncoderModel {
    fn represent(&self, xs: &Tensor, train: bool) -> LayerResult<Tensor> {
        self.inner().represent(xs, train)
    }

    fn predict(&self, reprs: &Tensor) -> LayerResult<Tensor> {
        self.inner().predict(reprs)
    }

    fn repr_dim(&self) -> usize {
        self.inner().repr_dim()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}
