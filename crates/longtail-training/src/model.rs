//! The trainable model: encoder plus the optional memory, hyper-predictor
//! and sample weighter, all registered in one `VarMap`.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use longtail_core::TrainerConfig;
use longtail_layers::{Encoder, EncoderModel, HyperPredictor, MemoryOutput, PrototypeMemory, SampleWeighter};
use tracing::info;

use crate::error::TrainingResult;

/// Variable prefix of the encoder.
pub const ENCODER: &str = "encoder";
/// Variable prefix of the prototype memory.
pub const MEMORY: &str = "memory";
/// Variable prefix of the hyper-predictor.
pub const PREDICTOR: &str = "predictor";
/// Variable prefix of the sample weighter.
pub const WEIGHTER: &str = "weighter";

/// Result of a forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// `[N, D]` encoder representations.
    pub reprs: Tensor,
    /// Memory enhancement, when the memory is active.
    pub memory: Option<MemoryOutput>,
    /// `[N]` predictions.
    pub pred: Tensor,
}

impl ModelOutput {
    /// Representations seen by the contrastive objectives: the enhanced
    /// `[N, 2D]` ones with memory, the raw ones otherwise.
    pub fn contrast_reprs(&self) -> &Tensor {
        match &self.memory {
            Some(memory) => &memory.enhanced,
            None => &self.reprs,
        }
    }
}

/// All trainable components of a run.
pub struct LongtailModel {
    varmap: VarMap,
    device: Device,
    encoder: EncoderModel,
    memory: Option<PrototypeMemory>,
    predictor: Option<HyperPredictor>,
    weighter: Option<SampleWeighter>,
}

impl LongtailModel {
    /// Builds the components enabled by `config` on `device`.
    pub fn new(config: &TrainerConfig, device: &Device) -> TrainingResult<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let encoder = EncoderModel::new(&config.encoder, vb.pp(ENCODER))?;
        let dim = encoder.repr_dim();

        let memory = match &config.memory {
            Some(memory) => Some(PrototypeMemory::new(memory.prototypes, dim, vb.pp(MEMORY))?),
            None => None,
        };
        let predictor = if config.uses_hyper_predictor() {
            Some(HyperPredictor::new(dim, vb.pp(PREDICTOR))?)
        } else {
            None
        };
        let needs_weighter = config
            .contrastive
            .as_ref()
            .is_some_and(|c| c.objective.needs_sample_weighter());
        let weighter = if needs_weighter {
            let width = if memory.is_some() { 2 * dim } else { dim };
            Some(SampleWeighter::new(width, vb.pp(WEIGHTER))?)
        } else {
            None
        };

        let model = Self {
            varmap,
            device: device.clone(),
            encoder,
            memory,
            predictor,
            weighter,
        };
        info!(
            encoder = model.encoder.name(),
            repr_dim = dim,
            components = ?model.components(),
            parameters = model.parameter_count(),
            "Model built"
        );
        Ok(model)
    }

    /// Variable store holding every component.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Device the parameters live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The encoder.
    pub fn encoder(&self) -> &EncoderModel {
        &self.encoder
    }

    /// The prototype memory, when active.
    pub fn memory(&self) -> Option<&PrototypeMemory> {
        self.memory.as_ref()
    }

    /// The sample weighter, when active.
    pub fn weighter(&self) -> Option<&SampleWeighter> {
        self.weighter.as_ref()
    }

    /// Names of the active components, used as file stems on disk.
    pub fn components(&self) -> Vec<&'static str> {
        let mut out = vec![ENCODER];
        if self.memory.is_some() {
            out.push(MEMORY);
        }
        if self.predictor.is_some() {
            out.push(PREDICTOR);
        }
        if self.weighter.is_some() {
            out.push(WEIGHTER);
        }
        out
    }

    /// Every trainable variable.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Runs encoder, memory and prediction head on `[N, F * T]` windows.
    pub fn forward(&self, xs: &Tensor, train: bool, want_attention: bool) -> TrainingResult<ModelOutput> {
        let reprs = self.encoder.represent(xs, train)?;
        let memory = match &self.memory {
            Some(memory) => Some(memory.memory_enhance(&reprs, want_attention)?),
            None => None,
        };
        let pred = match (&self.predictor, &memory) {
            (Some(predictor), Some(out)) => predictor.forward(&reprs, &out.enhanced)?,
            _ => self.encoder.predict(&reprs)?,
        };
        Ok(ModelOutput { reprs, memory, pred })
    }

    /// Inference-mode predictions, detached from the graph.
    pub fn predict(&self, xs: &Tensor) -> TrainingResult<Vec<f32>> {
        let out = self.forward(xs, false, false)?;
        Ok(out.pred.detach().to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use longtail_core::{
        ContrastiveConfig, ContrastiveKind, EncoderConfig, EncoderKind, MemoryConfig, MultiHorizonParams,
        PairWeight,
    };

    fn config() -> TrainerConfig {
        TrainerConfig::new(EncoderConfig::new(EncoderKind::Gru).with_hidden_size(4).with_feature_dim(2))
    }

    #[test]
    fn test_components_follow_config() {
        let model = LongtailModel::new(&config(), &Device::Cpu).unwrap();
        assert_eq!(model.components(), vec![ENCODER]);

        let full = config()
            .with_memory(MemoryConfig {
                prototypes: 3,
                hyper_predictor: true,
            })
            .with_contrastive(ContrastiveConfig::new(ContrastiveKind::MultiHorizon(MultiHorizonParams {
                pair_weight: PairWeight::XSim,
                ..MultiHorizonParams::default()
            })));
        let model = LongtailModel::new(&full, &Device::Cpu).unwrap();
        assert_eq!(model.components(), vec![ENCODER, MEMORY, PREDICTOR, WEIGHTER]);

        let xs = Tensor::randn(0f32, 1.0, (5, 6), &Device::Cpu).unwrap();
        let out = model.forward(&xs, true, true).unwrap();
        assert_eq!(out.pred.dims(), &[5]);
        assert_eq!(out.contrast_reprs().dims(), &[5, 8]);
        let weights = model.weighter().unwrap().forward(out.contrast_reprs()).unwrap();
        assert_eq!(weights.dims(), &[5, 5]);
    }

    #[test]
    fn test_predict_len() {
        let model = LongtailModel::new(&config(), &Device::Cpu).unwrap();
        let xs = Tensor::zeros((3, 6), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(model.predict(&xs).unwrap().len(), 3);
    }
}
