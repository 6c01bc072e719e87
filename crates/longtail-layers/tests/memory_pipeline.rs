use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use longtail_core::{EncoderConfig, EncoderKind, RnnKind};
use longtail_layers::{Encoder, EncoderModel, HyperPredictor, PrototypeMemory, SampleWeighter};

#[test]
fn gradients_reach_every_component_through_memory_and_hyper_head() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let config = EncoderConfig::new(EncoderKind::Alstm { rnn: RnnKind::Gru })
        .with_feature_dim(2)
        .with_hidden_size(4)
        .with_num_layers(1)
        .with_dropout(0.0);
    let encoder = EncoderModel::new(&config, vb.pp("encoder")).unwrap();
    let dim = encoder.repr_dim();
    let memory = PrototypeMemory::new(3, dim, vb.pp("memory")).unwrap();
    let head = HyperPredictor::new(dim, vb.pp("predictor")).unwrap();
    let weighter = SampleWeighter::new(2 * dim, vb.pp("weighter")).unwrap();

    let x = Tensor::randn(0f32, 1.0, (5, 2 * 6), &device).unwrap();
    let repr = encoder.represent(&x, true).unwrap();
    let out = memory.memory_enhance(&repr, false).unwrap();
    let pred = head.forward(&repr, &out.enhanced).unwrap();
    let pair = weighter.forward(&out.enhanced).unwrap();
    assert_eq!(pair.dims(), &[5, 5]);

    let loss = (pred.sqr().unwrap().mean_all().unwrap() + out.loss).unwrap();
    let loss = (loss + pair.mean_all().unwrap()).unwrap();
    let grads = loss.backward().unwrap();

    let data = varmap.data().lock().unwrap();
    for name in [
        "encoder.fc_in.weight",
        "memory.prototypes",
        "predictor.hyper_w.weight",
        "weighter.left",
    ] {
        let var = data.get(name).unwrap_or_else(|| panic!("missing {name}"));
        assert!(grads.get(var.as_tensor()).is_some(), "no gradient for {name}");
    }
}

#[test]
fn enhancement_keeps_representation_in_second_half() {
    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let memory = PrototypeMemory::new(4, 3, vb).unwrap();
    let repr = Tensor::randn(0f32, 1.0, (6, 3), &device).unwrap();
    let out = memory.memory_enhance(&repr, false).unwrap();
    let tail = out.enhanced.narrow(1, 3, 3).unwrap();
    assert_eq!(tail.to_vec2::<f32>().unwrap(), repr.to_vec2::<f32>().unwrap());
}
