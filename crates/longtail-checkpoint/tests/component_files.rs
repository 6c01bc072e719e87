use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use longtail_checkpoint::{component_file, load_component, CheckpointError, ParameterSnapshot};
use tempfile::tempdir;

fn build(width: usize, fill: f64) -> VarMap {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    vb.pp("encoder")
        .pp("fc_out")
        .get_with_hints((1, width), "weight", Init::Const(fill))
        .unwrap();
    vb.pp("encoder")
        .pp("fc_out")
        .get_with_hints(1, "bias", Init::Const(fill))
        .unwrap();
    vb.pp("memory")
        .get_with_hints((3, width), "prototypes", Init::Const(fill))
        .unwrap();
    varmap
}

fn total(varmap: &VarMap, name: &str) -> f32 {
    let data = varmap.data().lock().unwrap();
    data.get(name)
        .unwrap()
        .as_tensor()
        .sum_all()
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

#[test]
fn save_then_load_into_fresh_model() {
    let dir = tempdir().unwrap();
    let trained = build(4, 0.5);
    let written = ParameterSnapshot::capture(&trained)
        .unwrap()
        .save_components(dir.path())
        .unwrap();
    assert_eq!(written.len(), 2);
    assert!(component_file(dir.path(), "encoder").is_file());
    assert!(component_file(dir.path(), "memory").is_file());

    let fresh = build(4, 0.0);
    load_component(dir.path(), "encoder", &fresh).unwrap();
    assert_eq!(total(&fresh, "encoder.fc_out.weight"), 2.0);
    assert_eq!(total(&fresh, "memory.prototypes"), 0.0);
    load_component(dir.path(), "memory", &fresh).unwrap();
    assert_eq!(total(&fresh, "memory.prototypes"), 6.0);
}

#[test]
fn shape_mismatch_is_rejected_without_partial_writes() {
    let dir = tempdir().unwrap();
    ParameterSnapshot::capture(&build(4, 1.0))
        .unwrap()
        .save_components(dir.path())
        .unwrap();

    let other = build(5, 0.0);
    let err = load_component(dir.path(), "encoder", &other).unwrap_err();
    assert!(matches!(err, CheckpointError::ShapeMismatch { .. }));
    assert_eq!(total(&other, "encoder.fc_out.bias"), 0.0);
}

#[test]
fn missing_files_and_directories_are_errors() {
    let dir = tempdir().unwrap();
    let varmap = build(2, 0.0);
    assert!(matches!(
        load_component(dir.path(), "encoder", &varmap),
        Err(CheckpointError::NotFound(_))
    ));

    let snapshot = ParameterSnapshot::capture(&varmap).unwrap();
    let missing = dir.path().join("does-not-exist");
    assert!(matches!(
        snapshot.save_components(&missing),
        Err(CheckpointError::MissingDirectory(_))
    ));
    assert!(!missing.exists());
}

#[test]
fn extra_tensors_in_file_are_rejected() {
    let dir = tempdir().unwrap();
    let mut tensors = std::collections::HashMap::new();
    tensors.insert("prototypes".to_string(), Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap());
    tensors.insert("stale".to_string(), Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap());
    longtail_checkpoint::write_tensors(&component_file(dir.path(), "memory"), &tensors).unwrap();

    let err = load_component(dir.path(), "memory", &build(2, 0.0)).unwrap_err();
    assert!(matches!(err, CheckpointError::UnexpectedTensor { .. }));
}
