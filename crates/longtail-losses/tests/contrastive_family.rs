use candle_core::{Device, Tensor, Var};
use longtail_core::{PairWeight, SimilarityMetric};
use longtail_losses::{
    horizon_ranking_loss, multi_horizon_proximity, rank_n_contrast, sample_positive,
    sampled_contrast, supervised_contrast, ContrastSettings, PairInputs, SortedPool,
};
use longtail_tensor::PairMask;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn labels(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i * 37) % 17) as f32 * 0.05 - 0.4).collect()
}

#[test]
fn external_pair_weights_receive_gradients() {
    let device = Device::Cpu;
    let y = labels(6);
    let reprs = Var::randn(0f32, 1.0, (6, 4), &device).unwrap();
    let weights = Var::rand(0.5f32, 1.5, (6, 6), &device).unwrap();
    let settings = ContrastSettings::new(0.1, 0.2).with_pair_weight(PairWeight::XSim);
    let out = supervised_contrast(
        reprs.as_tensor(),
        reprs.as_tensor(),
        &y,
        &y,
        &settings,
        PairInputs {
            weights: Some(weights.as_tensor()),
            ..PairInputs::default()
        },
    )
    .unwrap();
    assert!(out.positive_num > 6, "labels must produce off-diagonal positives");

    let grads = out.loss.backward().unwrap();
    let grad = grads.get(weights.as_tensor()).expect("weights gradient");
    let total: f32 = grad.abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
    assert!(total > 0.0);
    assert!(grads.get(reprs.as_tensor()).is_some());
}

#[test]
fn prior_mask_only_removes_positives() {
    let y = labels(8);
    let reprs = Tensor::randn(0f32, 1.0, (8, 3), &Device::Cpu).unwrap();
    let settings = ContrastSettings::new(0.1, 0.2);
    let plain = supervised_contrast(&reprs, &reprs, &y, &y, &settings, PairInputs::default()).unwrap();
    let prior = PairMask::from_fn(8, 8, |i, j| (i + j) % 2 == 0);
    let filtered = supervised_contrast(
        &reprs,
        &reprs,
        &y,
        &y,
        &settings,
        PairInputs {
            prior: Some(&prior),
            ..PairInputs::default()
        },
    )
    .unwrap();
    assert!(filtered.positive_num <= plain.positive_num);
    assert_eq!(filtered.negative_num, plain.negative_num);
}

#[test]
fn multi_horizon_positives_feed_the_common_loss() {
    let n = 5;
    let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![0.02 * i as f32; 11]).collect();
    let primary: Vec<f32> = rows.iter().map(|r| r[7]).collect();
    let positives = multi_horizon_proximity(&rows, &primary).unwrap();
    let reprs = Tensor::randn(0f32, 1.0, (n, 3), &Device::Cpu).unwrap();
    let out = supervised_contrast(
        &reprs,
        &reprs,
        &primary,
        &primary,
        &ContrastSettings::new(0.1, 0.2),
        PairInputs {
            positives: Some(&positives),
            ..PairInputs::default()
        },
    )
    .unwrap();
    assert!(out.loss.to_scalar::<f32>().unwrap().is_finite());
}

#[test]
fn sampled_pool_contrast_end_to_end() {
    let device = Device::Cpu;
    let train_y = labels(50);
    let train_x: Vec<f32> = train_y.iter().flat_map(|y| [*y, -y, 0.5 * y]).collect();
    let pool = SortedPool::new(&train_x, &train_y, 3).unwrap();

    let rows = [0usize, 7, 13, 21];
    let batch_y: Vec<f32> = rows.iter().map(|r| train_y[*r]).collect();
    let batch_x: Vec<f32> = rows
        .iter()
        .flat_map(|r| train_x[r * 3..(r + 1) * 3].to_vec())
        .collect();
    let ranks: Vec<usize> = rows.iter().map(|r| pool.rank(*r)).collect();

    let mut rng = StdRng::seed_from_u64(42);
    let sampled = sample_positive(&batch_x, &batch_y, &pool, &ranks, Some(6), &mut rng).unwrap();
    let m = sampled.len();
    assert_eq!(m, rows.len() + sampled.sampled.len());

    let batch = Tensor::from_slice(&batch_x, (rows.len(), 3), &device).unwrap();
    let full = Tensor::from_slice(&sampled.features, (m, 3), &device).unwrap();
    let out = sampled_contrast(
        &batch,
        &full,
        &batch_y,
        &sampled.labels,
        &ContrastSettings::new(0.1, 0.2),
        None,
        None,
    )
    .unwrap();
    assert!(out.loss.to_scalar::<f32>().unwrap().is_finite());
}

#[test]
fn ranking_objectives_are_differentiable() {
    let device = Device::Cpu;
    let reprs = Var::randn(0f32, 1.0, (6, 4), &device).unwrap();
    let rows: Vec<Vec<f32>> = (0..6)
        .map(|i| (0..11).map(|h| ((i * 5 + h * 3) % 7) as f32 * 0.1 - 0.3).collect())
        .collect();
    let y: Vec<f32> = rows.iter().map(|r| r[7]).collect();

    let ranking = horizon_ranking_loss(reprs.as_tensor(), &rows, 0.1, SimilarityMetric::Ic).unwrap();
    let rank_n = rank_n_contrast(reprs.as_tensor(), &y, 2.0).unwrap();
    let total = (ranking + rank_n).unwrap();
    let grads = total.backward().unwrap();
    let grad = grads.get(reprs.as_tensor()).unwrap();
    let values = grad.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(values.iter().all(|v| v.is_finite()));
}
