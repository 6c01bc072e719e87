//! Objectives for long-tailed return prediction.
//!
//! This crate provides:
//!
//! - **Regression**: [`masked_mse`] over rows with a finite label
//! - **Label relations**: positive, negative and same-class masks in [`mask`]
//! - **Supervised contrast**: [`supervised_contrast`] and the variants built
//!   on it ([`multi_criterion_contrast`], [`classic_contrast`],
//!   [`all_pairs_contrast`], [`feature_sim_contrast`], [`sampled_contrast`])
//! - **Ranking objectives**: [`horizon_ranking_loss`] and [`rank_n_contrast`]
//! - **Cross-entropy objectives**: [`self_augmented_contrast`] and
//!   [`prototypical_contrast`]
//! - **Neighbor sampling**: [`SortedPool`] and [`sample_positive`]
//!
//! Masks are built on the host from labels and uploaded as 0/1 tensors;
//! gradients only flow through representations and pair weights.
//!
//! # Example
//!
//! ```
//! use candle_core::{Device, Tensor};
//! use longtail_losses::{supervised_contrast, ContrastSettings, PairInputs};
//!
//! let reprs = Tensor::randn(0f32, 1.0, (4, 8), &Device::Cpu).unwrap();
//! let y = [0.1, 0.12, -0.3, 0.5];
//! let settings = ContrastSettings::new(0.1, 0.2);
//! let out = supervised_contrast(&reprs, &reprs, &y, &y, &settings, PairInputs::default()).unwrap();
//! assert_eq!(out.positive_num, 6);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod baseline;
pub mod error;
pub mod mask;
pub mod rank;
pub mod ranking;
pub mod regression;
pub mod sampling;
pub mod supcon;

pub use baseline::{
    all_pairs_contrast, all_pairs_settings, classic_contrast, feature_sim_contrast,
    imbalanced_boundaries, prototypical_contrast, self_augmented_contrast, uniform_boundaries,
};
pub use error::{LossError, LossResult};
pub use mask::{
    multi_horizon_proximity, proximity, rule_weights, same_class, sampling_positive, separation,
    top_similarity_prior, HORIZON_WEIGHTS,
};
pub use rank::rank_n_contrast;
pub use ranking::{cal_con_loss, horizon_ranking_loss, label_similarity};
pub use regression::{masked_mse, masked_mse_host};
pub use sampling::{sample_positive, sampled_contrast, SampledPool, SortedPool};
pub use supcon::{
    contrast_from_logits, multi_criterion_contrast, supervised_contrast, ContrastMasks,
    ContrastOutput, ContrastSettings, LogitKind, PairInputs, CRITERION_THRESHOLDS,
};
