//! Prototype memory.
//!
//! A bank of `K` learned prototype vectors. Each representation attends over
//! the bank; the soft summary is concatenated in front of the representation,
//! while the hard top-1 assignment yields a same-prototype relation used as a
//! prior by the contrastive objectives.
//!
//! The regularization loss pulls every representation toward its nearest
//! prototype, penalizes samples whose two nearest prototypes are nearly tied,
//! and bounds the bank's Frobenius norm.

use candle_core::{Tensor, D};
use candle_nn::VarBuilder;
use longtail_tensor::{ops, PairMask};
use tracing::debug;

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;

const MARGIN: f64 = 1e-3;

/// Result of [`PrototypeMemory::memory_enhance`].
#[derive(Debug, Clone)]
pub struct MemoryOutput {
    /// `[N, 2D]`: soft prototype summary followed by the representation.
    pub enhanced: Tensor,
    /// Scalar regularization loss.
    pub loss: Tensor,
    /// `N x N` relation, set where two samples share their top-1 prototype.
    pub same_prototype: PairMask,
    /// `[N]` distance from each representation to its top-1 prototype, `L2 / D`.
    pub nearest_distance: Tensor,
    /// Top-1 prototype index per sample.
    pub nearest_index: Vec<u32>,
    /// `[N, K]` soft attention, when requested.
    pub attention: Option<Tensor>,
    /// Whether every sample landed on the same prototype.
    pub collapsed: bool,
}

/// Learned `K x D` prototype bank.
pub struct PrototypeMemory {
    prototypes: Tensor,
    count: usize,
    dim: usize,
}

impl PrototypeMemory {
    /// Creates `count` prototypes of width `dim`, Xavier-normal with relu gain.
    pub fn new(count: usize, dim: usize, vb: VarBuilder) -> LayerResult<Self> {
        if count < 2 {
            return Err(LayerError::ConfigError {
                message: format!("prototype memory needs at least 2 prototypes, got {count}"),
            });
        }
        let prototypes = vb.get_with_hints(
            (count, dim),
            "prototypes",
            Initializer::xavier_relu().to_init(&[count, dim]),
        )?;
        Ok(Self {
            prototypes,
            count,
            dim,
        })
    }

    /// Number of prototypes `K`.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Prototype width `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The `[K, D]` bank.
    pub fn prototypes(&self) -> &Tensor {
        &self.prototypes
    }

    /// Enhances `[N, D]` representations with their prototype summary.
    pub fn memory_enhance(&self, reprs: &Tensor, want_attention: bool) -> LayerResult<MemoryOutput> {
        let (n, dim) = reprs.dims2()?;
        if dim != self.dim {
            return Err(LayerError::ShapeMismatch {
                expected: vec![n, self.dim],
                actual: vec![n, dim],
            });
        }
        let device = reprs.device();

        let scores = ops::pairwise_dot(reprs, &self.prototypes)?;
        let attention = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let summary = attention.matmul(&self.prototypes)?;

        let (first, second) = top_two(&ops::to_rows(&attention)?);
        let first_idx = Tensor::from_slice(&first, n, device)?;
        let second_idx = Tensor::from_slice(&second, n, device)?;
        let nearest_distance = self.distance_to(reprs, &first_idx)?;
        let second_distance = self.distance_to(reprs, &second_idx)?;

        let mut loss = nearest_distance.mean_all()?;
        let margin = (&nearest_distance - &second_distance)?.affine(1.0, MARGIN)?;
        let violating: Vec<f32> = ops::to_vec(&margin)?
            .into_iter()
            .map(|m| if m < 0.0 { 1.0 } else { 0.0 })
            .collect();
        let violations = violating.iter().filter(|v| **v > 0.0).count();
        if violations > 0 {
            let mask = ops::vector(&violating, device)?;
            let penalty = (margin * mask)?.sum_all()?.affine(1.0 / violations as f64, 0.0)?;
            loss = (loss + penalty)?;
        }
        let bank_norm = self.prototypes.sqr()?.sum_all()?.sqrt()?;
        loss = (loss + bank_norm)?;

        let same_prototype = PairMask::from_fn(n, n, |i, j| first[i] == first[j]);
        let collapsed = same_prototype.is_full();
        if collapsed {
            debug!(batch = n, prototype = first[0], "Batch collapsed onto one prototype");
        }

        Ok(MemoryOutput {
            enhanced: Tensor::cat(&[&summary, reprs], 1)?,
            loss,
            same_prototype,
            nearest_distance,
            nearest_index: first,
            attention: want_attention.then_some(attention),
            collapsed,
        })
    }

    fn distance_to(&self, reprs: &Tensor, index: &Tensor) -> LayerResult<Tensor> {
        let selected = self.prototypes.index_select(index, 0)?;
        Ok((reprs - selected)?
            .sqr()?
            .sum(1)?
            .sqrt()?
            .affine(1.0 / self.dim as f64, 0.0)?)
    }
}

/// Indices of the largest and second-largest entry per row; ties go to the
/// lower index.
fn top_two(rows: &[Vec<f32>]) -> (Vec<u32>, Vec<u32>) {
    let mut first = Vec::with_capacity(rows.len());
    let mut second = Vec::with_capacity(rows.len());
    for row in rows {
        let mut best = (0usize, f32::NEG_INFINITY);
        let mut runner = (0usize, f32::NEG_INFINITY);
        for (k, &v) in row.iter().enumerate() {
            if v > best.1 {
                runner = best;
                best = (k, v);
            } else if v > runner.1 {
                runner = (k, v);
            }
        }
        first.push(best.0 as u32);
        second.push(runner.0 as u32);
    }
    (first, second)
}
