//! Host-side 0/1 pair relations.
//!
//! Positive, negative and prior masks are derived from labels or hard
//! prototype assignments, never from differentiable values, so they are built
//! on the host and uploaded once per batch.

use candle_core::{Device, Tensor};

use crate::error::{TensorError, TensorResult};

/// A dense `rows x cols` relation stored as row-major `0.0` / `1.0` values.
#[derive(Debug, Clone, PartialEq)]
pub struct PairMask {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl PairMask {
    /// Builds a mask from a predicate over `(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(if f(i, j) { 1.0 } else { 0.0 });
            }
        }
        Self { rows, cols, data }
    }

    /// A mask with every pair set.
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![1.0; rows * cols],
        }
    }

    /// Wraps a row-major buffer; non-zero entries count as set.
    pub fn from_values(rows: usize, cols: usize, values: Vec<f32>) -> TensorResult<Self> {
        if values.len() != rows * cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![rows, cols],
                actual: values.len(),
            });
        }
        let data = values
            .into_iter()
            .map(|v| if v != 0.0 { 1.0 } else { 0.0 })
            .collect();
        Ok(Self { rows, cols, data })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether `(i, j)` is set.
    pub fn get(&self, i: usize, j: usize) -> bool {
        self.data[i * self.cols + j] != 0.0
    }

    /// Row-major values.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Elementwise AND with another mask of the same shape.
    pub fn and(&self, other: &PairMask) -> TensorResult<Self> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.rows, self.cols],
                actual: other.rows * other.cols,
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a * b)
            .collect();
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Clears `(i, i)` for every `i < min(rows, cols)`.
    ///
    /// In a rectangular batch-versus-pool relation the batch occupies the
    /// first pool columns, so this removes exactly the self-pairs.
    pub fn without_diagonal(mut self) -> Self {
        for i in 0..self.rows.min(self.cols) {
            self.data[i * self.cols + i] = 0.0;
        }
        self
    }

    /// Keeps the first `n` rows.
    pub fn head_rows(&self, n: usize) -> Self {
        let n = n.min(self.rows);
        Self {
            rows: n,
            cols: self.cols,
            data: self.data[..n * self.cols].to_vec(),
        }
    }

    /// Number of set pairs.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v != 0.0).count()
    }

    /// Number of set pairs per row.
    pub fn row_counts(&self) -> Vec<usize> {
        self.data
            .chunks(self.cols.max(1))
            .map(|row| row.iter().filter(|v| **v != 0.0).count())
            .collect()
    }

    /// Whether every pair is set.
    pub fn is_full(&self) -> bool {
        self.data.iter().all(|v| *v != 0.0)
    }

    /// Whether any diagonal pair is set.
    pub fn has_diagonal(&self) -> bool {
        (0..self.rows.min(self.cols)).any(|i| self.get(i, i))
    }

    /// Uploads the mask as an f32 tensor.
    pub fn to_tensor(&self, device: &Device) -> TensorResult<Tensor> {
        Ok(Tensor::from_slice(&self.data, (self.rows, self.cols), device)?)
    }
}
