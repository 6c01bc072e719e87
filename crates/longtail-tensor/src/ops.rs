//! Pairwise and row-wise tensor operations shared by layers and losses.
//!
//! All functions take `[N, D]` matrices and return candle tensors that keep
//! gradient tracking intact, except where a result is explicitly detached.

use candle_core::{DType, Device, Tensor};

use crate::error::{TensorError, TensorResult};

/// Builds an `[rows, cols]` f32 tensor from a row-major host buffer.
pub fn matrix(data: &[f32], rows: usize, cols: usize, device: &Device) -> TensorResult<Tensor> {
    if data.len() != rows * cols {
        return Err(TensorError::ShapeMismatch {
            expected: vec![rows, cols],
            actual: data.len(),
        });
    }
    Ok(Tensor::from_slice(data, (rows, cols), device)?)
}

/// Builds an `[len]` f32 tensor from a host slice.
pub fn vector(data: &[f32], device: &Device) -> TensorResult<Tensor> {
    Ok(Tensor::from_slice(data, data.len(), device)?)
}

/// Copies a 2-D tensor back to the host as rows.
pub fn to_rows(t: &Tensor) -> TensorResult<Vec<Vec<f32>>> {
    Ok(t.to_dtype(DType::F32)?.to_vec2::<f32>()?)
}

/// Copies a 1-D tensor back to the host.
pub fn to_vec(t: &Tensor) -> TensorResult<Vec<f32>> {
    Ok(t.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

/// `a · bᵀ` for `[N, D]` and `[M, D]` inputs.
pub fn pairwise_dot(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    Ok(a.matmul(&b.t()?.contiguous()?)?)
}

/// Scales each row to unit L2 norm.
pub fn l2_normalize_rows(t: &Tensor) -> TensorResult<Tensor> {
    let norm = t.sqr()?.sum_keepdim(1)?.sqrt()?;
    Ok(t.broadcast_div(&norm)?)
}

/// Cosine similarity between every row of `a` and every row of `b`.
pub fn pairwise_cosine(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let a = l2_normalize_rows(a)?;
    let b = l2_normalize_rows(b)?;
    pairwise_dot(&a, &b)
}

/// Euclidean distance between every row of `a` and every row of `b`.
///
/// A `1e-12` floor under the square root keeps the gradient finite on
/// coincident rows.
pub fn pairwise_l2(a: &Tensor, b: &Tensor) -> TensorResult<Tensor> {
    let a_sq = a.sqr()?.sum_keepdim(1)?;
    let b_sq = b.sqr()?.sum_keepdim(1)?.t()?;
    let cross = pairwise_dot(a, b)?.affine(-2.0, 0.0)?;
    let sq = cross.broadcast_add(&a_sq)?.broadcast_add(&b_sq)?;
    Ok(sq.relu()?.affine(1.0, 1e-12)?.sqrt()?)
}

/// Subtracts the detached row maximum, leaving every row's max at zero.
pub fn subtract_row_max(logits: &Tensor) -> TensorResult<Tensor> {
    let max = logits.max_keepdim(1)?.detach();
    Ok(logits.broadcast_sub(&max)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_matrix_rejects_wrong_length() {
        let err = matrix(&[1.0, 2.0, 3.0], 2, 2, &Device::Cpu).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_pairwise_cosine() {
        let a = matrix(&[1.0, 0.0, 0.0, 2.0], 2, 2, &Device::Cpu).unwrap();
        let sim = to_rows(&pairwise_cosine(&a, &a).unwrap()).unwrap();
        assert!(close(sim[0][0], 1.0));
        assert!(close(sim[0][1], 0.0));
        assert!(close(sim[1][1], 1.0));
    }

    #[test]
    fn test_pairwise_l2() {
        let a = matrix(&[0.0, 0.0, 3.0, 4.0], 2, 2, &Device::Cpu).unwrap();
        let d = to_rows(&pairwise_l2(&a, &a).unwrap()).unwrap();
        assert!(close(d[0][1], 5.0));
        assert!(close(d[1][0], 5.0));
        assert!(d[0][0].abs() < 1e-3);
    }

    #[test]
    fn test_subtract_row_max() {
        let a = matrix(&[1.0, 3.0, -2.0, -5.0], 2, 2, &Device::Cpu).unwrap();
        let out = to_rows(&subtract_row_max(&a).unwrap()).unwrap();
        assert_eq!(out, vec![vec![-2.0, 0.0], vec![0.0, -3.0]]);
    }
}
