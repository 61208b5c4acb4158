//! Row gather/scatter between per-block tables and batched windows.
//!
//! # Operations
//!
//! - **Gather**: `out[b, j, :] = table[idx[b, j], :]`. Builds the initial
//!   accumulator of [`crate::sparse_block_dot`] from a bias table.
//! - **Scatter-add**: `table[idx[b, j], :] += src[b, j, :]`. The adjoint of
//!   gather; repeated indices accumulate.

use blocksparse_common::{IndexMatrix, Result, ShapeError, Tensor, check_indices};

fn table_dims(table: &Tensor) -> Result<(usize, usize)> {
    match *table.shape() {
        [rows, cols] => Ok((rows, cols)),
        _ => Err(ShapeError::RankMismatch { operand: "Bias", expected: 2, actual: table.ndim() }
            .into()),
    }
}

/// Gather rows of a `[nBlocks, size]` table into a `[batch, window, size]`
/// tensor.
///
/// # Errors
///
/// Returns a [`ShapeError`] if `table` is not 2-D or an index is out of range.
pub fn gather_bias(table: &Tensor, idx: &IndexMatrix) -> Result<Tensor> {
    let (n_blocks, size) = table_dims(table)?;
    check_indices("oIdx", idx, n_blocks)?;
    gather_rows(table, idx, size)
}

/// Row gather for callers that already bounds-checked `idx` against `table`.
pub(crate) fn gather_rows(table: &Tensor, idx: &IndexMatrix, size: usize) -> Result<Tensor> {
    let table = table.to_contiguous();
    let src = table.as_slice().ok_or(ShapeError::NotContiguous { operand: "Bias" })?;
    let mut out = Vec::with_capacity(idx.rows() * idx.cols() * size);
    for &block in idx.as_slice() {
        let start = block as usize * size;
        out.extend_from_slice(&src[start..start + size]);
    }
    Tensor::from_vec(out, &[idx.rows(), idx.cols(), size])
}

/// Sum the `[batch, window, size]` rows of `src` into a fresh
/// `[n_blocks, size]` table at the rows named by `idx`.
///
/// # Errors
///
/// Returns a [`ShapeError`] if `src` does not match `idx` or an index is out
/// of range.
pub fn scatter_add_rows(src: &Tensor, idx: &IndexMatrix, n_blocks: usize) -> Result<Tensor> {
    let [batch, window, size] = src.dims3("gradO")?;
    if idx.shape() != [batch, window] {
        let axis = usize::from(idx.rows() == batch);
        let (expected, actual) = if axis == 0 { (batch, idx.rows()) } else { (window, idx.cols()) };
        return Err(ShapeError::DimMismatch { operand: "oIdx", axis, expected, actual }.into());
    }
    check_indices("oIdx", idx, n_blocks)?;

    let mut table = Tensor::zeros(&[n_blocks, size]);
    let dst = table.storage_mut();
    for b in 0..batch {
        for (j, &block) in idx.row(b).iter().enumerate() {
            let start = block as usize * size;
            for (k, d) in dst[start..start + size].iter_mut().enumerate() {
                *d += src.get(&[b, j, k]);
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_bias_basic() {
        // [[10, 11], [20, 21], [30, 31]]
        let bias = Tensor::from_vec(vec![10.0, 11.0, 20.0, 21.0, 30.0, 31.0], &[3, 2]).unwrap();
        let idx = IndexMatrix::from_rows(&[[2, 0], [1, 1]]).unwrap();
        let out = gather_bias(&bias, &idx).unwrap();
        assert_eq!(out.shape(), &[2, 2, 2]);
        assert_eq!(out.to_vec(), vec![30.0, 31.0, 10.0, 11.0, 20.0, 21.0, 20.0, 21.0]);
    }

    #[test]
    fn test_gather_bias_transposed_table() {
        let bias = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3])
            .unwrap()
            .swap_axes(0, 1)
            .unwrap();
        let idx = IndexMatrix::from_rows(&[[1]]).unwrap();
        assert_eq!(gather_bias(&bias, &idx).unwrap().to_vec(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_gather_bias_out_of_bounds() {
        let bias = Tensor::zeros(&[2, 2]);
        let idx = IndexMatrix::from_rows(&[[2]]).unwrap();
        assert!(gather_bias(&bias, &idx).is_err());
        assert!(gather_bias(&Tensor::zeros(&[2, 2, 1]), &IndexMatrix::from_rows(&[[0]]).unwrap())
            .is_err());
    }

    #[test]
    fn test_scatter_add_same_index() {
        let src = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 1, 2]).unwrap();
        let idx = IndexMatrix::from_rows(&[[1], [1], [0]]).unwrap();
        let table = scatter_add_rows(&src, &idx, 3).unwrap();
        assert_eq!(table.shape(), &[3, 2]);
        assert_eq!(table.to_vec(), vec![5.0, 6.0, 4.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_scatter_add_rejects_mismatched_indices() {
        let src = Tensor::zeros(&[2, 3, 4]);
        let idx = IndexMatrix::from_rows(&[[0, 0], [0, 0]]).unwrap();
        assert!(scatter_add_rows(&src, &idx, 1).is_err());
    }
}
