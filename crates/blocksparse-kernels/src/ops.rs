//! Forward block-sparse operations.
//!
//! `*_inplace` variants accumulate into caller storage; the plain variants
//! copy the accumulator first and leave the input untouched.

use blocksparse_common::{
    GemvDims, IndexMatrix, Result, Tensor, validate_dot, validate_gemv, validate_outer,
};

use crate::KernelManager;
use crate::scatter_gather::gather_rows;

impl KernelManager {
    /// `O[b,j,:] += Σ_i H[b,i,:] · W[iIdx[b,i], oIdx[b,j]]`, in place.
    ///
    /// # Errors
    ///
    /// Fails before touching `o` on any shape mismatch or out-of-range index.
    pub fn gemv_inplace(
        &self,
        o: &mut Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
    ) -> Result<()> {
        let dims = validate_gemv(o, w, h, i_idx, o_idx)?;
        self.gemv_validated(o, w, h, i_idx, o_idx, &dims)
    }

    /// Dispatch step of [`Self::gemv_inplace`]; `dims` must come from a
    /// successful validation of these operands.
    fn gemv_validated(
        &self,
        o: &mut Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
        dims: &GemvDims,
    ) -> Result<()> {
        let provider = self.select_best()?;
        log::debug!("gemv via {}: {dims:?}, w strides {:?}", provider.name(), w.strides());
        provider.gemv(o, w, h, i_idx, o_idx, dims)
    }

    pub fn gemv(
        &self,
        o: &Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
    ) -> Result<Tensor> {
        let mut out = o.to_contiguous();
        self.gemv_inplace(&mut out, w, h, i_idx, o_idx)?;
        Ok(out)
    }

    /// `Acc[xIdx[b,i], yIdx[b,j], :, :] += outer(X[b,i,:], Y[b,j,:])`, in place.
    ///
    /// Every colliding `(b, i, j)` contribution is summed.
    pub fn outer_inplace(
        &self,
        acc: &mut Tensor,
        x: &Tensor,
        y: &Tensor,
        x_idx: &IndexMatrix,
        y_idx: &IndexMatrix,
    ) -> Result<()> {
        let dims = validate_outer(acc, x, y, x_idx, y_idx)?;
        let provider = self.select_best()?;
        log::debug!("outer via {}: {dims:?}", provider.name());
        provider.outer(acc, x, y, x_idx, y_idx, &dims)
    }

    pub fn outer(
        &self,
        acc: &Tensor,
        x: &Tensor,
        y: &Tensor,
        x_idx: &IndexMatrix,
        y_idx: &IndexMatrix,
    ) -> Result<Tensor> {
        let mut out = acc.to_contiguous();
        self.outer_inplace(&mut out, x, y, x_idx, y_idx)?;
        Ok(out)
    }

    /// `gemv(gather(bias, oIdx), W, H, iIdx, oIdx)`.
    pub fn dot(
        &self,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        bias: &Tensor,
        o_idx: &IndexMatrix,
    ) -> Result<Tensor> {
        let dims = validate_dot(w, h, i_idx, bias, o_idx)?;
        let mut out = gather_rows(bias, o_idx, dims.output_size)?;
        self.gemv_validated(&mut out, w, h, i_idx, o_idx, &dims)?;
        Ok(out)
    }
}

/// Block-sparse matrix-vector product; returns `O_in` plus the contributions.
///
/// ```
/// use blocksparse_common::{IndexMatrix, Tensor};
/// use blocksparse_kernels::sparse_block_gemv;
///
/// // One 2x2 weight block, one batch row.
/// let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]).unwrap();
/// let h = Tensor::from_vec(vec![1.0, 1.0], &[1, 1, 2]).unwrap();
/// let o = Tensor::from_vec(vec![0.5, 0.5], &[1, 1, 2]).unwrap();
/// let idx = IndexMatrix::from_rows(&[[0]]).unwrap();
///
/// let out = sparse_block_gemv(&o, &w, &h, &idx, &idx).unwrap();
/// assert_eq!(out.to_vec(), vec![4.5, 6.5]);
/// ```
pub fn sparse_block_gemv(
    o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<Tensor> {
    KernelManager::global().gemv(o, w, h, i_idx, o_idx)
}

pub fn sparse_block_gemv_inplace(
    o: &mut Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<()> {
    KernelManager::global().gemv_inplace(o, w, h, i_idx, o_idx)
}

/// Block-sparse outer-product accumulation; returns `Acc_in` plus the
/// contributions.
pub fn sparse_block_outer(
    acc: &Tensor,
    x: &Tensor,
    y: &Tensor,
    x_idx: &IndexMatrix,
    y_idx: &IndexMatrix,
) -> Result<Tensor> {
    KernelManager::global().outer(acc, x, y, x_idx, y_idx)
}

pub fn sparse_block_outer_inplace(
    acc: &mut Tensor,
    x: &Tensor,
    y: &Tensor,
    x_idx: &IndexMatrix,
    y_idx: &IndexMatrix,
) -> Result<()> {
    KernelManager::global().outer_inplace(acc, x, y, x_idx, y_idx)
}

/// Gathers `bias` rows by `oIdx`, then runs [`sparse_block_gemv`].
pub fn sparse_block_dot(
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    bias: &Tensor,
    o_idx: &IndexMatrix,
) -> Result<Tensor> {
    KernelManager::global().dot(w, h, i_idx, bias, o_idx)
}
