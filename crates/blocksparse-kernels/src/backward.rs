//! Adjoint kernels for reverse-mode differentiation
//!
//! For `O = O_in + BlockGemv(W, H, iIdx, oIdx)` with upstream `gradO`:
//!
//! | operand | gradient                                              |
//! |---------|-------------------------------------------------------|
//! | `O_in`  | `gradO` (pass-through)                                |
//! | `H`     | `gradH[b,i,:] = Σ_j gradO[b,j,:] · W[iIdx, oIdx]^T`    |
//! | `W`     | `BlockOuter(0, H, gradO, iIdx, oIdx)`                  |
//!
//! `BlockDot` replaces the `O_in` gradient with a scatter-add of `gradO` rows
//! into the bias table. Index matrices are not differentiable.

use blocksparse_common::{
    IndexMatrix, OuterDims, Result, Tensor, validate_dot, validate_gemv,
};

use crate::KernelManager;
use crate::scatter_gather::scatter_add_rows;

/// Gradients of [`crate::sparse_block_gemv`].
#[derive(Debug, Clone, PartialEq)]
pub struct GemvGrads {
    /// Gradient with respect to the incoming accumulator `O_in`.
    pub o: Tensor,
    pub h: Tensor,
    pub w: Tensor,
}

/// Gradients of [`crate::sparse_block_dot`].
#[derive(Debug, Clone, PartialEq)]
pub struct DotGrads {
    pub bias: Tensor,
    pub h: Tensor,
    pub w: Tensor,
}

impl KernelManager {
    fn input_and_weight_grads(
        &self,
        grad_o: &Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
    ) -> Result<(Tensor, Tensor)> {
        let dims = validate_gemv(grad_o, w, h, i_idx, o_idx)?;
        let provider = self.select_best()?;
        log::debug!("gemv backward via {}: {dims:?}", provider.name());

        let mut grad_h = Tensor::zeros(&dims.h_shape());
        provider.gemv_input_grad(&mut grad_h, grad_o, w, i_idx, o_idx, &dims)?;

        // Returned in W's logical shape, row-major regardless of W's layout.
        let mut grad_w = Tensor::zeros(&dims.w_shape());
        provider.outer(&mut grad_w, h, grad_o, i_idx, o_idx, &OuterDims::from(dims))?;

        Ok((grad_h, grad_w))
    }

    /// Adjoint of [`KernelManager::gemv`].
    ///
    /// # Errors
    ///
    /// `grad_o` must have the shape of `O`; validation runs before any work.
    pub fn gemv_grad(
        &self,
        grad_o: &Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
    ) -> Result<GemvGrads> {
        let (h_grad, w_grad) = self.input_and_weight_grads(grad_o, w, h, i_idx, o_idx)?;
        Ok(GemvGrads { o: grad_o.to_contiguous(), h: h_grad, w: w_grad })
    }

    /// Adjoint of [`KernelManager::dot`].
    pub fn dot_grad(
        &self,
        grad_o: &Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        bias: &Tensor,
        o_idx: &IndexMatrix,
    ) -> Result<DotGrads> {
        let dims = validate_dot(w, h, i_idx, bias, o_idx)?;
        let (h_grad, w_grad) = self.input_and_weight_grads(grad_o, w, h, i_idx, o_idx)?;
        let bias_grad = scatter_add_rows(grad_o, o_idx, dims.n_output_blocks)?;
        Ok(DotGrads { bias: bias_grad, h: h_grad, w: w_grad })
    }
}

/// Gradients of `sparse_block_gemv(O_in, W, H, iIdx, oIdx)` for upstream
/// `grad_o`.
pub fn sparse_block_gemv_grad(
    grad_o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<GemvGrads> {
    KernelManager::global().gemv_grad(grad_o, w, h, i_idx, o_idx)
}

/// Gradients of `sparse_block_dot(W, H, iIdx, Bias, oIdx)` for upstream
/// `grad_o`.
pub fn sparse_block_dot_grad(
    grad_o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    bias: &Tensor,
    o_idx: &IndexMatrix,
) -> Result<DotGrads> {
    KernelManager::global().dot_grad(grad_o, w, h, i_idx, bias, o_idx)
}
