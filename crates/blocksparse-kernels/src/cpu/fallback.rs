//! Fallback CPU kernel implementation
//!
//! Straightforward single-threaded loops over batch rows. This provider is
//! always available and is the reference the parallel provider is checked
//! against.

use crate::BlockSparseProvider;
use crate::cpu::block_ops::{gemv_batch_row, gemv_input_grad_row, outer_batch_row, strides_n};
use blocksparse_common::{GemvDims, IndexMatrix, OuterDims, Result, Tensor};

/// Sequential kernel that works on any architecture and any operand layout.
///
/// Accumulators are updated in place through their strides, so transposed
/// or permuted views are accepted as-is.
pub struct FallbackKernel;

impl BlockSparseProvider for FallbackKernel {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn gemv(
        &self,
        o: &mut Tensor,
        w: &Tensor,
        h: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
        dims: &GemvDims,
    ) -> Result<()> {
        if o.numel() == 0 {
            return Ok(());
        }
        let os: [usize; 3] = strides_n(o);
        let data = o.storage_mut();
        for b in 0..dims.batch {
            let row = &mut data[b * os[0]..];
            gemv_batch_row(row, [os[1], os[2]], w, h, i_idx, o_idx, b, dims);
        }
        Ok(())
    }

    fn outer(
        &self,
        acc: &mut Tensor,
        x: &Tensor,
        y: &Tensor,
        x_idx: &IndexMatrix,
        y_idx: &IndexMatrix,
        dims: &OuterDims,
    ) -> Result<()> {
        let strides: [usize; 4] = strides_n(acc);
        let data = acc.storage_mut();
        for b in 0..dims.batch {
            outer_batch_row(data, strides, x, y, x_idx, y_idx, b, dims);
        }
        Ok(())
    }

    fn gemv_input_grad(
        &self,
        grad_h: &mut Tensor,
        grad_o: &Tensor,
        w: &Tensor,
        i_idx: &IndexMatrix,
        o_idx: &IndexMatrix,
        dims: &GemvDims,
    ) -> Result<()> {
        if grad_h.numel() == 0 {
            return Ok(());
        }
        let gs: [usize; 3] = strides_n(grad_h);
        let data = grad_h.storage_mut();
        for b in 0..dims.batch {
            let row = &mut data[b * gs[0]..];
            gemv_input_grad_row(row, [gs[1], gs[2]], grad_o, w, i_idx, o_idx, b, dims);
        }
        Ok(())
    }
}
