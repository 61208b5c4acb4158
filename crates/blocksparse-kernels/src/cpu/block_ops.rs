//! Per-batch-row block kernels shared by every CPU provider.
//!
//! Each routine handles one batch row and accumulates into a caller-supplied
//! buffer addressed through explicit strides. Operand tensors are read
//! through their own strides, so no routine depends on physical layout.
//! Inputs must already be validated; indices are assumed in range.

#![allow(clippy::too_many_arguments)]

use blocksparse_common::{GemvDims, IndexMatrix, OuterDims, Tensor};

/// Accumulate `H[b,i,:] · W[iIdx[b,i], oIdx[b,j]]` into every output block
/// of batch row `b`.
///
/// `out` holds the `[outputWindow, outputSize]` row with element strides
/// `out_strides`, relative to `out[0]`.
pub(crate) fn gemv_batch_row(
    out: &mut [f32],
    out_strides: [usize; 2],
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
    b: usize,
    dims: &GemvDims,
) {
    let ws = w.strides();
    let (w_k, w_l) = (ws[2], ws[3]);
    let hs = h.strides();
    let w_data = w.storage();
    let h_data = h.storage();

    for (j, &ob) in o_idx.row(b).iter().enumerate() {
        let out_base = j * out_strides[0];
        for (i, &ib) in i_idx.row(b).iter().enumerate() {
            let block = ib as usize * ws[0] + ob as usize * ws[1];
            let h_base = b * hs[0] + i * hs[1];
            for k in 0..dims.input_size {
                let hv = h_data[h_base + k * hs[2]];
                let w_row = block + k * w_k;
                for l in 0..dims.output_size {
                    out[out_base + l * out_strides[1]] += hv * w_data[w_row + l * w_l];
                }
            }
        }
    }
}

/// Accumulate `outer(X[b,i,:], Y[b,j,:])` into `acc[xIdx[b,i], yIdx[b,j]]`
/// for every window pair of batch row `b`.
///
/// Colliding block pairs are summed, never overwritten.
pub(crate) fn outer_batch_row(
    acc: &mut [f32],
    acc_strides: [usize; 4],
    x: &Tensor,
    y: &Tensor,
    x_idx: &IndexMatrix,
    y_idx: &IndexMatrix,
    b: usize,
    dims: &OuterDims,
) {
    let xs = x.strides();
    let ys = y.strides();
    let x_data = x.storage();
    let y_data = y.storage();

    for (i, &xb) in x_idx.row(b).iter().enumerate() {
        let x_base = b * xs[0] + i * xs[1];
        for (j, &yb) in y_idx.row(b).iter().enumerate() {
            let y_base = b * ys[0] + j * ys[1];
            let cell = xb as usize * acc_strides[0] + yb as usize * acc_strides[1];
            for k in 0..dims.x_size {
                let xv = x_data[x_base + k * xs[2]];
                let row = cell + k * acc_strides[2];
                for l in 0..dims.y_size {
                    acc[row + l * acc_strides[3]] += xv * y_data[y_base + l * ys[2]];
                }
            }
        }
    }
}

/// Accumulate `gradO[b,j,:] · W[iIdx[b,i], oIdx[b,j]]^T` into every input
/// block gradient of batch row `b`.
///
/// `out` holds the `[inputWindow, inputSize]` row with strides `out_strides`.
pub(crate) fn gemv_input_grad_row(
    out: &mut [f32],
    out_strides: [usize; 2],
    grad_o: &Tensor,
    w: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
    b: usize,
    dims: &GemvDims,
) {
    let ws = w.strides();
    let gs = grad_o.strides();
    let w_data = w.storage();
    let g_data = grad_o.storage();

    for (i, &ib) in i_idx.row(b).iter().enumerate() {
        let out_base = i * out_strides[0];
        for (j, &ob) in o_idx.row(b).iter().enumerate() {
            let block = ib as usize * ws[0] + ob as usize * ws[1];
            let g_base = b * gs[0] + j * gs[1];
            for k in 0..dims.input_size {
                let w_row = block + k * ws[2];
                let dot: f32 = (0..dims.output_size)
                    .map(|l| g_data[g_base + l * gs[2]] * w_data[w_row + l * ws[3]])
                    .sum();
                out[out_base + k * out_strides[1]] += dot;
            }
        }
    }
}

/// Strides of a rank-`N` tensor as a fixed array.
pub(crate) fn strides_n<const N: usize>(t: &Tensor) -> [usize; N] {
    let mut out = [0; N];
    out.copy_from_slice(t.strides());
    out
}
