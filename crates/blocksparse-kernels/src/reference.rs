//! Reference implementations for testing kernel correctness.
//!
//! Plain loops over logical indices, independent of the provider code path.
//! The triple loops are the ground truth; the block-matrix and contraction
//! forms regroup the same sums and are only used to cross-check them.

use blocksparse_common::{IndexMatrix, Result, Tensor, validate_gemv, validate_outer};

/// `O[b,j,:] += Σ_i H[b,i,:] · W[iIdx[b,i], oIdx[b,j]]` by explicit loops.
pub fn gemv_loop(
    o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<Tensor> {
    let dims = validate_gemv(o, w, h, i_idx, o_idx)?;
    let mut out = o.to_contiguous();
    for b in 0..dims.batch {
        for j in 0..dims.output_window {
            let ob = o_idx.get(b, j) as usize;
            for i in 0..dims.input_window {
                let ib = i_idx.get(b, i) as usize;
                for l in 0..dims.output_size {
                    let mut sum = 0.0f32;
                    for k in 0..dims.input_size {
                        sum += h.get(&[b, i, k]) * w.get(&[ib, ob, k, l]);
                    }
                    out.add_at(&[b, j, l], sum);
                }
            }
        }
    }
    Ok(out)
}

/// Gemv through one dense `[iw·inSize, ow·outSize]` matrix per batch row.
///
/// The selected blocks of row `b` are laid out as a block matrix and
/// multiplied by the flattened `H[b]`.
pub fn gemv_block_matrix(
    o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<Tensor> {
    let dims = validate_gemv(o, w, h, i_idx, o_idx)?;
    let rows = dims.input_window * dims.input_size;
    let cols = dims.output_window * dims.output_size;
    let mut out = o.to_contiguous();
    let mut matrix = vec![0.0f32; rows * cols];
    let mut h_flat = vec![0.0f32; rows];

    for b in 0..dims.batch {
        for i in 0..dims.input_window {
            let ib = i_idx.get(b, i) as usize;
            for k in 0..dims.input_size {
                let r = i * dims.input_size + k;
                h_flat[r] = h.get(&[b, i, k]);
                for j in 0..dims.output_window {
                    let ob = o_idx.get(b, j) as usize;
                    for l in 0..dims.output_size {
                        matrix[r * cols + j * dims.output_size + l] = w.get(&[ib, ob, k, l]);
                    }
                }
            }
        }
        for c in 0..cols {
            let sum: f32 = (0..rows).map(|r| h_flat[r] * matrix[r * cols + c]).sum();
            out.add_at(&[b, c / dims.output_size, c % dims.output_size], sum);
        }
    }
    Ok(out)
}

/// Gemv as the contraction `O[b,j,l] += Σ_{i,k} H[b,i,k] · Wg[i,j,k,l]` over
/// the gathered blocks `Wg = W[iIdx[b], oIdx[b]]`.
pub fn gemv_contraction(
    o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<Tensor> {
    let dims = validate_gemv(o, w, h, i_idx, o_idx)?;
    let mut out = o.to_contiguous();
    for b in 0..dims.batch {
        let gathered = Tensor::from_fn(
            &[dims.input_window, dims.output_window, dims.input_size, dims.output_size],
            |ix| {
                let ib = i_idx.get(b, ix[0]) as usize;
                let ob = o_idx.get(b, ix[1]) as usize;
                w.get(&[ib, ob, ix[2], ix[3]])
            },
        );
        for j in 0..dims.output_window {
            for l in 0..dims.output_size {
                let mut sum = 0.0f32;
                for i in 0..dims.input_window {
                    for k in 0..dims.input_size {
                        sum += h.get(&[b, i, k]) * gathered.get(&[i, j, k, l]);
                    }
                }
                out.add_at(&[b, j, l], sum);
            }
        }
    }
    Ok(out)
}

/// `Acc[xIdx[b,i], yIdx[b,j]] += outer(X[b,i,:], Y[b,j,:])` by explicit loops.
pub fn outer_loop(
    acc: &Tensor,
    x: &Tensor,
    y: &Tensor,
    x_idx: &IndexMatrix,
    y_idx: &IndexMatrix,
) -> Result<Tensor> {
    let dims = validate_outer(acc, x, y, x_idx, y_idx)?;
    let mut out = acc.to_contiguous();
    for b in 0..dims.batch {
        for i in 0..dims.x_window {
            let xb = x_idx.get(b, i) as usize;
            for j in 0..dims.y_window {
                let yb = y_idx.get(b, j) as usize;
                for k in 0..dims.x_size {
                    for l in 0..dims.y_size {
                        out.add_at(&[xb, yb, k, l], x.get(&[b, i, k]) * y.get(&[b, j, l]));
                    }
                }
            }
        }
    }
    Ok(out)
}
