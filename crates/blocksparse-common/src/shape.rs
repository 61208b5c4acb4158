//! Entry-point shape and index validation
//!
//! Every public kernel runs one of these checks before touching its
//! accumulator, so a rejected call never leaves partial sums behind.

use crate::tensor::{IndexMatrix, Tensor};
use crate::{Result, ShapeError};

/// Validated dimensions of a gemv-family call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemvDims {
    pub batch: usize,
    pub input_window: usize,
    pub output_window: usize,
    pub n_input_blocks: usize,
    pub n_output_blocks: usize,
    pub input_size: usize,
    pub output_size: usize,
}

impl GemvDims {
    pub fn w_shape(&self) -> [usize; 4] {
        [self.n_input_blocks, self.n_output_blocks, self.input_size, self.output_size]
    }

    pub fn h_shape(&self) -> [usize; 3] {
        [self.batch, self.input_window, self.input_size]
    }

    pub fn o_shape(&self) -> [usize; 3] {
        [self.batch, self.output_window, self.output_size]
    }

    pub fn bias_shape(&self) -> [usize; 2] {
        [self.n_output_blocks, self.output_size]
    }

    /// Multiply-add count of one forward pass.
    pub fn mul_adds(&self) -> usize {
        self.batch * self.input_window * self.output_window * self.input_size * self.output_size
    }
}

/// Validated dimensions of an outer-product accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterDims {
    pub batch: usize,
    pub x_window: usize,
    pub y_window: usize,
    pub n_x_blocks: usize,
    pub n_y_blocks: usize,
    pub x_size: usize,
    pub y_size: usize,
}

impl OuterDims {
    pub fn acc_shape(&self) -> [usize; 4] {
        [self.n_x_blocks, self.n_y_blocks, self.x_size, self.y_size]
    }

    pub fn mul_adds(&self) -> usize {
        self.batch * self.x_window * self.y_window * self.x_size * self.y_size
    }
}

impl From<GemvDims> for OuterDims {
    /// Dimensions of the weight-gradient accumulation `outer(H, gradO)`.
    fn from(d: GemvDims) -> Self {
        Self {
            batch: d.batch,
            x_window: d.input_window,
            y_window: d.output_window,
            n_x_blocks: d.n_input_blocks,
            n_y_blocks: d.n_output_blocks,
            x_size: d.input_size,
            y_size: d.output_size,
        }
    }
}

fn expect_dim(operand: &'static str, axis: usize, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ShapeError::DimMismatch { operand, axis, expected, actual }.into());
    }
    Ok(())
}

fn expect_shape(operand: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(ShapeError::RankMismatch {
            operand,
            expected: expected.len(),
            actual: actual.len(),
        }
        .into());
    }
    for (axis, (&e, &a)) in expected.iter().zip(actual).enumerate() {
        expect_dim(operand, axis, e, a)?;
    }
    Ok(())
}

/// Check that every entry of `idx` lies in `[0, bound)`.
///
/// # Errors
///
/// Returns [`ShapeError::IndexOutOfRange`] for the first offending entry,
/// negative values included.
pub fn check_indices(operand: &'static str, idx: &IndexMatrix, bound: usize) -> Result<()> {
    for row in 0..idx.rows() {
        for (col, &index) in idx.row(row).iter().enumerate() {
            if index < 0 || index as usize >= bound {
                return Err(ShapeError::IndexOutOfRange { operand, row, col, index, bound }.into());
            }
        }
    }
    Ok(())
}

/// Validate `W`, `H` and both index matrices of a gemv-family call.
pub fn validate_gemv_operands(
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<GemvDims> {
    let [n_input_blocks, n_output_blocks, input_size, output_size] = w.dims4("W")?;
    let [batch, input_window, h_size] = h.dims3("H")?;
    expect_dim("H", 2, input_size, h_size)?;
    expect_shape("iIdx", &[batch, input_window], &i_idx.shape())?;
    expect_dim("oIdx", 0, batch, o_idx.rows())?;
    check_indices("iIdx", i_idx, n_input_blocks)?;
    check_indices("oIdx", o_idx, n_output_blocks)?;
    Ok(GemvDims {
        batch,
        input_window,
        output_window: o_idx.cols(),
        n_input_blocks,
        n_output_blocks,
        input_size,
        output_size,
    })
}

/// Validate a full `BlockGemv(O, W, H, iIdx, oIdx)` call.
///
/// `o` may equally be an upstream gradient of the output.
pub fn validate_gemv(
    o: &Tensor,
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    o_idx: &IndexMatrix,
) -> Result<GemvDims> {
    let dims = validate_gemv_operands(w, h, i_idx, o_idx)?;
    expect_shape("O", &dims.o_shape(), o.shape())?;
    Ok(dims)
}

/// Validate a `BlockDot(W, H, iIdx, Bias, oIdx)` call.
pub fn validate_dot(
    w: &Tensor,
    h: &Tensor,
    i_idx: &IndexMatrix,
    bias: &Tensor,
    o_idx: &IndexMatrix,
) -> Result<GemvDims> {
    let dims = validate_gemv_operands(w, h, i_idx, o_idx)?;
    expect_shape("Bias", &dims.bias_shape(), bias.shape())?;
    Ok(dims)
}

/// Validate a `BlockOuter(Acc, X, Y, xIdx, yIdx)` call.
pub fn validate_outer(
    acc: &Tensor,
    x: &Tensor,
    y: &Tensor,
    x_idx: &IndexMatrix,
    y_idx: &IndexMatrix,
) -> Result<OuterDims> {
    let [n_x_blocks, n_y_blocks, x_size, y_size] = acc.dims4("Acc")?;
    let [batch, x_window, x_len] = x.dims3("X")?;
    let [y_batch, y_window, y_len] = y.dims3("Y")?;
    expect_dim("X", 2, x_size, x_len)?;
    expect_dim("Y", 0, batch, y_batch)?;
    expect_dim("Y", 2, y_size, y_len)?;
    expect_shape("xIdx", &[batch, x_window], &x_idx.shape())?;
    expect_shape("yIdx", &[batch, y_window], &y_idx.shape())?;
    check_indices("xIdx", x_idx, n_x_blocks)?;
    check_indices("yIdx", y_idx, n_y_blocks)?;
    Ok(OuterDims { batch, x_window, y_window, n_x_blocks, n_y_blocks, x_size, y_size })
}
