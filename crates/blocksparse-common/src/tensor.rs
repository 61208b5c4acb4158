//! Dense strided tensors and block index matrices
//!
//! [`Tensor`] owns its storage and carries explicit element strides, so axis
//! swaps and permutations are metadata-only. Kernels address every operand
//! through [`Tensor::offset`] and never assume a physical layout.

use crate::{Result, ShapeError};

/// Row-major strides for `shape`.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Convert a row-major flat position into a multi-index.
fn unravel(mut flat: usize, shape: &[usize], index: &mut [usize]) {
    for axis in (0..shape.len()).rev() {
        let dim = shape[axis].max(1);
        index[axis] = flat % dim;
        flat /= dim;
    }
}

/// Dense `f32` tensor with arbitrary element strides.
///
/// Storage is always a bijection onto the logical elements: tensors are born
/// row-major and only ever re-strided by permuting axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Tensor {
    /// Wrap row-major `data` with the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::ElementCount`] when `data.len()` does not match
    /// the product of `shape`.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ShapeError::ElementCount {
                operand: "tensor",
                shape: shape.to_vec(),
                expected,
                actual: data.len(),
            }
            .into());
        }
        Ok(Self { data, shape: shape.to_vec(), strides: row_major_strides(shape) })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Self { data: vec![0.0; len], shape: shape.to_vec(), strides: row_major_strides(shape) }
    }

    /// Build a row-major tensor by evaluating `f` at every logical index.
    pub fn from_fn(shape: &[usize], mut f: impl FnMut(&[usize]) -> f32) -> Self {
        let len: usize = shape.iter().product();
        let mut index = vec![0; shape.len()];
        let data = (0..len)
            .map(|flat| {
                unravel(flat, shape, &mut index);
                f(&index)
            })
            .collect();
        Self { data, shape: shape.to_vec(), strides: row_major_strides(shape) }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn is_contiguous(&self) -> bool {
        // Unit axes never contribute to an offset, so their stride is irrelevant.
        let expected = row_major_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(&expected))
            .all(|(&dim, (&s, &e))| dim <= 1 || s == e)
    }

    /// Storage offset of a logical multi-index.
    #[inline]
    pub fn offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.shape.len());
        index.iter().zip(&self.strides).map(|(&i, &s)| i * s).sum()
    }

    #[inline]
    pub fn get(&self, index: &[usize]) -> f32 {
        self.data[self.offset(index)]
    }

    /// Add `value` to the element at `index`.
    #[inline]
    pub fn add_at(&mut self, index: &[usize], value: f32) {
        let offset = self.offset(index);
        self.data[offset] += value;
    }

    /// Raw storage in physical order.
    pub fn storage(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw storage in physical order.
    ///
    /// Pair with [`Tensor::strides`] to locate logical elements.
    pub fn storage_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Row-major view of the data, if the layout allows one.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.is_contiguous().then_some(self.data.as_slice())
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        if self.is_contiguous() { Some(self.data.as_mut_slice()) } else { None }
    }

    /// Swap two axes without moving data.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::AxisOutOfRange`] if either axis is out of range.
    pub fn swap_axes(mut self, a: usize, b: usize) -> Result<Self> {
        let ndim = self.ndim();
        for axis in [a, b] {
            if axis >= ndim {
                return Err(ShapeError::AxisOutOfRange { axis, ndim }.into());
            }
        }
        self.shape.swap(a, b);
        self.strides.swap(a, b);
        Ok(self)
    }

    /// Reorder axes so that new axis `k` is old axis `axes[k]`.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::NotPermutation`] unless `axes` is a permutation
    /// of `0..ndim`.
    pub fn permute(self, axes: &[usize]) -> Result<Self> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        let valid = axes.len() == ndim
            && axes.iter().all(|&a| a < ndim && !std::mem::replace(&mut seen[a], true));
        if !valid {
            return Err(ShapeError::NotPermutation { axes: axes.to_vec(), ndim }.into());
        }
        let shape = axes.iter().map(|&a| self.shape[a]).collect();
        let strides = axes.iter().map(|&a| self.strides[a]).collect();
        Ok(Self { data: self.data, shape, strides })
    }

    /// Row-major copy of the logical contents.
    pub fn to_contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return Tensor {
                data: self.data.clone(),
                shape: self.shape.clone(),
                strides: row_major_strides(&self.shape),
            };
        }
        Tensor::from_fn(&self.shape, |index| self.get(index))
    }

    /// Elements in row-major logical order, whatever the physical layout.
    pub fn iter_logical(&self) -> impl Iterator<Item = f32> + '_ {
        let mut index = vec![0; self.ndim()];
        (0..self.numel()).map(move |flat| {
            unravel(flat, &self.shape, &mut index);
            self.get(&index)
        })
    }

    /// Logical contents as a row-major `Vec`.
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter_logical().collect()
    }

    /// Add a row-major buffer of the same logical shape onto this tensor.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::ElementCount`] if `src` has the wrong length.
    pub fn add_row_major(&mut self, src: &[f32]) -> Result<()> {
        if src.len() != self.numel() {
            return Err(ShapeError::ElementCount {
                operand: "tensor",
                shape: self.shape.clone(),
                expected: self.numel(),
                actual: src.len(),
            }
            .into());
        }
        if let Some(dst) = self.as_mut_slice() {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d += s;
            }
            return Ok(());
        }
        let shape = self.shape.clone();
        let mut index = vec![0; shape.len()];
        for (flat, &s) in src.iter().enumerate() {
            unravel(flat, &shape, &mut index);
            self.add_at(&index, s);
        }
        Ok(())
    }

    /// Shape of a rank-3 operand.
    pub fn dims3(&self, operand: &'static str) -> Result<[usize; 3]> {
        match *self.shape.as_slice() {
            [a, b, c] => Ok([a, b, c]),
            _ => Err(ShapeError::RankMismatch { operand, expected: 3, actual: self.ndim() }.into()),
        }
    }

    /// Shape of a rank-4 operand.
    pub fn dims4(&self, operand: &'static str) -> Result<[usize; 4]> {
        match *self.shape.as_slice() {
            [a, b, c, d] => Ok([a, b, c, d]),
            _ => Err(ShapeError::RankMismatch { operand, expected: 4, actual: self.ndim() }.into()),
        }
    }
}

/// Rectangular `[rows, cols]` matrix of 32-bit block ids.
///
/// Row `b` lists the blocks selected for batch row `b`. Entries are not
/// required to be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMatrix {
    data: Vec<i32>,
    rows: usize,
    cols: usize,
}

impl IndexMatrix {
    /// # Errors
    ///
    /// Returns [`ShapeError::ElementCount`] if `data.len() != rows * cols`.
    pub fn from_vec(data: Vec<i32>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ShapeError::ElementCount {
                operand: "index matrix",
                shape: vec![rows, cols],
                expected: rows * cols,
                actual: data.len(),
            }
            .into());
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from per-row slices; ragged input is rejected.
    pub fn from_rows<R: AsRef<[i32]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(ShapeError::DimMismatch {
                    operand: "index matrix",
                    axis: 1,
                    expected: cols,
                    actual: row.len(),
                }
                .into());
            }
            data.extend_from_slice(row);
        }
        Ok(Self { data, rows: rows.len(), cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    #[inline]
    pub fn row(&self, b: usize) -> &[i32] {
        &self.data[b * self.cols..(b + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, b: usize, k: usize) -> i32 {
        self.data[b * self.cols + k]
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockSparseError;

    fn iota(shape: &[usize]) -> Tensor {
        let len: usize = shape.iter().product();
        Tensor::from_vec((0..len).map(|x| x as f32).collect(), shape).unwrap()
    }

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(row_major_strides(&[5]), vec![1]);
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Tensor::from_vec(vec![0.0; 5], &[2, 3]).unwrap_err();
        assert!(matches!(err, BlockSparseError::Shape(ShapeError::ElementCount { .. })));
    }

    #[test]
    fn test_swap_axes_is_metadata_only() {
        let t = iota(&[2, 3]);
        let swapped = t.clone().swap_axes(0, 1).unwrap();
        assert_eq!(swapped.shape(), &[3, 2]);
        assert_eq!(swapped.storage(), t.storage());
        assert!(!swapped.is_contiguous());
        assert_eq!(swapped.get(&[2, 1]), t.get(&[1, 2]));
        assert_eq!(swapped.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_double_swap_restores_layout() {
        let t = iota(&[2, 3, 4, 5]);
        let back = t.clone().swap_axes(2, 3).unwrap().swap_axes(2, 3).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_swap_axes_out_of_range() {
        assert!(iota(&[2, 2]).swap_axes(0, 2).is_err());
    }

    #[test]
    fn test_permute_matches_manual_indexing() {
        let t = iota(&[2, 3, 4]);
        let p = t.clone().permute(&[2, 0, 1]).unwrap();
        assert_eq!(p.shape(), &[4, 2, 3]);
        for a in 0..2 {
            for b in 0..3 {
                for c in 0..4 {
                    assert_eq!(p.get(&[c, a, b]), t.get(&[a, b, c]));
                }
            }
        }
    }

    #[test]
    fn test_permute_rejects_non_permutation() {
        assert!(iota(&[2, 3]).permute(&[0, 0]).is_err());
        assert!(iota(&[2, 3]).permute(&[0]).is_err());
        assert!(iota(&[2, 3]).permute(&[0, 2]).is_err());
    }

    #[test]
    fn test_to_contiguous_of_transposed_view() {
        let t = iota(&[2, 3]).swap_axes(0, 1).unwrap();
        let c = t.to_contiguous();
        assert!(c.is_contiguous());
        assert_eq!(c.as_slice().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_unit_axes_do_not_break_contiguity() {
        let t = iota(&[1, 1, 1, 1]).swap_axes(2, 3).unwrap();
        assert!(t.is_contiguous());
    }

    #[test]
    fn test_add_at_accumulates() {
        let mut t = Tensor::zeros(&[2, 2]);
        t.add_at(&[1, 0], 1.5);
        t.add_at(&[1, 0], 2.0);
        assert_eq!(t.get(&[1, 0]), 3.5);
    }

    #[test]
    fn test_add_row_major_into_strided_view() {
        let mut t = Tensor::zeros(&[2, 3]).swap_axes(0, 1).unwrap();
        t.add_row_major(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(t.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.get(&[2, 1]), 6.0);
        assert!(t.add_row_major(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_dims_rank_checks() {
        let t = iota(&[2, 3, 4]);
        assert_eq!(t.dims3("h").unwrap(), [2, 3, 4]);
        let err = t.dims4("w").unwrap_err();
        assert_eq!(
            err,
            BlockSparseError::Shape(ShapeError::RankMismatch {
                operand: "w",
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_index_matrix_rows() {
        let m = IndexMatrix::from_rows(&[vec![3, 1], vec![0, 0]]).unwrap();
        assert_eq!(m.shape(), [2, 2]);
        assert_eq!(m.row(1), &[0, 0]);
        assert_eq!(m.get(0, 0), 3);
    }

    #[test]
    fn test_index_matrix_rejects_ragged_rows() {
        assert!(IndexMatrix::from_rows(&[vec![1, 2], vec![3]]).is_err());
        assert!(IndexMatrix::from_vec(vec![1, 2, 3], 2, 2).is_err());
    }
}
