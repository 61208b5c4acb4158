//! Rayon-backed CPU kernel.
//!
//! Writes never race on a shared cell:
//!
//! - **gemv / input gradient**: work is split by batch row. Each row owns a
//!   disjoint slice of the contiguous accumulator.
//! - **outer**: many `(b, i, j)` triples may target the same weight block, so
//!   each worker folds its batch rows into a private partial accumulator; the
//!   partials are reduced pairwise and added into `Acc` once.
//!
//! Small workloads and strided accumulators take the sequential path.

use std::sync::Arc;

use rayon::prelude::*;

use crate::BlockSparseProvider;
use crate::cpu::FallbackKernel;
use crate::cpu::block_ops::{gemv_batch_row, gemv_input_grad_row, outer_batch_row};
use blocksparse_common::{
    GemvDims, IndexMatrix, KernelConfig, OuterDims, Result, Tensor, row_major_strides,
};

/// Multi-threaded kernel.
pub struct ParallelKernel {
    pool: Option<Arc<rayon::ThreadPool>>,
    threshold: usize,
}

impl ParallelKernel {
    /// Use the global rayon pool.
    pub fn new(threshold: usize) -> Self {
        Self { pool: None, threshold }
    }

    /// Build from configuration, creating a dedicated pool when
    /// `num_threads` is set.
    pub fn from_config(config: &KernelConfig) -> Self {
        let pool = config.num_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("blocksparse-{i}"))
                .build()
                .map_err(|e| log::warn!("falling back to global rayon pool: {e}"))
                .ok()
                .map(Arc::new)
        });
        Self { pool, threshold: config.parallel_threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of worker threads that will run split work.
    pub fn num_threads(&self) -> usize {
        self.pool.as_ref().map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn splits(&self, mul_adds: usize, batch: usize) -> bool {
        batch > 1 && mul_adds >= self.threshold
    }
}

impl Default for ParallelKernel {
    fn default() -> Self {
        Self::from_config(&KernelConfig::default())
    }
}

impl BlockSparseProvider for ParallelKernel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn is_available(&self) -> bool {
        self.num_threads() > 0
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
        if !self.splits(dims.mul_adds(), dims.batch) {
            return FallbackKernel.gemv(o, w, h, i_idx, o_idx, dims);
        }
        let row_len = dims.output_window * dims.output_size;
        let Some(data) = o.as_mut_slice() else {
            log::debug!("gemv accumulator is strided; running sequentially");
            return FallbackKernel.gemv(o, w, h, i_idx, o_idx, dims);
        };
        if row_len == 0 {
            return Ok(());
        }
        self.install(|| {
            data.par_chunks_mut(row_len).enumerate().for_each(|(b, row)| {
                gemv_batch_row(row, [dims.output_size, 1], w, h, i_idx, o_idx, b, dims);
            });
        });
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
        if !self.splits(dims.mul_adds(), dims.batch) {
            return FallbackKernel.outer(acc, x, y, x_idx, y_idx, dims);
        }
        let shape = dims.acc_shape();
        let len: usize = shape.iter().product();
        let strides: [usize; 4] = {
            let s = row_major_strides(&shape);
            [s[0], s[1], s[2], s[3]]
        };

        let partial = self.install(|| {
            (0..dims.batch)
                .into_par_iter()
                .fold(
                    || vec![0.0f32; len],
                    |mut buf, b| {
                        outer_batch_row(&mut buf, strides, x, y, x_idx, y_idx, b, dims);
                        buf
                    },
                )
                .reduce(
                    || vec![0.0f32; len],
                    |mut lhs, rhs| {
                        for (l, r) in lhs.iter_mut().zip(&rhs) {
                            *l += r;
                        }
                        lhs
                    },
                )
        });
        acc.add_row_major(&partial)
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
        if !self.splits(dims.mul_adds(), dims.batch) {
            return FallbackKernel.gemv_input_grad(grad_h, grad_o, w, i_idx, o_idx, dims);
        }
        let row_len = dims.input_window * dims.input_size;
        let Some(data) = grad_h.as_mut_slice() else {
            return FallbackKernel.gemv_input_grad(grad_h, grad_o, w, i_idx, o_idx, dims);
        };
        if row_len == 0 {
            return Ok(());
        }
        self.install(|| {
            data.par_chunks_mut(row_len).enumerate().for_each(|(b, row)| {
                gemv_input_grad_row(row, [dims.input_size, 1], grad_o, w, i_idx, o_idx, b, dims);
            });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksparse_common::{validate_gemv, validate_outer};

    fn ramp(shape: &[usize], scale: f32) -> Tensor {
        Tensor::from_fn(shape, |idx| {
            idx.iter().enumerate().map(|(a, &i)| ((a + 1) * (i + 1)) as f32).sum::<f32>() * scale
        })
    }

    #[test]
    fn test_gemv_matches_fallback_bitwise() {
        let w = ramp(&[3, 2, 4, 5], 0.01);
        let h = ramp(&[6, 2, 4], 0.1);
        let i_idx = IndexMatrix::from_rows(&[[0, 2], [1, 1], [2, 0], [0, 0], [1, 2], [2, 2]]).unwrap();
        let o_idx = IndexMatrix::from_rows(&[[1], [0], [1], [1], [0], [0]]).unwrap();
        let mut o_seq = ramp(&[6, 1, 5], 1.0);
        let mut o_par = o_seq.clone();
        let dims = validate_gemv(&o_seq, &w, &h, &i_idx, &o_idx).unwrap();

        FallbackKernel.gemv(&mut o_seq, &w, &h, &i_idx, &o_idx, &dims).unwrap();
        ParallelKernel::new(0).gemv(&mut o_par, &w, &h, &i_idx, &o_idx, &dims).unwrap();

        assert_eq!(o_par, o_seq);
    }

    #[test]
    fn test_outer_heavy_collisions_match_fallback() {
        let x = ramp(&[16, 3, 2], 0.5);
        let y = ramp(&[16, 2, 3], 0.25);
        let x_idx = IndexMatrix::from_vec(vec![0; 48], 16, 3).unwrap();
        let y_idx = IndexMatrix::from_vec(vec![1; 32], 16, 2).unwrap();
        let mut acc_seq = Tensor::zeros(&[2, 2, 2, 3]);
        let mut acc_par = acc_seq.clone();
        let dims = validate_outer(&acc_seq, &x, &y, &x_idx, &y_idx).unwrap();

        FallbackKernel.outer(&mut acc_seq, &x, &y, &x_idx, &y_idx, &dims).unwrap();
        ParallelKernel::new(0).outer(&mut acc_par, &x, &y, &x_idx, &y_idx, &dims).unwrap();

        for (p, s) in acc_par.to_vec().iter().zip(acc_seq.to_vec()) {
            assert!((p - s).abs() <= 1e-4 * s.abs().max(1.0), "{p} vs {s}");
        }
        // Only the (0, 1) block was addressed.
        assert!(acc_par.get(&[0, 1, 1, 2]) > 0.0);
        assert_eq!(acc_par.get(&[1, 0, 1, 2]), 0.0);
    }

    #[test]
    fn test_below_threshold_runs_sequentially() {
        let kernel = ParallelKernel::new(usize::MAX);
        assert!(!kernel.splits(1_000_000, 64));
        assert!(!ParallelKernel::new(0).splits(10, 1));
        assert!(ParallelKernel::new(0).splits(10, 2));
    }

    #[test]
    fn test_dedicated_pool() {
        let config = KernelConfig { num_threads: Some(2), ..KernelConfig::default() };
        let kernel = ParallelKernel::from_config(&config);
        assert_eq!(kernel.num_threads(), 2);
        assert!(kernel.is_available());
    }
}
