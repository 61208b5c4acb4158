//! Seeded random problems for kernel tests and benches.

use blocksparse_common::{IndexMatrix, Tensor};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic generator used across the test suite.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// One standard-normal sample (Box-Muller).
pub fn randn<R: Rng>(rng: &mut R) -> f32 {
    // Shift to (0, 1] so ln never sees zero.
    let u1: f32 = 1.0 - rng.random::<f32>();
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Row-major tensor of standard-normal samples.
pub fn randn_tensor<R: Rng>(rng: &mut R, shape: &[usize]) -> Tensor {
    Tensor::from_fn(shape, |_| randn(rng))
}

/// Problem dimensions of a gemv/outer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemvSizes {
    pub n_input_blocks: usize,
    pub n_output_blocks: usize,
    pub input_size: usize,
    pub output_size: usize,
    pub input_window: usize,
    pub output_window: usize,
    pub batch: usize,
}

impl Default for GemvSizes {
    fn default() -> Self {
        Self {
            n_input_blocks: 8,
            n_output_blocks: 7,
            input_size: 6,
            output_size: 5,
            input_window: 4,
            output_window: 3,
            batch: 2,
        }
    }
}

impl GemvSizes {
    /// All dimensions one.
    pub fn unit() -> Self {
        Self {
            n_input_blocks: 1,
            n_output_blocks: 1,
            input_size: 1,
            output_size: 1,
            input_window: 1,
            output_window: 1,
            batch: 1,
        }
    }

    pub fn w_shape(&self) -> [usize; 4] {
        [self.n_input_blocks, self.n_output_blocks, self.input_size, self.output_size]
    }

    pub fn h_shape(&self) -> [usize; 3] {
        [self.batch, self.input_window, self.input_size]
    }

    pub fn o_shape(&self) -> [usize; 3] {
        [self.batch, self.output_window, self.output_size]
    }
}

/// Per-row distinct indices: the first `window` entries of a shuffled
/// `0..bound`.
pub fn distinct_indices<R: Rng>(
    rng: &mut R,
    batch: usize,
    window: usize,
    bound: usize,
) -> IndexMatrix {
    assert!(window <= bound, "window {window} exceeds block count {bound}");
    let mut data = Vec::with_capacity(batch * window);
    let mut pool: Vec<i32> = (0..bound as i32).collect();
    for _ in 0..batch {
        pool.shuffle(rng);
        data.extend_from_slice(&pool[..window]);
    }
    IndexMatrix::from_vec(data, batch, window).expect("batch * window entries")
}

/// Indices drawn uniformly from `0..bound`, repeats allowed.
pub fn indices_with_replacement<R: Rng>(
    rng: &mut R,
    batch: usize,
    window: usize,
    bound: usize,
) -> IndexMatrix {
    let data = (0..batch * window).map(|_| rng.random_range(0..bound as i32)).collect();
    IndexMatrix::from_vec(data, batch, window).expect("batch * window entries")
}

/// Operands of a gemv or dot call, plus a bias table for the latter.
#[derive(Debug, Clone)]
pub struct GemvProblem {
    pub o: Tensor,
    pub w: Tensor,
    pub h: Tensor,
    pub bias: Tensor,
    pub i_idx: IndexMatrix,
    pub o_idx: IndexMatrix,
}

impl GemvProblem {
    pub fn random<R: Rng>(rng: &mut R, sizes: &GemvSizes) -> Self {
        let o = randn_tensor(rng, &sizes.o_shape());
        let w = randn_tensor(rng, &sizes.w_shape());
        let h = randn_tensor(rng, &sizes.h_shape());
        let bias = randn_tensor(rng, &[sizes.n_output_blocks, sizes.output_size]);
        let i_idx = distinct_indices(rng, sizes.batch, sizes.input_window, sizes.n_input_blocks);
        let o_idx = distinct_indices(rng, sizes.batch, sizes.output_window, sizes.n_output_blocks);
        Self { o, w, h, bias, i_idx, o_idx }
    }
}

/// Operands of an outer-product accumulation.
#[derive(Debug, Clone)]
pub struct OuterProblem {
    pub acc: Tensor,
    pub x: Tensor,
    pub y: Tensor,
    pub x_idx: IndexMatrix,
    pub y_idx: IndexMatrix,
}

impl OuterProblem {
    /// `xIdx`/`yIdx` are drawn with replacement, so block collisions occur.
    pub fn random<R: Rng>(rng: &mut R, sizes: &GemvSizes) -> Self {
        let acc = randn_tensor(rng, &sizes.w_shape());
        let x = randn_tensor(rng, &sizes.h_shape());
        let y = randn_tensor(rng, &sizes.o_shape());
        let x_idx =
            indices_with_replacement(rng, sizes.batch, sizes.input_window, sizes.n_input_blocks);
        let y_idx =
            indices_with_replacement(rng, sizes.batch, sizes.output_window, sizes.n_output_blocks);
        Self { acc, x, y, x_idx, y_idx }
    }
}
