//! Shared test utilities for the block-sparse crates
//!
//! - [`fixtures`]: seeded random problems shaped like real gemv/outer calls
//! - [`tolerance`]: element-wise closeness assertions on [`Tensor`]s
//! - [`gradcheck`]: finite-difference gradients along a random projection
//! - [`env_guard`]: scoped `BLOCKSPARSE_*` overrides for config tests
//!
//! [`Tensor`]: blocksparse_common::Tensor

pub mod env_guard;
pub mod fixtures;
pub mod gradcheck;
pub mod tolerance;

pub use env_guard::EnvGuard;
pub use fixtures::{GemvProblem, GemvSizes, OuterProblem, randn, randn_tensor, seeded_rng};
pub use gradcheck::{GradCheck, numeric_grad};
pub use tolerance::{assert_allclose, max_abs_diff};
