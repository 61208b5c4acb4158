//! CPU kernel implementations

pub(crate) mod block_ops;
pub mod fallback;
pub mod parallel;

pub use fallback::FallbackKernel;
pub use parallel::ParallelKernel;
