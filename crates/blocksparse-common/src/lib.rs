//! Common types for block-sparse kernels
//!
//! This crate provides the foundational types shared by the kernel and test
//! crates: strided tensors, block index matrices, entry-point validation,
//! configuration, and error handling.

pub mod config;
pub mod error;
pub mod shape;
pub mod tensor;

pub use config::{BackendPreference, KernelConfig};
pub use error::*;
pub use shape::{
    GemvDims, OuterDims, check_indices, validate_dot, validate_gemv, validate_gemv_operands,
    validate_outer,
};
pub use tensor::{IndexMatrix, Tensor, row_major_strides};
