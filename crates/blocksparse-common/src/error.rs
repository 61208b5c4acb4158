//! Error types for block-sparse kernels

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BlockSparseError>;

/// Top-level error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockSparseError {
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Shape and index validation failures.
///
/// Every variant names the offending operand so the caller can tell which
/// argument broke the contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{operand} must be {expected}-D, got {actual}-D")]
    RankMismatch { operand: &'static str, expected: usize, actual: usize },

    #[error("{operand} axis {axis} has size {actual}, expected {expected}")]
    DimMismatch { operand: &'static str, axis: usize, expected: usize, actual: usize },

    #[error("{operand}: shape {shape:?} requires {expected} elements, got {actual}")]
    ElementCount { operand: &'static str, shape: Vec<usize>, expected: usize, actual: usize },

    #[error("{operand}[{row}, {col}] = {index} is out of range for {bound} blocks")]
    IndexOutOfRange { operand: &'static str, row: usize, col: usize, index: i32, bound: usize },

    #[error("axis {axis} out of range for {ndim}-D tensor")]
    AxisOutOfRange { axis: usize, ndim: usize },

    #[error("axes {axes:?} do not form a permutation of 0..{ndim}")]
    NotPermutation { axes: Vec<usize>, ndim: usize },

    #[error("{operand} must be contiguous for this operation")]
    NotContiguous { operand: &'static str },
}

/// Kernel dispatch failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("No available kernel provider")]
    NoProvider,
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue { key: &'static str, value: String, reason: String },
}
