//! Error types for work-group alignment, tuning and dequantization.

use lite_accel_common::{ConfigError, Precision};
use std::fmt;

/// Failure of a single kernel dispatch, reported by a
/// [`DeviceDispatcher`](crate::dispatcher::DeviceDispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Backend status code (an OpenCL `cl_int` for the real device).
    pub code: i32,
    pub reason: String,
}

impl RunError {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel dispatch failed ({}): {}", self.code, self.reason)
    }
}

impl std::error::Error for RunError {}

/// Errors surfaced by the OpenCL dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum OpenClError {
    #[error("unsupported NDRange rank {rank}: only 1-3 dimensional launches are supported")]
    UnsupportedRank { rank: usize },

    #[error("global size {global} in dimension {dim} overflows when aligned to local size {local}")]
    GlobalSizeOverflow { dim: usize, global: usize, local: usize },

    #[error("cannot tune: global work size is empty")]
    EmptySearchSpace,

    #[error("baseline run of kernel '{kernel}' failed, no valid execution path")]
    BaselineFailed {
        kernel: String,
        #[source]
        source: RunError,
    },

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("failed to allocate {elements} {target} elements for dequantized weight")]
    DequantAllocation { elements: usize, target: Precision },

    #[error("weight has {elements} elements, not divisible into {channels} quantized channels")]
    DequantShapeMismatch { elements: usize, channels: usize },

    #[error("output tensor index {index} out of range ({count} outputs)")]
    OutputIndexOutOfRange { index: usize, count: usize },

    #[error("device error: {0}")]
    Device(String),

    #[error("tuning cache I/O error: {0}")]
    Cache(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, OpenClError>;
