//! Common types for the lite-accel kernel runtime.
//!
//! This crate holds what the OpenCL dispatch engine shares with the
//! encompassing runtime: the tuning configuration, the operator kinds the
//! tuner gates on, and the weight tensor model consumed by dequantization.

pub mod config;
pub mod op;
pub mod tensor;

pub use config::{ConfigError, Precision, TuneConfig, TuneDecision, TuningMode};
pub use op::OperatorKind;
pub use tensor::{DataType, QuantParam, TensorData, WeightTensor};
