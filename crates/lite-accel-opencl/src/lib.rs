//! OpenCL work-group tuning and dispatch engine.
//!
//! This crate provides:
//! - [`work_size`]: aligning a global size to a local size
//! - [`candidates`]: the local sizes worth timing for a global size
//! - [`autotuner`]: the timed search and the per-kernel tuning pass
//! - [`profiling`]: device time of a launch from its profiling event
//! - [`dequant`]: restoring quantized weights around a kernel execution
//! - [`kernel`]: a kernel instance tying the above together
//!
//! Launches go through the [`DeviceDispatcher`] trait. [`MockDispatcher`]
//! runs everything without hardware; the `opencl` feature adds a real
//! backend.

pub mod autotuner;
#[cfg(feature = "opencl")]
pub mod backend;
pub mod candidates;
pub mod dequant;
pub mod device_capabilities;
pub mod dispatcher;
pub mod error;
pub mod image;
pub mod kernel;
pub mod mock;
pub mod profiling;
pub mod tuning_cache;
pub mod work_size;

pub use autotuner::{Autotuner, TrialRecord, TuneOutcome, TuningResult, search};
#[cfg(feature = "opencl")]
pub use backend::ClDispatcher;
pub use candidates::{TuningCandidate, generate_tuning_params};
pub use dequant::{DequantScope, DequantState};
pub use device_capabilities::{DeviceCapabilities, DeviceLimits, MIN_WORKGROUP_SIZE};
pub use dispatcher::DeviceDispatcher;
pub use error::{OpenClError, Result, RunError};
pub use image::{GpuTensorInfo, ImageSize};
pub use kernel::OpenClKernel;
pub use mock::MockDispatcher;
pub use profiling::{MAX_PROFILING_TIME_MS, ProfilingEvent, ProfilingTimer};
pub use tuning_cache::TuningCache;
pub use work_size::{ExecutionPlan, NdRange, align_global_local};
