//! The device dispatch seam.
//!
//! A [`DeviceDispatcher`] is everything the tuner and kernels need from an
//! accelerator: its limits, a way to launch one prepared kernel with a given
//! geometry, and profiling timestamps for that launch. The real OpenCL
//! backend lives in [`backend`](crate::backend) behind the `opencl` feature;
//! [`MockDispatcher`](crate::mock::MockDispatcher) serves tests.

use crate::device_capabilities::DeviceLimits;
use crate::error::{Result, RunError};
use crate::profiling::{ProfilingEvent, ProfilingTimer};
use crate::work_size::{ExecutionPlan, align_global_local};

pub trait DeviceDispatcher {
    /// Device name, used in logs and as the tuning cache key.
    fn device_name(&self) -> &str;

    fn driver_version(&self) -> &str {
        ""
    }

    /// Work-group limits for the kernel this dispatcher launches.
    fn query_limits(&self) -> Result<DeviceLimits>;

    /// Whether launches carry usable profiling timestamps.
    fn profiling_enabled(&self) -> bool;

    /// Launch the kernel with `plan` and block until it completes.
    ///
    /// Must accept a different geometry on every call without recompiling.
    fn run(&mut self, plan: &ExecutionPlan) -> std::result::Result<ProfilingEvent, RunError>;

    fn align(&self, global: &[usize], local: &[usize]) -> Result<ExecutionPlan> {
        align_global_local(global, local)
    }

    fn measure_ms(&self, event: Option<&ProfilingEvent>) -> f64 {
        ProfilingTimer::new(self.profiling_enabled()).measure_ms(event)
    }
}

impl<D: DeviceDispatcher + ?Sized> DeviceDispatcher for Box<D> {
    fn device_name(&self) -> &str {
        (**self).device_name()
    }

    fn driver_version(&self) -> &str {
        (**self).driver_version()
    }

    fn query_limits(&self) -> Result<DeviceLimits> {
        (**self).query_limits()
    }

    fn profiling_enabled(&self) -> bool {
        (**self).profiling_enabled()
    }

    fn run(&mut self, plan: &ExecutionPlan) -> std::result::Result<ProfilingEvent, RunError> {
        (**self).run(plan)
    }

    fn align(&self, global: &[usize], local: &[usize]) -> Result<ExecutionPlan> {
        (**self).align(global, local)
    }

    fn measure_ms(&self, event: Option<&ProfilingEvent>) -> f64 {
        (**self).measure_ms(event)
    }
}
