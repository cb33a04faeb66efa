//! OpenCL device dispatcher via the `opencl3` crate.
//!
//! A [`ClDispatcher`] owns one context, one command queue and one built
//! kernel. Kernel arguments are bound once through [`ClDispatcher::kernel`];
//! every launch then only varies the NDRange, so the tuner can try many
//! local sizes against the same compiled kernel.

use crate::device_capabilities::{DeviceCapabilities, DeviceLimits, format_device_info};
use crate::dispatcher::DeviceDispatcher;
use crate::error::{OpenClError, Result, RunError};
use crate::profiling::ProfilingEvent;
use crate::work_size::ExecutionPlan;
use log::{debug, info};
use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_GPU, Device};
use opencl3::kernel::Kernel;
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::cl_uint;
use std::fmt;

pub struct ClDispatcher {
    device: Device,
    context: Context,
    queue: CommandQueue,
    _program: Program,
    kernel: Kernel,
    caps: DeviceCapabilities,
    profiling: bool,
}

impl fmt::Debug for ClDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClDispatcher")
            .field("device", &self.caps.name)
            .field("driver", &self.caps.driver_version)
            .field("profiling", &self.profiling)
            .finish()
    }
}

/// Query the capabilities of an OpenCL device.
pub fn query_capabilities(device: &Device) -> Result<DeviceCapabilities> {
    let dev_err = |what: &str, e: opencl3::error_codes::ClError| {
        OpenClError::Device(format!("Failed to query {what}: {e}"))
    };
    Ok(DeviceCapabilities {
        name: device.name().map_err(|e| dev_err("device name", e))?,
        vendor: device.vendor().map_err(|e| dev_err("vendor", e))?,
        driver_version: device.driver_version().map_err(|e| dev_err("driver version", e))?,
        compute_units: device.max_compute_units().map_err(|e| dev_err("compute units", e))?,
        global_memory_bytes: device.global_mem_size().map_err(|e| dev_err("global memory", e))?,
        local_memory_bytes: device.local_mem_size().map_err(|e| dev_err("local memory", e))?,
        max_work_group_size: device
            .max_work_group_size()
            .map_err(|e| dev_err("max work-group size", e))?,
        max_work_item_sizes: device
            .max_work_item_sizes()
            .map_err(|e| dev_err("max work-item sizes", e))?,
        supports_fp16: device.extensions().unwrap_or_default().contains("cl_khr_fp16"),
    })
}

impl ClDispatcher {
    /// Build `kernel_name` from `source` on the first GPU found.
    pub fn first_gpu(
        source: &str,
        kernel_name: &str,
        build_options: &str,
        profiling: bool,
    ) -> Result<Self> {
        let platforms = get_platforms()
            .map_err(|e| OpenClError::Device(format!("Failed to get OpenCL platforms: {e}")))?;

        for platform in &platforms {
            let ids = platform.get_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
            if let Some(&id) = ids.first() {
                return Self::build(Device::new(id), source, kernel_name, build_options, profiling);
            }
        }
        Err(OpenClError::Device("No OpenCL GPU device found".into()))
    }

    /// Create a context and queue on `device` and build `kernel_name`.
    pub fn build(
        device: Device,
        source: &str,
        kernel_name: &str,
        build_options: &str,
        profiling: bool,
    ) -> Result<Self> {
        let caps = query_capabilities(&device)?;
        info!("Selected OpenCL device: {} ({})", caps.name, caps.driver_version);
        debug!("\n{}", format_device_info(&caps));

        let context = Context::from_device(&device)
            .map_err(|e| OpenClError::Device(format!("Failed to create OpenCL context: {e}")))?;

        let properties = if profiling { CL_QUEUE_PROFILING_ENABLE } else { 0 };
        let queue = CommandQueue::create_default_with_properties(&context, properties, 0)
            .map_err(|e| OpenClError::Device(format!("Failed to create command queue: {e}")))?;

        let program = Program::create_and_build_from_source(&context, source, build_options)
            .map_err(|log| OpenClError::Device(format!("Program build failed: {log}")))?;
        let kernel = Kernel::create(&program, kernel_name)
            .map_err(|e| OpenClError::Device(format!("Kernel create '{kernel_name}': {e}")))?;
        debug!("Built kernel '{}' with options '{}'", kernel_name, build_options);

        Ok(Self { device, context, queue, _program: program, kernel, caps, profiling })
    }

    /// The built kernel; bind arguments with `Kernel::set_arg` before launching.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.caps
    }
}

fn run_error(what: &str, e: opencl3::error_codes::ClError) -> RunError {
    RunError::new(e.0, format!("{what}: {e}"))
}

impl DeviceDispatcher for ClDispatcher {
    fn device_name(&self) -> &str {
        &self.caps.name
    }

    fn driver_version(&self) -> &str {
        &self.caps.driver_version
    }

    fn query_limits(&self) -> Result<DeviceLimits> {
        let kernel_cap =
            self.kernel.get_work_group_size(self.device.id()).map_err(|e| {
                OpenClError::Device(format!("Failed to query kernel work-group size: {e}"))
            })?;
        Ok(self.caps.limits().with_kernel_cap(kernel_cap))
    }

    fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    fn run(&mut self, plan: &ExecutionPlan) -> std::result::Result<ProfilingEvent, RunError> {
        let global = plan.aligned_global();
        let local = plan.local_range().map(|r| r.as_vec());
        let local_ptr = local.as_ref().map_or(std::ptr::null(), |l| l.as_ptr());
        let work_dim = cl_uint::try_from(global.len())
            .map_err(|_| RunError::new(-53, format!("invalid work dimension {}", global.len())))?;

        // SAFETY: the arrays outlive the call and hold `work_dim` entries each;
        // arguments were bound on `self.kernel` before dispatch.
        let event = unsafe {
            self.queue.enqueue_nd_range_kernel(
                self.kernel.get(),
                work_dim,
                std::ptr::null(),
                global.as_ptr(),
                local_ptr,
                &[],
            )
        }
        .map_err(|e| run_error("Enqueue", e))?;

        event.wait().map_err(|e| run_error("Kernel wait", e))?;
        tracing::trace!(global = ?global, local = ?plan.local(), "kernel launch complete");

        if !self.profiling {
            return Ok(ProfilingEvent::default());
        }
        let start = event.profiling_command_start().map_err(|e| run_error("Profiling start", e))?;
        let end = event.profiling_command_end().map_err(|e| run_error("Profiling end", e))?;
        Ok(ProfilingEvent::new(start, end))
    }
}

// SAFETY: OpenCL handles may be used from any thread; the dispatcher is only
// ever driven through `&mut self`, so launches are serialized.
unsafe impl Send for ClDispatcher {}
