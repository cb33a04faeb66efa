//! Device capability query and the work-group limits derived from it.
//!
//! [`DeviceCapabilities`] is the hardware profile a backend reports once per
//! device context. [`DeviceLimits`] is the read-only subset the tuner needs;
//! it is shared between all kernels on the device via [`SharedDeviceLimits`].

use std::fmt;
use std::sync::Arc;

/// Smallest work-group the tuner will try.
pub const MIN_WORKGROUP_SIZE: usize = 8;

// ── DeviceCapabilities ───────────────────────────────────────────────────────

/// Hardware profile for a single OpenCL device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Human-readable device name (e.g. "Mali-G78").
    pub name: String,
    pub vendor: String,
    pub driver_version: String,
    /// Number of compute units.
    pub compute_units: u32,
    /// Total global memory in bytes.
    pub global_memory_bytes: u64,
    /// Per-workgroup local memory in bytes.
    pub local_memory_bytes: u64,
    /// Maximum work-group size (work-items per group).
    pub max_work_group_size: usize,
    /// Maximum work-item sizes per dimension, as reported (usually 3 entries).
    pub max_work_item_sizes: Vec<usize>,
    pub supports_fp16: bool,
}

impl DeviceCapabilities {
    /// A mid-range mobile GPU profile for tests.
    pub fn mock() -> Self {
        Self {
            name: "Mock GPU Device".into(),
            vendor: "MockVendor".into(),
            driver_version: "1.0.0-mock".into(),
            compute_units: 16,
            global_memory_bytes: 4 * 1024 * 1024 * 1024,
            local_memory_bytes: 32 * 1024,
            max_work_group_size: 256,
            max_work_item_sizes: vec![256, 256, 256],
            supports_fp16: true,
        }
    }

    pub fn limits(&self) -> DeviceLimits {
        DeviceLimits::from_capabilities(self)
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Produce a human-readable summary of device capabilities.
pub fn format_device_info(caps: &DeviceCapabilities) -> String {
    [
        format!("Device:          {}", caps.name),
        format!("Vendor:          {}", caps.vendor),
        format!("Driver:          {}", caps.driver_version),
        format!("Compute units:   {}", caps.compute_units),
        format!("Global memory:   {}", format_bytes(caps.global_memory_bytes)),
        format!("Local memory:    {}", format_bytes(caps.local_memory_bytes)),
        format!("Max workgroup:   {}", caps.max_work_group_size),
        format!("Max work-items:  {:?}", caps.max_work_item_sizes),
        format!("FP16:            {}", caps.supports_fp16),
    ]
    .join("\n")
}

// ── DeviceLimits ─────────────────────────────────────────────────────────────

/// Work-group limits consulted by the tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Per-dimension maximum work-items `[x, y, z]`.
    pub max_work_items: [usize; 3],
    /// Maximum product of the local sizes.
    pub max_work_group_size: usize,
}

pub type SharedDeviceLimits = Arc<DeviceLimits>;

impl DeviceLimits {
    pub const fn new(max_work_items: [usize; 3], max_work_group_size: usize) -> Self {
        Self { max_work_items, max_work_group_size }
    }

    /// Missing dimensions in the reported sizes are treated as 1.
    pub fn from_capabilities(caps: &DeviceCapabilities) -> Self {
        let mut items = [1usize; 3];
        for (slot, &v) in items.iter_mut().zip(&caps.max_work_item_sizes) {
            *slot = v;
        }
        Self { max_work_items: items, max_work_group_size: caps.max_work_group_size }
    }

    /// Narrow the group size to what a compiled kernel supports
    /// (`CL_KERNEL_WORK_GROUP_SIZE`).
    pub fn with_kernel_cap(self, kernel_max_work_group_size: usize) -> Self {
        Self {
            max_work_group_size: self.max_work_group_size.min(kernel_max_work_group_size),
            ..self
        }
    }

    pub fn min_work_group_size(&self) -> usize {
        MIN_WORKGROUP_SIZE
    }

    /// Whether a local size `(x, y, z)` fits the device.
    pub fn admits(&self, x: usize, y: usize, z: usize) -> bool {
        let group = x.saturating_mul(y).saturating_mul(z);
        x <= self.max_work_items[0]
            && y <= self.max_work_items[1]
            && z <= self.max_work_items[2]
            && group <= self.max_work_group_size
            && group >= MIN_WORKGROUP_SIZE
    }

    pub fn shared(self) -> SharedDeviceLimits {
        Arc::new(self)
    }
}

impl fmt::Display for DeviceLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_work_items={:?} max_work_group_size={}",
            self.max_work_items, self.max_work_group_size
        )
    }
}
