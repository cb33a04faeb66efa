//! In-memory dispatcher with scripted timings, for running the tuner and
//! kernels without GPU hardware.

use crate::device_capabilities::{DeviceCapabilities, DeviceLimits};
use crate::dispatcher::DeviceDispatcher;
use crate::error::{Result, RunError};
use crate::profiling::ProfilingEvent;
use crate::work_size::ExecutionPlan;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// `CL_INVALID_WORK_GROUP_SIZE`, reported for scripted failures.
pub const MOCK_FAILURE_CODE: i32 = -54;

type TimingFn = Box<dyn Fn(&ExecutionPlan) -> Duration + Send>;

/// A fake device. Each launch advances a virtual clock by the scripted
/// duration and reports it through a [`ProfilingEvent`].
pub struct MockDispatcher {
    caps: DeviceCapabilities,
    kernel_cap: Option<usize>,
    profiling: bool,
    timing: TimingFn,
    overrides: HashMap<Vec<usize>, Duration>,
    failing: HashSet<Vec<usize>>,
    fail_all: bool,
    clock_ns: u64,
    calls: Vec<ExecutionPlan>,
}

impl fmt::Debug for MockDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDispatcher")
            .field("device", &self.caps.name)
            .field("profiling", &self.profiling)
            .field("overrides", &self.overrides.len())
            .field("failing", &self.failing.len())
            .field("fail_all", &self.fail_all)
            .field("calls", &self.calls.len())
            .finish()
    }
}

impl MockDispatcher {
    /// Profiling on, every launch takes 1 ms.
    pub fn new(caps: DeviceCapabilities) -> Self {
        Self {
            caps,
            kernel_cap: None,
            profiling: true,
            timing: Box::new(|_| Duration::from_millis(1)),
            overrides: HashMap::new(),
            failing: HashSet::new(),
            fail_all: false,
            clock_ns: 0,
            calls: Vec::new(),
        }
    }

    /// A mock whose limits are exactly `limits`.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self::new(DeviceCapabilities {
            max_work_group_size: limits.max_work_group_size,
            max_work_item_sizes: limits.max_work_items.to_vec(),
            ..DeviceCapabilities::mock()
        })
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    /// Per-kernel work-group cap reported alongside the device limits.
    pub fn with_kernel_cap(mut self, cap: usize) -> Self {
        self.kernel_cap = Some(cap);
        self
    }

    /// Compute launch time from the plan.
    pub fn with_timing(mut self, f: impl Fn(&ExecutionPlan) -> Duration + Send + 'static) -> Self {
        self.timing = Box::new(f);
        self
    }

    /// Fixed launch time for one local size (as found in the plan).
    pub fn with_time_for(mut self, local: Vec<usize>, time: Duration) -> Self {
        self.overrides.insert(local, time);
        self
    }

    /// Launches with this local size fail.
    pub fn failing_for(mut self, local: Vec<usize>) -> Self {
        self.failing.insert(local);
        self
    }

    /// Every launch fails.
    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Plans launched so far, in order.
    pub fn calls(&self) -> &[ExecutionPlan] {
        &self.calls
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl DeviceDispatcher for MockDispatcher {
    fn device_name(&self) -> &str {
        &self.caps.name
    }

    fn driver_version(&self) -> &str {
        &self.caps.driver_version
    }

    fn query_limits(&self) -> Result<DeviceLimits> {
        let limits = self.caps.limits();
        Ok(match self.kernel_cap {
            Some(cap) => limits.with_kernel_cap(cap),
            None => limits,
        })
    }

    fn profiling_enabled(&self) -> bool {
        self.profiling
    }

    fn run(&mut self, plan: &ExecutionPlan) -> std::result::Result<ProfilingEvent, RunError> {
        self.calls.push(plan.clone());
        if self.fail_all || self.failing.contains(plan.local()) {
            return Err(RunError::new(
                MOCK_FAILURE_CODE,
                format!("scripted failure for local {:?}", plan.local()),
            ));
        }
        let elapsed = self
            .overrides
            .get(plan.local())
            .copied()
            .unwrap_or_else(|| (self.timing)(plan));
        let start = self.clock_ns;
        let end = start.saturating_add(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
        self.clock_ns = end;
        if !self.profiling {
            return Ok(ProfilingEvent::default());
        }
        Ok(ProfilingEvent::new(start, end))
    }
}
