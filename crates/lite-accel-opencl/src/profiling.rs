//! Device-side kernel timing from profiling events.

use std::time::Duration;

/// Reported when no measurement is possible. Any real measurement is faster.
pub const MAX_PROFILING_TIME_MS: f64 = 10_000.0;

/// `CL_PROFILING_COMMAND_START` / `CL_PROFILING_COMMAND_END` of one dispatch,
/// in device nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilingEvent {
    pub command_start_ns: u64,
    pub command_end_ns: u64,
}

impl ProfilingEvent {
    pub const fn new(command_start_ns: u64, command_end_ns: u64) -> Self {
        Self { command_start_ns, command_end_ns }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.command_end_ns.saturating_sub(self.command_start_ns)
    }
}

/// Converts profiling events to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilingTimer {
    enabled: bool,
}

impl ProfilingTimer {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Elapsed device time of `event` in milliseconds, or
    /// [`MAX_PROFILING_TIME_MS`] when profiling is off or no event exists.
    pub fn measure_ms(&self, event: Option<&ProfilingEvent>) -> f64 {
        match event {
            Some(ev) if self.enabled => ev.elapsed_ns() as f64 * 1e-6,
            _ => MAX_PROFILING_TIME_MS,
        }
    }

    pub fn measure(&self, event: Option<&ProfilingEvent>) -> Duration {
        ms_to_duration(self.measure_ms(event))
    }
}

/// Milliseconds to a [`Duration`]; negative or non-finite values saturate.
pub fn ms_to_duration(ms: f64) -> Duration {
    let saturated = if ms > 0.0 { Duration::MAX } else { Duration::ZERO };
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(saturated)
}
