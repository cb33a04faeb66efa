//! Work-group auto-tuning.
//!
//! [`search`] times every admissible local size for a kernel's global size
//! and keeps the fastest. [`Autotuner`] puts the runtime gate, an optional
//! persistent cache and the kernel commit around it.

use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;

use crate::candidates::{TuningCandidate, candidate_sets, generate_tuning_params};
use crate::device_capabilities::DeviceLimits;
use crate::dispatcher::DeviceDispatcher;
use crate::error::{OpenClError, Result, RunError};
use crate::kernel::OpenClKernel;
use crate::tuning_cache::{CachedTuning, TuningCache};
use crate::work_size::{ExecutionPlan, align_global_local};
use lite_accel_common::{TuneConfig, TuneDecision, TuningMode};

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One timed (or failed) launch during a search.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub candidate: TuningCandidate,
    pub plan: ExecutionPlan,
    /// `None` when the launch failed.
    pub time: Option<Duration>,
}

/// Outcome of a completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningResult {
    pub best: TuningCandidate,
    pub plan: ExecutionPlan,
    pub time: Duration,
    /// Every launch in order; the baseline is first.
    pub trials: Vec<TrialRecord>,
    /// Cross-product shapes dropped for exceeding device limits.
    pub rejected: usize,
}

impl TuningResult {
    pub fn evaluated(&self) -> usize {
        self.trials.len()
    }

    pub fn failed(&self) -> usize {
        self.trials.iter().filter(|t| t.time.is_none()).count()
    }

    pub fn baseline_time(&self) -> Option<Duration> {
        self.trials.first().and_then(|t| t.time)
    }

    /// Whether something beat the baseline.
    pub fn improved(&self) -> bool {
        self.baseline_time().is_some_and(|t| self.time < t)
    }
}

/// Time `baseline` and every admissible local size for `global`, keeping
/// the strictly fastest (the earliest wins ties).
///
/// Trials run one after another; `run` must block until the launch has
/// finished and return its device time. A failed trial is logged and
/// skipped, but a failed baseline aborts with
/// [`OpenClError::BaselineFailed`].
pub fn search<F>(
    kernel_name: &str,
    global: &[usize],
    baseline: &TuningCandidate,
    limits: &DeviceLimits,
    mut run: F,
) -> Result<TuningResult>
where
    F: FnMut(&ExecutionPlan) -> std::result::Result<Duration, RunError>,
{
    let params = generate_tuning_params(global, baseline, limits)?;
    let cross_product: usize = candidate_sets(global)?.iter().map(|s| s.len()).product();
    let rejected = cross_product.saturating_sub(params.len() - 1);

    info!(
        "Tuning '{}' global {:?}: {} candidates ({} rejected by {})",
        kernel_name,
        global,
        params.len(),
        rejected,
        limits
    );

    let mut trials: Vec<TrialRecord> = Vec::with_capacity(params.len());
    let mut best: Option<(usize, Duration)> = None;

    for (i, candidate) in params.into_iter().enumerate() {
        let plan = align_global_local(global, candidate.truncated(global.len()))?;
        match run(&plan) {
            Ok(time) => {
                debug!("Tuning {} param ({}) exectime {:?}", kernel_name, candidate, time);
                if best.is_none_or(|(_, best_time)| time < best_time) {
                    best = Some((trials.len(), time));
                }
                trials.push(TrialRecord { candidate, plan, time: Some(time) });
            }
            Err(source) if i == 0 => {
                warn!("Tuning {} baseline ({}) failed: {}", kernel_name, candidate, source);
                return Err(OpenClError::BaselineFailed { kernel: kernel_name.to_owned(), source });
            }
            Err(e) => {
                warn!("Tuning {} failed for tuning param ({}): {}", kernel_name, candidate, e);
                trials.push(TrialRecord { candidate, plan, time: None });
            }
        }
    }

    // The baseline succeeded, so `best` is set.
    let (index, time) = best.ok_or(OpenClError::EmptySearchSpace)?;
    let winner = &trials[index];
    info!("Tuning {} result: param ({}) exectime {:?}", kernel_name, winner.candidate, time);

    Ok(TuningResult {
        best: winner.candidate.clone(),
        plan: winner.plan.clone(),
        time,
        trials,
        rejected,
    })
}

// ---------------------------------------------------------------------------
// Autotuner
// ---------------------------------------------------------------------------

/// What [`Autotuner::tune`] did for a kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum TuneOutcome {
    /// The gate said no; the kernel keeps its baseline local size.
    Skipped(TuneDecision),
    /// The kernel was already tuned for its current global size.
    AlreadyTuned(TuningCandidate),
    /// A cached result was committed without searching.
    CacheHit(TuningCandidate),
    /// A search ran and its winner was committed.
    Tuned(TuningResult),
    /// The baseline launch failed; nothing was committed.
    BaselineFailed(RunError),
}

impl TuneOutcome {
    /// The local size committed by this pass, if any.
    pub fn committed(&self) -> Option<&TuningCandidate> {
        match self {
            Self::AlreadyTuned(c) | Self::CacheHit(c) => Some(c),
            Self::Tuned(r) => Some(&r.best),
            Self::Skipped(_) | Self::BaselineFailed(_) => None,
        }
    }
}

/// Tunes kernels according to a [`TuneConfig`].
#[derive(Debug, Clone, Default)]
pub struct Autotuner {
    config: TuneConfig,
    cache_path: Option<PathBuf>,
    cache: TuningCache,
}

impl Autotuner {
    /// Create a tuner; loads the cache named in `config`, if any.
    pub fn new(config: TuneConfig) -> Self {
        let cache_path = config.cache_path.clone();
        let cache = cache_path.as_deref().map(TuningCache::load).unwrap_or_default();
        Self { config, cache_path, cache }
    }

    /// Set the path for the JSON cache file and load existing results.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        let p = path.into();
        self.cache = TuningCache::load(&p);
        self.cache_path = Some(p);
        self
    }

    /// Tuner configured from `LITE_ACCEL_OPENCL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(TuneConfig::from_env()?))
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    pub fn cache(&self) -> &TuningCache {
        &self.cache
    }

    /// Write the cache to its file, if one is configured.
    pub fn save_cache(&self) -> Result<()> {
        if let Some(path) = &self.cache_path {
            self.cache.save(path)?;
        }
        Ok(())
    }

    /// Tune `kernel` on first execution.
    ///
    /// Skips without launching anything when profiling is off or the mode
    /// excludes the kernel's operator. A failed baseline is reported as
    /// [`TuneOutcome::BaselineFailed`] and leaves the baseline plan in place;
    /// structural errors (empty or over-rank global size) propagate.
    pub fn tune<D: DeviceDispatcher>(
        &mut self,
        kernel: &mut OpenClKernel<D>,
    ) -> Result<TuneOutcome> {
        let decision = self.gate(kernel);
        if !decision.should_tune() {
            let wanted = self.config.tuning_mode != TuningMode::Disabled;
            if decision == TuneDecision::ProfilingDisabled && wanted {
                warn!(
                    "Tuning mode requires OpenCL runtime profiling; '{}' not tuned",
                    kernel.name()
                );
            }
            debug!("Skipping tuning of '{}': {:?}", kernel.name(), decision);
            return Ok(TuneOutcome::Skipped(decision));
        }

        if let Some(tuned) = kernel.tuned_param() {
            return Ok(TuneOutcome::AlreadyTuned(tuned.clone()));
        }

        let global = kernel.global_size().to_vec();
        if global.is_empty() {
            return Err(OpenClError::EmptySearchSpace);
        }

        let device = kernel.dispatcher().device_name().to_owned();
        let driver = kernel.dispatcher().driver_version().to_owned();
        let key = TuningCache::key(kernel.name(), &global);
        if let Some(cached) = self.cache.lookup(&device, &driver, &key) {
            let candidate = cached.candidate();
            info!("Tuning cache hit for '{}': ({})", key, candidate);
            kernel.commit_tuned(candidate.clone())?;
            return Ok(TuneOutcome::CacheHit(candidate));
        }

        let limits = kernel.dispatcher().query_limits()?;
        let baseline = kernel.baseline();
        let name = kernel.name().to_owned();
        let result = search(&name, &global, &baseline, &limits, |plan| kernel.run_plan(plan));

        match result {
            Ok(result) => {
                kernel.commit_tuned(result.best.clone())?;
                self.remember(&device, &driver, key, &result);
                Ok(TuneOutcome::Tuned(result))
            }
            Err(OpenClError::BaselineFailed { source, .. }) => {
                warn!("Cannot tune '{}', keeping baseline local size", name);
                kernel.assign_tuning_param(&baseline)?;
                Ok(TuneOutcome::BaselineFailed(source))
            }
            Err(e) => Err(e),
        }
    }

    fn gate<D: DeviceDispatcher>(&self, kernel: &OpenClKernel<D>) -> TuneDecision {
        if !kernel.dispatcher().profiling_enabled() {
            return TuneDecision::ProfilingDisabled;
        }
        self.config.tune_decision(kernel.op())
    }

    fn remember(&mut self, device: &str, driver: &str, key: String, result: &TuningResult) {
        let Some(path) = &self.cache_path else {
            return;
        };
        let entry = CachedTuning {
            local_size: result.best.local_size.clone(),
            time_ms: result.time.as_secs_f64() * 1e3,
        };
        self.cache.record(device, driver, key, entry);
        if let Err(e) = self.cache.save(path) {
            warn!("Failed to save tuning cache: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
