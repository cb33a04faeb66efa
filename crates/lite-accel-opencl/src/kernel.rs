//! A kernel instance: one compiled OpenCL kernel, its iteration space and
//! the launch geometry currently committed for it.

use crate::candidates::{TuningCandidate, generate_tuning_params};
use crate::dequant::{DequantScope, DequantState};
use crate::device_capabilities::DeviceLimits;
use crate::dispatcher::DeviceDispatcher;
use crate::error::{OpenClError, Result, RunError};
use crate::image::{GpuTensorInfo, ImageSize};
use crate::profiling::{ProfilingEvent, ms_to_duration};
use crate::work_size::ExecutionPlan;
use lite_accel_common::{OperatorKind, Precision, TuneConfig, WeightTensor};
use log::debug;
use std::fmt;
use std::time::Duration;

pub struct OpenClKernel<D: DeviceDispatcher> {
    name: String,
    op: OperatorKind,
    dispatcher: D,
    global_size: Vec<usize>,
    /// Baseline local size chosen by the operator, used absent tuning.
    local_size: Vec<usize>,
    plan: Option<ExecutionPlan>,
    tuned: Option<TuningCandidate>,
    last_event: Option<ProfilingEvent>,
    output_shapes: Vec<Vec<usize>>,
    precision: Precision,
    dequant: DequantState,
}

impl<D: DeviceDispatcher> fmt::Debug for OpenClKernel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenClKernel")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("device", &self.dispatcher.device_name())
            .field("global_size", &self.global_size)
            .field("local_size", &self.local_size)
            .field("plan", &self.plan)
            .field("tuned", &self.tuned)
            .field("precision", &self.precision)
            .finish()
    }
}

impl<D: DeviceDispatcher> OpenClKernel<D> {
    pub fn new(name: impl Into<String>, op: OperatorKind, dispatcher: D) -> Self {
        Self {
            name: name.into(),
            op,
            dispatcher,
            global_size: Vec::new(),
            local_size: Vec::new(),
            plan: None,
            tuned: None,
            last_event: None,
            output_shapes: Vec::new(),
            precision: Precision::F32,
            dequant: DequantState::new(),
        }
    }

    /// A kernel whose execution precision follows `config.fp16_enabled`.
    pub fn from_config(
        name: impl Into<String>,
        op: OperatorKind,
        dispatcher: D,
        config: &TuneConfig,
    ) -> Self {
        Self::new(name, op, dispatcher).with_precision(config.precision())
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Precision of output images and restored weights.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn with_output_shapes(mut self, shapes: Vec<Vec<usize>>) -> Self {
        self.output_shapes = shapes;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> OperatorKind {
        self.op
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn global_size(&self) -> &[usize] {
        &self.global_size
    }

    pub fn local_size(&self) -> &[usize] {
        &self.local_size
    }

    pub fn baseline(&self) -> TuningCandidate {
        TuningCandidate::new(self.local_size.clone())
    }

    /// The committed plan, if any.
    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Local size committed by tuning, cleared by a reshape.
    pub fn tuned_param(&self) -> Option<&TuningCandidate> {
        self.tuned.as_ref()
    }

    pub fn is_tuned(&self) -> bool {
        self.tuned.is_some()
    }

    pub fn dequant_state(&self) -> &DequantState {
        &self.dequant
    }

    /// Set the iteration space and baseline local size, e.g. after shape
    /// inference or a resize. Any previously committed plan is replaced.
    pub fn set_global_local(&mut self, global: Vec<usize>, local: Vec<usize>) -> Result<()> {
        let plan = self.dispatcher.align(&global, &local)?;
        debug!("{}: set {}", self.name, plan);
        self.global_size = global;
        self.local_size = local;
        self.plan = Some(plan);
        self.tuned = None;
        Ok(())
    }

    pub fn set_output_shapes(&mut self, shapes: Vec<Vec<usize>>) {
        self.output_shapes = shapes;
    }

    /// Candidate local sizes for this kernel; the baseline comes first.
    pub fn generate_tuning_params(&self, limits: &DeviceLimits) -> Result<Vec<TuningCandidate>> {
        generate_tuning_params(&self.global_size, &self.baseline(), limits)
    }

    /// Align the global size to `param` and make it the current plan.
    pub fn assign_tuning_param(&mut self, param: &TuningCandidate) -> Result<()> {
        let local = param.truncated(self.global_size.len());
        self.plan = Some(self.dispatcher.align(&self.global_size, local)?);
        Ok(())
    }

    /// Assign `param` and keep it for every later run.
    pub fn commit_tuned(&mut self, param: TuningCandidate) -> Result<()> {
        self.assign_tuning_param(&param)?;
        self.tuned = Some(param);
        Ok(())
    }

    fn current_plan(&mut self) -> Result<ExecutionPlan> {
        if let Some(plan) = &self.plan {
            return Ok(plan.clone());
        }
        let plan = self.dispatcher.align(&self.global_size, &self.local_size)?;
        self.plan = Some(plan.clone());
        Ok(plan)
    }

    /// Launch with the committed plan.
    pub fn run(&mut self) -> Result<()> {
        let plan = self.current_plan()?;
        self.launch(&plan)?;
        Ok(())
    }

    /// Launch `plan` once and return its measured device time.
    pub fn run_plan(&mut self, plan: &ExecutionPlan) -> std::result::Result<Duration, RunError> {
        self.launch(plan)?;
        Ok(ms_to_duration(self.profiling_time_ms()))
    }

    fn launch(&mut self, plan: &ExecutionPlan) -> std::result::Result<(), RunError> {
        self.last_event = None;
        let event = self.dispatcher.run(plan)?;
        self.last_event = Some(event);
        Ok(())
    }

    /// Device time of the last launch in milliseconds.
    pub fn profiling_time_ms(&self) -> f64 {
        self.dispatcher.measure_ms(self.last_event.as_ref())
    }

    /// Image2D size of output `index` at the kernel's precision.
    pub fn output_image_size(&self, index: usize) -> Result<ImageSize> {
        let shape = self.output_shapes.get(index).ok_or(OpenClError::OutputIndexOutOfRange {
            index,
            count: self.output_shapes.len(),
        })?;
        Ok(GpuTensorInfo::from_shape(shape).image_size(self.precision))
    }

    /// Install weights restored to the kernel's precision, returning whether
    /// a copy was made. Pair with [`free_dequanted_weight`](Self::free_dequanted_weight).
    pub fn dequant_weight(&mut self, weight: &mut WeightTensor) -> Result<bool> {
        self.dequant.dequantize(weight, self.precision)
    }

    pub fn free_dequanted_weight(&mut self, weight: &mut WeightTensor) {
        self.dequant.release(weight);
    }

    /// Run `compute` with `weight` restored to the kernel's precision; the
    /// restored copy is dropped afterwards whether `compute` succeeds or not.
    pub fn run_with_dequantized_weight<R>(
        &mut self,
        weight: &mut WeightTensor,
        compute: impl FnOnce(&mut Self, &WeightTensor) -> Result<R>,
    ) -> Result<R> {
        let precision = self.precision;
        let mut state = std::mem::take(&mut self.dequant);
        let result = match DequantScope::acquire(&mut state, weight, precision) {
            Ok(scope) => compute(&mut *self, scope.tensor()),
            Err(e) => Err(e),
        };
        self.dequant = state;
        result
    }
}
