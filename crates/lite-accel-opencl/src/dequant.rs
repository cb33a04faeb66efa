//! Restoring quantized weights to floating point for a kernel execution.
//!
//! A kernel whose weights were stored as int8/int16 by the converter expands
//! them to `f16`/`f32` right before it runs and drops the expanded copy right
//! after. The quantized payload is moved aside while the copy is installed
//! and moved back on release, so its allocation is never freed or cloned.

use crate::error::{OpenClError, Result};
use half::f16;
use lite_accel_common::{Precision, QuantParam, TensorData, WeightTensor};
use tracing::debug;

/// Whether `tensor` carries initialized quantization parameters and data.
pub fn needs_dequant(tensor: &WeightTensor) -> bool {
    tensor.quant_params().first().is_some_and(|p| p.inited) && tensor.data().is_some()
}

/// Expand the quantized payload of `tensor` to `precision`.
///
/// Returns `Ok(None)` when there is nothing to do: no initialized quant
/// params, no data, or a source type other than int8/int16.
pub fn dequantize_data(tensor: &WeightTensor, precision: Precision) -> Result<Option<TensorData>> {
    dequantize_data_limited(tensor, precision, usize::MAX)
}

/// Like [`dequantize_data`], but refuses to allocate a restored buffer of
/// more than `max_elements` elements.
pub fn dequantize_data_limited(
    tensor: &WeightTensor,
    precision: Precision,
    max_elements: usize,
) -> Result<Option<TensorData>> {
    if !needs_dequant(tensor) {
        return Ok(None);
    }
    let params = tensor.quant_params();
    let restored = match tensor.data() {
        Some(TensorData::I8(q)) => expand(q, params, precision, max_elements)?,
        Some(TensorData::I16(q)) => expand(q, params, precision, max_elements)?,
        _ => return Ok(None),
    };
    Ok(Some(restored))
}

fn expand<Q>(
    quantized: &[Q],
    params: &[QuantParam],
    precision: Precision,
    max_elements: usize,
) -> Result<TensorData>
where
    Q: Copy + Into<i32>,
{
    let elements = quantized.len();
    let channels = params.len();
    if channels > 1 && elements % channels != 0 {
        return Err(OpenClError::DequantShapeMismatch { elements, channels });
    }
    // One param per outermost channel; a single param covers everything.
    let per_channel = if channels > 1 { elements / channels } else { elements.max(1) };
    let value = |i: usize| {
        params[(i / per_channel).min(channels - 1)].dequantize(quantized[i].into())
    };

    match precision {
        Precision::F32 => {
            let mut out = try_alloc::<f32>(elements, precision, max_elements)?;
            out.extend((0..elements).map(value));
            Ok(TensorData::F32(out))
        }
        Precision::F16 => {
            let mut out = try_alloc::<f16>(elements, precision, max_elements)?;
            out.extend((0..elements).map(|i| f16::from_f32(value(i))));
            Ok(TensorData::F16(out))
        }
    }
}

fn try_alloc<T>(elements: usize, target: Precision, max_elements: usize) -> Result<Vec<T>> {
    if elements > max_elements {
        return Err(OpenClError::DequantAllocation { elements, target });
    }
    let mut out = Vec::new();
    out.try_reserve_exact(elements)
        .map_err(|_| OpenClError::DequantAllocation { elements, target })?;
    Ok(out)
}

/// Per-kernel dequantization bookkeeping.
#[derive(Debug)]
pub struct DequantState {
    dequantized: bool,
    original: Option<TensorData>,
    max_elements: usize,
}

impl Default for DequantState {
    fn default() -> Self {
        Self { dequantized: false, original: None, max_elements: usize::MAX }
    }
}

impl DequantState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the size of restored buffers this state will allocate.
    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Whether a restored buffer is currently installed.
    pub fn is_dequantized(&self) -> bool {
        self.dequantized
    }

    /// The quantized payload held aside while the restored copy is installed.
    pub fn original(&self) -> Option<&TensorData> {
        self.original.as_ref()
    }

    /// Install a restored floating-point copy of `tensor`'s weights.
    ///
    /// Returns whether a copy was installed. Calling again while a copy is
    /// installed is a no-op.
    pub fn dequantize(&mut self, tensor: &mut WeightTensor, precision: Precision) -> Result<bool> {
        if self.dequantized {
            return Ok(true);
        }
        let Some(restored) = dequantize_data_limited(tensor, precision, self.max_elements)? else {
            return Ok(false);
        };
        debug!(
            tensor = tensor.name(),
            from = %tensor.data_type(),
            to = %precision,
            elements = restored.len(),
            bytes = restored.len() * precision.size_of(),
            "dequantized weight"
        );
        self.original = tensor.set_data(restored);
        self.dequantized = true;
        Ok(true)
    }

    /// Drop the restored copy and put the quantized payload back.
    /// Does nothing unless [`dequantize`](Self::dequantize) installed a copy.
    pub fn release(&mut self, tensor: &mut WeightTensor) {
        if !self.dequantized {
            return;
        }
        self.dequantized = false;
        match self.original.take() {
            Some(original) => {
                tensor.set_data(original);
            }
            None => {
                tensor.take_data();
            }
        }
        debug!(tensor = tensor.name(), "released dequantized weight");
    }
}

/// Keeps a restored weight installed for its lifetime and releases it on
/// drop, including on early returns and unwinding.
#[derive(Debug)]
pub struct DequantScope<'a> {
    state: &'a mut DequantState,
    tensor: &'a mut WeightTensor,
}

impl<'a> DequantScope<'a> {
    pub fn acquire(
        state: &'a mut DequantState,
        tensor: &'a mut WeightTensor,
        precision: Precision,
    ) -> Result<Self> {
        state.dequantize(tensor, precision)?;
        Ok(Self { state, tensor })
    }

    pub fn tensor(&self) -> &WeightTensor {
        &*self.tensor
    }

    pub fn is_dequantized(&self) -> bool {
        self.state.is_dequantized()
    }
}

impl Drop for DequantScope<'_> {
    fn drop(&mut self) {
        self.state.release(self.tensor);
    }
}
