//! Weight tensor model shared by kernels.
//!
//! Only the parts a kernel needs are modelled: the shape, the quantization
//! parameters and an owned, type-tagged payload that can be swapped out.

use half::f16;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a tensor payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    UInt8,
    Float16,
    Float32,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_of(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::Float16 => 2,
            Self::Int32 | Self::Float32 => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::UInt8 => "uint8",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
        };
        f.write_str(s)
    }
}

/// Affine quantization parameters: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
    pub scale: f64,
    pub zero_point: i32,
    pub num_bits: u32,
    /// Set once the converter has filled in real values.
    pub inited: bool,
}

impl QuantParam {
    pub fn new(scale: f64, zero_point: i32) -> Self {
        Self { scale, zero_point, num_bits: 8, inited: true }
    }

    pub fn dequantize(&self, q: i32) -> f32 {
        ((f64::from(q) - f64::from(self.zero_point)) * self.scale) as f32
    }
}

/// Owned tensor payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl TensorData {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::I8(_) => DataType::Int8,
            Self::I16(_) => DataType::Int16,
            Self::I32(_) => DataType::Int32,
            Self::U8(_) => DataType::UInt8,
            Self::F16(_) => DataType::Float16,
            Self::F32(_) => DataType::Float32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the first element, for identity checks.
    pub fn as_ptr(&self) -> *const u8 {
        match self {
            Self::I8(v) => v.as_ptr().cast(),
            Self::I16(v) => v.as_ptr().cast(),
            Self::I32(v) => v.as_ptr().cast(),
            Self::U8(v) => v.as_ptr().cast(),
            Self::F16(v) => v.as_ptr().cast(),
            Self::F32(v) => v.as_ptr().cast(),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f16(&self) -> Option<&[f16]> {
        match self {
            Self::F16(v) => Some(v),
            _ => None,
        }
    }
}

/// A constant weight input of a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTensor {
    name: String,
    shape: Vec<usize>,
    data_type: DataType,
    quant_params: Vec<QuantParam>,
    data: Option<TensorData>,
}

impl WeightTensor {
    /// Create a tensor from its payload; the declared type follows the data.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: TensorData) -> Self {
        Self {
            name: name.into(),
            shape,
            data_type: data.data_type(),
            quant_params: Vec::new(),
            data: Some(data),
        }
    }

    /// A tensor with a declared type and no payload yet.
    pub fn empty(name: impl Into<String>, shape: Vec<usize>, data_type: DataType) -> Self {
        Self { name: name.into(), shape, data_type, quant_params: Vec::new(), data: None }
    }

    pub fn with_quant_params(mut self, params: Vec<QuantParam>) -> Self {
        self.quant_params = params;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements described by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element type of the current payload, or the declared type when empty.
    pub fn data_type(&self) -> DataType {
        self.data.as_ref().map_or(self.data_type, TensorData::data_type)
    }

    pub fn quant_params(&self) -> &[QuantParam] {
        &self.quant_params
    }

    pub fn data(&self) -> Option<&TensorData> {
        self.data.as_ref()
    }

    /// Install a new payload, returning the previous one.
    pub fn set_data(&mut self, data: TensorData) -> Option<TensorData> {
        self.data.replace(data)
    }

    pub fn take_data(&mut self) -> Option<TensorData> {
        self.data.take()
    }
}
