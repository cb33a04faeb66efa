//! Image2D geometry for tensors stored in the NHWC4 layout.
//!
//! Channels are packed four to a pixel (`slice = ceil(C / 4)`), so a tensor
//! becomes an image `W * slice` texels wide and `N * H` rows tall. Rows that
//! would exceed the device's image width fall back to one slice per texel
//! column.

use lite_accel_common::Precision;
use std::fmt;

/// Channels packed into one texel.
pub const C4NUM: usize = 4;

/// Widest image2d the runtime will allocate.
pub const MAX_IMAGE2D_WIDTH: usize = 65535;

/// `cl_channel_type` of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageChannelType {
    /// `CL_HALF_FLOAT`
    HalfFloat,
    /// `CL_FLOAT`
    Float,
}

impl ImageChannelType {
    pub fn for_precision(precision: Precision) -> Self {
        match precision {
            Precision::F16 => Self::HalfFloat,
            Precision::F32 => Self::Float,
        }
    }

    /// Bytes per texel (four channels).
    pub fn texel_bytes(self) -> usize {
        match self {
            Self::HalfFloat => 2 * C4NUM,
            Self::Float => 4 * C4NUM,
        }
    }
}

/// Width, height and channel type of an image2d.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
    pub channel_type: ImageChannelType,
}

impl ImageSize {
    pub fn row_pitch_bytes(&self) -> usize {
        self.width * self.channel_type.texel_bytes()
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {:?}", self.width, self.height, self.channel_type)
    }
}

/// NHWC view of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTensorInfo {
    pub n: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
    pub slice: usize,
}

impl GpuTensorInfo {
    /// Interpret `shape` as `[C]`, `[N, C]`, `[N, W, C]` or `[N, H, W, C]`.
    /// Leading dimensions beyond four fold into `N`.
    pub fn from_shape(shape: &[usize]) -> Self {
        let (n, h, w, c) = match *shape {
            [] => (1, 1, 1, 1),
            [c] => (1, 1, 1, c),
            [n, c] => (n, 1, 1, c),
            [n, w, c] => (n, 1, w, c),
            [.., h, w, c] => {
                let n = shape[..shape.len() - 3].iter().product();
                (n, h, w, c)
            }
        };
        Self { n, h, w, c, slice: c.div_ceil(C4NUM) }
    }

    pub fn image_size(&self, precision: Precision) -> ImageSize {
        let channel_type = ImageChannelType::for_precision(precision);
        let (width, height) = if self.w * self.slice <= MAX_IMAGE2D_WIDTH {
            (self.w * self.slice, self.n * self.h)
        } else {
            (self.slice, self.n * self.h * self.w)
        };
        ImageSize { width, height, channel_type }
    }
}
