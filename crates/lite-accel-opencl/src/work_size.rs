//! Work-group geometry: aligning a global iteration space to a local size.
//!
//! [`align_global_local`] rounds each global dimension up to a multiple of
//! the matching local dimension and produces the concrete 1-D/2-D/3-D ranges
//! handed to the device dispatch call.

use crate::error::{OpenClError, Result};
use std::fmt;

/// Maximum NDRange rank supported by the dispatch path.
pub const MAX_WORK_DIM: usize = 3;

// ---------------------------------------------------------------------------
// NdRange
// ---------------------------------------------------------------------------

/// A concrete 1-, 2- or 3-dimensional launch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NdRange {
    One(usize),
    Two(usize, usize),
    Three(usize, usize, usize),
}

impl NdRange {
    /// Build a range from a slice of 1-3 extents.
    pub fn from_slice(dims: &[usize]) -> Result<Self> {
        match *dims {
            [x] => Ok(Self::One(x)),
            [x, y] => Ok(Self::Two(x, y)),
            [x, y, z] => Ok(Self::Three(x, y, z)),
            _ => Err(OpenClError::UnsupportedRank { rank: dims.len() }),
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            Self::One(..) => 1,
            Self::Two(..) => 2,
            Self::Three(..) => 3,
        }
    }

    /// Extents as a fixed array padded with 1.
    pub fn dims(&self) -> [usize; 3] {
        match *self {
            Self::One(x) => [x, 1, 1],
            Self::Two(x, y) => [x, y, 1],
            Self::Three(x, y, z) => [x, y, z],
        }
    }

    /// Extents without padding, as passed to `clEnqueueNDRangeKernel`.
    pub fn as_vec(&self) -> Vec<usize> {
        self.dims()[..self.rank()].to_vec()
    }

    pub fn volume(&self) -> usize {
        saturating_product(&self.dims())
    }
}

impl fmt::Display for NdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(x) => write!(f, "[{x}]"),
            Self::Two(x, y) => write!(f, "[{x}, {y}]"),
            Self::Three(x, y, z) => write!(f, "[{x}, {y}, {z}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// Aligned launch geometry derived from a global size and a local size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    requested: Vec<usize>,
    global: Vec<usize>,
    local: Vec<usize>,
}

impl ExecutionPlan {
    /// Global size as requested before alignment.
    pub fn requested_global(&self) -> &[usize] {
        &self.requested
    }

    /// Global size after rounding up to multiples of the local size.
    pub fn aligned_global(&self) -> &[usize] {
        &self.global
    }

    /// Local size (possibly empty, possibly shorter than the global rank).
    pub fn local(&self) -> &[usize] {
        &self.local
    }

    pub fn rank(&self) -> usize {
        self.global.len()
    }

    pub fn global_range(&self) -> NdRange {
        // `align_global_local` guarantees rank 1..=3.
        NdRange::from_slice(&self.global).unwrap_or(NdRange::One(0))
    }

    /// Local range, or `None` to let the device pick the work-group shape.
    ///
    /// Dimensions without a local value use 1.
    pub fn local_range(&self) -> Option<NdRange> {
        if self.local.is_empty() {
            return None;
        }
        let mut dims = [1usize; MAX_WORK_DIM];
        for (d, &l) in dims.iter_mut().zip(&self.local) {
            if l > 0 {
                *d = l;
            }
        }
        NdRange::from_slice(&dims[..self.rank()]).ok()
    }

    /// Work-items dispatched, padding included; saturates at `usize::MAX`.
    pub fn total_work_items(&self) -> usize {
        saturating_product(&self.global)
    }

    /// Work-groups dispatched; `None` when the device chooses the local size.
    pub fn total_work_groups(&self) -> Option<usize> {
        let local = self.local_range()?;
        Some(self.total_work_items() / local.volume().max(1))
    }

    /// Ratio of requested to dispatched work-items, in `(0.0, 1.0]`.
    pub fn efficiency(&self) -> f64 {
        let dispatched = self.total_work_items();
        if dispatched == 0 {
            return 1.0;
        }
        saturating_product(&self.requested) as f64 / dispatched as f64
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.local_range() {
            Some(local) => write!(f, "global={} local={}", self.global_range(), local),
            None => write!(f, "global={} local=null", self.global_range()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn saturating_product(dims: &[usize]) -> usize {
    dims.iter().fold(1usize, |acc, &d| acc.saturating_mul(d))
}

/// Round `value` up to the next multiple of `multiple`; `None` on overflow.
#[inline]
pub fn round_up(value: usize, multiple: usize) -> Option<usize> {
    if multiple == 0 {
        return Some(value);
    }
    value.div_ceil(multiple).checked_mul(multiple)
}

/// Align `global` to `local` and build the launch plan.
///
/// `local` longer than `global` is truncated; an empty `local` leaves the
/// global size untouched and yields a null local range. Zero local entries
/// count as undefined.
pub fn align_global_local(global: &[usize], local: &[usize]) -> Result<ExecutionPlan> {
    if global.is_empty() || global.len() > MAX_WORK_DIM {
        log::error!("Not supported NDRange rank {}", global.len());
        return Err(OpenClError::UnsupportedRank { rank: global.len() });
    }
    let local = &local[..local.len().min(global.len())];

    let mut aligned = global.to_vec();
    for (dim, (g, &l)) in aligned.iter_mut().zip(local).enumerate() {
        let value = *g;
        *g = round_up(value, l).ok_or_else(|| {
            log::error!("Global size {} in dim {} overflows when aligned to {}", value, dim, l);
            OpenClError::GlobalSizeOverflow { dim, global: value, local: l }
        })?;
    }
    log::trace!("align global {:?} local {:?} -> {:?}", global, local, aligned);

    Ok(ExecutionPlan { requested: global.to_vec(), global: aligned, local: local.to_vec() })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
