//! Work-group candidate generation.

use crate::device_capabilities::DeviceLimits;
use crate::error::{OpenClError, Result};
use crate::work_size::MAX_WORK_DIM;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Largest small divisor considered for a dimension.
pub const MAX_SMALL_DIVISOR: usize = 16;

/// One trial work-group shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningCandidate {
    /// Local size per dimension; empty lets the device choose.
    pub local_size: Vec<usize>,
}

impl TuningCandidate {
    pub fn new(local_size: Vec<usize>) -> Self {
        Self { local_size }
    }

    /// Local size cut down to `rank` dimensions.
    pub fn truncated(&self, rank: usize) -> &[usize] {
        &self.local_size[..self.local_size.len().min(rank)]
    }
}

impl From<Vec<usize>> for TuningCandidate {
    fn from(local_size: Vec<usize>) -> Self {
        Self { local_size }
    }
}

impl fmt::Display for TuningCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local_size: {:?}", self.local_size)
    }
}

/// Local-size candidates for one global extent: every power of two up to
/// `extent`, plus every divisor of `extent` up to 16.
pub fn candidates_for_extent(extent: usize) -> BTreeSet<usize> {
    let mut set = BTreeSet::new();
    set.insert(1);

    let mut p = 1usize;
    while p <= extent {
        set.insert(p);
        match p.checked_mul(2) {
            Some(next) => p = next,
            None => break,
        }
    }
    for d in 1..=MAX_SMALL_DIVISOR.min(extent) {
        if extent % d == 0 {
            set.insert(d);
        }
    }
    set
}

/// Per-dimension candidate sets; dimensions past the problem rank are `{1}`.
pub fn candidate_sets(global: &[usize]) -> Result<[BTreeSet<usize>; MAX_WORK_DIM]> {
    if global.is_empty() {
        return Err(OpenClError::EmptySearchSpace);
    }
    if global.len() > MAX_WORK_DIM {
        return Err(OpenClError::UnsupportedRank { rank: global.len() });
    }
    Ok(std::array::from_fn(|i| match global.get(i) {
        Some(&extent) => candidates_for_extent(extent),
        None => BTreeSet::from([1]),
    }))
}

/// Local sizes worth timing for `global` on a device with `limits`.
///
/// The baseline comes first and is never filtered. The rest is the cross
/// product of [`candidate_sets`] in ascending x, y, z order, minus shapes
/// that exceed a per-dimension limit or the group size limit, or fall below
/// [`MIN_WORKGROUP_SIZE`](crate::device_capabilities::MIN_WORKGROUP_SIZE).
pub fn generate_tuning_params(
    global: &[usize],
    baseline: &TuningCandidate,
    limits: &DeviceLimits,
) -> Result<Vec<TuningCandidate>> {
    let [xs, ys, zs] = candidate_sets(global)?;

    let mut params = vec![baseline.clone()];
    for &x in xs.iter().filter(|&&x| x <= limits.max_work_items[0]) {
        for &y in ys.iter().filter(|&&y| y <= limits.max_work_items[1]) {
            for &z in &zs {
                if limits.admits(x, y, z) {
                    params.push(TuningCandidate::new(vec![x, y, z]));
                }
            }
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(set: BTreeSet<usize>) -> Vec<usize> {
        set.into_iter().collect()
    }

    #[test]
    fn extent_one() {
        assert_eq!(vec_of(candidates_for_extent(1)), vec![1]);
    }

    #[test]
    fn extent_zero_still_contains_one() {
        assert_eq!(vec_of(candidates_for_extent(0)), vec![1]);
    }

    #[test]
    fn extent_twelve_mixes_powers_and_divisors() {
        // powers: 1 2 4 8; divisors <= 16: 1 2 3 4 6 12
        assert_eq!(vec_of(candidates_for_extent(12)), vec![1, 2, 3, 4, 6, 8, 12]);
    }

    #[test]
    fn extent_1024() {
        let c = candidates_for_extent(1024);
        assert_eq!(vec_of(c), vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024]);
    }

    #[test]
    fn extent_prime() {
        assert_eq!(vec_of(candidates_for_extent(13)), vec![1, 2, 4, 8, 13]);
    }

    #[test]
    fn huge_extent_does_not_overflow() {
        let c = candidates_for_extent(usize::MAX);
        assert!(c.contains(&(1usize << (usize::BITS - 1))));
    }

    #[test]
    fn sets_pad_missing_dims() {
        let [x, y, z] = candidate_sets(&[4]).unwrap();
        assert_eq!(vec_of(x), vec![1, 2, 4]);
        assert_eq!(vec_of(y), vec![1]);
        assert_eq!(vec_of(z), vec![1]);
    }

    #[test]
    fn sets_reject_bad_rank() {
        assert!(matches!(candidate_sets(&[]), Err(OpenClError::EmptySearchSpace)));
        assert!(matches!(
            candidate_sets(&[1, 1, 1, 1]),
            Err(OpenClError::UnsupportedRank { rank: 4 })
        ));
    }

    #[test]
    fn baseline_is_first_and_unfiltered() {
        let limits = DeviceLimits::new([256, 256, 256], 256);
        let baseline = TuningCandidate::new(vec![2]);
        let params = generate_tuning_params(&[64], &baseline, &limits).unwrap();
        assert_eq!(params[0], baseline);
        let rest: Vec<_> = params[1..].iter().map(|p| p.local_size[0]).collect();
        assert_eq!(rest, vec![8, 16, 32, 64]);
    }

    #[test]
    fn cross_product_respects_limits() {
        let limits = DeviceLimits::new([16, 16, 1], 64);
        let params =
            generate_tuning_params(&[32, 32], &TuningCandidate::default(), &limits).unwrap();
        for p in &params[1..] {
            let [x, y, z] = [p.local_size[0], p.local_size[1], p.local_size[2]];
            assert!(x <= 16 && y <= 16 && z == 1);
            assert!((8..=64).contains(&(x * y * z)));
        }
        assert!(params.contains(&TuningCandidate::new(vec![8, 8, 1])));
        assert!(!params.contains(&TuningCandidate::new(vec![16, 8, 1])));
    }

    #[test]
    fn candidate_truncation() {
        let c = TuningCandidate::new(vec![4, 4, 1]);
        assert_eq!(c.truncated(2), &[4, 4]);
        assert_eq!(c.truncated(5), &[4, 4, 1]);
        assert_eq!(c.to_string(), "local_size: [4, 4, 1]");
    }
}
