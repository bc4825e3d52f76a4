//! Range-only estimate for frames without calibration.
//!
//! Without intrinsics no pixel can be placed in 3D, so the whole frame is
//! reduced to one point straight ahead at the median valid depth.

use crate::bridge::DepthMap;
use crate::perception::{Obstacle, PerceptionError, Result};

/// Median of the non-zero samples of `depth`, or `None` when there are none.
///
/// For an even count the upper of the two middle samples is returned, so the
/// result is always an observed depth.
pub fn median_depth(depth: &DepthMap) -> Option<u16> {
    let mut samples: Vec<u16> = depth.valid_samples().collect();
    if samples.is_empty() {
        return None;
    }
    let mid = samples.len() / 2;
    let (_, median, _) = samples.select_nth_unstable(mid);
    Some(*median)
}

/// One point obstacle at `(0, 0, median_depth)`.
///
/// Fails with [`PerceptionError::EmptyInput`] if every sample is zero.
pub fn estimate_without_intrinsics(depth: &DepthMap) -> Result<Obstacle> {
    let median = median_depth(depth).ok_or_else(|| {
        PerceptionError::EmptyInput(format!(
            "depth map {}x{} has no valid samples",
            depth.width(),
            depth.height()
        ))
    })?;
    Ok(Obstacle::at_depth(f64::from(median)))
}
