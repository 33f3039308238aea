//! Rotation angle sequence for a uniform scan.

use ndarray::Array1;

use crate::error::{ReconError, Result};

/// Generate `count` rotation angles in radians, uniformly spaced over the
/// half-open interval `[start_deg, stop_deg)`.
///
/// The interval is half-open so a full 360 degree sweep does not repeat the
/// start angle as its last entry. Angles pair index-for-index with the
/// projections of a stack.
pub fn uniform_angles(count: usize, start_deg: f32, stop_deg: f32) -> Result<Array1<f32>> {
    if count < 2 {
        return Err(ReconError::InvalidRange(format!(
            "need at least 2 angles, got {count}"
        )));
    }
    if stop_deg <= start_deg {
        return Err(ReconError::InvalidRange(format!(
            "angular range [{start_deg}, {stop_deg}) is empty"
        )));
    }
    let start = start_deg.to_radians();
    let step = (stop_deg - start_deg).to_radians() / count as f32;
    Ok(Array1::from_iter(
        (0..count).map(|i| start + step * i as f32),
    ))
}
