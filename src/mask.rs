//! Circular field-of-view mask.
//!
//! A rotating parallel-beam scan only ever samples the inscribed disk of
//! each slice; the square corners outside it collect reconstruction
//! artifacts. Masking them to zero is the last pipeline stage.

use ndarray::{Array3, Axis};

use crate::error::{ReconError, Result};

/// Zero every voxel farther than `ratio * (slice radius)` from the slice
/// centre, where the slice radius is half the smaller slice extent.
///
/// Takes the volume by value and returns it mutated, so ownership of the
/// masked result is explicit. `ratio` must lie in `(0, 1]`. Applying the
/// mask twice with the same ratio is a no-op the second time.
pub fn circ_mask(mut volume: Array3<f32>, ratio: f32) -> Result<Array3<f32>> {
    if !(ratio > 0.0 && ratio <= 1.0) {
        return Err(ReconError::InvalidRange(format!(
            "mask ratio {ratio} outside (0, 1]"
        )));
    }
    let (_, rows, cols) = volume.dim();
    let cy = (rows as f32 - 1.0) / 2.0;
    let cx = (cols as f32 - 1.0) / 2.0;
    let radius = ratio * (rows.min(cols) as f32 / 2.0);
    let r2 = radius * radius;

    for mut slice in volume.axis_iter_mut(Axis(0)) {
        for ((y, x), v) in slice.indexed_iter_mut() {
            let dy = y as f32 - cy;
            let dx = x as f32 - cx;
            if dy * dy + dx * dx > r2 {
                *v = 0.0;
            }
        }
    }
    Ok(volume)
}
