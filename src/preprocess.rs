//! Flat-field normalization and attenuation linearization.
//!
//! Raw projections carry the fixed illumination pattern of the source and
//! sensor. Dividing by a per-pixel reference (here: the mean over all
//! projection angles) removes it. After that, Beer-Lambert gives the
//! attenuation path integral as `-ln(I/I0)`, with I already relative to I0.

use log::warn;
use ndarray::{Array3, Axis};

use crate::error::{ReconError, Result};

/// Floor applied to flat-field reference pixels before division.
///
/// Real sensors have occasional zero-response pixels; substituting a small
/// positive floor keeps the pipeline usable on such data. Substitutions are
/// logged as warnings, never silent.
pub const FLAT_EPS: f32 = 1e-6;

/// Floor applied to normalized transmission values before taking `-ln`.
///
/// `-ln(0)` is infinite and `ln` of a negative value is NaN; clamping to
/// this floor trades exactness at near-opaque pixels for finite output.
pub const TRANS_EPS: f32 = 1e-6;

/// Flat-field correct a projection stack, shape `(angle, row, col)`.
///
/// The reference is the element-wise mean over the angle axis. Reference
/// pixels below [`FLAT_EPS`] are floored (with a warning); if every pixel of
/// the reference is below the floor the acquisition itself is unusable and
/// the call fails. The input is not mutated.
pub fn normalize(stack: &Array3<f32>) -> Result<Array3<f32>> {
    let n_angles = stack.len_of(Axis(0));
    if n_angles < 2 {
        return Err(ReconError::InvalidRange(format!(
            "need at least 2 projections, got {n_angles}"
        )));
    }
    if let Some(((angle, row, col), _)) = stack
        .indexed_iter()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(ReconError::InvalidInput {
            stage: "normalize",
            angle,
            row,
            col,
        });
    }

    let mut flat = stack
        .mean_axis(Axis(0))
        .ok_or_else(|| ReconError::InvalidRange("empty projection stack".into()))?;

    let mut floored = 0usize;
    flat.mapv_inplace(|v| {
        if v < FLAT_EPS {
            floored += 1;
            FLAT_EPS
        } else {
            v
        }
    });
    if floored == flat.len() {
        return Err(ReconError::DegenerateFlatField {
            total_pixels: flat.len(),
            floor: FLAT_EPS,
        });
    }
    if floored > 0 {
        warn!(
            "flat field: floored {floored} zero-response pixel(s) to {FLAT_EPS}"
        );
    }

    let mut out = stack.clone();
    for mut projection in out.axis_iter_mut(Axis(0)) {
        projection /= &flat;
    }
    Ok(out)
}

/// Convert normalized transmission into attenuation path integrals.
///
/// Applies `v <- -ln(max(v, TRANS_EPS))` element-wise. Clamped pixels are
/// counted and reported in a single warning.
pub fn minus_log(stack: &Array3<f32>) -> Array3<f32> {
    let mut clamped = 0usize;
    let out = stack.mapv(|v| {
        let t = if v < TRANS_EPS {
            clamped += 1;
            TRANS_EPS
        } else {
            v
        };
        -t.ln()
    });
    if clamped > 0 {
        warn!("minus_log: clamped {clamped} near-zero transmission value(s) to {TRANS_EPS}");
    }
    out
}
