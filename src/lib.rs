//! Parallel-beam tomographic reconstruction.
//!
//! This crate turns a stack of 2D X-ray projections taken at known rotation
//! angles into a 3D volume of reconstructed density. The pipeline is
//!
//! 1. flat-field normalization against the per-pixel mean projection,
//! 2. Beer-Lambert linearization (`-ln` of the normalized transmission),
//! 3. per-slice inversion of the Radon transform (Fourier gridding by
//!    default, classic filtered backprojection as the alternative),
//! 4. a circular field-of-view mask over the reconstructed slices.
//!
//! Reading projection images from disk, persisting the outputs and any
//! visualization live outside this crate; it consumes and produces plain
//! `ndarray` arrays. The normalized stack is returned alongside the volume
//! so callers can persist the intermediate as well.
//!
//! # Example
//!
//! ```
//! use ndarray::Array3;
//! use tomo_core::{run_pipeline, ReconConfig};
//!
//! // 8 projections of 4 rows by 16 detector columns
//! let stack = Array3::from_elem((8, 4, 16), 1.0f32);
//! let output = run_pipeline(&stack, &ReconConfig::default()).unwrap();
//! assert_eq!(output.normalized.dim(), (8, 4, 16));
//! assert_eq!(output.volume.dim(), (4, 16, 16));
//! ```

pub mod angles;
pub mod error;
pub mod filter;
pub mod mask;
pub mod preprocess;
pub mod recon;
pub mod volume;

use log::debug;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

pub use crate::angles::uniform_angles;
pub use crate::error::{ReconError, Result};
pub use crate::filter::{FilterKind, SinogramFilter};
pub use crate::mask::circ_mask;
pub use crate::preprocess::{minus_log, normalize, FLAT_EPS, TRANS_EPS};
pub use crate::recon::{reconstruct, Algorithm};
pub use crate::volume::stack_slices;

/// Configuration for one reconstruction run.
///
/// Angles are degrees at this surface (the core works in radians); the
/// projection count fixes the number of angles. `center` is the detector
/// column of the rotation axis, `None` meaning half the detector width.
/// No auto-calibration of the center is attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub start_deg: f32,
    pub stop_deg: f32,
    pub center: Option<f32>,
    pub algorithm: Algorithm,
    pub filter: FilterKind,
    pub mask_ratio: f32,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            start_deg: 0.0,
            stop_deg: 360.0,
            center: None,
            algorithm: Algorithm::Gridrec,
            filter: FilterKind::Ramp,
            mask_ratio: 0.95,
        }
    }
}

/// Both first-class outputs of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Flat-field normalized projections, shape `(angle, row, col)`.
    pub normalized: Array3<f32>,
    /// Reconstructed and masked volume, shape `(row, col, col)`.
    pub volume: Array3<f32>,
}

/// Run the whole pipeline on a raw projection stack.
///
/// Fails on the first stage that detects a problem; no partial results are
/// returned.
pub fn run_pipeline(stack: &Array3<f32>, config: &ReconConfig) -> Result<PipelineOutput> {
    let (n_angles, n_rows, n_cols) = stack.dim();
    let center = config.center.unwrap_or(n_cols as f32 / 2.0);
    if !center.is_finite() {
        return Err(ReconError::InvalidRange(format!(
            "center of rotation {center} is not finite"
        )));
    }

    debug!("normalizing {n_angles} projections of {n_rows}x{n_cols}");
    let normalized = preprocess::normalize(stack)?;
    let attenuation = preprocess::minus_log(&normalized);

    let angles = angles::uniform_angles(n_angles, config.start_deg, config.stop_deg)?;
    debug!(
        "reconstructing {n_rows} slices with {:?}/{:?}, center {center}",
        config.algorithm, config.filter
    );
    let volume = recon::reconstruct(&attenuation, &angles, center, config.algorithm, config.filter)?;

    debug!("masking volume at ratio {}", config.mask_ratio);
    let volume = mask::circ_mask(volume, config.mask_ratio)?;
    Ok(PipelineOutput { normalized, volume })
}
