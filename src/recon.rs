//! Per-slice inversion of the Radon transform.
//!
//! Each row of the projection images, taken across all angles, forms one
//! parallel-beam sinogram and reconstructs into one slice of the output
//! volume. Slices are independent of each other, so they are fanned out
//! over a rayon worker pool; each worker owns its output slot and the
//! assembled volume is always in row order.
//!
//! Two inversion paths are provided. `Fbp` filters every angular profile
//! in the frequency domain and backprojects it across the slice grid.
//! `Gridrec` uses the Fourier slice theorem instead: the 1D spectra of the
//! profiles sample the slice's 2D spectrum along radial lines, so gathering
//! them onto a Cartesian frequency grid and inverting with a 2D FFT yields
//! the same image for a fraction of the arithmetic.

use std::f32::consts::PI;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2};
use rayon::prelude::*;
use rustfft::{num_complex::Complex32, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::filter::{fft_freq, window, FilterKind, SinogramFilter};
use crate::volume;

/// Selectable inversion algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Fourier gridding, the default.
    Gridrec,
    /// Classic filtered backprojection.
    Fbp,
}

impl FromStr for Algorithm {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gridrec" => Ok(Algorithm::Gridrec),
            "fbp" => Ok(Algorithm::Fbp),
            other => Err(ReconError::InvalidRange(format!(
                "unknown algorithm '{other}' (expected gridrec or fbp)"
            ))),
        }
    }
}

/// Reconstruct a volume from an attenuation stack, shape `(angle, row, col)`.
///
/// `angles` must pair index-for-index with the stack's angle axis and be
/// uniformly spaced (see [`crate::angles::uniform_angles`]). `center` is the
/// detector column of the rotation axis. Output shape is
/// `(row, col, col)`; the first failing slice aborts the whole call.
pub fn reconstruct(
    attenuation: &Array3<f32>,
    angles: &Array1<f32>,
    center: f32,
    algorithm: Algorithm,
    filter: FilterKind,
) -> Result<Array3<f32>> {
    let (n_angles, n_rows, n_cols) = attenuation.dim();
    if angles.len() != n_angles {
        return Err(ReconError::InsufficientAngles {
            angles: angles.len(),
            projections: n_angles,
        });
    }
    if n_angles < 2 {
        return Err(ReconError::InvalidRange(format!(
            "need at least 2 projections, got {n_angles}"
        )));
    }
    if n_rows == 0 || n_cols < 2 {
        return Err(ReconError::ShapeMismatch {
            stage: "reconstruct",
            expected: vec![n_angles, 1, 2],
            actual: vec![n_angles, n_rows, n_cols],
        });
    }
    if angles.windows(2).into_iter().any(|pair| pair[1] < pair[0]) {
        return Err(ReconError::InvalidRange(
            "angles must be monotonically non-decreasing".into(),
        ));
    }

    let slices = (0..n_rows)
        .into_par_iter()
        .map(|r| {
            let sinogram = attenuation.slice(s![.., r, ..]);
            let slice = match algorithm {
                Algorithm::Fbp => fbp_slice(sinogram, angles, center, filter),
                Algorithm::Gridrec => gridrec_slice(sinogram, angles, center, filter),
            };
            if slice.iter().any(|v| !v.is_finite()) {
                return Err(ReconError::Numerical { slice: r });
            }
            Ok(slice)
        })
        .collect::<Result<Vec<_>>>()?;

    volume::stack_slices(slices)
}

/// Quadrature weight for summing backprojections over the angle list.
///
/// For coverage of at least a half turn the Radon inversion integral runs
/// over `[0, pi)` and every direction is hit `range/pi` times, which folds
/// into a flat `pi/n` weight. Limited-angle scans just get their raw step.
fn angular_weight(angles: &Array1<f32>) -> f32 {
    let n = angles.len();
    let step = angles[1] - angles[0];
    let range = step * n as f32;
    if range >= PI * 0.999 {
        PI / n as f32
    } else {
        step
    }
}

/// Ramp-filter every angular profile of a sinogram, shape `(angle, col)`.
fn filtered_sinogram(sinogram: ArrayView2<'_, f32>, filter: FilterKind) -> Array2<f32> {
    let (n_angles, width) = sinogram.dim();
    let mut filt = SinogramFilter::new(width, filter);
    let mut out = Array2::zeros((n_angles, width));
    let mut row = vec![0.0f32; width];
    for (mut dst, src) in out.outer_iter_mut().zip(sinogram.outer_iter()) {
        for (r, s) in row.iter_mut().zip(src.iter()) {
            *r = *s;
        }
        filt.apply(&mut row);
        dst.assign(&ArrayView1::from(&row[..]));
    }
    out
}

/// Filtered backprojection of one sinogram into a `(width, width)` slice.
fn fbp_slice(
    sinogram: ArrayView2<'_, f32>,
    angles: &Array1<f32>,
    center: f32,
    filter: FilterKind,
) -> Array2<f32> {
    let (_, width) = sinogram.dim();
    let filtered = filtered_sinogram(sinogram, filter);
    let weight = angular_weight(angles);
    let grid_center = (width as f32 - 1.0) / 2.0;

    let mut slice = Array2::<f32>::zeros((width, width));
    for (a, profile) in filtered.outer_iter().enumerate() {
        let (sin_t, cos_t) = angles[a].sin_cos();
        for y in 0..width {
            let dy = y as f32 - grid_center;
            for x in 0..width {
                let dx = x as f32 - grid_center;
                // detector coordinate of this voxel at the current angle
                let t = center + dx * cos_t + dy * sin_t;
                let t0 = t.floor();
                let frac = t - t0;
                let i0 = t0 as isize;
                let v0 = profile_at(profile, i0);
                let v1 = profile_at(profile, i0 + 1);
                slice[(y, x)] += v0 + frac * (v1 - v0);
            }
        }
    }
    slice.mapv_inplace(|v| v * weight);
    slice
}

fn profile_at(profile: ArrayView1<'_, f32>, i: isize) -> f32 {
    if i >= 0 && (i as usize) < profile.len() {
        profile[i as usize]
    } else {
        0.0
    }
}

/// Radial oversampling of the profile spectra used by the gridding path.
/// Finer radial sampling keeps the polar-to-Cartesian interpolation honest.
const GRID_OVERSAMPLE: usize = 4;

/// Fourier-gridding inversion of one sinogram into a `(width, width)` slice.
fn gridrec_slice(
    sinogram: ArrayView2<'_, f32>,
    angles: &Array1<f32>,
    center: f32,
    filter: FilterKind,
) -> Array2<f32> {
    let (n_angles, width) = sinogram.dim();
    let padded = (GRID_OVERSAMPLE * width.max(2)).next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(padded);

    // radial spectra, one per angle; the rotation-axis phase shift is
    // applied later at the exact sampled frequency, not per bin
    let mut spectra: Vec<Vec<Complex32>> = Vec::with_capacity(n_angles);
    for profile in sinogram.outer_iter() {
        let mut buf: Vec<Complex32> = profile
            .iter()
            .map(|&v| Complex32::new(v, 0.0))
            .collect();
        buf.resize(padded, Complex32::new(0.0, 0.0));
        fft.process(&mut buf);
        for (k, b) in buf.iter_mut().enumerate() {
            *b = *b * window(filter, fft_freq(k, padded).abs());
        }
        spectra.push(buf);
    }

    let start = angles[0];
    let step = angles[1] - angles[0];
    let half_turn = (PI / step).round() as isize;
    let grid_center = (width as f32 - 1.0) / 2.0;

    // gather the polar samples onto the Cartesian frequency grid of the slice
    let mut grid = Array2::from_elem((width, width), Complex32::new(0.0, 0.0));
    for v in 0..width {
        let kv = fft_freq(v, width);
        for u in 0..width {
            let ku = fft_freq(u, width);
            let wmag = (ku * ku + kv * kv).sqrt();
            if wmag > 0.5 {
                // beyond detector Nyquist, no measurement exists
                continue;
            }
            let mut theta = kv.atan2(ku);
            let mut sign = 1.0f32;
            while theta < start {
                theta += PI;
                sign = -sign;
            }
            while theta >= start + PI {
                theta -= PI;
                sign = -sign;
            }
            let af = (theta - start) / step;
            let a0 = af.floor() as isize;
            let fa = af - a0 as f32;
            let s0 = sample_radial(&spectra, a0, wmag * sign, half_turn, center);
            let s1 = sample_radial(&spectra, a0 + 1, wmag * sign, half_turn, center);
            let value = s0 + (s1 - s0) * fa;
            // re-register the origin from index 0 to the grid centre
            let phase = -2.0 * PI * (ku + kv) * grid_center;
            grid[(v, u)] = value * Complex32::new(phase.cos(), phase.sin());
        }
    }

    ifft2(&mut grid, &mut planner);
    grid.mapv(|c| c.re)
}

/// Bilinear sample of one radial spectrum at signed frequency `w` (cycles
/// per sample), shifted so the rotation axis sits at the spatial origin.
/// Angle indices past the measured list fold back by a half turn with the
/// frequency negated; truly unmeasured directions (limited angle scans)
/// clamp to the nearest profile.
fn sample_radial(
    spectra: &[Vec<Complex32>],
    a: isize,
    w: f32,
    half_turn: isize,
    center: f32,
) -> Complex32 {
    let n = spectra.len() as isize;
    let (a, w) = if a < n {
        (a, w)
    } else if a - half_turn >= 0 && a - half_turn < n {
        (a - half_turn, -w)
    } else {
        (n - 1, w)
    };
    let spectrum = &spectra[a as usize];
    let m = spectrum.len();
    let mut rf = w * m as f32;
    if rf < 0.0 {
        rf += m as f32;
    }
    let r0 = (rf.floor() as usize).min(m - 1);
    let fr = rf - r0 as f32;
    let r1 = (r0 + 1) % m;
    let value = spectrum[r0] + (spectrum[r1] - spectrum[r0]) * fr;
    let phase = 2.0 * PI * w * center;
    value * Complex32::new(phase.cos(), phase.sin())
}

/// In-place unitary-normalized inverse 2D FFT (rows, then columns).
fn ifft2(grid: &mut Array2<Complex32>, planner: &mut FftPlanner<f32>) {
    let (rows, cols) = grid.dim();
    let ifft_cols = planner.plan_fft_inverse(cols);
    for mut row in grid.outer_iter_mut() {
        let mut buf: Vec<Complex32> = row.iter().copied().collect();
        ifft_cols.process(&mut buf);
        for (dst, src) in row.iter_mut().zip(&buf) {
            *dst = *src;
        }
    }
    let ifft_rows = planner.plan_fft_inverse(rows);
    let mut buf = vec![Complex32::new(0.0, 0.0); rows];
    for c in 0..cols {
        for (r, b) in buf.iter_mut().enumerate() {
            *b = grid[(r, c)];
        }
        ifft_rows.process(&mut buf);
        for (r, b) in buf.iter().enumerate() {
            grid[(r, c)] = *b;
        }
    }
    let scale = 1.0 / (rows * cols) as f32;
    grid.mapv_inplace(|v| v * scale);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Axis};

    const WIDTH: usize = 64;
    const RADIUS: f32 = 20.0;
    const MU: f32 = 0.5;

    /// Analytic parallel-beam sinogram of a uniform disk centred on the
    /// rotation axis: the chord length is angle-independent.
    fn disk_sinogram(n_angles: usize, center: f32) -> Array2<f32> {
        let mut sino = Array2::zeros((n_angles, WIDTH));
        for a in 0..n_angles {
            for s in 0..WIDTH {
                let d = s as f32 - center;
                if d.abs() < RADIUS {
                    sino[(a, s)] = 2.0 * MU * (RADIUS * RADIUS - d * d).sqrt();
                }
            }
        }
        sino
    }

    fn as_stack(sino: &Array2<f32>, n_rows: usize) -> Array3<f32> {
        let (n_angles, width) = sino.dim();
        let mut stack = Array3::zeros((n_angles, n_rows, width));
        for r in 0..n_rows {
            stack.slice_mut(s![.., r, ..]).assign(sino);
        }
        stack
    }

    /// Mean over voxels well inside / well outside the disk boundary.
    fn interior_exterior_means(slice: &Array2<f32>) -> (f32, f32) {
        let gc = (WIDTH as f32 - 1.0) / 2.0;
        let (mut inside, mut n_in) = (0.0f32, 0usize);
        let (mut outside, mut n_out) = (0.0f32, 0usize);
        for y in 0..WIDTH {
            for x in 0..WIDTH {
                let d = ((y as f32 - gc).powi(2) + (x as f32 - gc).powi(2)).sqrt();
                if d < RADIUS - 4.0 {
                    inside += slice[(y, x)];
                    n_in += 1;
                } else if d > RADIUS + 4.0 && d < WIDTH as f32 / 2.0 - 2.0 {
                    outside += slice[(y, x)].abs();
                    n_out += 1;
                }
            }
        }
        (inside / n_in as f32, outside / n_out as f32)
    }

    #[test]
    fn fbp_recovers_disk_attenuation() {
        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(128, 0.0, 180.0).unwrap();
        let stack = as_stack(&disk_sinogram(128, center), 2);
        let vol = reconstruct(&stack, &angles, center, Algorithm::Fbp, FilterKind::Ramp).unwrap();
        assert_eq!(vol.dim(), (2, WIDTH, WIDTH));

        let slice = vol.index_axis(Axis(0), 0).to_owned();
        let (inside, outside) = interior_exterior_means(&slice);
        // documented tolerance for the analytic path: 5% on the interior mean
        assert!(
            (inside - MU).abs() < 0.05 * MU,
            "interior mean {inside} vs expected {MU}"
        );
        assert!(outside < 0.1 * MU, "exterior mean {outside} not near zero");
        // both slices saw the same sinogram
        let other = vol.index_axis(Axis(0), 1);
        assert_eq!(slice, other.to_owned());
    }

    #[test]
    fn fbp_full_turn_matches_half_turn_weighting() {
        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(256, 0.0, 360.0).unwrap();
        let stack = as_stack(&disk_sinogram(256, center), 1);
        let vol = reconstruct(&stack, &angles, center, Algorithm::Fbp, FilterKind::Ramp).unwrap();
        let slice = vol.index_axis(Axis(0), 0).to_owned();
        let (inside, _) = interior_exterior_means(&slice);
        // double coverage must fold into the weight, not double the density
        assert!(
            (inside - MU).abs() < 0.05 * MU,
            "interior mean {inside} vs expected {MU}"
        );
    }

    #[test]
    fn gridrec_recovers_disk_attenuation() {
        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(180, 0.0, 180.0).unwrap();
        let stack = as_stack(&disk_sinogram(180, center), 1);
        let vol = reconstruct(
            &stack,
            &angles,
            center,
            Algorithm::Gridrec,
            FilterKind::Ramp,
        )
        .unwrap();
        let slice = vol.index_axis(Axis(0), 0).to_owned();
        let (inside, outside) = interior_exterior_means(&slice);
        // documented tolerance for the gridding path: 15% on the interior
        // mean, the polar interpolation costs accuracy over direct fbp
        assert!(
            (inside - MU).abs() < 0.15 * MU,
            "interior mean {inside} vs expected {MU}"
        );
        assert!(outside < 0.2 * MU, "exterior mean {outside} not near zero");
    }

    #[test]
    fn gridrec_and_fbp_agree_structurally() {
        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(180, 0.0, 180.0).unwrap();
        let stack = as_stack(&disk_sinogram(180, center), 1);
        let fbp = reconstruct(&stack, &angles, center, Algorithm::Fbp, FilterKind::Ramp).unwrap();
        let grd = reconstruct(
            &stack,
            &angles,
            center,
            Algorithm::Gridrec,
            FilterKind::Ramp,
        )
        .unwrap();
        let (f_in, _) = interior_exterior_means(&fbp.index_axis(Axis(0), 0).to_owned());
        let (g_in, _) = interior_exterior_means(&grd.index_axis(Axis(0), 0).to_owned());
        assert!(
            (f_in - g_in).abs() < 0.15 * MU,
            "fbp interior {f_in} vs gridrec interior {g_in}"
        );
    }

    #[test]
    fn wrong_center_degrades_monotonically() {
        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(128, 0.0, 180.0).unwrap();
        let stack = as_stack(&disk_sinogram(128, center), 1);
        let gc = (WIDTH as f32 - 1.0) / 2.0;

        let error_at = |offset: f32| -> f32 {
            let vol = reconstruct(
                &stack,
                &angles,
                center + offset,
                Algorithm::Fbp,
                FilterKind::Ramp,
            )
            .unwrap();
            let slice = vol.index_axis(Axis(0), 0);
            let mut err = 0.0f32;
            for y in 0..WIDTH {
                for x in 0..WIDTH {
                    let d = ((y as f32 - gc).powi(2) + (x as f32 - gc).powi(2)).sqrt();
                    let truth = if d < RADIUS { MU } else { 0.0 };
                    err += (slice[(y, x)] - truth).powi(2);
                }
            }
            err
        };

        let errors: Vec<f32> = [0.0, 1.0, 2.0, 4.0].iter().map(|&o| error_at(o)).collect();
        for pair in errors.windows(2) {
            assert!(
                pair[1] > pair[0],
                "error did not grow with center offset: {errors:?}"
            );
        }
    }

    #[test]
    fn angle_count_mismatch_fails_for_any_stack_length() {
        for n in 2..6 {
            let stack = Array3::from_elem((n, 1, 8), 0.1f32);
            let angles = crate::angles::uniform_angles(n + 1, 0.0, 180.0).unwrap();
            match reconstruct(&stack, &angles, 4.0, Algorithm::Fbp, FilterKind::Ramp) {
                Err(ReconError::InsufficientAngles {
                    angles: a,
                    projections,
                }) => {
                    assert_eq!(a, n + 1);
                    assert_eq!(projections, n);
                }
                other => panic!("expected InsufficientAngles, got {other:?}"),
            }
        }
    }

    #[test]
    fn degenerate_detector_is_rejected() {
        let stack = Array3::from_elem((4, 2, 1), 0.1f32);
        let angles = crate::angles::uniform_angles(4, 0.0, 180.0).unwrap();
        assert!(matches!(
            reconstruct(&stack, &angles, 0.5, Algorithm::Fbp, FilterKind::Ramp),
            Err(ReconError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn non_finite_input_reports_failing_slice() {
        let mut stack = Array3::from_elem((8, 3, 16), 0.1f32);
        stack[(2, 1, 5)] = f32::NAN;
        let angles = crate::angles::uniform_angles(8, 0.0, 180.0).unwrap();
        match reconstruct(&stack, &angles, 8.0, Algorithm::Fbp, FilterKind::Ramp) {
            Err(ReconError::Numerical { slice }) => assert_eq!(slice, 1),
            other => panic!("expected Numerical, got {other:?}"),
        }
    }

    #[test]
    fn noisy_sinogram_reconstructs_close_to_clean() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let center = WIDTH as f32 / 2.0;
        let angles = crate::angles::uniform_angles(128, 0.0, 180.0).unwrap();
        let clean = disk_sinogram(128, center);
        let mut rng = StdRng::seed_from_u64(7);
        let noisy = clean.mapv(|v| v + rng.gen_range(-0.05..0.05));

        let vol_clean =
            reconstruct(&as_stack(&clean, 1), &angles, center, Algorithm::Fbp, FilterKind::Ramp)
                .unwrap();
        let vol_noisy =
            reconstruct(&as_stack(&noisy, 1), &angles, center, Algorithm::Fbp, FilterKind::Ramp)
                .unwrap();
        assert!(vol_noisy.iter().all(|v| v.is_finite()));

        let (clean_in, _) =
            interior_exterior_means(&vol_clean.index_axis(Axis(0), 0).to_owned());
        let (noisy_in, _) =
            interior_exterior_means(&vol_noisy.index_axis(Axis(0), 0).to_owned());
        assert!(
            (clean_in - noisy_in).abs() < 0.1 * MU,
            "noise shifted interior mean from {clean_in} to {noisy_in}"
        );
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("gridrec".parse::<Algorithm>().unwrap(), Algorithm::Gridrec);
        assert_eq!("fbp".parse::<Algorithm>().unwrap(), Algorithm::Fbp);
        assert!("art".parse::<Algorithm>().is_err());
    }
}
