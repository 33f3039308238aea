use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ndarray::Array3;
use ndarray_npy::{write_npy, NpzReader};

use tomo_core::{run_pipeline, ReconConfig};

/// Reconstruction driver for parallel-beam projection stacks.
///
/// Expected NPZ file structure:
///   - key "projections": 3D array (angle, row, col) of f32
///
/// Run parameters come from an optional JSON config file; individual flags
/// override the file. Both the flat-field normalized stack and the
/// reconstructed volume are written as .npy files.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to NPZ file containing the raw projection stack
    #[arg(long)]
    projections: PathBuf,

    /// Path to JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start of the angular range in degrees
    #[arg(long)]
    start_deg: Option<f32>,

    /// End of the angular range in degrees (half-open)
    #[arg(long)]
    stop_deg: Option<f32>,

    /// Detector column of the rotation axis (default: half the width)
    #[arg(long)]
    center: Option<f32>,

    /// Reconstruction algorithm: gridrec or fbp
    #[arg(long)]
    algorithm: Option<String>,

    /// Sinogram filter: ramp, shepp-logan or hann
    #[arg(long)]
    filter: Option<String>,

    /// Circular mask ratio in (0, 1]
    #[arg(long)]
    mask_ratio: Option<f32>,

    /// Output path for the normalized projections (.npy), optional
    #[arg(long)]
    normalized_out: Option<PathBuf>,

    /// Output path for the reconstructed volume (.npy)
    #[arg(long)]
    volume_out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // --- Load the projection stack from NPZ ---
    let file = File::open(&args.projections)
        .map_err(|e| anyhow::anyhow!("Failed to open NPZ {:?}: {}", args.projections, e))?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| anyhow::anyhow!("Failed to read NPZ {:?}: {}", args.projections, e))?;

    let projections: Array3<f32> = npz
        .by_name("projections")
        .map_err(|e| anyhow::anyhow!("Missing or invalid 'projections' array in NPZ: {}", e))?;

    // --- Assemble the run configuration ---
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open config {:?}: {}", path, e))?;
            serde_json::from_reader(file)
                .map_err(|e| anyhow::anyhow!("Failed to parse config {:?}: {}", path, e))?
        }
        None => ReconConfig::default(),
    };
    if let Some(v) = args.start_deg {
        config.start_deg = v;
    }
    if let Some(v) = args.stop_deg {
        config.stop_deg = v;
    }
    if let Some(v) = args.center {
        config.center = Some(v);
    }
    if let Some(v) = &args.algorithm {
        config.algorithm = v.parse()?;
    }
    if let Some(v) = &args.filter {
        config.filter = v.parse()?;
    }
    if let Some(v) = args.mask_ratio {
        config.mask_ratio = v;
    }

    let (n_angles, n_rows, n_cols) = projections.dim();
    println!(
        "Reconstructing {} projections of {}x{} over [{}, {}) deg with {:?}/{:?}",
        n_angles, n_rows, n_cols, config.start_deg, config.stop_deg, config.algorithm,
        config.filter
    );

    // --- Run the pipeline ---
    let output = run_pipeline(&projections, &config)?;

    // --- Save the intermediate and the volume as .npy ---
    if let Some(path) = &args.normalized_out {
        write_npy(path, &output.normalized)
            .map_err(|e| anyhow::anyhow!("Failed to write normalized NPY {:?}: {}", path, e))?;
        println!("Normalized projections written to {:?}", path);
    }
    write_npy(&args.volume_out, &output.volume)
        .map_err(|e| anyhow::anyhow!("Failed to write volume NPY {:?}: {}", args.volume_out, e))?;
    println!("Reconstructed volume written to {:?}", args.volume_out);

    Ok(())
}
