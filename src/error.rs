use thiserror::Error;

/// Errors raised by the reconstruction pipeline.
///
/// All variants are fatal for the call that produced them; the pipeline
/// never returns a partially computed stack or volume.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconError {
    #[error(
        "degenerate flat field: all {total_pixels} reference pixels are below {floor} \
         (empty or fully dark acquisition?)"
    )]
    DegenerateFlatField { total_pixels: usize, floor: f32 },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("shape mismatch in {stage}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        stage: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("slice {slice} has shape {actual:?} but the first slice has {expected:?}")]
    AssemblyShape {
        slice: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{angles} angles supplied for {projections} projections")]
    InsufficientAngles { angles: usize, projections: usize },

    #[error("non-finite or negative input to {stage} at (angle {angle}, row {row}, col {col})")]
    InvalidInput {
        stage: &'static str,
        angle: usize,
        row: usize,
        col: usize,
    },

    #[error("reconstruction produced non-finite values in slice {slice}")]
    Numerical { slice: usize },
}

pub type Result<T> = std::result::Result<T, ReconError>;
