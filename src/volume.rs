//! Assembly of per-slice reconstructions into one volume.

use ndarray::{Array2, Array3, Axis};

use crate::error::{ReconError, Result};

/// Stack 2D slices along a new leading axis, in the given order.
///
/// All slices must share one shape; the offending slice index is reported
/// otherwise.
pub fn stack_slices(slices: Vec<Array2<f32>>) -> Result<Array3<f32>> {
    let first = slices
        .first()
        .ok_or_else(|| ReconError::InvalidRange("no slices to assemble".into()))?;
    let (rows, cols) = first.dim();

    let mut volume = Array3::zeros((slices.len(), rows, cols));
    for (i, slice) in slices.iter().enumerate() {
        if slice.dim() != (rows, cols) {
            return Err(ReconError::AssemblyShape {
                slice: i,
                expected: vec![rows, cols],
                actual: slice.shape().to_vec(),
            });
        }
        volume.index_axis_mut(Axis(0), i).assign(slice);
    }
    Ok(volume)
}
