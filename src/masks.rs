//! Additive score masks for variable-length inputs.
//!
//! Masks are `(batch, positions)` `f32` tensors holding `0.0` at valid
//! positions and `-inf` at padded ones. Adding a mask to raw scores before
//! the softmax gives padded positions exactly zero probability, so their
//! feature values cannot leak into the pooled output.

use candle_core::{Device, Tensor};

use crate::error::{AttentionError, Result};

/// Builds an additive score mask from per-batch valid lengths.
///
/// Lengths are clamped to `positions`. A zero length is rejected: a row with
/// every position masked would turn the softmax into `0/0`, so the situation
/// is surfaced as [`AttentionError::FullyMasked`] instead of letting NaNs
/// propagate.
pub fn score_mask_from_lengths(
    device: &Device,
    lengths: &[usize],
    positions: usize,
) -> Result<Tensor> {
    let batch = lengths.len();
    let mut data = vec![0f32; batch * positions];

    for (b, &length) in lengths.iter().enumerate() {
        if length == 0 {
            return Err(AttentionError::FullyMasked { batch: b });
        }
        let valid = length.min(positions);
        let row_start = b * positions;
        for p in valid..positions {
            data[row_start + p] = f32::NEG_INFINITY;
        }
    }

    Ok(Tensor::from_vec(data, (batch, positions), device)?)
}

/// Adds a score mask to raw `(batch, positions)` scores.
pub fn apply_score_mask(scores: &Tensor, mask: &Tensor) -> Result<Tensor> {
    if scores.dims() != mask.dims() {
        return Err(AttentionError::InvalidShape {
            context: "score mask must match the [batch, positions] score shape",
            got: mask.dims().to_vec(),
        });
    }
    Ok(scores.add(mask)?)
}
