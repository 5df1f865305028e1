//! Explicit normalization and pooling steps shared by every attention block.
//!
//! Normalization is never hidden inside a layer's output activation: blocks
//! compute raw scores, then call [`normalize_scores`] (or the per-head
//! variant) and pool with [`weighted_pool`]. Keeping these steps separate
//! makes the unit-sum invariant directly testable.

use candle_core::Tensor;
use candle_nn::ops::softmax;

use crate::checks;
use crate::error::{AttentionError, Result};

/// Softmax over the position axis of `(batch, positions)` scores.
pub fn normalize_scores(scores: &Tensor) -> Result<Tensor> {
    match scores.dims() {
        [_, _] => Ok(softmax(scores, 1)?),
        dims => Err(AttentionError::InvalidShape {
            context: "scores expect [batch, positions]",
            got: dims.to_vec(),
        }),
    }
}

/// Per-head softmax over the position axis of `(batch, positions, heads)`
/// scores. Each head is normalized independently.
pub fn normalize_scores_per_head(scores: &Tensor) -> Result<Tensor> {
    match scores.dims() {
        [_, _, _] => Ok(softmax(scores, 1)?),
        dims => Err(AttentionError::InvalidShape {
            context: "per-head scores expect [batch, positions, heads]",
            got: dims.to_vec(),
        }),
    }
}

/// Pools `(batch, positions, channels)` features with `(batch, positions)`
/// weights into one `(batch, channels)` vector per batch element.
pub fn weighted_pool(features: &Tensor, alpha: &Tensor) -> Result<Tensor> {
    let (batch, positions, _channels) = checks::expect_positions("pool.features", features)?;
    match alpha.dims() {
        [a_batch, a_positions] if *a_batch == batch && *a_positions == positions => {}
        dims => {
            return Err(AttentionError::InvalidShape {
                context: "pool.weights must be [batch, positions] matching the features",
                got: dims.to_vec(),
            })
        }
    }
    Ok(features.broadcast_mul(&alpha.unsqueeze(2)?)?.sum(1)?)
}
