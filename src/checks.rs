//! Lightweight validation helpers shared across the attention blocks.
//!
//! These routines return crate errors so call sites can propagate
//! preconditions with `?` instead of panicking.

use candle_core::Tensor;

use crate::error::{AttentionError, Result};

/// Validates the `(batch, positions, channels)` convention and returns the dims.
pub(crate) fn expect_positions(name: &'static str, tensor: &Tensor) -> Result<(usize, usize, usize)> {
    match tensor.dims() {
        [batch, positions, channels] => Ok((*batch, *positions, *channels)),
        dims => Err(AttentionError::InvalidShape {
            context: name,
            got: dims.to_vec(),
        }),
    }
}

/// Validates the `(batch, width)` convention for context vectors.
pub(crate) fn expect_context(name: &'static str, tensor: &Tensor) -> Result<(usize, usize)> {
    match tensor.dims() {
        [batch, width] => Ok((*batch, *width)),
        dims => Err(AttentionError::InvalidShape {
            context: name,
            got: dims.to_vec(),
        }),
    }
}

/// Rejects dropout probabilities outside `[0, 1)`.
pub(crate) fn validate_dropout(dropout_p: Option<f32>) -> Result<()> {
    if let Some(p) = dropout_p {
        if !(0.0..1.0).contains(&p) {
            return Err(AttentionError::InvalidConfig {
                reason: format!("dropout probability must be in [0, 1), got {p}"),
            });
        }
    }
    Ok(())
}
