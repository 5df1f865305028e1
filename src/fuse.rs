//! Fusion of per-position features with a broadcast context vector.
//!
//! Every scoring pipeline starts by combining the feature vector at each
//! position with the (position-independent) context vector. The three
//! supported fusions are channel-wise concatenation, the elementwise product
//! and the elementwise sum. Product and sum require matching widths, which is
//! checked at configuration time rather than deep inside a forward pass.

use std::fmt;
use std::str::FromStr;

use candle_core::Tensor;

use crate::checks;
use crate::error::{AttentionError, Result};

/// How a context vector is combined with each per-position feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseMode {
    /// Channel-wise concatenation; the fused width is `channels + context`.
    Concat,
    /// Elementwise (Hadamard) product; widths must match.
    Dot,
    /// Elementwise sum; widths must match.
    Sum,
}

impl FuseMode {
    /// Width of the fused vector, or an error when the mode cannot combine
    /// the given widths.
    pub fn fused_dim(&self, feature_dim: usize, context_dim: usize) -> Result<usize> {
        match self {
            FuseMode::Concat => Ok(feature_dim + context_dim),
            FuseMode::Dot | FuseMode::Sum => {
                if feature_dim == context_dim {
                    Ok(feature_dim)
                } else {
                    Err(AttentionError::InvalidConfig {
                        reason: format!(
                            "{self} fusion requires matching widths, got features {feature_dim} and context {context_dim}"
                        ),
                    })
                }
            }
        }
    }

    /// Fuses `(batch, positions, channels)` features with a `(batch, width)`
    /// context broadcast over positions.
    pub fn fuse(&self, features: &Tensor, context: &Tensor) -> Result<Tensor> {
        let (batch, positions, channels) = checks::expect_positions("fuse.features", features)?;
        let (ctx_batch, width) = checks::expect_context("fuse.context", context)?;
        if ctx_batch != batch {
            return Err(AttentionError::InvalidShape {
                context: "fuse.context batch must match features",
                got: context.dims().to_vec(),
            });
        }
        self.fused_dim(channels, width)?;

        let context = context.unsqueeze(1)?;
        match self {
            FuseMode::Concat => {
                let tiled = context
                    .broadcast_as((batch, positions, width))?
                    .contiguous()?;
                Ok(Tensor::cat(&[features, &tiled], 2)?)
            }
            FuseMode::Dot => Ok(features.broadcast_mul(&context)?),
            FuseMode::Sum => Ok(features.broadcast_add(&context)?),
        }
    }
}

impl fmt::Display for FuseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FuseMode::Concat => "concat",
            FuseMode::Dot => "dot",
            FuseMode::Sum => "sum",
        };
        f.write_str(name)
    }
}

impl FromStr for FuseMode {
    type Err = AttentionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concat" => Ok(FuseMode::Concat),
            "dot" => Ok(FuseMode::Dot),
            "sum" => Ok(FuseMode::Sum),
            other => Err(AttentionError::InvalidFuseMode {
                mode: other.to_string(),
            }),
        }
    }
}
