//! Error types emitted by the attention blocks.
//!
//! Configuration mistakes (unknown fuse mode, incompatible widths, sequence
//! input to a spatial-only block) fail at construction time, before any tensor
//! work runs. Failures inside tensor algebra propagate from the backend
//! through [`AttentionError::Tensor`].

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AttentionError>;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The fuse-mode string does not name a supported fusion.
    #[error("invalid fuse mode \"{mode}\" (expected \"concat\", \"dot\" or \"sum\")")]
    InvalidFuseMode { mode: String },

    /// A configuration value violates the documented contract.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The supplied tensor shape does not align with the documented contract.
    #[error("unexpected tensor shape for {context}: got {got:?}")]
    InvalidShape {
        context: &'static str,
        got: Vec<usize>,
    },

    /// A mask row leaves no valid position to attend to.
    #[error("batch element {batch} has no valid positions to attend to")]
    FullyMasked { batch: usize },

    /// A backend failure propagated to the caller.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}
