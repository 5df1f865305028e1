//! Differentiable attention pooling blocks for vision-language models.
//!
//! Every block takes a batch of per-position feature vectors and a per-batch
//! context vector (an encoded question, for instance) and returns a weighted
//! pooling of the features conditioned on that context:
//!
//! * [`SoftAttention`] — single-head pooling with optional variable-length
//!   masking.
//! * [`GlimpseAttention`] — K independent attention heads, concatenated.
//! * [`ConvCoAttention`] / [`LinearCoAttention`] — joint feature/context
//!   scoring over a fixed set of region proposals.
//! * [`ConvPooling`] — a full-extent convolution collapsing a spatial map to
//!   one vector, with no learned position weighting.
//!
//! # Conventions
//!
//! Shapes are channels-last: features arrive as `(batch, positions, channels)`
//! (use [`features::flatten_spatial`] for `(batch, height, width, channels)`
//! maps and [`features::check_sequence`] for encoder sequences), contexts as
//! `(batch, width)`. Learned parameters live in a `candle_nn::VarMap` and are
//! threaded through constructors as a [`candle_nn::VarBuilder`]; building two
//! blocks from the same builder prefix binds them to the same parameters.
//!
//! Score normalization is an explicit step ([`ops::normalize_scores`]) rather
//! than a layer activation, and masking is exact: positions past a sequence
//! length contribute zero to the pooled output regardless of their values.

mod checks;

pub mod coattention;
pub mod error;
pub mod features;
pub mod fuse;
pub mod glimpse;
pub mod masks;
pub mod ops;
pub mod pooling;
pub mod soft;

pub use coattention::{
    ConvCoAttention, ConvCoAttentionConfig, LinearCoAttention, LinearCoAttentionConfig,
};
pub use error::{AttentionError, Result};
pub use fuse::FuseMode;
pub use glimpse::{GlimpseActivation, GlimpseAttention, GlimpseConfig};
pub use pooling::{ConvPooling, ConvPoolingConfig};
pub use soft::{SoftAttention, SoftAttentionConfig};
