//! Multi-glimpse attention: K independently weighted poolings of one feature
//! map under a single context, concatenated head by head.
//!
//! One parameterized implementation covers the historical variants, which
//! differed only in activation function and bias usage:
//!
//! * tanh activation, no bias ([`GlimpseConfig::tanh`])
//! * ReLU activation, no bias ([`GlimpseConfig::relu`])
//! * ReLU activation, with bias ([`GlimpseConfig::relu_biased`])

use candle_core::Tensor;
use candle_nn::{linear, linear_no_bias, Dropout, Linear, Module, VarBuilder};

use crate::checks;
use crate::error::{AttentionError, Result};
use crate::ops;

/// Non-linearity applied to the context and feature embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlimpseActivation {
    Tanh,
    Relu,
}

impl GlimpseActivation {
    fn apply(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            GlimpseActivation::Tanh => tensor.tanh(),
            GlimpseActivation::Relu => tensor.relu(),
        }
    }
}

/// Configuration for [`GlimpseAttention`].
#[derive(Debug, Clone)]
pub struct GlimpseConfig {
    /// Channel width of each per-position feature vector.
    pub feature_dim: usize,
    /// Width of the context vector.
    pub context_dim: usize,
    /// Number of independent attention heads.
    pub glimpses: usize,
    /// Width of the shared embedding space for context and features.
    pub embedding_units: usize,
    /// Non-linearity applied to both embeddings.
    pub activation: GlimpseActivation,
    /// Whether the three projections carry bias terms.
    pub bias: bool,
    /// Dropout probability applied to inputs and the Hadamard product.
    pub dropout_p: Option<f32>,
}

impl GlimpseConfig {
    /// Classic variant: tanh embeddings without bias terms.
    pub fn tanh(
        feature_dim: usize,
        context_dim: usize,
        glimpses: usize,
        embedding_units: usize,
    ) -> Self {
        Self {
            feature_dim,
            context_dim,
            glimpses,
            embedding_units,
            activation: GlimpseActivation::Tanh,
            bias: false,
            dropout_p: None,
        }
    }

    /// ReLU embeddings without bias terms.
    pub fn relu(
        feature_dim: usize,
        context_dim: usize,
        glimpses: usize,
        embedding_units: usize,
    ) -> Self {
        Self {
            activation: GlimpseActivation::Relu,
            ..Self::tanh(feature_dim, context_dim, glimpses, embedding_units)
        }
    }

    /// ReLU embeddings with bias terms on every projection.
    pub fn relu_biased(
        feature_dim: usize,
        context_dim: usize,
        glimpses: usize,
        embedding_units: usize,
    ) -> Self {
        Self {
            bias: true,
            ..Self::relu(feature_dim, context_dim, glimpses, embedding_units)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 || self.context_dim == 0 || self.embedding_units == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "feature, context and embedding widths must be non-zero".to_string(),
            });
        }
        if self.glimpses == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "glimpse attention needs at least one head".to_string(),
            });
        }
        checks::validate_dropout(self.dropout_p)
    }
}

/// Multi-head attention pooling producing a `(batch, glimpses * channels)`
/// output.
#[derive(Debug)]
pub struct GlimpseAttention {
    config: GlimpseConfig,
    context_proj: Linear,
    feature_proj: Linear,
    score_proj: Linear,
    dropout: Dropout,
}

impl GlimpseAttention {
    /// Builds the block, allocating (or re-binding) parameters under the
    /// `context_projection`, `feature_projection` and `score_projection`
    /// prefixes of `vb`.
    pub fn new(config: GlimpseConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let project = |in_dim: usize, out_dim: usize, vb: VarBuilder| {
            if config.bias {
                linear(in_dim, out_dim, vb)
            } else {
                linear_no_bias(in_dim, out_dim, vb)
            }
        };
        let context_proj = project(
            config.context_dim,
            config.embedding_units,
            vb.pp("context_projection"),
        )?;
        let feature_proj = project(
            config.feature_dim,
            config.embedding_units,
            vb.pp("feature_projection"),
        )?;
        let score_proj = project(
            config.embedding_units,
            config.glimpses,
            vb.pp("score_projection"),
        )?;
        let dropout = Dropout::new(config.dropout_p.unwrap_or(0.0));

        log::debug!(
            "glimpse attention init: glimpses={} embedding_units={} activation={:?} bias={}",
            config.glimpses,
            config.embedding_units,
            config.activation,
            config.bias
        );

        Ok(Self {
            config,
            context_proj,
            feature_proj,
            score_proj,
            dropout,
        })
    }

    /// Returns the block configuration.
    pub fn config(&self) -> &GlimpseConfig {
        &self.config
    }

    /// Pools `(batch, positions, channels)` features into
    /// `(batch, glimpses * channels)`.
    pub fn forward(&self, features: &Tensor, context: &Tensor, train: bool) -> Result<Tensor> {
        self.forward_with_weights(features, context, train)
            .map(|(pooled, _)| pooled)
    }

    /// Like [`forward`](Self::forward), additionally returning the per-head
    /// `(batch, positions, glimpses)` attention weights.
    pub fn forward_with_weights(
        &self,
        features: &Tensor,
        context: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let (batch, _, channels) = checks::expect_positions("glimpse.features", features)?;
        let (ctx_batch, width) = checks::expect_context("glimpse.context", context)?;
        if channels != self.config.feature_dim
            || width != self.config.context_dim
            || ctx_batch != batch
        {
            return Err(AttentionError::InvalidShape {
                context: "glimpse input widths must match the configuration",
                got: vec![batch, channels, width],
            });
        }

        let context = self.dropout.forward(context, train)?;
        let context = self
            .config
            .activation
            .apply(&self.context_proj.forward(&context)?)?;

        let embedded = self.dropout.forward(features, train)?;
        let embedded = self
            .config
            .activation
            .apply(&self.feature_proj.forward(&embedded)?)?;

        let hadamard = embedded.broadcast_mul(&context.unsqueeze(1)?)?;
        let hadamard = self.dropout.forward(&hadamard, train)?;
        let scores = self.score_proj.forward(&hadamard)?;

        let alpha = ops::normalize_scores_per_head(&scores)?;

        let mut glimpses = Vec::with_capacity(self.config.glimpses);
        for head in 0..self.config.glimpses {
            let head_alpha = alpha.narrow(2, head, 1)?.squeeze(2)?;
            glimpses.push(ops::weighted_pool(features, &head_alpha)?);
        }
        let pooled = Tensor::cat(&glimpses, 1)?;
        Ok((pooled, alpha))
    }
}
