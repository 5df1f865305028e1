//! Co-attention over a fixed set of region proposals.
//!
//! Both blocks take `(batch, regions, channels)` region features (for example
//! 36 object-proposal vectors per image) and a `(batch, width)` context, and
//! score each region from the projected feature and the projected context
//! jointly. Raw scores are normalized with an explicit softmax over regions;
//! the pooled output is the weighted sum of the original, unprojected region
//! features.

use candle_core::Tensor;
use candle_nn::{
    conv2d_no_bias, linear, linear_no_bias, Conv2d, Conv2dConfig, Dropout, Linear, Module,
    VarBuilder,
};

use crate::checks;
use crate::error::{AttentionError, Result};
use crate::fuse::FuseMode;
use crate::ops;

fn check_inputs(
    name: &'static str,
    features: &Tensor,
    context: &Tensor,
    feature_dim: usize,
    context_dim: usize,
) -> Result<()> {
    let (batch, _, channels) = checks::expect_positions(name, features)?;
    let (ctx_batch, width) = checks::expect_context(name, context)?;
    if channels != feature_dim || width != context_dim || ctx_batch != batch {
        return Err(AttentionError::InvalidShape {
            context: name,
            got: vec![batch, channels, ctx_batch, width],
        });
    }
    Ok(())
}

/// Configuration for [`ConvCoAttention`].
#[derive(Debug, Clone)]
pub struct ConvCoAttentionConfig {
    /// Channel width of each region feature vector.
    pub feature_dim: usize,
    /// Width of the context vector.
    pub context_dim: usize,
    /// Width of the joint projection space.
    pub hidden_units: usize,
    /// Dropout probability applied to inputs and the fused activation.
    pub dropout_p: Option<f32>,
}

impl ConvCoAttentionConfig {
    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 || self.context_dim == 0 || self.hidden_units == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "co-attention widths must be non-zero".to_string(),
            });
        }
        checks::validate_dropout(self.dropout_p)
    }
}

/// Co-attention with 1x1 convolutional region projections.
///
/// Region features are projected with a bias-free 1x1 convolution, the context
/// with a bias-free linear layer; the two are summed, rectified and reduced to
/// one raw score per region by a second 1x1 convolution. The convolutions run
/// in NCHW internally; the public contract stays channels-last.
#[derive(Debug)]
pub struct ConvCoAttention {
    config: ConvCoAttentionConfig,
    feature_conv: Conv2d,
    context_proj: Linear,
    score_conv: Conv2d,
    dropout: Dropout,
}

impl ConvCoAttention {
    /// Builds the block under the `feature_conv`, `context_projection` and
    /// `score_conv` prefixes of `vb`.
    pub fn new(config: ConvCoAttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let feature_conv = conv2d_no_bias(
            config.feature_dim,
            config.hidden_units,
            1,
            Conv2dConfig::default(),
            vb.pp("feature_conv"),
        )?;
        let context_proj = linear_no_bias(
            config.context_dim,
            config.hidden_units,
            vb.pp("context_projection"),
        )?;
        let score_conv = conv2d_no_bias(
            config.hidden_units,
            1,
            1,
            Conv2dConfig::default(),
            vb.pp("score_conv"),
        )?;
        let dropout = Dropout::new(config.dropout_p.unwrap_or(0.0));

        log::debug!(
            "conv co-attention init: hidden_units={} dropout_p={:?}",
            config.hidden_units,
            config.dropout_p
        );

        Ok(Self {
            config,
            feature_conv,
            context_proj,
            score_conv,
            dropout,
        })
    }

    /// Pools `(batch, regions, channels)` features into `(batch, channels)`.
    pub fn forward(&self, features: &Tensor, context: &Tensor, train: bool) -> Result<Tensor> {
        self.forward_with_weights(features, context, train)
            .map(|(pooled, _)| pooled)
    }

    /// Like [`forward`](Self::forward), additionally returning the
    /// `(batch, regions)` attention weights.
    pub fn forward_with_weights(
        &self,
        features: &Tensor,
        context: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        check_inputs(
            "conv_coattention.inputs",
            features,
            context,
            self.config.feature_dim,
            self.config.context_dim,
        )?;

        let dropped = self.dropout.forward(features, train)?;
        // [B, R, C] -> [B, C, R, 1] for the 1x1 convolutions.
        let nchw = dropped.permute((0, 2, 1))?.unsqueeze(3)?.contiguous()?;
        let projected = self.feature_conv.forward(&nchw)?;

        let context = self.dropout.forward(context, train)?;
        let context = self.context_proj.forward(&context)?;
        let context = context.unsqueeze(2)?.unsqueeze(3)?;

        let joint = projected.broadcast_add(&context)?.relu()?;
        let joint = self.dropout.forward(&joint, train)?;
        let scores = self.score_conv.forward(&joint)?.squeeze(3)?.squeeze(1)?;

        let alpha = ops::normalize_scores(&scores)?;
        let pooled = ops::weighted_pool(features, &alpha)?;
        Ok((pooled, alpha))
    }
}

/// Configuration for [`LinearCoAttention`].
#[derive(Debug, Clone)]
pub struct LinearCoAttentionConfig {
    /// Channel width of each region feature vector.
    pub feature_dim: usize,
    /// Width of the context vector.
    pub context_dim: usize,
    /// Width of both ReLU projections.
    pub hidden_units: usize,
    /// How the projected context is combined with each projected region.
    pub fuse_mode: FuseMode,
    /// Dropout probability applied to inputs and the fused vector.
    pub dropout_p: Option<f32>,
}

impl LinearCoAttentionConfig {
    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 || self.context_dim == 0 || self.hidden_units == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "co-attention widths must be non-zero".to_string(),
            });
        }
        checks::validate_dropout(self.dropout_p)
    }
}

/// Co-attention with fully-connected ReLU projections and a configurable
/// fusion of the projected context with each projected region.
#[derive(Debug)]
pub struct LinearCoAttention {
    config: LinearCoAttentionConfig,
    feature_proj: Linear,
    context_proj: Linear,
    score: Linear,
    dropout: Dropout,
}

impl LinearCoAttention {
    /// Builds the block under the `feature_projection`, `context_projection`
    /// and `score` prefixes of `vb`.
    pub fn new(config: LinearCoAttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let feature_proj = linear(
            config.feature_dim,
            config.hidden_units,
            vb.pp("feature_projection"),
        )?;
        let context_proj = linear(
            config.context_dim,
            config.hidden_units,
            vb.pp("context_projection"),
        )?;
        // Both projections share the hidden width, so every fuse mode is valid.
        let fused_dim = config
            .fuse_mode
            .fused_dim(config.hidden_units, config.hidden_units)?;
        let score = linear(fused_dim, 1, vb.pp("score"))?;
        let dropout = Dropout::new(config.dropout_p.unwrap_or(0.0));

        log::debug!(
            "linear co-attention init: hidden_units={} fuse={} dropout_p={:?}",
            config.hidden_units,
            config.fuse_mode,
            config.dropout_p
        );

        Ok(Self {
            config,
            feature_proj,
            context_proj,
            score,
            dropout,
        })
    }

    /// Pools `(batch, regions, channels)` features into `(batch, channels)`.
    pub fn forward(&self, features: &Tensor, context: &Tensor, train: bool) -> Result<Tensor> {
        self.forward_with_weights(features, context, train)
            .map(|(pooled, _)| pooled)
    }

    /// Like [`forward`](Self::forward), additionally returning the
    /// `(batch, regions)` attention weights.
    pub fn forward_with_weights(
        &self,
        features: &Tensor,
        context: &Tensor,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        check_inputs(
            "linear_coattention.inputs",
            features,
            context,
            self.config.feature_dim,
            self.config.context_dim,
        )?;

        let projected = self.dropout.forward(features, train)?;
        let projected = self.feature_proj.forward(&projected)?.relu()?;

        let context = self.dropout.forward(context, train)?;
        let context = self.context_proj.forward(&context)?.relu()?;

        let fused = self.config.fuse_mode.fuse(&projected, &context)?;
        let fused = self.dropout.forward(&fused, train)?;
        let scores = self.score.forward(&fused)?.squeeze(2)?;

        let alpha = ops::normalize_scores(&scores)?;
        let pooled = ops::weighted_pool(features, &alpha)?;
        Ok((pooled, alpha))
    }
}
