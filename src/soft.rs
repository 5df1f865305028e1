//! Single-head soft attention with optional variable-length masking.
//!
//! The block fuses each per-position feature vector with the context, scores
//! every position with a small MLP, normalizes the scores over positions and
//! returns the weighted sum of the original feature vectors. When a score
//! mask is supplied, padded positions receive exactly zero weight.

use candle_core::Tensor;
use candle_nn::{linear, Dropout, Linear, Module, VarBuilder};

use crate::checks;
use crate::error::{AttentionError, Result};
use crate::fuse::FuseMode;
use crate::masks;
use crate::ops;

/// Configuration for [`SoftAttention`].
#[derive(Debug, Clone)]
pub struct SoftAttentionConfig {
    /// Channel width of each per-position feature vector.
    pub feature_dim: usize,
    /// Width of the context vector.
    pub context_dim: usize,
    /// How features and context are combined before scoring.
    pub fuse_mode: FuseMode,
    /// Width of the hidden ReLU layer; `None` projects the fused vector
    /// straight to a scalar score.
    pub hidden_units: Option<usize>,
    /// Dropout probability applied after the hidden layer during training.
    pub dropout_p: Option<f32>,
}

impl SoftAttentionConfig {
    /// Creates a configuration with no hidden layer and no dropout.
    pub fn new(feature_dim: usize, context_dim: usize, fuse_mode: FuseMode) -> Self {
        Self {
            feature_dim,
            context_dim,
            fuse_mode,
            hidden_units: None,
            dropout_p: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 || self.context_dim == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "feature and context widths must be non-zero".to_string(),
            });
        }
        if self.hidden_units == Some(0) {
            return Err(AttentionError::InvalidConfig {
                reason: "hidden layer width must be non-zero; use None to disable it".to_string(),
            });
        }
        checks::validate_dropout(self.dropout_p)?;
        self.fuse_mode
            .fused_dim(self.feature_dim, self.context_dim)?;
        Ok(())
    }
}

/// Context-conditioned soft attention pooling over a set of positions.
///
/// Parameters are created through the supplied [`VarBuilder`]; building two
/// blocks from the same builder prefix binds them to the same parameters.
#[derive(Debug)]
pub struct SoftAttention {
    config: SoftAttentionConfig,
    hidden: Option<Linear>,
    score: Linear,
    dropout: Dropout,
}

impl SoftAttention {
    /// Builds the block, allocating (or re-binding) its parameters under the
    /// `hidden` and `score` prefixes of `vb`.
    pub fn new(config: SoftAttentionConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let fused_dim = config
            .fuse_mode
            .fused_dim(config.feature_dim, config.context_dim)?;

        let (hidden, score_in) = match config.hidden_units {
            Some(units) => (Some(linear(fused_dim, units, vb.pp("hidden"))?), units),
            None => (None, fused_dim),
        };
        let score = linear(score_in, 1, vb.pp("score"))?;
        let dropout = Dropout::new(config.dropout_p.unwrap_or(0.0));

        log::debug!(
            "soft attention init: fuse={} hidden_units={:?} dropout_p={:?}",
            config.fuse_mode,
            config.hidden_units,
            config.dropout_p
        );

        Ok(Self {
            config,
            hidden,
            score,
            dropout,
        })
    }

    /// Returns the block configuration.
    pub fn config(&self) -> &SoftAttentionConfig {
        &self.config
    }

    /// Pools `(batch, positions, channels)` features into `(batch, channels)`.
    pub fn forward(
        &self,
        features: &Tensor,
        context: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        self.forward_with_weights(features, context, mask, train)
            .map(|(pooled, _)| pooled)
    }

    /// Like [`forward`](Self::forward), additionally returning the
    /// `(batch, positions)` attention weights.
    pub fn forward_with_weights(
        &self,
        features: &Tensor,
        context: &Tensor,
        mask: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let (_, _, channels) = checks::expect_positions("soft_attention.features", features)?;
        let (_, width) = checks::expect_context("soft_attention.context", context)?;
        if channels != self.config.feature_dim || width != self.config.context_dim {
            return Err(AttentionError::InvalidShape {
                context: "soft_attention input widths must match the configuration",
                got: vec![channels, width],
            });
        }

        let fused = self.config.fuse_mode.fuse(features, context)?;
        let scored_input = match &self.hidden {
            Some(layer) => {
                let activated = layer.forward(&fused)?.relu()?;
                self.dropout.forward(&activated, train)?
            }
            None => fused,
        };
        let scores = self.score.forward(&scored_input)?.squeeze(2)?;

        let scores = match mask {
            Some(mask) => masks::apply_score_mask(&scores, mask)?,
            None => scores,
        };

        let alpha = ops::normalize_scores(&scores)?;
        let pooled = ops::weighted_pool(features, &alpha)?;
        Ok((pooled, alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn build(config: SoftAttentionConfig) -> Result<SoftAttention> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        SoftAttention::new(config, vb)
    }

    #[test]
    fn weights_sum_to_one_for_every_fuse_mode() -> Result<()> {
        let device = Device::Cpu;
        let features = Tensor::randn(0f32, 1.0, (3, 6, 4), &device)?;
        let context = Tensor::randn(0f32, 1.0, (3, 4), &device)?;

        for fuse_mode in [FuseMode::Concat, FuseMode::Dot, FuseMode::Sum] {
            let mut config = SoftAttentionConfig::new(4, 4, fuse_mode);
            config.hidden_units = Some(8);
            let attention = build(config)?;
            let (pooled, alpha) =
                attention.forward_with_weights(&features, &context, None, false)?;
            assert_eq!(pooled.dims(), &[3, 4]);
            let sums = alpha.sum(1)?.flatten_all()?.to_vec1::<f32>()?;
            for sum in sums {
                assert!((sum - 1.0).abs() < 1e-5, "fuse {fuse_mode}: sum {sum}");
            }
        }
        Ok(())
    }

    #[test]
    fn disabled_hidden_layer_scores_the_fused_vector_directly() -> Result<()> {
        let device = Device::Cpu;
        let config = SoftAttentionConfig::new(4, 4, FuseMode::Sum);
        let attention = build(config)?;
        assert!(attention.hidden.is_none());

        let features = Tensor::randn(0f32, 1.0, (2, 5, 4), &device)?;
        let context = Tensor::randn(0f32, 1.0, (2, 4), &device)?;
        let pooled = attention.forward(&features, &context, None, false)?;
        assert_eq!(pooled.dims(), &[2, 4]);
        Ok(())
    }

    #[test]
    fn masked_positions_get_zero_weight() -> Result<()> {
        let device = Device::Cpu;
        let mut config = SoftAttentionConfig::new(3, 3, FuseMode::Concat);
        config.hidden_units = Some(5);
        let attention = build(config)?;

        let features = Tensor::randn(0f32, 1.0, (2, 4, 3), &device)?;
        let context = Tensor::randn(0f32, 1.0, (2, 3), &device)?;
        let mask = masks::score_mask_from_lengths(&device, &[2, 3], 4)?;
        let (_, alpha) = attention.forward_with_weights(&features, &context, Some(&mask), false)?;

        let values = alpha.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(values[2], 0.0);
        assert_eq!(values[3], 0.0);
        assert_eq!(values[7], 0.0);
        Ok(())
    }

    #[test]
    fn masked_features_cannot_change_the_output() -> Result<()> {
        let device = Device::Cpu;
        let mut config = SoftAttentionConfig::new(3, 3, FuseMode::Dot);
        config.hidden_units = Some(4);
        let attention = build(config)?;

        let base = Tensor::randn(0f32, 1.0, (1, 4, 3), &device)?;
        let context = Tensor::randn(0f32, 1.0, (1, 3), &device)?;
        let mask = masks::score_mask_from_lengths(&device, &[2], 4)?;

        // Overwrite the two masked positions with wildly different values.
        let valid = base.narrow(1, 0, 2)?;
        let garbage = Tensor::full(1e6f32, (1, 2, 3), &device)?;
        let altered = Tensor::cat(&[&valid, &garbage], 1)?;

        let reference = attention.forward(&base, &context, Some(&mask), false)?;
        let perturbed = attention.forward(&altered, &context, Some(&mask), false)?;
        let diff = reference
            .sub(&perturbed)?
            .abs()?
            .max_all()?
            .to_vec0::<f32>()?;
        assert!(diff <= f32::EPSILON);
        Ok(())
    }

    #[test]
    fn forward_is_deterministic_without_dropout() -> Result<()> {
        let device = Device::Cpu;
        let mut config = SoftAttentionConfig::new(4, 4, FuseMode::Concat);
        config.hidden_units = Some(6);
        config.dropout_p = Some(0.5);
        let attention = build(config)?;

        let features = Tensor::randn(0f32, 1.0, (2, 5, 4), &device)?;
        let context = Tensor::randn(0f32, 1.0, (2, 4), &device)?;

        let first = attention.forward(&features, &context, None, false)?;
        let second = attention.forward(&features, &context, None, false)?;
        let first = first.flatten_all()?.to_vec1::<f32>()?;
        let second = second.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let config = SoftAttentionConfig::new(4, 4, FuseMode::Sum);
        let attention = build(config).unwrap();
        let device = Device::Cpu;
        let features = Tensor::zeros((1, 3, 5), DType::F32, &device).unwrap();
        let context = Tensor::zeros((1, 4), DType::F32, &device).unwrap();
        let err = attention
            .forward(&features, &context, None, false)
            .unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }

    #[test]
    fn incompatible_fusion_fails_at_construction() {
        let config = SoftAttentionConfig::new(4, 6, FuseMode::Dot);
        let err = build(config).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidConfig { .. }));
    }
}
