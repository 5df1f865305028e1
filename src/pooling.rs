//! Full-extent convolutional pooling: collapse a spatial feature map to one
//! vector per batch element.
//!
//! There is no learned weighting over positions here; the block is a single
//! convolution whose kernel spans the whole spatial extent (so every input
//! position feeds the output), followed by batch normalization and ReLU.
//! Included for API symmetry with the attention blocks. Spatial input only;
//! sequence-shaped input is a configuration error.

use candle_core::Tensor;
use candle_nn::{batch_norm, init, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Module, ModuleT, VarBuilder};

use crate::error::{AttentionError, Result};

/// Configuration for [`ConvPooling`].
#[derive(Debug, Clone)]
pub struct ConvPoolingConfig {
    /// Channel width of the input feature map.
    pub feature_dim: usize,
    /// Width of the pooled output vector.
    pub units: usize,
    /// Spatial height the kernel spans.
    pub height: usize,
    /// Spatial width the kernel spans.
    pub width: usize,
}

impl ConvPoolingConfig {
    fn validate(&self) -> Result<()> {
        if self.feature_dim == 0 || self.units == 0 || self.height == 0 || self.width == 0 {
            return Err(AttentionError::InvalidConfig {
                reason: "convolutional pooling widths must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Learned full-image feature extractor pooling `(batch, height, width,
/// channels)` maps into `(batch, units)` vectors.
#[derive(Debug)]
pub struct ConvPooling {
    config: ConvPoolingConfig,
    conv: Conv2d,
    norm: BatchNorm,
}

impl ConvPooling {
    /// Builds the block under the `conv` and `norm` prefixes of `vb`.
    ///
    /// The convolution carries no bias; the batch normalization that follows
    /// it supplies the learned shift and scale.
    pub fn new(config: ConvPoolingConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        // Built by hand because the kernel may be non-square.
        let weight = vb.pp("conv").get_with_hints(
            (config.units, config.feature_dim, config.height, config.width),
            "weight",
            init::DEFAULT_KAIMING_NORMAL,
        )?;
        let conv = Conv2d::new(weight, None, Conv2dConfig::default());
        let norm = batch_norm(config.units, BatchNormConfig::default(), vb.pp("norm"))?;

        log::debug!(
            "conv pooling init: units={} kernel={}x{}",
            config.units,
            config.height,
            config.width
        );

        Ok(Self { config, conv, norm })
    }

    /// Returns the block configuration.
    pub fn config(&self) -> &ConvPoolingConfig {
        &self.config
    }

    /// Collapses a `(batch, height, width, channels)` map to `(batch, units)`.
    pub fn forward(&self, features: &Tensor, train: bool) -> Result<Tensor> {
        let (height, width, channels) = match features.dims() {
            [_, h, w, c] => (*h, *w, *c),
            dims => {
                return Err(AttentionError::InvalidShape {
                    context: "convolutional pooling only accepts spatial [batch, height, width, channels] input",
                    got: dims.to_vec(),
                })
            }
        };
        if height != self.config.height
            || width != self.config.width
            || channels != self.config.feature_dim
        {
            return Err(AttentionError::InvalidShape {
                context: "convolutional pooling input must match the configured extent",
                got: features.dims().to_vec(),
            });
        }

        let nchw = features.permute((0, 3, 1, 2))?.contiguous()?;
        // Valid padding over the full extent leaves a single spatial location.
        let collapsed = self.conv.forward(&nchw)?;
        let normalized = self.norm.forward_t(&collapsed, train)?;
        let activated = normalized.relu()?;
        Ok(activated.squeeze(3)?.squeeze(2)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{VarBuilder, VarMap};

    fn build(config: ConvPoolingConfig) -> Result<ConvPooling> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        ConvPooling::new(config, vb)
    }

    #[test]
    fn full_kernel_collapses_the_spatial_extent() -> Result<()> {
        let device = Device::Cpu;
        let config = ConvPoolingConfig {
            feature_dim: 3,
            units: 7,
            height: 2,
            width: 4,
        };
        let pooling = build(config)?;
        let features = Tensor::randn(0f32, 1.0, (2, 2, 4, 3), &device)?;
        let pooled = pooling.forward(&features, false)?;
        assert_eq!(pooled.dims(), &[2, 7]);
        Ok(())
    }

    #[test]
    fn every_position_reaches_the_output() -> Result<()> {
        let device = Device::Cpu;
        let config = ConvPoolingConfig {
            feature_dim: 2,
            units: 4,
            height: 2,
            width: 2,
        };
        let pooling = build(config)?;
        let base = Tensor::zeros((1, 2, 2, 2), DType::F32, &device)?;
        let reference = pooling.forward(&base, false)?.flatten_all()?.to_vec1::<f32>()?;

        for position in 0..4 {
            // The ReLU can swallow a bump of one sign, so probe both.
            let changed = [1000.0f32, -1000.0].iter().any(|bump| {
                let mut bumped = vec![0f32; 8];
                bumped[position * 2] = *bump;
                bumped[position * 2 + 1] = *bump;
                let features = Tensor::from_vec(bumped, (1, 2, 2, 2), &device).unwrap();
                let pooled = pooling
                    .forward(&features, false)
                    .unwrap()
                    .flatten_all()
                    .unwrap()
                    .to_vec1::<f32>()
                    .unwrap();
                pooled != reference
            });
            assert!(changed, "position {position} did not reach the output");
        }
        Ok(())
    }

    #[test]
    fn sequence_input_is_rejected() {
        let device = Device::Cpu;
        let config = ConvPoolingConfig {
            feature_dim: 3,
            units: 4,
            height: 2,
            width: 2,
        };
        let pooling = build(config).unwrap();
        let features = Tensor::zeros((1, 4, 3), DType::F32, &device).unwrap();
        let err = pooling.forward(&features, false).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }

    #[test]
    fn mismatched_extent_is_rejected() {
        let device = Device::Cpu;
        let config = ConvPoolingConfig {
            feature_dim: 3,
            units: 4,
            height: 2,
            width: 2,
        };
        let pooling = build(config).unwrap();
        let features = Tensor::zeros((1, 3, 2, 3), DType::F32, &device).unwrap();
        let err = pooling.forward(&features, false).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }
}
