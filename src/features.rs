//! Typed entry points for spatial and sequential feature maps.
//!
//! Every attention block consumes features as `(batch, positions, channels)`.
//! Callers pick the entry point that matches their data instead of relying on
//! runtime rank inspection: [`flatten_spatial`] for `(batch, height, width,
//! channels)` maps and [`check_sequence`] for `(batch, steps, channels)`
//! encoder outputs.

use candle_core::Tensor;

use crate::error::{AttentionError, Result};

/// Flattens a `(batch, height, width, channels)` feature map to
/// `(batch, height * width, channels)`.
pub fn flatten_spatial(features: &Tensor) -> Result<Tensor> {
    match features.dims() {
        [batch, height, width, channels] => {
            Ok(features.reshape((*batch, height * width, *channels))?)
        }
        dims => Err(AttentionError::InvalidShape {
            context: "spatial features expect [batch, height, width, channels]",
            got: dims.to_vec(),
        }),
    }
}

/// Validates a `(batch, steps, channels)` sequence of feature vectors.
pub fn check_sequence(features: &Tensor) -> Result<Tensor> {
    match features.dims() {
        [_, _, _] => Ok(features.clone()),
        dims => Err(AttentionError::InvalidShape {
            context: "sequence features expect [batch, steps, channels]",
            got: dims.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn spatial_maps_flatten_to_positions() -> Result<()> {
        let device = Device::Cpu;
        let features = Tensor::zeros((2, 3, 4, 8), DType::F32, &device)?;
        let flat = flatten_spatial(&features)?;
        assert_eq!(flat.dims(), &[2, 12, 8]);
        Ok(())
    }

    #[test]
    fn sequence_input_is_rejected_by_spatial_entry_point() {
        let device = Device::Cpu;
        let features = Tensor::zeros((2, 5, 8), DType::F32, &device).unwrap();
        let err = flatten_spatial(&features).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }

    #[test]
    fn spatial_input_is_rejected_by_sequence_entry_point() {
        let device = Device::Cpu;
        let features = Tensor::zeros((2, 3, 4, 8), DType::F32, &device).unwrap();
        let err = check_sequence(&features).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }
}
