//! Channel-wise rescaling of perturbation sign tensors.
//!
//! Gradient signs live in the unit box, while torch-style preprocessed images
//! are standardized per channel. Dividing the signs by the training-set
//! standard deviation of each colour channel moves the perturbation into the
//! same space as the network input.

use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-channel (R, G, B) standard deviation of the ISIC training images.
pub const PERTURBATION_STD: [f32; 3] = [0.2422, 0.2235, 0.2315];

/// Memory layout of image tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// `(C, H, W)` or `(N, C, H, W)`.
    ChannelsFirst,
    /// `(H, W, C)` or `(N, H, W, C)`.
    #[default]
    ChannelsLast,
}

impl ChannelLayout {
    /// Index of the channel axis for a tensor of the given rank (3 or 4).
    pub fn channel_axis(self, ndim: usize) -> Option<usize> {
        match (self, ndim) {
            (Self::ChannelsFirst, 3) => Some(0),
            (Self::ChannelsFirst, 4) => Some(1),
            (Self::ChannelsLast, 3) => Some(2),
            (Self::ChannelsLast, 4) => Some(3),
            _ => None,
        }
    }

    /// Shape of a single image of `height` x `width` with three channels.
    pub fn image_shape(self, height: usize, width: usize) -> [usize; 3] {
        match self {
            Self::ChannelsFirst => [3, height, width],
            Self::ChannelsLast => [height, width, 3],
        }
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelsFirst => write!(f, "channels_first"),
            Self::ChannelsLast => write!(f, "channels_last"),
        }
    }
}

impl std::str::FromStr for ChannelLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "channels_first" => Ok(Self::ChannelsFirst),
            "channels_last" => Ok(Self::ChannelsLast),
            other => Err(Error::Configuration(format!(
                "unknown channel layout '{other}' (expected channels_first or channels_last)"
            ))),
        }
    }
}

/// Divide each colour channel of `signs` by [`PERTURBATION_STD`].
///
/// Accepts a single image (rank 3) or a batch (rank 4). The tensor is consumed
/// and returned with an identical shape.
pub fn normalize_perturbations(
    mut signs: ArrayD<f32>,
    layout: ChannelLayout,
) -> Result<ArrayD<f32>> {
    let axis = layout
        .channel_axis(signs.ndim())
        .ok_or_else(|| invalid_shape(layout, signs.shape()))?;
    if signs.len_of(Axis(axis)) != PERTURBATION_STD.len() {
        return Err(invalid_shape(layout, signs.shape()));
    }

    for (mut channel, std) in signs.axis_iter_mut(Axis(axis)).zip(PERTURBATION_STD) {
        channel.mapv_inplace(|v| v / std);
    }
    Ok(signs)
}

fn invalid_shape(layout: ChannelLayout, shape: &[usize]) -> Error {
    Error::InvalidShape {
        expected: format!("rank 3 or 4 tensor with 3 channels ({layout})"),
        found: shape.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_channels_last_divides_each_channel() {
        let x = ArrayD::<f32>::ones(IxDyn(&[2, 2, 3]));
        let out = normalize_perturbations(x, ChannelLayout::ChannelsLast).unwrap();
        assert_eq!(out.shape(), &[2, 2, 3]);
        for row in 0..2 {
            for col in 0..2 {
                assert!((out[[row, col, 0]] - 1.0 / 0.2422).abs() < 1e-5);
                assert!((out[[row, col, 1]] - 1.0 / 0.2235).abs() < 1e-5);
                assert!((out[[row, col, 2]] - 1.0 / 0.2315).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_channels_first_single_and_batched() {
        let single = ArrayD::<f32>::from_elem(IxDyn(&[3, 4, 5]), -1.0);
        let out = normalize_perturbations(single, ChannelLayout::ChannelsFirst).unwrap();
        assert!((out[[0, 3, 4]] + 1.0 / 0.2422).abs() < 1e-5);
        assert!((out[[2, 0, 0]] + 1.0 / 0.2315).abs() < 1e-5);

        let batch = ArrayD::<f32>::ones(IxDyn(&[2, 3, 4, 4]));
        let out = normalize_perturbations(batch, ChannelLayout::ChannelsFirst).unwrap();
        assert_eq!(out.shape(), &[2, 3, 4, 4]);
        assert!((out[[1, 1, 2, 2]] - 1.0 / 0.2235).abs() < 1e-5);
    }

    #[test]
    fn test_zero_signs_stay_zero() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 3, 3]));
        let out = normalize_perturbations(x, ChannelLayout::ChannelsLast).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_wrong_channel_count_is_invalid_shape() {
        let x = Array::<f32, _>::ones(IxDyn(&[4, 4, 1]));
        let err = normalize_perturbations(x, ChannelLayout::ChannelsLast).unwrap_err();
        assert!(matches!(err, Error::InvalidShape { .. }));

        // Channels-last data interpreted as channels-first.
        let x = Array::<f32, _>::ones(IxDyn(&[8, 8, 3]));
        assert!(normalize_perturbations(x, ChannelLayout::ChannelsFirst).is_err());
    }

    #[test]
    fn test_unsupported_rank_is_invalid_shape() {
        let x = Array::<f32, _>::ones(IxDyn(&[3, 3]));
        assert!(matches!(
            normalize_perturbations(x, ChannelLayout::ChannelsLast),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_layout_parse_and_display() {
        for layout in [ChannelLayout::ChannelsFirst, ChannelLayout::ChannelsLast] {
            let parsed: ChannelLayout = layout.to_string().parse().unwrap();
            assert_eq!(parsed, layout);
        }
        assert!("nhwc".parse::<ChannelLayout>().is_err());
    }
}
