//! Static registry of the supported transfer-learning backbones.
//!
//! Every backbone declares the input size it was trained at, the
//! preprocessing applied to decoded pixels, whether ODIN perturbations must
//! be rescaled by the per-channel training-set standard deviation, and the
//! constructor that turns a model artifact into a [`Classifier`].

use crate::error::{Error, Result};
use crate::model::Classifier;
use crate::network::{Network, NetworkArtifact};
use crate::normalize::ChannelLayout;

/// Pixel preprocessing applied after decoding and resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocessing {
    /// Scale to `[0, 1]`, subtract the ImageNet mean, divide by the ImageNet std.
    Torch,
    /// Scale to `[-1, 1]`.
    Tf,
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Preprocessing {
    /// Map a raw 8-bit channel value of colour channel `channel` (0 = R).
    pub fn apply(self, value: u8, channel: usize) -> f32 {
        let v = f32::from(value);
        match self {
            Self::Torch => (v / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel],
            Self::Tf => v / 127.5 - 1.0,
        }
    }
}

impl std::fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Torch => write!(f, "torch"),
            Self::Tf => write!(f, "tf"),
        }
    }
}

/// Builds a classifier for one architecture from a parsed artifact.
pub type Constructor =
    fn(&ArchitectureSpec, NetworkArtifact, ChannelLayout) -> Result<Box<dyn Classifier>>;

/// Registry entry describing one backbone.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureSpec {
    pub name: &'static str,
    /// `(height, width)` expected by the network.
    pub input_size: (usize, usize),
    pub preprocessing: Preprocessing,
    /// Whether gradient signs are divided by the per-channel std before use.
    /// Only torch-style standardized inputs need it.
    pub normalize_perturbations: bool,
    pub build: Constructor,
}

/// All known architectures, in sweep order.
pub static ARCHITECTURES: &[ArchitectureSpec] = &[
    ArchitectureSpec {
        name: "DenseNet201",
        input_size: (224, 224),
        preprocessing: Preprocessing::Torch,
        normalize_perturbations: true,
        build: dense_head,
    },
    ArchitectureSpec {
        name: "Xception",
        input_size: (299, 299),
        preprocessing: Preprocessing::Tf,
        normalize_perturbations: false,
        build: dense_head,
    },
    ArchitectureSpec {
        name: "ResNeXt50",
        input_size: (224, 224),
        preprocessing: Preprocessing::Torch,
        normalize_perturbations: true,
        build: dense_head,
    },
];

/// Look up an architecture by its exact name.
pub fn lookup(name: &str) -> Result<&'static ArchitectureSpec> {
    ARCHITECTURES
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| {
            let known: Vec<&str> = ARCHITECTURES.iter().map(|s| s.name).collect();
            Error::Configuration(format!(
                "unknown architecture '{name}' (known: {})",
                known.join(", ")
            ))
        })
}

/// Names of every registered architecture.
pub fn names() -> Vec<&'static str> {
    ARCHITECTURES.iter().map(|s| s.name).collect()
}

fn dense_head(
    spec: &ArchitectureSpec,
    artifact: NetworkArtifact,
    layout: ChannelLayout,
) -> Result<Box<dyn Classifier>> {
    if artifact.architecture != spec.name {
        return Err(Error::Configuration(format!(
            "artifact was exported for '{}' but loaded as '{}'",
            artifact.architecture, spec.name
        )));
    }
    let (height, width) = spec.input_size;
    let network = Network::from_artifact(artifact, layout.image_shape(height, width), layout)?;
    Ok(Box::new(network))
}
