//! # odin-core
//!
//! **Out-of-distribution scoring for skin-lesion classifiers with ODIN.**
//!
//! ODIN separates in-distribution from out-of-distribution images using two
//! knobs on a trained classifier: softmax temperature scaling and a small
//! input perturbation against the gradient of the model's own pseudo-label
//! loss. This crate computes those scores over a grid of temperatures and
//! magnitudes and writes them as plain-text score files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use odin_core::{DiskImageLoader, ModelStore, SweepConfig};
//!
//! let config = SweepConfig::default();
//! let mut models = ModelStore::new(&config.model_folder, config.channel_layout);
//! let summary = odin_core::sweep::run(&config, &mut models, &DiskImageLoader)?;
//! println!("{} score files written", summary.files_written);
//! # Ok::<(), odin_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Prediction table + images → [`ImageCursor`] → [`odin_score`] (using
//! [`normalize_perturbations`] for torch-preprocessed backbones) →
//! [`ScoreWriter`] under `softmax_scores/{temperature}_{magnitude}/`.
//!
//! Models implement [`Classifier`]; the bundled [`Network`] evaluates the
//! dense classification head described by a JSON artifact and is selected
//! through the static [`architecture`] registry.

pub mod architecture;
pub mod error;
pub mod images;
pub mod model;
pub mod network;
pub mod normalize;
pub mod param;
pub mod perturbation;
pub mod predictions;
pub mod scores;
pub mod sweep;

pub use architecture::{ARCHITECTURES, ArchitectureSpec, Preprocessing};
pub use error::{Error, Result};
pub use images::{DiskImageLoader, ImageCursor, ImageLoader};
pub use model::{Classifier, LOGIT_LAYER, ModelAttr, ModelLoader, ModelStore};
pub use network::{Activation, LayerSpec, Network, NetworkArtifact};
pub use normalize::{ChannelLayout, PERTURBATION_STD, normalize_perturbations};
pub use param::{DEFAULT_TEMPERATURES, OdinParam, default_magnitudes};
pub use perturbation::{odin_score, softmax};
pub use predictions::{PredictionRow, PredictionTable};
pub use scores::{
    DEFAULT_SCORE_ROOT, Distribution, ScoreMode, ScoreRecord, ScoreWriter, read_records,
    read_scores, score_path,
};
pub use sweep::{SweepConfig, SweepSummary};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
