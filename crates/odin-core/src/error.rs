//! Error type shared by every stage of the scoring pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading models, images or predictions, or while scoring.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unknown architecture, missing logit layer, malformed network.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid tensor shape: expected {expected}, found {found:?}")]
    InvalidShape { expected: String, found: Vec<usize> },

    #[error("prediction table {path}, line {line}: {message}")]
    PredictionTable {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to parse model artifact {path}: {source}")]
    ModelArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("score file {path}, line {line}: {message}")]
    ScoreFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("non-finite confidence {value} at temperature {temperature}, magnitude {magnitude}")]
    NonFiniteScore {
        value: f32,
        temperature: u32,
        magnitude: f64,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
