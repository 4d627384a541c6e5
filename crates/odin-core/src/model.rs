//! Classifier abstraction and model artifact loading.
//!
//! The scoring pipeline only needs two things from a trained network: the
//! pre-softmax logits for an image, and the gradient of some scalar function
//! of those logits with respect to the image. [`Classifier`] exposes exactly
//! that, with every pass evaluated in inference mode.
//!
//! Models are owned through a [`ModelLoader`]: it hands out one boxed
//! classifier per [`ModelAttr`] and takes it back through
//! [`ModelLoader::release`], which keeps the resident-model count observable.

use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::architecture::{self, ArchitectureSpec};
use crate::error::{Error, Result};
use crate::network::NetworkArtifact;
use crate::normalize::ChannelLayout;

/// Name of the dense layer whose pre-activation output is taken as logits.
pub const LOGIT_LAYER: &str = "dense_pred";

/// A trained image classifier evaluated in inference mode.
pub trait Classifier {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Pre-softmax class logits for a single image.
    fn logits(&self, image: ArrayViewD<'_, f32>) -> Result<Array1<f32>>;

    /// Vector-Jacobian product of the logits with respect to the input.
    ///
    /// Given `upstream = dL/dlogits` for any differentiable scalar `L`,
    /// returns `dL/dimage`, shaped like `image`.
    fn logits_input_gradient(
        &self,
        image: ArrayViewD<'_, f32>,
        upstream: ArrayView1<'_, f32>,
    ) -> Result<ArrayD<f32>>;
}

/// Identifies one trained checkpoint: architecture plus checkpoint postfix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelAttr {
    pub model_name: String,
    pub postfix: String,
}

impl ModelAttr {
    pub fn new(model_name: impl Into<String>, postfix: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            postfix: postfix.into(),
        }
    }

    /// `{model_name}_{postfix}`, shared by artifacts, prediction tables and score files.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.model_name, self.postfix)
    }

    /// Registry entry for this model's architecture.
    pub fn architecture(&self) -> Result<&'static ArchitectureSpec> {
        architecture::lookup(&self.model_name)
    }
}

impl std::fmt::Display for ModelAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stem())
    }
}

/// Loads classifiers and tracks how many are resident.
pub trait ModelLoader {
    fn load(&mut self, attr: &ModelAttr) -> Result<Box<dyn Classifier>>;

    /// Free a model obtained from [`ModelLoader::load`].
    fn release(&mut self, model: Box<dyn Classifier>);

    /// Models handed out and not yet released.
    fn resident_models(&self) -> usize;
}

/// Loads JSON model artifacts named `{model_name}_{postfix}.json` from a folder.
#[derive(Debug)]
pub struct ModelStore {
    folder: PathBuf,
    layout: ChannelLayout,
    resident: usize,
}

impl ModelStore {
    pub fn new(folder: impl Into<PathBuf>, layout: ChannelLayout) -> Self {
        Self {
            folder: folder.into(),
            layout,
            resident: 0,
        }
    }

    /// Path of the artifact for `attr`.
    pub fn artifact_path(&self, attr: &ModelAttr) -> PathBuf {
        self.folder.join(format!("{}.json", attr.stem()))
    }
}

impl ModelLoader for ModelStore {
    fn load(&mut self, attr: &ModelAttr) -> Result<Box<dyn Classifier>> {
        let spec = attr.architecture()?;
        let path = self.artifact_path(attr);
        info!("Load model: {}", path.display());
        let artifact = read_artifact(&path)?;
        let model = (spec.build)(spec, artifact, self.layout)?;
        self.resident += 1;
        Ok(model)
    }

    fn release(&mut self, model: Box<dyn Classifier>) {
        drop(model);
        self.resident = self.resident.saturating_sub(1);
        debug!("released model, {} resident", self.resident);
    }

    fn resident_models(&self) -> usize {
        self.resident
    }
}

/// Read and parse a network artifact from disk.
pub fn read_artifact(path: &Path) -> Result<NetworkArtifact> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| Error::ModelArtifact {
        path: path.to_path_buf(),
        source,
    })
}
