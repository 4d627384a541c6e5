//! The ODIN parameter sweep.
//!
//! For every (architecture, checkpoint) pair the model is loaded once and
//! scored against both image populations over the full temperature x
//! magnitude grid. Each grid point gets its own directory holding the Base
//! and ODIN score files of every model and population. Only one model is
//! resident at a time: it is released before the next pair is loaded.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::architecture::{self, ArchitectureSpec};
use crate::error::{Error, Result};
use crate::images::{ImageCursor, ImageLoader};
use crate::model::{Classifier, ModelAttr, ModelLoader};
use crate::normalize::ChannelLayout;
use crate::param::{self, DEFAULT_TEMPERATURES, OdinParam};
use crate::perturbation::odin_score;
use crate::predictions::PredictionTable;
use crate::scores::{DEFAULT_SCORE_ROOT, Distribution, ScoreMode, ScoreWriter, score_path};

/// Checkpoint postfixes swept by default.
pub const DEFAULT_POSTFIXES: [&str; 3] = ["best_balanced_acc", "best_loss", "latest"];

/// Everything a sweep needs to know. Missing JSON fields take the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// In-distribution prediction tables, `{model_name}_{postfix}.csv`.
    pub pred_result_folder: PathBuf,
    /// In-distribution images.
    pub image_folder: PathBuf,
    /// Out-of-distribution prediction tables.
    pub out_dist_pred_result_folder: PathBuf,
    /// Out-of-distribution images.
    pub out_dist_image_folder: PathBuf,
    /// Model artifacts, `{model_name}_{postfix}.json`.
    pub model_folder: PathBuf,
    pub num_classes: usize,
    /// Root of the score tree.
    pub output_dir: PathBuf,
    pub channel_layout: ChannelLayout,
    pub model_names: Vec<String>,
    pub postfixes: Vec<String>,
    pub temperatures: Vec<u32>,
    pub magnitudes: Vec<f64>,
    /// Extension appended to image identifiers, without the dot.
    pub image_extension: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            pred_result_folder: PathBuf::from("predict_results"),
            image_folder: PathBuf::from("images"),
            out_dist_pred_result_folder: PathBuf::from("out_dist_predict_results"),
            out_dist_image_folder: PathBuf::from("out_dist_images"),
            model_folder: PathBuf::from("saved_models"),
            num_classes: 8,
            output_dir: PathBuf::from(DEFAULT_SCORE_ROOT),
            channel_layout: ChannelLayout::default(),
            model_names: architecture::names().into_iter().map(String::from).collect(),
            postfixes: DEFAULT_POSTFIXES.iter().map(|s| s.to_string()).collect(),
            temperatures: DEFAULT_TEMPERATURES.to_vec(),
            magnitudes: param::default_magnitudes(),
            image_extension: "jpg".to_string(),
        }
    }
}

impl SweepConfig {
    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    /// Check the config before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(Error::Configuration("num_classes must be positive".to_string()));
        }
        if self.model_names.is_empty() || self.postfixes.is_empty() {
            return Err(Error::Configuration("no models to sweep".to_string()));
        }
        for name in &self.model_names {
            architecture::lookup(name)?;
        }
        if self.grid()?.is_empty() {
            return Err(Error::Configuration("empty temperature/magnitude grid".to_string()));
        }
        Ok(())
    }

    /// Models in sweep order: architecture-major, then postfix.
    pub fn model_attrs(&self) -> Vec<ModelAttr> {
        self.model_names
            .iter()
            .flat_map(|m| self.postfixes.iter().map(move |p| ModelAttr::new(m.clone(), p.clone())))
            .collect()
    }

    pub fn grid(&self) -> Result<Vec<OdinParam>> {
        param::grid(&self.temperatures, &self.magnitudes)
    }

    fn folders(&self, dist: Distribution) -> (&Path, &Path) {
        match dist {
            Distribution::In => (self.pred_result_folder.as_path(), self.image_folder.as_path()),
            Distribution::Out => (
                self.out_dist_pred_result_folder.as_path(),
                self.out_dist_image_folder.as_path(),
            ),
        }
    }
}

/// Totals for a finished sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub models: usize,
    pub files_written: usize,
    pub odin_scores: usize,
}

/// Run the full sweep.
pub fn run<L, I>(config: &SweepConfig, loader: &mut L, images: &I) -> Result<SweepSummary>
where
    L: ModelLoader + ?Sized,
    I: ImageLoader + ?Sized,
{
    config.validate()?;
    let grid = config.grid()?;
    let mut summary = SweepSummary::default();

    for attr in config.model_attrs() {
        let spec = attr.architecture()?;
        let model = loader.load(&attr)?;
        let logits = model.num_classes();
        if logits != config.num_classes {
            loader.release(model);
            return Err(Error::Configuration(format!(
                "{attr}: model has {logits} logits, config num_classes is {}",
                config.num_classes
            )));
        }
        let outcome = sweep_model(config, &grid, &attr, spec, model.as_ref(), images, &mut summary);
        loader.release(model);
        outcome?;
        summary.models += 1;
        debug!("{attr} done, {} model(s) resident", loader.resident_models());
    }

    info!(
        "sweep finished: {} models, {} files, {} ODIN scores",
        summary.models, summary.files_written, summary.odin_scores
    );
    Ok(summary)
}

fn sweep_model<I: ImageLoader + ?Sized>(
    config: &SweepConfig,
    grid: &[OdinParam],
    attr: &ModelAttr,
    spec: &ArchitectureSpec,
    model: &dyn Classifier,
    images: &I,
    summary: &mut SweepSummary,
) -> Result<()> {
    let apply_norm = spec.normalize_perturbations;

    for dist in Distribution::ALL {
        info!("Processing {dist}-distribution images for {attr}");
        let (pred_folder, image_folder) = config.folders(dist);
        let table = PredictionTable::load(
            &pred_folder.join(format!("{}.csv", attr.stem())),
            image_folder,
            &config.image_extension,
            config.num_classes,
        )?;
        let base_scores = table.base_scores();
        let mut cursor = ImageCursor::new(table.image_paths(), images, spec, config.channel_layout);

        for &param in grid {
            info!("ODIN {param}");

            let path = score_path(&config.output_dir, param, attr, ScoreMode::Base, dist);
            let mut base = ScoreWriter::create(path, param)?;
            for &score in &base_scores {
                base.append(score)?;
            }
            base.finish()?;

            let path = score_path(&config.output_dir, param, attr, ScoreMode::Odin, dist);
            let mut odin = ScoreWriter::create(path, param)?;
            cursor.reset();
            while let Some(image) = cursor.next_image()? {
                let score = odin_score(model, image, param, apply_norm, config.channel_layout)?;
                odin.append(score)?;
            }
            summary.odin_scores += odin.finish()?;
            summary.files_written += 2;
        }
    }
    Ok(())
}
