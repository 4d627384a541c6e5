//! Whole-grid evaluation of one model's score tree.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use odin_core::{Distribution, ModelAttr, OdinParam, ScoreMode, read_scores, score_path};
use serde::Serialize;

use crate::detection::{ScoreSummary, auroc, detection_error};
use crate::tpr95::{BASE_SCAN, ODIN_SCAN, Tpr95, compute_tpr95};
use crate::{EvalError, Result};

/// Metrics for one `{temperature}_{magnitude}` directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridEntry {
    pub param: OdinParam,
    /// `None` when no threshold reached the TPR band.
    pub base: Option<Tpr95>,
    pub odin: Option<Tpr95>,
    pub auroc_base: f64,
    pub auroc_odin: f64,
    pub detection_error_base: f64,
    pub detection_error_odin: f64,
    pub odin_in: ScoreSummary,
    pub odin_out: ScoreSummary,
}

impl GridEntry {
    pub fn odin_fpr(&self) -> Option<f64> {
        self.odin.map(|r| r.fpr)
    }
}

/// Every evaluated grid point for one model.
#[derive(Debug, Clone, Serialize)]
pub struct GridReport {
    pub model: ModelAttr,
    pub root: PathBuf,
    pub entries: Vec<GridEntry>,
}

impl GridReport {
    /// Lowest ODIN FPR at TPR95. Ties keep the earlier grid point.
    pub fn best(&self) -> Option<&GridEntry> {
        self.entries
            .iter()
            .filter_map(|e| e.odin_fpr().map(|fpr| (fpr, e)))
            .fold(None, |best: Option<(f64, &GridEntry)>, (fpr, e)| match best {
                Some((b, _)) if b <= fpr => best,
                _ => Some((fpr, e)),
            })
            .map(|(_, e)| e)
    }

    /// Order entries by ODIN FPR, undefined results last.
    pub fn sort_by_odin_fpr(&mut self) {
        self.entries.sort_by(|a, b| match (a.odin_fpr(), b.odin_fpr()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }
}

/// Evaluate every grid directory under `root` that holds all four score
/// files of `attr`. Entries come back in grid order (temperature, then
/// magnitude).
pub fn evaluate_grid(root: &Path, attr: &ModelAttr, delta_num: usize) -> Result<GridReport> {
    let dir = fs::read_dir(root).map_err(|source| EvalError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut params = Vec::new();
    for entry in dir {
        let entry = entry.map_err(|source| EvalError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().to_str().and_then(OdinParam::from_label) {
            Some(param) => params.push(param),
            None => debug!("skipping {}", entry.path().display()),
        }
    }
    params.sort_by(|a, b| {
        a.temperature
            .cmp(&b.temperature)
            .then(a.magnitude.total_cmp(&b.magnitude))
    });

    let mut entries = Vec::with_capacity(params.len());
    for param in params {
        let paths = ScorePaths::new(root, param, attr);
        if !paths.all_exist() {
            debug!("{param}: no score files for {attr}");
            continue;
        }
        entries.push(evaluate_point(param, &paths, delta_num)?);
    }

    info!("{attr}: evaluated {} grid points under {}", entries.len(), root.display());
    Ok(GridReport {
        model: attr.clone(),
        root: root.to_path_buf(),
        entries,
    })
}

struct ScorePaths {
    base_in: PathBuf,
    base_out: PathBuf,
    odin_in: PathBuf,
    odin_out: PathBuf,
}

impl ScorePaths {
    fn new(root: &Path, param: OdinParam, attr: &ModelAttr) -> Self {
        let path = |mode, dist| score_path(root, param, attr, mode, dist);
        Self {
            base_in: path(ScoreMode::Base, Distribution::In),
            base_out: path(ScoreMode::Base, Distribution::Out),
            odin_in: path(ScoreMode::Odin, Distribution::In),
            odin_out: path(ScoreMode::Odin, Distribution::Out),
        }
    }

    fn all_exist(&self) -> bool {
        [&self.base_in, &self.base_out, &self.odin_in, &self.odin_out]
            .iter()
            .all(|p| p.is_file())
    }
}

fn evaluate_point(param: OdinParam, paths: &ScorePaths, delta_num: usize) -> Result<GridEntry> {
    let base_in = read_scores(&paths.base_in)?;
    let base_out = read_scores(&paths.base_out)?;
    let odin_in = read_scores(&paths.odin_in)?;
    let odin_out = read_scores(&paths.odin_out)?;

    let (lo, hi) = BASE_SCAN;
    let base = defined(param, "base", compute_tpr95(&base_in, &base_out, lo, hi, delta_num))?;
    let detection_error_base = detection_error(&base_in, &base_out, lo, hi, delta_num)?;

    let (lo, hi) = ODIN_SCAN;
    let odin = defined(param, "ODIN", compute_tpr95(&odin_in, &odin_out, lo, hi, delta_num))?;
    let detection_error_odin = detection_error(&odin_in, &odin_out, lo, hi, delta_num)?;

    Ok(GridEntry {
        param,
        base,
        odin,
        auroc_base: auroc(&base_in, &base_out)?,
        auroc_odin: auroc(&odin_in, &odin_out)?,
        detection_error_base,
        detection_error_odin,
        odin_in: ScoreSummary::from_scores(&odin_in)?,
        odin_out: ScoreSummary::from_scores(&odin_out)?,
    })
}

/// An undefined TPR95 is a property of the grid point, not a failure.
fn defined(param: OdinParam, which: &str, result: Result<Tpr95>) -> Result<Option<Tpr95>> {
    match result {
        Ok(r) => Ok(Some(r)),
        Err(EvalError::DivisionUndefined { .. }) => {
            warn!("{param}: {which} FPR at TPR95 undefined");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odin_core::ScoreWriter;

    fn write(
        root: &Path,
        param: OdinParam,
        attr: &ModelAttr,
        mode: ScoreMode,
        dist: Distribution,
        scores: &[f64],
    ) {
        let mut w = ScoreWriter::create(score_path(root, param, attr, mode, dist), param).unwrap();
        for &s in scores {
            w.append(s).unwrap();
        }
        w.finish().unwrap();
    }

    fn with_tail(hi: f64, lo: f64) -> Vec<f64> {
        let mut v = vec![hi; 19];
        v.push(lo);
        v
    }

    fn write_point(
        root: &Path,
        param: OdinParam,
        attr: &ModelAttr,
        odin_in: &[f64],
        odin_out: &[f64],
    ) {
        write(root, param, attr, ScoreMode::Base, Distribution::In, &with_tail(0.99, 0.3));
        write(root, param, attr, ScoreMode::Base, Distribution::Out, &[0.2; 10]);
        write(root, param, attr, ScoreMode::Odin, Distribution::In, odin_in);
        write(root, param, attr, ScoreMode::Odin, Distribution::Out, odin_out);
    }

    #[test]
    fn test_grid_picks_lowest_odin_fpr() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let attr = ModelAttr::new("DenseNet201", "latest");

        let weak = OdinParam::new(1, 0.0).unwrap();
        let strong = OdinParam::new(1000, 0.0014).unwrap();
        let flat = OdinParam::new(2, 0.0002).unwrap();
        write_point(root, weak, &attr, &with_tail(0.9, 0.05), &[0.5; 10]);
        write_point(root, strong, &attr, &with_tail(0.15, 0.02), &[0.015; 10]);
        write_point(root, flat, &attr, &[0.15; 20], &[0.1; 10]);

        // Other models and stray entries are ignored.
        let other = ModelAttr::new("Xception", "latest");
        write_point(root, OdinParam::new(5, 0.002).unwrap(), &other, &[0.15; 20], &[0.1; 10]);
        fs::create_dir(root.join("notes")).unwrap();
        fs::write(root.join("README.txt"), "scores").unwrap();

        let mut report = evaluate_grid(root, &attr, 10_000).unwrap();
        let order: Vec<_> = report.entries.iter().map(|e| e.param.temperature).collect();
        assert_eq!(order, vec![1, 2, 1000]);

        let best = report.best().unwrap();
        assert_eq!(best.param, strong);
        assert_eq!(best.odin_fpr(), Some(0.0));
        assert_eq!(best.base.unwrap().fpr, 0.0);
        assert_eq!(best.auroc_odin, 1.0);

        let weak_entry = &report.entries[0];
        assert_eq!(weak_entry.odin_fpr(), Some(1.0));
        assert!(report.entries[1].odin.is_none());

        report.sort_by_odin_fpr();
        let order: Vec<_> = report.entries.iter().map(|e| e.param).collect();
        assert_eq!(order, vec![strong, weak, flat]);
    }

    #[test]
    fn test_grid_report_serializes() {
        let tmp = tempfile::tempdir().unwrap();
        let attr = ModelAttr::new("ResNeXt50", "best_loss");
        let param = OdinParam::new(1000, 0.0).unwrap();
        write_point(tmp.path(), param, &attr, &with_tail(0.15, 0.02), &[0.015; 10]);

        let report = evaluate_grid(tmp.path(), &attr, 1_000).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["model"]["model_name"], "ResNeXt50");
        assert_eq!(json["entries"][0]["param"]["temperature"], 1000);
        assert_eq!(json["entries"][0]["odin"]["fpr"], 0.0);
    }

    #[test]
    fn test_missing_root() {
        let attr = ModelAttr::new("DenseNet201", "latest");
        assert!(matches!(
            evaluate_grid(Path::new("/nonexistent/softmax_scores"), &attr, 10),
            Err(EvalError::Io { .. })
        ));
    }

    #[test]
    fn test_corrupt_score_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let attr = ModelAttr::new("DenseNet201", "latest");
        let param = OdinParam::new(10, 0.001).unwrap();
        write_point(tmp.path(), param, &attr, &[0.1; 4], &[0.1; 4]);
        let path = score_path(tmp.path(), param, &attr, ScoreMode::Odin, Distribution::Out);
        fs::write(&path, "10, 0.001, nan?\n").unwrap();
        assert!(matches!(
            evaluate_grid(tmp.path(), &attr, 10),
            Err(EvalError::Scores(odin_core::Error::ScoreFile { .. }))
        ));
    }
}
