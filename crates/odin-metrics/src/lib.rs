//! # odin-metrics
//!
//! Evaluation of ODIN score files: FPR at 95% TPR, AUROC, detection error
//! and whole-grid reports that pick the best temperature/magnitude pair.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let root = Path::new("softmax_scores/1000_0.0014");
//! let (fpr_base, fpr_odin) = odin_metrics::tpr95(
//!     &root.join("DenseNet201_latest_Base_In.txt"),
//!     &root.join("DenseNet201_latest_Base_Out.txt"),
//!     &root.join("DenseNet201_latest_ODIN_In.txt"),
//!     &root.join("DenseNet201_latest_ODIN_Out.txt"),
//! )?;
//! println!("base {fpr_base:.4} odin {fpr_odin:.4}");
//! # Ok::<(), odin_metrics::EvalError>(())
//! ```

pub mod detection;
pub mod grid;
pub mod tpr95;

pub use detection::{ScoreSummary, auroc, detection_error};
pub use grid::{GridEntry, GridReport, evaluate_grid};
pub use tpr95::{
    BASE_SCAN, DEFAULT_DELTA_NUM, ODIN_SCAN, TPR95_MAX, TPR95_MIN, Tpr95, Tpr95Pair, compute_tpr95,
    evaluate_files, tpr95,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// No scanned threshold gave a TPR inside the 95% band.
    #[error("no threshold in [{delta_start}, {delta_end}) gives TPR within [0.9495, 0.9505]")]
    DivisionUndefined { delta_start: f64, delta_end: f64 },

    #[error("{0} scores are empty")]
    EmptyScores(&'static str),

    #[error("{which} scores contain non-finite value {value}")]
    NonFiniteScore { which: &'static str, value: f64 },

    #[error("invalid threshold scan: start {delta_start}, end {delta_end}, {delta_num} steps")]
    InvalidRange {
        delta_start: f64,
        delta_end: f64,
        delta_num: usize,
    },

    /// Reading or parsing a score file failed.
    #[error(transparent)]
    Scores(#[from] odin_core::Error),

    #[error("cannot scan {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EvalError>;

/// Scores sorted ascending so threshold counts are binary searches.
pub(crate) struct SortedScores {
    values: Vec<f64>,
}

impl SortedScores {
    pub(crate) fn new(scores: &[f64], which: &'static str) -> Result<Self> {
        if scores.is_empty() {
            return Err(EvalError::EmptyScores(which));
        }
        if let Some(&value) = scores.iter().find(|v| !v.is_finite()) {
            return Err(EvalError::NonFiniteScore { which, value });
        }
        let mut values = scores.to_vec();
        values.sort_by(f64::total_cmp);
        Ok(Self { values })
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    pub(crate) fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Fraction of scores `>= delta`.
    pub(crate) fn fraction_at_least(&self, delta: f64) -> f64 {
        let below = self.values.partition_point(|&x| x < delta);
        (self.len() - below) as f64 / self.len() as f64
    }

    /// Fraction of scores `> delta`.
    pub(crate) fn fraction_above(&self, delta: f64) -> f64 {
        let at_most = self.values.partition_point(|&x| x <= delta);
        (self.len() - at_most) as f64 / self.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_score_fractions() {
        let s = SortedScores::new(&[0.3, 0.1, 0.2, 0.2], "in").unwrap();
        assert_eq!(s.as_slice(), &[0.1, 0.2, 0.2, 0.3]);
        assert_eq!(s.fraction_at_least(0.2), 0.75);
        assert_eq!(s.fraction_above(0.2), 0.25);
        assert_eq!(s.fraction_at_least(0.0), 1.0);
        assert_eq!(s.fraction_above(0.3), 0.0);
    }
}
