//! False-positive rate at 95% true-positive rate.
//!
//! A threshold `delta` labels a score as in-distribution when `score >= delta`.
//! Thresholds are scanned on a fixed grid; every threshold whose TPR lands in
//! `[0.9495, 0.9505]` contributes its FPR (`out > delta`), and the result is
//! the mean over those thresholds.

use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use crate::{EvalError, Result, SortedScores};

/// Lower edge of the accepted TPR band.
pub const TPR95_MIN: f64 = 0.9495;
/// Upper edge of the accepted TPR band.
pub const TPR95_MAX: f64 = 0.9505;
/// Thresholds scanned by default.
pub const DEFAULT_DELTA_NUM: usize = 100_000;
/// Threshold scan for baseline softmax scores.
pub const BASE_SCAN: (f64, f64) = (0.01, 1.0);
/// Threshold scan for ODIN scores, which temperature scaling compresses
/// towards `1 / num_classes`.
pub const ODIN_SCAN: (f64, f64) = (0.01, 0.2);

/// Outcome of a TPR95 scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tpr95 {
    /// Mean FPR over qualifying thresholds.
    pub fpr: f64,
    /// Number of qualifying thresholds.
    pub sample_count: usize,
    pub delta_min: f64,
    pub delta_max: f64,
}

/// Baseline and ODIN results for one model/grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tpr95Pair {
    pub base: Tpr95,
    pub odin: Tpr95,
}

/// Scan `delta_num` thresholds `delta_start + i * step` over
/// `[delta_start, delta_end)` and average the FPR of those in the TPR band.
///
/// Fails with [`EvalError::DivisionUndefined`] when no threshold qualifies.
pub fn compute_tpr95(
    scores_in: &[f64],
    scores_out: &[f64],
    delta_start: f64,
    delta_end: f64,
    delta_num: usize,
) -> Result<Tpr95> {
    check_scan(delta_start, delta_end, delta_num)?;
    let scores_in = SortedScores::new(scores_in, "in-distribution")?;
    let scores_out = SortedScores::new(scores_out, "out-of-distribution")?;

    let step = (delta_end - delta_start) / delta_num as f64;
    let mut fpr_sum = 0.0;
    let mut count = 0usize;
    let mut delta_min = f64::MAX;
    let mut delta_max = f64::MIN_POSITIVE;

    for i in 0..delta_num {
        let delta = delta_start + i as f64 * step;
        let tpr = scores_in.fraction_at_least(delta);
        if (TPR95_MIN..=TPR95_MAX).contains(&tpr) {
            let error = scores_out.fraction_above(delta);
            delta_min = delta_min.min(delta);
            delta_max = delta_max.max(delta);
            fpr_sum += error;
            count += 1;
        }
    }

    if count == 0 {
        return Err(EvalError::DivisionUndefined {
            delta_start,
            delta_end,
        });
    }

    let result = Tpr95 {
        fpr: fpr_sum / count as f64,
        sample_count: count,
        delta_min,
        delta_max,
    };
    debug!(
        "fpr:{}, tpr95_delta_count:{}, tpr95_delta_min:{}, tpr95_delta_max:{}",
        result.fpr, result.sample_count, result.delta_min, result.delta_max
    );
    Ok(result)
}

pub(crate) fn check_scan(delta_start: f64, delta_end: f64, delta_num: usize) -> Result<()> {
    if delta_num == 0
        || !delta_start.is_finite()
        || !delta_end.is_finite()
        || delta_end <= delta_start
    {
        return Err(EvalError::InvalidRange {
            delta_start,
            delta_end,
            delta_num,
        });
    }
    Ok(())
}

/// Evaluate four score files with the default scan ranges.
pub fn evaluate_files(
    base_in: &Path,
    base_out: &Path,
    odin_in: &Path,
    odin_out: &Path,
) -> Result<Tpr95Pair> {
    let base = compute_tpr95(
        &odin_core::read_scores(base_in)?,
        &odin_core::read_scores(base_out)?,
        BASE_SCAN.0,
        BASE_SCAN.1,
        DEFAULT_DELTA_NUM,
    )?;
    let odin = compute_tpr95(
        &odin_core::read_scores(odin_in)?,
        &odin_core::read_scores(odin_out)?,
        ODIN_SCAN.0,
        ODIN_SCAN.1,
        DEFAULT_DELTA_NUM,
    )?;
    info!("FPR at TPR95: base {:.4}, ODIN {:.4}", base.fpr, odin.fpr);
    Ok(Tpr95Pair { base, odin })
}

/// `(fpr_base, fpr_odin)` for four score files.
pub fn tpr95(
    base_in: &Path,
    base_out: &Path,
    odin_in: &Path,
    odin_out: &Path,
) -> Result<(f64, f64)> {
    let pair = evaluate_files(base_in, base_out, odin_in, odin_out)?;
    Ok((pair.base.fpr, pair.odin.fpr))
}
