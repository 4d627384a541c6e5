//! Threshold-free and threshold-minimising detection metrics.
//!
//! In-distribution scores are the positive class throughout: a detector
//! keeps an image when its score is at least the threshold.

use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::tpr95::check_scan;
use crate::{Result, SortedScores};

// ═══════════════════════════════════════════════════════════════════════════════
// AUROC
// ═══════════════════════════════════════════════════════════════════════════════

/// Area under the ROC curve, i.e. the probability that a random
/// in-distribution score exceeds a random out-of-distribution one, with ties
/// counted as one half. Computed with one merge pass over both sorted
/// populations.
pub fn auroc(scores_in: &[f64], scores_out: &[f64]) -> Result<f64> {
    let scores_in = SortedScores::new(scores_in, "in-distribution")?;
    let scores_out = SortedScores::new(scores_out, "out-of-distribution")?;
    let (a, b) = (scores_in.as_slice(), scores_out.as_slice());

    // Walk both sorted lists; for each block of equal values, every
    // in-score beats all strictly smaller out-scores and ties the equal ones.
    let mut wins = 0.0;
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() {
        let value = a[i];
        let block_in = a[i..].partition_point(|&x| x == value);
        while j < b.len() && b[j] < value {
            j += 1;
        }
        let ties = b[j..].partition_point(|&x| x == value);
        wins += block_in as f64 * (j as f64 + 0.5 * ties as f64);
        i += block_in;
    }
    Ok(wins / (a.len() as f64 * b.len() as f64))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Detection error
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum over scanned thresholds of `0.5 * (1 - tpr) + 0.5 * fpr`.
///
/// Uses the same threshold grid and comparisons as
/// [`compute_tpr95`](crate::compute_tpr95).
pub fn detection_error(
    scores_in: &[f64],
    scores_out: &[f64],
    delta_start: f64,
    delta_end: f64,
    delta_num: usize,
) -> Result<f64> {
    check_scan(delta_start, delta_end, delta_num)?;
    let scores_in = SortedScores::new(scores_in, "in-distribution")?;
    let scores_out = SortedScores::new(scores_out, "out-of-distribution")?;

    let step = (delta_end - delta_start) / delta_num as f64;
    let mut best = 1.0_f64;
    for i in 0..delta_num {
        let delta = delta_start + i as f64 * step;
        let miss = 1.0 - scores_in.fraction_at_least(delta);
        let false_alarm = scores_out.fraction_above(delta);
        best = best.min(0.5 * (miss + false_alarm));
    }
    Ok(best)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Score summaries
// ═══════════════════════════════════════════════════════════════════════════════

/// Shape of one score population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    /// 5th percentile.
    pub q05: f64,
    /// 95th percentile.
    pub q95: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        let sorted = SortedScores::new(scores, "summarised")?;
        let values = sorted.as_slice();
        let mut data = Data::new(values.to_vec());
        Ok(Self {
            count: values.len(),
            mean: Statistics::mean(values),
            std_dev: Statistics::population_std_dev(values),
            min: Statistics::min(values),
            median: data.median(),
            max: Statistics::max(values),
            q05: data.quantile(0.05),
            q95: data.quantile(0.95),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvalError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pairwise_auroc(a: &[f64], b: &[f64]) -> f64 {
        let mut wins = 0.0;
        for &x in a {
            for &y in b {
                if x > y {
                    wins += 1.0;
                } else if x == y {
                    wins += 0.5;
                }
            }
        }
        wins / (a.len() * b.len()) as f64
    }

    #[test]
    fn test_auroc_extremes() {
        assert_eq!(auroc(&[0.9, 0.8], &[0.1, 0.2, 0.3]).unwrap(), 1.0);
        assert_eq!(auroc(&[0.1, 0.2], &[0.8, 0.9]).unwrap(), 0.0);
        assert_eq!(auroc(&[0.5, 0.5], &[0.5]).unwrap(), 0.5);
    }

    #[test]
    fn test_auroc_matches_pairwise_count_with_ties() {
        let mut rng = StdRng::seed_from_u64(7);
        // Coarse values so ties are frequent.
        let a: Vec<f64> = (0..120).map(|_| rng.random_range(0..20) as f64 / 20.0).collect();
        let b: Vec<f64> = (0..90).map(|_| rng.random_range(0..15) as f64 / 20.0).collect();
        let fast = auroc(&a, &b).unwrap();
        let slow = pairwise_auroc(&a, &b);
        assert!((fast - slow).abs() < 1e-12, "{fast} vs {slow}");
    }

    #[test]
    fn test_auroc_rejects_empty() {
        assert!(matches!(auroc(&[], &[0.1]), Err(EvalError::EmptyScores(_))));
    }

    #[test]
    fn test_detection_error() {
        // Perfectly separable.
        let d = detection_error(&[0.9; 10], &[0.1; 10], 0.0, 1.0, 100).unwrap();
        assert_eq!(d, 0.0);
        // Identical populations: the best a threshold can do is 0.5.
        let same = [0.25, 0.75];
        let d = detection_error(&same, &same, 0.0, 1.0, 10).unwrap();
        assert_eq!(d, 0.5);
    }

    #[test]
    fn test_detection_error_partial_overlap() {
        // One out-score above every in-score: best threshold misses nothing
        // and lets one of four out-scores through.
        let scores_in = [0.6, 0.7, 0.8, 0.9];
        let scores_out = [0.1, 0.2, 0.3, 0.95];
        let d = detection_error(&scores_in, &scores_out, 0.0, 1.0, 100).unwrap();
        assert!((d - 0.125).abs() < 1e-12, "{d}");
    }

    #[test]
    fn test_score_summary() {
        let s = ScoreSummary::from_scores(&[0.4, 0.1, 0.3, 0.2]).unwrap();
        assert_eq!(s.count, 4);
        assert!((s.mean - 0.25).abs() < 1e-12);
        assert_eq!(s.min, 0.1);
        assert_eq!(s.max, 0.4);
        assert!((s.median - 0.25).abs() < 1e-12);
        assert!((s.std_dev - 0.0125_f64.sqrt()).abs() < 1e-12);
        assert!(s.q05 <= s.median && s.median <= s.q95);
    }

    #[test]
    fn test_score_summary_single_value() {
        let s = ScoreSummary::from_scores(&[0.7]).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.median, 0.7);
        assert!(ScoreSummary::from_scores(&[]).is_err());
    }
}
