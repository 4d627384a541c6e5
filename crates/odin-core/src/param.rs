//! ODIN hyper-parameter grid.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Temperatures swept by default.
pub const DEFAULT_TEMPERATURES: [u32; 10] = [1, 2, 5, 10, 20, 50, 100, 200, 500, 1000];

/// Spacing of the default magnitude grid.
pub const MAGNITUDE_STEP: f64 = 0.0002;

/// Number of magnitudes in the default grid, `0.0` to `0.004` inclusive.
pub const MAGNITUDE_COUNT: usize = 21;

/// One point of the ODIN grid: softmax temperature and perturbation magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdinParam {
    pub temperature: u32,
    pub magnitude: f64,
}

impl OdinParam {
    pub fn new(temperature: u32, magnitude: f64) -> Result<Self> {
        if temperature == 0 {
            return Err(Error::Configuration("temperature must be positive".to_string()));
        }
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(Error::Configuration(format!(
                "magnitude must be a non-negative finite number, got {magnitude}"
            )));
        }
        Ok(Self {
            temperature,
            magnitude,
        })
    }

    /// Directory label `{temperature}_{magnitude}`, e.g. `1000_0.0014`.
    ///
    /// Magnitudes print with their shortest round-trip form and keep a
    /// trailing `.0` when integral (`1_0.0`), matching existing score trees.
    pub fn label(&self) -> String {
        format!("{}_{:?}", self.temperature, self.magnitude)
    }

    /// Inverse of [`OdinParam::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        let (t, m) = label.split_once('_')?;
        Self::new(t.parse().ok()?, m.parse().ok()?).ok()
    }
}

impl std::fmt::Display for OdinParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}, eps={:?}", self.temperature, self.magnitude)
    }
}

/// `0.0, 0.0002, ..., 0.004`, each rounded to four decimals.
pub fn default_magnitudes() -> Vec<f64> {
    (0..MAGNITUDE_COUNT)
        .map(|i| (i as f64 * MAGNITUDE_STEP * 1e4).round() / 1e4)
        .collect()
}

/// Temperature-major cartesian product of the two axes.
pub fn grid(temperatures: &[u32], magnitudes: &[f64]) -> Result<Vec<OdinParam>> {
    temperatures
        .iter()
        .flat_map(|&t| magnitudes.iter().map(move |&m| OdinParam::new(t, m)))
        .collect()
}
