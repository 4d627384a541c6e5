//! ODIN confidence scoring: temperature scaling plus input preprocessing.
//!
//! For an image `x` with logits `f(x)` and temperature `T`:
//!
//! 1. `y = argmax f(x)` (the model's own prediction, ties to the lowest index)
//! 2. `L = -log softmax(f(x) / T)[y]`
//! 3. `x' = x - eps * sign(dL/dx)`, the sign optionally rescaled per channel
//! 4. score = `max softmax(f(x') / T)`
//!
//! Stepping against the loss gradient raises the top-class probability more
//! for in-distribution images than for out-of-distribution ones, which is what
//! separates the two score distributions.

use log::trace;
use ndarray::{Array1, ArrayD, ArrayView1};

use crate::error::{Error, Result};
use crate::model::Classifier;
use crate::normalize::{ChannelLayout, normalize_perturbations};
use crate::param::OdinParam;

/// Numerically stable softmax.
pub fn softmax(logits: ArrayView1<'_, f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Index of the largest value; the first index wins ties.
pub fn argmax(values: ArrayView1<'_, f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Largest softmax probability of `logits / temperature`. NaN propagates.
pub fn scaled_confidence(logits: &Array1<f32>, temperature: u32) -> f32 {
    let scaled = logits / temperature as f32;
    softmax(scaled.view()).fold(f32::NEG_INFINITY, |acc, &p| {
        if acc.is_nan() || p.is_nan() {
            f32::NAN
        } else {
            acc.max(p)
        }
    })
}

/// Element-wise sign with `sign(0) = 0`; NaN is kept so it surfaces downstream.
fn sign(values: &ArrayD<f32>) -> ArrayD<f32> {
    values.mapv(|g| {
        if g > 0.0 {
            1.0
        } else if g < 0.0 {
            -1.0
        } else if g.is_nan() {
            f32::NAN
        } else {
            0.0
        }
    })
}

/// Gradient of `-log softmax(logits / T)[label]` with respect to the unscaled logits.
fn cross_entropy_logit_gradient(
    logits: &Array1<f32>,
    label: usize,
    temperature: f32,
) -> Array1<f32> {
    let scaled = logits / temperature;
    let mut grad = softmax(scaled.view());
    grad[label] -= 1.0;
    grad / temperature
}

/// Perturb `image` against the pseudo-label loss gradient and return the
/// temperature-scaled top-class probability of the perturbed image.
///
/// `image` is left untouched. When `apply_norm` is set the gradient signs are
/// divided by the per-channel training std before being scaled by the
/// magnitude.
pub fn odin_score(
    model: &dyn Classifier,
    image: &ArrayD<f32>,
    param: OdinParam,
    apply_norm: bool,
    layout: ChannelLayout,
) -> Result<f32> {
    let temperature = param.temperature as f32;

    let logits = model.logits(image.view())?;
    let label = argmax(logits.view())
        .ok_or_else(|| Error::Configuration("model produced no logits".to_string()))?;
    let upstream = cross_entropy_logit_gradient(&logits, label, temperature);
    let gradient = model.logits_input_gradient(image.view(), upstream.view())?;

    let mut perturbation = sign(&gradient);
    if apply_norm {
        perturbation = normalize_perturbations(perturbation, layout)?;
    }
    perturbation *= param.magnitude as f32;
    let perturbed = image - &perturbation;

    let score = scaled_confidence(&model.logits(perturbed.view())?, param.temperature);
    trace!("pseudo-label {label}, {param}: score {score}");
    if !score.is_finite() {
        return Err(Error::NonFiniteScore {
            value: score,
            temperature: param.temperature,
            magnitude: param.magnitude,
        });
    }
    Ok(score)
}
