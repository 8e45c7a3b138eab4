//! Gaussian mechanism: per-layer clipping and calibrated noise.
//!
//! Noise standard deviation follows the classic calibration
//! `sigma = sqrt(2 * ln(1.25 / delta)) / epsilon` and is sampled with the
//! Box-Muller transform from two independent uniform draws per coordinate.

use rand::Rng;

use crate::config::AdaptiveClipping;
use crate::math::norms::l2_norm;
use crate::update::Layer;

/// Smallest uniform draw fed to `ln` in Box-Muller.
const MIN_UNIFORM: f64 = 1e-300;

/// Bounds for the adaptive clip norm.
const MIN_CLIP_NORM: f64 = 1e-6;
const MAX_CLIP_NORM: f64 = 1e6;

/// Gaussian noise scale for `(epsilon, delta)`.
///
/// Callers must have validated `epsilon > 0` and `0 < delta < 1`.
pub fn gaussian_noise_scale(epsilon: f64, delta: f64) -> f64 {
    (2.0 * (1.25 / delta).ln()).sqrt() / epsilon
}

/// Draw one standard normal sample via Box-Muller.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen::<f64>() is in [0, 1); flip to (0, 1] so ln never sees 0
    let u1 = (1.0 - rng.gen::<f64>()).max(MIN_UNIFORM);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Rescale `layer` in place so its L2 norm is at most `clip_norm`.
///
/// Returns the pre-clip norm. Layers already within the bound are untouched.
pub fn clip_layer(layer: &mut Layer, clip_norm: f64) -> f64 {
    let norm = l2_norm(layer);
    if norm > clip_norm {
        let scale = (clip_norm / norm) as f32;
        layer.mapv_inplace(|x| x * scale);
    }
    norm
}

/// Add zero-mean Gaussian noise with standard deviation `noise_scale`.
pub fn add_gaussian_noise<R: Rng + ?Sized>(layer: &mut Layer, noise_scale: f64, rng: &mut R) {
    if noise_scale == 0.0 {
        return;
    }
    for x in layer.iter_mut() {
        *x += (standard_normal(rng) * noise_scale) as f32;
    }
}

/// Clip norm state: fixed, or tracking a target unclipped quantile.
#[derive(Clone, Debug)]
pub struct ClipNorm {
    current: f64,
    adaptive: Option<AdaptiveClipping>,
}

impl ClipNorm {
    /// Start at `initial`, adapting when `adaptive` is set.
    pub fn new(initial: f64, adaptive: Option<AdaptiveClipping>) -> Self {
        Self {
            current: initial,
            adaptive,
        }
    }

    /// Clip norm to apply to the next update.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Feed the pre-clip layer norms of one update.
    ///
    /// `C <- C * exp(-lr * (unclipped_fraction - target_quantile))`
    pub fn observe(&mut self, layer_norms: &[f64]) {
        let Some(adaptive) = &self.adaptive else {
            return;
        };
        if layer_norms.is_empty() {
            return;
        }
        let unclipped = layer_norms.iter().filter(|&&n| n <= self.current).count();
        let fraction = unclipped as f64 / layer_norms.len() as f64;
        let step = (-adaptive.learning_rate * (fraction - adaptive.target_quantile)).exp();
        self.current = (self.current * step).clamp(MIN_CLIP_NORM, MAX_CLIP_NORM);
    }
}
