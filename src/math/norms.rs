//! Norm computations for layered weights.
//!
//! Accumulation is done in `f64` so that long layers do not lose precision.

use crate::update::Layer;

/// Compute the L2 (Euclidean) norm of a layer.
pub fn l2_norm(layer: &Layer) -> f64 {
    layer
        .iter()
        .map(|&x| {
            let x = x as f64;
            x * x
        })
        .sum::<f64>()
        .sqrt()
}

/// Sum of squared coordinate differences across all layers.
///
/// Both weight sets must share the same shape.
pub fn sum_sq_distance(a: &[Layer], b: &[Layer]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(la, lb)| {
            la.iter()
                .zip(lb.iter())
                .map(|(&x, &y)| {
                    let d = x as f64 - y as f64;
                    d * d
                })
                .sum::<f64>()
        })
        .sum()
}

/// Root-mean-square distance between two weight sets.
///
/// `sqrt(sum((a - b)^2) / n_coordinates)`; 0.0 for empty weights.
pub fn rms_distance(a: &[Layer], b: &[Layer]) -> f64 {
    let n: usize = a.iter().map(|l| l.len()).sum();
    if n == 0 {
        return 0.0;
    }
    (sum_sq_distance(a, b) / n as f64).sqrt()
}
