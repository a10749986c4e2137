//! Shared machinery for the concrete distributions.
//!
//! Every distribution samples element by element: parameters are broadcast
//! to the requested shape and a `rand_distr` sampler is built per element,
//! so parameter tensors of any broadcastable shape work the same way.

use std::fmt;

use bayesgraph_core::{shape, Tensor};
use bayesgraph_diff::GraphError;
use rand::RngCore;

/// `ln(sqrt(2 * pi))`
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

const LANCZOS_G: f64 = 7.0;

const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// `ln |Gamma(x)|` by the Lanczos approximation (g = 7, n = 9).
///
/// Poles at the non-positive integers return `+inf`.
pub(crate) fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 && x == x.floor() {
        return f64::INFINITY;
    }
    if x < 0.5 {
        // reflection
        let sin_pi_x = (std::f64::consts::PI * x).sin().abs();
        return std::f64::consts::PI.ln() - sin_pi_x.ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let series = LANCZOS_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));
    let t = x + LANCZOS_G + 0.5;
    LN_SQRT_2PI + (x + 0.5) * t.ln() - t + series.ln()
}

/// Draw one value per element of `shape`.
///
/// `draw` receives the parameter values at that element, in parameter order.
pub(crate) fn sample_elementwise<F>(
    shape: &[usize],
    params: &[Tensor],
    rng: &mut dyn RngCore,
    mut draw: F,
) -> Result<Tensor, GraphError>
where
    F: FnMut(&[f64], &mut dyn RngCore) -> Result<f64, GraphError>,
{
    let broadcast = params
        .iter()
        .map(|p| Ok(p.broadcast_to(shape)?.to_vec()))
        .collect::<Result<Vec<_>, GraphError>>()?;

    let n = shape::numel(shape);
    let mut out = Vec::with_capacity(n);
    let mut args = vec![0.0; params.len()];
    for i in 0..n {
        for (arg, values) in args.iter_mut().zip(&broadcast) {
            *arg = values[i];
        }
        out.push(draw(&args, &mut *rng)?);
    }
    Ok(Tensor::from_vec(shape, out)?)
}

pub(crate) fn invalid_parameter(
    distribution: &'static str,
    name: &'static str,
    err: impl fmt::Display,
) -> GraphError {
    GraphError::InvalidParameter {
        distribution,
        name,
        reason: err.to_string(),
    }
}

/// 1 where the element-wise log-density is `-inf`.
pub(crate) fn outside_support(log_prob: &Tensor) -> Tensor {
    log_prob.map(|v| if v == f64::NEG_INFINITY { 1.0 } else { 0.0 })
}

/// Broadcast a per-element gradient to the value's shape, zero it wherever
/// the density is `-inf`, then sum it down to `target`.
pub(crate) fn reduce_gradient(
    gradient: &Tensor,
    outside: &Tensor,
    target: &[usize],
) -> Result<Tensor, GraphError> {
    let full = gradient.broadcast_to(outside.shape())?;
    Ok(full.set_with_mask(outside, 0.0)?.sum_to_shape(target)?)
}
