//! # Bounded-Support Continuous Distributions
//!
//! - [`Uniform`]: flat density on `[lower, upper)`
//! - [`Exponential`]: `rate * exp(-rate x)` for `x >= 0`
//! - [`Pareto`]: power-law tail above `location` with index `scale`
//!
//! Values outside the support and invalid parameters give `-inf`. The graph
//! forms build the same expression with masks, so reverse mode routes zero
//! gradient into those regions.

use bayesgraph_core::Tensor;
use bayesgraph_diff::{Distribution, Graph, GraphError, LogProbGradient, VertexId};
use rand::RngCore;
use rand_distr::{Distribution as _, Exp, Pareto as ParetoSampler, Uniform as UniformSampler};

use crate::dist::{invalid_parameter, outside_support, reduce_gradient, sample_elementwise};

fn minus_infinity_where(outside: &Tensor, inside: &Tensor) -> Result<Tensor, GraphError> {
    Ok(Tensor::select(outside, &Tensor::scalar(f64::NEG_INFINITY), inside)?)
}

/// Uniform with parameters `[lower, upper]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Distribution for Uniform {
    fn name(&self) -> &'static str {
        "Uniform"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["lower", "upper"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            let uniform = UniformSampler::new(p[0], p[1]).map_err(|e| invalid_parameter("Uniform", "upper", e))?;
            Ok(uniform.sample(rng))
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        let (lower, upper) = (&params[0], &params[1]);
        let width = upper.sub(lower)?;
        let inside = width.ln().neg().broadcast_to(value.shape())?;

        let below = lower.greater_than_mask(value)?;
        let above = upper.less_than_or_equal_mask(value)?;
        let empty = width.less_than_or_equal_mask(&Tensor::scalar(0.0))?;
        let outside = below.add(&above)?.add(&empty)?;
        minus_infinity_where(&outside, &inside)
    }

    fn d_log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        let (lower, upper) = (&params[0], &params[1]);
        let outside = outside_support(&self.log_prob(value, params)?);
        let d_lower = upper.sub(lower)?.recip();
        let d_upper = d_lower.neg();

        Ok(LogProbGradient {
            wrt_value: Some(Tensor::zeros(value.shape())),
            wrt_params: vec![
                Some(reduce_gradient(&d_lower, &outside, lower.shape())?),
                Some(reduce_gradient(&d_upper, &outside, upper.shape())?),
            ],
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        true
    }

    fn log_prob_graph(&self, graph: &mut Graph, x: VertexId, params: &[VertexId]) -> Result<VertexId, GraphError> {
        let (lower, upper) = (params[0], params[1]);
        let width = graph.sub(upper, lower)?;
        let ln_width = graph.log(width)?;
        let inside = graph.neg(ln_width)?;

        let zero = graph.scalar(0.0);
        let below = graph.greater_than_mask(lower, x)?;
        let above = graph.less_than_or_equal_mask(upper, x)?;
        let empty = graph.less_than_or_equal_mask(width, zero)?;
        let outside = graph.add(below, above)?;
        let outside = graph.add(outside, empty)?;
        let minus_infinity = graph.scalar(f64::NEG_INFINITY);
        graph.where_(outside, minus_infinity, inside)
    }
}

/// Exponential with parameter `[rate]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Distribution for Exponential {
    fn name(&self) -> &'static str {
        "Exponential"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["rate"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            if p[0] <= 0.0 {
                return Err(invalid_parameter("Exponential", "rate", "rate must be positive"));
            }
            let exp = Exp::new(p[0]).map_err(|e| invalid_parameter("Exponential", "rate", e))?;
            Ok(exp.sample(rng))
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        let rate = &params[0];
        let zero = Tensor::scalar(0.0);
        let inside = rate.ln().sub(&rate.mul(value)?)?;
        let negative = zero.greater_than_mask(value)?;
        let invalid = rate.less_than_or_equal_mask(&zero)?;
        minus_infinity_where(&negative.add(&invalid)?, &inside)
    }

    fn d_log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        let rate = &params[0];
        let outside = outside_support(&self.log_prob(value, params)?);
        let d_value = rate.neg();
        let d_rate = rate.recip().sub(value)?;

        Ok(LogProbGradient {
            wrt_value: Some(reduce_gradient(&d_value, &outside, value.shape())?),
            wrt_params: vec![Some(reduce_gradient(&d_rate, &outside, rate.shape())?)],
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        true
    }

    fn log_prob_graph(&self, graph: &mut Graph, x: VertexId, params: &[VertexId]) -> Result<VertexId, GraphError> {
        let rate = params[0];
        let ln_rate = graph.log(rate)?;
        let decay = graph.mul(rate, x)?;
        let lp = graph.sub(ln_rate, decay)?;

        let zero = graph.scalar(0.0);
        let negative = graph.greater_than_mask(zero, x)?;
        let invalid = graph.less_than_or_equal_mask(rate, zero)?;
        let outside = graph.add(negative, invalid)?;
        graph.set_with_mask(lp, outside, f64::NEG_INFINITY)
    }
}

/// Pareto with parameters `[location, scale]`: support `x >= location`,
/// tail index `scale`.
///
/// The support is closed at `location`, where the density peaks at
/// `scale / location`. Samples may land exactly on the bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pareto;

impl Distribution for Pareto {
    fn name(&self) -> &'static str {
        "Pareto"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["location", "scale"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            let pareto = ParetoSampler::new(p[0], p[1]).map_err(|e| invalid_parameter("Pareto", "scale", e))?;
            Ok(pareto.sample(rng))
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        let (location, scale) = (&params[0], &params[1]);
        let zero = Tensor::scalar(0.0);
        let inside = scale
            .ln()
            .add(&scale.mul(&location.ln())?)?
            .sub(&scale.map(|a| a + 1.0).mul(&value.ln())?)?;

        let below = location.greater_than_mask(value)?;
        let bad_location = location.less_than_or_equal_mask(&zero)?;
        let bad_scale = scale.less_than_or_equal_mask(&zero)?;
        let outside = below.add(&bad_location)?.add(&bad_scale)?;
        minus_infinity_where(&outside, &inside)
    }

    fn d_log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        let (location, scale) = (&params[0], &params[1]);
        let outside = outside_support(&self.log_prob(value, params)?);
        let d_value = scale.map(|a| -(a + 1.0)).div(value)?;
        let d_location = scale.div(location)?;
        let d_scale = scale.recip().add(&location.ln())?.sub(&value.ln())?;

        Ok(LogProbGradient {
            wrt_value: Some(reduce_gradient(&d_value, &outside, value.shape())?),
            wrt_params: vec![
                Some(reduce_gradient(&d_location, &outside, location.shape())?),
                Some(reduce_gradient(&d_scale, &outside, scale.shape())?),
            ],
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        true
    }

    fn log_prob_graph(&self, graph: &mut Graph, x: VertexId, params: &[VertexId]) -> Result<VertexId, GraphError> {
        let (location, scale) = (params[0], params[1]);
        let ln_scale = graph.log(scale)?;
        let ln_location = graph.log(location)?;
        let ln_x = graph.log(x)?;
        let one = graph.scalar(1.0);
        let tail = graph.add(scale, one)?;

        let head = graph.mul(scale, ln_location)?;
        let head = graph.add(ln_scale, head)?;
        let decay = graph.mul(tail, ln_x)?;
        let lp = graph.sub(head, decay)?;

        let zero = graph.scalar(0.0);
        let below = graph.greater_than_mask(location, x)?;
        let bad_location = graph.less_than_or_equal_mask(location, zero)?;
        let bad_scale = graph.less_than_or_equal_mask(scale, zero)?;
        let outside = graph.add(below, bad_location)?;
        let outside = graph.add(outside, bad_scale)?;
        graph.set_with_mask(lp, outside, f64::NEG_INFINITY)
    }
}
