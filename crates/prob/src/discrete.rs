//! # Discrete Distributions
//!
//! Values are stored as `f64` tensors holding whole numbers. A value that is
//! not in the support (a non-integer count, a Bernoulli value other than 0
//! or 1) has density `-inf`.
//!
//! [`Bernoulli`] is differentiable with respect to its probability.
//! [`Poisson`] provides neither a graph form nor hand-derived gradients, so
//! asking for its gradient fails with `NotSupported`.

use bayesgraph_core::Tensor;
use bayesgraph_diff::{Distribution, Graph, GraphError, LogProbGradient, VertexId};
use rand::RngCore;
use rand_distr::{Bernoulli as BernoulliSampler, Distribution as _, Poisson as PoissonSampler};

use crate::dist::{invalid_parameter, ln_gamma, outside_support, reduce_gradient, sample_elementwise};

/// Bernoulli with parameter `[probability]` over the values `{0, 1}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bernoulli;

impl Distribution for Bernoulli {
    fn name(&self) -> &'static str {
        "Bernoulli"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["probability"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            let coin = BernoulliSampler::new(p[0]).map_err(|e| invalid_parameter("Bernoulli", "probability", e))?;
            Ok(if coin.sample(rng) { 1.0 } else { 0.0 })
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        let p = &params[0];
        let zero = Tensor::scalar(0.0);
        let one = Tensor::scalar(1.0);
        let ln_p = p.ln();
        let ln_q = one.sub(p)?.ln();
        let lp = Tensor::select(value, &ln_p, &ln_q)?;

        let not_binary = value.map(|v| if v == 0.0 || v == 1.0 { 0.0 } else { 1.0 });
        let invalid = zero.greater_than_mask(p)?.add(&p.greater_than_mask(&one)?)?;
        let outside = not_binary.add(&invalid)?;
        Ok(Tensor::select(&outside, &Tensor::scalar(f64::NEG_INFINITY), &lp)?)
    }

    fn d_log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        let p = &params[0];
        let outside = outside_support(&self.log_prob(value, params)?);
        let d_success = p.recip();
        let d_failure = Tensor::scalar(1.0).sub(p)?.recip().neg();
        let d_p = Tensor::select(value, &d_success, &d_failure)?;

        Ok(LogProbGradient {
            wrt_value: None,
            wrt_params: vec![Some(reduce_gradient(&d_p, &outside, p.shape())?)],
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        true
    }

    fn log_prob_graph(&self, graph: &mut Graph, x: VertexId, params: &[VertexId]) -> Result<VertexId, GraphError> {
        let p = params[0];
        let zero = graph.scalar(0.0);
        let one = graph.scalar(1.0);
        let ln_p = graph.log(p)?;
        let q = graph.sub(one, p)?;
        let ln_q = graph.log(q)?;
        let lp = graph.where_(x, ln_p, ln_q)?;

        // x * x - x is zero exactly on {0, 1}
        let x2 = graph.mul(x, x)?;
        let spread = graph.sub(x2, x)?;
        let above = graph.greater_than_mask(spread, zero)?;
        let below = graph.greater_than_mask(zero, spread)?;
        let negative = graph.greater_than_mask(zero, p)?;
        let over_one = graph.greater_than_mask(p, one)?;

        let outside = graph.add(above, below)?;
        let outside = graph.add(outside, negative)?;
        let outside = graph.add(outside, over_one)?;
        graph.set_with_mask(lp, outside, f64::NEG_INFINITY)
    }
}

/// Poisson with parameter `[rate]` over the non-negative integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poisson;

fn poisson_log_prob(k: f64, rate: f64) -> f64 {
    if rate <= 0.0 || k < 0.0 || k.fract() != 0.0 {
        return f64::NEG_INFINITY;
    }
    k * rate.ln() - rate - ln_gamma(k + 1.0)
}

impl Distribution for Poisson {
    fn name(&self) -> &'static str {
        "Poisson"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["rate"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            let poisson = PoissonSampler::new(p[0]).map_err(|e| invalid_parameter("Poisson", "rate", e))?;
            Ok(poisson.sample(rng))
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        Ok(value.zip_with(&params[0], poisson_log_prob)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_bernoulli_log_prob() {
        let lp = Bernoulli
            .log_prob(&Tensor::vector(vec![1.0, 0.0, 0.5]), &[Tensor::scalar(0.25)])
            .unwrap()
            .to_vec();
        assert!((lp[0] - (0.25f64).ln()).abs() < 1e-12);
        assert!((lp[1] - (0.75f64).ln()).abs() < 1e-12);
        assert_eq!(lp[2], f64::NEG_INFINITY);
    }

    #[test]
    fn test_bernoulli_gradient_wrt_probability() {
        let value = Tensor::vector(vec![1.0, 1.0, 0.0]);
        let grad = Bernoulli.d_log_prob(&value, &[Tensor::scalar(0.5)]).unwrap();
        assert!(grad.wrt_value.is_none());
        // 2 / 0.5 - 1 / 0.5
        assert_eq!(grad.wrt_params[0].as_ref().unwrap().to_vec(), vec![2.0]);
    }

    #[test]
    fn test_bernoulli_invalid_probability() {
        let lp = Bernoulli
            .log_prob(&Tensor::vector(vec![1.0]), &[Tensor::scalar(1.5)])
            .unwrap();
        assert_eq!(lp.to_vec(), vec![f64::NEG_INFINITY]);
        let grad = Bernoulli.d_log_prob(&Tensor::vector(vec![1.0]), &[Tensor::scalar(1.5)]).unwrap();
        assert_eq!(grad.wrt_params[0].as_ref().unwrap().to_vec(), vec![0.0]);
    }

    #[test]
    fn test_poisson_log_prob() {
        let lp = Poisson
            .log_prob(&Tensor::vector(vec![0.0, 3.0, 1.5, -1.0]), &[Tensor::scalar(2.0)])
            .unwrap()
            .to_vec();
        assert!((lp[0] + 2.0).abs() < 1e-12);
        assert!((lp[1] - (3.0 * (2.0f64).ln() - 2.0 - (6.0f64).ln())).abs() < 1e-12);
        assert_eq!(lp[2], f64::NEG_INFINITY);
        assert_eq!(lp[3], f64::NEG_INFINITY);
    }

    #[test]
    fn test_poisson_log_prob_large_counts() {
        // near the mode, ln P(k) approaches -ln(2 pi k) / 2
        let k = 2e9;
        let lp = Poisson
            .log_prob(&Tensor::vector(vec![k]), &[Tensor::scalar(k)])
            .unwrap()
            .to_vec();
        let expected = -0.5 * (2.0 * std::f64::consts::PI * k).ln();
        assert!((lp[0] - expected).abs() < 1e-3, "{} vs {}", lp[0], expected);
    }

    #[test]
    fn test_poisson_has_no_gradient() {
        let err = Poisson
            .d_log_prob(&Tensor::scalar(1.0), &[Tensor::scalar(2.0)])
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::NotSupported {
                operation: "d_log_prob",
                distribution: "Poisson",
            }
        );
        assert!(!Poisson.has_log_prob_graph());
    }

    #[test]
    fn test_discrete_samples_are_whole_numbers() {
        let mut rng = StdRng::seed_from_u64(9);
        let coins = Bernoulli.sample(&[20], &[Tensor::scalar(0.5)], &mut rng).unwrap();
        assert!(coins.to_vec().iter().all(|&v| v == 0.0 || v == 1.0));

        let counts = Poisson.sample(&[20], &[Tensor::scalar(4.0)], &mut rng).unwrap();
        assert!(counts.to_vec().iter().all(|&v| v >= 0.0 && v.fract() == 0.0));
    }
}
