//! # Gaussian Distribution
//!
//! Normal density with mean `mu` and standard deviation `sigma`:
//!
//! ```text
//! ln p(x) = -((x - mu) / sigma)^2 / 2 - ln(sigma) - ln(sqrt(2 pi))
//! ```
//!
//! `sigma <= 0` is an invalid region; the density is `-inf` there and the
//! gradient is zero.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::Graph;
//! use bayesgraph_prob::Gaussian;
//!
//! let mut graph = Graph::new();
//! let mu = graph.scalar(0.0);
//! let sigma = graph.scalar(1.0);
//! let x = graph.probabilistic(Arc::new(Gaussian), &[], &[mu, sigma]).unwrap();
//! graph.observe(x, Tensor::scalar(0.0)).unwrap();
//!
//! let lp = graph.log_prob(x).unwrap();
//! assert!((lp + 0.918_938_533_204_672_8).abs() < 1e-12);
//! ```

use bayesgraph_core::Tensor;
use bayesgraph_diff::{Distribution, Graph, GraphError, LogProbGradient, VertexId};
use rand::RngCore;
use rand_distr::{Distribution as _, Normal};

use crate::dist::{invalid_parameter, outside_support, reduce_gradient, sample_elementwise, LN_SQRT_2PI};

/// Gaussian with parameters `[mu, sigma]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gaussian;

impl Distribution for Gaussian {
    fn name(&self) -> &'static str {
        "Gaussian"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["mu", "sigma"]
    }

    fn sample(&self, shape: &[usize], params: &[Tensor], rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        sample_elementwise(shape, params, rng, |p, rng| {
            let normal = Normal::new(p[0], p[1]).map_err(|e| invalid_parameter("Gaussian", "sigma", e))?;
            Ok(normal.sample(rng))
        })
    }

    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError> {
        let (mu, sigma) = (&params[0], &params[1]);
        let z = value.sub(mu)?.div(sigma)?;
        let lp = z
            .map(|z| -0.5 * z * z)
            .sub(&sigma.ln())?
            .map(|v| v - LN_SQRT_2PI);
        let invalid = sigma.less_than_or_equal_mask(&Tensor::scalar(0.0))?;
        Ok(lp.set_with_mask(&invalid, f64::NEG_INFINITY)?)
    }

    fn d_log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        let (mu, sigma) = (&params[0], &params[1]);
        let outside = outside_support(&self.log_prob(value, params)?);

        let diff = value.sub(mu)?;
        let variance = sigma.mul(sigma)?;
        let d_mu = diff.div(&variance)?;
        let d_value = d_mu.neg();
        let d_sigma = diff.mul(&diff)?.div(&variance.mul(sigma)?)?.sub(&sigma.recip())?;

        Ok(LogProbGradient {
            wrt_value: Some(reduce_gradient(&d_value, &outside, value.shape())?),
            wrt_params: vec![
                Some(reduce_gradient(&d_mu, &outside, mu.shape())?),
                Some(reduce_gradient(&d_sigma, &outside, sigma.shape())?),
            ],
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        true
    }

    fn log_prob_graph(&self, graph: &mut Graph, x: VertexId, params: &[VertexId]) -> Result<VertexId, GraphError> {
        let (mu, sigma) = (params[0], params[1]);
        let diff = graph.sub(x, mu)?;
        let z = graph.div(diff, sigma)?;
        let z2 = graph.mul(z, z)?;
        let minus_half = graph.scalar(-0.5);
        let kernel = graph.mul(z2, minus_half)?;
        let ln_sigma = graph.log(sigma)?;
        let unnormalized = graph.sub(kernel, ln_sigma)?;
        let norm = graph.scalar(LN_SQRT_2PI);
        let lp = graph.sub(unnormalized, norm)?;

        let zero = graph.scalar(0.0);
        let invalid = graph.less_than_or_equal_mask(sigma, zero)?;
        graph.set_with_mask(lp, invalid, f64::NEG_INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_log_prob_standard_normal() {
        let lp = Gaussian
            .log_prob(&Tensor::vector(vec![0.0, 1.0]), &[Tensor::scalar(0.0), Tensor::scalar(1.0)])
            .unwrap();
        assert!((lp.to_vec()[0] + LN_SQRT_2PI).abs() < 1e-12);
        assert!((lp.to_vec()[1] + 0.5 + LN_SQRT_2PI).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_sigma_is_minus_infinity() {
        let value = Tensor::vector(vec![0.5, 1.0]);
        let params = [Tensor::scalar(0.0), Tensor::scalar(-1.0)];
        let lp = Gaussian.log_prob(&value, &params).unwrap();
        assert!(lp.to_vec().iter().all(|&v| v == f64::NEG_INFINITY));

        let grad = Gaussian.d_log_prob(&value, &params).unwrap();
        assert_eq!(grad.wrt_value.unwrap().to_vec(), vec![0.0, 0.0]);
        assert_eq!(grad.wrt_params[1].as_ref().unwrap().to_vec(), vec![0.0]);
    }

    #[test]
    fn test_d_log_prob_sums_to_parameter_shape() {
        let value = Tensor::vector(vec![1.0, 3.0]);
        let params = [Tensor::scalar(1.0), Tensor::scalar(2.0)];
        let grad = Gaussian.d_log_prob(&value, &params).unwrap();
        // (x - mu) / sigma^2 summed: (0 + 2) / 4
        assert_eq!(grad.wrt_params[0].as_ref().unwrap().to_vec(), vec![0.5]);
        // (x - mu)^2 / sigma^3 - 1 / sigma, summed: (0 - 0.5) + (0.5 - 0.5)
        assert_eq!(grad.wrt_params[1].as_ref().unwrap().to_vec(), vec![-0.5]);
        assert_eq!(grad.wrt_value.unwrap().to_vec(), vec![0.0, -0.5]);
    }

    #[test]
    fn test_sampling_is_reproducible_and_rejects_bad_sigma() {
        let params = [Tensor::scalar(5.0), Tensor::scalar(0.1)];
        let a = Gaussian.sample(&[4], &params, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = Gaussian.sample(&[4], &params, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert!(a.to_vec().iter().all(|v| (v - 5.0).abs() < 1.0));

        let bad = [Tensor::scalar(0.0), Tensor::scalar(-1.0)];
        let err = Gaussian.sample(&[1], &bad, &mut StdRng::seed_from_u64(11)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { name: "sigma", .. }));
    }
}
