//! # Prob - Distributions and Probabilistic Models
//!
//! Concrete distributions for the vertex graph, and the bridge from a graph
//! with observations to an objective an optimizer can climb.
//!
//! ## Core Concepts
//!
//! - **Distributions are plugins**: each implements
//!   [`bayesgraph_diff::Distribution`] and most also provide their
//!   log-density as a graph
//! - **Invalid is data**: out-of-support values and bad parameters give
//!   `-inf`, never errors, and never `NaN` gradients
//! - **Models are fitness functions**: a [`ProbabilisticModel`] maps a flat
//!   point of latent values to a joint log-probability and its gradient
//! - **Descriptions round-trip**: [`registry`] resolves distribution names
//!   when rebuilding a graph
//!
//! ## Example: MAP Estimate of a Mean
//!
//! ```rust
//! use std::sync::Arc;
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::Graph;
//! use bayesgraph_prob::{Gaussian, GradientAscent, GradientAscentConfig, ProbabilisticModel};
//!
//! let mut graph = Graph::new();
//! let zero = graph.scalar(0.0);
//! let one = graph.scalar(1.0);
//! let mean = graph.probabilistic(Arc::new(Gaussian), &[], &[zero, one]).unwrap();
//! let data = graph.probabilistic(Arc::new(Gaussian), &[3], &[mean, one]).unwrap();
//! graph.observe(data, Tensor::vector(vec![2.0, 2.0, 2.0])).unwrap();
//!
//! let model = ProbabilisticModel::new(graph).unwrap();
//! let optimizer = GradientAscent::new(GradientAscentConfig::default().with_learning_rate(0.1));
//! let result = optimizer.maximize(&model, vec![0.0]).unwrap();
//!
//! // posterior mode: sum(data) / (n + 1)
//! assert!((result.point[0] - 1.5).abs() < 1e-6);
//! ```

mod continuous;
mod discrete;
mod dist;
mod error;
pub mod fitness;
mod gaussian;
mod model;
mod optim;
pub mod registry;

pub use continuous::{Exponential, Pareto, Uniform};
pub use discrete::{Bernoulli, Poisson};
pub use dist::LN_SQRT_2PI;
pub use error::ProbError;
pub use fitness::{FitnessFunction, FitnessFunctionGradient, PointLayout};
pub use gaussian::Gaussian;
pub use model::{Objective, ProbabilisticModel};
pub use optim::{AscentResult, GradientAscent, GradientAscentConfig};
pub use registry::{distribution_by_name, graph_from_description};
