//! # Diff - Vertex Graphs and Automatic Differentiation
//!
//! This crate holds the computation graph that probabilistic models are
//! built from, and the machinery that differentiates it.
//!
//! ## Core Concepts
//!
//! - **Vertices form a DAG**: constants, parameters, placeholders,
//!   operators and random variables, each with a static shape
//! - **Values are pulled**: computed on first read and memoized; a read
//!   value is locked against reassignment
//! - **Derivatives are maps**: [`PartialDerivatives`] keyed by vertex, each
//!   entry shaped `output ++ vertex`
//! - **Two traversal modes**: [`forward_mode`] and [`reverse_mode`] agree on
//!   every differentiable sub-graph
//! - **Densities are graphs too**: a [`LogProbGraph`] lets the same
//!   engine differentiate a distribution's log-density
//!
//! ## Modules
//!
//! - [`vertex`]: Vertex ids, labels, kinds and capabilities
//! - [`ops`]: Deterministic operators and their JVP/VJP rules
//! - [`graph`]: Graph construction, evaluation and sampling
//! - [`partials`]: `PartialDerivatives` and `DualNumber`
//! - [`forward`]: Forward-mode differentiation
//! - [`backward`]: Reverse-mode differentiation and gradient checks
//! - [`distribution`]: The plugin contract for distributions
//! - [`log_prob_graph`]: Placeholder sub-graphs for log-densities
//! - [`description`]: Schema-driven graph export and import
//!
//! ## Example
//!
//! ```rust
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::{forward_mode, reverse_mode, Graph};
//!
//! // z = sin(x) + x * x
//! let mut graph = Graph::new();
//! let x = graph.parameter(&[]);
//! let s = graph.sin(x).unwrap();
//! let sq = graph.mul(x, x).unwrap();
//! let z = graph.add(s, sq).unwrap();
//! graph.set_value(x, Tensor::scalar(0.0)).unwrap();
//!
//! let fwd = forward_mode(&graph, z, &[x]).unwrap();
//! let rev = reverse_mode(&graph, z, &[x]).unwrap();
//! assert_eq!(fwd, rev);
//! assert_eq!(rev.with_respect_to(x).unwrap().to_vec(), vec![1.0]);
//! ```

pub mod backward;
pub mod description;
pub mod distribution;
pub mod error;
pub mod forward;
pub mod graph;
pub mod log_prob_graph;
pub mod ops;
pub mod partials;
pub mod vertex;

pub use backward::{
    gradient_check, numerical_gradient, reverse_mode, reverse_mode_with_seed, GradientCheckConfig,
    GradientCheckError,
};
pub use description::{GraphDescription, NamedParam, ParamValue, VertexDescription};
pub use distribution::{Distribution, LogProbGradient};
pub use error::GraphError;
pub use forward::{dual_number, forward_mode};
pub use graph::Graph;
pub use log_prob_graph::{LogProbEvaluation, LogProbGraph};
pub use ops::Op;
pub use partials::{DualNumber, PartialDerivatives};
pub use vertex::{Capabilities, Vertex, VertexId, VertexKind, VertexLabel};
