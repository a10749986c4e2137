//! # Distribution Plugin Contract
//!
//! A probabilistic vertex delegates everything random to a [`Distribution`].
//! Parameters arrive as tensors in the order of [`Distribution::param_names`],
//! which is also the order of the vertex's parents.
//!
//! Only `sample` and `log_prob` are required. A distribution can additionally
//! provide hand-derived gradients (`d_log_prob`) and, preferably, a graph form
//! of its log-density (`log_prob_graph`) that the differentiator handles like
//! any other expression.

use std::fmt;

use bayesgraph_core::Tensor;
use rand::RngCore;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::vertex::VertexId;

/// Gradient of a summed log-density.
///
/// `wrt_value` has the value's shape; `wrt_params[i]` has the shape of the
/// i-th parameter. `None` marks a quantity the density does not depend on
/// differentiably (a discrete value, for instance).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogProbGradient {
    pub wrt_value: Option<Tensor>,
    pub wrt_params: Vec<Option<Tensor>>,
}

/// A probability distribution usable as a vertex kind.
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Registry name, e.g. `"Gaussian"`.
    fn name(&self) -> &'static str;

    /// Parameter names in parent order.
    fn param_names(&self) -> &'static [&'static str];

    /// Draw a tensor of `shape` using the caller's randomness.
    fn sample(
        &self,
        shape: &[usize],
        params: &[Tensor],
        rng: &mut dyn RngCore,
    ) -> Result<Tensor, GraphError>;

    /// Element-wise log-density of `value`.
    ///
    /// Out-of-support values and invalid parameters give `-inf`, not errors.
    fn log_prob(&self, value: &Tensor, params: &[Tensor]) -> Result<Tensor, GraphError>;

    /// Hand-derived gradient of the summed log-density.
    fn d_log_prob(&self, _value: &Tensor, _params: &[Tensor]) -> Result<LogProbGradient, GraphError> {
        Err(GraphError::NotSupported {
            operation: "d_log_prob",
            distribution: self.name(),
        })
    }

    fn has_log_prob_graph(&self) -> bool {
        false
    }

    /// Wire the element-wise log-density of `x` into `graph`, using the
    /// parameter vertices `params`, and return the output vertex.
    fn log_prob_graph(
        &self,
        _graph: &mut Graph,
        _x: VertexId,
        _params: &[VertexId],
    ) -> Result<VertexId, GraphError> {
        Err(GraphError::NotSupported {
            operation: "log_prob_graph",
            distribution: self.name(),
        })
    }
}
