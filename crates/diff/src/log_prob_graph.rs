//! # Log-Probability Graphs
//!
//! A [`LogProbGraph`] is a small, separate [`Graph`] computing one
//! probabilistic vertex's element-wise log-density from placeholders. The
//! placeholders stand in for the vertex's value and its parameter vertices
//! in the real graph, with matching shapes.
//!
//! Because the density is an ordinary expression, the reverse-mode pass
//! differentiates it with respect to the value and every parameter without
//! any hand-derived calculus. Invalid parameter regions are masked to `-inf`
//! inside the expression, and the masks route zero gradient into them.
//!
//! Evaluation binds values on a detached copy, so neither the real graph nor
//! the template is ever mutated.

use bayesgraph_core::Tensor;
use log::debug;

use crate::backward::reverse_mode_with_seed;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::partials::PartialDerivatives;
use crate::vertex::VertexId;

/// Placeholder sub-graph for one probabilistic vertex.
#[derive(Debug, Clone)]
pub struct LogProbGraph {
    graph: Graph,
    inputs: Vec<(VertexId, VertexId)>,
    output: VertexId,
}

/// Result of evaluating a [`LogProbGraph`] against a real graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LogProbEvaluation {
    /// Sum of the element-wise log-density.
    pub log_prob: f64,
    /// Gradient of `log_prob`, keyed by real vertex. Each entry has the
    /// real vertex's shape.
    pub gradient: PartialDerivatives,
}

impl LogProbGraph {
    /// Build the log-density graph of probabilistic `vertex` in `real`.
    pub fn build(real: &Graph, vertex: VertexId) -> Result<Self, GraphError> {
        let distribution = real.distribution(vertex)?.clone();
        if !distribution.has_log_prob_graph() {
            return Err(GraphError::NotSupported {
                operation: "log_prob_graph",
                distribution: distribution.name(),
            });
        }

        let mut graph = Graph::new();
        let x = graph.placeholder(real.shape(vertex)?);
        let mut inputs = vec![(vertex, x)];
        let mut params = Vec::new();
        for &parent in real.parents(vertex)? {
            let placeholder = match inputs.iter().find(|(r, _)| *r == parent) {
                Some(&(_, existing)) => existing,
                None => {
                    let created = graph.placeholder(real.shape(parent)?);
                    inputs.push((parent, created));
                    created
                }
            };
            params.push(placeholder);
        }

        let output = distribution.log_prob_graph(&mut graph, x, &params)?;
        debug!(
            "built {} log-prob graph for {} with {} vertices",
            distribution.name(),
            vertex,
            graph.len()
        );
        Ok(Self {
            graph,
            inputs,
            output,
        })
    }

    /// The placeholder template.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// `(real vertex, placeholder)` bindings; the vertex itself comes first,
    /// then its distinct parameters in parent order.
    pub fn inputs(&self) -> &[(VertexId, VertexId)] {
        &self.inputs
    }

    pub fn output(&self) -> VertexId {
        self.output
    }

    pub fn placeholder_for(&self, real: VertexId) -> Option<VertexId> {
        self.inputs
            .iter()
            .find(|(r, _)| *r == real)
            .map(|&(_, placeholder)| placeholder)
    }

    /// A copy of the template with every placeholder holding its real value.
    pub fn bind(&self, real: &Graph) -> Result<Graph, GraphError> {
        let mut bound = self.graph.detached_copy();
        for &(r, placeholder) in &self.inputs {
            bound.set_value(placeholder, real.value(r)?)?;
        }
        Ok(bound)
    }

    /// Element-wise log-density at the real graph's current values.
    pub fn log_prob_elementwise(&self, real: &Graph) -> Result<Tensor, GraphError> {
        self.bind(real)?.value(self.output)
    }

    /// Summed log-density and its gradient with respect to every bound real
    /// vertex that the density depends on.
    pub fn evaluate(&self, real: &Graph) -> Result<LogProbEvaluation, GraphError> {
        let bound = self.bind(real)?;
        let out = bound.value(self.output)?;
        let placeholders: Vec<VertexId> = self.inputs.iter().map(|&(_, p)| p).collect();

        // d(sum)/d(output) is all ones
        let seed = Tensor::ones(out.shape());
        let grads = reverse_mode_with_seed(&bound, self.output, &seed, &[], &placeholders)?;

        let mut gradient = PartialDerivatives::new();
        for &(r, placeholder) in &self.inputs {
            if let Some(g) = grads.with_respect_to(placeholder) {
                gradient.accumulate(r, g.clone())?;
            }
        }
        Ok(LogProbEvaluation {
            log_prob: out.sum(),
            gradient,
        })
    }
}
