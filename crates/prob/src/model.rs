//! # Probabilistic Models
//!
//! A [`ProbabilisticModel`] wraps a graph and exposes its joint
//! log-probability as a [`FitnessFunction`] over the latent variables.
//!
//! ## Objectives
//!
//! - **MAP** sums the log-density of every probabilistic vertex, priors
//!   included.
//! - **MLE** sums only the observed vertices.
//!
//! ## Gradients
//!
//! Each term's density gradient comes from its [`LogProbGraph`] when the
//! distribution has one, otherwise from hand-derived `d_log_prob`. The
//! gradient with respect to the term's parameters is then pulled back
//! through any deterministic operators between those parameters and the
//! latents, with reverse mode seeded by the parameter gradient.
//!
//! Every evaluation works on a detached copy of the graph with the point's
//! values assigned, so the model itself never changes and concurrent
//! evaluations don't interfere.

use std::collections::HashMap;

use bayesgraph_core::Tensor;
use bayesgraph_diff::{reverse_mode_with_seed, Graph, LogProbGraph, PartialDerivatives, VertexId};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::ProbError;
use crate::fitness::{FitnessFunction, FitnessFunctionGradient, PointLayout};

/// Which log-density terms the fitness sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    /// Maximum a posteriori: priors and likelihood.
    #[default]
    MaxAPosteriori,
    /// Maximum likelihood: observed vertices only.
    MaxLikelihood,
}

/// A graph with at least one latent variable, viewed as a fitness function.
#[derive(Debug, Clone)]
pub struct ProbabilisticModel {
    graph: Graph,
    latents: Vec<VertexId>,
    layout: PointLayout,
    objective: Objective,
    log_prob_graphs: HashMap<VertexId, LogProbGraph>,
}

impl ProbabilisticModel {
    /// Build a MAP model over every latent variable of `graph`.
    pub fn new(graph: Graph) -> Result<Self, ProbError> {
        let latents = graph.latent_vertices();
        if latents.is_empty() {
            return Err(ProbError::NoLatentVariables);
        }
        let layout = PointLayout::for_vertices(&graph, &latents)?;

        let mut log_prob_graphs = HashMap::new();
        for id in graph.probabilistic_vertices() {
            if graph.distribution(id)?.has_log_prob_graph() {
                log_prob_graphs.insert(id, LogProbGraph::build(&graph, id)?);
            }
        }
        debug!(
            "model with {} latent vertices ({} scalars), {} log-prob graphs",
            latents.len(),
            layout.len(),
            log_prob_graphs.len()
        );

        Ok(Self {
            graph,
            latents,
            layout,
            objective: Objective::default(),
            log_prob_graphs,
        })
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Latent vertices in point order.
    pub fn latent_vertices(&self) -> &[VertexId] {
        &self.latents
    }

    pub fn layout(&self) -> &PointLayout {
        &self.layout
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Vertices whose log-density the objective sums.
    pub fn terms(&self) -> Vec<VertexId> {
        match self.objective {
            Objective::MaxAPosteriori => self.graph.probabilistic_vertices(),
            Objective::MaxLikelihood => self.graph.observed_vertices(),
        }
    }

    /// The latents' current values as a point. Every latent must have a
    /// value; reading them locks them in the model's graph.
    pub fn current_point(&self) -> Result<Vec<f64>, ProbError> {
        let values = self.graph.values(&self.latents)?;
        self.layout.flatten(&values)
    }

    /// A detached copy of the model's graph with `point` assigned to the
    /// latents.
    pub fn graph_at(&self, point: &[f64]) -> Result<Graph, ProbError> {
        let values = self.layout.unflatten(point)?;
        let mut graph = self.graph.detached_copy();
        for (&id, value) in self.latents.iter().zip(values) {
            graph.set_value(id, value)?;
        }
        Ok(graph)
    }

    /// Objective value at `point`.
    pub fn log_prob(&self, point: &[f64]) -> Result<f64, ProbError> {
        let graph = self.graph_at(point)?;
        let terms = self.terms();
        let mut total = 0.0;
        for &id in &terms {
            total += graph.log_prob(id)?;
        }
        debug!("log prob {} over {} terms", total, terms.len());
        Ok(total)
    }

    /// Gradient of the objective with respect to every latent, keyed by
    /// vertex with each entry shaped like its latent.
    pub fn log_prob_gradient(&self, point: &[f64]) -> Result<PartialDerivatives, ProbError> {
        let graph = self.graph_at(point)?;
        let mut total = PartialDerivatives::new();

        for term in self.terms() {
            for (vertex, gradient) in self.term_gradient(&graph, term)? {
                if self.latents.contains(&vertex) {
                    total.accumulate(vertex, gradient)?;
                } else if graph.vertex(vertex)?.is_op() {
                    let pulled = reverse_mode_with_seed(&graph, vertex, &gradient, &[], &self.latents)?;
                    trace!("pulled {} term gradient back through {}", term, vertex);
                    total = total.add(pulled)?;
                }
            }
        }
        Ok(total)
    }

    /// Gradient of one term's summed log-density with respect to the term
    /// and its parents.
    fn term_gradient(&self, graph: &Graph, term: VertexId) -> Result<Vec<(VertexId, Tensor)>, ProbError> {
        if let Some(lpg) = self.log_prob_graphs.get(&term) {
            let evaluation = lpg.evaluate(graph)?;
            return Ok(evaluation
                .gradient
                .iter()
                .map(|(id, g)| (id, g.clone()))
                .collect());
        }
        let mut wrt = vec![term];
        wrt.extend_from_slice(graph.parents(term)?);
        Ok(graph.d_log_prob(term, &wrt)?.into_iter().collect())
    }
}

impl FitnessFunction for ProbabilisticModel {
    fn evaluate(&self, point: &[f64]) -> Result<f64, ProbError> {
        self.log_prob(point)
    }
}

impl FitnessFunctionGradient for ProbabilisticModel {
    fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError> {
        let gradient = self.log_prob_gradient(point)?;
        self.layout.flatten_partials(&self.latents, &gradient)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gaussian::Gaussian;

    /// x ~ N(0, 1), y ~ N(2x, 1) observed at y.
    fn scaled(y: f64) -> (Graph, VertexId) {
        let mut g = Graph::new();
        let zero = g.scalar(0.0);
        let one = g.scalar(1.0);
        let two = g.scalar(2.0);
        let x = g.probabilistic(Arc::new(Gaussian), &[], &[zero, one]).unwrap();
        let mean = g.mul(two, x).unwrap();
        let obs = g.probabilistic(Arc::new(Gaussian), &[], &[mean, one]).unwrap();
        g.observe(obs, Tensor::scalar(y)).unwrap();
        (g, x)
    }

    #[test]
    fn test_needs_latents() {
        let mut g = Graph::new();
        let zero = g.scalar(0.0);
        let one = g.scalar(1.0);
        let obs = g.probabilistic(Arc::new(Gaussian), &[], &[zero, one]).unwrap();
        g.observe(obs, Tensor::scalar(0.0)).unwrap();
        assert_eq!(ProbabilisticModel::new(g).unwrap_err(), ProbError::NoLatentVariables);
    }

    #[test]
    fn test_gradient_through_deterministic_mean() {
        let (g, x) = scaled(3.0);
        let model = ProbabilisticModel::new(g).unwrap();
        assert_eq!(model.latent_vertices(), &[x]);

        // d/dx [-x^2/2 - (y - 2x)^2/2] = -x + 2(y - 2x)
        let grad = model.evaluate_gradient(&[1.0]).unwrap();
        assert!((grad[0] - (-1.0 + 2.0 * (3.0 - 2.0))).abs() < 1e-12);

        let mle = model.clone().with_objective(Objective::MaxLikelihood);
        let grad = mle.evaluate_gradient(&[1.0]).unwrap();
        assert!((grad[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluation_leaves_model_untouched() {
        let (g, x) = scaled(3.0);
        let model = ProbabilisticModel::new(g).unwrap();
        let a = model.evaluate(&[0.5]).unwrap();
        let b = model.evaluate(&[-0.5]).unwrap();
        assert!(a != b);
        assert!(!model.graph().vertex(x).unwrap().has_value());
        assert_eq!(
            model.evaluate(&[0.5, 1.0]),
            Err(ProbError::PointLength { expected: 1, got: 2 })
        );
    }
}
