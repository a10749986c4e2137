//! # Reverse-Mode Differentiation
//!
//! One pass from the output back towards the requested vertices. The
//! output's adjoint is seeded with the identity (or a caller-supplied seed),
//! and each operator pulls its adjoint back onto its parents through its VJP
//! rule. A vertex reached along several paths accumulates the sum.
//!
//! Vertices that cannot reach any requested vertex are pruned before the
//! pass, so their rules never run.
//!
//! ## Example
//!
//! ```rust
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::{reverse_mode, Graph};
//!
//! // loss = sum(x * w)
//! let mut graph = Graph::new();
//! let x = graph.constant(Tensor::vector(vec![1.0, 2.0, 3.0]));
//! let w = graph.parameter(&[3]);
//! let xw = graph.mul(x, w).unwrap();
//! let loss = graph.sum_all(xw).unwrap();
//! graph.set_value(w, Tensor::vector(vec![0.5, 0.5, 0.5])).unwrap();
//!
//! let grads = reverse_mode(&graph, loss, &[w]).unwrap();
//! assert_eq!(grads.with_respect_to(w).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
//! ```

use std::collections::BTreeSet;

use bayesgraph_core::shape;
use bayesgraph_core::{CoreError, Tensor};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::partials::PartialDerivatives;
use crate::vertex::{VertexId, VertexKind};

/// Derivatives of `of` with respect to each vertex in `wrt`.
///
/// Entries have shape `shape(of) ++ shape(wrt_i)`, the same as
/// [`crate::forward_mode`] produces.
pub fn reverse_mode(graph: &Graph, of: VertexId, wrt: &[VertexId]) -> Result<PartialDerivatives, GraphError> {
    let output = graph.shape(of)?.to_vec();
    reverse_mode_with_seed(graph, of, &Tensor::identity(&output), &output, wrt)
}

/// Reverse mode starting from an arbitrary adjoint for `of`.
///
/// `seed` has shape `seed_output ++ shape(of)` and is the derivative of some
/// downstream quantity of shape `seed_output` with respect to `of`. Entries
/// of the result have shape `seed_output ++ shape(wrt_i)`.
pub fn reverse_mode_with_seed(
    graph: &Graph,
    of: VertexId,
    seed: &Tensor,
    seed_output: &[usize],
    wrt: &[VertexId],
) -> Result<PartialDerivatives, GraphError> {
    let expected = shape::concat(seed_output, graph.shape(of)?);
    if seed.shape() != expected.as_slice() {
        return Err(CoreError::ShapeMismatch {
            expected: expected.into(),
            got: seed.shape().into(),
        }
        .into());
    }
    graph.value(of)?;

    let mut order = graph.ancestors(of)?;
    order.push(of);
    let relevant = reaching(graph, &order, wrt)?;
    debug!(
        "reverse mode over {} of {} vertices",
        relevant.len(),
        order.len()
    );

    let output_rank = seed_output.len();
    let mut adjoints = PartialDerivatives::new();
    if relevant.contains(&of) {
        adjoints.accumulate(of, seed.clone())?;
    }

    for &v in order.iter().rev() {
        if !relevant.contains(&v) || !adjoints.contains(v) {
            continue;
        }
        let vertex = graph.vertex(v)?;
        // Leaves of the deterministic sub-graph stop the pass.
        let VertexKind::Op(op) = vertex.kind() else {
            continue;
        };
        let inputs = graph.values(vertex.parents())?;
        let refs: Vec<&Tensor> = inputs.iter().collect();
        let output = graph.value(v)?;
        for (which, &parent) in vertex.parents().iter().enumerate() {
            if !relevant.contains(&parent) {
                continue;
            }
            let pulled = adjoints.backward_through(v, output_rank, parent, |adjoint| {
                Ok(op.vjp(which, &refs, &output, adjoint)?)
            })?;
            trace!("{} <- {} through {}", parent, v, op);
            adjoints = adjoints.add(pulled)?;
        }
    }

    Ok(adjoints.filter(wrt))
}

/// Vertices of `order` that are requested, or are operators with a parent
/// that is.
fn reaching(graph: &Graph, order: &[VertexId], wrt: &[VertexId]) -> Result<BTreeSet<VertexId>, GraphError> {
    let mut found = BTreeSet::new();
    for &v in order {
        let vertex = graph.vertex(v)?;
        let through_parent = vertex.is_op() && vertex.parents().iter().any(|p| found.contains(p));
        if wrt.contains(&v) || through_parent {
            found.insert(v);
        }
    }
    Ok(found)
}

// ============================================================================
// Gradient checking
// ============================================================================

/// Central-difference settings for [`gradient_check`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientCheckConfig {
    /// Perturbation applied to each element.
    pub step: f64,
    /// Largest accepted absolute and relative difference.
    pub tolerance: f64,
}

impl Default for GradientCheckConfig {
    fn default() -> Self {
        Self {
            step: 1e-6,
            tolerance: 1e-5,
        }
    }
}

impl GradientCheckConfig {
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Error from gradient checking.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GradientCheckError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Gradient mismatch for {vertex} at element {element}: analytical={analytical}, numerical={numerical}")]
    Mismatch {
        vertex: VertexId,
        element: usize,
        analytical: f64,
        numerical: f64,
    },
}

/// Central-difference estimate of `d of / d wrt`, shaped
/// `shape(of) ++ shape(wrt)`.
///
/// `wrt` must accept assigned values. Every evaluation happens on a detached
/// copy, so no value in `graph` is read or locked.
pub fn numerical_gradient(graph: &Graph, of: VertexId, wrt: VertexId, step: f64) -> Result<Tensor, GraphError> {
    let reference = graph.detached_copy();
    let base = reference.value(wrt)?;
    let out_shape = graph.shape(of)?.to_vec();
    let n_out = shape::numel(&out_shape);
    let n_wrt = base.len();

    let perturbed = |j: usize, delta: f64| -> Result<Vec<f64>, GraphError> {
        let mut data = base.to_vec();
        data[j] += delta;
        let mut copy = reference.detached_copy();
        copy.set_value(wrt, Tensor::from_vec(base.shape(), data)?)?;
        Ok(copy.value(of)?.to_vec())
    };

    let mut jacobian = vec![0.0; n_out * n_wrt];
    for j in 0..n_wrt {
        let plus = perturbed(j, step)?;
        let minus = perturbed(j, -step)?;
        for o in 0..n_out {
            jacobian[o * n_wrt + j] = (plus[o] - minus[o]) / (2.0 * step);
        }
    }
    Ok(Tensor::from_vec(&shape::concat(&out_shape, base.shape()), jacobian)?)
}

/// Check reverse-mode derivatives of `of` against central differences.
pub fn gradient_check(
    graph: &Graph,
    of: VertexId,
    wrt: &[VertexId],
    config: &GradientCheckConfig,
) -> Result<(), GradientCheckError> {
    let analytical = reverse_mode(graph, of, wrt)?;
    for &w in wrt {
        let numerical = numerical_gradient(graph, of, w, config.step)?;
        let analytical = analytical
            .with_respect_to(w)
            .cloned()
            .unwrap_or_else(|| Tensor::zeros(numerical.shape()));

        for (element, (&a, &n)) in analytical.array().iter().zip(numerical.array().iter()).enumerate() {
            let diff = (a - n).abs();
            let scale = a.abs().max(n.abs()).max(1.0);
            if diff / scale > config.tolerance && diff > config.tolerance {
                return Err(GradientCheckError::Mismatch {
                    vertex: w,
                    element,
                    analytical: a,
                    numerical: n,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_sum_rule_replicates() {
        let mut g = Graph::new();
        let x = g.parameter(&[2, 3]);
        let y = g.sum(x, &[1]).unwrap();
        g.set_value(x, Tensor::ones(&[2, 3])).unwrap();

        let seed = Tensor::from_vec(&[2, 1], vec![3.0, 5.0]).unwrap();
        let grads = reverse_mode_with_seed(&g, y, &seed, &[], &[x]).unwrap();
        let dx = grads.with_respect_to(x).unwrap();
        assert_eq!(dx.shape(), &[2, 3]);
        assert_eq!(dx.to_vec(), vec![3.0, 3.0, 3.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_seed_shape_checked() {
        let mut g = Graph::new();
        let x = g.parameter(&[2]);
        g.set_value(x, Tensor::ones(&[2])).unwrap();
        let seed = Tensor::ones(&[3]);
        assert!(reverse_mode_with_seed(&g, x, &seed, &[], &[x]).is_err());
    }

    #[test]
    fn test_only_requested_vertices_returned() {
        let mut g = Graph::new();
        let x = g.parameter(&[]);
        let c = g.scalar(2.0);
        let cc = g.mul(c, c).unwrap();
        let y = g.add(x, cc).unwrap();
        g.set_value(x, Tensor::scalar(1.0)).unwrap();

        let grads = reverse_mode(&g, y, &[x]).unwrap();
        assert_eq!(grads.len(), 1);
        assert_eq!(grads.with_respect_to(x).unwrap().to_vec(), vec![1.0]);

        let grads = reverse_mode(&g, y, &[c]).unwrap();
        assert_eq!(grads.with_respect_to(c).unwrap().to_vec(), vec![4.0]);
    }

    #[test]
    fn test_numerical_gradient_shape() {
        let mut g = Graph::new();
        let x = g.parameter(&[2]);
        let y = g.exp(x).unwrap();
        g.set_value(x, Tensor::vector(vec![0.0, 1.0])).unwrap();
        let n = numerical_gradient(&g, y, x, 1e-6).unwrap();
        assert_eq!(n.shape(), &[2, 2]);
        assert!((n.to_vec()[0] - 1.0).abs() < 1e-6);
        assert!(n.to_vec()[1].abs() < 1e-9);
    }

    #[test]
    fn test_numerical_gradient_leaves_graph_unlocked() {
        let mut g = Graph::new();
        let x = g.parameter(&[2]);
        let y = g.mul(x, x).unwrap();
        g.set_value(x, Tensor::vector(vec![1.0, 2.0])).unwrap();
        numerical_gradient(&g, y, x, 1e-6).unwrap();

        g.set_value(x, Tensor::vector(vec![3.0, 4.0])).unwrap();
        assert_eq!(g.value(y).unwrap().to_vec(), vec![9.0, 16.0]);
    }

    #[test]
    fn test_gradient_check_chain() {
        let mut g = Graph::new();
        let a = g.parameter(&[2, 2]);
        let b = g.parameter(&[2, 2]);
        let ab = g.matmul(a, b).unwrap();
        let t = g.tanh(ab).unwrap();
        let loss = g.sum_all(t).unwrap();
        g.set_value(a, Tensor::matrix(2, 2, vec![0.1, 0.2, -0.3, 0.4]).unwrap()).unwrap();
        g.set_value(b, Tensor::matrix(2, 2, vec![0.5, -0.1, 0.2, 0.3]).unwrap()).unwrap();

        gradient_check(&g, loss, &[a, b], &GradientCheckConfig::default()).unwrap();
    }

    #[test]
    fn test_config_builders() {
        let config = GradientCheckConfig::default()
            .with_step(1e-4)
            .with_tolerance(1e-3);
        assert_eq!(config.step, 1e-4);
        assert_eq!(config.tolerance, 1e-3);
    }
}
