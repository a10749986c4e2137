//! # Forward-Mode Differentiation
//!
//! Dual numbers flow from the tracked vertices towards the output:
//!
//! 1. Visit the output's ancestors in creation order (parents first)
//! 2. Seed every tracked vertex with the identity derivative of itself
//! 3. At each operator, push each parent's carried derivatives through the
//!    operator's JVP rule and add the contributions
//!
//! Cost grows with the total size of the tracked vertices, so this mode suits
//! few inputs and many outputs.
//!
//! ## Example
//!
//! ```rust
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::{forward_mode, Graph};
//!
//! // y = x * x at x = 3
//! let mut graph = Graph::new();
//! let x = graph.parameter(&[]);
//! let y = graph.mul(x, x).unwrap();
//! graph.set_value(x, Tensor::scalar(3.0)).unwrap();
//!
//! let dy = forward_mode(&graph, y, &[x]).unwrap();
//! assert_eq!(dy.with_respect_to(x).unwrap().to_vec(), vec![6.0]);
//! ```

use std::collections::{BTreeSet, HashMap};

use bayesgraph_core::Tensor;
use log::{debug, trace};

use crate::error::GraphError;
use crate::graph::Graph;
use crate::partials::{DualNumber, PartialDerivatives};
use crate::vertex::{VertexId, VertexKind};

/// Derivatives of `of` with respect to each vertex in `wrt`.
///
/// Entries have shape `shape(of) ++ shape(wrt_i)`. A vertex in `wrt` that
/// is missing from the graph or that `of` does not depend on has no entry.
pub fn forward_mode(graph: &Graph, of: VertexId, wrt: &[VertexId]) -> Result<PartialDerivatives, GraphError> {
    Ok(dual_number(graph, of, wrt)?.into_partials())
}

/// Value of `of` together with its derivatives with respect to `wrt`.
pub fn dual_number(graph: &Graph, of: VertexId, wrt: &[VertexId]) -> Result<DualNumber, GraphError> {
    let value = graph.value(of)?;
    let tracked: BTreeSet<VertexId> = wrt.iter().copied().filter(|&id| graph.contains(id)).collect();

    let mut order = graph.ancestors(of)?;
    order.push(of);
    debug!(
        "forward mode over {} vertices, tracking {}",
        order.len(),
        tracked.len()
    );

    let mut carried: HashMap<VertexId, PartialDerivatives> = HashMap::new();
    for v in order {
        let vertex = graph.vertex(v)?;
        let mut partials = PartialDerivatives::new();

        // Non-operator vertices are leaves of the deterministic sub-graph.
        if let VertexKind::Op(op) = vertex.kind() {
            let inputs = graph.values(vertex.parents())?;
            let refs: Vec<&Tensor> = inputs.iter().collect();
            let output = graph.value(v)?;
            for (which, parent) in vertex.parents().iter().enumerate() {
                let Some(incoming) = carried.get(parent) else {
                    continue;
                };
                if incoming.is_empty() {
                    continue;
                }
                let input_rank = graph.shape(*parent)?.len();
                let pushed = incoming.forward_through(input_rank, |tangent| {
                    Ok(op.jvp(which, &refs, &output, tangent)?)
                })?;
                trace!("{} -> {} through {}: {} entries", parent, v, op, pushed.len());
                partials = partials.add(pushed)?;
            }
        }

        if tracked.contains(&v) {
            partials = partials.add(PartialDerivatives::identity(v, vertex.shape()))?;
        }
        carried.insert(v, partials);
    }

    let partials = carried.remove(&of).unwrap_or_default();
    Ok(DualNumber::new(value, partials))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_square() {
        let mut g = Graph::new();
        let x = g.parameter(&[2]);
        let y = g.mul(x, x).unwrap();
        g.set_value(x, Tensor::vector(vec![1.0, 4.0])).unwrap();

        let dual = dual_number(&g, y, &[x]).unwrap();
        assert_eq!(dual.value().to_vec(), vec![1.0, 16.0]);
        let dy = dual.partials().with_respect_to(x).unwrap();
        assert_eq!(dy.shape(), &[2, 2]);
        assert_eq!(dy.to_vec(), vec![2.0, 0.0, 0.0, 8.0]);
    }

    #[test]
    fn test_forward_untracked_and_missing() {
        let mut g = Graph::new();
        let x = g.parameter(&[]);
        let unrelated = g.parameter(&[]);
        let y = g.exp(x).unwrap();
        g.set_value(x, Tensor::scalar(0.0)).unwrap();

        let mut other = Graph::new();
        for _ in 0..5 {
            other.parameter(&[]);
        }
        let foreign = other.parameter(&[]);

        let dy = forward_mode(&g, y, &[unrelated, foreign]).unwrap();
        assert!(dy.is_empty());
    }

    #[test]
    fn test_forward_intermediate_target() {
        // d(2u)/du where u = x + 1 is itself an operator
        let mut g = Graph::new();
        let x = g.parameter(&[]);
        let one = g.scalar(1.0);
        let two = g.scalar(2.0);
        let u = g.add(x, one).unwrap();
        let y = g.mul(u, two).unwrap();
        g.set_value(x, Tensor::scalar(1.0)).unwrap();

        let dy = forward_mode(&g, y, &[u, x]).unwrap();
        assert_eq!(dy.with_respect_to(u).unwrap().to_vec(), vec![2.0]);
        assert_eq!(dy.with_respect_to(x).unwrap().to_vec(), vec![2.0]);
    }
}
