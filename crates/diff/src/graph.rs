//! # Vertex Graph
//!
//! [`Graph`] owns every vertex in a petgraph arena. Edges run parent → child
//! and carry the parent's slot, so duplicate parents (`x * x`) are two edges.
//!
//! ## Key Concepts
//!
//! - **Static shapes**: a vertex's shape is derived from its parents' shapes
//!   when it is added and never changes. Mismatches fail construction.
//! - **Pull-based values**: [`Graph::value`] computes an operator the first
//!   time it is read, evaluating only the uncached ancestors it needs.
//! - **Lock after read**: once a value has been read it can no longer be
//!   reassigned. Evaluate a new point on [`Graph::detached_copy`] instead.
//!
//! ## Example
//!
//! ```rust
//! use bayesgraph_core::Tensor;
//! use bayesgraph_diff::Graph;
//!
//! let mut graph = Graph::new();
//! let a = graph.parameter(&[2]);
//! let b = graph.constant(Tensor::vector(vec![10.0, 20.0]));
//! let y = graph.add(a, b).unwrap();
//!
//! graph.set_value(a, Tensor::vector(vec![1.0, 2.0])).unwrap();
//! assert_eq!(graph.value(y).unwrap().to_vec(), vec![11.0, 22.0]);
//! // `a` was read while computing `y`
//! assert!(graph.set_value(a, Tensor::vector(vec![0.0, 0.0])).is_err());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bayesgraph_core::shape;
use bayesgraph_core::{CoreError, Shape, Tensor};
use log::{debug, trace};
use petgraph::graph::DiGraph;
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use rand::RngCore;

use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::ops::Op;
use crate::vertex::{Capabilities, Vertex, VertexId, VertexKind, VertexLabel};

/// A DAG of tensor-valued vertices.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) graph: DiGraph<Vertex, usize>,
    labels: HashMap<String, VertexId>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.graph.node_weight(id.0).is_some()
    }

    /// All vertex ids in creation order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.graph.node_indices().map(VertexId)
    }

    pub fn vertex(&self, id: VertexId) -> Result<&Vertex, GraphError> {
        self.graph
            .node_weight(id.0)
            .ok_or(GraphError::UnknownVertex(id))
    }

    fn vertex_mut(&mut self, id: VertexId) -> Result<&mut Vertex, GraphError> {
        self.graph
            .node_weight_mut(id.0)
            .ok_or(GraphError::UnknownVertex(id))
    }

    pub fn shape(&self, id: VertexId) -> Result<&[usize], GraphError> {
        Ok(self.vertex(id)?.shape())
    }

    pub fn kind(&self, id: VertexId) -> Result<&VertexKind, GraphError> {
        Ok(self.vertex(id)?.kind())
    }

    pub fn capabilities(&self, id: VertexId) -> Result<Capabilities, GraphError> {
        Ok(self.vertex(id)?.capabilities())
    }

    /// Parents in declared order.
    pub fn parents(&self, id: VertexId) -> Result<&[VertexId], GraphError> {
        Ok(self.vertex(id)?.parents())
    }

    /// Distinct children in creation order.
    pub fn children(&self, id: VertexId) -> Result<Vec<VertexId>, GraphError> {
        self.vertex(id)?;
        let children: BTreeSet<VertexId> = self
            .graph
            .neighbors_directed(id.0, Direction::Outgoing)
            .map(VertexId)
            .collect();
        Ok(children.into_iter().collect())
    }

    /// Every vertex `id` depends on, in creation order, excluding `id`.
    pub fn ancestors(&self, id: VertexId) -> Result<Vec<VertexId>, GraphError> {
        self.vertex(id)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, id.0);
        let mut found = BTreeSet::new();
        while let Some(nx) = dfs.next(reversed) {
            if nx != id.0 {
                found.insert(VertexId(nx));
            }
        }
        Ok(found.into_iter().collect())
    }

    fn push(
        &mut self,
        kind: VertexKind,
        shape: Vec<usize>,
        parents: Vec<VertexId>,
    ) -> VertexId {
        let edges = parents.clone();
        let name = kind.name();
        let idx = self.graph.add_node(Vertex::new(kind, shape, parents));
        for (slot, parent) in edges.iter().enumerate() {
            self.graph.add_edge(parent.0, idx, slot);
        }
        trace!("added {} vertex #{} with parents {:?}", name, idx.index(), edges);
        VertexId(idx)
    }

    fn parent_shapes(&self, parents: &[VertexId]) -> Result<Vec<&[usize]>, GraphError> {
        parents.iter().map(|&p| self.shape(p)).collect()
    }

    // ---------------------------------------------------------------
    // Leaves
    // ---------------------------------------------------------------

    /// Add a constant holding `value`.
    pub fn constant(&mut self, value: Tensor) -> VertexId {
        let id = self.push(VertexKind::Constant, value.shape().to_vec(), vec![]);
        if let Some(v) = self.graph.node_weight(id.0) {
            *v.value.borrow_mut() = Some(value);
        }
        id
    }

    /// Rank-0 constant.
    pub fn scalar(&mut self, value: f64) -> VertexId {
        self.constant(Tensor::scalar(value))
    }

    /// Add an assignable parameter of the given shape, initially unset.
    pub fn parameter(&mut self, shape: &[usize]) -> VertexId {
        self.push(VertexKind::Parameter, shape.to_vec(), vec![])
    }

    /// Add an assignable placeholder of the given shape, initially unset.
    pub fn placeholder(&mut self, shape: &[usize]) -> VertexId {
        self.push(VertexKind::Placeholder, shape.to_vec(), vec![])
    }

    /// Add a random variable of `shape` whose parameters are `params`.
    ///
    /// Every parameter must broadcast to `shape`.
    pub fn probabilistic(
        &mut self,
        distribution: Arc<dyn Distribution>,
        shape: &[usize],
        params: &[VertexId],
    ) -> Result<VertexId, GraphError> {
        let expected = distribution.param_names().len();
        if params.len() != expected {
            return Err(GraphError::Arity {
                op: distribution.name(),
                expected,
                got: params.len(),
            });
        }
        for param_shape in self.parent_shapes(params)? {
            if !shape::is_broadcastable_to(param_shape, shape) {
                return Err(CoreError::Incompatible {
                    left: Shape::from(param_shape),
                    right: Shape::from(shape),
                }
                .into());
            }
        }
        Ok(self.push(
            VertexKind::Probabilistic(distribution),
            shape.to_vec(),
            params.to_vec(),
        ))
    }

    // ---------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------

    /// Add an operator vertex over `parents`, deriving its shape.
    pub fn op(&mut self, op: Op, parents: &[VertexId]) -> Result<VertexId, GraphError> {
        let shapes = self.parent_shapes(parents)?;
        let shape = op.output_shape(&shapes)?;
        Ok(self.push(VertexKind::Op(op), shape, parents.to_vec()))
    }

    pub fn add(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Add, &[a, b])
    }

    pub fn sub(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Sub, &[a, b])
    }

    pub fn mul(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Mul, &[a, b])
    }

    pub fn div(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Div, &[a, b])
    }

    pub fn pow(&mut self, base: VertexId, exponent: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Pow, &[base, exponent])
    }

    pub fn matmul(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::MatMul, &[a, b])
    }

    pub fn neg(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Neg, &[x])
    }

    pub fn exp(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Exp, &[x])
    }

    pub fn log(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Log, &[x])
    }

    pub fn sqrt(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Sqrt, &[x])
    }

    pub fn sin(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Sin, &[x])
    }

    pub fn cos(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Cos, &[x])
    }

    pub fn tanh(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Tanh, &[x])
    }

    pub fn abs(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Abs, &[x])
    }

    /// Sum over `dims`, keeping each with size 1.
    pub fn sum(&mut self, x: VertexId, dims: &[usize]) -> Result<VertexId, GraphError> {
        self.op(Op::Sum { dims: dims.to_vec() }, &[x])
    }

    /// Sum of every element, as a scalar.
    pub fn sum_all(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::SumAll, &[x])
    }

    /// Take `index` along `dim`, keeping `dim` with size 1.
    pub fn slice(&mut self, x: VertexId, dim: usize, index: usize) -> Result<VertexId, GraphError> {
        self.op(Op::Slice { dim, index }, &[x])
    }

    pub fn reshape(&mut self, x: VertexId, shape: &[usize]) -> Result<VertexId, GraphError> {
        self.op(Op::Reshape { shape: shape.to_vec() }, &[x])
    }

    pub fn transpose(&mut self, x: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::Transpose, &[x])
    }

    pub fn greater_than_mask(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::GreaterThanMask, &[a, b])
    }

    pub fn less_than_or_equal_mask(&mut self, a: VertexId, b: VertexId) -> Result<VertexId, GraphError> {
        self.op(Op::LessThanOrEqualMask, &[a, b])
    }

    /// `operand` with `value` wherever `mask` is non-zero.
    pub fn set_with_mask(&mut self, operand: VertexId, mask: VertexId, value: f64) -> Result<VertexId, GraphError> {
        self.op(Op::SetWithMask { value }, &[operand, mask])
    }

    /// `then` where `predicate` is non-zero, `otherwise` elsewhere.
    pub fn where_(
        &mut self,
        predicate: VertexId,
        then: VertexId,
        otherwise: VertexId,
    ) -> Result<VertexId, GraphError> {
        self.op(Op::Where, &[predicate, then, otherwise])
    }

    // ---------------------------------------------------------------
    // Labels
    // ---------------------------------------------------------------

    /// Attach a label. Labels are unique across the graph.
    pub fn set_label(&mut self, id: VertexId, label: impl Into<VertexLabel>) -> Result<(), GraphError> {
        let label = label.into();
        let key = label.to_string();
        match self.labels.get(&key) {
            Some(&owner) if owner != id => return Err(GraphError::DuplicateLabel(key)),
            _ => {}
        }
        let vertex = self.vertex_mut(id)?;
        let previous = vertex.label.replace(label);
        if let Some(previous) = previous {
            self.labels.remove(&previous.to_string());
        }
        self.labels.insert(key, id);
        Ok(())
    }

    pub fn label(&self, id: VertexId) -> Option<&VertexLabel> {
        self.vertex(id).ok().and_then(Vertex::label)
    }

    /// Look a vertex up by its dotted label.
    pub fn find_by_label(&self, label: &str) -> Option<VertexId> {
        self.labels.get(label).copied()
    }

    // ---------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------

    /// Assign a value to a parameter, placeholder or probabilistic vertex.
    pub fn set_value(&mut self, id: VertexId, value: Tensor) -> Result<(), GraphError> {
        let vertex = self.vertex(id)?;
        if !vertex.kind.is_assignable() {
            return Err(GraphError::NotAssignable {
                id,
                kind: vertex.kind.name(),
            });
        }
        if value.shape() != vertex.shape() {
            return Err(GraphError::ValueShape {
                id,
                expected: Shape::from(vertex.shape()),
                got: Shape::from(value.shape()),
            });
        }
        if vertex.read.get() {
            return Err(GraphError::ValueLocked { id });
        }
        *vertex.value.borrow_mut() = Some(value);
        Ok(())
    }

    /// Assign an observed value to a probabilistic vertex.
    pub fn observe(&mut self, id: VertexId, value: Tensor) -> Result<(), GraphError> {
        if !self.vertex(id)?.is_probabilistic() {
            return Err(GraphError::NotProbabilistic(id));
        }
        self.set_value(id, value)?;
        self.vertex_mut(id)?.observed = true;
        Ok(())
    }

    pub fn is_observed(&self, id: VertexId) -> Result<bool, GraphError> {
        Ok(self.vertex(id)?.is_observed())
    }

    /// Whether the vertex's value has been read and can no longer change.
    pub fn is_locked(&self, id: VertexId) -> Result<bool, GraphError> {
        Ok(self.vertex(id)?.read.get())
    }

    /// The vertex's value, computing it and any uncached ancestors first.
    pub fn value(&self, id: VertexId) -> Result<Tensor, GraphError> {
        self.evaluate(id)?;
        self.read(id)
    }

    /// Values of several vertices, in the order given.
    pub fn values(&self, ids: &[VertexId]) -> Result<Vec<Tensor>, GraphError> {
        ids.iter().map(|&id| self.value(id)).collect()
    }

    fn read(&self, id: VertexId) -> Result<Tensor, GraphError> {
        let vertex = self.vertex(id)?;
        vertex.read.set(true);
        vertex
            .value
            .borrow()
            .clone()
            .ok_or(GraphError::Unassigned { id })
    }

    /// Fill the caches of `id` and every uncached ancestor, parents first.
    fn evaluate(&self, id: VertexId) -> Result<(), GraphError> {
        let mut pending = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(v) = stack.pop() {
            let vertex = self.vertex(v)?;
            if vertex.has_value() || !pending.insert(v) {
                continue;
            }
            stack.extend(vertex.parents.iter().copied());
        }

        for v in pending {
            let vertex = self.vertex(v)?;
            let VertexKind::Op(op) = &vertex.kind else {
                return Err(GraphError::Unassigned { id: v });
            };
            let inputs = self.values_of_parents(vertex)?;
            let refs: Vec<&Tensor> = inputs.iter().collect();
            let out = op.forward(&refs)?;
            trace!("computed {} at {}", op, v);
            *vertex.value.borrow_mut() = Some(out);
        }
        Ok(())
    }

    fn values_of_parents(&self, vertex: &Vertex) -> Result<Vec<Tensor>, GraphError> {
        vertex.parents.iter().map(|&p| self.value(p)).collect()
    }

    /// A copy that keeps constants and assigned leaf values, but forgets
    /// computed operator values and every read lock.
    pub fn detached_copy(&self) -> Graph {
        let copy = self.clone();
        for vertex in copy.graph.node_weights() {
            vertex.read.set(false);
            if vertex.is_op() {
                *vertex.value.borrow_mut() = None;
            }
        }
        debug!("detached copy of graph with {} vertices", copy.len());
        copy
    }

    // ---------------------------------------------------------------
    // Probabilistic vertices
    // ---------------------------------------------------------------

    pub fn distribution(&self, id: VertexId) -> Result<&Arc<dyn Distribution>, GraphError> {
        match &self.vertex(id)?.kind {
            VertexKind::Probabilistic(dist) => Ok(dist),
            _ => Err(GraphError::NotProbabilistic(id)),
        }
    }

    /// Probabilistic vertices in creation order.
    pub fn probabilistic_vertices(&self) -> Vec<VertexId> {
        self.vertex_ids()
            .filter(|&id| self.vertex(id).map_or(false, Vertex::is_probabilistic))
            .collect()
    }

    /// Unobserved probabilistic vertices in creation order.
    pub fn latent_vertices(&self) -> Vec<VertexId> {
        self.probabilistic_vertices()
            .into_iter()
            .filter(|&id| !self.vertex(id).map_or(true, Vertex::is_observed))
            .collect()
    }

    /// Observed probabilistic vertices in creation order.
    pub fn observed_vertices(&self) -> Vec<VertexId> {
        self.probabilistic_vertices()
            .into_iter()
            .filter(|&id| self.vertex(id).map_or(false, Vertex::is_observed))
            .collect()
    }

    /// Draw a value for `id` from its distribution at the current parameter
    /// values. The draw is returned, not assigned.
    pub fn sample(&self, id: VertexId, rng: &mut dyn RngCore) -> Result<Tensor, GraphError> {
        let dist = self.distribution(id)?;
        let vertex = self.vertex(id)?;
        let params = self.values_of_parents(vertex)?;
        dist.sample(vertex.shape(), &params, rng)
    }

    /// Assign a draw to every probabilistic vertex that has no value yet,
    /// in creation order so parents are drawn before children.
    pub fn sample_unassigned(&mut self, rng: &mut dyn RngCore) -> Result<(), GraphError> {
        for id in self.probabilistic_vertices() {
            if self.vertex(id)?.has_value() {
                continue;
            }
            let draw = self.sample(id, rng)?;
            self.set_value(id, draw)?;
        }
        Ok(())
    }

    /// Element-wise log-density of the vertex's current value.
    pub fn log_prob_elementwise(&self, id: VertexId) -> Result<Tensor, GraphError> {
        let dist = self.distribution(id)?;
        let vertex = self.vertex(id)?;
        let params = self.values_of_parents(vertex)?;
        let value = self.value(id)?;
        dist.log_prob(&value, &params)
    }

    /// Total log-density of the vertex's current value.
    pub fn log_prob(&self, id: VertexId) -> Result<f64, GraphError> {
        Ok(self.log_prob_elementwise(id)?.sum())
    }

    /// Hand-derived gradient of `log_prob(id)` with respect to those of the
    /// vertex itself and its direct parameters that appear in `wrt`.
    ///
    /// A parameter vertex used in several slots receives the sum.
    pub fn d_log_prob(&self, id: VertexId, wrt: &[VertexId]) -> Result<HashMap<VertexId, Tensor>, GraphError> {
        let dist = self.distribution(id)?;
        let vertex = self.vertex(id)?;
        let params = self.values_of_parents(vertex)?;
        let value = self.value(id)?;
        let gradient = dist.d_log_prob(&value, &params)?;

        let mut out: HashMap<VertexId, Tensor> = HashMap::new();
        if wrt.contains(&id) {
            if let Some(g) = gradient.wrt_value {
                out.insert(id, g);
            }
        }
        for (parent, g) in vertex.parents.iter().zip(gradient.wrt_params) {
            let Some(g) = g else { continue };
            if !wrt.contains(parent) {
                continue;
            }
            let total = match out.remove(parent) {
                Some(existing) => existing.add(&g)?,
                None => g,
            };
            out.insert(*parent, total);
        }
        Ok(out)
    }
}
