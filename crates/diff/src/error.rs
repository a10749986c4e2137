//! Error types for graph construction, evaluation and differentiation.

use bayesgraph_core::{CoreError, Shape};
use thiserror::Error;

use crate::vertex::VertexId;

/// Errors raised by the vertex graph.
///
/// Domain problems during evaluation (log of a negative number, a value
/// outside a distribution's support) are not errors: they flow through the
/// graph as `NaN` or `-inf` values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// A tensor or shape contract was violated while wiring a vertex.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The id does not belong to this graph.
    #[error("Unknown vertex {0}")]
    UnknownVertex(VertexId),

    /// Wrong number of parents for a vertex kind.
    #[error("{op} takes {expected} parents, got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// Only parameters, placeholders and probabilistic vertices accept values.
    #[error("Vertex {id} ({kind}) does not accept assigned values")]
    NotAssignable { id: VertexId, kind: &'static str },

    /// The vertex's value was already read; assigning now would leave
    /// downstream caches stale.
    #[error("Vertex {id} has already been read; evaluate a fresh copy of the graph instead")]
    ValueLocked { id: VertexId },

    /// A leaf was read before any value was assigned or sampled.
    #[error("Vertex {id} has no value")]
    Unassigned { id: VertexId },

    /// Assigned value does not match the vertex's declared shape.
    #[error("Value for vertex {id} has shape {got}, expected {expected}")]
    ValueShape {
        id: VertexId,
        expected: Shape,
        got: Shape,
    },

    /// Labels must be unique within a graph.
    #[error("Label '{0}' is already in use")]
    DuplicateLabel(String),

    /// The operation needs a probabilistic vertex.
    #[error("Vertex {0} is not probabilistic")]
    NotProbabilistic(VertexId),

    /// The distribution has no implementation of the requested operation.
    #[error("{operation} is not supported by {distribution}")]
    NotSupported {
        operation: &'static str,
        distribution: &'static str,
    },

    /// A distribution cannot sample with these parameters.
    #[error("Invalid parameter '{name}' for {distribution}: {reason}")]
    InvalidParameter {
        distribution: &'static str,
        name: &'static str,
        reason: String,
    },

    /// A graph description could not be turned back into a graph.
    #[error("Invalid graph description: {reason}")]
    Description { reason: String },
}
