//! # Error Types
//!
//! Construction-time contract violations for tensors and shapes.
//!
//! A vertex whose parents have incompatible shapes is not a graph that
//! evaluates badly, it is a graph that cannot exist. These errors are raised
//! while the graph is being wired and never during evaluation: domain problems
//! at evaluation time (log of a negative number, a value outside a
//! distribution's support) travel as data (`NaN`, `-inf`) instead.

use thiserror::Error;

use crate::shape::Shape;

/// Core errors for tensor construction and shape algebra.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Shapes must match exactly but don't.
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Two shapes cannot be broadcast against each other.
    #[error("Shapes {left} and {right} cannot be broadcast together")]
    Incompatible { left: Shape, right: Shape },

    /// A dimension index is outside the tensor's rank.
    #[error("Dimension {dim} out of range for rank {rank}")]
    InvalidDimension { dim: usize, rank: usize },

    /// A dimension was named twice in a reduction.
    #[error("Dimension {dim} listed more than once")]
    DuplicateDimension { dim: usize },

    /// An index along a dimension is out of bounds.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// A reshape or raw-data construction with the wrong element count.
    #[error("Cannot lay out {from} as {to}: element counts differ")]
    ElementCount { from: Shape, to: Shape },

    /// An operation that only works on a specific rank.
    #[error("{op} requires rank {expected}, got rank {got}")]
    Rank {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// Underlying array layout failure.
    #[error("Tensor layout error: {reason}")]
    Layout { reason: String },
}

impl From<ndarray::ShapeError> for CoreError {
    fn from(err: ndarray::ShapeError) -> Self {
        CoreError::Layout {
            reason: err.to_string(),
        }
    }
}
