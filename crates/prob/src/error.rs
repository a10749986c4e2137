//! Error types for probabilistic models and fitness evaluation.

use bayesgraph_diff::GraphError;
use thiserror::Error;

/// Errors that can occur while building or evaluating a probabilistic model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbError {
    /// Failure inside the vertex graph or the differentiator.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A point does not have the length its layout expects.
    #[error("Point has {got} values, layout expects {expected}")]
    PointLength { expected: usize, got: usize },

    /// A value does not have the shape its layout slot expects.
    #[error("Layout slot {slot} expects shape {expected:?}, got {got:?}")]
    SlotShape {
        slot: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// The model has nothing to optimize.
    #[error("Model has no latent variables")]
    NoLatentVariables,

    /// Invalid configuration value.
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A description names a distribution the registry does not know.
    #[error("Unknown distribution '{0}'")]
    UnknownDistribution(String),
}
