//! Vertex identity, labels, kinds and capabilities.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use bayesgraph_core::Tensor;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::ops::Op;

/// Identity of a vertex within its graph.
///
/// Ids are handed out in creation order, and because parents must exist
/// before their children, ascending id order is always a valid dependency
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) NodeIndex);

impl VertexId {
    /// Position of the vertex in creation order.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// A human label, optionally nested in namespaces (outermost first).
///
/// ```rust
/// use bayesgraph_diff::VertexLabel;
///
/// let label = VertexLabel::new("mu").in_namespace("inner").in_namespace("outer");
/// assert_eq!(label.to_string(), "outer.inner.mu");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexLabel {
    name: String,
    namespace: Vec<String>,
}

impl VertexLabel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Vec::new(),
        }
    }

    /// Wrap the label in an enclosing namespace.
    pub fn in_namespace(mut self, outer: impl Into<String>) -> Self {
        self.namespace.insert(0, outer.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }
}

impl From<&str> for VertexLabel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for VertexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ns in &self.namespace {
            write!(f, "{}.", ns)?;
        }
        write!(f, "{}", self.name)
    }
}

/// What a vertex is.
#[derive(Debug, Clone)]
pub enum VertexKind {
    /// Fixed value supplied at construction.
    Constant,
    /// Assignable deterministic leaf.
    Parameter,
    /// Assignable stand-in for a real vertex inside a log-prob graph.
    Placeholder,
    /// Deterministic operator over its parents.
    Op(Op),
    /// Random variable whose parents are the distribution's parameters.
    Probabilistic(Arc<dyn Distribution>),
}

impl VertexKind {
    /// Schema or distribution name.
    pub fn name(&self) -> &'static str {
        match self {
            VertexKind::Constant => "Constant",
            VertexKind::Parameter => "Parameter",
            VertexKind::Placeholder => "Placeholder",
            VertexKind::Op(op) => op.name(),
            VertexKind::Probabilistic(dist) => dist.name(),
        }
    }

    /// Leaves accept assigned values; operators compute theirs.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            VertexKind::Parameter | VertexKind::Placeholder | VertexKind::Probabilistic(_)
        )
    }
}

/// The fixed capability set every vertex answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A value is available without sampling.
    pub has_value: bool,
    /// `sample` is meaningful.
    pub can_sample: bool,
    /// `log_prob` is meaningful.
    pub can_log_prob: bool,
    /// Derivatives can be taken with respect to, or through, this vertex.
    pub can_differentiate: bool,
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub(crate) kind: VertexKind,
    pub(crate) shape: Vec<usize>,
    pub(crate) parents: Vec<VertexId>,
    pub(crate) label: Option<VertexLabel>,
    pub(crate) value: RefCell<Option<Tensor>>,
    pub(crate) read: Cell<bool>,
    pub(crate) observed: bool,
}

impl Vertex {
    pub(crate) fn new(kind: VertexKind, shape: Vec<usize>, parents: Vec<VertexId>) -> Self {
        Self {
            kind,
            shape,
            parents,
            label: None,
            value: RefCell::new(None),
            read: Cell::new(false),
            observed: false,
        }
    }

    pub fn kind(&self) -> &VertexKind {
        &self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Parents in declared order.
    pub fn parents(&self) -> &[VertexId] {
        &self.parents
    }

    pub fn label(&self) -> Option<&VertexLabel> {
        self.label.as_ref()
    }

    pub fn is_observed(&self) -> bool {
        self.observed
    }

    pub fn is_probabilistic(&self) -> bool {
        matches!(self.kind, VertexKind::Probabilistic(_))
    }

    /// Operators are the only vertices whose value comes from their parents.
    pub fn is_op(&self) -> bool {
        matches!(self.kind, VertexKind::Op(_))
    }

    pub fn has_value(&self) -> bool {
        self.value.borrow().is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        match &self.kind {
            VertexKind::Constant => Capabilities {
                has_value: true,
                ..Capabilities::default()
            },
            VertexKind::Parameter | VertexKind::Placeholder => Capabilities {
                has_value: self.has_value(),
                can_differentiate: true,
                ..Capabilities::default()
            },
            VertexKind::Op(op) => Capabilities {
                has_value: true,
                can_differentiate: op.is_differentiable(),
                ..Capabilities::default()
            },
            VertexKind::Probabilistic(_) => Capabilities {
                has_value: self.has_value(),
                can_sample: true,
                can_log_prob: true,
                can_differentiate: true,
            },
        }
    }
}
