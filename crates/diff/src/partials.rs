//! # Differential Algebra
//!
//! [`PartialDerivatives`] maps a vertex to the derivative of some quantity
//! with respect to that vertex. For a quantity of shape `S` and a vertex of
//! shape `T`, the entry has shape `S ++ T`: output dimensions first.
//!
//! Operator rules in [`crate::ops`] work on a single batched tensor. The
//! `*_through` methods here translate between the two layouts:
//!
//! - forward mode carries `X ++ L` (the parent's shape, then the tracked
//!   leaf's), batched as `[numel(L)] ++ X`
//! - reverse mode carries `O ++ Y` (the differentiated output's shape, then
//!   the vertex's), batched as `[numel(O)] ++ Y`

use std::collections::BTreeMap;

use bayesgraph_core::shape;
use bayesgraph_core::{CoreError, Tensor};

use crate::error::GraphError;
use crate::vertex::VertexId;

/// Derivatives keyed by vertex.
///
/// An empty map means "no dependency".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialDerivatives {
    entries: BTreeMap<VertexId, Tensor>,
}

impl PartialDerivatives {
    pub fn new() -> Self {
        Self::default()
    }

    /// `d v / d v` for a vertex of `shape`.
    pub fn identity(id: VertexId, shape: &[usize]) -> Self {
        Self::single(id, Tensor::identity(shape))
    }

    pub fn single(id: VertexId, derivative: Tensor) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(id, derivative);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The derivative with respect to `id`, if there is a dependency.
    pub fn with_respect_to(&self, id: VertexId) -> Option<&Tensor> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Entries in vertex creation order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &Tensor)> {
        self.entries.iter().map(|(id, t)| (*id, t))
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.entries.keys().copied()
    }

    /// Add `derivative` to the entry for `id`.
    pub fn accumulate(&mut self, id: VertexId, derivative: Tensor) -> Result<(), GraphError> {
        let total = match self.entries.remove(&id) {
            Some(existing) => {
                if existing.shape() != derivative.shape() {
                    return Err(CoreError::ShapeMismatch {
                        expected: existing.shape().into(),
                        got: derivative.shape().into(),
                    }
                    .into());
                }
                existing.add(&derivative)?
            }
            None => derivative,
        };
        self.entries.insert(id, total);
        Ok(())
    }

    /// Union of two maps, summing entries present in both.
    pub fn add(mut self, other: PartialDerivatives) -> Result<Self, GraphError> {
        for (id, derivative) in other.entries {
            self.accumulate(id, derivative)?;
        }
        Ok(self)
    }

    /// Keep only the entries for `wrt`.
    pub fn filter(mut self, wrt: &[VertexId]) -> Self {
        self.entries.retain(|id, _| wrt.contains(id));
        self
    }

    /// Push every forward-mode entry through a batched JVP rule.
    ///
    /// Entries have shape `X ++ L` where `input_rank = rank(X)`. The rule
    /// receives `[numel(L)] ++ X` and returns `[numel(L)] ++ Y`, or `None`
    /// when the input does not influence the output.
    pub fn forward_through<F>(&self, input_rank: usize, mut rule: F) -> Result<PartialDerivatives, GraphError>
    where
        F: FnMut(&Tensor) -> Result<Option<Tensor>, GraphError>,
    {
        let mut out = PartialDerivatives::new();
        for (id, derivative) in &self.entries {
            let (x, leaf) = derivative.shape().split_at(input_rank);
            let m = shape::numel(leaf);
            let batched = derivative
                .reshape(&shape::concat(x, &[m]))?
                .permute_axes(&last_to_front(input_rank + 1))?;
            let Some(pushed) = rule(&batched)? else {
                continue;
            };
            let y = pushed.shape()[1..].to_vec();
            let restored = pushed
                .permute_axes(&front_to_last(y.len() + 1))?
                .reshape(&shape::concat(&y, leaf))?;
            out.entries.insert(*id, restored);
        }
        Ok(out)
    }

    /// Pull the reverse-mode entry for `from` through a batched VJP rule
    /// onto `to`.
    ///
    /// The entry has shape `O ++ Y` where `output_rank = rank(O)`. The rule
    /// receives `[numel(O)] ++ Y` and returns `[numel(O)] ++ X`. The result
    /// holds at most one entry, for `to`, of shape `O ++ X`.
    pub fn backward_through<F>(
        &self,
        from: VertexId,
        output_rank: usize,
        to: VertexId,
        mut rule: F,
    ) -> Result<PartialDerivatives, GraphError>
    where
        F: FnMut(&Tensor) -> Result<Option<Tensor>, GraphError>,
    {
        let mut out = PartialDerivatives::new();
        let Some(adjoint) = self.entries.get(&from) else {
            return Ok(out);
        };
        let (o, y) = adjoint.shape().split_at(output_rank);
        let batched = adjoint.reshape(&shape::concat(&[shape::numel(o)], y))?;
        if let Some(pulled) = rule(&batched)? {
            let restored = pulled.reshape(&shape::concat(o, &pulled.shape()[1..]))?;
            out.entries.insert(to, restored);
        }
        Ok(out)
    }

    /// Lay the leading output dimensions out as `new_output`.
    pub fn reshape_output(&self, output_rank: usize, new_output: &[usize]) -> Result<Self, GraphError> {
        self.map_entries(|t| {
            let tail = &t.shape()[output_rank..];
            t.reshape(&shape::concat(new_output, tail))
        })
    }

    /// Keep `index` along output dimension `dim` (kept with size 1).
    pub fn slice_output(&self, output_rank: usize, dim: usize, index: usize) -> Result<Self, GraphError> {
        shape::check_dimension(dim, output_rank)?;
        self.map_entries(|t| t.slice(dim, index))
    }

    /// Sum over every output dimension: the derivative of the summed output.
    pub fn sum_output(&self, output_rank: usize) -> Result<Self, GraphError> {
        self.map_entries(|t| {
            let (o, tail) = t.shape().split_at(output_rank);
            t.reshape(&shape::concat(&[shape::numel(o)], tail))?
                .sum_dims(&[0])?
                .reshape(tail)
        })
    }

    fn map_entries<F>(&self, mut f: F) -> Result<Self, GraphError>
    where
        F: FnMut(&Tensor) -> Result<Tensor, CoreError>,
    {
        let mut entries = BTreeMap::new();
        for (id, t) in &self.entries {
            entries.insert(*id, f(t)?);
        }
        Ok(Self { entries })
    }
}

impl IntoIterator for PartialDerivatives {
    type Item = (VertexId, Tensor);
    type IntoIter = std::collections::btree_map::IntoIter<VertexId, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A vertex value together with its derivatives with respect to every
/// tracked vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct DualNumber {
    value: Tensor,
    partials: PartialDerivatives,
}

impl DualNumber {
    pub fn new(value: Tensor, partials: PartialDerivatives) -> Self {
        Self { value, partials }
    }

    /// A value nothing is tracked through.
    pub fn constant(value: Tensor) -> Self {
        Self::new(value, PartialDerivatives::new())
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn partials(&self) -> &PartialDerivatives {
        &self.partials
    }

    pub fn into_partials(self) -> PartialDerivatives {
        self.partials
    }
}

/// Axis order moving the last of `rank` axes to the front.
fn last_to_front(rank: usize) -> Vec<usize> {
    let mut axes = vec![rank - 1];
    axes.extend(0..rank - 1);
    axes
}

/// Axis order moving the first of `rank` axes to the back.
fn front_to_last(rank: usize) -> Vec<usize> {
    let mut axes: Vec<usize> = (1..rank).collect();
    axes.push(0);
    axes
}
