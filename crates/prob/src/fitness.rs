//! # Fitness Contract
//!
//! External optimizers see a model only through two traits over flat
//! `f64` points. A [`PointLayout`] fixes how latent tensors map onto a
//! point: latents in creation order, each flattened row-major.

use std::ops::Range;

use bayesgraph_core::{shape, Tensor};
use bayesgraph_diff::{Graph, PartialDerivatives, VertexId};
use serde::{Deserialize, Serialize};

use crate::error::ProbError;

/// Scalar objective over a flat point.
pub trait FitnessFunction {
    fn evaluate(&self, point: &[f64]) -> Result<f64, ProbError>;
}

/// Gradient of a [`FitnessFunction`], laid out like the point.
pub trait FitnessFunctionGradient {
    fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError>;
}

/// Mapping between a list of tensors and a flat point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointLayout {
    shapes: Vec<Vec<usize>>,
    offsets: Vec<usize>,
    len: usize,
}

impl PointLayout {
    pub fn new(shapes: Vec<Vec<usize>>) -> Self {
        let mut offsets = Vec::with_capacity(shapes.len());
        let mut len = 0;
        for s in &shapes {
            offsets.push(len);
            len += shape::numel(s);
        }
        Self { shapes, offsets, len }
    }

    /// Layout of `vertices` in the given order, using their static shapes.
    pub fn for_vertices(graph: &Graph, vertices: &[VertexId]) -> Result<Self, ProbError> {
        let shapes = vertices
            .iter()
            .map(|&id| Ok(graph.shape(id)?.to_vec()))
            .collect::<Result<Vec<_>, ProbError>>()?;
        Ok(Self::new(shapes))
    }

    /// Total number of scalars in a point.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of tensors.
    pub fn slots(&self) -> usize {
        self.shapes.len()
    }

    pub fn shapes(&self) -> &[Vec<usize>] {
        &self.shapes
    }

    /// Positions of slot `slot` inside a point.
    pub fn range(&self, slot: usize) -> Option<Range<usize>> {
        let start = *self.offsets.get(slot)?;
        Some(start..start + shape::numel(&self.shapes[slot]))
    }

    /// Concatenate `values` row-major into a point.
    pub fn flatten(&self, values: &[Tensor]) -> Result<Vec<f64>, ProbError> {
        if values.len() != self.shapes.len() {
            return Err(ProbError::PointLength {
                expected: self.shapes.len(),
                got: values.len(),
            });
        }
        let mut point = Vec::with_capacity(self.len);
        for (slot, (value, expected)) in values.iter().zip(&self.shapes).enumerate() {
            if value.shape() != expected.as_slice() {
                return Err(ProbError::SlotShape {
                    slot,
                    expected: expected.clone(),
                    got: value.shape().to_vec(),
                });
            }
            point.extend(value.to_vec());
        }
        Ok(point)
    }

    /// Split a point back into tensors of the layout's shapes.
    pub fn unflatten(&self, point: &[f64]) -> Result<Vec<Tensor>, ProbError> {
        self.check_point(point)?;
        self.shapes
            .iter()
            .zip(&self.offsets)
            .map(|(s, &start)| {
                let end = start + shape::numel(s);
                Tensor::from_vec(s, point[start..end].to_vec()).map_err(|e| ProbError::Graph(e.into()))
            })
            .collect()
    }

    /// Flatten gradient entries for `vertices`, one slot each. Vertices with
    /// no entry contribute zeros.
    pub fn flatten_partials(
        &self,
        vertices: &[VertexId],
        partials: &PartialDerivatives,
    ) -> Result<Vec<f64>, ProbError> {
        let values: Vec<Tensor> = vertices
            .iter()
            .zip(&self.shapes)
            .map(|(&id, s)| {
                partials
                    .with_respect_to(id)
                    .cloned()
                    .unwrap_or_else(|| Tensor::zeros(s))
            })
            .collect();
        self.flatten(&values)
    }

    pub fn check_point(&self, point: &[f64]) -> Result<(), ProbError> {
        if point.len() != self.len {
            return Err(ProbError::PointLength {
                expected: self.len,
                got: point.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        let layout = PointLayout::new(vec![vec![], vec![2, 3], vec![4]]);
        assert_eq!(layout.len(), 11);
        assert_eq!(layout.slots(), 3);
        assert_eq!(layout.range(0), Some(0..1));
        assert_eq!(layout.range(1), Some(1..7));
        assert_eq!(layout.range(2), Some(7..11));
        assert_eq!(layout.range(3), None);
    }

    #[test]
    fn test_flatten_is_row_major() {
        let layout = PointLayout::new(vec![vec![2, 2], vec![]]);
        let m = Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let point = layout.flatten(&[m, Tensor::scalar(5.0)]).unwrap();
        assert_eq!(point, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_rejects_wrong_lengths_and_shapes() {
        let layout = PointLayout::new(vec![vec![2]]);
        assert_eq!(
            layout.unflatten(&[1.0, 2.0, 3.0]),
            Err(ProbError::PointLength { expected: 2, got: 3 })
        );
        assert_eq!(
            layout.flatten(&[Tensor::vector(vec![1.0, 2.0, 3.0])]),
            Err(ProbError::SlotShape {
                slot: 0,
                expected: vec![2],
                got: vec![3],
            })
        );
    }
}
