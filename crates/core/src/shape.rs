//! # Shapes - Static Metadata
//!
//! A vertex's shape is fixed when the vertex is built and is derived purely
//! from its parents' shapes. Nothing here looks at tensor values: every
//! function answers "what shape would this operation produce?" and fails
//! fast when the answer is "none".
//!
//! ## Reduction policy
//!
//! Reductions and slices always keep the reduced dimension with size 1, for
//! every rank. A `(4, 2)` tensor summed over dimension 0 is `(1, 2)`, and a
//! `(2, 2, 2)` tensor sliced along dimension 1 is `(2, 1, 2)`. Dropping a
//! dimension is an explicit reshape.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Dimension sizes of a tensor, outermost first. Empty means scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Rank-0 shape.
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        numel(&self.dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self { dims }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.dims
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Total element count of a shape (1 for a scalar).
pub fn numel(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Left-pad `dims` with size-1 dimensions up to `rank`.
pub fn pad_left(dims: &[usize], rank: usize) -> Vec<usize> {
    let mut padded = vec![1; rank.saturating_sub(dims.len())];
    padded.extend_from_slice(dims);
    padded
}

/// Concatenate two shapes: `a ++ b`.
pub fn concat(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

/// Numpy-style broadcast of two shapes, aligned on trailing dimensions.
pub fn broadcast(a: &[usize], b: &[usize]) -> Result<Vec<usize>, CoreError> {
    let rank = a.len().max(b.len());
    let pa = pad_left(a, rank);
    let pb = pad_left(b, rank);

    pa.iter()
        .zip(pb.iter())
        .map(|(&x, &y)| match (x, y) {
            _ if x == y => Ok(x),
            (1, _) => Ok(y),
            (_, 1) => Ok(x),
            _ => Err(CoreError::Incompatible {
                left: Shape::from(a),
                right: Shape::from(b),
            }),
        })
        .collect()
}

/// Broadcast any number of shapes together.
pub fn broadcast_all(shapes: &[&[usize]]) -> Result<Vec<usize>, CoreError> {
    shapes
        .iter()
        .try_fold(Vec::new(), |acc, s| broadcast(&acc, s))
}

/// Whether `from` broadcasts to exactly `to` without changing `to`.
pub fn is_broadcastable_to(from: &[usize], to: &[usize]) -> bool {
    from.len() <= to.len() && matches!(broadcast(from, to), Ok(ref out) if out == to)
}

/// Fail unless `dim < rank`.
pub fn check_dimension(dim: usize, rank: usize) -> Result<(), CoreError> {
    if dim >= rank {
        return Err(CoreError::InvalidDimension { dim, rank });
    }
    Ok(())
}

/// Shape after summing over `dims`, keeping each summed dimension as size 1.
pub fn summed(dims: &[usize], over: &[usize]) -> Result<Vec<usize>, CoreError> {
    let mut out = dims.to_vec();
    let mut seen = vec![false; dims.len()];
    for &d in over {
        check_dimension(d, dims.len())?;
        if seen[d] {
            return Err(CoreError::DuplicateDimension { dim: d });
        }
        seen[d] = true;
        out[d] = 1;
    }
    Ok(out)
}

/// Shape after taking `index` along `dim`, keeping `dim` as size 1.
pub fn sliced(dims: &[usize], dim: usize, index: usize) -> Result<Vec<usize>, CoreError> {
    check_dimension(dim, dims.len())?;
    if index >= dims[dim] {
        return Err(CoreError::IndexOutOfBounds {
            index,
            size: dims[dim],
        });
    }
    let mut out = dims.to_vec();
    out[dim] = 1;
    Ok(out)
}

/// Validate a reshape and return the target shape.
pub fn reshaped(from: &[usize], to: &[usize]) -> Result<Vec<usize>, CoreError> {
    if numel(from) != numel(to) {
        return Err(CoreError::ElementCount {
            from: Shape::from(from),
            to: Shape::from(to),
        });
    }
    Ok(to.to_vec())
}

/// `(m, n) x (n, p) -> (m, p)`.
pub fn matmul(a: &[usize], b: &[usize]) -> Result<Vec<usize>, CoreError> {
    require_rank("MatMul", a, 2)?;
    require_rank("MatMul", b, 2)?;
    if a[1] != b[0] {
        return Err(CoreError::ShapeMismatch {
            expected: Shape::matrix(a[1], b[1]),
            got: Shape::from(b),
        });
    }
    Ok(vec![a[0], b[1]])
}

/// `(m, n) -> (n, m)`.
pub fn transposed(a: &[usize]) -> Result<Vec<usize>, CoreError> {
    require_rank("Transpose", a, 2)?;
    Ok(vec![a[1], a[0]])
}

fn require_rank(op: &'static str, dims: &[usize], rank: usize) -> Result<(), CoreError> {
    if dims.len() != rank {
        return Err(CoreError::Rank {
            op,
            expected: rank,
            got: dims.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_broadcasts_into_anything() {
        let out = Shape::from(broadcast(&Shape::scalar().dims, &[3, 4]).unwrap());
        assert_eq!(out, Shape::matrix(3, 4));
        assert_eq!(out.numel(), 12);
        assert!(is_broadcastable_to(&[], &[]));
        assert!(!is_broadcastable_to(&[3, 4], &[]));
    }

    #[test]
    fn test_slice_of_matrix_stays_rank_two() {
        let m = Shape::matrix(4, 2);
        let row = Shape::from(sliced(&m.dims, 0, 3).unwrap());
        let col = Shape::from(sliced(&m.dims, 1, 0).unwrap());
        assert_eq!(row.to_string(), "[1, 2]");
        assert_eq!(col.to_string(), "[4, 1]");
        assert_eq!(row.rank(), m.rank());
    }

    #[test]
    fn test_reshape_is_the_only_squeeze() {
        let summed_out = summed(&[4, 2], &[0, 1]).unwrap();
        assert_eq!(summed_out, vec![1, 1]);
        assert_eq!(reshaped(&summed_out, &[]).unwrap(), Vec::<usize>::new());
        assert_eq!(
            reshaped(&[4, 2], &[3, 3]),
            Err(CoreError::ElementCount {
                from: Shape::matrix(4, 2),
                to: Shape::matrix(3, 3),
            })
        );
    }

    #[test]
    fn test_pad_and_concat() {
        assert_eq!(pad_left(&[3], 3), vec![1, 1, 3]);
        assert_eq!(pad_left(&[2, 3], 1), vec![2, 3]);
        assert_eq!(concat(&[2], &[4, 2]), vec![2, 4, 2]);
    }

    #[test]
    fn test_summed_keeps_rank() {
        assert_eq!(summed(&[4, 2], &[0]).unwrap(), vec![1, 2]);
        assert_eq!(summed(&[2, 3, 4], &[0, 2]).unwrap(), vec![1, 3, 1]);
        assert_eq!(summed(&[5], &[0]).unwrap(), vec![1]);
    }

    #[test]
    fn test_summed_rejects_bad_dims() {
        assert_eq!(
            summed(&[2, 3], &[2]),
            Err(CoreError::InvalidDimension { dim: 2, rank: 2 })
        );
        assert_eq!(
            summed(&[2, 3], &[1, 1]),
            Err(CoreError::DuplicateDimension { dim: 1 })
        );
    }
}
