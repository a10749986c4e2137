//! # Tensors
//!
//! `Tensor` is the dense `f64` array every vertex value, derivative and
//! adjoint is made of. Booleans are carried as `0.0` / `1.0` masks and
//! integers as whole-valued doubles, so the differentiation engine only ever
//! deals with one element type.
//!
//! Binary operations broadcast numpy-style (trailing dimensions aligned);
//! reductions keep reduced dimensions with size 1 (see [`crate::shape`]).

use std::fmt;

use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Slice, Zip};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::shape::{self, Shape};

/// A dense, dynamically shaped tensor of doubles.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tensor {
    data: ArrayD<f64>,
}

impl Tensor {
    /// Tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Tensor filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Tensor filled with a constant value.
    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Rank-0 tensor.
    pub fn scalar(value: f64) -> Self {
        Self::full(&[], value)
    }

    /// Rank-1 tensor.
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            data: Array1::from(data).into_dyn(),
        }
    }

    /// Tensor from row-major data.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self, CoreError> {
        if data.len() != shape::numel(shape) {
            return Err(CoreError::ElementCount {
                from: Shape::vector(data.len()),
                to: Shape::from(shape),
            });
        }
        Ok(Self {
            data: ArrayD::from_shape_vec(IxDyn(shape), data)?,
        })
    }

    /// Rank-2 tensor from row-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, CoreError> {
        Self::from_vec(&[rows, cols], data)
    }

    /// The identity map on `shape`, laid out as `shape ++ shape`.
    ///
    /// Element `[i.., j..]` is 1 exactly when the multi-indices `i` and `j`
    /// are equal. This seeds both differentiation modes.
    pub fn identity(shape: &[usize]) -> Self {
        let n = shape::numel(shape);
        let mut data = ArrayD::zeros(IxDyn(&shape::concat(shape, shape)));
        if let Some(flat) = data.as_slice_mut() {
            for i in 0..n {
                flat[i * n + i] = 1.0;
            }
        }
        Self { data }
    }

    /// Borrow the underlying array.
    pub fn array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Take the underlying array.
    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for any single-element tensor, whatever its rank.
    pub fn is_scalar(&self) -> bool {
        self.len() == 1
    }

    /// The value of a single-element tensor.
    pub fn as_scalar(&self) -> Result<f64, CoreError> {
        match self.data.iter().next() {
            Some(&v) if self.is_scalar() => Ok(v),
            _ => Err(CoreError::ShapeMismatch {
                expected: Shape::scalar(),
                got: Shape::from(self.shape()),
            }),
        }
    }

    /// Element at a multi-index.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.data.get(IxDyn(index)).copied()
    }

    /// Elements in row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// Apply a function to each element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        Self {
            data: self.data.mapv(f),
        }
    }

    /// Combine two tensors element-wise after broadcasting them together.
    pub fn zip_with(&self, other: &Tensor, f: impl Fn(f64, f64) -> f64) -> Result<Tensor, CoreError> {
        let out = shape::broadcast(self.shape(), other.shape())?;
        let a = self.broadcast_view(&out)?;
        let b = other.broadcast_view(&out)?;
        Ok(Self {
            data: Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)),
        })
    }

    fn broadcast_view(&self, to: &[usize]) -> Result<ArrayViewD<'_, f64>, CoreError> {
        self.data
            .broadcast(IxDyn(to))
            .ok_or_else(|| CoreError::Incompatible {
                left: Shape::from(self.shape()),
                right: Shape::from(to),
            })
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn pow(&self, exponent: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(exponent, f64::powf)
    }

    /// Element-wise product where a zero in `self` stays zero.
    ///
    /// Tangents and adjoints use this so that a region zeroed by a mask is
    /// not turned into `NaN` by an infinite or undefined local derivative.
    pub fn mul_structural(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| if a == 0.0 { 0.0 } else { a * b })
    }

    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|x| x * factor)
    }

    pub fn neg(&self) -> Tensor {
        self.map(|x| -x)
    }

    pub fn exp(&self) -> Tensor {
        self.map(f64::exp)
    }

    pub fn ln(&self) -> Tensor {
        self.map(f64::ln)
    }

    pub fn sqrt(&self) -> Tensor {
        self.map(f64::sqrt)
    }

    pub fn sin(&self) -> Tensor {
        self.map(f64::sin)
    }

    pub fn cos(&self) -> Tensor {
        self.map(f64::cos)
    }

    pub fn tanh(&self) -> Tensor {
        self.map(f64::tanh)
    }

    pub fn abs(&self) -> Tensor {
        self.map(f64::abs)
    }

    /// Sign of each element, with `signum(0) = 0`.
    pub fn signum(&self) -> Tensor {
        self.map(|x| if x == 0.0 { 0.0 } else { x.signum() })
    }

    pub fn recip(&self) -> Tensor {
        self.map(f64::recip)
    }

    /// 1 where `self > other`, else 0.
    pub fn greater_than_mask(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| if a > b { 1.0 } else { 0.0 })
    }

    /// 1 where `self <= other`, else 0.
    pub fn less_than_or_equal_mask(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        self.zip_with(other, |a, b| if a <= b { 1.0 } else { 0.0 })
    }

    /// Pick `if_true` where `condition` is non-zero and `if_false` elsewhere.
    ///
    /// All three operands are broadcast together; the unselected branch is
    /// never combined arithmetically, so infinities there cannot leak.
    pub fn select(condition: &Tensor, if_true: &Tensor, if_false: &Tensor) -> Result<Tensor, CoreError> {
        let out = shape::broadcast_all(&[condition.shape(), if_true.shape(), if_false.shape()])?;
        let c = condition.broadcast_view(&out)?;
        let t = if_true.broadcast_view(&out)?;
        let f = if_false.broadcast_view(&out)?;
        Ok(Self {
            data: Zip::from(c)
                .and(t)
                .and(f)
                .map_collect(|&c, &t, &f| if c != 0.0 { t } else { f }),
        })
    }

    /// Replace elements where `mask` is non-zero with `value`.
    pub fn set_with_mask(&self, mask: &Tensor, value: f64) -> Result<Tensor, CoreError> {
        Tensor::select(mask, &Tensor::scalar(value), self)
    }

    /// Sum over `dims`, keeping each summed dimension with size 1.
    pub fn sum_dims(&self, dims: &[usize]) -> Result<Tensor, CoreError> {
        shape::summed(self.shape(), dims)?;
        let mut data = self.data.clone();
        for &d in dims {
            data = data.sum_axis(Axis(d)).insert_axis(Axis(d));
        }
        Ok(Self { data })
    }

    /// Reverse a broadcast: sum this tensor down to `target`.
    ///
    /// `target` must broadcast to `self.shape()`. Dimensions that were
    /// stretched are summed, then the result is laid out as `target`.
    pub fn sum_to_shape(&self, target: &[usize]) -> Result<Tensor, CoreError> {
        if self.shape() == target {
            return Ok(self.clone());
        }
        if !shape::is_broadcastable_to(target, self.shape()) {
            return Err(CoreError::Incompatible {
                left: Shape::from(target),
                right: Shape::from(self.shape()),
            });
        }
        let padded = shape::pad_left(target, self.rank());
        let stretched: Vec<usize> = padded
            .iter()
            .zip(self.shape())
            .enumerate()
            .filter(|(_, (t, s))| **t == 1 && **s != 1)
            .map(|(i, _)| i)
            .collect();
        self.sum_dims(&stretched)?.reshape(target)
    }

    /// Materialize a broadcast to `shape`.
    pub fn broadcast_to(&self, to: &[usize]) -> Result<Tensor, CoreError> {
        Ok(Self {
            data: self.broadcast_view(to)?.to_owned(),
        })
    }

    /// Take `index` along `dim`, keeping `dim` with size 1.
    pub fn slice(&self, dim: usize, index: usize) -> Result<Tensor, CoreError> {
        shape::sliced(self.shape(), dim, index)?;
        Ok(Self {
            data: self
                .data
                .slice_axis(Axis(dim), Slice::from(index..index + 1))
                .to_owned(),
        })
    }

    /// Place this slice into zeros of `full` at `index` along `dim`.
    ///
    /// The inverse of [`Tensor::slice`]: everything outside the slice is zero.
    pub fn embed_slice(&self, full: &[usize], dim: usize, index: usize) -> Result<Tensor, CoreError> {
        let expected = shape::sliced(full, dim, index)?;
        if self.shape() != expected.as_slice() {
            return Err(CoreError::ShapeMismatch {
                expected: Shape::from(expected),
                got: Shape::from(self.shape()),
            });
        }
        let mut data = ArrayD::zeros(IxDyn(full));
        data.slice_axis_mut(Axis(dim), Slice::from(index..index + 1))
            .assign(&self.data);
        Ok(Self { data })
    }

    /// Same elements in row-major order, laid out as `to`.
    pub fn reshape(&self, to: &[usize]) -> Result<Tensor, CoreError> {
        shape::reshaped(self.shape(), to)?;
        Ok(Self {
            data: ArrayD::from_shape_vec(IxDyn(to), self.to_vec())?,
        })
    }

    /// Reorder axes; `axes[i]` names the source axis for output axis `i`.
    pub fn permute_axes(&self, axes: &[usize]) -> Result<Tensor, CoreError> {
        let mut seen = vec![false; self.rank()];
        if axes.len() != self.rank() {
            return Err(CoreError::Rank {
                op: "permute_axes",
                expected: self.rank(),
                got: axes.len(),
            });
        }
        for &a in axes {
            shape::check_dimension(a, self.rank())?;
            if seen[a] {
                return Err(CoreError::DuplicateDimension { dim: a });
            }
            seen[a] = true;
        }
        Ok(Self {
            data: self
                .data
                .clone()
                .permuted_axes(IxDyn(axes))
                .as_standard_layout()
                .into_owned(),
        })
    }

    /// Rank-2 transpose.
    pub fn transpose(&self) -> Result<Tensor, CoreError> {
        shape::transposed(self.shape())?;
        self.permute_axes(&[1, 0])
    }

    /// Rank-2 matrix product.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor, CoreError> {
        shape::matmul(self.shape(), other.shape())?;
        let a = self.data.view().into_dimensionality::<Ix2>()?;
        let b = other.data.view().into_dimensionality::<Ix2>()?;
        let c: Array2<f64> = a.dot(&b);
        Ok(Self { data: c.into_dyn() })
    }

    /// Same shape and every pair of elements within `tolerance`.
    ///
    /// Infinities compare equal to themselves; `NaN` never compares equal.
    pub fn all_close(&self, other: &Tensor, tolerance: f64) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(&a, &b)| a == b || (a - b).abs() <= tolerance)
    }

    /// Whether any element is `NaN`.
    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|x| x.is_nan())
    }
}

impl From<ArrayD<f64>> for Tensor {
    fn from(data: ArrayD<f64>) -> Self {
        Self { data }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rank() == 0 {
            write!(f, "Tensor(scalar={})", self.sum())
        } else {
            write!(
                f,
                "Tensor(shape={}, data={:?})",
                Shape::from(self.shape()),
                self.to_vec()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_scalar() {
        let t = Tensor::scalar(42.0);
        assert!(t.is_scalar());
        assert_eq!(t.rank(), 0);
        assert_eq!(t.as_scalar().unwrap(), 42.0);
    }

    #[test]
    fn test_as_scalar_rejects_vectors() {
        let t = Tensor::vector(vec![1.0, 2.0]);
        assert!(t.as_scalar().is_err());
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Tensor::from_vec(&[2, 3], vec![1.0; 5]).is_err());
        let t = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(t.get(&[1, 0]), Some(4.0));
    }

    #[test]
    fn test_identity_layout() {
        let id = Tensor::identity(&[2, 2]);
        assert_eq!(id.shape(), &[2, 2, 2, 2]);
        assert_eq!(id.get(&[0, 1, 0, 1]), Some(1.0));
        assert_eq!(id.get(&[0, 1, 1, 0]), Some(0.0));
        assert_eq!(id.sum(), 4.0);
    }

    #[test]
    fn test_broadcast_add() {
        let m = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let row = Tensor::vector(vec![10.0, 20.0, 30.0]);
        let out = m.add(&row).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(out.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_incompatible_broadcast() {
        let a = Tensor::vector(vec![1.0, 2.0, 3.0]);
        let b = Tensor::vector(vec![1.0, 2.0]);
        assert!(matches!(a.add(&b), Err(CoreError::Incompatible { .. })));
    }

    #[test]
    fn test_sum_dims_keeps_rank() {
        let m = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let rows = m.sum_dims(&[1]).unwrap();
        assert_eq!(rows.shape(), &[2, 1]);
        assert_eq!(rows.to_vec(), vec![6.0, 15.0]);
    }

    #[test]
    fn test_sum_to_shape_reverses_broadcast() {
        let g = Tensor::ones(&[2, 3]);
        assert_eq!(g.sum_to_shape(&[3]).unwrap().to_vec(), vec![2.0, 2.0, 2.0]);
        assert_eq!(g.sum_to_shape(&[]).unwrap().as_scalar().unwrap(), 6.0);
        assert_eq!(g.sum_to_shape(&[2, 1]).unwrap().to_vec(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_slice_and_embed() {
        let m = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let col = m.slice(1, 2).unwrap();
        assert_eq!(col.shape(), &[2, 1]);
        assert_eq!(col.to_vec(), vec![3.0, 6.0]);

        let back = col.embed_slice(&[2, 3], 1, 2).unwrap();
        assert_eq!(back.to_vec(), vec![0.0, 0.0, 3.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn test_select_does_not_leak_infinities() {
        let mask = Tensor::vector(vec![1.0, 0.0]);
        let out = Tensor::vector(vec![f64::NAN, 2.0])
            .set_with_mask(&mask, f64::NEG_INFINITY)
            .unwrap();
        assert_eq!(out.to_vec(), vec![f64::NEG_INFINITY, 2.0]);
    }

    #[test]
    fn test_mul_structural_keeps_zero() {
        let adj = Tensor::vector(vec![0.0, 2.0]);
        let local = Tensor::vector(vec![f64::INFINITY, 3.0]);
        assert_eq!(adj.mul_structural(&local).unwrap().to_vec(), vec![0.0, 6.0]);
    }

    #[test]
    fn test_matmul_and_transpose() {
        let a = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = Tensor::matrix(3, 2, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);

        let t = a.transpose().unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_reshape_checks_count() {
        let t = Tensor::vector(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.reshape(&[2, 2]).unwrap().shape(), &[2, 2]);
        assert!(t.reshape(&[3]).is_err());
    }
}
