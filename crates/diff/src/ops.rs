//! # Differentiable Operations
//!
//! `Op` is the set of deterministic operators a vertex can apply to its
//! parents. Each operator knows how to:
//!
//! - derive its output shape from its parents' shapes (at construction)
//! - execute forward on parent values
//! - push a tangent forward (JVP) and an adjoint backward (VJP)
//!
//! ## Batched derivative layout
//!
//! Derivative rules work on tensors with one extra **leading** batch axis.
//! A tangent for parent `X` has shape `[b] ++ X` (one slice per tracked
//! input element) and becomes `[b] ++ Y`; an adjoint for the output has shape
//! `[k] ++ Y` (one slice per output element being differentiated) and becomes
//! `[k] ++ X`. [`crate::partials::PartialDerivatives`] converts to and from
//! this layout, so the rules below never see full derivative shapes.
//!
//! | Op | Forward | Backward |
//! |----|---------|----------|
//! | Add / Sub | a ± b | adjoint (negated for b), summed over broadcast dims |
//! | Mul / Div / Pow | a·b, a/b, aᵇ | adjoint × local derivative, summed over broadcast dims |
//! | MatMul | A @ B | adjoint @ Bᵀ, Aᵀ @ adjoint |
//! | Sum | sum over dims (kept as 1) | adjoint replicated across the summed dims |
//! | SumAll | sum to scalar | adjoint replicated everywhere |
//! | Slice | one index along a dim | adjoint written into that index, zero elsewhere |
//! | SetWithMask / Where | masked selection | adjoint routed to the selected branch |
//! | masks | 0/1 comparisons | none |

use std::fmt;

use bayesgraph_core::schema::{self, OpSchema};
use bayesgraph_core::shape;
use bayesgraph_core::{CoreError, Tensor};

use crate::error::GraphError;

/// Deterministic operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Element-wise `a + b` (broadcasting)
    Add,
    /// Element-wise `a - b` (broadcasting)
    Sub,
    /// Element-wise `a * b` (broadcasting)
    Mul,
    /// Element-wise `a / b` (broadcasting)
    Div,
    /// Element-wise `a ^ b` (broadcasting)
    Pow,
    /// Matrix product of two rank-2 tensors
    MatMul,
    Neg,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tanh,
    Abs,
    /// Sum over the listed dimensions, keeping them with size 1
    Sum { dims: Vec<usize> },
    /// Sum of every element, as a rank-0 tensor
    SumAll,
    /// One index along a dimension, keeping the dimension with size 1
    Slice { dim: usize, index: usize },
    /// Same elements, new shape
    Reshape { shape: Vec<usize> },
    /// Rank-2 transpose
    Transpose,
    /// 1 where `a > b`
    GreaterThanMask,
    /// 1 where `a <= b`
    LessThanOrEqualMask,
    /// Operand with `value` wherever the mask is non-zero
    SetWithMask { value: f64 },
    /// Predicate ? then : else
    Where,
}

impl Op {
    /// Static constructor signature of this operator.
    pub fn schema(&self) -> &'static OpSchema {
        match self {
            Op::Add => &schema::ADD,
            Op::Sub => &schema::SUB,
            Op::Mul => &schema::MUL,
            Op::Div => &schema::DIV,
            Op::Pow => &schema::POW,
            Op::MatMul => &schema::MATMUL,
            Op::Neg => &schema::NEG,
            Op::Exp => &schema::EXP,
            Op::Log => &schema::LOG,
            Op::Sqrt => &schema::SQRT,
            Op::Sin => &schema::SIN,
            Op::Cos => &schema::COS,
            Op::Tanh => &schema::TANH,
            Op::Abs => &schema::ABS,
            Op::Sum { .. } => &schema::SUM,
            Op::SumAll => &schema::SUM_ALL,
            Op::Slice { .. } => &schema::SLICE,
            Op::Reshape { .. } => &schema::RESHAPE,
            Op::Transpose => &schema::TRANSPOSE,
            Op::GreaterThanMask => &schema::GREATER_THAN_MASK,
            Op::LessThanOrEqualMask => &schema::LESS_THAN_OR_EQUAL_MASK,
            Op::SetWithMask { .. } => &schema::SET_WITH_MASK,
            Op::Where => &schema::WHERE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.schema().name
    }

    /// Number of parents this operation expects.
    pub fn arity(&self) -> usize {
        self.schema().arity()
    }

    /// Whether any parent receives derivatives through this operator.
    pub fn is_differentiable(&self) -> bool {
        (0..self.arity()).any(|i| self.is_differentiable_wrt(i))
    }

    /// Whether parent `which` receives derivatives through this operator.
    pub fn is_differentiable_wrt(&self, which: usize) -> bool {
        match self {
            Op::GreaterThanMask | Op::LessThanOrEqualMask => false,
            Op::SetWithMask { .. } => which == 0,
            Op::Where => which > 0,
            _ => which < self.arity(),
        }
    }

    /// Output shape for the given parent shapes, or why there is none.
    pub fn output_shape(&self, parents: &[&[usize]]) -> Result<Vec<usize>, GraphError> {
        if parents.len() != self.arity() {
            return Err(GraphError::Arity {
                op: self.name(),
                expected: self.arity(),
                got: parents.len(),
            });
        }
        let out = match self {
            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Pow
            | Op::GreaterThanMask
            | Op::LessThanOrEqualMask
            | Op::SetWithMask { .. } => shape::broadcast(parents[0], parents[1])?,
            Op::Where => shape::broadcast_all(parents)?,
            Op::MatMul => shape::matmul(parents[0], parents[1])?,
            Op::Neg | Op::Exp | Op::Log | Op::Sqrt | Op::Sin | Op::Cos | Op::Tanh | Op::Abs => {
                parents[0].to_vec()
            }
            Op::Sum { dims } => shape::summed(parents[0], dims)?,
            Op::SumAll => vec![],
            Op::Slice { dim, index } => shape::sliced(parents[0], *dim, *index)?,
            Op::Reshape { shape: to } => shape::reshaped(parents[0], to)?,
            Op::Transpose => shape::transposed(parents[0])?,
        };
        Ok(out)
    }

    /// Execute the forward pass for this operation.
    pub fn forward(&self, inputs: &[&Tensor]) -> Result<Tensor, CoreError> {
        let a = inputs[0];
        match self {
            Op::Add => a.add(inputs[1]),
            Op::Sub => a.sub(inputs[1]),
            Op::Mul => a.mul(inputs[1]),
            Op::Div => a.div(inputs[1]),
            Op::Pow => a.pow(inputs[1]),
            Op::MatMul => a.matmul(inputs[1]),
            Op::Neg => Ok(a.neg()),
            Op::Exp => Ok(a.exp()),
            Op::Log => Ok(a.ln()),
            Op::Sqrt => Ok(a.sqrt()),
            Op::Sin => Ok(a.sin()),
            Op::Cos => Ok(a.cos()),
            Op::Tanh => Ok(a.tanh()),
            Op::Abs => Ok(a.abs()),
            Op::Sum { dims } => a.sum_dims(dims),
            Op::SumAll => Ok(Tensor::scalar(a.sum())),
            Op::Slice { dim, index } => a.slice(*dim, *index),
            Op::Reshape { shape: to } => a.reshape(to),
            Op::Transpose => a.transpose(),
            Op::GreaterThanMask => a.greater_than_mask(inputs[1]),
            Op::LessThanOrEqualMask => a.less_than_or_equal_mask(inputs[1]),
            Op::SetWithMask { value } => a.set_with_mask(inputs[1], *value),
            Op::Where => Tensor::select(a, inputs[1], inputs[2]),
        }
    }

    /// Local derivative of the output with respect to parent `which`, for
    /// element-wise operators. Broadcastable to the output shape.
    fn local_derivative(&self, which: usize, inputs: &[&Tensor], output: &Tensor) -> Result<Tensor, CoreError> {
        let a = inputs[0];
        let local = match (self, which) {
            (Op::Add, _) | (Op::Sub, 0) => Tensor::scalar(1.0),
            (Op::Sub, _) | (Op::Neg, _) => Tensor::scalar(-1.0),
            (Op::Mul, 0) => inputs[1].clone(),
            (Op::Mul, _) => a.clone(),
            (Op::Div, 0) => inputs[1].recip(),
            (Op::Div, _) => output.div(inputs[1])?.neg(),
            (Op::Pow, 0) => {
                let b = inputs[1];
                b.mul(&a.pow(&b.map(|e| e - 1.0))?)?
            }
            (Op::Pow, _) => output.mul(&a.ln())?,
            (Op::Exp, _) => output.clone(),
            (Op::Log, _) => a.recip(),
            (Op::Sqrt, _) => output.recip().scale(0.5),
            (Op::Sin, _) => a.cos(),
            (Op::Cos, _) => a.sin().neg(),
            (Op::Tanh, _) => output.map(|y| 1.0 - y * y),
            (Op::Abs, _) => a.signum(),
            _ => {
                return Err(CoreError::Layout {
                    reason: format!("{} has no element-wise derivative", self.name()),
                })
            }
        };
        Ok(local)
    }

    /// Forward rule: tangent `[b] ++ X_which` to `[b] ++ Y`.
    ///
    /// Returns `None` when parent `which` does not influence the output
    /// differentiably.
    pub fn jvp(
        &self,
        which: usize,
        inputs: &[&Tensor],
        output: &Tensor,
        tangent: &Tensor,
    ) -> Result<Option<Tensor>, CoreError> {
        if !self.is_differentiable_wrt(which) {
            return Ok(None);
        }
        let y = output.shape();
        let out = match self {
            Op::Sum { dims } => tangent.sum_dims(&shift(dims))?,
            Op::SumAll => {
                let all: Vec<usize> = (1..tangent.rank()).collect();
                tangent.sum_dims(&all)?.reshape(&[batch(tangent)])?
            }
            Op::Slice { dim, index } => tangent.slice(dim + 1, *index)?,
            Op::Reshape { shape: to } => tangent.reshape(&batched(batch(tangent), to))?,
            Op::Transpose => tangent.permute_axes(&[0, 2, 1])?,
            Op::MatMul => {
                let b = batch(tangent);
                let (m, n, p) = matmul_dims(inputs);
                if which == 0 {
                    // dY = dA @ B
                    tangent
                        .reshape(&[b * m, n])?
                        .matmul(inputs[1])?
                        .reshape(&[b, m, p])?
                } else {
                    // dY = A @ dB
                    let folded = tangent.permute_axes(&[1, 0, 2])?.reshape(&[n, b * p])?;
                    inputs[0]
                        .matmul(&folded)?
                        .reshape(&[m, b, p])?
                        .permute_axes(&[1, 0, 2])?
                }
            }
            Op::SetWithMask { .. } => {
                Tensor::select(inputs[1], &Tensor::scalar(0.0), &batch_expand(tangent, y)?)?
            }
            Op::Where => {
                let expanded = batch_expand(tangent, y)?;
                let zero = Tensor::scalar(0.0);
                if which == 1 {
                    Tensor::select(inputs[0], &expanded, &zero)?
                } else {
                    Tensor::select(inputs[0], &zero, &expanded)?
                }
            }
            _ => {
                let local = self.local_derivative(which, inputs, output)?;
                batch_expand(tangent, y)?.mul_structural(&local)?
            }
        };
        Ok(Some(out))
    }

    /// Reverse rule: adjoint `[k] ++ Y` to `[k] ++ X_which`.
    ///
    /// Returns `None` when parent `which` receives no derivative.
    pub fn vjp(
        &self,
        which: usize,
        inputs: &[&Tensor],
        output: &Tensor,
        adjoint: &Tensor,
    ) -> Result<Option<Tensor>, CoreError> {
        if !self.is_differentiable_wrt(which) {
            return Ok(None);
        }
        let k = batch(adjoint);
        let x = inputs[which].shape();
        let full = batched(k, x);
        let out = match self {
            // The summed dims are still present with size 1, so the adjoint
            // broadcasts straight back across them.
            Op::Sum { .. } => adjoint.broadcast_to(&full)?,
            Op::SumAll => {
                let ones = batched(k, &vec![1; x.len()]);
                adjoint.reshape(&ones)?.broadcast_to(&full)?
            }
            Op::Slice { dim, index } => adjoint.embed_slice(&full, dim + 1, *index)?,
            Op::Reshape { .. } => adjoint.reshape(&full)?,
            Op::Transpose => adjoint.permute_axes(&[0, 2, 1])?,
            Op::MatMul => {
                let (m, n, p) = matmul_dims(inputs);
                if which == 0 {
                    // dA = adj @ Bᵀ
                    adjoint
                        .reshape(&[k * m, p])?
                        .matmul(&inputs[1].transpose()?)?
                        .reshape(&[k, m, n])?
                } else {
                    // dB = Aᵀ @ adj
                    let folded = adjoint.permute_axes(&[1, 0, 2])?.reshape(&[m, k * p])?;
                    inputs[0]
                        .transpose()?
                        .matmul(&folded)?
                        .reshape(&[n, k, p])?
                        .permute_axes(&[1, 0, 2])?
                }
            }
            Op::SetWithMask { .. } => {
                let routed = Tensor::select(inputs[1], &Tensor::scalar(0.0), adjoint)?;
                batch_reduce(&routed, x)?
            }
            Op::Where => {
                let zero = Tensor::scalar(0.0);
                let routed = if which == 1 {
                    Tensor::select(inputs[0], adjoint, &zero)?
                } else {
                    Tensor::select(inputs[0], &zero, adjoint)?
                };
                batch_reduce(&routed, x)?
            }
            _ => {
                let local = self.local_derivative(which, inputs, output)?;
                batch_reduce(&adjoint.mul_structural(&local)?, x)?
            }
        };
        Ok(Some(out))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Sum { dims } => write!(f, "Sum{:?}", dims),
            Op::Slice { dim, index } => write!(f, "Slice(dim={}, index={})", dim, index),
            Op::Reshape { shape } => write!(f, "Reshape{:?}", shape),
            Op::SetWithMask { value } => write!(f, "SetWithMask({})", value),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Size of the leading batch axis.
fn batch(t: &Tensor) -> usize {
    t.shape().first().copied().unwrap_or(1)
}

/// `[b] ++ dims`
fn batched(b: usize, dims: &[usize]) -> Vec<usize> {
    shape::concat(&[b], dims)
}

/// Shift dimension indices past the batch axis.
fn shift(dims: &[usize]) -> Vec<usize> {
    dims.iter().map(|d| d + 1).collect()
}

fn matmul_dims(inputs: &[&Tensor]) -> (usize, usize, usize) {
    let a = inputs[0].shape();
    let b = inputs[1].shape();
    (a[0], a[1], b[1])
}

/// `[b] ++ X` broadcast up to `[b] ++ Y`.
fn batch_expand(t: &Tensor, y: &[usize]) -> Result<Tensor, CoreError> {
    let b = batch(t);
    let padded = shape::pad_left(&t.shape()[1..], y.len());
    t.reshape(&batched(b, &padded))?.broadcast_to(&batched(b, y))
}

/// `[k] ++ Y` summed down to `[k] ++ X`, undoing a broadcast of `X` to `Y`.
fn batch_reduce(t: &Tensor, x: &[usize]) -> Result<Tensor, CoreError> {
    let k = batch(t);
    let padded = shape::pad_left(x, t.rank() - 1);
    t.sum_to_shape(&batched(k, &padded))?.reshape(&batched(k, x))
}
