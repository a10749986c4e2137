//! # Tensor Tests
//!
//! Element-wise arithmetic, masks and shape operations on [`Tensor`], as used
//! by the derivative rules built on top of it.

use bayesgraph_core::{CoreError, Tensor};
use rstest::rstest;

fn t(shape: &[usize], data: &[f64]) -> Tensor {
    Tensor::from_vec(shape, data.to_vec()).unwrap()
}

#[rstest]
#[case::add(Tensor::add, vec![11.0, 22.0, 13.0, 24.0])]
#[case::sub(Tensor::sub, vec![-9.0, -18.0, -7.0, -16.0])]
#[case::mul(Tensor::mul, vec![10.0, 40.0, 30.0, 80.0])]
#[case::div(Tensor::div, vec![0.1, 0.1, 0.3, 0.2])]
fn test_binary_ops_broadcast_rows(
    #[case] op: fn(&Tensor, &Tensor) -> Result<Tensor, CoreError>,
    #[case] expected: Vec<f64>,
) {
    let a = t(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let b = Tensor::vector(vec![10.0, 20.0]);
    let out = op(&a, &b).unwrap();
    assert_eq!(out.shape(), &[2, 2]);
    assert!(out.all_close(&t(&[2, 2], &expected), 1e-12));
}

#[test]
fn test_identity_is_outer_shape() {
    let id = Tensor::identity(&[2, 1]);
    assert_eq!(id.shape(), &[2, 1, 2, 1]);
    assert_eq!(id.get(&[0, 0, 0, 0]), Some(1.0));
    assert_eq!(id.get(&[1, 0, 1, 0]), Some(1.0));
    assert_eq!(id.get(&[0, 0, 1, 0]), Some(0.0));
    assert_eq!(id.sum(), 2.0);
}

#[test]
fn test_masks_and_select() {
    let x = Tensor::vector(vec![-1.0, 0.0, 2.0]);
    let zero = Tensor::scalar(0.0);
    assert_eq!(x.greater_than_mask(&zero).unwrap().to_vec(), vec![0.0, 0.0, 1.0]);
    assert_eq!(x.less_than_or_equal_mask(&zero).unwrap().to_vec(), vec![1.0, 1.0, 0.0]);

    let logs = x.ln();
    let guarded = Tensor::select(&x.greater_than_mask(&zero).unwrap(), &logs, &Tensor::scalar(-5.0)).unwrap();
    assert_eq!(guarded.to_vec(), vec![-5.0, -5.0, (2.0f64).ln()]);
    assert!(!guarded.has_nan());

    let masked = x.set_with_mask(&x.less_than_or_equal_mask(&zero).unwrap(), f64::NEG_INFINITY).unwrap();
    assert_eq!(masked.to_vec(), vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 2.0]);
}

#[test]
fn test_structural_multiply_ignores_infinities_under_zero() {
    let adjoint = Tensor::vector(vec![0.0, 2.0]);
    let local = Tensor::vector(vec![f64::INFINITY, 3.0]);
    assert_eq!(adjoint.mul_structural(&local).unwrap().to_vec(), vec![0.0, 6.0]);
    assert!(adjoint.mul(&local).unwrap().has_nan());
}

#[test]
fn test_reductions_keep_dims() {
    let x = t(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let rows = x.sum_dims(&[1]).unwrap();
    assert_eq!(rows.shape(), &[2, 1]);
    assert_eq!(rows.to_vec(), vec![6.0, 15.0]);

    let cols = x.sum_to_shape(&[3]).unwrap();
    assert_eq!(cols.shape(), &[3]);
    assert_eq!(cols.to_vec(), vec![5.0, 7.0, 9.0]);

    assert_eq!(x.sum_to_shape(&[]).unwrap().as_scalar().unwrap(), 21.0);
}

#[test]
fn test_slice_embed_round_trip() {
    let x = t(&[4, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let row = x.slice(0, 2).unwrap();
    assert_eq!(row.shape(), &[1, 2]);
    assert_eq!(row.to_vec(), vec![5.0, 6.0]);

    let back = row.embed_slice(&[4, 2], 0, 2).unwrap();
    assert_eq!(back.to_vec(), vec![0.0, 0.0, 0.0, 0.0, 5.0, 6.0, 0.0, 0.0]);
    assert!(row.embed_slice(&[4, 2], 1, 0).is_err());
}

#[test]
fn test_permute_axes() {
    let x = t(&[2, 3, 1], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let p = x.permute_axes(&[1, 0, 2]).unwrap();
    assert_eq!(p.shape(), &[3, 2, 1]);
    assert_eq!(p.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    assert_eq!(
        x.permute_axes(&[0, 0, 1]),
        Err(CoreError::DuplicateDimension { dim: 0 })
    );
}

#[test]
fn test_matmul_checks_inner_dimension() {
    let a = t(&[1, 2], &[1.0, 2.0]);
    let b = t(&[2, 2], &[3.0, 4.0, 5.0, 6.0]);
    assert_eq!(a.matmul(&b).unwrap().to_vec(), vec![13.0, 16.0]);
    assert!(b.matmul(&a).is_err());
}

#[test]
fn test_serde_round_trip_keeps_shape() {
    let x = t(&[2, 1, 2], &[0.5, -1.0, 2.0, 3.5]);
    let json = serde_json::to_string(&x).unwrap();
    let back: Tensor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, x);
    assert_eq!(back.shape(), &[2, 1, 2]);
}
