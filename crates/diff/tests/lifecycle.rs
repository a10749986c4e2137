//! # Graph Lifecycle Tests
//!
//! Locking after read, detached copies, and evaluation of independent copies
//! on separate threads.

use std::thread;

use bayesgraph_core::Tensor;
use bayesgraph_diff::{
    dual_number, reverse_mode, Graph, GraphDescription, GraphError, VertexLabel,
};

/// loss = sum_all(x * x) + sum_all(x)
fn quadratic() -> (Graph, bayesgraph_diff::VertexId, bayesgraph_diff::VertexId) {
    let mut g = Graph::new();
    let x = g.parameter(&[2]);
    let xx = g.mul(x, x).unwrap();
    let s1 = g.sum_all(xx).unwrap();
    let s2 = g.sum_all(x).unwrap();
    let loss = g.add(s1, s2).unwrap();
    g.set_label(x, VertexLabel::new("x").in_namespace("quadratic")).unwrap();
    (g, x, loss)
}

#[test]
fn test_new_point_needs_fresh_copy() {
    let (mut g, x, loss) = quadratic();
    g.set_value(x, Tensor::vector(vec![1.0, 2.0])).unwrap();
    assert_eq!(g.value(loss).unwrap().as_scalar().unwrap(), 8.0);

    assert_eq!(
        g.set_value(x, Tensor::vector(vec![0.0, 0.0])),
        Err(GraphError::ValueLocked { id: x })
    );

    let fresh = g.detached_copy();
    assert!(!fresh.is_locked(x).unwrap());
    // the old point survives the copy until replaced
    assert_eq!(fresh.value(loss).unwrap().as_scalar().unwrap(), 8.0);

    let mut fresh = g.detached_copy();
    fresh.set_value(x, Tensor::vector(vec![0.0, -1.0])).unwrap();
    assert_eq!(fresh.value(loss).unwrap().as_scalar().unwrap(), 0.0);
}

#[test]
fn test_dual_number_carries_value() {
    let (mut g, x, loss) = quadratic();
    g.set_value(x, Tensor::vector(vec![1.0, -3.0])).unwrap();
    let dual = dual_number(&g, loss, &[x]).unwrap();
    assert_eq!(dual.value().as_scalar().unwrap(), 8.0);
    assert_eq!(
        dual.partials().with_respect_to(x).unwrap().to_vec(),
        vec![3.0, -5.0]
    );
}

#[test]
fn test_independent_copies_on_threads() {
    let (template, x, loss) = quadratic();

    let gradients: Vec<Vec<f64>> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let mut copy = template.detached_copy();
                s.spawn(move || {
                    copy.set_value(x, Tensor::vector(vec![i as f64, 1.0])).unwrap();
                    let grads = reverse_mode(&copy, loss, &[x]).unwrap();
                    grads.with_respect_to(x).unwrap().to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, g) in gradients.iter().enumerate() {
        assert_eq!(g, &vec![2.0 * i as f64 + 1.0, 3.0]);
    }
}

#[test]
fn test_description_json_round_trip() {
    let (mut g, x, _) = quadratic();
    g.set_value(x, Tensor::vector(vec![0.5, 1.5])).unwrap();

    let description = g.describe().unwrap();
    let json = description.to_json().unwrap();
    let parsed = GraphDescription::from_json(&json).unwrap();
    assert_eq!(parsed, description);

    let rebuilt = Graph::from_description(&parsed, |_| None).unwrap();
    assert_eq!(rebuilt.len(), g.len());
    let x2 = rebuilt.find_by_label("quadratic.x").unwrap();
    assert_eq!(rebuilt.value(x2).unwrap().to_vec(), vec![0.5, 1.5]);
    assert_eq!(rebuilt.describe().unwrap(), description);
}
