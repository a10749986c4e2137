//! # Distribution Tests
//!
//! Every distribution's graph form must agree with its direct log-density,
//! its hand-derived gradient and central differences, and must stay free of
//! `NaN` in invalid regions.

use std::sync::Arc;

use bayesgraph_core::Tensor;
use bayesgraph_diff::{gradient_check, Distribution, Graph, GradientCheckConfig, LogProbGraph, VertexId};
use bayesgraph_prob::{Bernoulli, Exponential, Gaussian, Pareto, Uniform};
use rstest::rstest;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A graph with one parameter vertex per distribution parameter and a
/// probabilistic vertex holding `value`. Returns `(graph, vertex, params)`.
fn single(dist: Arc<dyn Distribution>, params: Vec<Tensor>, value: Tensor) -> (Graph, VertexId, Vec<VertexId>) {
    let mut g = Graph::new();
    let ids: Vec<VertexId> = params
        .iter()
        .map(|p| g.parameter(p.shape()))
        .collect();
    let v = g.probabilistic(dist, value.shape(), &ids).unwrap();
    for (&id, p) in ids.iter().zip(params) {
        g.set_value(id, p).unwrap();
    }
    g.set_value(v, value).unwrap();
    (g, v, ids)
}

fn gaussian() -> (Graph, VertexId, Vec<VertexId>) {
    single(
        Arc::new(Gaussian),
        vec![Tensor::scalar(0.5), Tensor::vector(vec![1.0, 2.0, 0.5])],
        Tensor::vector(vec![0.2, -1.0, 1.5]),
    )
}

fn uniform() -> (Graph, VertexId, Vec<VertexId>) {
    single(
        Arc::new(Uniform),
        vec![Tensor::scalar(-1.0), Tensor::scalar(2.0)],
        Tensor::vector(vec![0.0, 1.5, -0.5]),
    )
}

fn exponential() -> (Graph, VertexId, Vec<VertexId>) {
    single(
        Arc::new(Exponential),
        vec![Tensor::vector(vec![0.5, 1.0, 2.0])],
        Tensor::vector(vec![0.1, 2.0, 0.7]),
    )
}

fn pareto() -> (Graph, VertexId, Vec<VertexId>) {
    single(
        Arc::new(Pareto),
        vec![Tensor::scalar(1.0), Tensor::scalar(2.5)],
        Tensor::vector(vec![1.5, 3.0, 10.0]),
    )
}

fn bernoulli() -> (Graph, VertexId, Vec<VertexId>) {
    single(
        Arc::new(Bernoulli),
        vec![Tensor::vector(vec![0.2, 0.7, 0.5])],
        Tensor::vector(vec![1.0, 0.0, 1.0]),
    )
}

fn or_zeros(t: Option<&Tensor>, shape: &[usize]) -> Tensor {
    t.cloned().unwrap_or_else(|| Tensor::zeros(shape))
}

#[rstest]
#[case::gaussian(gaussian())]
#[case::uniform(uniform())]
#[case::exponential(exponential())]
#[case::pareto(pareto())]
#[case::bernoulli(bernoulli())]
fn test_graph_form_matches_direct_density(#[case] model: (Graph, VertexId, Vec<VertexId>)) {
    init();
    let (g, v, _) = model;
    let lpg = LogProbGraph::build(&g, v).unwrap();
    let from_graph = lpg.log_prob_elementwise(&g).unwrap();
    let direct = g.log_prob_elementwise(v).unwrap();
    assert!(from_graph.all_close(&direct, 1e-12), "{:?} vs {:?}", from_graph, direct);
}

#[rstest]
#[case::gaussian(gaussian())]
#[case::uniform(uniform())]
#[case::exponential(exponential())]
#[case::pareto(pareto())]
#[case::bernoulli(bernoulli())]
fn test_graph_gradient_matches_hand_derived(#[case] model: (Graph, VertexId, Vec<VertexId>)) {
    init();
    let (g, v, params) = model;
    let lpg = LogProbGraph::build(&g, v).unwrap();
    let eval = lpg.evaluate(&g).unwrap();
    assert!((eval.log_prob - g.log_prob(v).unwrap()).abs() < 1e-12);

    let mut all = vec![v];
    all.extend(&params);
    let hand = g.d_log_prob(v, &all).unwrap();
    for id in all {
        let shape = g.shape(id).unwrap();
        let auto = or_zeros(eval.gradient.with_respect_to(id), shape);
        let derived = or_zeros(hand.get(&id), shape);
        assert!(auto.all_close(&derived, 1e-10), "{}: graph {:?} hand {:?}", id, auto, derived);
    }
}

#[rstest]
#[case::gaussian(gaussian())]
#[case::uniform(uniform())]
#[case::exponential(exponential())]
#[case::pareto(pareto())]
#[case::bernoulli(bernoulli())]
fn test_parameter_gradients_match_central_differences(#[case] model: (Graph, VertexId, Vec<VertexId>)) {
    let (g, v, params) = model;
    let lpg = LogProbGraph::build(&g, v).unwrap();
    let bound = lpg.bind(&g).unwrap();
    let placeholders: Vec<VertexId> = params
        .iter()
        .map(|&p| lpg.placeholder_for(p).unwrap())
        .collect();
    gradient_check(&bound, lpg.output(), &placeholders, &GradientCheckConfig::default()).unwrap();
}

#[rstest]
#[case::gaussian(Arc::new(Gaussian), vec![Tensor::scalar(0.0), Tensor::scalar(-2.0)], 1.0)]
#[case::uniform(Arc::new(Uniform), vec![Tensor::scalar(3.0), Tensor::scalar(1.0)], 2.0)]
#[case::exponential(Arc::new(Exponential), vec![Tensor::scalar(-1.0)], 1.0)]
#[case::pareto(Arc::new(Pareto), vec![Tensor::scalar(1.0), Tensor::scalar(-0.5)], 2.0)]
#[case::bernoulli(Arc::new(Bernoulli), vec![Tensor::scalar(1.5)], 1.0)]
fn test_invalid_parameters_mask_to_minus_infinity(
    #[case] dist: Arc<dyn Distribution>,
    #[case] params: Vec<Tensor>,
    #[case] value: f64,
) {
    let (g, v, ids) = single(dist, params, Tensor::vector(vec![value, value]));
    assert_eq!(g.log_prob(v).unwrap(), f64::NEG_INFINITY);

    let eval = LogProbGraph::build(&g, v).unwrap().evaluate(&g).unwrap();
    assert_eq!(eval.log_prob, f64::NEG_INFINITY);
    for (id, gradient) in eval.gradient.iter() {
        assert!(!gradient.has_nan(), "NaN gradient for {}", id);
        assert!(gradient.to_vec().iter().all(|&x| x == 0.0));
    }
    for id in ids {
        let hand = g.d_log_prob(v, &[id]).unwrap();
        assert!(hand.values().all(|t| !t.has_nan()));
    }
}

#[test]
fn test_out_of_support_values_only_mask_their_elements() {
    let (g, v, _) = single(
        Arc::new(Exponential),
        vec![Tensor::scalar(2.0)],
        Tensor::vector(vec![-1.0, 1.0]),
    );
    let lp = g.log_prob_elementwise(v).unwrap().to_vec();
    assert_eq!(lp[0], f64::NEG_INFINITY);
    assert!((lp[1] - ((2.0f64).ln() - 2.0)).abs() < 1e-12);

    let eval = LogProbGraph::build(&g, v).unwrap().evaluate(&g).unwrap();
    assert_eq!(eval.gradient.with_respect_to(v).unwrap().to_vec(), vec![0.0, -2.0]);
}
