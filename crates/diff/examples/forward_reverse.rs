//! Forward and Reverse Differentiation on a Vertex Graph
//!
//! Run with: cargo run -p bayesgraph-diff --example forward_reverse
//!
//! This example demonstrates:
//! - Building a graph of parameters and operators
//! - Dual numbers from forward mode
//! - The same partials from reverse mode, shaped `output ++ vertex`
//! - Checking both against central differences

use bayesgraph_core::Tensor;
use bayesgraph_diff::{
    dual_number, gradient_check, reverse_mode, GradientCheckConfig, Graph, GraphError,
};

fn main() -> Result<(), GraphError> {
    env_logger::init();
    println!("=== Forward and Reverse Differentiation ===\n");

    // -------------------------------------------------------------------------
    // 1. Build: loss = sum_all(tanh(W x + b))
    // -------------------------------------------------------------------------
    println!("1. Graph: loss = sum_all(tanh(W x + b))");
    println!("---------------------------------------");

    let mut graph = Graph::new();
    let w = graph.parameter(&[2, 3]);
    let x = graph.parameter(&[3, 1]);
    let b = graph.parameter(&[2, 1]);
    let wx = graph.matmul(w, x)?;
    let pre = graph.add(wx, b)?;
    let act = graph.tanh(pre)?;
    let loss = graph.sum_all(act)?;
    graph.set_label(w, "W")?;

    graph.set_value(w, Tensor::matrix(2, 3, vec![0.1, -0.2, 0.3, 0.4, 0.5, -0.6])?)?;
    graph.set_value(x, Tensor::matrix(3, 1, vec![1.0, 2.0, 3.0])?)?;
    graph.set_value(b, Tensor::matrix(2, 1, vec![0.05, -0.05])?)?;
    println!("{} vertices, loss shape {:?}", graph.len(), graph.shape(loss)?);
    println!();

    // -------------------------------------------------------------------------
    // 2. Forward mode: one dual number carries value and partials
    // -------------------------------------------------------------------------
    println!("2. Forward mode");
    println!("---------------");
    let dual = dual_number(&graph, act, &[b])?;
    println!("tanh(W x + b) = {:?}", dual.value().to_vec());
    let d_act_d_b = dual.partials().with_respect_to(b).cloned().unwrap_or_else(|| Tensor::zeros(&[2, 1, 2, 1]));
    println!("d act / d b has shape {:?}", d_act_d_b.shape());
    println!();

    // -------------------------------------------------------------------------
    // 3. Reverse mode: gradient of the scalar loss
    // -------------------------------------------------------------------------
    println!("3. Reverse mode");
    println!("---------------");
    let grads = reverse_mode(&graph, loss, &[w, x, b])?;
    for (id, g) in grads.iter() {
        let name = graph.label(id).map(|l| l.to_string()).unwrap_or_else(|| id.to_string());
        println!("d loss / d {:<3} = {:?}", name, g.to_vec());
    }
    println!();

    // -------------------------------------------------------------------------
    // 4. Gradient check
    // -------------------------------------------------------------------------
    println!("4. Gradient check");
    println!("-----------------");
    match gradient_check(&graph, loss, &[w, x, b], &GradientCheckConfig::default()) {
        Ok(()) => println!("analytical and numerical gradients agree"),
        Err(e) => println!("gradient check failed: {}", e),
    }

    Ok(())
}
