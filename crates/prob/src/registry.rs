//! Distribution lookup by name, used to rebuild graphs from descriptions.

use std::sync::Arc;

use bayesgraph_core::schema;
use bayesgraph_diff::{Distribution, Graph, GraphDescription};
use log::debug;

use crate::continuous::{Exponential, Pareto, Uniform};
use crate::discrete::{Bernoulli, Poisson};
use crate::error::ProbError;
use crate::gaussian::Gaussian;

/// Every name [`distribution_by_name`] resolves.
pub const DISTRIBUTION_NAMES: &[&str] = &[
    "Gaussian",
    "Uniform",
    "Exponential",
    "Pareto",
    "Bernoulli",
    "Poisson",
];

/// The built-in distribution registered under `name`.
pub fn distribution_by_name(name: &str) -> Option<Arc<dyn Distribution>> {
    let dist: Arc<dyn Distribution> = match name {
        "Gaussian" => Arc::new(Gaussian),
        "Uniform" => Arc::new(Uniform),
        "Exponential" => Arc::new(Exponential),
        "Pareto" => Arc::new(Pareto),
        "Bernoulli" => Arc::new(Bernoulli),
        "Poisson" => Arc::new(Poisson),
        _ => return None,
    };
    Some(dist)
}

/// Like [`distribution_by_name`], failing on unknown names.
pub fn lookup(name: &str) -> Result<Arc<dyn Distribution>, ProbError> {
    distribution_by_name(name).ok_or_else(|| ProbError::UnknownDistribution(name.to_string()))
}

/// Rebuild a graph whose probabilistic vertices use built-in distributions.
///
/// A kind that is neither a leaf, an operator nor a registered distribution
/// fails with [`ProbError::UnknownDistribution`].
pub fn graph_from_description(description: &GraphDescription) -> Result<Graph, ProbError> {
    for vertex in &description.vertices {
        let kind = vertex.kind.as_str();
        let known = matches!(kind, "Constant" | "Parameter" | "Placeholder") || schema::lookup(kind).is_some();
        if !known {
            lookup(kind)?;
        }
    }
    let graph = Graph::from_description(description, distribution_by_name)?;
    debug!("rebuilt graph with {} vertices from description", graph.len());
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_resolves_to_itself() {
        for &name in DISTRIBUTION_NAMES {
            let dist = distribution_by_name(name).unwrap();
            assert_eq!(dist.name(), name);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(distribution_by_name("Cauchy").is_none());
        assert_eq!(
            lookup("Cauchy").unwrap_err(),
            ProbError::UnknownDistribution("Cauchy".to_string())
        );
    }
}
