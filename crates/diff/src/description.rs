//! # Graph Descriptions
//!
//! A [`GraphDescription`] lists every vertex with its kind name and its
//! constructor parameters, named and ordered as in the kind's
//! [`OpSchema`](bayesgraph_core::OpSchema). Parents appear as
//! [`ParamValue::Vertex`] indices into the same description.
//!
//! Descriptions serialize with serde, so they can be written as JSON and
//! rebuilt with [`Graph::from_description`]. Distributions are resolved by
//! name through a caller-supplied lookup.
//!
//! JSON has no encoding for non-finite numbers: graphs holding `inf` or
//! `NaN` constants describe fine but do not survive a JSON round trip.

use std::collections::HashMap;
use std::sync::Arc;

use bayesgraph_core::schema::{self, ParamKind};
use bayesgraph_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::ops::Op;
use crate::vertex::{VertexId, VertexKind, VertexLabel};

/// Value of one constructor parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    /// Index of another vertex in the same description.
    Vertex(usize),
    Scalar(f64),
    Dims(Vec<usize>),
    Index(usize),
    Shape(Vec<usize>),
    Tensor(Tensor),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Vertex(_) => ParamKind::Vertex,
            ParamValue::Scalar(_) => ParamKind::Scalar,
            ParamValue::Dims(_) => ParamKind::Dims,
            ParamValue::Index(_) => ParamKind::Index,
            ParamValue::Shape(_) => ParamKind::Shape,
            ParamValue::Tensor(_) => ParamKind::Tensor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParam {
    pub name: String,
    pub value: ParamValue,
}

impl NamedParam {
    fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// One vertex, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexDescription {
    pub id: usize,
    /// Schema name for deterministic vertices, distribution name otherwise.
    pub kind: String,
    pub shape: Vec<usize>,
    pub params: Vec<NamedParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<VertexLabel>,
    /// Assigned value of a parameter, placeholder or probabilistic vertex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Tensor>,
    #[serde(default)]
    pub observed: bool,
}

impl VertexDescription {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Parent indices in the order the parameters are listed.
    pub fn parents(&self) -> Vec<usize> {
        self.params
            .iter()
            .filter_map(|p| match p.value {
                ParamValue::Vertex(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Parameters must be exactly `expected`, each named once, in any order.
    fn check_param_names(&self, expected: &[&str]) -> Result<(), GraphError> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.params.len());
        for p in &self.params {
            if !expected.contains(&p.name.as_str()) {
                return Err(self.invalid(format!("unknown parameter '{}'", p.name)));
            }
            if seen.contains(&p.name.as_str()) {
                return Err(self.invalid(format!("duplicate parameter '{}'", p.name)));
            }
            seen.push(&p.name);
        }
        match expected.iter().find(|name| !seen.contains(*name)) {
            Some(name) => Err(self.invalid(format!("missing parameter '{}'", name))),
            None => Ok(()),
        }
    }

    fn invalid(&self, reason: String) -> GraphError {
        GraphError::Description {
            reason: format!("{} vertex {}: {}", self.kind, self.id, reason),
        }
    }

    fn vertex_index(&self, name: &str) -> Result<usize, GraphError> {
        match self.required(name)? {
            ParamValue::Vertex(i) => Ok(*i),
            other => Err(self.wrong_kind(name, other)),
        }
    }

    fn required(&self, name: &str) -> Result<&ParamValue, GraphError> {
        self.param(name).ok_or_else(|| GraphError::Description {
            reason: format!("{} vertex {} is missing parameter '{}'", self.kind, self.id, name),
        })
    }

    fn index(&self, name: &str) -> Result<usize, GraphError> {
        match self.required(name)? {
            ParamValue::Index(i) => Ok(*i),
            other => Err(self.wrong_kind(name, other)),
        }
    }

    fn dims(&self, name: &str) -> Result<Vec<usize>, GraphError> {
        match self.required(name)? {
            ParamValue::Dims(d) | ParamValue::Shape(d) => Ok(d.clone()),
            other => Err(self.wrong_kind(name, other)),
        }
    }

    fn scalar(&self, name: &str) -> Result<f64, GraphError> {
        match self.required(name)? {
            ParamValue::Scalar(v) => Ok(*v),
            other => Err(self.wrong_kind(name, other)),
        }
    }

    fn wrong_kind(&self, name: &str, value: &ParamValue) -> GraphError {
        GraphError::Description {
            reason: format!(
                "parameter '{}' of vertex {} holds {:?}",
                name,
                self.id,
                value.kind()
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub vertices: Vec<VertexDescription>,
}

impl GraphDescription {
    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Description {
            reason: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Description {
            reason: e.to_string(),
        })
    }
}

/// Plain-value parameters of an operator, in schema order.
fn op_value_params(op: &Op) -> Vec<NamedParam> {
    match op {
        Op::Sum { dims } => vec![NamedParam::new("dims", ParamValue::Dims(dims.clone()))],
        Op::Slice { dim, index } => vec![
            NamedParam::new("dim", ParamValue::Index(*dim)),
            NamedParam::new("index", ParamValue::Index(*index)),
        ],
        Op::Reshape { shape } => vec![NamedParam::new("shape", ParamValue::Shape(shape.clone()))],
        Op::SetWithMask { value } => vec![NamedParam::new("value", ParamValue::Scalar(*value))],
        _ => vec![],
    }
}

/// Parent vertices named by `names`, in that order.
fn resolve_parents<'a>(
    vd: &VertexDescription,
    names: impl Iterator<Item = &'a str>,
    ids: &HashMap<usize, VertexId>,
) -> Result<Vec<VertexId>, GraphError> {
    names
        .map(|name| {
            let i = vd.vertex_index(name)?;
            ids.get(&i).copied().ok_or_else(|| GraphError::Description {
                reason: format!("vertex {} refers to unknown vertex {}", vd.id, i),
            })
        })
        .collect()
}

/// Rebuild an operator from its schema name and parameters.
fn op_from_description(vd: &VertexDescription) -> Result<Op, GraphError> {
    let op = match vd.kind.as_str() {
        "Add" => Op::Add,
        "Sub" => Op::Sub,
        "Mul" => Op::Mul,
        "Div" => Op::Div,
        "Pow" => Op::Pow,
        "MatMul" => Op::MatMul,
        "Neg" => Op::Neg,
        "Exp" => Op::Exp,
        "Log" => Op::Log,
        "Sqrt" => Op::Sqrt,
        "Sin" => Op::Sin,
        "Cos" => Op::Cos,
        "Tanh" => Op::Tanh,
        "Abs" => Op::Abs,
        "Transpose" => Op::Transpose,
        "SumAll" => Op::SumAll,
        "GreaterThanMask" => Op::GreaterThanMask,
        "LessThanOrEqualMask" => Op::LessThanOrEqualMask,
        "Where" => Op::Where,
        "Sum" => Op::Sum {
            dims: vd.dims("dims")?,
        },
        "Slice" => Op::Slice {
            dim: vd.index("dim")?,
            index: vd.index("index")?,
        },
        "Reshape" => Op::Reshape {
            shape: vd.dims("shape")?,
        },
        "SetWithMask" => Op::SetWithMask {
            value: vd.scalar("value")?,
        },
        other => {
            return Err(GraphError::Description {
                reason: format!("unknown vertex kind '{}'", other),
            })
        }
    };
    Ok(op)
}

impl Graph {
    /// Describe every vertex, parents before children.
    pub fn describe(&self) -> Result<GraphDescription, GraphError> {
        let mut vertices = Vec::with_capacity(self.len());
        for id in self.vertex_ids() {
            let vertex = self.vertex(id)?;
            let parents: Vec<ParamValue> = vertex
                .parents()
                .iter()
                .map(|p| ParamValue::Vertex(p.index()))
                .collect();
            let current = vertex.value.borrow().clone();

            let (params, value) = match vertex.kind() {
                VertexKind::Constant => {
                    let value = current.ok_or(GraphError::Unassigned { id })?;
                    (vec![NamedParam::new("value", ParamValue::Tensor(value))], None)
                }
                VertexKind::Parameter | VertexKind::Placeholder => (
                    vec![NamedParam::new("shape", ParamValue::Shape(vertex.shape().to_vec()))],
                    current,
                ),
                VertexKind::Op(op) => {
                    let mut params: Vec<NamedParam> = op
                        .schema()
                        .vertex_params()
                        .zip(parents)
                        .map(|(d, p)| NamedParam::new(d.name, p))
                        .collect();
                    params.extend(op_value_params(op));
                    (params, None)
                }
                VertexKind::Probabilistic(dist) => {
                    let mut params: Vec<NamedParam> = dist
                        .param_names()
                        .iter()
                        .zip(parents)
                        .map(|(name, p)| NamedParam::new(name, p))
                        .collect();
                    params.push(NamedParam::new("shape", ParamValue::Shape(vertex.shape().to_vec())));
                    (params, current)
                }
            };

            vertices.push(VertexDescription {
                id: id.index(),
                kind: vertex.kind().name().to_string(),
                shape: vertex.shape().to_vec(),
                params,
                label: vertex.label().cloned(),
                value,
                observed: vertex.is_observed(),
            });
        }
        Ok(GraphDescription { vertices })
    }

    /// Rebuild a graph from its description.
    ///
    /// Kinds that are not deterministic schemas are looked up with
    /// `distributions`. Shapes are re-derived and checked against the
    /// recorded ones.
    pub fn from_description<F>(description: &GraphDescription, distributions: F) -> Result<Graph, GraphError>
    where
        F: Fn(&str) -> Option<Arc<dyn Distribution>>,
    {
        let mut graph = Graph::new();
        let mut ids: HashMap<usize, VertexId> = HashMap::new();

        for vd in &description.vertices {
            let id = match vd.kind.as_str() {
                "Constant" => {
                    vd.check_param_names(&["value"])?;
                    match vd.required("value")? {
                        ParamValue::Tensor(t) => graph.constant(t.clone()),
                        other => return Err(vd.wrong_kind("value", other)),
                    }
                }
                "Parameter" => {
                    vd.check_param_names(&["shape"])?;
                    graph.parameter(&vd.dims("shape")?)
                }
                "Placeholder" => {
                    vd.check_param_names(&["shape"])?;
                    graph.placeholder(&vd.dims("shape")?)
                }
                kind => match schema::lookup(kind) {
                    Some(op_schema) => {
                        let names: Vec<&str> = op_schema.params.iter().map(|p| p.name).collect();
                        vd.check_param_names(&names)?;
                        let parents = resolve_parents(vd, op_schema.vertex_params().map(|p| p.name), &ids)?;
                        graph.op(op_from_description(vd)?, &parents)?
                    }
                    None => {
                        let dist = distributions(kind).ok_or_else(|| GraphError::Description {
                            reason: format!("unknown vertex kind '{}'", kind),
                        })?;
                        let mut names = dist.param_names().to_vec();
                        names.push("shape");
                        vd.check_param_names(&names)?;
                        let parents = resolve_parents(vd, dist.param_names().iter().copied(), &ids)?;
                        graph.probabilistic(dist, &vd.dims("shape")?, &parents)?
                    }
                },
            };

            if graph.shape(id)? != vd.shape.as_slice() {
                return Err(GraphError::Description {
                    reason: format!(
                        "vertex {} rebuilt with shape {:?}, recorded {:?}",
                        vd.id,
                        graph.shape(id)?,
                        vd.shape
                    ),
                });
            }
            if let Some(label) = &vd.label {
                graph.set_label(id, label.clone())?;
            }
            if let Some(value) = &vd.value {
                if vd.observed {
                    graph.observe(id, value.clone())?;
                } else {
                    graph.set_value(id, value.clone())?;
                }
            }
            ids.insert(vd.id, id);
        }
        Ok(graph)
    }
}
