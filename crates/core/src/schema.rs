//! # Operator Schemas
//!
//! Every vertex kind declares, in a static table, the ordered parameters its
//! constructor takes and whether each one is itself a vertex or a plain
//! value. Description export, generic save/load and binding generators read
//! this table instead of inspecting vertices one kind at a time.
//!
//! Vertex parameters appear in the same order as the vertex's parents.

use serde::{Deserialize, Serialize};

/// What a constructor parameter holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Another vertex in the same graph (a parent).
    Vertex,
    /// A plain `f64`.
    Scalar,
    /// A list of dimension indices.
    Dims,
    /// A single dimension or element index.
    Index,
    /// A full shape.
    Shape,
    /// A literal tensor.
    Tensor,
}

/// One named constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamDescriptor {
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        Self { name, kind }
    }

    pub const fn vertex(name: &'static str) -> Self {
        Self::new(name, ParamKind::Vertex)
    }
}

/// The declared constructor signature of one vertex kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpSchema {
    pub name: &'static str,
    pub params: &'static [ParamDescriptor],
}

impl OpSchema {
    pub const fn new(name: &'static str, params: &'static [ParamDescriptor]) -> Self {
        Self { name, params }
    }

    /// Parameters that are parent vertices, in parent order.
    pub fn vertex_params(&self) -> impl Iterator<Item = &'static ParamDescriptor> {
        self.params.iter().filter(|p| p.kind == ParamKind::Vertex)
    }

    /// Parameters that are plain values.
    pub fn value_params(&self) -> impl Iterator<Item = &'static ParamDescriptor> {
        self.params.iter().filter(|p| p.kind != ParamKind::Vertex)
    }

    /// Number of parent vertices a vertex of this kind has.
    pub fn arity(&self) -> usize {
        self.vertex_params().count()
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }
}

const UNARY: &[ParamDescriptor] = &[ParamDescriptor::vertex("input")];
const BINARY: &[ParamDescriptor] = &[
    ParamDescriptor::vertex("left"),
    ParamDescriptor::vertex("right"),
];

pub const CONSTANT: OpSchema = OpSchema::new(
    "Constant",
    &[ParamDescriptor::new("value", ParamKind::Tensor)],
);
pub const PARAMETER: OpSchema = OpSchema::new(
    "Parameter",
    &[ParamDescriptor::new("shape", ParamKind::Shape)],
);
pub const PLACEHOLDER: OpSchema = OpSchema::new(
    "Placeholder",
    &[ParamDescriptor::new("shape", ParamKind::Shape)],
);

pub const ADD: OpSchema = OpSchema::new("Add", BINARY);
pub const SUB: OpSchema = OpSchema::new("Sub", BINARY);
pub const MUL: OpSchema = OpSchema::new("Mul", BINARY);
pub const DIV: OpSchema = OpSchema::new("Div", BINARY);
pub const POW: OpSchema = OpSchema::new(
    "Pow",
    &[
        ParamDescriptor::vertex("base"),
        ParamDescriptor::vertex("exponent"),
    ],
);
pub const MATMUL: OpSchema = OpSchema::new("MatMul", BINARY);

pub const NEG: OpSchema = OpSchema::new("Neg", UNARY);
pub const EXP: OpSchema = OpSchema::new("Exp", UNARY);
pub const LOG: OpSchema = OpSchema::new("Log", UNARY);
pub const SQRT: OpSchema = OpSchema::new("Sqrt", UNARY);
pub const SIN: OpSchema = OpSchema::new("Sin", UNARY);
pub const COS: OpSchema = OpSchema::new("Cos", UNARY);
pub const TANH: OpSchema = OpSchema::new("Tanh", UNARY);
pub const ABS: OpSchema = OpSchema::new("Abs", UNARY);
pub const TRANSPOSE: OpSchema = OpSchema::new("Transpose", UNARY);
pub const SUM_ALL: OpSchema = OpSchema::new("SumAll", UNARY);

pub const SUM: OpSchema = OpSchema::new(
    "Sum",
    &[
        ParamDescriptor::vertex("input"),
        ParamDescriptor::new("dims", ParamKind::Dims),
    ],
);
pub const SLICE: OpSchema = OpSchema::new(
    "Slice",
    &[
        ParamDescriptor::vertex("input"),
        ParamDescriptor::new("dim", ParamKind::Index),
        ParamDescriptor::new("index", ParamKind::Index),
    ],
);
pub const RESHAPE: OpSchema = OpSchema::new(
    "Reshape",
    &[
        ParamDescriptor::vertex("input"),
        ParamDescriptor::new("shape", ParamKind::Shape),
    ],
);

pub const GREATER_THAN_MASK: OpSchema = OpSchema::new("GreaterThanMask", BINARY);
pub const LESS_THAN_OR_EQUAL_MASK: OpSchema = OpSchema::new("LessThanOrEqualMask", BINARY);
pub const SET_WITH_MASK: OpSchema = OpSchema::new(
    "SetWithMask",
    &[
        ParamDescriptor::vertex("operand"),
        ParamDescriptor::vertex("mask"),
        ParamDescriptor::new("value", ParamKind::Scalar),
    ],
);
pub const WHERE: OpSchema = OpSchema::new(
    "Where",
    &[
        ParamDescriptor::vertex("predicate"),
        ParamDescriptor::vertex("then"),
        ParamDescriptor::vertex("else"),
    ],
);

/// Every deterministic vertex kind, leaves first.
pub static SCHEMAS: &[OpSchema] = &[
    CONSTANT,
    PARAMETER,
    PLACEHOLDER,
    ADD,
    SUB,
    MUL,
    DIV,
    POW,
    MATMUL,
    NEG,
    EXP,
    LOG,
    SQRT,
    SIN,
    COS,
    TANH,
    ABS,
    TRANSPOSE,
    SUM_ALL,
    SUM,
    SLICE,
    RESHAPE,
    GREATER_THAN_MASK,
    LESS_THAN_OR_EQUAL_MASK,
    SET_WITH_MASK,
    WHERE,
];

/// Find a schema by kind name.
pub fn lookup(name: &str) -> Option<&'static OpSchema> {
    SCHEMAS.iter().find(|s| s.name == name)
}
