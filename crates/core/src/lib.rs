//! # Core - Tensors, Shapes and Schemas
//!
//! The foundation every other bayesgraph crate builds on:
//!
//! - **Tensors**: dense `f64` arrays with broadcasting element-wise operations,
//!   reductions that keep their rank, slicing and reshaping
//! - **Shapes**: static shape algebra used at graph-construction time
//! - **Errors**: construction-time contract violations
//! - **Schemas**: the declarative constructor signature of every vertex kind
//!
//! ## Design Philosophy
//!
//! Shapes are decided when a graph is wired, never when it runs. Every
//! function in [`shape`] answers "what would this produce?" without touching
//! a value, so an incompatible graph fails while it is being built.

pub mod error;
pub mod schema;
pub mod shape;
pub mod tensor;

// Re-export key types at crate root for convenience
pub use error::CoreError;
pub use schema::{OpSchema, ParamDescriptor, ParamKind};
pub use shape::Shape;
pub use tensor::Tensor;
