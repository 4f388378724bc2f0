//! # ranking-expression
//! An engine for ranking expressions: immutable expression trees over scalars
//! and tensors, which can be
//! - evaluated against a context supplying the values of references,
//! - type checked, inferring the tensor type of every subexpression,
//! - serialized to canonical text, inlining calls of user defined functions
//!   as separately named instances.
//!
//! Expressions are built directly from nodes (see [`prelude`] for shorthands);
//! parsing the text form is left to the embedding application.
//!
//! ```
//! use ranking_expression::prelude::*;
//! use ranking_expression::{
//!     ExpressionFunction, MapContext, RankingExpression, SerializationContext, Value,
//! };
//!
//! let square = ExpressionFunction::new("square_it", ["x"], op(ident("x"), "*", ident("x")));
//! let score = op(call("square_it", vec![ident("a")]), "+", num(1.0));
//! let expression = RankingExpression::new("score", score);
//!
//! let context = MapContext::new().with("a", 3.0).with_function(square.clone());
//! assert_eq!(expression.evaluate(&context).unwrap(), Value::Double(10.0));
//!
//! let session = SerializationContext::new([square]);
//! let properties = expression.rank_properties(&session).unwrap();
//! assert_eq!(properties.len(), 2);
//! ```
pub mod ast;
pub mod context;
mod expression;
pub mod operator;
pub mod prelude;
pub mod serialize;
pub mod tensor;
pub mod transform;
pub mod typechecking;
pub mod util;
mod value;

use thiserror::Error;

pub use ast::{ExpressionNode, NodeRef, Reference};
pub use context::{EvaluationContext, MapContext, ScopedContext};
pub use expression::RankingExpression;
pub use serialize::{ExpressionFunction, Instance, SerializationContext};
pub use tensor::{Aggregator, CellType, Tensor, TensorType};
pub use transform::{ExpressionTransformer, Simplifier};
pub use typechecking::{BoundTypeContext, MapTypeContext, TypeContext, TypeError};
pub use value::*;

use util::ListDisplay;

#[derive(Debug, Clone, Error)]
#[error("Not found: {0}")]
pub struct NotFoundError(String);

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    NotFoundError(#[from] NotFoundError),
    #[error(transparent)]
    TypeError(#[from] TypeError),
    #[error("{kind} expects {expected} arguments, but got {actual}")]
    Arity {
        kind: &'static str,
        expected: String,
        actual: usize,
    },
    #[error("Invocation loop: {}", ListDisplay(.path, " -> "))]
    Cycle { path: Vec<String> },
    #[error("{0}")]
    Argument(String),
    #[error("{operation} is not supported for '{node}'")]
    Unsupported { operation: &'static str, node: String },
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

#[cfg(test)]
mod tests;
