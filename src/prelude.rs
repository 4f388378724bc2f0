//! Shorthands for building expression trees in code and tests.
//!
//! ```
//! use ranking_expression::prelude::*;
//!
//! let node = op(num(2.0), "*", if_(compare(ident("x"), "<", num(1.0)), num(3.0), ident("x")));
//! assert_eq!(node.to_string(), "2.0 * if (x < 1.0, 3.0, x)");
//! ```
//!
//! The helpers which take operator symbols or function names panic when given
//! an unknown one.
use crate::ast::*;
use crate::operator::{ArithmeticOperator, Operator, TruthOperator};
use crate::tensor::Aggregator;
use crate::value::Value;

fn node(node: impl Into<ExpressionNode>) -> NodeRef {
    node.into().into_ref()
}

pub fn constant(value: impl Into<Value>) -> NodeRef {
    node(ConstantNode::new(value))
}

pub fn num(value: f64) -> NodeRef {
    constant(value)
}

pub fn boolean(value: bool) -> NodeRef {
    constant(value)
}

pub fn string(value: &str) -> NodeRef {
    constant(Value::Str(value.to_owned()))
}

pub fn name(name: &str) -> NodeRef {
    node(NameNode::new(name))
}

pub fn reference(reference: Reference) -> NodeRef {
    node(ReferenceNode::new(reference))
}

/// A reference to a bound name or feature without arguments.
pub fn ident(name: &str) -> NodeRef {
    reference(Reference::identifier(name))
}

/// A reference with arguments: a function call or a feature like `query(q)`.
pub fn call(name: &str, arguments: Vec<NodeRef>) -> NodeRef {
    reference(Reference::new(name, arguments, None))
}

/// Appends `operator right` to `left`, extending `left` if it is an operation
/// itself.
///
/// # Panics
///
/// If `symbol` is not a binary operator.
pub fn op(left: NodeRef, symbol: &str, right: NodeRef) -> NodeRef {
    let operator =
        Operator::from_symbol(symbol).unwrap_or_else(|| panic!("Unknown operator {symbol}"));
    node(OperationNode::resolve(left, operator, right))
}

/// Like [`op`], for the arithmetic operators only.
///
/// # Panics
///
/// If `symbol` is not an arithmetic operator.
pub fn arithmetic(left: NodeRef, symbol: &str, right: NodeRef) -> NodeRef {
    let operator = ArithmeticOperator::from_symbol(symbol)
        .unwrap_or_else(|| panic!("Unknown arithmetic operator {symbol}"));
    node(ArithmeticNode::resolve(left, operator, right))
}

/// # Panics
///
/// If `symbol` is not a comparison operator.
pub fn compare(left: NodeRef, symbol: &str, right: NodeRef) -> NodeRef {
    let operator = TruthOperator::from_symbol(symbol)
        .unwrap_or_else(|| panic!("Unknown comparison {symbol}"));
    node(ComparisonNode::new(left, operator, right))
}

pub fn is_in(value: NodeRef, set: Vec<NodeRef>) -> NodeRef {
    node(SetMembershipNode::new(value, set))
}

pub fn not(value: NodeRef) -> NodeRef {
    node(NotNode::new(value))
}

pub fn negative(value: NodeRef) -> NodeRef {
    node(NegativeNode::new(value))
}

pub fn embrace(value: NodeRef) -> NodeRef {
    node(EmbracedNode::new(value))
}

pub fn if_(condition: NodeRef, true_expression: NodeRef, false_expression: NodeRef) -> NodeRef {
    node(IfNode::new(condition, true_expression, false_expression))
}

/// # Panics
///
/// If there are no cases.
pub fn switch(argument: NodeRef, cases: Vec<(NodeRef, NodeRef)>, default: NodeRef) -> NodeRef {
    let (values, results) = cases.into_iter().unzip();
    node(
        SwitchNode::new(argument, values, results, default)
            .unwrap_or_else(|error| panic!("{error}")),
    )
}

/// A call of a built-in scalar function.
///
/// # Panics
///
/// If there is no such function, or it takes a different number of arguments.
pub fn func(name: &str, arguments: Vec<NodeRef>) -> NodeRef {
    let function = Function::from_name(name).unwrap_or_else(|| panic!("Unknown function {name}"));
    node(FunctionNode::new(function, arguments).unwrap_or_else(|error| panic!("{error}")))
}

pub fn lambda<const N: usize>(arguments: [&str; N], body: NodeRef) -> LambdaFunctionNode {
    LambdaFunctionNode::new(arguments, body)
}

/// # Panics
///
/// If the lambda does not take exactly one argument.
pub fn map(argument: NodeRef, function: LambdaFunctionNode) -> NodeRef {
    node(MapNode::new(argument, function).unwrap_or_else(|error| panic!("{error}")))
}

/// # Panics
///
/// If the lambda does not take exactly two arguments.
pub fn join(left: NodeRef, right: NodeRef, function: LambdaFunctionNode) -> NodeRef {
    node(JoinNode::new(left, right, function).unwrap_or_else(|error| panic!("{error}")))
}

pub fn reduce<S: Into<String>>(
    argument: NodeRef,
    aggregator: Aggregator,
    dimensions: impl IntoIterator<Item = S>,
) -> NodeRef {
    node(ReduceNode::new(argument, aggregator, dimensions))
}

pub fn sum(argument: NodeRef, dimension: Option<&str>) -> NodeRef {
    node(SumNode::new(argument, dimension.map(str::to_owned)))
}
