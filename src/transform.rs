//! Rewriting of expression trees.
use std::sync::Arc;

use crate::ast::{ConstantNode, ExpressionNode, NodeRef};
use crate::context::MapContext;
use crate::value::Value;
use crate::Error;

/// A rewrite of expression trees. Implementations decide per node what to
/// produce, and typically call [`ExpressionTransformer::transform_children`]
/// to recurse.
pub trait ExpressionTransformer {
    fn transform(&mut self, node: &NodeRef) -> Result<NodeRef, Error>;

    /// Transforms the children of `node`, rebuilding it only if some child changed.
    /// Unchanged subtrees are shared with the input.
    fn transform_children(&mut self, node: &NodeRef) -> Result<NodeRef, Error> {
        let children = node.children();
        let mut transformed = Vec::with_capacity(children.len());
        let mut changed = false;
        for child in &children {
            let result = self.transform(child)?;
            changed |= !Arc::ptr_eq(&result, child);
            transformed.push(result);
        }
        if !changed {
            return Ok(node.clone());
        }
        Ok(node.with_children(transformed)?.into_ref())
    }
}

/// Folds constant subexpressions, bottom up.
#[derive(Debug, Default)]
pub struct Simplifier {
    rewrites: usize,
}

impl Simplifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of nodes rewritten so far.
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    fn simplify(&self, node: &NodeRef) -> Option<NodeRef> {
        match node.as_ref() {
            ExpressionNode::If(branch) => {
                let condition = scalar_constant(branch.condition())?.as_boolean().ok()?;
                Some(if condition {
                    branch.true_expression().clone()
                } else {
                    branch.false_expression().clone()
                })
            }
            ExpressionNode::Operation(chain) if all_scalar_constants(chain.children()) => {
                fold(node)
            }
            ExpressionNode::Arithmetic(chain) if all_scalar_constants(chain.children()) => {
                fold(node)
            }
            ExpressionNode::Negative(negative) => {
                let value = scalar_constant(negative.value())?.negate().ok()?;
                Some(ExpressionNode::from(ConstantNode::new(value)).into_ref())
            }
            ExpressionNode::Embraced(embraced) => match embraced.value().as_ref() {
                ExpressionNode::Constant(_) | ExpressionNode::Reference(_) => {
                    Some(embraced.value().clone())
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl ExpressionTransformer for Simplifier {
    fn transform(&mut self, node: &NodeRef) -> Result<NodeRef, Error> {
        let node = self.transform_children(node)?;
        match self.simplify(&node) {
            Some(simplified) => {
                log::trace!("Simplified {node} to {simplified}");
                self.rewrites += 1;
                Ok(simplified)
            }
            None => Ok(node),
        }
    }
}

/// The value of a double or boolean constant.
fn scalar_constant(node: &NodeRef) -> Option<&Value> {
    match node.as_ref() {
        ExpressionNode::Constant(constant) => match constant.value() {
            value @ (Value::Double(_) | Value::Boolean(_)) => Some(value),
            _ => None,
        },
        _ => None,
    }
}

fn all_scalar_constants(nodes: &[NodeRef]) -> bool {
    nodes.iter().all(|node| scalar_constant(node).is_some())
}

/// Evaluates a node over constants only. Failures leave the node as it is.
fn fold(node: &NodeRef) -> Option<NodeRef> {
    match node.evaluate(&MapContext::new()) {
        Ok(value @ (Value::Double(_) | Value::Boolean(_))) => {
            Some(ExpressionNode::from(ConstantNode::new(value)).into_ref())
        }
        Ok(_) => None,
        Err(error) => {
            log::trace!("Not folding {node}: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn simplify(node: &NodeRef) -> NodeRef {
        Simplifier::new().transform(node).unwrap()
    }

    #[test]
    fn folds_constant_chains() {
        let node = op(num(2.0), "+", op(num(3.0), "*", num(4.0)));
        assert_eq!(simplify(&node).to_string(), "14.0");
        let partial = op(ident("x"), "*", embrace(op(num(1.0), "+", num(1.0))));
        assert_eq!(simplify(&partial).to_string(), "x * 2.0");
        let comparison = op(num(1.0), "<", num(2.0));
        assert_eq!(simplify(&comparison).to_string(), "true");
    }

    #[test]
    fn collapses_constant_conditions() {
        let node = if_(op(num(1.0), ">", num(2.0)), ident("a"), ident("b"));
        assert_eq!(simplify(&node).to_string(), "b");
        let open = if_(compare(ident("x"), ">", num(2.0)), ident("a"), negative(num(3.0)));
        assert_eq!(simplify(&open).to_string(), "if (x > 2.0, a, -3.0)");
    }

    #[test]
    fn drops_parentheses_around_leaves() {
        let node = op(embrace(ident("x")), "+", embrace(num(1.0)));
        assert_eq!(simplify(&node).to_string(), "x + 1.0");
    }

    #[test]
    fn unchanged_trees_are_shared() {
        let node = op(ident("x"), "*", call("f", vec![ident("y")]));
        let mut simplifier = Simplifier::new();
        let result = simplifier.transform(&node).unwrap();
        assert!(Arc::ptr_eq(&node, &result));
        assert_eq!(simplifier.rewrites(), 0);
    }

    #[test]
    fn strings_are_not_folded() {
        let node = op(string("a"), "+", num(1.0));
        assert_eq!(simplify(&node).to_string(), node.to_string());
    }
}
