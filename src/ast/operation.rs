use crate::ast::{Enclosing, ExpressionNode, NodeRef};
use crate::context::EvaluationContext;
use crate::operator::{ArithmeticOperator, BinaryOperator, Operator};
use crate::serialize::SerializationContext;
use crate::tensor::TensorType;
use crate::typechecking::TypeContext;
use crate::value::Value;
use crate::Error;

/// A flat chain of `n` children joined by `n - 1` binary operators,
/// e.g. `a + b * c - d`. Precedence is resolved when evaluating, so the
/// chain is kept as written.
#[derive(Debug, Clone)]
pub struct OperatorChain<O> {
    children: Vec<NodeRef>,
    operators: Vec<O>,
}

/// A chain over the full operator set.
pub type OperationNode = OperatorChain<Operator>;

/// A chain over the numeric and logical operators only.
pub type ArithmeticNode = OperatorChain<ArithmeticOperator>;

/// Ties an operator type to the node kind holding chains of it.
pub trait ChainOperator: BinaryOperator + std::fmt::Debug {
    const KIND: &'static str;

    fn as_chain(node: &ExpressionNode) -> Option<&OperatorChain<Self>>;
}

impl ChainOperator for Operator {
    const KIND: &'static str = "operation";

    fn as_chain(node: &ExpressionNode) -> Option<&OperatorChain<Self>> {
        match node {
            ExpressionNode::Operation(chain) => Some(chain),
            _ => None,
        }
    }
}

impl ChainOperator for ArithmeticOperator {
    const KIND: &'static str = "arithmetic";

    fn as_chain(node: &ExpressionNode) -> Option<&OperatorChain<Self>> {
        match node {
            ExpressionNode::Arithmetic(chain) => Some(chain),
            _ => None,
        }
    }
}

impl<O: ChainOperator> OperatorChain<O> {
    pub fn new(children: Vec<NodeRef>, operators: Vec<O>) -> Result<Self, Error> {
        if operators.is_empty() || children.len() != operators.len() + 1 {
            return Err(Error::Arity {
                kind: O::KIND,
                expected: format!(
                    "{} (one more than the {} operators)",
                    operators.len() + 1,
                    operators.len()
                ),
                actual: children.len(),
            });
        }
        Ok(Self {
            children,
            operators,
        })
    }

    pub fn binary(left: NodeRef, operator: O, right: NodeRef) -> Self {
        Self {
            children: vec![left, right],
            operators: vec![operator],
        }
    }

    /// Combines `left operator right`, appending to `left` if it already is a chain
    /// of this kind instead of nesting it.
    pub fn resolve(left: NodeRef, operator: O, right: NodeRef) -> Self {
        match O::as_chain(&left) {
            Some(chain) => {
                let mut children = chain.children.clone();
                children.push(right);
                let mut operators = chain.operators.clone();
                operators.push(operator);
                Self {
                    children,
                    operators,
                }
            }
            None => Self::binary(left, operator, right),
        }
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    pub fn operators(&self) -> &[O] {
        &self.operators
    }

    /// Replaces the children, keeping the operators.
    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        if children.len() != self.children.len() {
            return Err(Error::Arity {
                kind: O::KIND,
                expected: self.children.len().to_string(),
                actual: children.len(),
            });
        }
        Ok(Self {
            children,
            operators: self.operators.clone(),
        })
    }

    /// The join of the child types. Joining is commutative, so precedence
    /// does not matter here.
    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let mut children = self.children.iter();
        let mut result = match children.next() {
            Some(first) => first.type_of(context)?,
            None => return Ok(TensorType::empty()),
        };
        for child in children {
            result = result.join_type(&child.type_of(context)?)?;
        }
        Ok(result)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let mut stack: Vec<(Option<O>, Value)> = Vec::with_capacity(self.children.len());
        for (i, child) in self.children.iter().enumerate() {
            let value = child.evaluate(context)?;
            let operator = match i {
                0 => None,
                _ => Some(self.operators[i - 1]),
            };
            if let Some(operator) = operator {
                while let Some(&(Some(top), _)) = stack.last() {
                    if operator.has_precedence_over(top) {
                        break;
                    }
                    reduce(&mut stack)?;
                }
            }
            stack.push((operator, value));
        }
        while stack.len() > 1 {
            reduce(&mut stack)?;
        }
        match stack.pop() {
            Some((_, value)) => Ok(value),
            None => Err(Error::Evaluation(format!("Empty {} node", O::KIND))),
        }
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
        enclosing: Enclosing,
    ) -> Result<(), Error> {
        let parenthesize = self.needs_parentheses(enclosing);
        if parenthesize {
            out.push('(');
        }
        let this = Enclosing::Chain {
            operators: self.operators.len(),
            precedence: self.operators.first().map_or(0, |op| op.precedence()),
        };
        let mut operators = self.operators.iter();
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                if let Some(operator) = operators.next() {
                    out.push(' ');
                    out.push_str(operator.symbol());
                    out.push(' ');
                }
            }
            child.render(out, session, path, this)?;
        }
        if parenthesize {
            out.push(')');
        }
        Ok(())
    }

    /// A chain inside another chain is parenthesized unless both consist of a
    /// single operator and this one binds tighter. Longer chains may have been
    /// put together by [`OperatorChain::resolve`] in an order which differs from
    /// the precedence of the operators, so they are always parenthesized.
    fn needs_parentheses(&self, enclosing: Enclosing) -> bool {
        match enclosing {
            Enclosing::None => false,
            Enclosing::Unary => true,
            Enclosing::Chain {
                operators,
                precedence,
            } => match self.operators.as_slice() {
                [operator] if operators == 1 => operator.precedence() <= precedence,
                _ => true,
            },
        }
    }
}

/// Applies the operator on top of the stack to the two topmost values.
fn reduce<O: BinaryOperator>(stack: &mut Vec<(Option<O>, Value)>) -> Result<(), Error> {
    match (stack.pop(), stack.pop()) {
        (Some((Some(operator), right)), Some((left_operator, left))) => {
            stack.push((left_operator, operator.apply(&left, &right)?));
            Ok(())
        }
        _ => Err(Error::Evaluation("Unbalanced operator stack".to_owned())),
    }
}
