use crate::ast::{take, Enclosing, NodeRef};
use crate::context::EvaluationContext;
use crate::operator::{BinaryOperator, Operator, TruthOperator};
use crate::serialize::SerializationContext;
use crate::value::Value;
use crate::Error;

/// A comparison of two values, e.g. `a <= b`.
#[derive(Debug, Clone)]
pub struct ComparisonNode {
    left: NodeRef,
    operator: TruthOperator,
    right: NodeRef,
}

impl ComparisonNode {
    pub fn new(left: NodeRef, operator: TruthOperator, right: NodeRef) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }

    pub fn left(&self) -> &NodeRef {
        &self.left
    }

    pub fn operator(&self) -> TruthOperator {
        self.operator
    }

    pub fn right(&self) -> &NodeRef {
        &self.right
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.left.clone(), self.right.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [left, right] = take("comparison", children)?;
        Ok(Self::new(left, self.operator, right))
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let left = self.left.evaluate(context)?;
        let right = self.right.evaluate(context)?;
        left.compare(self.operator, &right)
    }

    /// Comparisons bind like a single operator of the comparison precedence, so
    /// looser chains among the operands are parenthesized. The comparison itself
    /// is parenthesized under any operator.
    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
        enclosing: Enclosing,
    ) -> Result<(), Error> {
        let parenthesize = enclosing != Enclosing::None;
        if parenthesize {
            out.push('(');
        }
        let operand = Enclosing::Chain {
            operators: 1,
            // the same rank as the comparison operators of chains
            precedence: Operator::Smaller.precedence(),
        };
        self.left.render(out, session, path, operand)?;
        out.push(' ');
        out.push_str(self.operator.symbol());
        out.push(' ');
        self.right.render(out, session, path, operand)?;
        if parenthesize {
            out.push(')');
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NotNode {
    value: NodeRef,
}

impl NotNode {
    pub fn new(value: NodeRef) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &NodeRef {
        &self.value
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.value.clone()]
    }
}

/// Tests whether a value is one of a set of values: `x in [1, 2, 3]`.
#[derive(Debug, Clone)]
pub struct SetMembershipNode {
    value: NodeRef,
    set: Vec<NodeRef>,
}

impl SetMembershipNode {
    pub fn new(value: NodeRef, set: Vec<NodeRef>) -> Self {
        Self { value, set }
    }

    pub fn value(&self) -> &NodeRef {
        &self.value
    }

    pub fn set(&self) -> &[NodeRef] {
        &self.set
    }

    pub fn children(&self) -> Vec<NodeRef> {
        let mut children = Vec::with_capacity(self.set.len() + 1);
        children.push(self.value.clone());
        children.extend(self.set.iter().cloned());
        children
    }

    pub fn with_children(&self, mut children: Vec<NodeRef>) -> Result<Self, Error> {
        if children.is_empty() {
            return Err(Error::Arity {
                kind: "in",
                expected: "at least 1".to_owned(),
                actual: 0,
            });
        }
        let set = children.split_off(1);
        let [value] = take("in", children)?;
        Ok(Self::new(value, set))
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let value = self.value.evaluate(context)?;
        let set = self
            .set
            .iter()
            .map(|node| node.evaluate(context))
            .collect::<Result<Vec<_>, _>>()?;
        match &value {
            Value::Tensor(tensor) if tensor.tensor_type().rank() > 0 => {
                let tensor = tensor.map(|cell| {
                    let cell = Value::Double(cell);
                    Ok(if set.contains(&cell) { 1.0 } else { 0.0 })
                })?;
                Ok(Value::tensor(tensor))
            }
            _ => Ok(Value::Boolean(set.contains(&value))),
        }
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
        enclosing: Enclosing,
    ) -> Result<(), Error> {
        let parenthesize = enclosing != Enclosing::None;
        if parenthesize {
            out.push('(');
        }
        self.value.render(out, session, path, Enclosing::Unary)?;
        out.push_str(" in [");
        for (i, item) in self.set.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            item.render(out, session, path, Enclosing::None)?;
        }
        out.push(']');
        if parenthesize {
            out.push(')');
        }
        Ok(())
    }
}
