//! The expression tree. Every node is immutable and shared through [`NodeRef`];
//! rebuilding a node with new children allocates only the new parent.
//!
//! A node supports three independent passes, each taking its own context:
//! [`ExpressionNode::type_of`], [`ExpressionNode::evaluate`] and
//! [`ExpressionNode::render`]. Equality and hashing of nodes are defined by
//! their canonical text.
mod branch;
mod function;
mod leaf;
mod logic;
mod operation;
mod reference;
mod tensor_function;

pub use branch::*;
pub use function::*;
pub use leaf::*;
pub use logic::*;
pub use operation::*;
pub use reference::*;
pub use tensor_function::*;

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::context::EvaluationContext;
use crate::serialize::SerializationContext;
use crate::tensor::{Tensor, TensorType};
use crate::typechecking::TypeContext;
use crate::value::Value;
use crate::Error;

pub type NodeRef = Arc<ExpressionNode>;

#[derive(Debug, Clone)]
pub enum ExpressionNode {
    Constant(ConstantNode),
    Name(NameNode),
    Reference(ReferenceNode),
    Operation(OperationNode),
    Arithmetic(ArithmeticNode),
    Comparison(ComparisonNode),
    Not(NotNode),
    SetMembership(SetMembershipNode),
    Negative(NegativeNode),
    Embraced(EmbracedNode),
    If(IfNode),
    Switch(SwitchNode),
    Function(FunctionNode),
    Lambda(LambdaFunctionNode),
    Generate(GenerateNode),
    Map(MapNode),
    Reduce(ReduceNode),
    Rename(RenameNode),
    Sum(SumNode),
    Join(JoinNode),
    Match(MatchNode),
    UnpackBits(UnpackBitsNode),
}

/// The node a child is rendered inside of, as far as rendering cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enclosing {
    /// The root of the rendering, or a node that does not affect its children's text.
    None,
    /// A prefix operator (`-` or `!`). Operator chains below it need parentheses.
    Unary,
    /// An operator chain with this many operators, the first of the given precedence.
    Chain { operators: usize, precedence: u8 },
}

impl ExpressionNode {
    /// A short name of the kind of this node, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ExpressionNode::Constant(_) => "constant",
            ExpressionNode::Name(_) => "name",
            ExpressionNode::Reference(_) => "reference",
            ExpressionNode::Operation(_) => "operation",
            ExpressionNode::Arithmetic(_) => "arithmetic",
            ExpressionNode::Comparison(_) => "comparison",
            ExpressionNode::Not(_) => "not",
            ExpressionNode::SetMembership(_) => "in",
            ExpressionNode::Negative(_) => "negative",
            ExpressionNode::Embraced(_) => "embraced",
            ExpressionNode::If(_) => "if",
            ExpressionNode::Switch(_) => "switch",
            ExpressionNode::Function(_) => "function",
            ExpressionNode::Lambda(_) => "lambda",
            ExpressionNode::Generate(_) => "tensor generate",
            ExpressionNode::Map(_) => "map",
            ExpressionNode::Reduce(_) => "reduce",
            ExpressionNode::Rename(_) => "rename",
            ExpressionNode::Sum(_) => "sum",
            ExpressionNode::Join(_) => "join",
            ExpressionNode::Match(_) => "match",
            ExpressionNode::UnpackBits(_) => "unpack_bits",
        }
    }

    /// Whether the text of this node is a single operand, which keeps its meaning
    /// wherever it is substituted for an identifier.
    pub fn is_atomic(&self) -> bool {
        !matches!(
            self,
            ExpressionNode::Operation(_)
                | ExpressionNode::Arithmetic(_)
                | ExpressionNode::Comparison(_)
                | ExpressionNode::SetMembership(_)
                | ExpressionNode::Not(_)
                | ExpressionNode::Negative(_)
        )
    }

    /// The children of this node, in order. Leaves have none.
    pub fn children(&self) -> Vec<NodeRef> {
        match self {
            ExpressionNode::Constant(_) | ExpressionNode::Name(_) => vec![],
            ExpressionNode::Reference(node) => node.children(),
            ExpressionNode::Operation(node) => node.children().to_vec(),
            ExpressionNode::Arithmetic(node) => node.children().to_vec(),
            ExpressionNode::Comparison(node) => node.children(),
            ExpressionNode::Not(node) => node.children(),
            ExpressionNode::SetMembership(node) => node.children(),
            ExpressionNode::Negative(node) => node.children(),
            ExpressionNode::Embraced(node) => node.children(),
            ExpressionNode::If(node) => node.children(),
            ExpressionNode::Switch(node) => node.children(),
            ExpressionNode::Function(node) => node.children().to_vec(),
            ExpressionNode::Lambda(node) => node.children(),
            ExpressionNode::Generate(node) => node.children(),
            ExpressionNode::Map(node) => node.children(),
            ExpressionNode::Reduce(node) => node.children(),
            ExpressionNode::Rename(node) => node.children(),
            ExpressionNode::Sum(node) => node.children(),
            ExpressionNode::Join(node) => node.children(),
            ExpressionNode::Match(node) => node.children(),
            ExpressionNode::UnpackBits(node) => node.children(),
        }
    }

    /// Returns a node of the same kind with the children replaced.
    /// Fails if the number of children does not match the arity of this node.
    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<ExpressionNode, Error> {
        Ok(match self {
            ExpressionNode::Constant(_) | ExpressionNode::Name(_) => {
                check_arity(self.kind(), 0, &children)?;
                self.clone()
            }
            ExpressionNode::Reference(node) => {
                ExpressionNode::Reference(node.with_children(children)?)
            }
            ExpressionNode::Operation(node) => {
                ExpressionNode::Operation(node.with_children(children)?)
            }
            ExpressionNode::Arithmetic(node) => {
                ExpressionNode::Arithmetic(node.with_children(children)?)
            }
            ExpressionNode::Comparison(node) => {
                ExpressionNode::Comparison(node.with_children(children)?)
            }
            ExpressionNode::Not(_) => {
                ExpressionNode::Not(NotNode::new(single(self.kind(), children)?))
            }
            ExpressionNode::SetMembership(node) => {
                ExpressionNode::SetMembership(node.with_children(children)?)
            }
            ExpressionNode::Negative(_) => {
                ExpressionNode::Negative(NegativeNode::new(single(self.kind(), children)?))
            }
            ExpressionNode::Embraced(_) => {
                ExpressionNode::Embraced(EmbracedNode::new(single(self.kind(), children)?))
            }
            ExpressionNode::If(node) => ExpressionNode::If(node.with_children(children)?),
            ExpressionNode::Switch(node) => ExpressionNode::Switch(node.with_children(children)?),
            ExpressionNode::Function(node) => {
                ExpressionNode::Function(node.with_children(children)?)
            }
            ExpressionNode::Lambda(node) => ExpressionNode::Lambda(node.with_children(children)?),
            ExpressionNode::Generate(node) => {
                ExpressionNode::Generate(node.with_children(children)?)
            }
            ExpressionNode::Map(node) => ExpressionNode::Map(node.with_children(children)?),
            ExpressionNode::Reduce(node) => ExpressionNode::Reduce(node.with_children(children)?),
            ExpressionNode::Rename(node) => ExpressionNode::Rename(node.with_children(children)?),
            ExpressionNode::Sum(node) => ExpressionNode::Sum(node.with_children(children)?),
            ExpressionNode::Join(node) => ExpressionNode::Join(node.with_children(children)?),
            ExpressionNode::Match(node) => ExpressionNode::Match(node.with_children(children)?),
            ExpressionNode::UnpackBits(node) => {
                ExpressionNode::UnpackBits(node.with_children(children)?)
            }
        })
    }

    /// Infers the type of the value this node evaluates to.
    pub fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        match self {
            ExpressionNode::Constant(node) => Ok(node.value().value_type()),
            ExpressionNode::Name(node) => Err(node.unsupported("type inference")),
            ExpressionNode::Reference(node) => node.type_of(context),
            ExpressionNode::Operation(node) => node.type_of(context),
            ExpressionNode::Arithmetic(node) => node.type_of(context),
            // truth values are scalars whatever the operands are
            ExpressionNode::Comparison(_) | ExpressionNode::SetMembership(_) => {
                Ok(TensorType::empty())
            }
            ExpressionNode::Not(node) => node.value().type_of(context),
            ExpressionNode::Negative(node) => node.value().type_of(context),
            ExpressionNode::Embraced(node) => node.value().type_of(context),
            ExpressionNode::If(node) => node.type_of(context),
            ExpressionNode::Switch(node) => node.type_of(context),
            ExpressionNode::Function(node) => node.type_of(context),
            ExpressionNode::Lambda(node) => node.type_of(context),
            ExpressionNode::Generate(node) => node.type_of(context),
            ExpressionNode::Map(node) => node.type_of(context),
            ExpressionNode::Reduce(node) => node.type_of(context),
            ExpressionNode::Rename(node) => node.type_of(context),
            ExpressionNode::Sum(node) => node.type_of(context),
            ExpressionNode::Join(node) => node.type_of(context),
            ExpressionNode::Match(node) => node.type_of(context),
            ExpressionNode::UnpackBits(node) => node.type_of(context),
        }
    }

    /// Computes the value of this node.
    pub fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        match self {
            ExpressionNode::Constant(node) => Ok(node.value().clone()),
            ExpressionNode::Name(node) => Err(node.unsupported("evaluation")),
            ExpressionNode::Reference(node) => node.evaluate(context),
            ExpressionNode::Operation(node) => node.evaluate(context),
            ExpressionNode::Arithmetic(node) => node.evaluate(context),
            ExpressionNode::Comparison(node) => node.evaluate(context),
            ExpressionNode::Not(node) => node.value().evaluate(context)?.not(),
            ExpressionNode::SetMembership(node) => node.evaluate(context),
            ExpressionNode::Negative(node) => node.value().evaluate(context)?.negate(),
            ExpressionNode::Embraced(node) => node.value().evaluate(context),
            ExpressionNode::If(node) => node.evaluate(context),
            ExpressionNode::Switch(node) => node.evaluate(context),
            ExpressionNode::Function(node) => node.evaluate(context),
            ExpressionNode::Lambda(node) => Err(Error::Unsupported {
                operation: "direct evaluation",
                node: node.to_string(),
            }),
            ExpressionNode::Generate(node) => node.evaluate(context),
            ExpressionNode::Map(node) => node.evaluate(context),
            ExpressionNode::Reduce(node) => node.evaluate(context),
            ExpressionNode::Rename(node) => node.evaluate(context),
            ExpressionNode::Sum(node) => node.evaluate(context),
            ExpressionNode::Join(node) => node.evaluate(context),
            ExpressionNode::Match(node) => node.evaluate(context),
            ExpressionNode::UnpackBits(node) => node.evaluate(context),
        }
    }

    /// Appends the canonical text of this node to `out`.
    ///
    /// `path` holds the chain of function invocations being inlined, and
    /// `enclosing` describes the node this one is rendered inside of.
    pub fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
        enclosing: Enclosing,
    ) -> Result<(), Error> {
        match self {
            ExpressionNode::Constant(node) => {
                node.render(out);
                Ok(())
            }
            ExpressionNode::Name(node) => {
                out.push_str(node.name());
                Ok(())
            }
            ExpressionNode::Reference(node) => node.render(out, session, path),
            ExpressionNode::Operation(node) => node.render(out, session, path, enclosing),
            ExpressionNode::Arithmetic(node) => node.render(out, session, path, enclosing),
            ExpressionNode::Comparison(node) => node.render(out, session, path, enclosing),
            ExpressionNode::Not(node) => {
                out.push('!');
                node.value().render(out, session, path, Enclosing::Unary)
            }
            ExpressionNode::SetMembership(node) => node.render(out, session, path, enclosing),
            ExpressionNode::Negative(node) => {
                out.push('-');
                node.value().render(out, session, path, Enclosing::Unary)
            }
            ExpressionNode::Embraced(node) => {
                out.push('(');
                node.value().render(out, session, path, Enclosing::None)?;
                out.push(')');
                Ok(())
            }
            ExpressionNode::If(node) => node.render(out, session, path),
            ExpressionNode::Switch(node) => node.render(out, session, path),
            ExpressionNode::Function(node) => node.render(out, session, path),
            ExpressionNode::Lambda(node) => node.render(out, session, path),
            ExpressionNode::Generate(node) => node.render(out, session, path),
            ExpressionNode::Map(node) => node.render(out, session, path),
            ExpressionNode::Reduce(node) => node.render(out, session, path),
            ExpressionNode::Rename(node) => node.render(out, session, path),
            ExpressionNode::Sum(node) => node.render(out, session, path),
            ExpressionNode::Join(node) => node.render(out, session, path),
            ExpressionNode::Match(node) => node.render(out, session, path),
            ExpressionNode::UnpackBits(node) => node.render(out, session, path),
        }
    }

    /// Renders this node as the root of a serialization task.
    pub fn to_string_with(&self, session: &SerializationContext) -> Result<String, Error> {
        let mut out = String::new();
        self.render(&mut out, session, &mut vec![], Enclosing::None)?;
        Ok(out)
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(self)
    }
}

impl Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .to_string_with(&SerializationContext::default())
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl PartialEq for ExpressionNode {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ExpressionNode {}

impl Hash for ExpressionNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

macro_rules! impl_from_node {
    ($($variant:ident($node:ty)),* $(,)?) => {
        $(
            impl From<$node> for ExpressionNode {
                fn from(node: $node) -> Self {
                    ExpressionNode::$variant(node)
                }
            }
        )*
    };
}

impl_from_node!(
    Constant(ConstantNode),
    Name(NameNode),
    Reference(ReferenceNode),
    Operation(OperationNode),
    Arithmetic(ArithmeticNode),
    Comparison(ComparisonNode),
    Not(NotNode),
    SetMembership(SetMembershipNode),
    Negative(NegativeNode),
    Embraced(EmbracedNode),
    If(IfNode),
    Switch(SwitchNode),
    Function(FunctionNode),
    Lambda(LambdaFunctionNode),
    Generate(GenerateNode),
    Map(MapNode),
    Reduce(ReduceNode),
    Rename(RenameNode),
    Sum(SumNode),
    Join(JoinNode),
    Match(MatchNode),
    UnpackBits(UnpackBitsNode),
);

pub(crate) fn check_arity(
    kind: &'static str,
    expected: usize,
    children: &[NodeRef],
) -> Result<(), Error> {
    if children.len() != expected {
        return Err(Error::Arity {
            kind,
            expected: expected.to_string(),
            actual: children.len(),
        });
    }
    Ok(())
}

fn single(kind: &'static str, children: Vec<NodeRef>) -> Result<NodeRef, Error> {
    let [child] = take(kind, children)?;
    Ok(child)
}

/// Takes exactly `N` children out of `children`.
pub(crate) fn take<const N: usize>(
    kind: &'static str,
    children: Vec<NodeRef>,
) -> Result<[NodeRef; N], Error> {
    let actual = children.len();
    children.try_into().map_err(|_| Error::Arity {
        kind,
        expected: N.to_string(),
        actual,
    })
}

/// Evaluates a child which must produce a tensor.
pub(crate) fn evaluate_tensor(
    node: &NodeRef,
    context: &dyn EvaluationContext,
) -> Result<Arc<Tensor>, Error> {
    match node.evaluate(context)? {
        Value::Tensor(tensor) => Ok(tensor),
        other => Err(Error::Argument(format!(
            "Attempted to evaluate tensor function '{node}', but this returns {}, not a tensor",
            other.describe()
        ))),
    }
}

/// Renders `node` into a fresh string, as a top level expression.
pub(crate) fn render_child(
    node: &NodeRef,
    session: &SerializationContext,
    path: &mut Vec<String>,
) -> Result<String, Error> {
    let mut out = String::new();
    node.render(&mut out, session, path, Enclosing::None)?;
    Ok(out)
}
