use std::fmt::{self, Display};

use crate::ast::{Enclosing, NodeRef};
use crate::context::EvaluationContext;
use crate::serialize::SerializationContext;
use crate::tensor::TensorType;
use crate::typechecking::TypeContext;
use crate::util::{ListDisplay, FUNCTION_WRAPPER};
use crate::value::Value;
use crate::Error;

/// The argument expressions of a reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Arguments {
    expressions: Vec<NodeRef>,
}

impl Arguments {
    pub fn new(expressions: Vec<NodeRef>) -> Self {
        Self { expressions }
    }

    pub fn expressions(&self) -> &[NodeRef] {
        &self.expressions
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

/// `(a,b)`, or nothing if there are no arguments.
impl Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expressions.is_empty() {
            return Ok(());
        }
        write!(f, "({})", ListDisplay(&self.expressions, ","))
    }
}

/// A name with optional arguments and an optional output: `x`, `query(q)`,
/// `attribute(a).count`. Identifiers (no arguments and no output) are looked up
/// in the bindings of the enclosing scope; anything else is a function or
/// feature invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    name: String,
    arguments: Arguments,
    output: Option<String>,
}

impl Reference {
    pub fn new(name: impl Into<String>, arguments: Vec<NodeRef>, output: Option<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Arguments::new(arguments),
            output,
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(name, vec![], None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn is_identifier(&self) -> bool {
        self.arguments.is_empty() && self.output.is_none()
    }

    pub fn with_arguments(&self, arguments: Vec<NodeRef>) -> Self {
        Self {
            name: self.name.clone(),
            arguments: Arguments::new(arguments),
            output: self.output.clone(),
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.arguments)?;
        if let Some(output) = &self.output {
            write!(f, ".{output}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceNode {
    reference: Reference,
}

impl ReferenceNode {
    pub fn new(reference: Reference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn children(&self) -> Vec<NodeRef> {
        self.reference.arguments.expressions.clone()
    }

    /// Replaces the arguments; the number of arguments must stay the same.
    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        if children.len() != self.reference.arguments.len() {
            return Err(Error::Arity {
                kind: "reference",
                expected: self.reference.arguments.len().to_string(),
                actual: children.len(),
            });
        }
        Ok(Self::new(self.reference.with_arguments(children)))
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        context.resolve_type(&self.reference, context)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let reference = &self.reference;
        if reference.is_identifier() {
            return context.get(&reference.name);
        }
        context.get_with(&reference.name, &reference.arguments, reference.output(), context)
    }

    /// Renders a bound identifier as its binding, a call of a known function as a
    /// reference to the inlined instance, and anything else as written.
    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        let reference = &self.reference;
        if reference.is_identifier() {
            if let Some(binding) = session.get_binding(&reference.name) {
                out.push_str(binding);
                return Ok(());
            }
        }
        if reference.output.is_none() {
            if let Some(function) = session.get_function(&reference.name) {
                if function.arguments().len() == reference.arguments.len() {
                    let call = format!("{}{}", reference.name, reference.arguments);
                    if path.contains(&call) {
                        let mut cycle = path.clone();
                        cycle.push(call);
                        return Err(Error::Cycle { path: cycle });
                    }
                    path.push(call);
                    let instance =
                        session.inline(function, reference.arguments.expressions(), path);
                    path.pop();
                    out.push_str(&format!("{FUNCTION_WRAPPER}({})", instance?));
                    return Ok(());
                }
            }
        }
        out.push_str(&reference.name);
        if !reference.arguments.is_empty() {
            out.push('(');
            for (i, argument) in reference.arguments.expressions.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                argument.render(out, session, path, Enclosing::None)?;
            }
            out.push(')');
        }
        if let Some(output) = &reference.output {
            out.push('.');
            out.push_str(output);
        }
        Ok(())
    }
}
