use crate::ast::{render_child, take, Enclosing, NodeRef};
use crate::context::EvaluationContext;
use crate::serialize::SerializationContext;
use crate::tensor::TensorType;
use crate::typechecking::{generalize, TypeContext, TypeError};
use crate::util::format_double;
use crate::value::Value;
use crate::Error;

/// `if (condition, true_expression, false_expression)`, with an optional hint
/// of how likely the condition is to be true.
#[derive(Debug, Clone)]
pub struct IfNode {
    condition: NodeRef,
    true_expression: NodeRef,
    false_expression: NodeRef,
    true_probability: Option<f64>,
}

impl IfNode {
    pub fn new(condition: NodeRef, true_expression: NodeRef, false_expression: NodeRef) -> Self {
        Self {
            condition,
            true_expression,
            false_expression,
            true_probability: None,
        }
    }

    pub fn with_probability(
        condition: NodeRef,
        true_expression: NodeRef,
        false_expression: NodeRef,
        true_probability: f64,
    ) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&true_probability) {
            return Err(Error::Argument(format!(
                "The true probability of an if must be in [0, 1], not {}",
                format_double(true_probability)
            )));
        }
        Ok(Self {
            true_probability: Some(true_probability),
            ..Self::new(condition, true_expression, false_expression)
        })
    }

    pub fn condition(&self) -> &NodeRef {
        &self.condition
    }

    pub fn true_expression(&self) -> &NodeRef {
        &self.true_expression
    }

    pub fn false_expression(&self) -> &NodeRef {
        &self.false_expression
    }

    pub fn true_probability(&self) -> Option<f64> {
        self.true_probability
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![
            self.condition.clone(),
            self.true_expression.clone(),
            self.false_expression.clone(),
        ]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [condition, true_expression, false_expression] = take("if", children)?;
        Ok(Self {
            condition,
            true_expression,
            false_expression,
            true_probability: self.true_probability,
        })
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let condition = self.condition.type_of(context)?;
        if condition.rank() > 0 {
            return Err(TypeError::Mismatch {
                expression: self.condition.to_string(),
                expected: TensorType::empty().to_string(),
                actual: condition,
            }
            .into());
        }
        let alternatives = vec![
            (self.true_expression.to_string(), self.true_expression.type_of(context)?),
            (self.false_expression.to_string(), self.false_expression.type_of(context)?),
        ];
        Ok(generalize("if", alternatives)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        if self.condition.evaluate(context)?.as_boolean()? {
            self.true_expression.evaluate(context)
        } else {
            self.false_expression.evaluate(context)
        }
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("if (");
        self.condition.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.true_expression.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.false_expression.render(out, session, path, Enclosing::None)?;
        if let Some(probability) = self.true_probability {
            out.push_str(", ");
            out.push_str(&format_double(probability));
        }
        out.push(')');
        Ok(())
    }
}

/// Selects the result of the first case whose value equals the argument,
/// or the default if none does.
#[derive(Debug, Clone)]
pub struct SwitchNode {
    argument: NodeRef,
    cases: Vec<(NodeRef, NodeRef)>,
    default: NodeRef,
}

impl SwitchNode {
    pub fn new(
        argument: NodeRef,
        case_values: Vec<NodeRef>,
        case_results: Vec<NodeRef>,
        default: NodeRef,
    ) -> Result<Self, Error> {
        if case_values.is_empty() {
            return Err(Error::Arity {
                kind: "switch",
                expected: "at least 1 case".to_owned(),
                actual: 0,
            });
        }
        if case_values.len() != case_results.len() {
            return Err(Error::Arity {
                kind: "switch",
                expected: format!("{} case results, one per case value", case_values.len()),
                actual: case_results.len(),
            });
        }
        Ok(Self {
            argument,
            cases: case_values.into_iter().zip(case_results).collect(),
            default,
        })
    }

    pub fn argument(&self) -> &NodeRef {
        &self.argument
    }

    pub fn cases(&self) -> &[(NodeRef, NodeRef)] {
        &self.cases
    }

    pub fn default_expression(&self) -> &NodeRef {
        &self.default
    }

    /// The argument, then each case value followed by its result, then the default.
    pub fn children(&self) -> Vec<NodeRef> {
        let mut children = Vec::with_capacity(self.cases.len() * 2 + 2);
        children.push(self.argument.clone());
        for (value, result) in &self.cases {
            children.push(value.clone());
            children.push(result.clone());
        }
        children.push(self.default.clone());
        children
    }

    pub fn with_children(&self, mut children: Vec<NodeRef>) -> Result<Self, Error> {
        if children.len() < 4 || children.len() % 2 != 0 {
            return Err(Error::Arity {
                kind: "switch",
                expected: "an argument, pairs of case value and result, and a default".to_owned(),
                actual: children.len(),
            });
        }
        let default = children.split_off(children.len() - 1);
        let cases = children.split_off(1);
        let [argument] = take("switch", children)?;
        let [default] = take("switch", default)?;
        let (values, results) = cases
            .chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .unzip();
        Self::new(argument, values, results, default)
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let argument = (self.argument.to_string(), self.argument.type_of(context)?);
        for (value, _) in &self.cases {
            let case = (value.to_string(), value.type_of(context)?);
            generalize("switch", vec![argument.clone(), case])?;
        }
        let mut alternatives = Vec::with_capacity(self.cases.len() + 1);
        for (_, result) in &self.cases {
            alternatives.push((result.to_string(), result.type_of(context)?));
        }
        alternatives.push((self.default.to_string(), self.default.type_of(context)?));
        Ok(generalize("switch", alternatives)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let argument = self.argument.evaluate(context)?;
        for (value, result) in &self.cases {
            if value.evaluate(context)? == argument {
                return result.evaluate(context);
            }
        }
        self.default.evaluate(context)
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("switch (");
        out.push_str(&render_child(&self.argument, session, path)?);
        out.push_str(") {\n");
        for (value, result) in &self.cases {
            out.push_str("   case ");
            value.render(out, session, path, Enclosing::None)?;
            out.push_str(": ");
            result.render(out, session, path, Enclosing::None)?;
            out.push_str(",\n");
        }
        out.push_str("   default: ");
        self.default.render(out, session, path, Enclosing::None)?;
        out.push_str("\n}");
        Ok(())
    }
}
