use std::fmt::{self, Display};
use std::sync::Arc;

use crate::operator::TruthOperator;
use crate::tensor::{Tensor, TensorType};
use crate::util::{format_double, quote};
use crate::Error;

/// The result of evaluating an expression.
///
/// Operations between scalars produce scalars. When either operand is a tensor the
/// operation is applied cell by cell, joining the operands (a scalar acts as a rank 0
/// tensor); comparisons and logical operators then produce 1.0 for true and 0.0 for false.
#[derive(Debug, Clone)]
pub enum Value {
    Double(f64),
    Boolean(bool),
    Str(String),
    Tensor(Arc<Tensor>),
}

impl Value {
    pub fn tensor(tensor: Tensor) -> Self {
        Value::Tensor(Arc::new(tensor))
    }

    pub fn value_type(&self) -> TensorType {
        match self {
            Value::Tensor(tensor) => tensor.tensor_type().clone(),
            _ => TensorType::empty(),
        }
    }

    /// The numeric value of a scalar, if this is one.
    fn scalar(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            Value::Boolean(value) => Some(if *value { 1.0 } else { 0.0 }),
            Value::Str(_) => None,
            Value::Tensor(tensor) => tensor.as_double().ok(),
        }
    }

    pub fn as_double(&self) -> Result<f64, Error> {
        match self {
            Value::Tensor(tensor) => tensor.as_double(),
            other => other
                .scalar()
                .ok_or_else(|| Error::Evaluation(format!("{} is not a number", other.describe()))),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, Error> {
        Ok(self.as_double()? != 0.0)
    }

    /// This value as a tensor; scalars become rank 0 tensors.
    pub fn as_tensor(&self) -> Result<Arc<Tensor>, Error> {
        match self {
            Value::Tensor(tensor) => Ok(tensor.clone()),
            other => Ok(Arc::new(Tensor::scalar(other.as_double()?))),
        }
    }

    /// A description of this value for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Double(value) => format!("the double {}", format_double(*value)),
            Value::Boolean(value) => format!("the boolean {value}"),
            Value::Str(value) => format!("the string {}", quote(value)),
            Value::Tensor(tensor) => format!("a tensor of type {}", tensor.tensor_type()),
        }
    }

    fn numeric(
        &self,
        other: &Value,
        operation: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, Error> {
        if let (Value::Str(_), _) | (_, Value::Str(_)) = (self, other) {
            return Err(Error::Evaluation(format!(
                "Cannot apply '{operation}' to {} and {}",
                self.describe(),
                other.describe()
            )));
        }
        match (self, other) {
            (Value::Tensor(_), _) | (_, Value::Tensor(_)) => {
                let joined = self.as_tensor()?.join(&*other.as_tensor()?, |a, b| Ok(f(a, b)))?;
                Ok(Value::tensor(joined))
            }
            _ => Ok(Value::Double(f(self.as_double()?, other.as_double()?))),
        }
    }

    fn truth(
        &self,
        other: &Value,
        operation: &str,
        f: impl Fn(f64, f64) -> bool,
    ) -> Result<Value, Error> {
        match self.numeric(other, operation, |a, b| if f(a, b) { 1.0 } else { 0.0 })? {
            Value::Double(value) => Ok(Value::Boolean(value != 0.0)),
            tensor => Ok(tensor),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "+", |a, b| a + b)
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "-", |a, b| a - b)
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "*", |a, b| a * b)
    }

    pub fn divide(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "/", |a, b| a / b)
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "%", |a, b| a % b)
    }

    pub fn power(&self, other: &Value) -> Result<Value, Error> {
        self.numeric(other, "^", f64::powf)
    }

    pub fn and(&self, other: &Value) -> Result<Value, Error> {
        self.truth(other, "&&", |a, b| a != 0.0 && b != 0.0)
    }

    pub fn or(&self, other: &Value) -> Result<Value, Error> {
        self.truth(other, "||", |a, b| a != 0.0 || b != 0.0)
    }

    pub fn compare(&self, operator: TruthOperator, other: &Value) -> Result<Value, Error> {
        if let (Value::Str(a), Value::Str(b)) = (self, other) {
            return match operator {
                TruthOperator::Equal | TruthOperator::ApproxEqual => Ok(Value::Boolean(a == b)),
                TruthOperator::NotEqual => Ok(Value::Boolean(a != b)),
                _ => Ok(Value::Boolean(operator.test(
                    a.cmp(b) as i8 as f64,
                    0.0,
                ))),
            };
        }
        self.truth(other, operator.symbol(), |a, b| operator.test(a, b))
    }

    pub fn not(&self) -> Result<Value, Error> {
        match self {
            Value::Tensor(tensor) => Ok(Value::tensor(
                tensor.map(|x| Ok(if x == 0.0 { 1.0 } else { 0.0 }))?,
            )),
            other => Ok(Value::Boolean(!other.as_boolean()?)),
        }
    }

    pub fn negate(&self) -> Result<Value, Error> {
        match self {
            Value::Tensor(tensor) => Ok(Value::tensor(tensor.map(|x| Ok(-x))?)),
            other => Ok(Value::Double(-other.as_double()?)),
        }
    }
}

/// Scalars compare numerically (booleans as 1 and 0), strings by content and
/// tensors by type and cells.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Str(_), _) | (_, Value::Str(_)) => false,
            (Value::Tensor(a), Value::Tensor(b)) => a == b,
            (a, b) => match (a.scalar(), b.scalar()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(value) => f.write_str(&format_double(*value)),
            Value::Boolean(value) => Display::fmt(value, f),
            Value::Str(value) => f.write_str(&quote(value)),
            Value::Tensor(tensor) => Display::fmt(tensor, f),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::tensor(tensor)
    }
}
