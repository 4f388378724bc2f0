use lazy_static::lazy_static;
use std::fmt::{self, Display};

use crate::ast::{take, Enclosing, NodeRef};
use crate::context::{EvaluationContext, ScopedContext};
use crate::serialize::SerializationContext;
use crate::tensor::TensorType;
use crate::typechecking::{BoundTypeContext, TypeContext, TypeError};
use crate::util::{HashMap, ListDisplay};
use crate::value::Value;
use crate::Error;

/// The implementation of a built-in scalar function.
#[derive(Clone, Copy)]
pub enum ScalarFunction {
    Unary(fn(f64) -> f64),
    Binary(fn(f64, f64) -> f64),
}

impl ScalarFunction {
    pub fn arity(self) -> usize {
        match self {
            ScalarFunction::Unary(_) => 1,
            ScalarFunction::Binary(_) => 2,
        }
    }
}

pub struct FunctionInfo {
    pub name: &'static str,
    pub implementation: ScalarFunction,
}

/// The built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Abs,
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Cosh,
    Elu,
    Erf,
    Exp,
    Fabs,
    Floor,
    IsNan,
    Log,
    Log10,
    Relu,
    Sigmoid,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Square,
    Tan,
    Tanh,
    Atan2,
    Bit,
    Fmod,
    Hamming,
    Ldexp,
    Max,
    Min,
    Pow,
}

fn unary(name: &'static str, f: fn(f64) -> f64) -> FunctionInfo {
    FunctionInfo {
        name,
        implementation: ScalarFunction::Unary(f),
    }
}

fn binary(name: &'static str, f: fn(f64, f64) -> f64) -> FunctionInfo {
    FunctionInfo {
        name,
        implementation: ScalarFunction::Binary(f),
    }
}

fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

lazy_static! {
    // In the order of the `Function` variants.
    static ref FUNCTIONS: Vec<FunctionInfo> = vec![
        unary("abs", f64::abs),
        unary("acos", f64::acos),
        unary("asin", f64::asin),
        unary("atan", f64::atan),
        unary("ceil", f64::ceil),
        unary("cos", f64::cos),
        unary("cosh", f64::cosh),
        unary("elu", |x| if x < 0.0 { x.exp_m1() } else { x }),
        unary("erf", erf),
        unary("exp", f64::exp),
        unary("fabs", f64::abs),
        unary("floor", f64::floor),
        unary("isNan", |x| truth(x.is_nan())),
        unary("log", f64::ln),
        unary("log10", f64::log10),
        unary("relu", |x| x.max(0.0)),
        unary("sigmoid", |x| 1.0 / (1.0 + (-x).exp())),
        unary("sign", |x| if x >= 0.0 { 1.0 } else { -1.0 }),
        unary("sin", f64::sin),
        unary("sinh", f64::sinh),
        unary("sqrt", f64::sqrt),
        unary("square", |x| x * x),
        unary("tan", f64::tan),
        unary("tanh", f64::tanh),
        binary("atan2", f64::atan2),
        // bit y of x, where x is an int8
        binary("bit", |x, y| {
            let bit = y as i64;
            if (0..8).contains(&bit) {
                truth((x as i8 as u8) >> bit & 1 == 1)
            } else {
                0.0
            }
        }),
        binary("fmod", |x, y| x % y),
        // number of differing bits between two int8 values
        binary("hamming", |x, y| ((x as i8) ^ (y as i8)).count_ones() as f64),
        binary("ldexp", |x, y| x * 2f64.powi(y as i32)),
        binary("max", f64::max),
        binary("min", f64::min),
        binary("pow", f64::powf),
    ];

    static ref FUNCTIONS_BY_NAME: HashMap<&'static str, Function> =
        Function::ALL.iter().map(|f| (f.name(), *f)).collect();
}

/// The error function, with an absolute error below 1.2e-7.
fn erf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * x.abs());
    let polynomial = -x * x - 1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let complement = t * polynomial.exp();
    if x >= 0.0 {
        1.0 - complement
    } else {
        complement - 1.0
    }
}

impl Function {
    pub const ALL: [Function; 32] = [
        Function::Abs,
        Function::Acos,
        Function::Asin,
        Function::Atan,
        Function::Ceil,
        Function::Cos,
        Function::Cosh,
        Function::Elu,
        Function::Erf,
        Function::Exp,
        Function::Fabs,
        Function::Floor,
        Function::IsNan,
        Function::Log,
        Function::Log10,
        Function::Relu,
        Function::Sigmoid,
        Function::Sign,
        Function::Sin,
        Function::Sinh,
        Function::Sqrt,
        Function::Square,
        Function::Tan,
        Function::Tanh,
        Function::Atan2,
        Function::Bit,
        Function::Fmod,
        Function::Hamming,
        Function::Ldexp,
        Function::Max,
        Function::Min,
        Function::Pow,
    ];

    pub fn from_name(name: &str) -> Option<Function> {
        FUNCTIONS_BY_NAME.get(name).copied()
    }

    fn info(self) -> &'static FunctionInfo {
        &FUNCTIONS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn arity(self) -> usize {
        self.info().implementation.arity()
    }

    pub fn implementation(self) -> ScalarFunction {
        self.info().implementation
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An invocation of a built-in scalar function. On tensors, unary functions
/// are mapped over the cells and binary functions join their arguments.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    function: Function,
    arguments: Vec<NodeRef>,
}

impl FunctionNode {
    pub fn new(function: Function, arguments: Vec<NodeRef>) -> Result<Self, Error> {
        if arguments.len() != function.arity() {
            return Err(Error::Arity {
                kind: function.name(),
                expected: function.arity().to_string(),
                actual: arguments.len(),
            });
        }
        Ok(Self {
            function,
            arguments,
        })
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.arguments
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        Self::new(self.function, children)
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        match self.arguments.as_slice() {
            [argument] => Ok(argument.type_of(context)?.map_type()),
            [left, right] => Ok(left.type_of(context)?.join_type(&right.type_of(context)?)?),
            _ => Err(self.arity_error()),
        }
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let arguments = self
            .arguments
            .iter()
            .map(|argument| argument.evaluate(context))
            .collect::<Result<Vec<_>, _>>()?;
        match (self.function.implementation(), arguments.as_slice()) {
            (ScalarFunction::Unary(f), [Value::Tensor(tensor)]) => {
                Ok(Value::tensor(tensor.map(|x| Ok(f(x)))?))
            }
            (ScalarFunction::Unary(f), [x]) => Ok(Value::Double(f(x.as_double()?))),
            (ScalarFunction::Binary(f), [x @ Value::Tensor(_), y] | [x, y @ Value::Tensor(_)]) => {
                let joined = x.as_tensor()?.join(&*y.as_tensor()?, |a, b| Ok(f(a, b)))?;
                Ok(Value::tensor(joined))
            }
            (ScalarFunction::Binary(f), [x, y]) => {
                Ok(Value::Double(f(x.as_double()?, y.as_double()?)))
            }
            _ => Err(self.arity_error()),
        }
    }

    fn arity_error(&self) -> Error {
        Error::Arity {
            kind: self.function.name(),
            expected: self.function.arity().to_string(),
            actual: self.arguments.len(),
        }
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str(self.function.name());
        out.push('(');
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            argument.render(out, session, path, Enclosing::None)?;
        }
        out.push(')');
        Ok(())
    }
}

/// A function of named scalar arguments, `f(x,y)(x * y)`, used by the tensor
/// functions which apply it to cells. It is never evaluated on its own.
#[derive(Debug, Clone)]
pub struct LambdaFunctionNode {
    arguments: Vec<String>,
    body: NodeRef,
}

impl LambdaFunctionNode {
    pub fn new<S: Into<String>>(arguments: impl IntoIterator<Item = S>, body: NodeRef) -> Self {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            body,
        }
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn body(&self) -> &NodeRef {
        &self.body
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.body.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [body] = take("lambda", children)?;
        Ok(Self {
            arguments: self.arguments.clone(),
            body,
        })
    }

    /// Fails unless this takes exactly `arity` arguments.
    pub(crate) fn expect_arity(&self, kind: &'static str, arity: usize) -> Result<(), Error> {
        if self.arguments.len() != arity {
            return Err(Error::Argument(format!(
                "{kind} requires a lambda with {arity} argument(s), but got {self}"
            )));
        }
        Ok(())
    }

    /// The type of the body with all arguments bound to scalars.
    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        self.body.type_of(&BoundTypeContext::scalars(context, &self.arguments))
    }

    /// Fails unless the body produces a scalar when the arguments are scalars.
    pub(crate) fn check_scalar(&self, context: &dyn TypeContext) -> Result<(), Error> {
        let body_type = self.type_of(context)?;
        if body_type.rank() > 0 {
            return Err(TypeError::Mismatch {
                expression: self.to_string(),
                expected: TensorType::empty().to_string(),
                actual: body_type,
            }
            .into());
        }
        Ok(())
    }

    /// Applies this to the given argument values, looking up anything else in `context`.
    pub fn apply(&self, values: &[f64], context: &dyn EvaluationContext) -> Result<f64, Error> {
        if values.len() != self.arguments.len() {
            return Err(Error::Arity {
                kind: "lambda",
                expected: self.arguments.len().to_string(),
                actual: values.len(),
            });
        }
        let bindings = self
            .arguments
            .iter()
            .zip(values)
            .map(|(name, value)| (name.as_str(), Value::Double(*value)));
        let scoped = ScopedContext::new(context, bindings);
        self.body.evaluate(&scoped)?.as_double()
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str(&format!("f({})(", ListDisplay(&self.arguments, ",")));
        let scope = session.shadowing(&self.arguments);
        self.body.render(out, &scope, path, Enclosing::None)?;
        out.push(')');
        Ok(())
    }
}

impl Display for LambdaFunctionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .body
            .to_string_with(&SerializationContext::default().shadowing(&self.arguments))
            .map_err(|_| fmt::Error)?;
        write!(f, "f({})({text})", ListDisplay(&self.arguments, ","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExpressionNode;
    use crate::context::MapContext;
    use crate::prelude::*;
    use crate::tensor::Tensor;
    use crate::typechecking::MapTypeContext;

    fn eval(node: &NodeRef) -> f64 {
        node.evaluate(&MapContext::default()).unwrap().as_double().unwrap()
    }

    #[test]
    fn table_is_in_variant_order() {
        for function in Function::ALL {
            assert_eq!(Function::from_name(function.name()), Some(function));
        }
        assert_eq!(Function::from_name("isNan"), Some(Function::IsNan));
        assert_eq!(Function::Atan2.arity(), 2);
        assert_eq!(Function::Sqrt.arity(), 1);
        assert_eq!(Function::from_name("nosuch"), None);
    }

    #[test]
    fn scalar_functions() {
        assert_eq!(eval(&func("max", vec![num(1.0), num(3.0)])), 3.0);
        assert_eq!(eval(&func("relu", vec![num(-2.0)])), 0.0);
        assert_eq!(eval(&func("sigmoid", vec![num(0.0)])), 0.5);
        assert_eq!(eval(&func("square", vec![num(3.0)])), 9.0);
        assert_eq!(eval(&func("sign", vec![num(-0.5)])), -1.0);
        assert_eq!(eval(&func("bit", vec![num(-128.0), num(7.0)])), 1.0);
        assert_eq!(eval(&func("bit", vec![num(5.0), num(1.0)])), 0.0);
        assert_eq!(eval(&func("hamming", vec![num(0.0), num(-1.0)])), 8.0);
        assert_eq!(eval(&func("ldexp", vec![num(3.0), num(2.0)])), 12.0);
        assert_eq!(eval(&func("isNan", vec![num(f64::NAN)])), 1.0);
        assert!((eval(&func("erf", vec![num(1.0)])) - 0.8427007929).abs() < 1e-6);
        assert!(eval(&func("erf", vec![num(0.0)])).abs() < 1e-6);
    }

    #[test]
    fn arity_is_fixed() {
        assert!(matches!(
            FunctionNode::new(Function::Cos, vec![num(1.0), num(2.0)]),
            Err(Error::Arity { kind: "cos", actual: 2, .. })
        ));
        let node = func("atan2", vec![num(1.0), num(2.0)]);
        assert_eq!(node.to_string(), "atan2(1.0, 2.0)");
        assert!(node.with_children(vec![num(1.0)]).is_err());
    }

    #[test]
    fn functions_on_tensors() {
        let t = Tensor::dense("tensor(x[3])".parse().unwrap(), &[-1.0, 0.0, 2.0]).unwrap();
        let context = MapContext::default().with("t", Value::tensor(t));
        let mapped = func("relu", vec![ident("t")]).evaluate(&context).unwrap();
        let expected = Tensor::dense("tensor(x[3])".parse().unwrap(), &[0.0, 0.0, 2.0]).unwrap();
        assert_eq!(mapped, Value::tensor(expected));
        let joined = func("max", vec![ident("t"), num(1.0)]).evaluate(&context).unwrap();
        let expected = Tensor::dense("tensor(x[3])".parse().unwrap(), &[1.0, 1.0, 2.0]).unwrap();
        assert_eq!(joined, Value::tensor(expected));

        let types = MapTypeContext::new().with_type("t", "tensor<int8>(x[3])".parse().unwrap());
        assert_eq!(
            func("cos", vec![ident("t")]).type_of(&types).unwrap(),
            "tensor<float>(x[3])".parse::<TensorType>().unwrap()
        );
    }

    #[test]
    fn lambdas_bind_their_arguments() {
        let f = lambda(["x", "y"], op(ident("x"), "*", ident("y")));
        assert_eq!(f.to_string(), "f(x,y)(x * y)");
        let context = MapContext::default().with("x", Value::Double(100.0));
        assert_eq!(f.apply(&[3.0, 4.0], &context).unwrap(), 12.0);
        assert!(f.apply(&[3.0], &context).is_err());

        let node = ExpressionNode::Lambda(f).into_ref();
        assert!(matches!(
            node.evaluate(&context),
            Err(Error::Unsupported { operation: "direct evaluation", .. })
        ));
    }

    #[test]
    fn lambdas_may_refer_to_the_enclosing_context() {
        let f = lambda(["x"], op(ident("x"), "+", ident("offset")));
        let context = MapContext::default().with("offset", Value::Double(0.5));
        assert_eq!(f.apply(&[1.0], &context).unwrap(), 1.5);
        let types = MapTypeContext::new().with_type("offset", TensorType::empty());
        assert!(f.check_scalar(&types).is_ok());
        let tensor_types =
            MapTypeContext::new().with_type("offset", "tensor(x[2])".parse().unwrap());
        assert!(f.check_scalar(&tensor_types).is_err());
    }
}
