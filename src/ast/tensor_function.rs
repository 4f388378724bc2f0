//! Nodes wrapping the primitive operations of the tensor library. Every tensor
//! argument must evaluate to a tensor; scalars are not promoted here.
use std::fmt::{self, Display};

use crate::ast::{evaluate_tensor, take, Enclosing, ExpressionNode, LambdaFunctionNode, NodeRef};
use crate::context::{EvaluationContext, ScopedContext};
use crate::serialize::SerializationContext;
use crate::tensor::{Aggregator, CellType, Dimension, Label, Tensor, TensorAddress, TensorType};
use crate::typechecking::{BoundTypeContext, TypeContext, TypeError};
use crate::util::ListDisplay;
use crate::value::Value;
use crate::Error;

fn lambda_child(kind: &'static str, node: NodeRef) -> Result<LambdaFunctionNode, Error> {
    match node.as_ref() {
        ExpressionNode::Lambda(lambda) => Ok(lambda.clone()),
        other => Err(Error::Argument(format!(
            "The function argument of {kind} must be a lambda, but got {other}"
        ))),
    }
}

fn lambda_node(lambda: &LambdaFunctionNode) -> NodeRef {
    ExpressionNode::Lambda(lambda.clone()).into_ref()
}

/// Creates a tensor of a bound type by evaluating `body` for every cell, with the
/// dimension names bound to the cell's indices: `tensor(x[2],y[3])(x * 3 + y)`.
#[derive(Debug, Clone)]
pub struct GenerateNode {
    tensor_type: TensorType,
    body: NodeRef,
}

impl GenerateNode {
    pub fn new(tensor_type: TensorType, body: NodeRef) -> Result<Self, Error> {
        if !tensor_type.is_bound() {
            return Err(Error::Argument(format!(
                "A tensor can only be generated for a type where all dimensions are indexed \
                 and bound, but got {tensor_type}"
            )));
        }
        Ok(Self { tensor_type, body })
    }

    pub fn tensor_type(&self) -> &TensorType {
        &self.tensor_type
    }

    pub fn body(&self) -> &NodeRef {
        &self.body
    }

    fn dimension_names(&self) -> Vec<&str> {
        self.tensor_type.dimensions().iter().map(Dimension::name).collect()
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.body.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [body] = take("tensor generate", children)?;
        Self::new(self.tensor_type.clone(), body)
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let body_type = self
            .body
            .type_of(&BoundTypeContext::scalars(context, &self.dimension_names()))?;
        if body_type.rank() > 0 {
            return Err(TypeError::Mismatch {
                expression: self.body.to_string(),
                expected: TensorType::empty().to_string(),
                actual: body_type,
            }
            .into());
        }
        Ok(self.tensor_type.clone())
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let names = self.dimension_names();
        let tensor = Tensor::generate(self.tensor_type.clone(), |indices| {
            let bindings = names
                .iter()
                .zip(indices)
                .map(|(name, index)| (*name, Value::Double(*index as f64)));
            self.body.evaluate(&ScopedContext::new(context, bindings))?.as_double()
        })?;
        Ok(Value::tensor(tensor))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str(&self.tensor_type.to_string());
        out.push('(');
        let scope = session.shadowing(&self.dimension_names());
        self.body.render(out, &scope, path, Enclosing::None)?;
        out.push(')');
        Ok(())
    }
}

/// `map(t, f(x)(...))`: applies a scalar function to every cell.
#[derive(Debug, Clone)]
pub struct MapNode {
    argument: NodeRef,
    function: LambdaFunctionNode,
}

impl MapNode {
    pub fn new(argument: NodeRef, function: LambdaFunctionNode) -> Result<Self, Error> {
        function.expect_arity("map", 1)?;
        Ok(Self { argument, function })
    }

    pub fn argument(&self) -> &NodeRef {
        &self.argument
    }

    pub fn function(&self) -> &LambdaFunctionNode {
        &self.function
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.argument.clone(), lambda_node(&self.function)]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [argument, function] = take("map", children)?;
        Self::new(argument, lambda_child("map", function)?)
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        self.function.check_scalar(context)?;
        Ok(self.argument.type_of(context)?.map_type())
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let tensor = evaluate_tensor(&self.argument, context)?;
        let mapped = tensor.map(|x| self.function.apply(&[x], context))?;
        Ok(Value::tensor(mapped))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("map(");
        self.argument.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.function.render(out, session, path)?;
        out.push(')');
        Ok(())
    }
}

/// `reduce(t, sum, x, y)`: aggregates the cells over the given dimensions,
/// or over all dimensions when none are given.
#[derive(Debug, Clone)]
pub struct ReduceNode {
    argument: NodeRef,
    aggregator: Aggregator,
    dimensions: Vec<String>,
}

impl ReduceNode {
    pub fn new<S: Into<String>>(
        argument: NodeRef,
        aggregator: Aggregator,
        dimensions: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            argument,
            aggregator,
            dimensions: dimensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn argument(&self) -> &NodeRef {
        &self.argument
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.argument.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [argument] = take("reduce", children)?;
        Ok(Self {
            argument,
            ..self.clone()
        })
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        Ok(self.argument.type_of(context)?.reduce_type(&self.dimensions)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let tensor = evaluate_tensor(&self.argument, context)?;
        Ok(Value::tensor(tensor.reduce(self.aggregator, &self.dimensions)?))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("reduce(");
        self.argument.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        out.push_str(self.aggregator.name());
        for dimension in &self.dimensions {
            out.push_str(", ");
            out.push_str(dimension);
        }
        out.push(')');
        Ok(())
    }
}

/// `rename(t, (a, b), (c, d))`: renames dimensions pairwise.
#[derive(Debug, Clone)]
pub struct RenameNode {
    argument: NodeRef,
    from: Vec<String>,
    to: Vec<String>,
}

impl RenameNode {
    pub fn new<S: Into<String>>(
        argument: NodeRef,
        from: impl IntoIterator<Item = S>,
        to: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        let from: Vec<String> = from.into_iter().map(Into::into).collect();
        let to: Vec<String> = to.into_iter().map(Into::into).collect();
        if from.is_empty() {
            return Err(Error::Argument("A rename must rename at least one dimension".to_owned()));
        }
        if from.len() != to.len() {
            return Err(Error::Argument(format!(
                "A rename must have as many 'from' as 'to' dimensions, but got {} and {}",
                from.len(),
                to.len()
            )));
        }
        Ok(Self { argument, from, to })
    }

    pub fn argument(&self) -> &NodeRef {
        &self.argument
    }

    pub fn from(&self) -> &[String] {
        &self.from
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.argument.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [argument] = take("rename", children)?;
        Ok(Self {
            argument,
            ..self.clone()
        })
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        Ok(self.argument.type_of(context)?.rename_type(&self.from, &self.to)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let tensor = evaluate_tensor(&self.argument, context)?;
        Ok(Value::tensor(tensor.rename(&self.from, &self.to)?))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("rename(");
        self.argument.render(out, session, path, Enclosing::None)?;
        if self.from.len() == 1 {
            out.push_str(&format!(", {}, {})", self.from[0], self.to[0]));
        } else {
            out.push_str(&format!(
                ", ({}), ({}))",
                ListDisplay(&self.from, ", "),
                ListDisplay(&self.to, ", ")
            ));
        }
        Ok(())
    }
}

/// `sum(t)` or `sum(t, x)`: shorthand for a sum reduction.
#[derive(Debug, Clone)]
pub struct SumNode {
    argument: NodeRef,
    dimension: Option<String>,
}

impl SumNode {
    pub fn new(argument: NodeRef, dimension: Option<String>) -> Self {
        Self { argument, dimension }
    }

    pub fn argument(&self) -> &NodeRef {
        &self.argument
    }

    pub fn dimension(&self) -> Option<&str> {
        self.dimension.as_deref()
    }

    fn dimensions(&self) -> &[String] {
        self.dimension.as_slice()
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.argument.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [argument] = take("sum", children)?;
        Ok(Self::new(argument, self.dimension.clone()))
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        Ok(self.argument.type_of(context)?.reduce_type(self.dimensions())?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let tensor = evaluate_tensor(&self.argument, context)?;
        Ok(Value::tensor(tensor.reduce(Aggregator::Sum, self.dimensions())?))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("sum(");
        self.argument.render(out, session, path, Enclosing::None)?;
        if let Some(dimension) = &self.dimension {
            out.push_str(", ");
            out.push_str(dimension);
        }
        out.push(')');
        Ok(())
    }
}

/// `join(a, b, f(x,y)(...))`: combines all pairs of cells which agree on the
/// common dimensions.
#[derive(Debug, Clone)]
pub struct JoinNode {
    left: NodeRef,
    right: NodeRef,
    function: LambdaFunctionNode,
}

impl JoinNode {
    pub fn new(left: NodeRef, right: NodeRef, function: LambdaFunctionNode) -> Result<Self, Error> {
        function.expect_arity("join", 2)?;
        Ok(Self {
            left,
            right,
            function,
        })
    }

    pub fn left(&self) -> &NodeRef {
        &self.left
    }

    pub fn right(&self) -> &NodeRef {
        &self.right
    }

    pub fn function(&self) -> &LambdaFunctionNode {
        &self.function
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.left.clone(), self.right.clone(), lambda_node(&self.function)]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [left, right, function] = take("join", children)?;
        Self::new(left, right, lambda_child("join", function)?)
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        self.function.check_scalar(context)?;
        let left = self.left.type_of(context)?;
        Ok(left.join_type(&self.right.type_of(context)?)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let left = evaluate_tensor(&self.left, context)?;
        let right = evaluate_tensor(&self.right, context)?;
        let joined = left.join(&right, |x, y| self.function.apply(&[x, y], context))?;
        Ok(Value::tensor(joined))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("join(");
        self.left.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.right.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.function.render(out, session, path)?;
        out.push(')');
        Ok(())
    }
}

/// `match(a, b)`: the product of the cells present in both of two tensors
/// with the same dimensions.
#[derive(Debug, Clone)]
pub struct MatchNode {
    left: NodeRef,
    right: NodeRef,
}

impl MatchNode {
    pub fn new(left: NodeRef, right: NodeRef) -> Self {
        Self { left, right }
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.left.clone(), self.right.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [left, right] = take("match", children)?;
        Ok(Self::new(left, right))
    }

    fn check_dimensions(&self, left: &TensorType, right: &TensorType) -> Result<(), TypeError> {
        let names = |t: &TensorType| {
            t.dimensions()
                .iter()
                .map(|d| d.name().to_owned())
                .collect::<Vec<_>>()
        };
        if names(left) != names(right) {
            return Err(TypeError::Mismatch {
                expression: self.right.to_string(),
                expected: format!("the dimensions of {left}"),
                actual: right.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let left = self.left.type_of(context)?;
        let right = self.right.type_of(context)?;
        self.check_dimensions(&left, &right)?;
        Ok(left.join_type(&right)?)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let left = evaluate_tensor(&self.left, context)?;
        let right = evaluate_tensor(&self.right, context)?;
        self.check_dimensions(left.tensor_type(), right.tensor_type())?;
        Ok(Value::tensor(left.join(&right, |x, y| Ok(x * y))?))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("match(");
        self.left.render(out, session, path, Enclosing::None)?;
        out.push_str(", ");
        self.right.render(out, session, path, Enclosing::None)?;
        out.push(')');
        Ok(())
    }
}

/// The order in which `unpack_bits` emits the bits of each byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    /// Most significant bit first.
    #[default]
    Big,
    /// Least significant bit first.
    Little,
}

impl Endian {
    pub fn name(self) -> &'static str {
        match self {
            Endian::Big => "big",
            Endian::Little => "little",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "big" => Some(Endian::Big),
            "little" => Some(Endian::Little),
            _ => None,
        }
    }

    /// Bit `i` of `byte` in this order.
    fn bit(self, byte: u8, i: usize) -> u8 {
        match self {
            Endian::Big => (byte >> (7 - i)) & 1,
            Endian::Little => (byte >> i) & 1,
        }
    }
}

impl Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `unpack_bits(t, float, big)`: expands the last indexed dimension of an int8
/// tensor by a factor of 8, producing one cell per bit.
#[derive(Debug, Clone)]
pub struct UnpackBitsNode {
    argument: NodeRef,
    cell_type: CellType,
    endian: Endian,
}

impl UnpackBitsNode {
    pub fn new(argument: NodeRef, cell_type: CellType, endian: Endian) -> Self {
        Self {
            argument,
            cell_type,
            endian,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.argument.clone()]
    }

    pub fn with_children(&self, children: Vec<NodeRef>) -> Result<Self, Error> {
        let [argument] = take("unpack_bits", children)?;
        Ok(Self::new(argument, self.cell_type, self.endian))
    }

    /// The output type for an input of the given type, and the position of the
    /// unpacked dimension.
    fn output_type(&self, input: &TensorType) -> Result<(TensorType, usize), Error> {
        if input.cell_type() != CellType::Int8 {
            return Err(Error::Argument(format!(
                "unpack_bits requires an input with int8 cells, but got {input}"
            )));
        }
        let position = input
            .dimensions()
            .iter()
            .rposition(Dimension::is_indexed)
            .ok_or_else(|| {
                Error::Argument(format!(
                    "unpack_bits requires an input with at least one indexed dimension, \
                     but got {input}"
                ))
            })?;
        let last = &input.dimensions()[position];
        let size = last.size().ok_or_else(|| {
            Error::Argument(format!(
                "unpack_bits requires the last indexed dimension to be bound, but got {input}"
            ))
        })?;
        let mut dimensions = input.dimensions().to_vec();
        dimensions[position] = Dimension::indexed(last.name(), size * 8);
        Ok((TensorType::new(self.cell_type, dimensions)?, position))
    }

    pub(crate) fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        let input = self.argument.type_of(context)?;
        Ok(self.output_type(&input)?.0)
    }

    pub(crate) fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        let input = evaluate_tensor(&self.argument, context)?;
        let (output_type, position) = self.output_type(input.tensor_type())?;
        let mut cells = Vec::with_capacity(input.size() * 8);
        for (address, value) in input.cells() {
            let byte = value as i8 as u8;
            let index = match address[position] {
                Label::Index(index) => index,
                Label::Name(_) => {
                    return Err(Error::Evaluation(format!(
                        "Mapped label in indexed dimension of {}",
                        input.tensor_type()
                    )))
                }
            };
            for i in 0..8 {
                let mut unpacked: TensorAddress = address.clone();
                unpacked[position] = Label::Index(index * 8 + i);
                cells.push((unpacked, f64::from(self.endian.bit(byte, i))));
            }
        }
        Ok(Value::tensor(Tensor::from_cells(output_type, cells)?))
    }

    pub(crate) fn render(
        &self,
        out: &mut String,
        session: &SerializationContext,
        path: &mut Vec<String>,
    ) -> Result<(), Error> {
        out.push_str("unpack_bits(");
        self.argument.render(out, session, path, Enclosing::None)?;
        out.push_str(&format!(", {}, {})", self.cell_type, self.endian));
        Ok(())
    }
}
