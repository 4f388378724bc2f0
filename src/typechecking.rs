use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::Reference;
use crate::serialize::ExpressionFunction;
use crate::tensor::{Dimension, TensorType};
use crate::util::IndexMap;
use crate::{Error, NotFoundError};

/// Resolves the types of references during type inference.
pub trait TypeContext {
    /// Returns the type of the given reference. Argument expressions of the
    /// reference are typed in `scope`, which is the innermost context of the
    /// caller (it may bind lambda parameters this context does not know).
    fn resolve_type(
        &self,
        reference: &Reference,
        scope: &dyn TypeContext,
    ) -> Result<TensorType, Error>;

    fn get_type(&self, reference: &Reference) -> Result<TensorType, Error>
    where
        Self: Sized,
    {
        self.resolve_type(reference, self)
    }
}

/// A type context holding the types of references by their canonical text,
/// and the functions which may be invoked.
#[derive(Debug, Clone, Default)]
pub struct MapTypeContext {
    types: IndexMap<String, TensorType>,
    functions: Rc<IndexMap<String, ExpressionFunction>>,
    resolving: RefCell<Vec<String>>,
}

impl MapTypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type of a reference, given by its canonical text (e.g. `attribute(foo)`).
    pub fn set_type(&mut self, reference: impl Into<String>, tensor_type: TensorType) {
        self.types.insert(reference.into(), tensor_type);
    }

    pub fn with_type(mut self, reference: impl Into<String>, tensor_type: TensorType) -> Self {
        self.set_type(reference, tensor_type);
        self
    }

    pub fn with_function(mut self, function: ExpressionFunction) -> Self {
        Rc::make_mut(&mut self.functions).insert(function.name().to_owned(), function);
        self
    }

    fn function_type(
        &self,
        function: &ExpressionFunction,
        reference: &Reference,
        scope: &dyn TypeContext,
    ) -> Result<TensorType, Error> {
        let call = reference.to_string();
        if self.resolving.borrow().contains(&call) {
            let mut path = self.resolving.borrow().clone();
            path.push(call);
            return Err(Error::Cycle { path });
        }
        let mut bindings = IndexMap::default();
        let arguments = reference.arguments().expressions();
        for (name, argument) in function.arguments().iter().zip(arguments) {
            bindings.insert(name.clone(), argument.type_of(scope)?);
        }
        self.resolving.borrow_mut().push(call);
        let body_type = function.body().type_of(&BoundTypeContext::new(self, bindings));
        self.resolving.borrow_mut().pop();
        let body_type = body_type?;
        match function.return_type() {
            Some(declared)
                if declared.dimensionwise_generalization_with(&body_type).as_ref()
                    != Some(declared) =>
            {
                Err(TypeError::Mismatch {
                    expression: reference.to_string(),
                    expected: declared.to_string(),
                    actual: body_type,
                }
                .into())
            }
            Some(declared) => Ok(declared.clone()),
            None => Ok(body_type),
        }
    }
}

impl TypeContext for MapTypeContext {
    fn resolve_type(
        &self,
        reference: &Reference,
        scope: &dyn TypeContext,
    ) -> Result<TensorType, Error> {
        if let Some(tensor_type) = self.types.get(&reference.to_string()) {
            return Ok(tensor_type.clone());
        }
        match self.functions.get(reference.name()) {
            Some(function)
                if reference.output().is_none()
                    && function.arguments().len() == reference.arguments().len() =>
            {
                self.function_type(function, reference, scope)
            }
            _ => Err(NotFoundError(format!("No type for reference {reference}")).into()),
        }
    }
}

/// Binds names (lambda or function parameters, generated dimensions) to types on top
/// of a parent context.
pub struct BoundTypeContext<'a> {
    parent: &'a dyn TypeContext,
    bindings: IndexMap<String, TensorType>,
}

impl<'a> BoundTypeContext<'a> {
    pub fn new(parent: &'a dyn TypeContext, bindings: IndexMap<String, TensorType>) -> Self {
        Self { parent, bindings }
    }

    /// Binds all the given names to the scalar type.
    pub fn scalars<S: AsRef<str>>(parent: &'a dyn TypeContext, names: &[S]) -> Self {
        let bindings = names
            .iter()
            .map(|name| (name.as_ref().to_owned(), TensorType::empty()))
            .collect();
        Self::new(parent, bindings)
    }
}

impl TypeContext for BoundTypeContext<'_> {
    fn resolve_type(
        &self,
        reference: &Reference,
        scope: &dyn TypeContext,
    ) -> Result<TensorType, Error> {
        if reference.is_identifier() {
            if let Some(tensor_type) = self.bindings.get(reference.name()) {
                return Ok(tensor_type.clone());
            }
        }
        self.parent.resolve_type(reference, scope)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error(
        "{construct} must produce compatible types in all alternatives, but got{}",
        describe_alternatives(.alternatives)
    )]
    NoGeneralization {
        construct: &'static str,
        alternatives: Vec<(String, TensorType)>,
    },
    #[error("Cannot join dimension {left} with dimension {right}")]
    IncompatibleJoin { left: Dimension, right: Dimension },
    #[error("Expected {expression} to have type {expected}, but it has type {actual}")]
    Mismatch {
        expression: String,
        expected: String,
        actual: TensorType,
    },
    #[error("Dimension '{dimension}' is not present in {tensor_type}")]
    UnknownDimension {
        dimension: String,
        tensor_type: TensorType,
    },
    #[error("Dimension '{dimension}' would occur twice when renaming {tensor_type}")]
    DuplicateDimension {
        dimension: String,
        tensor_type: TensorType,
    },
}

fn describe_alternatives(alternatives: &[(String, TensorType)]) -> String {
    alternatives
        .iter()
        .map(|(expression, tensor_type)| format!("\n  {tensor_type}: {expression}"))
        .collect()
}

/// Generalizes the types of alternatives (branches of `if` or `switch`), failing with
/// all of them if there is no common generalization.
pub(crate) fn generalize(
    construct: &'static str,
    alternatives: Vec<(String, TensorType)>,
) -> Result<TensorType, TypeError> {
    let mut result: Option<TensorType> = None;
    for (_, tensor_type) in &alternatives {
        result = match result {
            None => Some(tensor_type.clone()),
            Some(current) => match current.dimensionwise_generalization_with(tensor_type) {
                Some(generalized) => Some(generalized),
                None => {
                    return Err(TypeError::NoGeneralization {
                        construct,
                        alternatives,
                    })
                }
            },
        };
    }
    Ok(result.unwrap_or_else(TensorType::empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn t(s: &str) -> TensorType {
        s.parse().unwrap()
    }

    #[test]
    fn map_context_types_references_by_text() {
        let context = MapTypeContext::new()
            .with_type("query(q)", t("tensor(x[3])"))
            .with_type("attribute(a).count", TensorType::empty());
        let q = Reference::new("query", vec![ident("q")], None);
        assert_eq!(context.get_type(&q).unwrap(), t("tensor(x[3])"));
        let count = Reference::new("attribute", vec![ident("a")], Some("count".to_owned()));
        assert_eq!(context.get_type(&count).unwrap(), TensorType::empty());
        assert!(matches!(
            context.get_type(&Reference::identifier("missing")),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn function_return_types_are_inferred() {
        let double_it = ExpressionFunction::new("double_it", ["v"], op(ident("v"), "*", num(2.0)));
        let context = MapTypeContext::new()
            .with_type("q", t("tensor(x[3])"))
            .with_function(double_it);
        let call = Reference::new("double_it", vec![ident("q")], None);
        assert_eq!(context.get_type(&call).unwrap(), t("tensor(x[3])"));
        let scalar_call = Reference::new("double_it", vec![num(1.0)], None);
        assert_eq!(context.get_type(&scalar_call).unwrap(), TensorType::empty());
    }

    #[test]
    fn recursive_functions_fail_typing() {
        let f = ExpressionFunction::new("f", Vec::<String>::new(), call("g", vec![]));
        let g = ExpressionFunction::new("g", Vec::<String>::new(), call("f", vec![]));
        let context = MapTypeContext::new().with_function(f).with_function(g);
        let result = context.get_type(&Reference::new("f", vec![], None));
        assert!(matches!(result, Err(Error::Cycle { .. })), "{result:?}");
    }

    #[test]
    fn bound_names_shadow_the_parent() {
        let parent = MapTypeContext::new().with_type("x", t("tensor(x[3])"));
        let bound = BoundTypeContext::scalars(&parent, &["x"]);
        assert_eq!(bound.get_type(&Reference::identifier("x")).unwrap(), TensorType::empty());
    }

    #[test]
    fn generalization_of_alternatives() {
        let generalized = generalize(
            "if",
            vec![("a".into(), t("tensor(x[2])")), ("b".into(), t("tensor(x[5])"))],
        )
        .unwrap();
        assert_eq!(generalized, t("tensor(x[])"));
        let error = generalize(
            "if",
            vec![("a".into(), t("tensor(x[2])")), ("b".into(), t("tensor(y{})"))],
        )
        .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("tensor(x[2]): a"), "{message}");
        assert!(message.contains("tensor(y{}): b"), "{message}");
    }
}
