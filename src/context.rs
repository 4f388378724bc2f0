//! Contexts supplying the values of references during evaluation.
use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Arguments, Reference};
use crate::serialize::ExpressionFunction;
use crate::util::IndexMap;
use crate::value::Value;
use crate::{Error, NotFoundError};

/// Resolves references while evaluating an expression.
pub trait EvaluationContext {
    /// The value of an identifier.
    fn get(&self, name: &str) -> Result<Value, Error>;

    /// The value of a reference with arguments and/or an output. Argument
    /// expressions are evaluated in `scope`, the innermost context of the caller.
    ///
    /// By default, the reference is looked up by its canonical text.
    fn get_with(
        &self,
        name: &str,
        arguments: &Arguments,
        output: Option<&str>,
        _scope: &dyn EvaluationContext,
    ) -> Result<Value, Error> {
        if arguments.is_empty() && output.is_none() {
            return self.get(name);
        }
        let reference =
            Reference::new(name, arguments.expressions().to_vec(), output.map(str::to_owned));
        self.get(&reference.to_string())
    }
}

/// A context of named values and invocable functions.
///
/// Values are keyed by canonical reference text, so features with arguments are
/// bound as e.g. `attribute(foo)`.
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    bindings: IndexMap<String, Value>,
    functions: Rc<IndexMap<String, ExpressionFunction>>,
    /// The functions being invoked, by name, with the text of each call.
    calls: RefCell<Vec<(String, String)>>,
}

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(name, value);
        self
    }

    pub fn with_function(mut self, function: ExpressionFunction) -> Self {
        Rc::make_mut(&mut self.functions).insert(function.name().to_owned(), function);
        self
    }

    pub fn bindings(&self) -> &IndexMap<String, Value> {
        &self.bindings
    }

    fn invoke(
        &self,
        function: &ExpressionFunction,
        arguments: &Arguments,
        scope: &dyn EvaluationContext,
    ) -> Result<Value, Error> {
        let call = format!("{}{}", function.name(), arguments);
        if self.calls.borrow().iter().any(|(name, _)| name == function.name()) {
            let mut path: Vec<String> =
                self.calls.borrow().iter().map(|(_, call)| call.clone()).collect();
            path.push(call);
            return Err(Error::Cycle { path });
        }
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments.expressions() {
            values.push(argument.evaluate(scope)?);
        }
        log::trace!("Invoking {call}");
        self.calls.borrow_mut().push((function.name().to_owned(), call));
        let bindings = function.arguments().iter().map(String::as_str).zip(values);
        let result = function.body().evaluate(&ScopedContext::new(self, bindings));
        self.calls.borrow_mut().pop();
        result
    }
}

impl EvaluationContext for MapContext {
    fn get(&self, name: &str) -> Result<Value, Error> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        match self.functions.get(name) {
            Some(function) if function.arguments().is_empty() => {
                self.invoke(function, &Arguments::default(), self)
            }
            _ => Err(NotFoundError(format!("No value for '{name}'")).into()),
        }
    }

    fn get_with(
        &self,
        name: &str,
        arguments: &Arguments,
        output: Option<&str>,
        scope: &dyn EvaluationContext,
    ) -> Result<Value, Error> {
        if output.is_none() {
            if let Some(function) = self.functions.get(name) {
                if function.arguments().len() == arguments.len() {
                    return self.invoke(function, arguments, scope);
                }
            }
        }
        let reference =
            Reference::new(name, arguments.expressions().to_vec(), output.map(str::to_owned));
        self.get(&reference.to_string())
    }
}

/// Binds names (lambda arguments, generated dimensions, function parameters)
/// on top of a parent context.
pub struct ScopedContext<'a> {
    parent: &'a dyn EvaluationContext,
    bindings: IndexMap<String, Value>,
}

impl<'a> ScopedContext<'a> {
    pub fn new<S: Into<String>>(
        parent: &'a dyn EvaluationContext,
        bindings: impl IntoIterator<Item = (S, Value)>,
    ) -> Self {
        Self {
            parent,
            bindings: bindings.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }
}

impl EvaluationContext for ScopedContext<'_> {
    fn get(&self, name: &str) -> Result<Value, Error> {
        match self.bindings.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(name),
        }
    }

    fn get_with(
        &self,
        name: &str,
        arguments: &Arguments,
        output: Option<&str>,
        scope: &dyn EvaluationContext,
    ) -> Result<Value, Error> {
        self.parent.get_with(name, arguments, output, scope)
    }
}
