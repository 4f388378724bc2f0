//! Canonical serialization of expressions with inlining of function calls.
//!
//! A [`SerializationContext`] is created for one serialization task. While
//! rendering, every call of a known function is expanded into an *instance*:
//! the function body with the argument texts substituted for the parameters.
//! The instance text is cached once per instance name, and the call site is
//! rendered as `rankingExpression(<instance name>)`.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::{render_child, ExpressionNode, NodeRef};
use crate::tensor::TensorType;
use crate::typechecking::{BoundTypeContext, TypeContext};
use crate::util::{fingerprint, IndexMap, ListDisplay, FUNCTION_WRAPPER};
use crate::Error;

/// The rank property holding the text of the named expression or function instance.
pub fn script_property(name: &str) -> String {
    format!("{FUNCTION_WRAPPER}({name}).rankingScript")
}

/// The rank property holding the return type of the named function instance.
pub fn type_property(name: &str) -> String {
    format!("{FUNCTION_WRAPPER}({name}).type")
}

/// The rank property holding the type of an argument of the named function instance.
pub fn argument_type_property(name: &str, argument: &str) -> String {
    format!("{FUNCTION_WRAPPER}({name}).{argument}.type")
}

/// A named function declared for use in expressions.
#[derive(Debug, Clone)]
pub struct ExpressionFunction {
    name: String,
    arguments: Vec<String>,
    body: NodeRef,
    argument_types: IndexMap<String, TensorType>,
    return_type: Option<TensorType>,
}

/// A function body expanded for one set of argument bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub expression: String,
}

impl ExpressionFunction {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        arguments: impl IntoIterator<Item = S>,
        body: NodeRef,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            body,
            argument_types: IndexMap::default(),
            return_type: None,
        }
    }

    pub fn with_argument_type(
        mut self,
        argument: impl Into<String>,
        tensor_type: TensorType,
    ) -> Self {
        self.argument_types.insert(argument.into(), tensor_type);
        self
    }

    pub fn with_return_type(mut self, tensor_type: TensorType) -> Self {
        self.return_type = Some(tensor_type);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn body(&self) -> &NodeRef {
        &self.body
    }

    pub fn argument_types(&self) -> &IndexMap<String, TensorType> {
        &self.argument_types
    }

    pub fn return_type(&self) -> Option<&TensorType> {
        self.return_type.as_ref()
    }

    /// Renders the argument expressions, paired with the parameters they bind.
    fn bind(
        &self,
        session: &SerializationContext,
        arguments: &[NodeRef],
        path: &mut Vec<String>,
    ) -> Result<Vec<(String, String)>, Error> {
        self.arguments
            .iter()
            .zip(arguments)
            .map(|(name, argument)| {
                let text = render_child(argument, session, path)?;
                Ok((name.clone(), binding_text(argument, text)))
            })
            .collect()
    }

    /// `name` when there are no arguments, otherwise `name@` followed by a
    /// fingerprint of the argument texts.
    fn instance_name(&self, bindings: &[(String, String)]) -> String {
        if bindings.is_empty() {
            return self.name.clone();
        }
        let texts: Vec<&str> = bindings.iter().map(|(_, text)| text.as_str()).collect();
        format!("{}@{:016x}", self.name, fingerprint(&texts))
    }

    fn instantiate(
        &self,
        session: &SerializationContext,
        bindings: Vec<(String, String)>,
        path: &mut Vec<String>,
    ) -> Result<Instance, Error> {
        let name = self.instance_name(&bindings);
        let scope = session.with_bindings(bindings);
        let expression = render_child(&self.body, &scope, path)?;
        Ok(Instance { name, expression })
    }

    /// Expands the body of this for the given argument expressions, which are
    /// rendered in `session`.
    pub fn expand(
        &self,
        session: &SerializationContext,
        arguments: &[NodeRef],
        path: &mut Vec<String>,
    ) -> Result<Instance, Error> {
        if arguments.len() != self.arguments.len() {
            return Err(Error::Arity {
                kind: "function call",
                expected: self.arguments.len().to_string(),
                actual: arguments.len(),
            });
        }
        let bindings = self.bind(session, arguments, path)?;
        self.instantiate(session, bindings, path)
    }

    /// The declared return type, or the type of the body when the arguments have
    /// the types of the given expressions (or their declared types).
    fn infer_return_type(
        &self,
        types: &dyn TypeContext,
        arguments: &[NodeRef],
    ) -> Result<TensorType, Error> {
        if let Some(declared) = &self.return_type {
            return Ok(declared.clone());
        }
        let mut bindings = IndexMap::default();
        for (name, argument) in self.arguments.iter().zip(arguments) {
            let tensor_type = match self.argument_types.get(name) {
                Some(declared) => declared.clone(),
                None => argument.type_of(types)?,
            };
            bindings.insert(name.clone(), tensor_type);
        }
        self.body.type_of(&BoundTypeContext::new(types, bindings))
    }
}

/// The text substituted for a parameter. It replaces a bare identifier, so
/// anything but a single non-negative operand is parenthesized.
fn binding_text(argument: &ExpressionNode, text: String) -> String {
    if argument.is_atomic() && !text.starts_with('-') {
        text
    } else {
        format!("({text})")
    }
}

/// What has been produced so far in a serialization task.
#[derive(Debug, Default)]
struct Caches {
    /// Instance name to expression text.
    functions: IndexMap<String, String>,
    /// Rank property to type text.
    types: IndexMap<String, String>,
}

/// Inserts unless the key is present. Conflicting values are reported and dropped.
fn insert_once(map: &mut IndexMap<String, String>, key: String, value: String) {
    match map.get(&key) {
        Some(existing) if *existing != value => {
            log::warn!("Not replacing '{key}' = '{existing}' by '{value}'");
        }
        Some(_) => {}
        None => {
            map.insert(key, value);
        }
    }
}

/// The state of one serialization task: the known functions, the bindings of the
/// current scope, and the caches shared by all scopes of the task.
#[derive(Clone, Default)]
pub struct SerializationContext {
    functions: Rc<IndexMap<String, ExpressionFunction>>,
    bindings: im::HashMap<String, String>,
    caches: Rc<RefCell<Caches>>,
    type_context: Option<Rc<dyn TypeContext>>,
}

impl SerializationContext {
    pub fn new(functions: impl IntoIterator<Item = ExpressionFunction>) -> Self {
        let functions = functions
            .into_iter()
            .map(|function| (function.name.clone(), function))
            .collect();
        Self {
            functions: Rc::new(functions),
            ..Self::default()
        }
    }

    /// Uses `types` to infer the return types of inlined functions which do not
    /// declare one.
    pub fn with_type_context(mut self, types: impl TypeContext + 'static) -> Self {
        self.type_context = Some(Rc::new(types));
        self
    }

    /// A session for a nested scope with the given bindings, sharing functions
    /// and caches with this.
    pub fn with_bindings<K: Into<String>, V: Into<String>>(
        &self,
        bindings: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|(name, text)| (name.into(), text.into()))
                .collect(),
            ..self.clone()
        }
    }

    /// A session for a new top level scope.
    pub fn without_bindings(&self) -> Self {
        Self {
            bindings: im::HashMap::new(),
            ..self.clone()
        }
    }

    /// A session where the given names are unbound, for a scope which binds them itself.
    pub fn shadowing<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let mut bindings = self.bindings.clone();
        for name in names {
            bindings.remove(name.as_ref());
        }
        Self {
            bindings,
            ..self.clone()
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&ExpressionFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &ExpressionFunction> {
        self.functions.values()
    }

    pub fn get_binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// The expression text of every function instance inlined so far, by instance name.
    pub fn serialized_functions(&self) -> IndexMap<String, String> {
        self.caches.borrow().functions.clone()
    }

    /// The declared and inferred types of inlined function instances, by rank property.
    pub fn serialized_types(&self) -> IndexMap<String, String> {
        self.caches.borrow().types.clone()
    }

    pub fn add_function_serialization(&self, name: &str, expression: String) {
        insert_once(&mut self.caches.borrow_mut().functions, name.to_owned(), expression);
    }

    pub fn add_argument_type_serialization(
        &self,
        name: &str,
        argument: &str,
        tensor_type: &TensorType,
    ) {
        insert_once(
            &mut self.caches.borrow_mut().types,
            argument_type_property(name, argument),
            tensor_type.to_string(),
        );
    }

    /// Records the return type of an instance; scalar return types are implied.
    pub fn add_return_type_serialization(&self, name: &str, tensor_type: &TensorType) {
        if tensor_type.rank() == 0 {
            return;
        }
        insert_once(
            &mut self.caches.borrow_mut().types,
            type_property(name),
            tensor_type.to_string(),
        );
    }

    /// Inlines a call of `function`, returning the name of the instance.
    /// The caller has pushed the call onto `path`.
    pub(crate) fn inline(
        &self,
        function: &ExpressionFunction,
        arguments: &[NodeRef],
        path: &mut Vec<String>,
    ) -> Result<String, Error> {
        let bindings = function.bind(self, arguments, path)?;
        let name = function.instance_name(&bindings);
        if self.caches.borrow().functions.contains_key(&name) {
            log::trace!("Reusing serialized instance {name}");
            return Ok(name);
        }
        log::debug!("Inlining {} as {name}", ListDisplay(path, " -> "));
        let instance = function.instantiate(self, bindings, path)?;
        self.add_function_serialization(&instance.name, instance.expression);
        for (argument, tensor_type) in function.argument_types() {
            self.add_argument_type_serialization(&name, argument, tensor_type);
        }
        if let Some(types) = &self.type_context {
            match function.infer_return_type(types.as_ref(), arguments) {
                Ok(return_type) => self.add_return_type_serialization(&name, &return_type),
                Err(error) => log::debug!("No return type for {name}: {error}"),
            }
        } else if let Some(return_type) = function.return_type() {
            self.add_return_type_serialization(&name, return_type);
        }
        Ok(name)
    }
}

impl fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("bindings", &self.bindings)
            .field("caches", &self.caches.borrow())
            .field("has_type_context", &self.type_context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use crate::typechecking::MapTypeContext;

    fn t(s: &str) -> TensorType {
        s.parse().unwrap()
    }

    #[test]
    fn sub_sessions_share_caches_but_not_bindings() {
        let session = SerializationContext::default().with_bindings([("x", "1.0")]);
        let nested = session.with_bindings([("y", "2.0")]);
        assert_eq!(nested.get_binding("x"), None);
        assert_eq!(nested.get_binding("y"), Some("2.0"));
        assert_eq!(session.get_binding("x"), Some("1.0"));
        assert_eq!(session.without_bindings().get_binding("x"), None);
        nested.add_function_serialization("f", "1.0".to_owned());
        assert_eq!(session.serialized_functions().get("f").map(String::as_str), Some("1.0"));
    }

    #[test]
    fn function_serializations_are_written_once() {
        let session = SerializationContext::default();
        session.add_function_serialization("f", "1.0".to_owned());
        session.add_function_serialization("f", "2.0".to_owned());
        assert_eq!(session.serialized_functions().get("f").map(String::as_str), Some("1.0"));
    }

    #[test]
    fn instance_names() {
        let constant = ExpressionFunction::new("c", Vec::<String>::new(), num(1.0));
        let session = SerializationContext::new([constant.clone()]);
        assert_eq!(constant.expand(&session, &[], &mut vec![]).unwrap().name, "c");

        let f = ExpressionFunction::new("f", ["x"], op(ident("x"), "+", num(1.0)));
        let one = f.expand(&session, &[num(1.0)], &mut vec![]).unwrap();
        let again = f.expand(&session, &[num(1.0)], &mut vec![]).unwrap();
        let two = f.expand(&session, &[num(2.0)], &mut vec![]).unwrap();
        assert_eq!(one, again);
        assert_ne!(one.name, two.name);
        assert!(one.name.starts_with("f@") && one.name.len() == "f@".len() + 16, "{}", one.name);
        assert_eq!(one.expression, "1.0 + 1.0");
        assert!(f.expand(&session, &[], &mut vec![]).is_err());
    }

    #[test]
    fn declared_types_are_recorded() {
        let f = ExpressionFunction::new("f", ["q"], op(ident("q"), "*", num(2.0)))
            .with_argument_type("q", t("tensor(x[3])"))
            .with_return_type(t("tensor(x[3])"));
        let g = ExpressionFunction::new("g", ["q"], num(1.0)).with_return_type(TensorType::empty());
        let session = SerializationContext::new([f, g]);
        let text = op(call("f", vec![ident("a")]), "+", call("g", vec![ident("a")]))
            .to_string_with(&session)
            .unwrap();
        let names: Vec<String> = session.serialized_functions().keys().cloned().collect();
        assert_eq!(
            text,
            format!("rankingExpression({}) + rankingExpression({})", names[0], names[1])
        );
        let types = session.serialized_types();
        assert_eq!(types.get(&type_property(&names[0])).map(String::as_str), Some("tensor(x[3])"));
        assert_eq!(
            types.get(&argument_type_property(&names[0], "q")).map(String::as_str),
            Some("tensor(x[3])")
        );
        // scalar return types are not recorded
        assert_eq!(types.get(&type_property(&names[1])), None);
    }

    #[test]
    fn return_types_are_inferred_with_a_type_context() {
        let f = ExpressionFunction::new("f", ["q"], op(ident("q"), "*", num(2.0)));
        let types = MapTypeContext::new().with_type("query(v)", t("tensor(x[3])"));
        let session = SerializationContext::new([f]).with_type_context(types);
        let node = call("f", vec![call("query", vec![ident("v")])]);
        node.to_string_with(&session).unwrap();
        let (name, _) = session.serialized_functions().into_iter().next().unwrap();
        assert_eq!(
            session.serialized_types().get(&type_property(&name)).map(String::as_str),
            Some("tensor(x[3])")
        );
    }
}
