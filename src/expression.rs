use std::fmt::{self, Display};

use crate::ast::NodeRef;
use crate::context::EvaluationContext;
use crate::serialize::{script_property, SerializationContext};
use crate::tensor::TensorType;
use crate::typechecking::TypeContext;
use crate::util::IndexMap;
use crate::value::Value;
use crate::Error;

/// A named expression tree: a ranking expression as it is declared in a rank profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankingExpression {
    name: String,
    root: NodeRef,
}

impl RankingExpression {
    pub fn new(name: impl Into<String>, root: NodeRef) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn with_root(&self, root: NodeRef) -> Self {
        Self::new(self.name.clone(), root)
    }

    pub fn evaluate(&self, context: &dyn EvaluationContext) -> Result<Value, Error> {
        self.root.evaluate(context)
    }

    pub fn type_of(&self, context: &dyn TypeContext) -> Result<TensorType, Error> {
        self.root.type_of(context)
    }

    /// The canonical text of this, inlining the functions known to `session`.
    pub fn to_string_with(&self, session: &SerializationContext) -> Result<String, Error> {
        self.root.to_string_with(session)
    }

    /// The rank properties which describe this expression to a ranking backend:
    /// its own text, the text of every function instance it inlines, and the
    /// declared or inferred types of those instances.
    pub fn rank_properties(
        &self,
        session: &SerializationContext,
    ) -> Result<IndexMap<String, String>, Error> {
        let script = self.to_string_with(session)?;
        let mut properties = IndexMap::default();
        properties.insert(script_property(&self.name), script);
        for (name, expression) in session.serialized_functions() {
            properties.insert(script_property(&name), expression);
        }
        properties.extend(session.serialized_types());
        log::debug!("Serialized {} into {} rank properties", self.name, properties.len());
        Ok(properties)
    }
}

impl Display for RankingExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.root, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;
    use crate::prelude::*;
    use crate::serialize::{type_property, ExpressionFunction};

    #[test]
    fn evaluates_and_prints_its_root() {
        let expression = RankingExpression::new("score", op(ident("x"), "*", num(2.0)));
        assert_eq!(expression.to_string(), "x * 2.0");
        let context = MapContext::new().with("x", 4.0);
        assert_eq!(expression.evaluate(&context).unwrap(), Value::Double(8.0));
    }

    #[test]
    fn rank_properties_include_inlined_functions() {
        let inner = ExpressionFunction::new("inner", ["p"], op(ident("p"), "+", num(1.0)));
        let outer =
            ExpressionFunction::new("outer", Vec::<String>::new(), call("inner", vec![num(2.0)]))
                .with_return_type(TensorType::empty());
        let session = SerializationContext::new([inner, outer]);
        let expression = RankingExpression::new("first", op(ident("outer"), "*", num(3.0)));
        let properties = expression.rank_properties(&session).unwrap();
        let keys: Vec<&str> = properties.keys().map(String::as_str).collect();
        assert_eq!(keys[0], "rankingExpression(first).rankingScript");
        assert_eq!(
            properties["rankingExpression(first).rankingScript"],
            "rankingExpression(outer) * 3.0"
        );
        assert!(properties["rankingExpression(outer).rankingScript"]
            .starts_with("rankingExpression(inner@"));
        assert_eq!(keys.len(), 3);
        assert!(!properties.contains_key(&type_property("outer")));
    }
}
