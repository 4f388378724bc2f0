use crate::ast::NodeRef;
use crate::value::Value;
use crate::Error;

/// A constant value. If the constant was parsed from text, the original
/// text is kept and rendered instead of the value.
#[derive(Debug, Clone)]
pub struct ConstantNode {
    value: Value,
    source_image: Option<String>,
}

impl ConstantNode {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            source_image: None,
        }
    }

    pub fn with_source_image(value: impl Into<Value>, source_image: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source_image: Some(source_image.into()),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn render(&self, out: &mut String) {
        match &self.source_image {
            Some(image) => out.push_str(image),
            None => out.push_str(&self.value.to_string()),
        }
    }
}

/// An opaque name produced while parsing, e.g. the aggregator of a `reduce`
/// before it is attached to its node. It has no type and no value.
#[derive(Debug, Clone)]
pub struct NameNode {
    name: String,
}

impl NameNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            operation,
            node: self.name.clone(),
        }
    }
}

/// An expression in parentheses.
#[derive(Debug, Clone)]
pub struct EmbracedNode {
    value: NodeRef,
}

impl EmbracedNode {
    pub fn new(value: NodeRef) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &NodeRef {
        &self.value
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.value.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct NegativeNode {
    value: NodeRef,
}

impl NegativeNode {
    pub fn new(value: NodeRef) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &NodeRef {
        &self.value
    }

    pub fn children(&self) -> Vec<NodeRef> {
        vec![self.value.clone()]
    }
}
