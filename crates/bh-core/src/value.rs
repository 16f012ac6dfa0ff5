use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

/// A script-local variable declared by a compiled script, in slot order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<Value>,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initializer: None,
        }
    }

    pub fn with_initializer(name: impl Into<String>, initializer: Value) -> Self {
        Self {
            name: name.into(),
            initializer: Some(initializer),
        }
    }

    pub fn initial_value(&self) -> Value {
        self.initializer.clone().unwrap_or_default()
    }
}

/// A live variable instance. Identity matters: watchers hold the same
/// `VariableRef` the interpreter writes through.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

pub type VariableRef = Rc<RefCell<Variable>>;

impl Variable {
    pub fn from_decl(decl: &VariableDecl) -> VariableRef {
        Rc::new(RefCell::new(Self {
            name: decl.name.clone(),
            value: decl.initial_value(),
        }))
    }
}
