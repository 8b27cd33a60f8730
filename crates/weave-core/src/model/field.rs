use crate::value::Value;
use serde::{Deserialize, Serialize};

///
/// FieldDef
/// Runtime field metadata used by projection and validation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDef {
    /// Field name as used in predicates, rows, and records.
    pub name: String,
    /// Runtime value shape.
    pub kind: FieldKind,
    /// Whether save-time validation rejects a null or missing value.
    pub required: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

///
/// FieldKind
///
/// Minimal type surface needed by validation.
/// Aligned with `Value` variants; `Any` opts out of shape checks.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Any,
    Bool,
    Int,
    Uint,
    Float,
    Text,
    List,
}

impl FieldKind {
    /// Whether a non-null value has a shape this field accepts.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null)
            | (Self::Any, _)
            | (Self::Bool, Value::Bool(_))
            | (Self::Int | Self::Uint, Value::Int(_) | Value::Uint(_))
            | (Self::Float, Value::Float(_) | Value::Int(_) | Value::Uint(_))
            | (Self::Text, Value::Text(_))
            | (Self::List, Value::List(_)) => true,
            _ => false,
        }
    }
}
