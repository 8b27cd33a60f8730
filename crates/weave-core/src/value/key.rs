use crate::value::Value;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// KeyError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("null cannot be used as a key")]
    Null,

    #[error("value is not key-compatible: {0}")]
    Incompatible(String),
}

///
/// Key
///
/// Canonical, totally ordered primary/foreign key.
///
/// Non-negative integers always normalize to `Int` so that a foreign key
/// read back as unsigned still equals the primary key it references.
/// `Uint` only holds values above `i64::MAX`.
///

#[derive(
    Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(untagged)]
pub enum Key {
    #[display("{_0}")]
    Int(i64),
    #[display("{_0}")]
    Uint(u64),
    #[display("{_0}")]
    Text(String),
}

impl Key {
    /// Convert a field value into its canonical key form.
    pub fn try_from_value(value: &Value) -> Result<Self, KeyError> {
        match value {
            Value::Int(v) => Ok(Self::Int(*v)),
            Value::Uint(v) => Ok(i64::try_from(*v).map_or(Self::Uint(*v), Self::Int)),
            Value::Text(v) => Ok(Self::Text(v.clone())),
            Value::Null => Err(KeyError::Null),
            other => Err(KeyError::Incompatible(format!("{other:?}"))),
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Int(v) => Value::Int(v),
            Self::Uint(v) => Value::Uint(v),
            Self::Text(v) => Value::Text(v),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl TryFrom<&Value> for Key {
    type Error = KeyError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::try_from_value(value)
    }
}
