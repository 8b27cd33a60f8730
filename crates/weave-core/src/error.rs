use crate::{
    db::storage::{StorageError, StorageOp},
    validate::ValidationError,
    value::Key,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct the error raised when an eager-load or cascade path names a
    /// relationship the model does not declare.
    pub fn unknown_relationship(model: &str, relation: &str) -> Self {
        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Plan,
            message: format!("unknown relationship: model={model} relation={relation}"),
            detail: Some(ErrorDetail::UnknownRelationship {
                model: model.to_string(),
                relation: relation.to_string(),
            }),
        }
    }

    /// Construct the error raised when a model name is missing from the catalog.
    pub fn unknown_model(model: &str) -> Self {
        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Schema,
            message: format!("unknown model: {model}"),
            detail: Some(ErrorDetail::UnknownModel {
                model: model.to_string(),
            }),
        }
    }

    /// Construct an indexed record-set key collision.
    pub fn duplicate_key(model: &str, key: &Key) -> Self {
        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Hydrate,
            message: format!("duplicate primary key in indexed record set: model={model} key={key}"),
            detail: Some(ErrorDetail::DuplicateKey {
                model: model.to_string(),
                key: key.clone(),
            }),
        }
    }

    /// Wrap a storage collaborator failure with the failing model and operation.
    pub fn storage(model: &str, op: StorageOp, err: StorageError) -> Self {
        Self {
            class: ErrorClass::Internal,
            origin: ErrorOrigin::Storage,
            message: format!("storage {op} failed: model={model} ({err})"),
            detail: Some(ErrorDetail::Storage {
                model: model.to_string(),
                op,
                source: err,
            }),
        }
    }

    /// Wrap a record validation failure.
    pub fn validation(model: &str, err: ValidationError) -> Self {
        Self {
            class: ErrorClass::Invalid,
            origin: ErrorOrigin::Save,
            message: format!("validation failed: model={model} ({err})"),
            detail: Some(ErrorDetail::Validation(err)),
        }
    }

    /// Construct the outcome of a cooperatively cancelled operation.
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            class: ErrorClass::Cancelled,
            origin: ErrorOrigin::Interface,
            message: "operation cancelled".to_string(),
            detail: Some(ErrorDetail::Cancelled),
        }
    }

    /// Construct a schema-origin invariant violation.
    pub(crate) fn schema_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Schema,
            message.into(),
        )
    }

    /// Construct a query-origin unsupported error.
    pub(crate) fn query_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Query, message.into())
    }

    /// Construct a hydrate-origin invariant violation.
    pub(crate) fn hydrate_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Hydrate,
            message.into(),
        )
    }

    /// Construct a save-origin invariant violation.
    pub(crate) fn save_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Save,
            message.into(),
        )
    }

    #[must_use]
    pub const fn is_unknown_relationship(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::UnknownRelationship { .. }))
    }

    #[must_use]
    pub const fn is_duplicate_key(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::DuplicateKey { .. }))
    }

    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::Storage { .. }))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::Validation(_)))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::Cancelled))
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("unknown relationship '{relation}' on model '{model}'")]
    UnknownRelationship { model: String, relation: String },

    #[error("unknown model '{model}'")]
    UnknownModel { model: String },

    #[error("duplicate key {key} in '{model}'")]
    DuplicateKey { model: String, key: Key },

    #[error("storage {op} on '{model}': {source}")]
    Storage {
        model: String,
        op: StorageOp,
        source: StorageError,
    },

    #[error("{0}")]
    Validation(ValidationError),

    #[error("cancelled")]
    Cancelled,
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    Invalid,
    Unsupported,
    InvariantViolation,
    Internal,
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Invalid => "invalid",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Schema,
    Plan,
    Query,
    Hydrate,
    Storage,
    Save,
    Interface,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Plan => "plan",
            Self::Query => "query",
            Self::Hydrate => "hydrate",
            Self::Storage => "storage",
            Self::Save => "save",
            Self::Interface => "interface",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
