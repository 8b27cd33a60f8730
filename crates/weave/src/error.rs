use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use weave_core::{
    db::storage::StorageError,
    error::{ErrorClass, ErrorDetail, ErrorOrigin as CoreErrorOrigin, InternalError},
};

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match &err.detail {
            Some(ErrorDetail::UnknownRelationship { .. }) => {
                ErrorKind::Query(QueryErrorKind::UnknownRelationship)
            }
            Some(ErrorDetail::UnknownModel { .. }) => ErrorKind::Query(QueryErrorKind::UnknownModel),
            Some(ErrorDetail::DuplicateKey { .. }) => ErrorKind::Query(QueryErrorKind::DuplicateKey),
            Some(ErrorDetail::Storage { source, .. }) => ErrorKind::Store(source.into()),
            Some(ErrorDetail::Validation(_)) => ErrorKind::Save(SaveErrorKind::Validation),
            Some(ErrorDetail::Cancelled) => ErrorKind::Cancelled,
            None => match (err.class, err.origin) {
                (_, CoreErrorOrigin::Schema) => ErrorKind::Schema,
                (ErrorClass::Unsupported, _) => ErrorKind::Query(QueryErrorKind::Unsupported),
                (ErrorClass::InvariantViolation, CoreErrorOrigin::Save) => {
                    ErrorKind::Save(SaveErrorKind::Invariant)
                }
                _ => ErrorKind::Internal,
            },
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<weave_schema::Error> for Error {
    fn from(err: weave_schema::Error) -> Self {
        Self::new(ErrorKind::Schema, ErrorOrigin::Schema, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Save(SaveErrorKind),
    Store(StoreErrorKind),

    /// The schema document or catalog is invalid.
    Schema,

    /// The operation observed its cancellation token.
    Cancelled,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// An eager-load or cascade path names an undeclared relationship.
    UnknownRelationship,

    UnknownModel,

    /// Two rows of an indexed result share a primary key.
    DuplicateKey,

    Unsupported,
}

///
/// SaveErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SaveErrorKind {
    /// A record failed its model's validation policy.
    Validation,

    /// The record graph cannot be saved as shaped (mismatched slots,
    /// primary key changes).
    Invariant,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    Unavailable,
    ConstraintViolation,
    NotFound,
    Backend,
}

impl From<&StorageError> for StoreErrorKind {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::Connection(_) => Self::Unavailable,
            StorageError::Constraint(_) => Self::ConstraintViolation,
            StorageError::NotFound(_) => Self::NotFound,
            StorageError::Backend(_) => Self::Backend,
        }
    }
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Schema,
    Plan,
    Query,
    Hydrate,
    Storage,
    Save,
    Interface,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Schema => Self::Schema,
            CoreErrorOrigin::Plan => Self::Plan,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Hydrate => Self::Hydrate,
            CoreErrorOrigin::Storage => Self::Storage,
            CoreErrorOrigin::Save => Self::Save,
            CoreErrorOrigin::Interface => Self::Interface,
        }
    }
}
