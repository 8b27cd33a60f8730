mod memory;

use crate::{
    db::query::Query,
    model::{JoinDef, ModelDef},
    value::{Key, Value},
};
use derive_more::Display;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

// re-exports
pub use memory::{MemoryStorage, StorageCall};

///
/// Row
/// Plain field map exchanged with storage.
///

pub type Row = BTreeMap<String, Value>;

///
/// JoinRow
///
/// One link row of a join model, oriented by the `JoinDef` it was read
/// through: `local` references the owner, `remote` the target.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JoinRow {
    pub local: Key,
    pub remote: Key,
}

///
/// StorageOp
/// Storage call kinds, used for diagnostics and fault injection.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StorageOp {
    #[display("fetch")]
    Fetch,
    #[display("insert")]
    Insert,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
    #[display("fetch_join_rows")]
    FetchJoinRows,
    #[display("insert_join_row")]
    InsertJoinRow,
    #[display("delete_join_row")]
    DeleteJoinRow,
    #[display("begin")]
    Begin,
    #[display("commit")]
    Commit,
    #[display("rollback")]
    Rollback,
}

///
/// StorageError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StorageError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

///
/// StorageConnection
///
/// Opaque collaborator that executes model-level reads and writes.
///
/// Connections interpret `Query` natively (conditions, projection, order,
/// paging, grouping). Every key-membership filter the engine needs is
/// appended to `Query::conditions` as a `Predicate::In`.
///

pub trait StorageConnection {
    /// Rows of `model` matching `query`.
    fn fetch(&self, model: &ModelDef, query: &Query) -> Result<Vec<Row>, StorageError>;

    /// Insert a row and return its primary key (assigned if absent).
    fn insert(&self, model: &ModelDef, fields: &Row) -> Result<Key, StorageError>;

    /// Update the row with `key`; `false` when no such row exists.
    fn update(&self, model: &ModelDef, key: &Key, fields: &Row) -> Result<bool, StorageError>;

    /// Delete the row with `key`; `false` when no such row exists.
    fn delete(&self, model: &ModelDef, key: &Key) -> Result<bool, StorageError>;

    /// Join rows whose `join.local_key` is one of `locals`.
    fn fetch_join_rows(
        &self,
        join: &JoinDef,
        locals: &[Key],
    ) -> Result<Vec<JoinRow>, StorageError>;

    /// Link `local` to `remote`; `false` when the link already exists.
    fn insert_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError>;

    /// Unlink `local` from `remote`; `false` when no link existed.
    fn delete_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError>;
}

///
/// TransactionScope
///
/// Optional capability: connections that can group writes atomically.
/// Nesting is connection-defined; the engine only opens one scope at a time.
///

pub trait TransactionScope {
    fn begin(&self) -> Result<(), StorageError>;
    fn commit(&self) -> Result<(), StorageError>;
    fn rollback(&self) -> Result<(), StorageError>;
}

impl<S: StorageConnection + ?Sized> StorageConnection for &S {
    fn fetch(&self, model: &ModelDef, query: &Query) -> Result<Vec<Row>, StorageError> {
        (**self).fetch(model, query)
    }

    fn insert(&self, model: &ModelDef, fields: &Row) -> Result<Key, StorageError> {
        (**self).insert(model, fields)
    }

    fn update(&self, model: &ModelDef, key: &Key, fields: &Row) -> Result<bool, StorageError> {
        (**self).update(model, key, fields)
    }

    fn delete(&self, model: &ModelDef, key: &Key) -> Result<bool, StorageError> {
        (**self).delete(model, key)
    }

    fn fetch_join_rows(
        &self,
        join: &JoinDef,
        locals: &[Key],
    ) -> Result<Vec<JoinRow>, StorageError> {
        (**self).fetch_join_rows(join, locals)
    }

    fn insert_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        (**self).insert_join_row(join, local, remote)
    }

    fn delete_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        (**self).delete_join_row(join, local, remote)
    }
}
