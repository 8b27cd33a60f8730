//! Core runtime for Weave: values, the runtime schema catalog, records,
//! eager-load planning, hydration, and nested persistence.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod validate;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// CONSTANTS
///

/// Primary-key field name used when a model does not configure one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, stores, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            query::{Direction, EagerLoadSpec, FindMode, Predicate, Query},
            record::{Record, RecordSet, RelationSlot},
        },
        model::{ModelDef, RelationDef, RelationKind, SchemaCatalog},
        value::{Key, Value},
    };
}
