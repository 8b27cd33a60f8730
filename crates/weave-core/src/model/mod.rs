//! Runtime data model definitions.
//!
//! Types in `model` are the *runtime representations* of declared schema:
//! models, their fields, and the relationships between them. They are built
//! once (directly or from `weave-schema` declarations), validated into a
//! [`SchemaCatalog`], and then read-only for planning and persistence.
//!
//! In general:
//! - Schema declarations define *what exists*
//! - `model` defines *what runs*
mod catalog;
mod entity;
mod field;
mod relation;

// re-exports
pub use catalog::{SchemaCatalog, SchemaCatalogBuilder};
pub use entity::ModelDef;
pub use field::{FieldDef, FieldKind};
pub use relation::{JoinDef, RelationDef, RelationKind};
