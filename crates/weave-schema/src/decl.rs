use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weave_core::{db::SessionOptions, model::FieldKind};

///
/// SchemaDecl
///
/// Root of a `weave.toml` document: engine switches plus model
/// declarations keyed by model name.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDecl {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub models: BTreeMap<String, ModelDecl>,
}

///
/// EngineConfig
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Key resolved record sets by primary key.
    pub indexed: bool,
    /// Run required-field validation on save.
    pub validate_on_save: bool,
    /// Emit per-call debug logs.
    pub debug: bool,
}

impl EngineConfig {
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            indexed: self.indexed,
            validate_on_save: self.validate_on_save,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            indexed: true,
            validate_on_save: true,
            debug: false,
        }
    }
}

///
/// ModelDecl
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDecl {
    /// Storage name; defaults to the snake_case model name.
    pub source: Option<String>,

    /// Primary key field; defaults to `id`.
    pub key: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDecl>,

    #[serde(default)]
    pub relations: BTreeMap<String, RelationDecl>,
}

///
/// FieldDecl
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    pub name: String,

    #[serde(default)]
    pub kind: FieldKind,

    #[serde(default)]
    pub required: bool,
}

///
/// RelationKindDecl
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindDecl {
    ToOne,
    ToMany,
    ToManyThrough,
}

///
/// RelationDecl
///
/// Key fields left unset follow naming conventions:
/// to_one → `local_key = <target singular>_id`, `foreign_key = <target key>`
/// to_many → `local_key = <own key>`, `foreign_key = <own singular>_id`
/// to_many_through → `join = <sorted plural names>`,
///   `join_local = <own singular>_id`, `join_remote = <target singular>_id`
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDecl {
    pub kind: RelationKindDecl,

    /// Target model; defaults to the relation name.
    pub target: Option<String>,

    pub local_key: Option<String>,
    pub foreign_key: Option<String>,

    pub join: Option<String>,
    pub join_local: Option<String>,
    pub join_remote: Option<String>,
}
