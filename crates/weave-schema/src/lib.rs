//! Declarative schema for Weave: a TOML document of engine switches and
//! model declarations, validated with accumulated errors and frozen into a
//! runtime [`SchemaCatalog`].
//!
//! ```toml
//! [engine]
//! indexed = true
//!
//! [models.Images]
//! fields = [{ name = "id", kind = "int", required = true }, { name = "gallery_id", kind = "int" }]
//!
//! [models.Images.relations.Tags]
//! kind = "to_many_through"
//! ```

mod build;
pub mod decl;
pub mod error;
mod naming;


use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use weave_core::{error::InternalError, model::SchemaCatalog};

use crate::{
    decl::{EngineConfig, SchemaDecl},
    error::ErrorTree,
};

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Config,
        decl::{EngineConfig, SchemaDecl},
        error::ErrorTree,
    };
}

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("cannot read schema file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    #[error("schema validation failed:\n{0}")]
    Validation(ErrorTree),

    #[error(transparent)]
    Catalog(#[from] InternalError),
}

///
/// Config
/// A loaded schema: engine switches plus the catalog built from the models.
///

#[derive(Debug)]
pub struct Config {
    pub engine: EngineConfig,
    pub catalog: SchemaCatalog,
}

impl Config {
    /// Build from an already-deserialized document.
    pub fn from_decl(decl: &SchemaDecl) -> Result<Self, Error> {
        Ok(Self {
            engine: decl.engine,
            catalog: decl.to_catalog()?,
        })
    }
}

/// Parse and validate a schema document.
pub fn parse(source: &str) -> Result<Config, Error> {
    let decl: SchemaDecl = toml::from_str(source)?;

    Config::from_decl(&decl)
}

/// Read, parse, and validate a schema file.
pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&source)
}
