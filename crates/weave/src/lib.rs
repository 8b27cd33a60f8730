//! Weave: eager-load graph resolution and nested persistence over a
//! pluggable storage connection.
//!
//! ## Crate layout
//! - `core`: values, runtime model, records, queries, executors, and observability.
//! - `schema`: TOML schema declarations and catalog validation.
//! - `db`: the public session facade.
//! - `error`: the stable public error taxonomy.
//!
//! ```ignore
//! let weave = Weave::from_toml(SCHEMA)?;
//! let storage = MemoryStorage::new();
//! let session = weave.session(&storage);
//!
//! let galleries = session.find("Galleries", &Query::new(), &"Images.Tags".into())?;
//! ```

pub use weave_core as core;
pub use weave_schema as schema;

pub mod db;
pub mod error;

pub use error::Error;

use std::path::Path;
use weave_core::{db::StorageConnection, model::SchemaCatalog};
use weave_schema::{Config, decl::EngineConfig};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Weave
/// A loaded schema plus engine switches; hands out sessions.
///

#[derive(Debug)]
pub struct Weave {
    config: Config,
}

impl Weave {
    /// Parse and validate a schema document.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        Ok(Self {
            config: weave_schema::parse(source)?,
        })
    }

    /// Read, parse, and validate a schema file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self {
            config: weave_schema::load(path)?,
        })
    }

    #[must_use]
    pub const fn catalog(&self) -> &SchemaCatalog {
        &self.config.catalog
    }

    #[must_use]
    pub const fn engine(&self) -> &EngineConfig {
        &self.config.engine
    }

    /// A session over `storage` with the configured engine switches.
    #[must_use]
    pub fn session<'a, S>(&'a self, storage: &'a S) -> db::DbSession<'a, S>
    where
        S: StorageConnection + ?Sized,
    {
        let session = db::DbSession::new(&self.config.catalog, storage)
            .options(self.config.engine.session_options());

        if self.config.engine.debug {
            session.debug()
        } else {
            session
        }
    }
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Error, Weave,
        db::{DbSession, MemoryStorage, SaveOptions, SaveOutcome},
    };
    pub use weave_core::prelude::*;
}
