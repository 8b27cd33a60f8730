use crate::error::Error;
use weave_core::{
    self as core,
    db::{
        CancelToken, EagerLoadSpec, FindMode, FindResult, Query, Record, RecordSet, Row,
        SaveOptions, SaveReport, SessionOptions, StorageConnection, TransactionScope,
    },
    model::SchemaCatalog,
    obs::MetricsSink,
    validate::RecordValidator,
};

///
/// DbSession
/// Public facade session wrapper for reads, cascading saves, and deletes.
/// Converts core errors into `weave::Error`.
///

pub struct DbSession<'a, S: ?Sized> {
    inner: core::db::DbSession<'a, S>,
}

impl<'a, S> DbSession<'a, S>
where
    S: StorageConnection + ?Sized,
{
    /// Create a new facade session over one catalog and one connection.
    #[must_use]
    pub fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        Self {
            inner: core::db::DbSession::new(catalog, storage),
        }
    }

    /// Enable debug logging for subsequent operations in this session.
    ///
    /// Debug contract:
    /// - Debug is session-scoped only; executors do not expose independent toggles.
    /// - Reads narrate every fetch (model, condition count, rows).
    /// - Saves narrate writes and join-row deltas per relation.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.inner = self.inner.debug();
        self
    }

    /// Override the metrics sink for operations executed through this session.
    #[must_use]
    pub fn metrics_sink(mut self, sink: &'a dyn MetricsSink) -> Self {
        self.inner = self.inner.metrics_sink(sink);
        self
    }

    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.inner = self.inner.options(options);
        self
    }

    /// Observe `token` between storage calls.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.inner = self.inner.cancel_token(token);
        self
    }

    /// Register a save-time validator for one model.
    #[must_use]
    pub fn validator(mut self, model: &str, validator: impl RecordValidator + 'static) -> Self {
        self.inner = self.inner.validator(model, validator);
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &'a SchemaCatalog {
        self.inner.catalog()
    }

    //
    // Reads
    //

    /// Root records of `model` matching `query`, with `with` eager-loaded.
    pub fn find(
        &self,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<RecordSet, Error> {
        Ok(self.inner.find(model, query, with)?)
    }

    pub fn find_first(
        &self,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<Option<Record>, Error> {
        Ok(self.inner.find_first(model, query, with)?)
    }

    pub fn count(&self, model: &str, query: &Query) -> Result<u64, Error> {
        Ok(self.inner.count(model, query)?)
    }

    pub fn find_mode(
        &self,
        mode: FindMode,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<FindResult, Error> {
        Ok(self.inner.find_mode(mode, model, query, with)?)
    }

    //
    // Writes
    //

    /// Persist `record` (and its cascade); `true` only when every node
    /// reached was written.
    ///
    /// Partial failures are logged by the engine; use [`Self::save_report`]
    /// to inspect them.
    pub fn save(&self, record: &mut Record, options: &SaveOptions) -> Result<bool, Error> {
        let report = self.save_report(record, options)?;
        if report.is_cancelled() {
            return Err(core::error::InternalError::cancelled().into());
        }

        Ok(report.is_success())
    }

    /// Persist `record` and return the per-node report.
    pub fn save_report(
        &self,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<SaveReport, Error> {
        Ok(self.inner.save(record, options)?)
    }

    pub fn save_all(
        &self,
        set: &mut RecordSet,
        options: &SaveOptions,
    ) -> Result<Vec<SaveReport>, Error> {
        Ok(self.inner.save_all(set, options)?)
    }

    pub fn delete(&self, record: &mut Record) -> Result<bool, Error> {
        Ok(self.inner.delete(record)?)
    }

    pub fn remove(&self, model: &str, query: &Query) -> Result<u64, Error> {
        Ok(self.inner.remove(model, query)?)
    }

    pub fn update_all(&self, model: &str, changes: &Row, query: &Query) -> Result<u64, Error> {
        Ok(self.inner.update_all(model, changes, query)?)
    }
}

impl<S> DbSession<'_, S>
where
    S: StorageConnection + TransactionScope + ?Sized,
{
    /// Save inside one storage transaction; see
    /// [`weave_core::db::DbSession::save_atomic`].
    pub fn save_atomic(
        &self,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<SaveReport, Error> {
        Ok(self.inner.save_atomic(record, options)?)
    }
}
