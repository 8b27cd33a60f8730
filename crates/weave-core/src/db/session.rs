use crate::{
    db::{
        executor::{
            CancelToken, MutationExecutor, PersistenceWalker, QueryResolver, SaveOptions,
            SaveOutcome, SaveReport,
        },
        query::{EagerLoadPlan, EagerLoadSpec, FindMode, Query},
        record::{Record, RecordSet},
        storage::{Row, StorageConnection, StorageOp, TransactionScope},
    },
    error::InternalError,
    model::SchemaCatalog,
    obs::sink::{ExecKind, MetricsSink, Span, with_metrics_sink},
    validate::{RecordValidator, ValidatorSet},
};

///
/// SessionOptions
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    /// Key record sets by primary key.
    pub indexed: bool,
    /// Run the built-in required-field validator on save.
    pub validate_on_save: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            indexed: true,
            validate_on_save: true,
        }
    }
}

///
/// FindResult
///

#[derive(Clone, Debug, PartialEq)]
pub enum FindResult {
    All(RecordSet),
    First(Option<Record>),
    Count(u64),
}

///
/// DbSession
///
/// Session-scoped handle over one catalog and one storage connection,
/// with policy (debug, metrics, cancellation, validators) and execution
/// routing.
///

pub struct DbSession<'a, S: ?Sized> {
    catalog: &'a SchemaCatalog,
    storage: &'a S,
    options: SessionOptions,
    debug: bool,
    metrics: Option<&'a dyn MetricsSink>,
    cancel: Option<CancelToken>,
    validators: ValidatorSet,
}

impl<'a, S> DbSession<'a, S>
where
    S: StorageConnection + ?Sized,
{
    #[must_use]
    pub fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        let options = SessionOptions::default();

        Self {
            catalog,
            storage,
            options,
            debug: false,
            metrics: None,
            cancel: None,
            validators: ValidatorSet::new(options.validate_on_save),
        }
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub const fn metrics_sink(mut self, sink: &'a dyn MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self.validators.set_builtin(options.validate_on_save);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Register a save-time validator for one model.
    #[must_use]
    pub fn validator(mut self, model: &str, validator: impl RecordValidator + 'static) -> Self {
        self.validators.register(model, Box::new(validator));
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    fn with_metrics<T>(&self, f: impl FnOnce() -> T) -> T {
        if let Some(sink) = self.metrics {
            with_metrics_sink(sink, f)
        } else {
            f()
        }
    }

    fn resolver(&self) -> QueryResolver<'_, S> {
        let resolver = QueryResolver::new(self.catalog, self.storage)
            .indexed(self.options.indexed)
            .debug(self.debug);
        match &self.cancel {
            Some(token) => resolver.cancel_token(token),
            None => resolver,
        }
    }

    fn walker(&self) -> PersistenceWalker<'_, S> {
        let walker = PersistenceWalker::new(self.catalog, self.storage)
            .validators(&self.validators)
            .debug(self.debug);
        match &self.cancel {
            Some(token) => walker.cancel_token(token),
            None => walker,
        }
    }

    fn mutator(&self) -> MutationExecutor<'_, S> {
        let mutator = MutationExecutor::new(self.catalog, self.storage).debug(self.debug);
        match &self.cancel {
            Some(token) => mutator.cancel_token(token),
            None => mutator,
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Root records of `model` matching `query`, with `with` eager-loaded.
    pub fn find(
        &self,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<RecordSet, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Find, model);
            let plan = EagerLoadPlan::compile(self.catalog, model, with)?;
            let set = self.resolver().resolve(query, &plan)?;
            span.set_rows(set.len() as u64);

            Ok(set)
        })
    }

    /// First root record, if any.
    pub fn find_first(
        &self,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<Option<Record>, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Find, model);
            let plan = EagerLoadPlan::compile(self.catalog, model, with)?;
            let first = self.resolver().resolve_first(query, &plan)?;
            span.set_rows(u64::from(first.is_some()));

            Ok(first)
        })
    }

    /// Number of `model` rows matching the conditions of `query`.
    pub fn count(&self, model: &str, query: &Query) -> Result<u64, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let _span = Span::new(ExecKind::Find, model);
            self.resolver().count(model, query)
        })
    }

    /// Dispatch on [`FindMode`].
    pub fn find_mode(
        &self,
        mode: FindMode,
        model: &str,
        query: &Query,
        with: &EagerLoadSpec,
    ) -> Result<FindResult, InternalError> {
        match mode {
            FindMode::All => self.find(model, query, with).map(FindResult::All),
            FindMode::First => self.find_first(model, query, with).map(FindResult::First),
            FindMode::Count => self.count(model, query).map(FindResult::Count),
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Persist `record` and whatever `options` cascades into.
    pub fn save(
        &self,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<SaveReport, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Save, record.model());
            let report = self.walker().save(record, options)?;
            span.set_rows(report.nodes().iter().filter(|n| n.outcome.is_ok()).count() as u64);

            Ok(report)
        })
    }

    /// Save every root record of a set; one report per root, in set order.
    ///
    /// Preflight errors abort before the first root is written.
    pub fn save_all(
        &self,
        set: &mut RecordSet,
        options: &SaveOptions,
    ) -> Result<Vec<SaveReport>, InternalError> {
        let mut reports = Vec::with_capacity(set.len());
        for record in set.iter_mut() {
            let report = self.save(record, options)?;
            let cancelled = report.is_cancelled();
            reports.push(report);
            if cancelled {
                break;
            }
        }
        set.reindex()?;

        Ok(reports)
    }

    /// Delete one persisted record and every join row referencing it.
    pub fn delete(&self, record: &mut Record) -> Result<bool, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Delete, record.model());
            let deleted = self.mutator().delete_record(record)?;
            span.set_rows(u64::from(deleted));

            Ok(deleted)
        })
    }

    /// Delete every `model` row matching `query`; returns rows removed.
    pub fn remove(&self, model: &str, query: &Query) -> Result<u64, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Delete, model);
            let removed = self.mutator().delete_where(model, query)?;
            span.set_rows(removed);

            Ok(removed)
        })
    }

    /// Apply `changes` to every `model` row matching `query`.
    pub fn update_all(
        &self,
        model: &str,
        changes: &Row,
        query: &Query,
    ) -> Result<u64, InternalError> {
        self.with_metrics(|| -> Result<_, InternalError> {
            let mut span = Span::new(ExecKind::Save, model);
            let updated = self.mutator().update_where(model, changes, query)?;
            span.set_rows(updated);

            Ok(updated)
        })
    }
}

impl<S> DbSession<'_, S>
where
    S: StorageConnection + TransactionScope + ?Sized,
{
    /// Save inside one storage transaction: commit only when every node
    /// was written, otherwise roll back.
    ///
    /// The in-memory record graph is not rewound on rollback; keys assigned
    /// during the attempt remain on the records.
    pub fn save_atomic(
        &self,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<SaveReport, InternalError> {
        let model = record.model().to_string();
        self.storage
            .begin()
            .map_err(|err| InternalError::storage(&model, StorageOp::Begin, err))?;

        let report = match self.save(record, options) {
            Ok(report) => report,
            Err(err) => {
                self.storage
                    .rollback()
                    .map_err(|e| InternalError::storage(&model, StorageOp::Rollback, e))?;
                return Err(err);
            }
        };

        if report.outcome() == SaveOutcome::Saved {
            self.storage
                .commit()
                .map_err(|err| InternalError::storage(&model, StorageOp::Commit, err))?;
        } else {
            self.storage
                .rollback()
                .map_err(|err| InternalError::storage(&model, StorageOp::Rollback, err))?;
        }

        Ok(report)
    }
}
