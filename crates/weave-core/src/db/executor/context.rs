use crate::{
    db::{
        executor::CancelToken,
        query::Query,
        storage::{JoinRow, Row, StorageConnection, StorageOp},
    },
    error::InternalError,
    model::{JoinDef, ModelDef, SchemaCatalog},
    obs::sink::{self, MetricsEvent, WriteKind},
    value::Key,
};
use tracing::debug;

///
/// Context
///
/// Collaborators shared by one executor call: catalog, storage, and the
/// cancellation flag. Every storage call goes through here so that
/// cancellation checks, error wrapping, metrics, and debug logging happen
/// in one place.
///

pub(crate) struct Context<'a, S: ?Sized> {
    pub(crate) catalog: &'a SchemaCatalog,
    pub(crate) storage: &'a S,
    pub(crate) cancel: Option<&'a CancelToken>,
    pub(crate) debug: bool,
}

impl<S: ?Sized> Clone for Context<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Context<'_, S> {}

impl<'a, S> Context<'a, S>
where
    S: StorageConnection + ?Sized,
{
    pub(crate) const fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        Self {
            catalog,
            storage,
            cancel: None,
            debug: false,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), InternalError> {
        if self.is_cancelled() {
            return Err(InternalError::cancelled());
        }

        Ok(())
    }

    pub(crate) fn debug_log(&self, s: impl Into<String>) {
        if self.debug {
            debug!(target: "weave", "{}", s.into());
        }
    }

    pub(crate) fn fetch(&self, model: &ModelDef, query: &Query) -> Result<Vec<Row>, InternalError> {
        self.ensure_live()?;
        let rows = self
            .storage
            .fetch(model, query)
            .map_err(|err| InternalError::storage(&model.name, StorageOp::Fetch, err))?;

        sink::record(MetricsEvent::RowsFetched {
            model: &model.name,
            rows: rows.len() as u64,
        });
        self.debug_log(format!(
            "fetch model={} conditions={} rows={}",
            model.name,
            query.conditions.len(),
            rows.len()
        ));

        Ok(rows)
    }

    pub(crate) fn fetch_join_rows(
        &self,
        join: &JoinDef,
        locals: &[Key],
    ) -> Result<Vec<JoinRow>, InternalError> {
        self.ensure_live()?;
        let rows = self
            .storage
            .fetch_join_rows(join, locals)
            .map_err(|err| InternalError::storage(&join.model, StorageOp::FetchJoinRows, err))?;

        sink::record(MetricsEvent::JoinRowsFetched {
            join: &join.model,
            rows: rows.len() as u64,
        });
        self.debug_log(format!(
            "fetch_join_rows join={} locals={} rows={}",
            join.model,
            locals.len(),
            rows.len()
        ));

        Ok(rows)
    }

    pub(crate) fn insert(&self, model: &ModelDef, row: &Row) -> Result<Key, InternalError> {
        self.ensure_live()?;
        let key = self
            .storage
            .insert(model, row)
            .map_err(|err| InternalError::storage(&model.name, StorageOp::Insert, err))?;

        sink::record(MetricsEvent::RowWrite {
            model: &model.name,
            kind: WriteKind::Insert,
        });
        self.debug_log(format!("insert model={} key={key}", model.name));

        Ok(key)
    }

    pub(crate) fn update(
        &self,
        model: &ModelDef,
        key: &Key,
        row: &Row,
    ) -> Result<bool, InternalError> {
        self.ensure_live()?;
        let found = self
            .storage
            .update(model, key, row)
            .map_err(|err| InternalError::storage(&model.name, StorageOp::Update, err))?;

        if found {
            sink::record(MetricsEvent::RowWrite {
                model: &model.name,
                kind: WriteKind::Update,
            });
        }
        self.debug_log(format!("update model={} key={key} found={found}", model.name));

        Ok(found)
    }

    pub(crate) fn delete(&self, model: &ModelDef, key: &Key) -> Result<bool, InternalError> {
        self.ensure_live()?;
        let found = self
            .storage
            .delete(model, key)
            .map_err(|err| InternalError::storage(&model.name, StorageOp::Delete, err))?;

        if found {
            sink::record(MetricsEvent::RowWrite {
                model: &model.name,
                kind: WriteKind::Delete,
            });
        }
        self.debug_log(format!("delete model={} key={key} found={found}", model.name));

        Ok(found)
    }

    pub(crate) fn insert_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, InternalError> {
        self.ensure_live()?;
        self.storage
            .insert_join_row(join, local, remote)
            .map_err(|err| InternalError::storage(&join.model, StorageOp::InsertJoinRow, err))
    }

    pub(crate) fn delete_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, InternalError> {
        self.ensure_live()?;
        self.storage
            .delete_join_row(join, local, remote)
            .map_err(|err| InternalError::storage(&join.model, StorageOp::DeleteJoinRow, err))
    }
}
