use crate::{
    db::{
        executor::{CancelToken, context::Context},
        query::Query,
        record::Record,
        storage::{Row, StorageConnection},
    },
    error::InternalError,
    model::{ModelDef, SchemaCatalog},
    value::Key,
};

///
/// MutationExecutor
///
/// Set-based writes outside the cascading save: deleting records (with
/// their join rows) and updating every row that matches a query.
///

pub struct MutationExecutor<'a, S: ?Sized> {
    ctx: Context<'a, S>,
}

impl<'a, S> MutationExecutor<'a, S>
where
    S: StorageConnection + ?Sized,
{
    #[must_use]
    pub const fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        Self {
            ctx: Context::new(catalog, storage),
        }
    }

    #[must_use]
    pub const fn debug(mut self, debug: bool) -> Self {
        self.ctx.debug = debug;
        self
    }

    #[must_use]
    pub const fn cancel_token(mut self, token: &'a CancelToken) -> Self {
        self.ctx.cancel = Some(token);
        self
    }

    /// Delete one persisted record and every join row that references it.
    ///
    /// Unsaved records are left alone and report `false`. The record is
    /// marked as no longer existing only when storage removed its row.
    pub fn delete_record(&self, record: &mut Record) -> Result<bool, InternalError> {
        let model = self.ctx.catalog.model(record.model())?;
        let Some(key) = record.key().filter(|_| record.exists()) else {
            return Ok(false);
        };

        let deleted = self.delete_key(model, &key)?;
        if deleted {
            record.mark_deleted();
        }

        Ok(deleted)
    }

    /// Delete every `model` row matching `query`; returns rows removed.
    pub fn delete_where(&self, model: &str, query: &Query) -> Result<u64, InternalError> {
        let model = self.ctx.catalog.model(model)?;
        let mut deleted = 0u64;
        for key in self.matching_keys(model, query)? {
            if self.delete_key(model, &key)? {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Apply `changes` to every `model` row matching `query`; returns rows
    /// updated. Primary keys cannot be changed this way.
    pub fn update_where(
        &self,
        model: &str,
        changes: &Row,
        query: &Query,
    ) -> Result<u64, InternalError> {
        let model = self.ctx.catalog.model(model)?;
        if changes.contains_key(&model.primary_key) {
            return Err(InternalError::save_invariant(format!(
                "bulk update cannot change primary key: model={} field={}",
                model.name, model.primary_key
            )));
        }

        let mut updated = 0u64;
        for key in self.matching_keys(model, query)? {
            if self.ctx.update(model, &key, changes)? {
                updated += 1;
            }
        }

        Ok(updated)
    }

    fn matching_keys(&self, model: &ModelDef, query: &Query) -> Result<Vec<Key>, InternalError> {
        let key_query = Query {
            conditions: query.conditions.clone(),
            order: query.order.clone(),
            limit: query.limit,
            offset: query.offset,
            ..Query::default()
        }
        .select(&model.primary_key);

        Ok(self
            .ctx
            .fetch(model, &key_query)?
            .iter()
            .filter_map(|row| row.get(&model.primary_key)?.as_key())
            .collect())
    }

    fn delete_key(&self, model: &ModelDef, key: &Key) -> Result<bool, InternalError> {
        // Phase 1: unlink from every join that references this model.
        for join in self.ctx.catalog.joins_referencing(&model.name)? {
            for row in self.ctx.fetch_join_rows(&join, std::slice::from_ref(key))? {
                self.ctx.delete_join_row(&join, &row.local, &row.remote)?;
            }
        }

        // Phase 2: the row itself.
        self.ctx.delete(model, key)
    }
}
