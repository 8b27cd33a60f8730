use crate::{
    db::{
        executor::{
            CancelToken,
            context::Context,
            hydrate::{Correspondence, Hydrator},
        },
        query::{AggregateFn, EagerLoadPlan, PlanNode, Predicate, Query, Selection},
        record::{Record, RecordSet},
        storage::StorageConnection,
    },
    error::InternalError,
    model::{ModelDef, RelationKind, SchemaCatalog},
    value::{Key, Value},
};
use std::collections::BTreeSet;

const COUNT_ALIAS: &str = "count";

///
/// QueryResolver
///
/// Executes a root query plus an eager-load plan.
///
/// One batched fetch per plan node: every parent key of a level goes into
/// a single membership filter. Through relations fetch join rows first,
/// then the target rows they name. Levels are fetched strictly
/// parent-before-child; an empty level issues no further fetches.
///

pub struct QueryResolver<'a, S: ?Sized> {
    ctx: Context<'a, S>,
    indexed: bool,
}

impl<'a, S> QueryResolver<'a, S>
where
    S: StorageConnection + ?Sized,
{
    #[must_use]
    pub const fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        Self {
            ctx: Context::new(catalog, storage),
            indexed: true,
        }
    }

    /// Whether produced record sets are keyed by primary key.
    #[must_use]
    pub const fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
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

    /// Fetch root records matching `query` and hydrate every plan node.
    ///
    /// Aggregate queries return their rows as records and ignore the plan.
    pub fn resolve(&self, query: &Query, plan: &EagerLoadPlan) -> Result<RecordSet, InternalError> {
        let model = self.ctx.catalog.model(&plan.model)?;

        if query.is_aggregate() {
            let rows = self.ctx.fetch(model, query)?;
            let records = rows.into_iter().map(|row| Record::from_row(model, row)).collect();
            return RecordSet::from_records(&model.name, records, false);
        }

        let mut root_query = query.clone();
        if !plan.is_empty() {
            require_key_fields(&mut root_query, model, &plan.nodes);
        }

        let rows = self.ctx.fetch(model, &root_query)?;
        let records = rows.into_iter().map(|row| Record::from_row(model, row)).collect();
        let mut roots = RecordSet::from_records(&model.name, records, self.indexed)?;

        self.ctx.debug_log(format!(
            "resolve model={} roots={} plan_nodes={}",
            model.name,
            roots.len(),
            plan.node_count()
        ));
        self.load_level(&mut roots, &plan.nodes)?;

        Ok(roots)
    }

    /// First root record, if any. Paging beyond the first row is applied
    /// before the plan runs.
    pub fn resolve_first(
        &self,
        query: &Query,
        plan: &EagerLoadPlan,
    ) -> Result<Option<Record>, InternalError> {
        let query = query.clone().limit(1);
        let set = self.resolve(&query, plan)?;

        Ok(set.into_records().into_iter().next())
    }

    /// Number of `model` rows matching the conditions of `query`.
    pub fn count(&self, model: &str, query: &Query) -> Result<u64, InternalError> {
        let model = self.ctx.catalog.model(model)?;
        let count_query = Query {
            conditions: query.conditions.clone(),
            fields: vec![Selection::Aggregate {
                func: AggregateFn::Count,
                field: None,
                alias: COUNT_ALIAS.to_string(),
            }],
            ..Query::default()
        };

        let rows = self.ctx.fetch(model, &count_query)?;
        let count = rows
            .first()
            .and_then(|row| row.get(COUNT_ALIAS))
            .map_or(Ok(0), |value| match value {
                Value::Int(n) => u64::try_from(*n).map_err(|_| negative_count(&model.name)),
                Value::Uint(n) => Ok(*n),
                other => Err(InternalError::query_unsupported(format!(
                    "storage returned a non-integer count for '{}': {other:?}",
                    model.name
                ))),
            })?;

        Ok(count)
    }

    // Load every node of one level, then recurse into the fetched children
    // before splicing them into the parents.
    fn load_level(&self, parents: &mut RecordSet, nodes: &[PlanNode]) -> Result<(), InternalError> {
        if parents.is_empty() {
            return Ok(());
        }

        for node in nodes {
            let (mut children, correspondence) = self.fetch_node(parents, node)?;
            if !node.children.is_empty() {
                self.load_level(&mut children, &node.children)?;
            }

            Hydrator::new(self.indexed).splice(
                parents.iter_mut(),
                &node.relation,
                &children,
                &correspondence,
            )?;
        }

        Ok(())
    }

    fn fetch_node(
        &self,
        parents: &RecordSet,
        node: &PlanNode,
    ) -> Result<(RecordSet, Correspondence), InternalError> {
        let relation = &node.relation;
        let target = self.ctx.catalog.model(&relation.target)?;
        let parent_keys = distinct_keys(parents, relation.parent_key_field());

        let mut query = node.constraints.clone();
        require_key_fields(&mut query, target, &node.children);
        query.ensure_field(relation.child_key_field());

        let (lookup_keys, correspondence) = match &relation.kind {
            RelationKind::ToOne | RelationKind::ToMany => (parent_keys, Correspondence::ForeignKey),
            RelationKind::ToManyThrough(join) => {
                if parent_keys.is_empty() {
                    return Ok((RecordSet::new(&target.name), Correspondence::Join(Vec::new())));
                }
                let join_rows = self.ctx.fetch_join_rows(join, &parent_keys)?;
                let mut seen = BTreeSet::new();
                let remote = join_rows
                    .iter()
                    .filter(|row| seen.insert(row.remote.clone()))
                    .map(|row| row.remote.clone())
                    .collect::<Vec<_>>();

                (remote, Correspondence::Join(join_rows))
            }
        };

        if lookup_keys.is_empty() {
            return Ok((RecordSet::new(&target.name), correspondence));
        }

        query.conditions.push(Predicate::in_(
            relation.child_key_field(),
            lookup_keys.into_iter().map(Key::into_value).collect(),
        ));
        let rows = self.ctx.fetch(target, &query)?;
        let records = rows.into_iter().map(|row| Record::from_row(target, row)).collect();
        let children = RecordSet::from_records(&target.name, records, self.indexed)?;

        Ok((children, correspondence))
    }
}

// Projections must carry the fields that correspondence and deeper levels
// key on.
fn require_key_fields(query: &mut Query, model: &ModelDef, nodes: &[PlanNode]) {
    query.ensure_field(&model.primary_key);
    for node in nodes {
        query.ensure_field(node.relation.parent_key_field());
    }
}

// Distinct non-null key values of `field`, in first-seen order.
fn distinct_keys(records: &RecordSet, field: &str) -> Vec<Key> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .filter_map(|record| record.get(field)?.as_key())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

fn negative_count(model: &str) -> InternalError {
    InternalError::query_unsupported(format!("storage returned a negative count for '{model}'"))
}
