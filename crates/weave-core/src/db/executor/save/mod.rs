mod join_diff;
mod options;
mod report;


use crate::{
    db::{
        executor::{CancelToken, context::Context},
        record::{Record, RelationSlot},
        storage::{Row, StorageConnection, StorageError, StorageOp},
    },
    error::InternalError,
    model::{JoinDef, ModelDef, RelationDef, RelationKind, SchemaCatalog},
    obs::sink::{self, MetricsEvent},
    validate::ValidatorSet,
    value::{Key, Value},
};
use std::collections::BTreeSet;
use tracing::warn;

// re-exports
pub use join_diff::JoinDelta;
pub use options::{Cascade, CascadePaths, SaveOptions};
pub use report::{NodeOutcome, NodeReport, SaveOutcome, SaveReport};

use options::Selection;

///
/// PersistenceWalker
///
/// Writes a record graph in dependency order:
///
/// 1. to-one targets that are still unsaved (their key feeds our foreign key)
/// 2. the record's own fields (insert when unsaved, update otherwise)
/// 3. to-many children, with the new primary key stamped on each
/// 4. through relations, synchronized by diffing stored join rows against
///    the slot's current keys
///
/// A failing node stops its own branch; siblings still run. Failures are
/// collected into the returned [`SaveReport`] rather than raised.
///

pub struct PersistenceWalker<'a, S: ?Sized> {
    ctx: Context<'a, S>,
    validators: Option<&'a ValidatorSet>,
}

impl<'a, S> PersistenceWalker<'a, S>
where
    S: StorageConnection + ?Sized,
{
    #[must_use]
    pub const fn new(catalog: &'a SchemaCatalog, storage: &'a S) -> Self {
        Self {
            ctx: Context::new(catalog, storage),
            validators: None,
        }
    }

    #[must_use]
    pub const fn validators(mut self, validators: &'a ValidatorSet) -> Self {
        self.validators = Some(validators);
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

    /// Persist `record` and whatever `options` cascades into.
    ///
    /// Errors are returned only for problems detected before the first
    /// write: unknown models or relationships, and slots whose shape does
    /// not fit their relation. Everything after that lands in the report.
    pub fn save(
        &self,
        record: &mut Record,
        options: &SaveOptions,
    ) -> Result<SaveReport, InternalError> {
        let selection = Selection::root(&options.cascade);

        // Phase 1: preflight, no writes.
        let model = self.ctx.catalog.model(record.model())?;
        if let Selection::Tree(paths) = selection {
            self.check_paths(&model.name, paths)?;
        }
        self.check_slots(record, selection)?;

        // Phase 2: walk.
        let root = model.name.clone();
        let mut report = SaveReport::new(&root);
        self.save_node(record, selection, &root, &mut report);

        Ok(report)
    }

    fn check_paths(&self, model: &str, paths: &CascadePaths) -> Result<(), InternalError> {
        for (name, child) in &paths.children {
            let relation = self.ctx.catalog.relationship(model, name)?;
            self.check_paths(&relation.target, child)?;
        }

        Ok(())
    }

    fn check_slots(&self, record: &Record, selection: Selection<'_>) -> Result<(), InternalError> {
        for (name, slot) in record.relations() {
            let Some(child_selection) = selection.child(name) else {
                continue;
            };
            let relation = self.ctx.catalog.relationship(record.model(), name)?;

            let children: Vec<&Record> = match (&relation.kind, slot) {
                (RelationKind::ToOne, RelationSlot::One(target)) => vec![target.as_ref()],
                (RelationKind::ToOne, RelationSlot::Cleared)
                | (
                    RelationKind::ToMany | RelationKind::ToManyThrough(_),
                    RelationSlot::Keys(_) | RelationSlot::Cleared,
                ) => Vec::new(),
                (RelationKind::ToMany | RelationKind::ToManyThrough(_), RelationSlot::Many(set)) => {
                    set.iter().collect()
                }
                (kind, _) => {
                    return Err(InternalError::save_invariant(format!(
                        "slot shape does not fit relation: model={} relation={name} kind={kind:?}",
                        record.model()
                    )));
                }
            };

            for child in children {
                if child.model() != relation.target {
                    return Err(InternalError::save_invariant(format!(
                        "slot holds '{}' records but relation targets '{}': model={} relation={name}",
                        child.model(),
                        relation.target,
                        record.model()
                    )));
                }
                self.check_slots(child, child_selection)?;
            }
        }

        Ok(())
    }

    // Returns whether this node's own write succeeded.
    fn save_node(
        &self,
        record: &mut Record,
        selection: Selection<'_>,
        path: &str,
        report: &mut SaveReport,
    ) -> bool {
        if self.ctx.is_cancelled() {
            report.mark_cancelled();
            return false;
        }
        let model = match self.ctx.catalog.model(record.model()) {
            Ok(model) => model,
            Err(err) => return fail(report, path, record, err),
        };

        // Phase 1: to-one dependencies.
        for relation in &model.relations {
            if !matches!(relation.kind, RelationKind::ToOne) {
                continue;
            }
            let Some(child_selection) = selection.child(&relation.name) else {
                continue;
            };
            let child_path = format!("{path}.{}", relation.name);

            let foreign = match record.relation_mut(&relation.name) {
                Some(RelationSlot::One(target)) => {
                    if !target.exists()
                        && !self.save_node(target, child_selection, &child_path, report)
                    {
                        return skip(report, path, record, &child_path);
                    }
                    target.get(relation.child_key_field()).cloned().unwrap_or_default()
                }
                Some(RelationSlot::Cleared) => Value::Null,
                _ => continue,
            };
            if let Err(err) = record.set(relation.parent_key_field(), foreign) {
                return fail(report, path, record, err);
            }
        }

        // Phase 2: own fields.
        if let Err(err) = self.write_own(model, record, path, report) {
            return fail(report, path, record, err);
        }
        if report.is_cancelled() {
            return false;
        }

        // Phase 3: dependents.
        let Some(owner_key) = record.key() else {
            let err = InternalError::save_invariant(format!(
                "record has no primary key after write: model={}",
                model.name
            ));
            return fail(report, path, record, err);
        };
        for relation in &model.relations {
            let Some(child_selection) = selection.child(&relation.name) else {
                continue;
            };
            let Some(slot) = record.relation_mut(&relation.name) else {
                continue;
            };
            let child_path = format!("{path}.{}", relation.name);

            match &relation.kind {
                RelationKind::ToOne => {}
                RelationKind::ToMany => {
                    self.save_children(relation, &owner_key, slot, child_selection, &child_path, report);
                }
                RelationKind::ToManyThrough(join) => {
                    self.sync_through(relation, join, &owner_key, slot, child_selection, &child_path, report);
                }
            }
        }

        true
    }

    fn write_own(
        &self,
        model: &ModelDef,
        record: &mut Record,
        path: &str,
        report: &mut SaveReport,
    ) -> Result<(), InternalError> {
        if let Some(validators) = self.validators {
            validators
                .validate(model, record)
                .map_err(|err| InternalError::validation(&model.name, err))?;
        }

        let outcome = if record.exists() {
            let key = record.key().ok_or_else(|| {
                InternalError::save_invariant(format!(
                    "persisted record has no primary key: model={}",
                    model.name
                ))
            })?;
            if !self.ctx.update(model, &key, record.fields())? {
                return Err(InternalError::storage(
                    &model.name,
                    StorageOp::Update,
                    StorageError::NotFound(format!("{}={key}", model.primary_key)),
                ));
            }
            NodeOutcome::Updated
        } else {
            let key = self.ctx.insert(model, record.fields())?;
            record.mark_persisted(key);
            NodeOutcome::Inserted
        };

        report.push(NodeReport {
            path: path.to_string(),
            model: model.name.clone(),
            key: record.key(),
            outcome,
        });

        Ok(())
    }

    // To-many children: stamp the owner key on each child, then save it.
    fn save_children(
        &self,
        relation: &RelationDef,
        owner_key: &Key,
        slot: &mut RelationSlot,
        selection: Selection<'_>,
        path: &str,
        report: &mut SaveReport,
    ) {
        match slot {
            RelationSlot::Many(set) => {
                for (position, child) in set.iter_mut().enumerate() {
                    let child_path = format!("{path}[{position}]");
                    if let Err(err) = child.set(relation.child_key_field(), owner_key.to_value()) {
                        fail(report, &child_path, child, err);
                        continue;
                    }
                    self.save_node(child, selection, &child_path, report);
                }
                if let Err(err) = set.reindex() {
                    fail_path(report, path, &relation.target, None, err);
                }
            }

            // Re-point existing children at this owner.
            RelationSlot::Keys(keys) => {
                let target = match self.ctx.catalog.model(&relation.target) {
                    Ok(target) => target,
                    Err(err) => {
                        fail_path(report, path, &relation.target, None, err);
                        return;
                    }
                };
                let mut change = Row::new();
                change.insert(relation.child_key_field().to_string(), owner_key.to_value());

                for key in keys.iter() {
                    let child_path = format!("{path}[{key}]");
                    match self.ctx.update(target, key, &change) {
                        Ok(true) => report.push(NodeReport {
                            path: child_path,
                            model: target.name.clone(),
                            key: Some(key.clone()),
                            outcome: NodeOutcome::Updated,
                        }),
                        Ok(false) => {
                            let err = InternalError::storage(
                                &target.name,
                                StorageOp::Update,
                                StorageError::NotFound(format!("{}={key}", target.primary_key)),
                            );
                            fail_path(report, &child_path, &target.name, Some(key.clone()), err);
                        }
                        Err(err) => {
                            fail_path(report, &child_path, &target.name, Some(key.clone()), err);
                        }
                    }
                }
            }

            // Children own the foreign key; an emptied slot does not orphan them.
            RelationSlot::Cleared | RelationSlot::One(_) => {}
        }
    }

    // Through relations: save any child records, then diff link rows.
    #[expect(clippy::too_many_arguments)]
    fn sync_through(
        &self,
        relation: &RelationDef,
        join: &JoinDef,
        owner_key: &Key,
        slot: &mut RelationSlot,
        selection: Selection<'_>,
        path: &str,
        report: &mut SaveReport,
    ) {
        let desired: BTreeSet<Key> = match slot {
            RelationSlot::Many(set) => {
                for (position, child) in set.iter_mut().enumerate() {
                    let child_path = format!("{path}[{position}]");
                    self.save_node(child, selection, &child_path, report);
                }
                if let Err(err) = set.reindex() {
                    fail_path(report, path, &relation.target, None, err);
                }
                // only rows storage holds may be linked
                set.iter()
                    .filter(|child| child.exists())
                    .filter_map(Record::key)
                    .collect()
            }
            RelationSlot::Keys(keys) => keys.iter().cloned().collect(),
            RelationSlot::Cleared => BTreeSet::new(),
            RelationSlot::One(_) => return,
        };
        if report.is_cancelled() || self.ctx.is_cancelled() {
            report.mark_cancelled();
            return;
        }

        let current = match self.ctx.fetch_join_rows(join, std::slice::from_ref(owner_key)) {
            Ok(rows) => rows.into_iter().map(|row| row.remote).collect::<BTreeSet<_>>(),
            Err(err) => {
                fail_path(report, path, &join.model, Some(owner_key.clone()), err);
                return;
            }
        };

        let delta = JoinDelta::diff(&current, &desired);
        let mut applied = (0u64, 0u64);
        let result = self.apply_delta(join, owner_key, &delta, &mut applied);
        let (inserted, removed) = applied;

        report.add_join_delta(inserted, removed);
        sink::record(MetricsEvent::JoinDelta {
            model: &join.model,
            inserts: inserted,
            removes: removed,
        });
        self.ctx.debug_log(format!(
            "sync_through relation={} owner={owner_key} inserted={inserted} removed={removed}",
            relation.name
        ));

        if let Err(err) = result {
            fail_path(report, path, &join.model, Some(owner_key.clone()), err);
        }
    }

    // Deletes first, then inserts; `applied` counts rows actually changed.
    fn apply_delta(
        &self,
        join: &JoinDef,
        owner_key: &Key,
        delta: &JoinDelta,
        applied: &mut (u64, u64),
    ) -> Result<(), InternalError> {
        for remote in &delta.remove {
            if self.ctx.delete_join_row(join, owner_key, remote)? {
                applied.1 += 1;
            }
        }
        for remote in &delta.insert {
            if self.ctx.insert_join_row(join, owner_key, remote)? {
                applied.0 += 1;
            }
        }

        Ok(())
    }
}

fn fail(report: &mut SaveReport, path: &str, record: &Record, err: InternalError) -> bool {
    fail_path(report, path, record.model(), record.key(), err);

    false
}

fn fail_path(
    report: &mut SaveReport,
    path: &str,
    model: &str,
    key: Option<Key>,
    err: InternalError,
) {
    if err.is_cancelled() {
        report.mark_cancelled();
        return;
    }
    warn!(path, model, error = %err, "save node failed");
    sink::record(MetricsEvent::NodeFailed { model });
    report.push(NodeReport {
        path: path.to_string(),
        model: model.to_string(),
        key,
        outcome: NodeOutcome::Failed(err),
    });
}

fn skip(report: &mut SaveReport, path: &str, record: &Record, dependency: &str) -> bool {
    if report.is_cancelled() {
        return false;
    }
    sink::record(MetricsEvent::NodeFailed {
        model: record.model(),
    });
    report.push(NodeReport {
        path: path.to_string(),
        model: record.model().to_string(),
        key: record.key(),
        outcome: NodeOutcome::Skipped(format!("dependency {dependency} failed")),
    });

    false
}
