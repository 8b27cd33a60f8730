use crate::{
    db::{
        query::{AggregateFn, Direction, OrderBy, Query, Selection, eval},
        storage::{JoinRow, Row, StorageConnection, StorageError, StorageOp, TransactionScope},
    },
    model::{JoinDef, ModelDef},
    value::{Key, Value},
};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeMap,
};

///
/// StorageCall
/// One journaled call against a [`MemoryStorage`].
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageCall {
    pub op: StorageOp,
    /// Model name for row calls, join model for join calls.
    pub target: String,
}

///
/// MemoryStorage
///
/// In-process reference connection. Interprets the full `Query` surface,
/// journals every call, supports one-shot fault injection, and implements
/// [`TransactionScope`] with state snapshots.
///
/// Not thread-safe; share it behind the session that owns it.
///

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RefCell<MemoryState>,
    snapshots: RefCell<Vec<MemoryState>>,
    journal: RefCell<Vec<StorageCall>>,
    faults: RefCell<Vec<Fault>>,
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, BTreeMap<Key, Row>>,
    joins: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug)]
struct Fault {
    op: StorageOp,
    target: String,
    error: StorageError,
    remaining: usize,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    ///
    /// SEEDING
    /// Direct writes that bypass the journal and fault injection.
    ///

    /// Store a row of `model`, assigning a key when the row has none.
    pub fn seed(&self, model: &ModelDef, row: Row) -> Result<Key, StorageError> {
        self.state.borrow_mut().insert(model, &row)
    }

    /// Store a raw join row; extra columns are preserved verbatim.
    pub fn seed_join(&self, join_model: &str, row: Row) {
        self.state
            .borrow_mut()
            .joins
            .entry(join_model.to_string())
            .or_default()
            .push(row);
    }

    ///
    /// INSPECTION
    ///

    /// Rows of a model's source table in key order.
    #[must_use]
    pub fn rows(&self, model: &ModelDef) -> Vec<Row> {
        self.state
            .borrow()
            .tables
            .get(&model.source)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row(&self, model: &ModelDef, key: &Key) -> Option<Row> {
        self.state
            .borrow()
            .tables
            .get(&model.source)
            .and_then(|table| table.get(key).cloned())
    }

    /// Raw rows of a join model in insertion order.
    #[must_use]
    pub fn join_rows(&self, join_model: &str) -> Vec<Row> {
        self.state
            .borrow()
            .joins
            .get(join_model)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made through [`StorageConnection`] so far.
    #[must_use]
    pub fn journal(&self) -> Vec<StorageCall> {
        self.journal.borrow().clone()
    }

    /// Number of journaled calls of `op`.
    #[must_use]
    pub fn calls(&self, op: StorageOp) -> usize {
        self.journal.borrow().iter().filter(|c| c.op == op).count()
    }

    pub fn clear_journal(&self) {
        self.journal.borrow_mut().clear();
    }

    ///
    /// FAULT INJECTION
    ///

    /// Fail the next `times` calls of `op` against `target` (model name or
    /// join model) with `error`.
    pub fn fail_next(&self, op: StorageOp, target: &str, times: usize, error: StorageError) {
        self.faults.borrow_mut().push(Fault {
            op,
            target: target.to_string(),
            error,
            remaining: times,
        });
    }

    // Journal the call, then consume a matching fault if one is armed.
    fn enter(&self, op: StorageOp, target: &str) -> Result<(), StorageError> {
        self.journal.borrow_mut().push(StorageCall {
            op,
            target: target.to_string(),
        });

        let mut faults = self.faults.borrow_mut();
        let Some(fault) = faults
            .iter_mut()
            .find(|f| f.op == op && f.target == target && f.remaining > 0)
        else {
            return Ok(());
        };
        fault.remaining -= 1;
        let error = fault.error.clone();
        faults.retain(|f| f.remaining > 0);

        Err(error)
    }
}

impl StorageConnection for MemoryStorage {
    fn fetch(&self, model: &ModelDef, query: &Query) -> Result<Vec<Row>, StorageError> {
        self.enter(StorageOp::Fetch, &model.name)?;

        let state = self.state.borrow();
        let predicate = query.predicate();
        let matched: Vec<Row> = state
            .tables
            .get(&model.source)
            .map(|table| {
                table
                    .values()
                    .filter(|row| eval(*row, &predicate))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut rows = if query.is_aggregate() {
            aggregate(matched, query)
        } else {
            matched
        };
        sort_rows(&mut rows, &query.order);
        let rows = rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX));

        if query.fields.is_empty() || query.is_aggregate() {
            return Ok(rows.collect());
        }

        Ok(rows.map(|row| project(row, &query.fields)).collect())
    }

    fn insert(&self, model: &ModelDef, fields: &Row) -> Result<Key, StorageError> {
        self.enter(StorageOp::Insert, &model.name)?;
        self.state.borrow_mut().insert(model, fields)
    }

    fn update(&self, model: &ModelDef, key: &Key, fields: &Row) -> Result<bool, StorageError> {
        self.enter(StorageOp::Update, &model.name)?;

        let mut state = self.state.borrow_mut();
        let Some(row) = state
            .tables
            .get_mut(&model.source)
            .and_then(|table| table.get_mut(key))
        else {
            return Ok(false);
        };
        for (name, value) in fields {
            if *name != model.primary_key {
                row.insert(name.clone(), value.clone());
            }
        }

        Ok(true)
    }

    fn delete(&self, model: &ModelDef, key: &Key) -> Result<bool, StorageError> {
        self.enter(StorageOp::Delete, &model.name)?;

        Ok(self
            .state
            .borrow_mut()
            .tables
            .get_mut(&model.source)
            .and_then(|table| table.remove(key))
            .is_some())
    }

    fn fetch_join_rows(
        &self,
        join: &JoinDef,
        locals: &[Key],
    ) -> Result<Vec<JoinRow>, StorageError> {
        self.enter(StorageOp::FetchJoinRows, &join.model)?;

        let state = self.state.borrow();
        let Some(rows) = state.joins.get(&join.model) else {
            return Ok(Vec::new());
        };

        Ok(rows
            .iter()
            .filter_map(|row| join_pair(row, join))
            .filter(|pair| locals.contains(&pair.local))
            .collect())
    }

    fn insert_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        self.enter(StorageOp::InsertJoinRow, &join.model)?;

        let mut state = self.state.borrow_mut();
        let rows = state.joins.entry(join.model.clone()).or_default();
        if rows
            .iter()
            .any(|row| join_pair(row, join).is_some_and(|p| p.local == *local && p.remote == *remote))
        {
            return Ok(false);
        }

        let mut row = Row::new();
        row.insert(join.local_key.clone(), local.to_value());
        row.insert(join.remote_key.clone(), remote.to_value());
        rows.push(row);

        Ok(true)
    }

    fn delete_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        self.enter(StorageOp::DeleteJoinRow, &join.model)?;

        let mut state = self.state.borrow_mut();
        let Some(rows) = state.joins.get_mut(&join.model) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| {
            !join_pair(row, join).is_some_and(|p| p.local == *local && p.remote == *remote)
        });

        Ok(rows.len() != before)
    }
}

impl TransactionScope for MemoryStorage {
    fn begin(&self) -> Result<(), StorageError> {
        self.enter(StorageOp::Begin, "")?;
        let snapshot = self.state.borrow().clone();
        self.snapshots.borrow_mut().push(snapshot);

        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        self.enter(StorageOp::Commit, "")?;
        self.snapshots
            .borrow_mut()
            .pop()
            .map(|_| ())
            .ok_or_else(|| StorageError::Backend("commit without an open transaction".into()))
    }

    fn rollback(&self) -> Result<(), StorageError> {
        self.enter(StorageOp::Rollback, "")?;
        let snapshot = self
            .snapshots
            .borrow_mut()
            .pop()
            .ok_or_else(|| StorageError::Backend("rollback without an open transaction".into()))?;
        *self.state.borrow_mut() = snapshot;

        Ok(())
    }
}

impl MemoryState {
    fn insert(&mut self, model: &ModelDef, fields: &Row) -> Result<Key, StorageError> {
        let table = self.tables.entry(model.source.clone()).or_default();

        let key = match fields.get(&model.primary_key).and_then(Value::as_key) {
            Some(key) => {
                if table.contains_key(&key) {
                    return Err(StorageError::Constraint(format!(
                        "duplicate primary key {key} in '{}'",
                        model.source
                    )));
                }
                key
            }
            None => Key::Int(next_id(table)),
        };

        let mut row = fields.clone();
        row.insert(model.primary_key.clone(), key.to_value());
        table.insert(key.clone(), row);

        Ok(key)
    }
}

// Auto-increment: one past the largest integer key.
fn next_id(table: &BTreeMap<Key, Row>) -> i64 {
    table
        .keys()
        .filter_map(|key| match key {
            Key::Int(v) => Some(*v),
            Key::Uint(_) | Key::Text(_) => None,
        })
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

fn join_pair(row: &Row, join: &JoinDef) -> Option<JoinRow> {
    Some(JoinRow {
        local: row.get(&join.local_key)?.as_key()?,
        remote: row.get(&join.remote_key)?.as_key()?,
    })
}

fn project(mut row: Row, fields: &[Selection]) -> Row {
    fields
        .iter()
        .filter_map(|sel| {
            let name = sel.name();
            row.remove(name).map(|value| (name.to_string(), value))
        })
        .collect()
}

// Nulls and missing values sort first; incomparable values keep input order.
fn sort_rows(rows: &mut [Row], order: &[OrderBy]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for clause in order {
            let left = a.get(&clause.field).unwrap_or(&Value::Null);
            let right = b.get(&clause.field).unwrap_or(&Value::Null);
            let ord = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
            };
            let ord = match clause.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

// Group rows (first-seen order) and materialize one output row per group.
fn aggregate(rows: Vec<Row>, query: &Query) -> Vec<Row> {
    let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
    for row in rows {
        let group_key: Vec<Value> = query
            .group
            .iter()
            .map(|field| row.get(field).cloned().unwrap_or_default())
            .collect();
        match groups.iter_mut().find(|(key, _)| values_eq(key, &group_key)) {
            Some((_, members)) => members.push(row),
            None => groups.push((group_key, vec![row])),
        }
    }
    if groups.is_empty() && query.group.is_empty() {
        // ungrouped aggregates over nothing still yield one row
        groups.push((Vec::new(), Vec::new()));
    }

    groups
        .into_iter()
        .map(|(group_key, members)| {
            let mut out = Row::new();
            for (field, value) in query.group.iter().zip(group_key) {
                out.insert(field.clone(), value);
            }
            for sel in &query.fields {
                match sel {
                    Selection::Field(name) => {
                        if let Some(value) = members.first().and_then(|row| row.get(name)) {
                            out.insert(name.clone(), value.clone());
                        }
                    }
                    Selection::Aggregate { func, field, alias } => {
                        out.insert(alias.clone(), apply_aggregate(*func, field.as_deref(), &members));
                    }
                }
            }
            out
        })
        .collect()
}

fn values_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y || x.loose_eq(y))
}

#[expect(clippy::cast_precision_loss)]
fn apply_aggregate(func: AggregateFn, field: Option<&str>, rows: &[Row]) -> Value {
    let values: Vec<&Value> = match field {
        Some(field) => rows
            .iter()
            .filter_map(|row| row.get(field))
            .filter(|value| !value.is_null())
            .collect(),
        None => Vec::new(),
    };

    match func {
        AggregateFn::Count => {
            let n = if field.is_some() { values.len() } else { rows.len() };
            Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
        }
        AggregateFn::Sum => sum(&values),
        AggregateFn::Avg => {
            if values.is_empty() {
                return Value::Null;
            }
            let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
            Value::Float(total / values.len() as f64)
        }
        AggregateFn::Min => extreme(&values, Ordering::Less),
        AggregateFn::Max => extreme(&values, Ordering::Greater),
    }
}

fn sum(values: &[&Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let all_int = values.iter().all(|v| matches!(v, Value::Int(_)));
    if all_int {
        let total = values
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .fold(0i64, i64::saturating_add);
        return Value::Int(total);
    }

    Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
}

fn extreme(values: &[&Value], wanted: Ordering) -> Value {
    values
        .iter()
        .copied()
        .reduce(|best, next| {
            if next.compare(best) == Some(wanted) {
                next
            } else {
                best
            }
        })
        .cloned()
        .unwrap_or_default()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::Predicate;

    fn images() -> ModelDef {
        ModelDef::new("Images")
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        for (gallery, title) in [(1, "a"), (1, "b"), (2, "c"), (2, "d"), (2, "e")] {
            storage
                .seed(
                    &images(),
                    row(&[("gallery_id", Value::Int(gallery)), ("title", title.into())]),
                )
                .expect("seed should succeed");
        }
        storage
    }

    #[test]
    fn insert_assigns_incrementing_keys() {
        let storage = seeded();
        let key = storage
            .insert(&images(), &row(&[("title", "f".into())]))
            .expect("insert should succeed");

        assert_eq!(key, Key::Int(6));
        assert_eq!(storage.calls(StorageOp::Insert), 1);
    }

    #[test]
    fn explicit_duplicate_key_is_a_constraint_error() {
        let storage = seeded();
        let err = storage
            .insert(&images(), &row(&[("id", Value::Int(2))]))
            .expect_err("key 2 is taken");

        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[test]
    fn fetch_filters_orders_pages_and_projects() {
        let storage = seeded();
        let query = Query::new()
            .filter(Predicate::eq("gallery_id", 2))
            .order_by("title", Direction::Desc)
            .offset(1)
            .limit(1)
            .select("title");

        let rows = storage.fetch(&images(), &query).expect("fetch should succeed");
        assert_eq!(rows, vec![row(&[("title", "d".into())])]);
    }

    #[test]
    fn grouped_count_yields_one_row_per_group() {
        let storage = seeded();
        let query = Query::new()
            .select("gallery_id")
            .aggregate(AggregateFn::Count, None, "count")
            .group_by("gallery_id");

        let rows = storage.fetch(&images(), &query).expect("fetch should succeed");
        assert_eq!(
            rows,
            vec![
                row(&[("gallery_id", Value::Int(1)), ("count", Value::Int(2))]),
                row(&[("gallery_id", Value::Int(2)), ("count", Value::Int(3))]),
            ]
        );
    }

    #[test]
    fn join_rows_keep_extra_columns_and_dedupe_links() {
        let storage = MemoryStorage::new();
        let join = JoinDef::new("images_tags", "image_id", "tag_id");
        storage.seed_join(
            "images_tags",
            row(&[
                ("image_id", Value::Int(1)),
                ("tag_id", Value::Int(3)),
                ("weight", Value::Int(9)),
            ]),
        );

        let inserted = storage
            .insert_join_row(&join, &Key::Int(1), &Key::Int(3))
            .expect("insert should succeed");
        assert!(!inserted, "existing link should not be duplicated");

        let reversed = storage
            .fetch_join_rows(&join.reversed(), &[Key::Int(3)])
            .expect("fetch should succeed");
        assert_eq!(
            reversed,
            vec![JoinRow {
                local: Key::Int(3),
                remote: Key::Int(1)
            }]
        );
        assert_eq!(
            storage.join_rows("images_tags")[0].get("weight"),
            Some(&Value::Int(9))
        );
    }

    #[test]
    fn injected_fault_fires_once() {
        let storage = seeded();
        storage.fail_next(
            StorageOp::Fetch,
            "Images",
            1,
            StorageError::Connection("reset".into()),
        );

        assert!(storage.fetch(&images(), &Query::new()).is_err());
        assert!(storage.fetch(&images(), &Query::new()).is_ok());
        assert_eq!(storage.calls(StorageOp::Fetch), 2);
    }

    #[test]
    fn rollback_restores_snapshot() {
        let storage = seeded();
        storage.begin().expect("begin should succeed");
        storage
            .delete(&images(), &Key::Int(1))
            .expect("delete should succeed");
        storage.rollback().expect("rollback should succeed");

        assert_eq!(storage.rows(&images()).len(), 5);
        assert!(storage.commit().is_err(), "no transaction left to commit");
    }
}
