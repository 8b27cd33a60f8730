mod plan;
mod predicate;

use serde::{Deserialize, Serialize};

// re-exports
pub use plan::{EagerLoadPlan, EagerLoadSpec, PlanNode};
pub use predicate::{CompareOp, ComparePredicate, FieldPresence, Predicate, Row, eval};

///
/// FindMode
///
/// Result shape requested by a find.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindMode {
    #[default]
    All,
    First,
    Count,
}

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// OrderBy
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

///
/// AggregateFn
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

///
/// Selection
///
/// One projected column. Aggregates carry the output name they are
/// materialized under.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selection {
    Field(String),
    Aggregate {
        func: AggregateFn,
        field: Option<String>,
        alias: String,
    },
}

impl Selection {
    /// Output column name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field(name) => name,
            Self::Aggregate { alias, .. } => alias,
        }
    }
}

///
/// Query
///
/// Per-fetch constraints handed to storage: conditions (a conjunction),
/// projection, ordering, paging, and grouping. The engine treats
/// conditions as opaque and only appends key-membership filters.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Predicate>,
    pub fields: Vec<Selection>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub group: Vec<String>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.conditions.push(predicate);
        self
    }

    #[must_use]
    pub fn select(mut self, field: impl Into<String>) -> Self {
        self.fields.push(Selection::Field(field.into()));
        self
    }

    #[must_use]
    pub fn aggregate(
        mut self,
        func: AggregateFn,
        field: Option<&str>,
        alias: impl Into<String>,
    ) -> Self {
        self.fields.push(Selection::Aggregate {
            func,
            field: field.map(str::to_string),
            alias: alias.into(),
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group.push(field.into());
        self
    }

    /// Whether this query produces aggregate rows rather than model records.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        !self.group.is_empty()
            || self
                .fields
                .iter()
                .any(|sel| matches!(sel, Selection::Aggregate { .. }))
    }

    /// Conditions folded into a single predicate.
    #[must_use]
    pub fn predicate(&self) -> Predicate {
        match self.conditions.as_slice() {
            [] => Predicate::True,
            [single] => single.clone(),
            many => Predicate::And(many.to_vec()),
        }
    }

    /// Ensure a projected query includes `field`. Unprojected queries
    /// already return every field.
    pub(crate) fn ensure_field(&mut self, field: &str) {
        if self.fields.is_empty() || self.fields.iter().any(|sel| sel.name() == field) {
            return;
        }
        self.fields.push(Selection::Field(field.to_string()));
    }

    /// Merge constraints given for the same plan node by two paths.
    /// Conditions accumulate; scalar settings from `other` win when set.
    pub(crate) fn merge(&mut self, other: &Self) {
        self.conditions.extend(other.conditions.iter().cloned());
        for sel in &other.fields {
            if !self.fields.contains(sel) {
                self.fields.push(sel.clone());
            }
        }
        if !other.order.is_empty() {
            self.order.clone_from(&other.order);
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        if !other.group.is_empty() {
            self.group.clone_from(&other.group);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_field_leaves_full_projection_alone() {
        let mut query = Query::new();
        query.ensure_field("gallery_id");
        assert!(query.fields.is_empty());

        let mut query = Query::new().select("title");
        query.ensure_field("gallery_id");
        query.ensure_field("title");
        assert_eq!(
            query.fields,
            vec![
                Selection::Field("title".into()),
                Selection::Field("gallery_id".into())
            ]
        );
    }

    #[test]
    fn grouping_or_aggregates_mark_query_as_aggregate() {
        assert!(!Query::new().select("id").is_aggregate());
        assert!(Query::new().group_by("gallery_id").is_aggregate());
        assert!(
            Query::new()
                .aggregate(AggregateFn::Count, None, "count")
                .is_aggregate()
        );
    }
}
