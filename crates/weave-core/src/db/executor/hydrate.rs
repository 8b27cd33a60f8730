use crate::{
    db::{
        record::{Record, RecordSet, RelationSlot},
        storage::JoinRow,
    },
    error::InternalError,
    model::{RelationDef, RelationKind},
    value::Key,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// Correspondence
///
/// How fetched children map back onto their parents.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Correspondence {
    /// Parent `local_key` equals child `foreign_key`.
    ForeignKey,
    /// Parent primary key links to child primary key through join rows.
    Join(Vec<JoinRow>),
}

///
/// Hydrator
///
/// Splices one batch of fetched children into the relation slots of every
/// parent of a level. Splicing replaces the slot, so applying the same
/// batch twice leaves the parents unchanged.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Hydrator {
    indexed: bool,
}

impl Hydrator {
    #[must_use]
    pub const fn new(indexed: bool) -> Self {
        Self { indexed }
    }

    /// Populate `relation` on each parent from `children`.
    ///
    /// To-one parents without a match are left without a slot; to-many
    /// parents without matches get an empty set. Children keep the order in
    /// which they were fetched.
    pub fn splice<'p>(
        &self,
        parents: impl IntoIterator<Item = &'p mut Record>,
        relation: &RelationDef,
        children: &RecordSet,
        correspondence: &Correspondence,
    ) -> Result<(), InternalError> {
        match (&relation.kind, correspondence) {
            (RelationKind::ToOne, Correspondence::ForeignKey) => {
                let by_key = group_by_field(children, relation.child_key_field());
                for parent in parents {
                    let first = parent_key(parent, relation)
                        .and_then(|key| by_key.get(&key))
                        .and_then(|positions| positions.first())
                        .and_then(|&position| children.get(position));
                    match first {
                        Some(child) => {
                            parent.set_relation(&relation.name, RelationSlot::One(Box::new(child.clone())));
                        }
                        None => {
                            parent.unset_relation(&relation.name);
                        }
                    }
                }
            }

            (RelationKind::ToMany, Correspondence::ForeignKey) => {
                let by_key = group_by_field(children, relation.child_key_field());
                for parent in parents {
                    let positions = parent_key(parent, relation)
                        .and_then(|key| by_key.get(&key))
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    let set = self.collect(children, relation, positions.iter().copied())?;
                    parent.set_relation(&relation.name, RelationSlot::Many(set));
                }
            }

            (RelationKind::ToManyThrough(_), Correspondence::Join(join_rows)) => {
                let mut links: BTreeMap<&Key, BTreeSet<&Key>> = BTreeMap::new();
                for row in join_rows {
                    links.entry(&row.local).or_default().insert(&row.remote);
                }
                for parent in parents {
                    let linked = parent_key(parent, relation).and_then(|key| links.get(&key));
                    let positions = children.iter().enumerate().filter_map(|(position, child)| {
                        let key = child.get(relation.child_key_field())?.as_key()?;
                        linked?.contains(&key).then_some(position)
                    });
                    let set = self.collect(children, relation, positions)?;
                    parent.set_relation(&relation.name, RelationSlot::Many(set));
                }
            }

            (kind, correspondence) => {
                return Err(InternalError::hydrate_invariant(format!(
                    "correspondence {correspondence:?} does not fit relation kind {kind:?}: relation={}",
                    relation.name
                )));
            }
        }

        Ok(())
    }

    fn collect(
        &self,
        children: &RecordSet,
        relation: &RelationDef,
        positions: impl IntoIterator<Item = usize>,
    ) -> Result<RecordSet, InternalError> {
        let records = positions
            .into_iter()
            .filter_map(|position| children.get(position).cloned())
            .collect();

        RecordSet::from_records(&relation.target, records, self.indexed)
    }
}

fn parent_key(parent: &Record, relation: &RelationDef) -> Option<Key> {
    parent.get(relation.parent_key_field())?.as_key()
}

// Child positions grouped by the key value of `field`, in fetch order.
fn group_by_field(children: &RecordSet, field: &str) -> BTreeMap<Key, Vec<usize>> {
    let mut map: BTreeMap<Key, Vec<usize>> = BTreeMap::new();
    for (position, child) in children.iter().enumerate() {
        if let Some(key) = child.get(field).and_then(|v| v.as_key()) {
            map.entry(key).or_default().push(position);
        }
    }

    map
}

///
/// TESTS
///
