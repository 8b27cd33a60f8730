use crate::{db::record::Record, error::InternalError, value::Key};
use std::collections::BTreeMap;

///
/// RecordSet
///
/// Ordered collection of records of one model.
///
/// When indexed, the set keeps a 1:1 map from primary key to position and
/// rejects a second record with the same key. Records without a key (not
/// yet saved) are kept in order but are not indexed.
///

#[derive(Clone, Debug, PartialEq)]
pub struct RecordSet {
    model: String,
    records: Vec<Record>,
    index: Option<BTreeMap<Key, usize>>,
}

impl RecordSet {
    /// Create an empty, unindexed set.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            records: Vec::new(),
            index: None,
        }
    }

    /// Create an empty set keyed by primary key.
    #[must_use]
    pub fn indexed(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            records: Vec::new(),
            index: Some(BTreeMap::new()),
        }
    }

    /// Build a set from records in order, optionally indexing by key.
    pub fn from_records(
        model: impl Into<String>,
        records: Vec<Record>,
        indexed: bool,
    ) -> Result<Self, InternalError> {
        let mut set = Self {
            model: model.into(),
            records,
            index: None,
        };
        if indexed {
            set.index = Some(BTreeMap::new());
            set.reindex()?;
        }

        Ok(set)
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    // Callers that may change keys must call `reindex` afterwards.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Record at a position.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }


    /// Record by primary key.
    ///
    /// Indexed sets use the key map; unindexed sets scan.
    #[must_use]
    pub fn get_by_key(&self, key: &Key) -> Option<&Record> {
        let position = self.position_of(key)?;
        self.records.get(position)
    }

    /// Edit the record at `position` in place.
    ///
    /// When the edit changes the record's key, the index follows it. An
    /// edit that would collide with another record's key is undone and
    /// fails with `DuplicateKey`. Returns `Ok(None)` for a missing position.
    pub fn update<R>(
        &mut self,
        position: usize,
        edit: impl FnOnce(&mut Record) -> R,
    ) -> Result<Option<R>, InternalError> {
        let Some(record) = self.records.get_mut(position) else {
            return Ok(None);
        };
        let before = record.clone();
        let out = edit(record);

        let (old, new) = (before.key(), record.key());
        if old != new
            && let Some(index) = self.index.as_mut()
        {
            if let Some(new) = &new
                && index.get(new).is_some_and(|&at| at != position)
            {
                *record = before;
                return Err(InternalError::duplicate_key(&self.model, new));
            }
            if let Some(old) = &old {
                index.remove(old);
            }
            if let Some(new) = new {
                index.insert(new, position);
            }
        }

        Ok(Some(out))
    }

    /// Edit the record with this key in place; see [`RecordSet::update`].
    pub fn update_by_key<R>(
        &mut self,
        key: &Key,
        edit: impl FnOnce(&mut Record) -> R,
    ) -> Result<Option<R>, InternalError> {
        match self.position_of(key) {
            Some(position) => self.update(position, edit),
            None => Ok(None),
        }
    }

    /// Keys of every keyed record, in set order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.records.iter().filter_map(Record::key).collect()
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) -> Result<(), InternalError> {
        if let (Some(index), Some(key)) = (self.index.as_mut(), record.key()) {
            if index.contains_key(&key) {
                return Err(InternalError::duplicate_key(&self.model, &key));
            }
            index.insert(key, self.records.len());
        }
        self.records.push(record);

        Ok(())
    }

    /// Detach the record with this key. Later positions shift down.
    pub fn remove_by_key(&mut self, key: &Key) -> Option<Record> {
        let position = self.position_of(key)?;
        let record = self.records.remove(position);
        if let Some(index) = self.index.as_mut() {
            index.retain(|_, at| *at != position);
            for at in index.values_mut() {
                if *at > position {
                    *at -= 1;
                }
            }
        }

        Some(record)
    }

    /// Keep only the records the predicate accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&Record) -> bool) {
        // old position -> new position, for survivors
        let mut moved = Vec::with_capacity(self.records.len());
        let mut next = 0;
        self.records.retain(|record| {
            let kept = keep(record);
            moved.push(kept.then(|| {
                next += 1;
                next - 1
            }));
            kept
        });

        if let Some(index) = self.index.as_mut() {
            index.retain(|_, at| match moved.get(*at).copied().flatten() {
                Some(new) => {
                    *at = new;
                    true
                }
                None => false,
            });
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        if let Some(index) = self.index.as_mut() {
            index.clear();
        }
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Rebuild the key index from the current records.
    ///
    /// Needed after a save assigns keys to records that were appended unsaved.
    /// On a collision the previous index is kept and `DuplicateKey` returned.
    pub(crate) fn reindex(&mut self) -> Result<(), InternalError> {
        if self.index.is_none() {
            return Ok(());
        }
        let mut rebuilt = BTreeMap::new();
        for (position, record) in self.records.iter().enumerate() {
            if let Some(key) = record.key()
                && rebuilt.insert(key.clone(), position).is_some()
            {
                return Err(InternalError::duplicate_key(&self.model, &key));
            }
        }
        self.index = Some(rebuilt);

        Ok(())
    }

    fn position_of(&self, key: &Key) -> Option<usize> {
        match &self.index {
            Some(index) => index.get(key).copied(),
            None => self
                .records
                .iter()
                .position(|record| record.key().as_ref() == Some(key)),
        }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDef;

    fn tag(id: i64) -> Record {
        ModelDef::new("Tags").create().with("id", id)
    }

    #[test]
    fn indexed_set_rejects_duplicate_keys() {
        let mut set = RecordSet::indexed("Tags");
        set.push(tag(1)).expect("first key should insert");

        let err = set.push(tag(1)).expect_err("second key 1 should collide");
        assert!(err.is_duplicate_key());
        assert_eq!(set.len(), 1, "rejected record should not be appended");
    }

    #[test]
    fn from_records_detects_duplicates_when_indexed() {
        let err = RecordSet::from_records("Tags", vec![tag(2), tag(2)], true)
            .expect_err("indexed build should reject duplicate keys");
        assert!(err.is_duplicate_key());

        let set = RecordSet::from_records("Tags", vec![tag(2), tag(2)], false)
            .expect("unindexed build should keep duplicates");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn remove_by_key_keeps_lookup_consistent() {
        let mut set = RecordSet::from_records("Tags", vec![tag(1), tag(3), tag(6)], true)
            .expect("set should build");

        let removed = set.remove_by_key(&Key::Int(3)).expect("key 3 should exist");
        assert_eq!(removed.key(), Some(Key::Int(3)));
        assert_eq!(
            set.get_by_key(&Key::Int(6)).and_then(Record::key),
            Some(Key::Int(6)),
            "lookup after removal should still find later records"
        );
        assert_eq!(set.keys(), vec![Key::Int(1), Key::Int(6)]);
    }

    #[test]
    fn update_moves_the_index_with_a_key_change() {
        let draft = || ModelDef::new("Tags").create().with("name", "draft");
        let mut set = RecordSet::from_records("Tags", vec![draft(), draft()], true)
            .expect("keyless records should form a set");

        set.update(0, |record| record.set("id", 5))
            .expect("first key should be free")
            .expect("position 0 should exist")
            .expect("unsaved key should be assignable");
        assert!(set.get_by_key(&Key::Int(5)).is_some(), "lookup should see the new key");

        let err = set
            .update(1, |record| record.set("id", 5))
            .expect_err("second key 5 should collide");
        assert!(err.is_duplicate_key());
        assert_eq!(set.get(1).and_then(Record::key), None, "colliding edit should be undone");
        assert_eq!(set.keys(), vec![Key::Int(5)]);

        assert!(
            set.update(9, |_| ()).expect("missing position should not fail").is_none()
        );
    }

    #[test]
    fn retain_and_remove_keep_positions_consistent() {
        let mut set =
            RecordSet::from_records("Tags", vec![tag(1), tag(3), tag(6), tag(8)], true)
                .expect("set should build");

        set.retain(|record| record.key() != Some(Key::Int(3)));
        set.remove_by_key(&Key::Int(1)).expect("key 1 should exist");

        assert!(set.is_indexed());
        assert_eq!(set.keys(), vec![Key::Int(6), Key::Int(8)]);
        for key in [Key::Int(6), Key::Int(8)] {
            assert_eq!(set.get_by_key(&key).and_then(Record::key), Some(key));
        }
        assert!(set.get_by_key(&Key::Int(3)).is_none());
    }

    #[test]
    fn failed_reindex_keeps_the_previous_index() {
        let mut set = RecordSet::from_records(
            "Tags",
            vec![ModelDef::new("Tags").create().with("name", "late"), tag(1)],
            true,
        )
        .expect("set should build");
        for record in set.iter_mut().take(1) {
            record.set("id", 1).expect("unsaved key should be assignable");
        }

        let err = set.reindex().expect_err("two records now share key 1");
        assert!(err.is_duplicate_key());
        assert_eq!(
            set.get_by_key(&Key::Int(1)).and_then(|r| r.get("name")),
            None,
            "key 1 should still resolve to the record indexed before"
        );
    }

    #[test]
    fn unsaved_records_are_kept_but_not_indexed() {
        let mut set = RecordSet::indexed("Tags");
        set.push(ModelDef::new("Tags").create().with("name", "a"))
            .expect("keyless record should append");
        set.push(ModelDef::new("Tags").create().with("name", "b"))
            .expect("second keyless record should append");

        assert_eq!(set.len(), 2);
        assert!(set.keys().is_empty());
    }
}
