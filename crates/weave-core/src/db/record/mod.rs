mod export;
mod set;

use crate::{
    error::InternalError,
    model::ModelDef,
    value::{Key, Value},
};
use std::collections::BTreeMap;

// re-exports
pub use set::RecordSet;

///
/// RelationSlot
///
/// Owned, replaceable container for one loaded or assigned relationship.
/// Removing a record from a slot is a structural edit; persistence turns the
/// difference into concrete writes at save time.
///

#[derive(Clone, Debug, PartialEq)]
pub enum RelationSlot {
    /// Single related record (to-one).
    One(Box<Record>),
    /// Related records (to-many, to-many-through).
    Many(RecordSet),
    /// Bare related keys, as submitted by forms (to-many-through only).
    Keys(Vec<Key>),
    /// Explicitly emptied; saving removes every link for the relation.
    Cleared,
}

impl RelationSlot {
    /// Keys of the related records currently held by this slot.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Self::One(record) => record.key().into_iter().collect(),
            Self::Many(set) => set.keys(),
            Self::Keys(keys) => keys.clone(),
            Self::Cleared => Vec::new(),
        }
    }
}

///
/// Record
///
/// One model instance: field values plus named relation slots.
/// A record is unsaved until storage assigns (or confirms) its primary key;
/// after that the primary-key value can no longer change.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    model: String,
    key_field: String,
    fields: BTreeMap<String, Value>,
    relations: BTreeMap<String, RelationSlot>,
    exists: bool,
}

impl Record {
    /// Create an unsaved, empty record.
    pub(crate) fn new(model: &str, key_field: &str) -> Self {
        Self {
            model: model.to_string(),
            key_field: key_field.to_string(),
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
            exists: false,
        }
    }

    /// Materialize a record from a storage row.
    pub(crate) fn from_row(model: &ModelDef, row: BTreeMap<String, Value>) -> Self {
        let exists = row
            .get(&model.primary_key)
            .is_some_and(|value| !value.is_null());

        Self {
            model: model.name.clone(),
            key_field: model.primary_key.clone(),
            fields: row,
            relations: BTreeMap::new(),
            exists,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Primary key, if present and key-shaped.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.fields.get(&self.key_field).and_then(Value::as_key)
    }

    /// Whether storage has assigned or confirmed this record's primary key.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Assign a field value.
    ///
    /// Reassigning the primary key of a persisted record is rejected.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), InternalError> {
        let value = value.into();
        if self.exists && field == self.key_field && self.fields.get(field) != Some(&value) {
            return Err(InternalError::save_invariant(format!(
                "primary key of a persisted record is immutable: model={} field={field}",
                self.model
            )));
        }
        self.fields.insert(field.to_string(), value);

        Ok(())
    }

    /// Builder-style field assignment for records under construction.
    ///
    /// Reassigning the primary key of a persisted record is a programming
    /// error: debug builds panic, release builds keep the stored key. Use
    /// [`Record::set`] to handle the rejection.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        let result = self.set(field, value);
        debug_assert!(
            result.is_ok(),
            "Record::with rejected a field assignment: {}",
            result.as_ref().err().map_or_else(String::new, ToString::to_string)
        );
        self
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSlot> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut RelationSlot> {
        self.relations.get_mut(name)
    }

    #[must_use]
    pub const fn relations(&self) -> &BTreeMap<String, RelationSlot> {
        &self.relations
    }

    /// Replace a relation slot.
    pub fn set_relation(&mut self, name: &str, slot: RelationSlot) {
        self.relations.insert(name.to_string(), slot);
    }

    #[must_use]
    pub fn with_relation(mut self, name: &str, slot: RelationSlot) -> Self {
        self.set_relation(name, slot);
        self
    }

    /// Detach a relation slot entirely (the relation becomes "not loaded").
    pub fn unset_relation(&mut self, name: &str) -> Option<RelationSlot> {
        self.relations.remove(name)
    }

    /// Mark a relation as explicitly emptied.
    pub fn clear_relation(&mut self, name: &str) {
        self.set_relation(name, RelationSlot::Cleared);
    }

    /// The single related record in a to-one slot.
    #[must_use]
    pub fn related_one(&self, name: &str) -> Option<&Self> {
        match self.relations.get(name)? {
            RelationSlot::One(record) => Some(record),
            _ => None,
        }
    }

    /// The related records in a to-many slot.
    #[must_use]
    pub fn related_many(&self, name: &str) -> Option<&RecordSet> {
        match self.relations.get(name)? {
            RelationSlot::Many(set) => Some(set),
            _ => None,
        }
    }

    pub fn related_many_mut(&mut self, name: &str) -> Option<&mut RecordSet> {
        match self.relations.get_mut(name)? {
            RelationSlot::Many(set) => Some(set),
            _ => None,
        }
    }

    // Record the storage-assigned primary key after a successful insert.
    pub(crate) fn mark_persisted(&mut self, key: Key) {
        self.fields.insert(self.key_field.clone(), key.into_value());
        self.exists = true;
    }

    // Record removal from storage; the key value is kept for diagnostics.
    pub(crate) const fn mark_deleted(&mut self) {
        self.exists = false;
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDef;

    #[test]
    fn hydrated_record_rejects_primary_key_reassignment() {
        let model = ModelDef::new("Galleries");
        let mut row = BTreeMap::new();
        row.insert("id".to_string(), Value::Int(1));
        let mut record = Record::from_row(&model, row);

        assert!(record.exists());
        let err = record
            .set("id", 2)
            .expect_err("persisted primary key should be immutable");
        assert!(err.message.contains("immutable"));

        record
            .set("id", 1)
            .expect("re-assigning the same key should be a no-op");
        record
            .set("name", "Renamed")
            .expect("ordinary fields should stay mutable");
    }

    fn persisted_gallery() -> Record {
        let mut row = BTreeMap::new();
        row.insert("id".to_string(), Value::Int(1));
        Record::from_row(&ModelDef::new("Galleries"), row)
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "Record::with rejected a field assignment")]
    fn builder_key_reassignment_on_persisted_record_debug_asserts() {
        let _ = persisted_gallery().with("id", 2);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn builder_key_reassignment_on_persisted_record_keeps_stored_key() {
        let record = persisted_gallery().with("id", 2);

        assert_eq!(record.key(), Some(Key::Int(1)));
    }

    #[test]
    fn unsaved_record_accepts_explicit_primary_key() {
        let record = ModelDef::new("Tags").create().with("id", 9).with("name", "sky");

        assert!(!record.exists());
        assert_eq!(record.key(), Some(Key::Int(9)));
    }

    #[test]
    fn slot_keys_cover_every_shape() {
        let tag = ModelDef::new("Tags").create().with("id", 4);

        assert_eq!(
            RelationSlot::One(Box::new(tag)).keys(),
            vec![Key::Int(4)]
        );
        assert_eq!(
            RelationSlot::Keys(vec![Key::Int(1), Key::Int(3)]).keys(),
            vec![Key::Int(1), Key::Int(3)]
        );
        assert!(RelationSlot::Cleared.keys().is_empty());
    }
}
