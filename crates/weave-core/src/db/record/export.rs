use crate::db::record::{Record, RecordSet, RelationSlot};
use serde_json::{Map, Value as JsonValue};

impl Record {
    /// Plain nested representation: fields plus loaded relation slots.
    ///
    /// `indexed` renders to-many relations as objects keyed by primary key
    /// instead of arrays.
    #[must_use]
    pub fn to_json(&self, indexed: bool) -> JsonValue {
        let mut out = Map::new();
        for (name, value) in self.fields() {
            out.insert(name.clone(), json_value(value));
        }
        for (name, slot) in self.relations() {
            let rendered = match slot {
                RelationSlot::One(record) => record.to_json(indexed),
                RelationSlot::Many(set) => set.to_json(indexed),
                RelationSlot::Keys(keys) => JsonValue::Array(
                    keys.iter().map(|key| json_value(&key.to_value())).collect(),
                ),
                RelationSlot::Cleared => JsonValue::Array(Vec::new()),
            };
            out.insert(name.clone(), rendered);
        }

        JsonValue::Object(out)
    }
}

impl RecordSet {
    /// Array of records in set order, or an object keyed by primary key.
    ///
    /// Keyless records are rendered under their position when indexed.
    #[must_use]
    pub fn to_json(&self, indexed: bool) -> JsonValue {
        if !indexed {
            return JsonValue::Array(self.iter().map(|r| r.to_json(false)).collect());
        }

        let mut out = Map::new();
        for (position, record) in self.iter().enumerate() {
            let name = record
                .key()
                .map_or_else(|| position.to_string(), |key| key.to_string());
            out.insert(name, record.to_json(true));
        }

        JsonValue::Object(out)
    }
}

fn json_value(value: &crate::value::Value) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use crate::{
        db::record::{RecordSet, RelationSlot},
        model::ModelDef,
    };
    use serde_json::json;

    #[test]
    fn nested_records_render_as_plain_json() {
        let tags = RecordSet::from_records(
            "Tags",
            vec![
                ModelDef::new("Tags").create().with("id", 1).with("name", "sky"),
                ModelDef::new("Tags").create().with("id", 3).with("name", "sea"),
            ],
            true,
        )
        .expect("tags should build");
        let image = ModelDef::new("Images")
            .create()
            .with("id", 5)
            .with_relation("Tags", RelationSlot::Many(tags));

        assert_eq!(
            image.to_json(false),
            json!({"id": 5, "Tags": [{"id": 1, "name": "sky"}, {"id": 3, "name": "sea"}]})
        );
        assert_eq!(
            image.to_json(true),
            json!({"id": 5, "Tags": {"1": {"id": 1, "name": "sky"}, "3": {"id": 3, "name": "sea"}}})
        );
    }
}
