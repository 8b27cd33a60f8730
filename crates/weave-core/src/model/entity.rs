use crate::{
    DEFAULT_PRIMARY_KEY,
    db::record::Record,
    model::{field::FieldDef, relation::RelationDef},
};

///
/// ModelDef
/// Runtime model for one record type: storage identity, key, fields, and
/// declared relationships.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModelDef {
    /// Stable model name used in eager-load paths and diagnostics.
    pub name: String,
    /// Storage-facing name (table, collection) handed to the connection.
    pub source: String,
    /// Primary key field.
    pub primary_key: String,
    /// Declared fields. Empty means the model is schemaless.
    pub fields: Vec<FieldDef>,
    /// Declared relationships, in declaration order.
    pub relations: Vec<RelationDef>,
}

impl ModelDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let source = default_source(&name);

        Self {
            name,
            source,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Look up a declared relationship by name.
    #[must_use]
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    /// Look up a declared field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Create an unsaved, empty record of this model.
    #[must_use]
    pub fn create(&self) -> Record {
        Record::new(&self.name, &self.primary_key)
    }
}

// Default storage name: snake_case of the model name.
fn default_source(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_is_snake_case() {
        assert_eq!(ModelDef::new("Galleries").source, "galleries");
        assert_eq!(ModelDef::new("ImagesTags").source, "images_tags");
    }
}
