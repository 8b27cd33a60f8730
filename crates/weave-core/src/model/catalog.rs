use crate::{
    error::InternalError,
    model::{
        entity::ModelDef,
        relation::{JoinDef, RelationDef, RelationKind},
    },
};
use std::collections::{BTreeMap, BTreeSet};

///
/// SchemaCatalog
///
/// Immutable, explicitly passed registry of runtime models.
/// Supplies the relationship graph and primary-key field per model.
///

#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    models: BTreeMap<String, ModelDef>,
}

impl SchemaCatalog {
    #[must_use]
    pub fn builder() -> SchemaCatalogBuilder {
        SchemaCatalogBuilder::default()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Result<&ModelDef, InternalError> {
        self.models
            .get(name)
            .ok_or_else(|| InternalError::unknown_model(name))
    }

    /// Resolve one named relationship on a model.
    pub fn relationship(&self, model: &str, name: &str) -> Result<&RelationDef, InternalError> {
        self.model(model)?
            .get_relation(name)
            .ok_or_else(|| InternalError::unknown_relationship(model, name))
    }

    /// Names of all relationships declared on a model, in declaration order.
    pub fn relationships_of(&self, model: &str) -> Result<Vec<&str>, InternalError> {
        Ok(self
            .model(model)?
            .relations
            .iter()
            .map(|rel| rel.name.as_str())
            .collect())
    }

    /// Iterate registered models in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDef> {
        self.models.values()
    }

    /// The relationship on the target side that walks the same join pair
    /// back to `model`, if one is declared.
    pub fn inverse_relation(
        &self,
        model: &str,
        relation: &str,
    ) -> Result<Option<&RelationDef>, InternalError> {
        let rel = self.relationship(model, relation)?;
        let RelationKind::ToManyThrough(join) = &rel.kind else {
            return Ok(None);
        };
        let reversed = join.reversed();

        Ok(self.model(&rel.target)?.relations.iter().find(|candidate| {
            candidate.target == model && candidate.join() == Some(&reversed)
        }))
    }

    /// Every join pair touching `model`, oriented so `local_key` references it.
    ///
    /// Joins declared only on the far side are included, so a delete can
    /// clear join rows even when the inverse relation is not declared.
    pub fn joins_referencing(&self, model: &str) -> Result<Vec<JoinDef>, InternalError> {
        self.model(model)?;

        let mut joins = BTreeSet::new();
        for owner in self.models.values() {
            for rel in &owner.relations {
                let RelationKind::ToManyThrough(join) = &rel.kind else {
                    continue;
                };
                if owner.name == model {
                    joins.insert(join.clone());
                }
                if rel.target == model {
                    joins.insert(join.reversed());
                }
            }
        }

        Ok(joins.into_iter().collect())
    }
}

///
/// SchemaCatalogBuilder
///

#[derive(Debug, Default)]
pub struct SchemaCatalogBuilder {
    models: Vec<ModelDef>,
}

impl SchemaCatalogBuilder {
    #[must_use]
    pub fn model(mut self, model: ModelDef) -> Self {
        self.models.push(model);
        self
    }

    /// Validate declarations and freeze them into a catalog.
    pub fn build(self) -> Result<SchemaCatalog, InternalError> {
        let mut models = BTreeMap::new();

        // Phase 1: model identity.
        for model in self.models {
            if model.name.is_empty() {
                return Err(InternalError::schema_invariant("model name is empty"));
            }
            if model.primary_key.is_empty() {
                return Err(InternalError::schema_invariant(format!(
                    "model '{}' has an empty primary key field",
                    model.name
                )));
            }
            if !model.fields.is_empty() && model.get_field(&model.primary_key).is_none() {
                return Err(InternalError::schema_invariant(format!(
                    "model '{}' does not declare its primary key field '{}'",
                    model.name, model.primary_key
                )));
            }
            if models.contains_key(&model.name) {
                return Err(InternalError::schema_invariant(format!(
                    "model '{}' registered twice",
                    model.name
                )));
            }
            models.insert(model.name.clone(), model);
        }

        // Phase 2: relationship targets, uniqueness, and through-key binding.
        let primary_keys: BTreeMap<String, String> = models
            .values()
            .map(|m| (m.name.clone(), m.primary_key.clone()))
            .collect();

        for model in models.values_mut() {
            let mut seen = BTreeSet::new();
            for rel in &mut model.relations {
                if !seen.insert(rel.name.clone()) {
                    return Err(InternalError::schema_invariant(format!(
                        "relationship '{}' declared twice on model '{}'",
                        rel.name, model.name
                    )));
                }
                let Some(target_pk) = primary_keys.get(&rel.target) else {
                    return Err(InternalError::schema_invariant(format!(
                        "relationship '{}' on model '{}' targets unknown model '{}'",
                        rel.name, model.name, rel.target
                    )));
                };

                match &rel.kind {
                    RelationKind::ToOne | RelationKind::ToMany => {
                        if rel.local_key.is_empty() || rel.foreign_key.is_empty() {
                            return Err(InternalError::schema_invariant(format!(
                                "relationship '{}' on model '{}' has an empty key field",
                                rel.name, model.name
                            )));
                        }
                    }
                    RelationKind::ToManyThrough(join) => {
                        if join.model.is_empty()
                            || join.local_key.is_empty()
                            || join.remote_key.is_empty()
                        {
                            return Err(InternalError::schema_invariant(format!(
                                "relationship '{}' on model '{}' has an incomplete join",
                                rel.name, model.name
                            )));
                        }
                        rel.local_key.clone_from(&model.primary_key);
                        rel.foreign_key.clone_from(target_pk);
                    }
                }
            }
        }

        Ok(SchemaCatalog { models })
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use crate::{
        model::{JoinDef, ModelDef, RelationDef, SchemaCatalog},
        test_fixtures::gallery_catalog,
    };

    #[test]
    fn relationship_lookup_resolves_declared_names() {
        let catalog = gallery_catalog();

        let rel = catalog
            .relationship("Images", "Tags")
            .expect("Images.Tags should be declared");
        assert_eq!(rel.target, "Tags");
        assert_eq!(
            catalog
                .relationships_of("Images")
                .expect("Images should be registered"),
            vec!["Galleries", "Tags"]
        );
    }

    #[test]
    fn unknown_relationship_is_reported() {
        let catalog = gallery_catalog();
        let err = catalog
            .relationship("Images", "Colors")
            .expect_err("undeclared relation should fail");

        assert!(err.is_unknown_relationship());
    }

    #[test]
    fn through_relations_are_symmetric() {
        let catalog = gallery_catalog();
        let inverse = catalog
            .inverse_relation("Images", "Tags")
            .expect("lookup should succeed")
            .expect("Tags should declare the inverse relation");

        assert_eq!(inverse.name, "Images");
        assert_eq!(
            catalog.joins_referencing("Tags").expect("Tags registered"),
            vec![JoinDef::new("images_tags", "tag_id", "image_id")]
        );
    }

    #[test]
    fn through_keys_bind_to_configured_primary_keys() {
        let catalog = SchemaCatalog::builder()
            .model(
                ModelDef::new("Posts")
                    .primary_key("post_id")
                    .relation(RelationDef::to_many_through(
                        "Labels",
                        "Labels",
                        JoinDef::new("posts_labels", "post_id", "label_id"),
                    )),
            )
            .model(ModelDef::new("Labels").primary_key("label_id"))
            .build()
            .expect("catalog should build");

        let rel = catalog
            .relationship("Posts", "Labels")
            .expect("relation should exist");
        assert_eq!(rel.local_key, "post_id");
        assert_eq!(rel.foreign_key, "label_id");
    }

    #[test]
    fn duplicate_relationship_names_are_rejected() {
        let err = SchemaCatalog::builder()
            .model(
                ModelDef::new("Images")
                    .relation(RelationDef::to_one("Galleries", "Galleries", "gallery_id", "id"))
                    .relation(RelationDef::to_one("Galleries", "Galleries", "gallery_id", "id")),
            )
            .model(ModelDef::new("Galleries"))
            .build()
            .expect_err("duplicate relation names should be rejected");

        assert!(err.message.contains("declared twice"));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = SchemaCatalog::builder()
            .model(ModelDef::new("Images").relation(RelationDef::to_one(
                "Owner", "Users", "user_id", "id",
            )))
            .build()
            .expect_err("unknown relation target should be rejected");

        assert!(err.message.contains("unknown model 'Users'"));
    }
}
