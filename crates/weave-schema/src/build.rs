use crate::{
    Error, err,
    decl::{ModelDecl, RelationDecl, RelationKindDecl, SchemaDecl},
    error::ErrorTree,
    naming,
};
use std::collections::BTreeSet;
use weave_core::{
    DEFAULT_PRIMARY_KEY,
    model::{FieldDef, JoinDef, ModelDef, RelationDef, SchemaCatalog},
};

impl SchemaDecl {
    /// Check every declaration, collecting all problems.
    pub fn validate(&self) -> Result<(), ErrorTree> {
        let mut errs = ErrorTree::new();

        if self.models.is_empty() {
            err!(errs, "no models declared");
        }
        for (name, model) in &self.models {
            errs.merge_for(&format!("models.{name}"), self.validate_model(name, model));
        }

        errs.result()
    }

    /// Validate, then build the runtime catalog.
    pub fn to_catalog(&self) -> Result<SchemaCatalog, Error> {
        self.validate().map_err(Error::Validation)?;

        let mut builder = SchemaCatalog::builder();
        for (name, model) in &self.models {
            builder = builder.model(self.model_def(name, model));
        }

        Ok(builder.build()?)
    }

    fn key_of<'a>(&'a self, model: &'a str) -> &'a str {
        self.models
            .get(model)
            .and_then(|m| m.key.as_deref())
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    fn declares_field(&self, model: &str, field: &str) -> bool {
        self.models.get(model).is_none_or(|m| {
            m.fields.is_empty() || m.fields.iter().any(|f| f.name == field)
        })
    }

    fn validate_model(&self, name: &str, model: &ModelDecl) -> ErrorTree {
        let mut errs = ErrorTree::new();

        if name.trim().is_empty() {
            err!(errs, "model name is empty");
        }
        if model.source.as_deref().is_some_and(|s| s.trim().is_empty()) {
            err!(errs, "source is empty");
        }

        let key = self.key_of(name);
        if key.trim().is_empty() {
            err!(errs, "key field is empty");
        } else if !self.declares_field(name, key) {
            err!(errs, "key field '{key}' is not declared");
        }

        let mut seen = BTreeSet::new();
        for field in &model.fields {
            if field.name.trim().is_empty() {
                err!(errs, "field name is empty");
            } else if !seen.insert(field.name.as_str()) {
                err!(errs, "field '{}' declared twice", field.name);
            }
        }

        for (rel_name, rel) in &model.relations {
            let route = format!("relations.{rel_name}");
            errs.merge_for(&route, self.validate_relation(name, rel_name, rel));
        }

        errs
    }

    fn validate_relation(&self, owner: &str, name: &str, rel: &RelationDecl) -> ErrorTree {
        let mut errs = ErrorTree::new();

        if name.trim().is_empty() {
            err!(errs, "relation name is empty");
        }
        let target = rel.target.as_deref().unwrap_or(name);
        if !self.models.contains_key(target) {
            err!(errs, "unknown target model '{target}'");
            return errs;
        }

        let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
        match rel.kind {
            RelationKindDecl::ToOne | RelationKindDecl::ToMany => {
                if rel.join.is_some() || rel.join_local.is_some() || rel.join_remote.is_some() {
                    err!(errs, "join settings only apply to to_many_through relations");
                }
                if blank(&rel.local_key) || blank(&rel.foreign_key) {
                    err!(errs, "key field is empty");
                }

                let relation = self.relation_def(owner, name, rel);
                let (fk_model, fk_field) = if rel.kind == RelationKindDecl::ToOne {
                    (owner, relation.local_key.as_str())
                } else {
                    (target, relation.foreign_key.as_str())
                };
                if !self.declares_field(fk_model, fk_field) {
                    err!(errs, "foreign key '{fk_field}' is not declared on '{fk_model}'");
                }
            }
            RelationKindDecl::ToManyThrough => {
                if rel.local_key.is_some() || rel.foreign_key.is_some() {
                    err!(errs, "through relations key on the join model; use join_local and join_remote");
                }
                if blank(&rel.join) {
                    err!(errs, "through relation has no join model");
                }
                if blank(&rel.join_local) || blank(&rel.join_remote) {
                    err!(errs, "join key field is empty");
                }
            }
        }

        errs
    }

    fn model_def(&self, name: &str, decl: &ModelDecl) -> ModelDef {
        let mut model = ModelDef::new(name).primary_key(self.key_of(name));
        if let Some(source) = &decl.source {
            model = model.source(source);
        }
        for field in &decl.fields {
            let mut def = FieldDef::new(&field.name, field.kind);
            if field.required {
                def = def.required();
            }
            model = model.field(def);
        }
        for (rel_name, rel) in &decl.relations {
            model = model.relation(self.relation_def(name, rel_name, rel));
        }

        model
    }

    // Resolve conventions for unset key fields.
    fn relation_def(&self, owner: &str, name: &str, rel: &RelationDecl) -> RelationDef {
        let target = rel.target.as_deref().unwrap_or(name);

        match rel.kind {
            RelationKindDecl::ToOne => RelationDef::to_one(
                name,
                target,
                rel.local_key.clone().unwrap_or_else(|| naming::foreign_key(target)),
                rel.foreign_key.clone().unwrap_or_else(|| self.key_of(target).to_string()),
            ),
            RelationKindDecl::ToMany => RelationDef::to_many(
                name,
                target,
                rel.local_key.clone().unwrap_or_else(|| self.key_of(owner).to_string()),
                rel.foreign_key.clone().unwrap_or_else(|| naming::foreign_key(owner)),
            ),
            RelationKindDecl::ToManyThrough => RelationDef::to_many_through(
                name,
                target,
                JoinDef::new(
                    rel.join.clone().unwrap_or_else(|| naming::join_model(owner, target)),
                    rel.join_local.clone().unwrap_or_else(|| naming::foreign_key(owner)),
                    rel.join_remote.clone().unwrap_or_else(|| naming::foreign_key(target)),
                ),
            ),
        }
    }
}
