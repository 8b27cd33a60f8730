//! Save-time record validation.

use crate::{db::record::Record, model::ModelDef};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// ValidationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ValidationError {
    #[error("field '{field}' is required")]
    Required { field: String },

    #[error("field '{field}' has the wrong shape: expected {expected}")]
    Shape { field: String, expected: String },

    #[error("{message}")]
    Rule { field: Option<String>, message: String },
}

impl ValidationError {
    /// Custom rule failure, optionally tied to one field.
    pub fn rule(field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Rule {
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

///
/// RecordValidator
///
/// Hook that runs before a record's own fields are written.
///

pub trait RecordValidator {
    fn validate(&self, model: &ModelDef, record: &Record) -> Result<(), ValidationError>;
}

impl<F> RecordValidator for F
where
    F: Fn(&ModelDef, &Record) -> Result<(), ValidationError>,
{
    fn validate(&self, model: &ModelDef, record: &Record) -> Result<(), ValidationError> {
        self(model, record)
    }
}

///
/// RequiredFields
///
/// Built-in validator: required fields must be present and non-null, and
/// declared field kinds must accept their values. The primary key is exempt
/// on unsaved records because storage may assign it.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RequiredFields;

impl RecordValidator for RequiredFields {
    fn validate(&self, model: &ModelDef, record: &Record) -> Result<(), ValidationError> {
        for field in &model.fields {
            let value = record.get(&field.name);
            let assignable_key = field.name == model.primary_key && !record.exists();

            if field.required && !assignable_key && value.is_none_or(|v| v.is_null()) {
                return Err(ValidationError::Required {
                    field: field.name.clone(),
                });
            }
            if let Some(value) = value
                && !field.kind.accepts(value)
            {
                return Err(ValidationError::Shape {
                    field: field.name.clone(),
                    expected: format!("{:?}", field.kind).to_lowercase(),
                });
            }
        }

        Ok(())
    }
}

///
/// ValidatorSet
///
/// The built-in validator (optional) followed by per-model validators in
/// registration order. The first failure wins.
///

#[derive(Default)]
pub struct ValidatorSet {
    builtin: bool,
    models: BTreeMap<String, Vec<Box<dyn RecordValidator>>>,
}

impl ValidatorSet {
    #[must_use]
    pub fn new(builtin: bool) -> Self {
        Self {
            builtin,
            models: BTreeMap::new(),
        }
    }

    pub const fn set_builtin(&mut self, enabled: bool) {
        self.builtin = enabled;
    }

    pub fn register(&mut self, model: &str, validator: Box<dyn RecordValidator>) {
        self.models
            .entry(model.to_string())
            .or_default()
            .push(validator);
    }

    pub fn validate(&self, model: &ModelDef, record: &Record) -> Result<(), ValidationError> {
        if self.builtin {
            RequiredFields.validate(model, record)?;
        }
        if let Some(validators) = self.models.get(&model.name) {
            for validator in validators {
                validator.validate(model, record)?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorSet")
            .field("builtin", &self.builtin)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

///
/// TESTS
///
