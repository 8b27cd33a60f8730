use crate::DEFAULT_PRIMARY_KEY;

///
/// RelationKind
///
/// Closed set of relationship shapes. Executors match on this exhaustively.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RelationKind {
    /// This model owns a foreign key (`local_key`) referencing the target's
    /// `foreign_key` (belongs-to).
    ToOne,
    /// The target owns a foreign key (`foreign_key`) referencing this
    /// model's `local_key` (has-many).
    ToMany,
    /// Both sides are linked through rows of a join model.
    ToManyThrough(JoinDef),
}

///
/// JoinDef
///
/// Join model identity plus its two foreign key fields, oriented from the
/// owning side of the relation: `local_key` references the owner,
/// `remote_key` references the target.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JoinDef {
    pub model: String,
    pub local_key: String,
    pub remote_key: String,
}

impl JoinDef {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        local_key: impl Into<String>,
        remote_key: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            local_key: local_key.into(),
            remote_key: remote_key.into(),
        }
    }

    /// The same join pair seen from the target's side.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            model: self.model.clone(),
            local_key: self.remote_key.clone(),
            remote_key: self.local_key.clone(),
        }
    }
}

///
/// RelationDef
///
/// One named relationship declared on a model.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationDef {
    pub name: String,
    pub target: String,
    pub local_key: String,
    pub foreign_key: String,
    pub kind: RelationKind,
}

impl RelationDef {
    /// Belongs-to: `local_key` on the owner references the target's `foreign_key`.
    #[must_use]
    pub fn to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            kind: RelationKind::ToOne,
        }
    }

    /// Has-many: `foreign_key` on the target references the owner's `local_key`.
    #[must_use]
    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            kind: RelationKind::ToMany,
        }
    }

    /// Many-to-many through a join model.
    ///
    /// Both key fields start as the default primary key; catalog build
    /// rebinds them to the configured primary keys of owner and target.
    #[must_use]
    pub fn to_many_through(
        name: impl Into<String>,
        target: impl Into<String>,
        join: JoinDef,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            local_key: DEFAULT_PRIMARY_KEY.to_string(),
            foreign_key: DEFAULT_PRIMARY_KEY.to_string(),
            kind: RelationKind::ToManyThrough(join),
        }
    }

    #[must_use]
    pub const fn is_to_many(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::ToMany | RelationKind::ToManyThrough(_)
        )
    }

    #[must_use]
    pub const fn join(&self) -> Option<&JoinDef> {
        match &self.kind {
            RelationKind::ToManyThrough(join) => Some(join),
            RelationKind::ToOne | RelationKind::ToMany => None,
        }
    }

    /// Field on the *parent* record whose values drive the child fetch.
    #[must_use]
    pub fn parent_key_field(&self) -> &str {
        &self.local_key
    }

    /// Field on the *child* record matched against parent key values.
    #[must_use]
    pub fn child_key_field(&self) -> &str {
        &self.foreign_key
    }
}
