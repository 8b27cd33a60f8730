use std::collections::BTreeMap;

///
/// Cascade
///
/// Which relation slots a save follows beyond the root record.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Cascade {
    /// Persist the root record's own fields only.
    #[default]
    None,
    /// Follow every populated relation slot, recursively.
    All,
    /// Follow only the named relation paths.
    Paths(CascadePaths),
}

///
/// CascadePaths
/// Tree of relation names built from dotted paths.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CascadePaths {
    pub(crate) children: BTreeMap<String, Self>,
}

impl CascadePaths {
    fn insert(&mut self, dotted: &str) {
        let mut node = self;
        for segment in dotted.split('.').map(str::trim) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }
}

///
/// SaveOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SaveOptions {
    pub cascade: Cascade,
}

impl SaveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow every populated relation slot.
    #[must_use]
    pub fn cascade_all() -> Self {
        Self {
            cascade: Cascade::All,
        }
    }

    /// Also follow the dotted relation path `dotted` ("Images.Tags").
    #[must_use]
    pub fn with(mut self, dotted: &str) -> Self {
        match &mut self.cascade {
            Cascade::All => {}
            Cascade::Paths(paths) => paths.insert(dotted),
            Cascade::None => {
                let mut paths = CascadePaths::default();
                paths.insert(dotted);
                self.cascade = Cascade::Paths(paths);
            }
        }
        self
    }
}

///
/// Selection
/// Borrowed view of the cascade at one depth of the record graph.
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum Selection<'t> {
    Nothing,
    All,
    Tree(&'t CascadePaths),
}

impl<'t> Selection<'t> {
    pub(crate) const fn root(cascade: &'t Cascade) -> Self {
        match cascade {
            Cascade::None => Self::Nothing,
            Cascade::All => Self::All,
            Cascade::Paths(paths) => Self::Tree(paths),
        }
    }

    /// Selection for the records in slot `relation`, if it is followed.
    pub(crate) fn child(self, relation: &str) -> Option<Self> {
        match self {
            Self::Nothing => None,
            Self::All => Some(Self::All),
            Self::Tree(paths) => paths.children.get(relation).map(|child| {
                if child.children.is_empty() {
                    Self::Nothing
                } else {
                    Self::Tree(child)
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_paths_select_only_named_branches() {
        let options = SaveOptions::new().with("Images.Tags").with("Images.Galleries");
        let root = Selection::root(&options.cascade);

        let images = root.child("Images").expect("Images should be followed");
        assert!(images.child("Tags").is_some());
        assert!(images.child("Galleries").is_some());
        assert!(root.child("Tags").is_none());
        assert!(
            images
                .child("Tags")
                .and_then(|tags| tags.child("Images"))
                .is_none(),
            "paths should not extend past their last segment"
        );
    }
}
