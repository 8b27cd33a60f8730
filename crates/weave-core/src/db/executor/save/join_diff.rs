use crate::value::Key;
use std::collections::BTreeSet;

///
/// JoinDelta
///
/// Minimal link changes that turn the stored set of related keys into the
/// desired one. Keys present on both sides are untouched, so join rows
/// for unchanged links (and any extra columns they carry) survive.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JoinDelta {
    pub insert: Vec<Key>,
    pub remove: Vec<Key>,
}

impl JoinDelta {
    #[must_use]
    pub fn diff(current: &BTreeSet<Key>, desired: &BTreeSet<Key>) -> Self {
        let touched = current.union(desired).collect::<BTreeSet<_>>();

        let mut delta = Self::default();
        for key in touched {
            match (current.contains(key), desired.contains(key)) {
                (true, false) => delta.remove.push(key.clone()),
                (false, true) => delta.insert.push(key.clone()),
                _ => {}
            }
        }

        delta
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.remove.is_empty()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(ids: &[i64]) -> BTreeSet<Key> {
        ids.iter().copied().map(Key::Int).collect()
    }

    #[test]
    fn swapping_one_tag_touches_exactly_two_links() {
        let delta = JoinDelta::diff(&keys(&[1, 3, 6]), &keys(&[1, 6, 9]));

        assert_eq!(delta.remove, vec![Key::Int(3)]);
        assert_eq!(delta.insert, vec![Key::Int(9)]);
    }

    #[test]
    fn clearing_removes_every_link() {
        let delta = JoinDelta::diff(&keys(&[2, 4]), &BTreeSet::new());

        assert_eq!(delta.remove, vec![Key::Int(2), Key::Int(4)]);
        assert!(delta.insert.is_empty());
    }

    proptest! {
        #[test]
        fn applying_the_delta_reaches_the_desired_set(
            current in prop::collection::btree_set(0i64..40, 0..20),
            desired in prop::collection::btree_set(0i64..40, 0..20),
        ) {
            let current: BTreeSet<Key> = current.into_iter().map(Key::Int).collect();
            let desired: BTreeSet<Key> = desired.into_iter().map(Key::Int).collect();
            let delta = JoinDelta::diff(&current, &desired);

            let mut applied = current.clone();
            for key in &delta.remove {
                prop_assert!(applied.remove(key));
            }
            for key in &delta.insert {
                prop_assert!(applied.insert(key.clone()));
            }
            prop_assert_eq!(&applied, &desired);

            let changed = current.symmetric_difference(&desired).count();
            prop_assert_eq!(delta.insert.len() + delta.remove.len(), changed);
        }

        #[test]
        fn unchanged_sets_need_no_writes(ids in prop::collection::btree_set(0i64..100, 0..30)) {
            let set: BTreeSet<Key> = ids.into_iter().map(Key::Int).collect();
            prop_assert!(JoinDelta::diff(&set, &set).is_empty());
        }
    }
}
