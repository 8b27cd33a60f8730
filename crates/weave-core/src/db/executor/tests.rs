use crate::{
    db::{
        executor::CancelToken,
        query::{AggregateFn, Direction, EagerLoadSpec, Predicate, Query},
        record::Record,
        session::{DbSession, SessionOptions},
        storage::{JoinRow, MemoryStorage, Row, StorageConnection, StorageError, StorageOp},
    },
    model::{JoinDef, ModelDef},
    obs::sink::{MetricsEvent, MetricsSink},
    test_fixtures::{gallery_catalog, row, seeded_storage},
    value::{Key, Value},
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn keys(record: &Record, relation: &str) -> Vec<Key> {
    record
        .related_many(relation)
        .unwrap_or_else(|| panic!("{relation} slot should be loaded"))
        .keys()
}

fn ints(ids: &[i64]) -> Vec<Key> {
    ids.iter().copied().map(Key::Int).collect()
}

#[test]
fn empty_root_result_issues_no_child_fetches() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let set = session
        .find(
            "Galleries",
            &Query::new().filter(Predicate::eq("id", 99)),
            &EagerLoadSpec::from("Images.Tags"),
        )
        .expect("find should succeed");

    assert!(set.is_empty());
    assert_eq!(storage.calls(StorageOp::Fetch), 1, "only the root fetch should run");
    assert_eq!(storage.calls(StorageOp::FetchJoinRows), 0);
}

#[test]
fn nested_load_issues_one_fetch_per_plan_node() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let galleries = session
        .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images.Tags"))
        .expect("find should succeed");

    assert_eq!(storage.calls(StorageOp::Fetch), 3, "galleries, images, tags");
    assert_eq!(storage.calls(StorageOp::FetchJoinRows), 1);

    let foo = galleries.get_by_key(&Key::Int(1)).expect("gallery 1 should load");
    assert_eq!(keys(foo, "Images"), ints(&[1, 2, 3]));

    let images = foo.related_many("Images").expect("images should load");
    let amiga = images.get_by_key(&Key::Int(1)).expect("image 1 should load");
    assert_eq!(keys(amiga, "Tags"), ints(&[1, 2, 3]));
    let ramanujan = images.get_by_key(&Key::Int(2)).expect("image 2 should load");
    assert_eq!(keys(ramanujan, "Tags"), ints(&[2, 4]));
}

#[test]
fn recursive_path_loads_four_bounded_levels() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let galleries = session
        .find(
            "Galleries",
            &Query::new().filter(Predicate::eq("id", 1)),
            &EagerLoadSpec::from("Images.Tags.Images.Tags"),
        )
        .expect("recursive find should succeed");

    assert_eq!(storage.calls(StorageOp::Fetch), 5);
    assert_eq!(storage.calls(StorageOp::FetchJoinRows), 3);

    let tag2 = galleries
        .get_by_key(&Key::Int(1))
        .and_then(|g| g.related_many("Images"))
        .and_then(|images| images.get_by_key(&Key::Int(1)))
        .and_then(|image| image.related_many("Tags"))
        .and_then(|tags| tags.get_by_key(&Key::Int(2)))
        .expect("gallery 1 > image 1 > tag 2 should load");
    assert_eq!(keys(tag2, "Images"), ints(&[1, 2]));

    let image2 = tag2
        .related_many("Images")
        .and_then(|images| images.get_by_key(&Key::Int(2)))
        .expect("tag 2 > image 2 should load");
    assert_eq!(keys(image2, "Tags"), ints(&[2, 4]));

    let leaf = image2
        .related_many("Tags")
        .and_then(|tags| tags.get_by_key(&Key::Int(4)))
        .expect("deepest tag should load");
    assert!(
        leaf.relation("Images").is_none(),
        "recursion should stop at the last spelled-out segment"
    );
}

#[test]
fn to_one_relation_loads_owning_gallery() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let image = session
        .find_first(
            "Images",
            &Query::new().filter(Predicate::eq("id", 4)),
            &EagerLoadSpec::from("Galleries"),
        )
        .expect("find should succeed")
        .expect("image 4 should exist");

    let gallery = image.related_one("Galleries").expect("gallery should load");
    assert_eq!(gallery.get("name"), Some(&Value::from("Bar Gallery")));
}

#[test]
fn projection_is_widened_with_keys_the_plan_needs() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let galleries = session
        .find(
            "Galleries",
            &Query::new().select("name"),
            &EagerLoadSpec::new().path_with("Images", Query::new().select("title")),
        )
        .expect("find should succeed");

    let foo = galleries.get_by_key(&Key::Int(1)).expect("gallery 1 should load");
    assert!(foo.get("active").is_none(), "unselected fields stay out");
    assert_eq!(keys(foo, "Images"), ints(&[1, 2, 3]));

    let image = foo
        .related_many("Images")
        .and_then(|images| images.first())
        .expect("images should load");
    assert!(image.get("gallery_id").is_some());
    assert!(image.get("image").is_none());
}

#[test]
fn path_constraints_filter_and_order_the_deepest_node() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let tags_query = Query::new()
        .filter(Predicate::ne("name", "tag2"))
        .order_by("id", Direction::Desc);
    let image = session
        .find_first(
            "Images",
            &Query::new().filter(Predicate::eq("id", 1)),
            &EagerLoadSpec::new().path_with("Tags", tags_query),
        )
        .expect("find should succeed")
        .expect("image 1 should exist");

    assert_eq!(keys(&image, "Tags"), ints(&[3, 1]));
}

#[test]
fn root_limit_and_offset_do_not_page_children() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let images = session
        .find(
            "Images",
            &Query::new().order_by("id", Direction::Asc).offset(1).limit(2),
            &EagerLoadSpec::from("Tags"),
        )
        .expect("find should succeed");

    assert_eq!(images.keys(), ints(&[2, 3]));
    let first = images.first().expect("image 2 should load");
    assert_eq!(keys(first, "Tags"), ints(&[2, 4]));
}

#[test]
fn count_first_and_aggregates() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let count = session
        .count("Images", &Query::new().filter(Predicate::eq("gallery_id", 1)))
        .expect("count should succeed");
    assert_eq!(count, 3);

    let last = session
        .find_first(
            "Images",
            &Query::new().order_by("id", Direction::Desc),
            &EagerLoadSpec::new(),
        )
        .expect("find should succeed")
        .expect("an image should exist");
    assert_eq!(last.key(), Some(Key::Int(5)));

    let grouped = session
        .find(
            "Images",
            &Query::new()
                .select("gallery_id")
                .aggregate(AggregateFn::Count, None, "images")
                .group_by("gallery_id"),
            &EagerLoadSpec::from("Tags"),
        )
        .expect("aggregate find should succeed");
    let counts: Vec<_> = grouped.iter().filter_map(|r| r.get("images")).collect();
    assert_eq!(counts, vec![&Value::Int(3), &Value::Int(2)]);
    assert_eq!(
        storage.calls(StorageOp::FetchJoinRows),
        0,
        "aggregate rows should not be hydrated"
    );
}

#[test]
fn unknown_relationship_fails_before_any_fetch() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let err = session
        .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images.Colors"))
        .expect_err("unknown relation should fail");

    assert!(err.is_unknown_relationship());
    assert!(storage.journal().is_empty());
}

#[test]
fn storage_failure_names_model_and_operation() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    storage.fail_next(
        StorageOp::Fetch,
        "Tags",
        1,
        StorageError::Connection("reset by peer".into()),
    );
    let session = DbSession::new(&catalog, &storage);

    let err = session
        .find("Images", &Query::new(), &EagerLoadSpec::from("Tags"))
        .expect_err("tag fetch should fail");

    assert!(err.is_storage());
    assert!(err.message.contains("storage fetch failed: model=Tags"));
}

#[test]
fn cancelled_find_issues_no_storage_calls() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let token = CancelToken::new();
    token.cancel();
    let session = DbSession::new(&catalog, &storage).cancel_token(token);

    let err = session
        .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images"))
        .expect_err("cancelled find should fail");

    assert!(err.is_cancelled());
    assert!(storage.journal().is_empty());
}

#[test]
fn unindexed_session_keeps_positional_sets() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage).options(SessionOptions {
        indexed: false,
        validate_on_save: true,
    });

    let galleries = session
        .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images"))
        .expect("find should succeed");

    assert!(!galleries.is_indexed());
    let images = galleries
        .get(1)
        .and_then(|g| g.related_many("Images"))
        .expect("second gallery's images should load");
    assert!(!images.is_indexed());
    assert_eq!(images.keys(), ints(&[4, 5]));
}

///
/// DuplicatingStorage
/// Returns every fetched row twice.
///

struct DuplicatingStorage(MemoryStorage);

impl StorageConnection for DuplicatingStorage {
    fn fetch(&self, model: &ModelDef, query: &Query) -> Result<Vec<Row>, StorageError> {
        let rows = self.0.fetch(model, query)?;
        Ok(rows.iter().chain(rows.iter()).cloned().collect())
    }

    fn insert(&self, model: &ModelDef, fields: &Row) -> Result<Key, StorageError> {
        self.0.insert(model, fields)
    }

    fn update(&self, model: &ModelDef, key: &Key, fields: &Row) -> Result<bool, StorageError> {
        self.0.update(model, key, fields)
    }

    fn delete(&self, model: &ModelDef, key: &Key) -> Result<bool, StorageError> {
        self.0.delete(model, key)
    }

    fn fetch_join_rows(
        &self,
        join: &JoinDef,
        locals: &[Key],
    ) -> Result<Vec<JoinRow>, StorageError> {
        self.0.fetch_join_rows(join, locals)
    }

    fn insert_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        self.0.insert_join_row(join, local, remote)
    }

    fn delete_join_row(
        &self,
        join: &JoinDef,
        local: &Key,
        remote: &Key,
    ) -> Result<bool, StorageError> {
        self.0.delete_join_row(join, local, remote)
    }
}

#[test]
fn duplicate_keys_in_indexed_fetch_are_rejected() {
    let catalog = gallery_catalog();
    let storage = DuplicatingStorage(seeded_storage(&catalog));

    let err = DbSession::new(&catalog, &storage)
        .find("Tags", &Query::new(), &EagerLoadSpec::new())
        .expect_err("indexed sets should reject duplicate keys");
    assert!(err.is_duplicate_key());

    let set = DbSession::new(&catalog, &storage)
        .options(SessionOptions {
            indexed: false,
            validate_on_save: true,
        })
        .find("Tags", &Query::new(), &EagerLoadSpec::new())
        .expect("unindexed sets accept duplicates");
    assert_eq!(set.len(), 12);
}

#[test]
fn delete_clears_join_rows_on_both_sides() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let mut tag = session
        .find_first(
            "Tags",
            &Query::new().filter(Predicate::eq("id", 2)),
            &EagerLoadSpec::new(),
        )
        .expect("find should succeed")
        .expect("tag 2 should exist");

    assert!(session.delete(&mut tag).expect("delete should succeed"));
    assert!(!tag.exists());
    assert_eq!(storage.join_rows("images_tags").len(), 10);

    let image = session
        .find_first(
            "Images",
            &Query::new().filter(Predicate::eq("id", 1)),
            &EagerLoadSpec::from("Tags"),
        )
        .expect("find should succeed")
        .expect("image 1 should exist");
    assert_eq!(keys(&image, "Tags"), ints(&[1, 3]));
}

#[test]
fn deleting_a_vanished_row_keeps_the_record_marked_persisted() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);
    let load = || {
        session
            .find_first(
                "Tags",
                &Query::new().filter(Predicate::eq("id", 2)),
                &EagerLoadSpec::new(),
            )
            .expect("find should succeed")
            .expect("tag 2 should exist")
    };
    let mut first = load();
    let mut second = load();

    assert!(session.delete(&mut first).expect("delete should succeed"));
    assert!(
        !session.delete(&mut second).expect("second delete should run"),
        "the row is already gone"
    );
    assert!(!first.exists());
    assert!(second.exists(), "no row was removed for the stale copy");
}

#[test]
fn remove_by_query_deletes_rows_and_links() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let removed = session
        .remove("Images", &Query::new().filter(Predicate::eq("gallery_id", 2)))
        .expect("remove should succeed");

    assert_eq!(removed, 2);
    let images = catalog.model("Images").expect("model should exist");
    assert_eq!(storage.rows(images).len(), 3);
    assert_eq!(storage.join_rows("images_tags").len(), 7);
}

#[test]
fn update_all_applies_changes_but_not_keys() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let session = DbSession::new(&catalog, &storage);

    let updated = session
        .update_all(
            "Galleries",
            &row(&[("active", false.into())]),
            &Query::new().filter(Predicate::eq("id", 1)),
        )
        .expect("update should succeed");
    assert_eq!(updated, 1);

    let galleries = catalog.model("Galleries").expect("model should exist");
    let foo = storage
        .row(galleries, &Key::Int(1))
        .expect("gallery 1 should exist");
    assert_eq!(foo.get("active"), Some(&Value::Bool(false)));

    let err = session
        .update_all("Galleries", &row(&[("id", 9.into())]), &Query::new())
        .expect_err("key changes should be rejected");
    assert_eq!(err.class, crate::error::ErrorClass::InvariantViolation);
}

struct CountingSink<'a> {
    fetches: &'a AtomicUsize,
}

impl MetricsSink for CountingSink<'_> {
    fn record(&self, event: MetricsEvent<'_>) {
        if matches!(event, MetricsEvent::RowsFetched { .. }) {
            self.fetches.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn session_metrics_sink_sees_every_fetch() {
    let catalog = gallery_catalog();
    let storage = seeded_storage(&catalog);
    let fetches = AtomicUsize::new(0);
    let sink = CountingSink { fetches: &fetches };
    let session = DbSession::new(&catalog, &storage).metrics_sink(&sink);

    session
        .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images.Tags"))
        .expect("find should succeed");

    assert_eq!(fetches.load(Ordering::SeqCst), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fetch_count_tracks_plan_nodes_not_parents(
        images_per_gallery in prop::collection::vec(1usize..=4, 1..=6),
    ) {
        let catalog = gallery_catalog();
        let storage = MemoryStorage::new();
        let model = |name: &str| catalog.model(name).expect("fixture model should exist");

        storage
            .seed(model("Tags"), row(&[("id", 1.into()), ("name", "shared".into())]))
            .expect("tag seed should succeed");
        for (gallery, count) in (1_i64..).zip(&images_per_gallery) {
            storage
                .seed(model("Galleries"), row(&[("id", gallery.into()), ("name", "g".into())]))
                .expect("gallery seed should succeed");
            for _ in 0..*count {
                let image = storage
                    .seed(model("Images"), row(&[("gallery_id", gallery.into())]))
                    .expect("image seed should succeed");
                storage.seed_join(
                    "images_tags",
                    row(&[("image_id", image.into()), ("tag_id", 1.into())]),
                );
            }
        }

        let session = DbSession::new(&catalog, &storage);
        let galleries = session
            .find("Galleries", &Query::new(), &EagerLoadSpec::from("Images.Tags"))
            .expect("find should succeed");

        prop_assert_eq!(galleries.len(), images_per_gallery.len());
        prop_assert_eq!(storage.calls(StorageOp::Fetch), 3);
        prop_assert_eq!(storage.calls(StorageOp::FetchJoinRows), 1);
    }
}
