//! Gallery fixture: galleries own images; images and tags are linked
//! through `images_tags`.

use crate::{
    db::storage::{MemoryStorage, Row},
    model::{FieldDef, FieldKind, JoinDef, ModelDef, RelationDef, SchemaCatalog},
    value::Value,
};

pub(crate) const GALLERIES: [(i64, &str); 2] = [(1, "Foo Gallery"), (2, "Bar Gallery")];

pub(crate) const IMAGES: [(i64, i64, &str); 5] = [
    (1, 1, "Amiga 1200"),
    (2, 1, "Srinivasa Ramanujan"),
    (3, 1, "Las Vegas"),
    (4, 2, "Silicon Valley"),
    (5, 2, "Unknown"),
];

pub(crate) const IMAGE_TAGS: [(i64, i64); 12] = [
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 2),
    (2, 4),
    (3, 1),
    (3, 5),
    (4, 3),
    (4, 6),
    (5, 4),
    (5, 5),
    (5, 6),
];

pub(crate) fn images_tags() -> JoinDef {
    JoinDef::new("images_tags", "image_id", "tag_id")
}

pub(crate) fn gallery_catalog() -> SchemaCatalog {
    SchemaCatalog::builder()
        .model(
            ModelDef::new("Galleries")
                .field(FieldDef::new("id", FieldKind::Int).required())
                .field(FieldDef::new("name", FieldKind::Text).required())
                .field(FieldDef::new("active", FieldKind::Bool))
                .relation(RelationDef::to_many("Images", "Images", "id", "gallery_id")),
        )
        .model(
            ModelDef::new("Images")
                .field(FieldDef::new("id", FieldKind::Int).required())
                .field(FieldDef::new("gallery_id", FieldKind::Int))
                .field(FieldDef::new("image", FieldKind::Text))
                .field(FieldDef::new("title", FieldKind::Text))
                .relation(RelationDef::to_one("Galleries", "Galleries", "gallery_id", "id"))
                .relation(RelationDef::to_many_through("Tags", "Tags", images_tags())),
        )
        .model(
            ModelDef::new("Tags")
                .field(FieldDef::new("id", FieldKind::Int).required())
                .field(FieldDef::new("name", FieldKind::Text).required())
                .relation(RelationDef::to_many_through(
                    "Images",
                    "Images",
                    images_tags().reversed(),
                )),
        )
        .build()
        .expect("gallery catalog should build")
}

pub(crate) fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

/// Storage seeded with two galleries, five images, six tags, and links.
pub(crate) fn seeded_storage(catalog: &SchemaCatalog) -> MemoryStorage {
    let storage = MemoryStorage::new();
    let model = |name: &str| catalog.model(name).expect("fixture model should exist");

    for (id, name) in GALLERIES {
        storage
            .seed(
                model("Galleries"),
                row(&[
                    ("id", id.into()),
                    ("name", name.into()),
                    ("active", true.into()),
                ]),
            )
            .expect("gallery seed should succeed");
    }
    for (id, gallery, title) in IMAGES {
        storage
            .seed(
                model("Images"),
                row(&[
                    ("id", id.into()),
                    ("gallery_id", gallery.into()),
                    ("image", format!("img{id}.jpg").into()),
                    ("title", title.into()),
                ]),
            )
            .expect("image seed should succeed");
    }
    for id in 1..=6_i64 {
        storage
            .seed(
                model("Tags"),
                row(&[("id", id.into()), ("name", format!("tag{id}").into())]),
            )
            .expect("tag seed should succeed");
    }
    for (image, tag) in IMAGE_TAGS {
        storage.seed_join(
            "images_tags",
            row(&[("image_id", image.into()), ("tag_id", tag.into())]),
        );
    }

    storage
}
