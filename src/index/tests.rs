use super::*;
use crate::{
    config::IndexSettings,
    event::{IndexEvent, VaultEvent},
    fields::FieldKind,
    store::{FieldValueStore, MemoryStore},
    tests::helpers::*,
    vault::MemoryVault,
};
use serde_json::json;
use std::sync::Arc;

fn names(index: &FieldIndex<MemoryVault, MemoryStore>, path: &str) -> Vec<String> {
    index
        .fields_for(path)
        .iter()
        .map(|f| f.name.clone())
        .collect()
}

fn key(index: &FieldIndex<MemoryVault, MemoryStore>, path: &str, name: &str) -> FieldKey {
    let field = index
        .lookups_for(path)
        .iter()
        .find(|f| f.name == name)
        .unwrap();
    FieldKey::new(path, field)
}

#[tokio::test]
async fn test_lookup_filters_on_target_field() {
    let vault = people_vault();
    let mut index = memory_index(vault.clone());
    assert_eq!(index.full_index(false).await.unwrap(), 3);

    assert_eq!(index.classes_for("people/Boss.md"), ["Person"]);
    assert_eq!(names(&index, "people/Boss.md"), vec!["manager", "related"]);
    let boss = key(&index, "people/Boss.md", "related");
    assert_eq!(index.computed_value(&boss), Some(&json!(["[[people/A]]"])));
    assert_eq!(index.field_status(&boss), Some(&FieldStatus::UpToDate));
    assert_eq!(
        vault.text("people/Boss.md").unwrap(),
        "---\ntags: [Person]\nrelated: [\"[[people/A]]\"]\n---\nBoss page\n"
    );

    let a = key(&index, "people/A.md", "related");
    assert_eq!(index.computed_value(&a), Some(&json!([])));
    assert_eq!(
        vault.text("people/A.md").unwrap(),
        "---\ntags: [Person]\nmanager: \"[[people/Boss]]\"\nrelated:\n---\n"
    );

    let records = index.store().get_all_by_kind(FieldKind::Lookup).await.unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_full_index_is_idempotent() {
    let vault = people_vault();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut index = memory_index(vault.clone()).with_events(tx);
    index.full_index(false).await.unwrap();
    let mut first = Vec::new();
    while let Ok(event) = rx.try_recv() {
        first.push(event);
    }
    assert!(first.contains(&IndexEvent::FieldsChanged("people/A.md".to_string())));
    assert_eq!(first.last(), Some(&IndexEvent::Indexed(3)));

    let fields = index.state().fields.clone();
    let values = index.state().lookup_values.clone();
    let statuses = index.state().field_status.clone();
    let texts: Vec<Option<String>> = ["people/Boss.md", "people/A.md", "people/B.md"]
        .iter()
        .map(|p| vault.text(p))
        .collect();

    index.full_index(false).await.unwrap();
    let mut second = Vec::new();
    while let Ok(event) = rx.try_recv() {
        second.push(event);
    }
    assert_eq!(second, vec![IndexEvent::Indexed(3)]);
    assert_eq!(index.state().fields, fields);
    assert_eq!(index.state().lookup_values, values);
    assert_eq!(index.state().field_status, statuses);
    let again: Vec<Option<String>> = ["people/Boss.md", "people/A.md", "people/B.md"]
        .iter()
        .map(|p| vault.text(p))
        .collect();
    assert_eq!(again, texts);
}

#[tokio::test]
async fn test_inner_class_wins_over_tag_binding() {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/Movie.md",
        &class_doc("", &["{name: rating, type: Number}"]),
    );
    vault.insert(
        "fileClasses/Review.md",
        &class_doc(
            "mapWithTag: true",
            &["{name: rating, type: Input}", "{name: note, type: Input}"],
        ),
    );
    vault.insert("m.md", "---\nfileClass: Movie\ntags: [Review]\n---\n");
    let mut index = memory_index(vault);
    index.index_fields();

    assert_eq!(index.classes_for("m.md"), ["Movie", "Review"]);
    let fields = index.fields_for("m.md");
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].name, "rating");
    assert_eq!(fields[0].kind(), FieldKind::Number);
    assert_eq!(fields[0].file_class_name.as_deref(), Some("Movie"));
    assert_eq!(fields[1].name, "note");
}

#[tokio::test]
async fn test_cyclic_extends_resolves() {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/A.md",
        &class_doc("extends: B", &["{name: a, type: Input}"]),
    );
    vault.insert(
        "fileClasses/B.md",
        &class_doc("extends: A", &["{name: b, type: Input}"]),
    );
    vault.insert("doc.md", "---\nfileClass: A\n---\n");
    let mut index = memory_index(vault);
    assert_eq!(index.index_fields(), 1);
    assert_eq!(names(&index, "doc.md"), vec!["a", "b"]);
}

#[tokio::test]
async fn test_formulas_and_statuses() {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/Order.md",
        &class_doc(
            "",
            &[
                "{name: price, type: Number}",
                "{name: qty, type: Number}",
                "{name: total, type: Formula, options: {formula: \"price * qty\"}}",
                "{name: label, type: Formula, options: {formula: \"upper(file.name)\", autoUpdate: false}}",
                "{name: broken, type: Lookup, options: {query: \"#a and\"}}",
            ],
        ),
    );
    vault.insert("orders/o1.md", "---\nfileClass: Order\nprice: 3\nqty: 4\n---\n");
    let mut index = memory_index(vault.clone());
    index.full_index(false).await.unwrap();

    assert_eq!(
        vault.text("orders/o1.md").unwrap(),
        "---\nfileClass: Order\nprice: 3\nqty: 4\ntotal: 12\n---\n"
    );
    let total = key(&index, "orders/o1.md", "total");
    assert_eq!(index.field_status(&total), Some(&FieldStatus::UpToDate));

    let label = key(&index, "orders/o1.md", "label");
    assert_eq!(index.computed_value(&label), Some(&json!("O1")));
    assert_eq!(index.field_status(&label), Some(&FieldStatus::Changed));

    let broken = key(&index, "orders/o1.md", "broken");
    assert!(matches!(
        index.field_status(&broken),
        Some(FieldStatus::Error(_))
    ));
    assert_eq!(index.computed_value(&broken), None);
    assert_eq!(index.statuses_for("orders/o1.md").len(), 3);
}

#[tokio::test]
async fn test_write_fields_is_atomic() {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert("n.md", "---\ntitle: old\n---\n");
    let mut settings = IndexSettings::default();
    settings.preset_fields = vec![
        input_decl("title"),
        decl("rating", FieldKind::Number, number_options(0.0, 10.0)),
    ];
    let mut index = FieldIndex::new(vault.clone(), Arc::new(MemoryStore::new()), settings);
    index.index_fields();
    let title = index.field_path("n.md", "title").unwrap();
    let rating = index.field_path("n.md", "rating").unwrap();

    let rejected = index
        .write_fields(
            "n.md",
            vec![
                FieldWrite::set(title.clone(), json!("new")),
                FieldWrite::set(rating.clone(), json!(11)),
            ],
        )
        .await;
    assert!(matches!(rejected, Err(crate::BuildonomyError::Write(_))));
    assert_eq!(vault.text("n.md").unwrap(), "---\ntitle: old\n---\n");

    index
        .write_fields(
            "n.md",
            vec![
                FieldWrite::set(title, json!("new")),
                FieldWrite::set(rating, json!(7)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(vault.text("n.md").unwrap(), "---\ntitle: new\nrating: 7\n---\n");
    let existing = index.existing_fields("n.md").await.unwrap();
    assert_eq!(existing.len(), 2);
    assert_eq!(existing[1].value, json!(7));
}

#[tokio::test]
async fn test_rename_and_delete_move_state() {
    let vault = people_vault();
    let mut index = memory_index(vault.clone());
    index.full_index(false).await.unwrap();

    vault.rename("people/Boss.md", "people/Chief.md").unwrap();
    index
        .handle_event(&VaultEvent::Renamed {
            from: "people/Boss.md".to_string(),
            to: "people/Chief.md".to_string(),
        })
        .await
        .unwrap();
    assert!(index.fields_for("people/Boss.md").is_empty());
    assert_eq!(names(&index, "people/Chief.md"), vec!["manager", "related"]);
    let chief = key(&index, "people/Chief.md", "related");
    assert_eq!(index.computed_value(&chief), Some(&json!(["[[people/A]]"])));
    let store = index.store().clone();
    assert!(store.get_all_by_path("people/Boss.md").await.unwrap().is_empty());
    assert_eq!(store.get_all_by_path("people/Chief.md").await.unwrap().len(), 1);

    vault.delete("people/A.md").unwrap();
    index
        .handle_event(&VaultEvent::Deleted("people/A.md".to_string()))
        .await
        .unwrap();
    assert!(index.fields_for("people/A.md").is_empty());
    assert!(index.statuses_for("people/A.md").is_empty());
    assert!(store.get_all_by_path("people/A.md").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_class_file_change_reindexes() {
    let vault = people_vault();
    let mut index = memory_index(vault.clone());
    index.index_fields();
    let before = index.last_change("people/B.md");
    assert!(before.is_some());

    vault.insert(
        "fileClasses/Person.md",
        &class_doc("mapWithTag: true", &["{name: manager, type: File}"]),
    );
    index
        .handle_event(&VaultEvent::Modified("fileClasses/Person.md".to_string()))
        .await
        .unwrap();
    assert_eq!(names(&index, "people/B.md"), vec!["manager"]);
    assert!(index.lookups_for("people/B.md").is_empty());
}

#[tokio::test]
async fn test_dropped_lookup_leaves_no_orphans() {
    let vault = people_vault();
    let mut index = memory_index(vault.clone());
    index.full_index(false).await.unwrap();
    let related = key(&index, "people/B.md", "related");
    assert!(index.computed_value(&related).is_some());

    vault.insert(
        "fileClasses/Person.md",
        &class_doc("mapWithTag: true", &["{name: manager, type: File}"]),
    );
    index
        .handle_event(&VaultEvent::Modified("fileClasses/Person.md".to_string()))
        .await
        .unwrap();
    assert!(index.lookups_for("people/B.md").is_empty());
    assert!(index.statuses_for("people/B.md").is_empty());
    assert_eq!(index.field_status(&related), None);
    assert_eq!(index.computed_value(&related), None);
    assert!(index.state().lookup_values.is_empty());

    index.full_index(false).await.unwrap();
    let records = index.store().get_all_by_kind(FieldKind::Lookup).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_bookmark_group_binding() {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/Project.md",
        &class_doc("bookmarksGroups: [work]", &["{name: deadline, type: Input}"]),
    );
    vault.insert("a.md", "plain\n");
    vault.insert("b.md", "plain\n");
    vault.insert("c.md", "plain\n");
    vault.insert("d.md", "plain\n");
    vault.set_bookmarks("work", vec!["a.md".to_string()]);
    vault.set_bookmarks("work/clients", vec!["b.md".to_string()]);
    vault.set_bookmarks("workshop", vec!["c.md".to_string()]);
    let mut index = memory_index(vault);
    assert_eq!(index.index_fields(), 4);

    assert_eq!(index.classes_for("a.md"), ["Project"]);
    assert_eq!(index.classes_for("b.md"), ["Project"]);
    assert!(index.classes_for("c.md").is_empty());
    assert!(index.classes_for("d.md").is_empty());
    assert_eq!(names(&index, "b.md"), vec!["deadline"]);
}
