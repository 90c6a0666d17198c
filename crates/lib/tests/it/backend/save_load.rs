//! InMemory persistence.

use std::sync::Arc;

use positioned::{
    Column, ListSchema, NewRecord, PositionedList,
    backend::{BackendImpl, database::InMemory},
};

use crate::helpers::*;

#[tokio::test]
async fn test_save_and_load_preserves_lists() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("positioned.json");

    let backend = Arc::new(InMemory::new());
    let list = PositionedList::open(backend.clone(), tasks_schema())
        .await
        .unwrap();
    seed_tasks(&list, 1, &["a", "b", "c"]).await;
    list.move_to(&rid("c"), 1).await.unwrap();
    backend.save_to_file(&path).await.unwrap();

    let loaded = Arc::new(InMemory::load_from_file(&path).await.unwrap());
    assert_eq!(loaded.list_names().await, vec!["tasks".to_string()]);

    let list = PositionedList::open(loaded, tasks_schema()).await.unwrap();
    assert_eq!(positions(&list, &project(1)).await, ranked(&["c", "a", "b"]));

    // The loaded store keeps coordinating
    list.create(
        NewRecord::new()
            .id("d")
            .position(2)
            .field("title", "task d")
            .field("project_id", 1),
    )
    .await
    .unwrap();
    assert_eq!(
        positions(&list, &project(1)).await,
        ranked(&["c", "d", "a", "b"])
    );
}

#[tokio::test]
async fn test_load_missing_file_is_empty() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = InMemory::load_from_file(dir.path().join("absent.json"))
        .await
        .unwrap();
    assert!(backend.list_names().await.is_empty());
}

#[tokio::test]
async fn test_load_invalid_file_fails() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = InMemory::load_from_file(&path).await.unwrap_err();
    assert_eq!(err.module(), "backend");
}

#[tokio::test]
async fn test_loaded_schema_still_checked() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("positioned.json");

    let backend = InMemory::new();
    backend.ensure_list(&tags_schema()).await.unwrap();
    backend.save_to_file(&path).await.unwrap();

    let loaded = InMemory::load_from_file(&path).await.unwrap();
    let renamed_column = ListSchema::builder("tags")
        .column(Column::text("label"))
        .build()
        .unwrap();
    let err = loaded.ensure_list(&renamed_column).await.unwrap_err();
    assert!(err.is_conflict());
    loaded.ensure_list(&tags_schema()).await.unwrap();
}

#[tokio::test]
async fn test_load_rejects_unpositioned_row() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("positioned.json");

    let backend = Arc::new(InMemory::new());
    let list = PositionedList::open(backend.clone(), tags_schema())
        .await
        .unwrap();
    list.create(NewRecord::new().id("t").field("name", "urgent"))
        .await
        .unwrap();
    backend.save_to_file(&path).await.unwrap();

    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    json["lists"]["tags"]["rows"]["t"]["position"] = serde_json::Value::Null;
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    let err = InMemory::load_from_file(&path).await.unwrap_err();
    assert!(err.is_integrity_error());
}

/// Save a seeded tasks store, let `edit` rewrite the JSON, and try to load it.
async fn load_edited_tasks(
    edit: impl FnOnce(&mut serde_json::Value),
) -> positioned::Result<InMemory> {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("positioned.json");

    let backend = Arc::new(InMemory::new());
    let list = PositionedList::open(backend.clone(), tasks_schema())
        .await
        .unwrap();
    seed_tasks(&list, 1, &["a", "b"]).await;
    backend.save_to_file(&path).await.unwrap();

    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    edit(&mut json);
    std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

    InMemory::load_from_file(&path).await
}

#[tokio::test]
async fn test_load_rejects_mistyped_field() {
    let err = load_edited_tasks(|json| {
        json["lists"]["tasks"]["rows"]["a"]["fields"]["project_id"] = "one".into();
    })
    .await
    .unwrap_err();
    assert!(err.is_integrity_error());
}

#[tokio::test]
async fn test_load_rejects_undeclared_field() {
    let err = load_edited_tasks(|json| {
        json["lists"]["tasks"]["rows"]["b"]["fields"]["owner"] = "sam".into();
    })
    .await
    .unwrap_err();
    assert!(err.is_integrity_error());
}

#[tokio::test]
async fn test_load_accepts_untouched_rows() {
    let loaded = Arc::new(load_edited_tasks(|_| {}).await.unwrap());
    let list = PositionedList::open(loaded, tasks_schema()).await.unwrap();
    assert_eq!(positions(&list, &project(1)).await, ranked(&["a", "b"]));
}
