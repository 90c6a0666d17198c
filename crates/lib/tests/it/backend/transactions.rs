use positioned::{
    Column, ListSchema, Record, Value,
    scope::{PositionShift, PositionWindow, ScopeFilter},
};

use crate::helpers::*;

fn task(id: &str, project_id: i64, position: i64) -> Record {
    let mut record = Record::new(id);
    record.position = Some(position);
    record.fields.insert("title".into(), Value::from(id));
    record
        .fields
        .insert("project_id".into(), Value::Integer(project_id));
    record
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let backend = test_backend().await;
    backend.ensure_list(&tasks_schema()).await.unwrap();

    let mut txn = backend.begin().await.unwrap();
    txn.insert("tasks", &task("a", 1, 1)).await.unwrap();
    // Reads inside the transaction see its own writes
    assert!(txn.get("tasks", &rid("a")).await.unwrap().is_some());
    txn.rollback().await.unwrap();

    let mut txn = backend.begin().await.unwrap();
    assert!(txn.get("tasks", &rid("a")).await.unwrap().is_none());
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn test_drop_without_commit_discards_writes() {
    let backend = test_backend().await;
    backend.ensure_list(&tasks_schema()).await.unwrap();

    {
        let mut txn = backend.begin().await.unwrap();
        txn.insert("tasks", &task("a", 1, 1)).await.unwrap();
    }

    let mut txn = backend.begin().await.unwrap();
    assert!(txn.get("tasks", &rid("a")).await.unwrap().is_none());
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn test_shift_counts_rows_in_scope_only() {
    let backend = test_backend().await;
    let schema = tasks_schema();
    backend.ensure_list(&schema).await.unwrap();

    let mut txn = backend.begin().await.unwrap();
    for (id, project_id, position) in [("a", 1, 1), ("b", 1, 2), ("c", 1, 3), ("x", 2, 2)] {
        txn.insert("tasks", &task(id, project_id, position)).await.unwrap();
    }

    let filter = ScopeFilter::new(&schema, &project(1)).unwrap();
    let shift = PositionShift {
        window: PositionWindow::AtOrAfter(2),
        exclude: Some(rid("c")),
        delta: 1,
    };
    assert_eq!(txn.shift_positions(&filter, &shift).await.unwrap(), 1);
    assert_eq!(txn.max_position(&filter).await.unwrap(), Some(3));

    let ordered = txn.ordered_positions(&filter).await.unwrap();
    let ordered: Vec<(String, i64)> = ordered
        .into_iter()
        .map(|(id, position)| (id.to_string(), position))
        .collect();
    assert_eq!(
        ordered,
        vec![("a".to_string(), 1), ("b".to_string(), 3), ("c".to_string(), 3)]
    );

    let other = ScopeFilter::new(&schema, &project(2)).unwrap();
    assert_eq!(txn.max_position(&other).await.unwrap(), Some(2));
    let empty = ScopeFilter::new(&schema, &project(3)).unwrap();
    assert_eq!(txn.max_position(&empty).await.unwrap(), None);
    txn.commit().await.unwrap();
}

#[tokio::test]
async fn test_record_round_trip_with_nulls() {
    let backend = test_backend().await;
    let schema = custom_fields_schema();
    backend.ensure_list(&schema).await.unwrap();

    let mut record = Record::new("f");
    record.position = Some(1);
    record
        .fields
        .insert("type".into(), Value::from("IssueCustomField"));
    record.fields.insert("project_id".into(), Value::Null);

    let mut txn = backend.begin().await.unwrap();
    txn.insert("custom_fields", &record).await.unwrap();
    let stored = txn.get("custom_fields", &rid("f")).await.unwrap().unwrap();
    txn.commit().await.unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_missing_rows_and_lists() {
    let backend = test_backend().await;
    backend.ensure_list(&tasks_schema()).await.unwrap();

    let mut txn = backend.begin().await.unwrap();
    let err = txn.update("tasks", &task("ghost", 1, 1)).await.unwrap_err();
    assert!(err.is_not_found());
    let err = txn.set_position("tasks", &rid("ghost"), 1).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!txn.delete("tasks", &rid("ghost")).await.unwrap());

    let err = txn.get("unregistered", &rid("a")).await.unwrap_err();
    assert!(err.is_not_found());
    txn.rollback().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_insert_is_conflict() {
    let backend = test_backend().await;
    backend.ensure_list(&tasks_schema()).await.unwrap();

    let mut txn = backend.begin().await.unwrap();
    txn.insert("tasks", &task("a", 1, 1)).await.unwrap();
    let err = txn.insert("tasks", &task("a", 1, 2)).await.unwrap_err();
    assert!(err.is_conflict());
    txn.rollback().await.unwrap();
}

#[tokio::test]
async fn test_ensure_list_is_idempotent_and_detects_mismatch() {
    let backend = test_backend().await;
    backend.ensure_list(&tasks_schema()).await.unwrap();
    backend.ensure_list(&tasks_schema()).await.unwrap();

    let changed = ListSchema::builder("tasks")
        .column(Column::text("title"))
        .column(Column::integer("project_id"))
        .column(Column::integer("priority").nullable())
        .scope("project_id")
        .build()
        .unwrap();
    let err = backend.ensure_list(&changed).await.unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn test_schema_rejects_unknown_scope_field() {
    let err = ListSchema::builder("tasks")
        .column(Column::text("title"))
        .scope("project_id")
        .build()
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(err.module(), "coordinator");
}
