//! Writers running on separate tasks against one list.

use std::sync::Arc;

use positioned::{NewRecord, PositionedList, backend::database::InMemory};
use tokio::task::JoinSet;

use crate::helpers::*;

const WRITERS: usize = 4;
const PER_WRITER: usize = 5;

fn task(id: &str, project_id: i64) -> NewRecord {
    NewRecord::new()
        .id(id)
        .field("title", format!("task {id}"))
        .field("project_id", project_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_keep_scope_dense() {
    let list = PositionedList::open(Arc::new(InMemory::new()), tasks_schema())
        .await
        .unwrap();

    let mut writers = JoinSet::new();
    for w in 0..WRITERS {
        let list = list.clone();
        writers.spawn(async move {
            for n in 0..PER_WRITER {
                let id = format!("w{w}-{n}");
                list.create(task(&id, 1)).await.unwrap();
                list.move_to(&rid(&id), 1).await.unwrap();
            }
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined.expect("writer panicked");
    }

    assert_dense(&list, &project(1)).await;
    let members = list.members(&project(1)).await.unwrap();
    assert_eq!(members.len(), WRITERS * PER_WRITER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_in_separate_scopes() {
    let list = PositionedList::open(Arc::new(InMemory::new()), tasks_schema())
        .await
        .unwrap();

    let mut writers = JoinSet::new();
    for w in 0..WRITERS {
        let list = list.clone();
        let project_id = w as i64 + 1;
        writers.spawn(async move {
            for n in 0..PER_WRITER {
                let id = format!("p{project_id}-{n}");
                list.create(task(&id, project_id).position(1)).await.unwrap();
            }
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined.expect("writer panicked");
    }

    for w in 0..WRITERS {
        let scope = project(w as i64 + 1);
        assert_dense(&list, &scope).await;
        // Every create went to the front, so the last one leads
        let first = list.members(&scope).await.unwrap().remove(0);
        assert_eq!(first.id, rid(&format!("p{}-{}", w + 1, PER_WRITER - 1)));
    }
}

/// Lifecycle futures are `Send` on every backend, so hosts can spawn them.
#[tokio::test]
async fn test_spawned_writes_on_test_backend() {
    let list = open_list(tasks_schema()).await;

    let writer = list.clone();
    tokio::spawn(async move {
        for id in ["a", "b", "c"] {
            writer.create(task(id, 1)).await.unwrap();
        }
        writer.move_to(&rid("c"), 1).await.unwrap();
        writer.delete(&rid("a")).await.unwrap();
    })
    .await
    .expect("writer panicked");

    assert_eq!(positions(&list, &project(1)).await, ranked(&["c", "b"]));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_spawned_writes_on_sqlite() {
    use positioned::backend::{BackendImpl, database::Sqlite};

    let backend: Arc<dyn BackendImpl> = Arc::new(Sqlite::sqlite_in_memory().await.unwrap());
    let list = PositionedList::open(backend, tasks_schema()).await.unwrap();

    let writer = list.clone();
    let created = tokio::spawn(async move { writer.create(task("a", 1)).await })
        .await
        .expect("writer panicked")
        .unwrap();
    assert_eq!(created.position, Some(1));

    let writer = list.clone();
    tokio::spawn(async move {
        writer.create(task("b", 1).position(1)).await.unwrap();
        writer.renumber(&project(1)).await.unwrap();
    })
    .await
    .expect("writer panicked");

    assert_eq!(positions(&list, &project(1)).await, ranked(&["b", "a"]));
}
