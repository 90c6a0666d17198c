//! Ordering properties checked over many operations.

use rand::{Rng, SeedableRng, rngs::StdRng};

use positioned::{NewRecord, Reconciliation, RecordChanges};

use crate::helpers::*;

#[tokio::test]
async fn test_move_symmetry() {
    let list = open_list(tasks_schema()).await;
    let ids = ["a", "b", "c", "d", "e", "f"];
    seed_tasks(&list, 1, &ids).await;
    let original = positions(&list, &project(1)).await;

    for (from, to) in [(1, 6), (6, 1), (2, 5), (5, 3), (3, 4)] {
        let id = original[from as usize - 1].0.clone();
        list.move_to(&rid(&id), to).await.unwrap();
        assert_dense(&list, &project(1)).await;
        list.move_to(&rid(&id), from).await.unwrap();
        assert_eq!(
            positions(&list, &project(1)).await,
            original,
            "moving {id} {from} -> {to} -> {from} changed the order"
        );
    }
}

#[tokio::test]
async fn test_move_idempotence_touches_no_sibling() {
    let list = open_list(tasks_schema()).await;
    seed_tasks(&list, 1, &["a", "b", "c"]).await;

    let mut txn = list.backend().begin().await.unwrap();
    let record = txn.get(list.name(), &rid("b")).await.unwrap().unwrap();
    let snapshot = list.coordinator().snapshot(&record).unwrap();
    let result = list
        .coordinator()
        .reconcile(txn.as_mut(), Some(&snapshot), &record)
        .await
        .unwrap();
    txn.commit().await.unwrap();

    assert_eq!(result, Reconciliation::Noop);
    assert_eq!(positions(&list, &project(1)).await, ranked(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_density_under_random_operations() {
    let list = open_list(tasks_schema()).await;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut live: Vec<String> = Vec::new();
    let mut next_id = 0;

    for _ in 0..200 {
        let action = if live.is_empty() { 0 } else { rng.gen_range(0..5) };
        match action {
            0 | 1 => {
                let id = format!("t{next_id:03}");
                next_id += 1;
                let mut new = NewRecord::new()
                    .id(id.as_str())
                    .field("title", id.clone())
                    .field("project_id", rng.gen_range(1..=3i64));
                if rng.gen_bool(0.5) {
                    new = new.position(rng.gen_range(1..=8));
                }
                list.create(new).await.unwrap();
                live.push(id);
            }
            2 => {
                let id = &live[rng.gen_range(0..live.len())];
                list.move_to(&rid(id), rng.gen_range(1..=8)).await.unwrap();
            }
            3 => {
                let id = &live[rng.gen_range(0..live.len())];
                let mut changes = RecordChanges::new().field("project_id", rng.gen_range(1..=3i64));
                if rng.gen_bool(0.5) {
                    changes = changes.position(rng.gen_range(1..=8));
                }
                list.update(&rid(id), changes).await.unwrap();
            }
            _ => {
                let id = live.swap_remove(rng.gen_range(0..live.len()));
                list.delete(&rid(&id)).await.unwrap();
            }
        }

        for scope in 1..=3 {
            assert_dense(&list, &project(scope)).await;
        }
    }

    let total: usize = {
        let mut total = 0;
        for scope in 1..=3 {
            total += positions(&list, &project(scope)).await.len();
        }
        total
    };
    assert_eq!(total, live.len());
}

#[tokio::test]
async fn test_renumber_repairs_duplicates_and_gaps() {
    let list = open_list(tasks_schema()).await;
    seed_tasks(&list, 1, &["a", "b", "c", "d"]).await;

    // a=1, b=5, c=5, d=2
    corrupt_position(&list, "b", 5).await;
    corrupt_position(&list, "c", 5).await;
    corrupt_position(&list, "d", 2).await;

    let health = list.check_scope(&project(1)).await.unwrap();
    assert_eq!(health.duplicates, vec![5]);
    assert_eq!(health.gaps, vec![3, 4]);

    let result = list.renumber(&project(1)).await.unwrap();
    assert_eq!(result, Reconciliation::Renumbered { members: 4 });
    assert_eq!(positions(&list, &project(1)).await, ranked(&["a", "d", "b", "c"]));
}

#[tokio::test]
async fn test_renumber_is_deterministic() {
    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let list = open_list(tasks_schema()).await;
        seed_tasks(&list, 1, &["e", "c", "a", "d", "b"]).await;
        for id in ["e", "c", "a", "d", "b"] {
            corrupt_position(&list, id, 7).await;
        }
        list.renumber(&project(1)).await.unwrap();
        outcomes.push(positions(&list, &project(1)).await);
    }

    // All tied on position: id decides
    assert_eq!(outcomes[0], ranked(&["a", "b", "c", "d", "e"]));
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn test_renumber_dense_scope_changes_nothing() {
    let list = open_list(tasks_schema()).await;
    seed_tasks(&list, 1, &["a", "b", "c"]).await;
    list.renumber(&project(1)).await.unwrap();
    assert_eq!(positions(&list, &project(1)).await, ranked(&["a", "b", "c"]));
}
