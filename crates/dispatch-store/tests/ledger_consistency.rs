//! Concurrency tests for the assignment commit on a shared SQLite file.
//!
//! A writer commits assignments while separate reader connections keep
//! checking that no order is flagged assigned without its ledger row (or the
//! reverse). WAL mode plus the per-order transaction must make every read see
//! either the whole commit or none of it.
//!
//! Run with:
//! ```bash
//! cargo test -p dispatch-store --test ledger_consistency
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dispatch_models::{Location, NewOrder};
use dispatch_store::{SqliteStore, Store, StoreError};

fn orders(n: usize, warehouse_id: i64) -> Vec<NewOrder> {
    (0..n)
        .map(|i| NewOrder {
            customer: format!("customer-{i}"),
            lat: i as f64 * 0.01,
            lng: i as f64 * 0.02,
            warehouse_id,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_torn_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let path = path.to_str().unwrap().to_string();

    let writer = SqliteStore::open(&path).unwrap();
    let wh = writer
        .create_warehouse("Central", Location::new(12.97, 77.59))
        .unwrap();
    let agent = writer.check_in_agent("Kiran", wh.id).unwrap();
    let created = writer.create_orders(&orders(150, wh.id)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let reader = SqliteStore::open(&path).unwrap();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut checks = 0u64;
            while !done.load(Ordering::Acquire) {
                assert_eq!(reader.ledger_mismatches().unwrap(), 0, "torn commit observed");
                checks += 1;
                tokio::task::yield_now().await;
            }
            checks
        }));
    }

    let writer_task = tokio::spawn(async move {
        for order in &created {
            writer.commit_assignment(order.id, agent.id).await.unwrap();
            tokio::task::yield_now().await;
        }
        writer
    });

    let writer = writer_task.await.unwrap();
    done.store(true, Ordering::Release);
    for reader in readers {
        let checks = reader.await.unwrap();
        assert!(checks > 0);
    }

    assert_eq!(writer.count_assignments().await.unwrap(), 150);
    assert_eq!(writer.ledger_mismatches().unwrap(), 0);
    assert!(writer.list_unassigned_orders().await.unwrap().is_empty());
}

/// Two connections racing to assign the same orders: each order ends up with
/// exactly one ledger row and the loser gets a conflict.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_commits_assign_each_order_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let path = path.to_str().unwrap().to_string();

    let setup = SqliteStore::open(&path).unwrap();
    let wh = setup.create_warehouse("Central", Location::default()).unwrap();
    let a = setup.check_in_agent("A", wh.id).unwrap();
    let b = setup.check_in_agent("B", wh.id).unwrap();
    let created = setup.create_orders(&orders(60, wh.id)).unwrap();
    let ids: Vec<i64> = created.iter().map(|o| o.id).collect();

    let spawn_racer = |agent_id: i64| {
        let store = SqliteStore::open(&path).unwrap();
        let ids = ids.clone();
        tokio::spawn(async move {
            let mut won = 0usize;
            for id in ids {
                match store.commit_assignment(id, agent_id).await {
                    Ok(_) => won += 1,
                    Err(StoreError::Conflict(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            won
        })
    };

    let first = spawn_racer(a.id);
    let second = spawn_racer(b.id);
    let total = first.await.unwrap() + second.await.unwrap();

    assert_eq!(total, 60);
    assert_eq!(setup.count_assignments().await.unwrap(), 60);
    assert_eq!(setup.ledger_mismatches().unwrap(), 0);
}
