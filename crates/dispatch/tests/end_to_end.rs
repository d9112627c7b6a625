//! Full workflow through the umbrella crate against a file-backed store:
//! config, CRUD, an allocation pass, then reporting from a second connection.
//!
//! Run with:
//! ```bash
//! cargo test -p dispatch --test end_to_end
//! ```

use dispatch::models::{Location, NewOrder};
use dispatch::store::Store;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let db_path = dir.join("dispatch.db");
    let config_path = dir.join("dispatch.toml");
    let contents = format!(
        r#"
[store]
sqlite_path = "{}"

[allocation]
max_distance_per_agent = 20.0
budget_window = "run"

[schedule]
enabled = false

[reporting]
default_page_size = 2
"#,
        db_path.display()
    );
    std::fs::write(&config_path, contents).unwrap();
    config_path
}

#[tokio::test]
async fn allocate_then_report_from_another_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = dispatch::load_config(write_config(dir.path())).unwrap();

    let store = dispatch::open_store(&config).unwrap();
    let wh = store
        .create_warehouse("North", Location::new(28.61, 77.21))
        .unwrap();
    let agents: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| store.check_in_agent(name, wh.id).unwrap())
        .collect();
    // Each order costs 2 + 3 + 3 = 8; two fit in a budget of 20.
    let batch: Vec<NewOrder> = (0..7)
        .map(|i| NewOrder {
            customer: format!("c{i}"),
            lat: 3.0,
            lng: 3.0,
            warehouse_id: wh.id,
        })
        .collect();
    store.create_orders(&batch).unwrap();

    let report = dispatch::build_allocator(&config, store.clone())
        .allocate()
        .await
        .unwrap();
    assert_eq!(report.assigned_count(), 6);
    assert_eq!(report.deferred_order_ids.len(), 1);
    for agent in &agents {
        assert_eq!(report.orders_for(agent.id), 2);
    }

    let reader = dispatch::open_store(&config).unwrap();
    assert_eq!(reader.count_assignments().await.unwrap(), 6);
    assert_eq!(reader.ledger_mismatches().unwrap(), 0);

    let reporter = dispatch::build_reporter(&config, reader);
    let summary = reporter.system_summary(0, 0).await.unwrap();
    assert_eq!(summary.total_orders, 7);
    assert_eq!(summary.assigned_orders, 6);
    assert_eq!(summary.deferred_orders, 1);
    assert_eq!(summary.agent_utilization.total_pages, 2);
    assert_eq!(summary.agent_utilization.data.len(), 2);
    assert_eq!(summary.agent_utilization.data[0].total_km, 4.0);

    let detail = reporter.agent_detail(agents[2].id).await.unwrap();
    assert_eq!(detail.agent.name, "c");
    assert_eq!(detail.summary.total_minutes, 20.0);
}

#[tokio::test]
async fn checked_out_agents_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = dispatch::load_config(write_config(dir.path())).unwrap();
    let store = dispatch::open_store(&config).unwrap();

    let wh = store.create_warehouse("South", Location::new(0.0, 0.0)).unwrap();
    let away = store.check_in_agent("away", wh.id).unwrap();
    let here = store.check_in_agent("here", wh.id).unwrap();
    store.check_out_agent(away.id).unwrap();
    store
        .create_order(&NewOrder {
            customer: "c".to_string(),
            lat: 1.0,
            lng: 1.0,
            warehouse_id: wh.id,
        })
        .unwrap();

    let report = dispatch::build_allocator(&config, store.clone())
        .allocate()
        .await
        .unwrap();
    assert_eq!(report.orders_for(away.id), 0);
    assert_eq!(report.orders_for(here.id), 1);
}
