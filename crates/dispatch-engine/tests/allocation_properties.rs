//! End-to-end allocation and reporting against an in-memory SQLite store.
//!
//! Run with:
//! ```bash
//! cargo test -p dispatch-engine --test allocation_properties
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dispatch_engine::{Allocator, DistanceEstimator, FlatOffsetEstimator, Reporter};
use dispatch_models::{
    AllocationConfig, BudgetWindow, Location, NewOrder, ReportingConfig, Warehouse,
};
use dispatch_store::{SqliteStore, Store};

fn new_order(customer: &str, lat: f64, lng: f64, warehouse_id: i64) -> NewOrder {
    NewOrder {
        customer: customer.to_string(),
        lat,
        lng,
        warehouse_id,
    }
}

fn setup() -> (Arc<SqliteStore>, Warehouse) {
    let store = SqliteStore::open_in_memory().unwrap();
    let wh = store
        .create_warehouse("Central", Location::new(12.97, 77.59))
        .unwrap();
    (Arc::new(store), wh)
}

fn run_config(window: BudgetWindow) -> AllocationConfig {
    AllocationConfig {
        budget_window: window,
        ..AllocationConfig::default()
    }
}

/// One warehouse, two agents, three cheap orders: everything is assigned and
/// the summaries account for exactly three orders.
#[tokio::test]
async fn two_agents_three_orders_all_assigned() {
    let (store, wh) = setup();
    store.check_in_agent("Anil", wh.id).unwrap();
    store.check_in_agent("Bina", wh.id).unwrap();
    let orders = store
        .create_orders(&[
            new_order("c1", 1.0, 2.0, wh.id),
            new_order("c2", 3.0, 1.0, wh.id),
            new_order("c3", 0.5, 0.5, wh.id),
        ])
        .unwrap();

    let allocator = Allocator::from_config(store.clone(), AllocationConfig::default());
    let report = allocator.allocate().await.unwrap();
    assert_eq!(report.assigned_count(), 3);

    for order in &orders {
        assert!(store.get_order(order.id).unwrap().unwrap().assigned);
    }
    assert_eq!(store.count_assignments().await.unwrap(), 3);
    assert_eq!(store.ledger_mismatches().unwrap(), 0);

    let reporter = Reporter::new(store.clone(), &ReportingConfig::default());
    let summary = reporter.agent_summary(1, 10).await.unwrap();
    let total: u64 = summary.data.iter().map(|s| s.total_orders).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn assigned_orders_are_never_revisited() {
    let (store, wh) = setup();
    let first = store.check_in_agent("Anil", wh.id).unwrap();
    let order = store.create_order(&new_order("c1", 1.0, 1.0, wh.id)).unwrap();

    let allocator = Allocator::from_config(store.clone(), run_config(BudgetWindow::Run));
    allocator.allocate().await.unwrap();

    // A fresh agent with an empty budget must not attract the order.
    store.check_out_agent(first.id).unwrap();
    store.check_in_agent("Bina", wh.id).unwrap();
    let report = allocator.allocate().await.unwrap();

    assert_eq!(report.orders_considered, 0);
    let stored = store.get_order(order.id).unwrap().unwrap();
    assert_eq!(stored.agent_id, Some(first.id));
    assert_eq!(store.count_assignments().await.unwrap(), 1);
}

#[tokio::test]
async fn per_agent_cost_stays_within_budget() {
    let (store, wh) = setup();
    for name in ["a", "b", "c"] {
        store.check_in_agent(name, wh.id).unwrap();
    }
    let batch: Vec<NewOrder> = (0..40)
        .map(|i| new_order(&format!("c{i}"), (i % 7) as f64 * 3.5, (i % 5) as f64 * 4.25, wh.id))
        .collect();
    let orders = store.create_orders(&batch).unwrap();
    let by_id: HashMap<i64, Location> = orders.iter().map(|o| (o.id, o.location)).collect();

    let config = AllocationConfig::default();
    let estimator = FlatOffsetEstimator::new(config.base_offset);
    let allocator = Allocator::from_config(store.clone(), config.clone());
    let report = allocator.allocate().await.unwrap();

    assert!(report.assigned_count() > 0);
    assert!(!report.deferred_order_ids.is_empty());
    for agent in &report.agents {
        let recomputed: f64 = agent
            .order_ids
            .iter()
            .map(|id| estimator.estimate(by_id[id], config.reference_point))
            .sum();
        assert!((recomputed - agent.distance).abs() < 1e-9);
        assert!(recomputed <= config.max_distance_per_agent);
    }
}

#[tokio::test]
async fn second_run_assigns_nothing_new() {
    let (store, wh) = setup();
    store.check_in_agent("a", wh.id).unwrap();
    store.check_in_agent("b", wh.id).unwrap();
    let batch: Vec<NewOrder> = (0..12)
        .map(|i| new_order(&format!("c{i}"), 10.0 + i as f64, 5.0, wh.id))
        .collect();
    store.create_orders(&batch).unwrap();

    let allocator = Allocator::from_config(store.clone(), AllocationConfig::default());
    let first = allocator.allocate().await.unwrap();
    assert!(first.assigned_count() > 0);
    assert!(!first.deferred_order_ids.is_empty());
    let unmatched = store.list_unassigned_orders().await.unwrap();

    let second = allocator.allocate().await.unwrap();
    assert_eq!(second.assigned_count(), 0);
    assert_eq!(second.deferred_order_ids.len(), unmatched.len());
    assert_eq!(
        store.count_assignments().await.unwrap() as usize,
        first.assigned_count()
    );
}

#[tokio::test]
async fn ties_go_to_the_lowest_agent_id() {
    let (store, wh) = setup();
    let a = store.check_in_agent("a", wh.id).unwrap();
    let b = store.check_in_agent("b", wh.id).unwrap();
    store
        .create_orders(&[new_order("c1", 1.0, 1.0, wh.id), new_order("c2", 2.0, 2.0, wh.id)])
        .unwrap();

    let report = Allocator::from_config(store.clone(), AllocationConfig::default())
        .allocate()
        .await
        .unwrap();
    assert_eq!(report.orders_for(a.id), 2);
    assert_eq!(report.orders_for(b.id), 0);
}

#[tokio::test]
async fn system_summary_after_partial_allocation() {
    let (store, wh) = setup();
    store.check_in_agent("a", wh.id).unwrap();
    // Six cheap orders fit (6 * 4 = 24); four cost more than the whole budget.
    let mut batch: Vec<NewOrder> = (0..6)
        .map(|i| new_order(&format!("near{i}"), 1.0, 1.0, wh.id))
        .collect();
    batch.extend((0..4).map(|i| new_order(&format!("far{i}"), 80.0, 80.0, wh.id)));
    store.create_orders(&batch).unwrap();

    Allocator::from_config(store.clone(), AllocationConfig::default())
        .allocate()
        .await
        .unwrap();

    let summary = Reporter::new(store.clone(), &ReportingConfig::default())
        .system_summary(1, 10)
        .await
        .unwrap();
    assert_eq!(summary.total_orders, 10);
    assert_eq!(summary.assigned_orders, 6);
    assert_eq!(summary.deferred_orders, 4);
    assert_eq!(summary.agent_utilization.data[0].total_orders, 6);
}
