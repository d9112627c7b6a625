use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use dispatch_models::{
    Agent, AgentAllocation, AgentId, AllocationConfig, AllocationReport, BudgetWindow, Order,
};
use dispatch_store::Store;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::distance::{DistanceEstimator, FlatOffsetEstimator};
use crate::error::EngineError;

/// How often a pass waiting on another process's lease retries.
const LEASE_POLL: Duration = Duration::from_millis(100);

/// Greedy order-to-agent matcher.
///
/// Each pass walks the unassigned orders once, in store order, and gives each
/// order to the checked-in agent with the cheapest qualifying cost. An agent
/// qualifies while its cumulative cost plus the order's cost stays within
/// `max_distance_per_agent`. Ties go to the lowest agent id. Nothing is
/// backtracked or rebalanced.
///
/// Order cost is measured from the order to `reference_point`; the agent's
/// own position does not enter into it, so agents compete on remaining
/// budget only.
///
/// Passes are serialized twice over: an in-process gate, then a lease row in
/// the store so that allocators in other processes sharing the database
/// never overlap with this one.
pub struct Allocator {
    store: Arc<dyn Store>,
    estimator: Arc<dyn DistanceEstimator>,
    config: AllocationConfig,
    gate: Mutex<()>,
}

#[derive(Debug, Default)]
struct AgentLoad {
    /// Cost already committed earlier in the budget window.
    carried: f64,
    /// Cost committed by the current pass.
    added: f64,
    order_ids: Vec<i64>,
}

impl AgentLoad {
    fn total(&self) -> f64 {
        self.carried + self.added
    }
}

impl Allocator {
    pub fn new(
        store: Arc<dyn Store>,
        estimator: Arc<dyn DistanceEstimator>,
        config: AllocationConfig,
    ) -> Self {
        Self {
            store,
            estimator,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Allocator using the flat-offset estimator configured in `config`.
    pub fn from_config(store: Arc<dyn Store>, config: AllocationConfig) -> Self {
        let estimator = Arc::new(FlatOffsetEstimator::new(config.base_offset));
        Self::new(store, estimator, config)
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// How long manual triggers wait for an in-flight pass.
    pub fn trigger_wait(&self) -> Duration {
        Duration::from_secs(self.config.trigger_wait_seconds)
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.config.lease_seconds)
    }

    /// Run one pass, waiting as long as needed for any pass in flight, here
    /// or in another process.
    pub async fn allocate(&self) -> Result<AllocationReport, EngineError> {
        let _guard = self.gate.lock().await;
        self.leased_pass(None).await
    }

    /// Run one pass, waiting at most `wait` in total for a pass in flight,
    /// here or in another process. A zero wait rejects immediately.
    pub async fn allocate_within(&self, wait: Duration) -> Result<AllocationReport, EngineError> {
        let deadline = Instant::now() + wait;
        let _guard = tokio::time::timeout(wait, self.gate.lock())
            .await
            .map_err(|_| EngineError::Busy(wait.as_secs()))?;
        self.leased_pass(Some((deadline, wait))).await
    }

    /// Resolves once no pass is in flight.
    pub async fn wait_idle(&self) {
        drop(self.gate.lock().await);
    }

    /// Cost of delivering `order`, as seen by every agent.
    pub fn order_cost(&self, order: &Order) -> f64 {
        self.estimator
            .estimate(order.location, self.config.reference_point)
    }

    async fn leased_pass(
        &self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<AllocationReport, EngineError> {
        let run_id = Uuid::new_v4();
        let holder = run_id.to_string();
        self.acquire_lease(&holder, deadline).await?;

        let result = self.run_pass(run_id).await;
        if let Err(e) = self.store.release_lease(&holder).await {
            warn!(%run_id, error = %e, "Failed to release allocation lease");
        }
        result
    }

    async fn acquire_lease(
        &self,
        holder: &str,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), EngineError> {
        let mut waiting = false;
        loop {
            let acquired = self
                .store
                .try_acquire_lease(holder, self.lease_ttl())
                .await
                .map_err(|source| EngineError::StoreUnavailable {
                    resource: "allocation lease",
                    source,
                })?;
            if acquired {
                return Ok(());
            }
            if !waiting {
                debug!(holder, "Allocation lease held elsewhere; waiting");
                waiting = true;
            }
            let nap = match deadline {
                None => LEASE_POLL,
                Some((deadline, wait)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(EngineError::Busy(wait.as_secs()));
                    }
                    LEASE_POLL.min(deadline - now)
                }
            };
            tokio::time::sleep(nap).await;
        }
    }

    /// Extend this pass's lease. False if another holder took it over.
    async fn renew_lease(&self, holder: &str) -> bool {
        match self.store.try_acquire_lease(holder, self.lease_ttl()).await {
            Ok(held) => held,
            Err(e) => {
                warn!(holder, error = %e, "Failed to renew allocation lease");
                false
            }
        }
    }

    async fn run_pass(&self, run_id: Uuid) -> Result<AllocationReport, EngineError> {
        let started_at = Utc::now();
        let budget = self.config.max_distance_per_agent;

        let mut agents = self
            .store
            .list_checked_in_agents()
            .await
            .map_err(|source| EngineError::StoreUnavailable {
                resource: "agents",
                source,
            })?;
        let orders = self
            .store
            .list_unassigned_orders()
            .await
            .map_err(|source| EngineError::StoreUnavailable {
                resource: "orders",
                source,
            })?;
        agents.sort_by_key(|a| a.id);

        info!(
            %run_id,
            agents = agents.len(),
            orders = orders.len(),
            budget,
            "Starting allocation pass"
        );

        let mut loads: BTreeMap<AgentId, AgentLoad> = agents
            .iter()
            .map(|a| (a.id, AgentLoad::default()))
            .collect();
        self.seed_carried_load(&mut loads, started_at).await?;

        let mut deferred = Vec::new();
        let mut failed = Vec::new();
        let holder = run_id.to_string();
        let mut renewed_at = Instant::now();

        for (index, order) in orders.iter().enumerate() {
            if renewed_at.elapsed() >= self.lease_ttl() / 2 {
                if !self.renew_lease(&holder).await {
                    warn!(%run_id, remaining = orders.len() - index, "Allocation lease lost; stopping pass early");
                    deferred.extend(orders[index..].iter().map(|o| o.id));
                    break;
                }
                renewed_at = Instant::now();
            }
            let cost = self.order_cost(order);
            let Some(agent_id) = select_agent(&agents, &loads, cost, budget) else {
                debug!(%run_id, order_id = order.id, cost, "No agent can absorb order");
                deferred.push(order.id);
                continue;
            };

            match self.store.commit_assignment(order.id, agent_id).await {
                Ok(_) => {
                    if let Some(load) = loads.get_mut(&agent_id) {
                        load.added += cost;
                        load.order_ids.push(order.id);
                    }
                }
                Err(e) => {
                    warn!(%run_id, order_id = order.id, agent_id, error = %e, "Failed to commit assignment");
                    failed.push(order.id);
                }
            }
        }

        let agents: Vec<AgentAllocation> = loads
            .into_iter()
            .filter(|(_, load)| !load.order_ids.is_empty())
            .map(|(agent_id, load)| AgentAllocation {
                agent_id,
                order_ids: load.order_ids,
                distance: load.added,
            })
            .collect();

        for agent in &agents {
            info!(
                %run_id,
                agent_id = agent.agent_id,
                orders = agent.order_ids.len(),
                distance = agent.distance,
                "Agent assigned orders"
            );
        }

        let report = AllocationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            orders_considered: orders.len(),
            assigned: agents.iter().map(|a| a.order_ids.len()).sum(),
            agents,
            deferred_order_ids: deferred,
            failed_order_ids: failed,
        };
        info!(
            %run_id,
            assigned = report.assigned_count(),
            deferred = report.deferred_order_ids.len(),
            failed = report.failed_order_ids.len(),
            "Allocation pass complete"
        );
        Ok(report)
    }

    async fn seed_carried_load(
        &self,
        loads: &mut BTreeMap<AgentId, AgentLoad>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.config.budget_window == BudgetWindow::Run {
            return Ok(());
        }
        let since = day_start(&now.with_timezone(&Local));
        let prior = self
            .store
            .assigned_since(since)
            .await
            .map_err(|source| EngineError::StoreUnavailable {
                resource: "assignment ledger",
                source,
            })?;
        for order in &prior {
            let Some(agent_id) = order.agent_id else {
                continue;
            };
            if let Some(load) = loads.get_mut(&agent_id) {
                load.carried += self.order_cost(order);
            }
        }
        Ok(())
    }
}

/// Pick the agent for an order of cost `cost`. `agents` must be sorted by id;
/// the first agent with the smallest qualifying cost wins.
fn select_agent(
    agents: &[Agent],
    loads: &BTreeMap<AgentId, AgentLoad>,
    cost: f64,
    budget: f64,
) -> Option<AgentId> {
    let mut best: Option<(AgentId, f64)> = None;
    for agent in agents {
        let used = loads.get(&agent.id).map_or(0.0, AgentLoad::total);
        if used >= budget || used + cost > budget {
            continue;
        }
        if best.map_or(true, |(_, best_cost)| cost < best_cost) {
            best = Some((agent.id, cost));
        }
    }
    best.map(|(id, _)| id)
}

/// Start of the local calendar day containing `now`, in UTC. Falls forward
/// past a DST gap at midnight.
pub fn day_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let date = now.date_naive();
    let tz = now.timezone();
    (0..3)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}
