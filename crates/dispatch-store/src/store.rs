use async_trait::async_trait;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatch_models::{Agent, AgentId, Assignment, Order, OrderId};

use crate::error::StoreError;

/// Number of assigned orders held by one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOrderCount {
    pub agent_id: AgentId,
    pub orders: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    pub total: u64,
    pub assigned: u64,
}

/// Storage capability consumed by the allocation engine and the reporting
/// aggregator. Mockable for testing.
#[async_trait]
pub trait Store: Send + Sync {
    /// Checked-in agents, ascending by id.
    async fn list_checked_in_agents(&self) -> Result<Vec<Agent>, StoreError>;

    /// Orders with `assigned = false`, ascending by id.
    async fn list_unassigned_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Orders whose ledger row was written at or after `since`.
    async fn assigned_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;

    /// Marks the order assigned to `agent_id` and appends its ledger row as
    /// one atomic unit. Fails with `Conflict` if the order is already assigned.
    async fn commit_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, StoreError>;

    /// Assigned-order counts grouped by agent, ascending by agent id.
    async fn agent_order_counts(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AgentOrderCount>, StoreError>;

    /// Distinct agents holding at least one assigned order.
    async fn count_agents_with_orders(&self) -> Result<u64, StoreError>;

    async fn order_totals(&self) -> Result<OrderTotals, StoreError>;

    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<Agent>, StoreError>;

    async fn assigned_order_count(&self, agent_id: AgentId) -> Result<u64, StoreError>;

    /// Ledger rows ascending by id.
    async fn list_assignments(&self, limit: u64, offset: u64)
        -> Result<Vec<Assignment>, StoreError>;

    async fn count_assignments(&self) -> Result<u64, StoreError>;

    /// Claim the allocation lease for `holder` until `ttl` from now. Returns
    /// false while another holder's lease is unexpired. Re-acquiring by the
    /// current holder extends it.
    async fn try_acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Release the lease if `holder` still owns it.
    async fn release_lease(&self, holder: &str) -> Result<(), StoreError>;
}
