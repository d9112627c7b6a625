use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::{AgentId, OrderId};

/// Orders one agent received during a single allocation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentAllocation {
    pub agent_id: AgentId,
    pub order_ids: Vec<OrderId>,
    /// Estimated cost absorbed in this pass only.
    pub distance: f64,
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub orders_considered: usize,
    /// Orders newly assigned by this pass.
    pub assigned: usize,
    /// Agents that received at least one order, ascending by id.
    pub agents: Vec<AgentAllocation>,
    /// Orders no agent could absorb. Retried on the next pass.
    pub deferred_order_ids: Vec<OrderId>,
    /// Orders whose commit failed. Left unassigned for the next pass.
    pub failed_order_ids: Vec<OrderId>,
}

impl AllocationReport {
    pub fn assigned_count(&self) -> usize {
        self.assigned
    }

    pub fn orders_for(&self, agent_id: AgentId) -> usize {
        self.agents
            .iter()
            .find(|a| a.agent_id == agent_id)
            .map_or(0, |a| a.order_ids.len())
    }
}
