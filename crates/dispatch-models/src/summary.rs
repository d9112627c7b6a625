use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::records::{Agent, AgentId, Assignment};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// A normalized pagination request. Pages are 1-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(page: u32, limit: u32) -> Self {
        Self::with_default_limit(page, limit, DEFAULT_PAGE_LIMIT)
    }

    /// Page 0 becomes page 1; a zero limit falls back to `default_limit`.
    pub fn with_default_limit(page: u32, limit: u32, default_limit: u32) -> Self {
        let limit = if limit == 0 {
            default_limit.max(1)
        } else {
            limit
        };
        Self {
            page: page.max(1),
            limit,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total_items: u64) -> u32 {
        total_items.div_ceil(u64::from(self.limit)) as u32
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_LIMIT)
    }
}

/// Derived per-agent utilization and earnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub total_orders: u64,
    pub total_km: f64,
    pub total_minutes: f64,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedAgentSummary {
    pub current_page: u32,
    pub total_pages: u32,
    pub data: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSummary {
    pub total_orders: u64,
    pub assigned_orders: u64,
    /// Orders not yet assigned: `total_orders - assigned_orders`.
    pub deferred_orders: u64,
    pub agent_utilization: PaginatedAgentSummary,
}

/// A single agent's record together with its derived summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDetail {
    pub agent: Agent,
    pub summary: AgentSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedAssignments {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub data: Vec<Assignment>,
}
