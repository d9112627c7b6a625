use std::sync::Arc;

use dispatch_models::{
    AgentDetail, AgentId, AgentSummary, Page, PaginatedAgentSummary, PaginatedAssignments,
    ReportingConfig, SystemSummary,
};
use dispatch_store::{Store, StoreError};
use rust_decimal::Decimal;

use crate::error::EngineError;

/// Flat distance credited per delivered order, regardless of the matched cost.
pub const KM_PER_ORDER: f64 = 2.0;
/// Flat time credited per delivered order.
pub const MINUTES_PER_ORDER: f64 = 10.0;

/// Per-order pay rate for an agent holding `total_orders` assigned orders.
///
/// | orders   | rate |
/// |----------|------|
/// | >= 50    | 42   |
/// | 25 .. 49 | 35   |
/// | < 25     | 20   |
pub fn per_order_rate(total_orders: u64) -> Decimal {
    match total_orders {
        n if n >= 50 => Decimal::from(42),
        n if n >= 25 => Decimal::from(35),
        _ => Decimal::from(20),
    }
}

pub fn summarize(agent_id: AgentId, total_orders: u64) -> AgentSummary {
    let orders = total_orders as f64;
    AgentSummary {
        agent_id,
        total_orders,
        total_km: orders * KM_PER_ORDER,
        total_minutes: orders * MINUTES_PER_ORDER,
        profit: per_order_rate(total_orders) * Decimal::from(total_orders),
    }
}

/// Read-only summaries derived from orders and the assignment ledger.
pub struct Reporter {
    store: Arc<dyn Store>,
    default_page_size: u32,
}

impl Reporter {
    pub fn new(store: Arc<dyn Store>, config: &ReportingConfig) -> Self {
        Self {
            store,
            default_page_size: config.default_page_size,
        }
    }

    pub fn page(&self, page: u32, limit: u32) -> Page {
        Page::with_default_limit(page, limit, self.default_page_size)
    }

    /// Agents holding assigned orders, ascending by id, one page at a time.
    pub async fn agent_summary(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedAgentSummary, EngineError> {
        let page = self.page(page, limit);
        let total_agents = self.store.count_agents_with_orders().await?;
        let counts = self
            .store
            .agent_order_counts(u64::from(page.limit), page.offset())
            .await?;

        Ok(PaginatedAgentSummary {
            current_page: page.page,
            total_pages: page.total_pages(total_agents),
            data: counts
                .into_iter()
                .map(|c| summarize(c.agent_id, c.orders))
                .collect(),
        })
    }

    pub async fn system_summary(&self, page: u32, limit: u32) -> Result<SystemSummary, EngineError> {
        let totals = self.store.order_totals().await?;
        let agent_utilization = self.agent_summary(page, limit).await?;
        Ok(SystemSummary {
            total_orders: totals.total,
            assigned_orders: totals.assigned,
            deferred_orders: totals.total.saturating_sub(totals.assigned),
            agent_utilization,
        })
    }

    pub async fn agent_detail(&self, agent_id: AgentId) -> Result<AgentDetail, EngineError> {
        let agent = self
            .store
            .find_agent(agent_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))?;
        let orders = self.store.assigned_order_count(agent_id).await?;
        Ok(AgentDetail {
            agent,
            summary: summarize(agent_id, orders),
        })
    }

    /// The assignment ledger, ascending by assignment id.
    pub async fn assignments(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedAssignments, EngineError> {
        let page = self.page(page, limit);
        let total_items = self.store.count_assignments().await?;
        let data = self
            .store
            .list_assignments(u64::from(page.limit), page.offset())
            .await?;
        Ok(PaginatedAssignments {
            current_page: page.page,
            total_pages: page.total_pages(total_items),
            total_items,
            data,
        })
    }
}
