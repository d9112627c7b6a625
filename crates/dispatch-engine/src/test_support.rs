//! In-memory `Store` with fault injection, for exercising the allocator,
//! the reporter and the scheduler without SQLite.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_models::{Agent, AgentId, Assignment, Location, Order, OrderId};
use dispatch_store::{AgentOrderCount, OrderTotals, Store, StoreError};

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    orders: Vec<Order>,
    assignments: Vec<Assignment>,
    lease: Option<(String, DateTime<Utc>)>,
}

#[derive(Default)]
struct Faults {
    agents: bool,
    orders: bool,
    commits: HashSet<OrderId>,
    commit_delay: Option<Duration>,
}

/// Store that keeps every record in memory. All records belong to warehouse 1.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, name: &str, checked_in: bool) -> AgentId {
        let mut state = self.state.lock().unwrap();
        let id = state.agents.len() as AgentId + 1;
        state.agents.push(Agent {
            id,
            name: name.to_string(),
            warehouse_id: 1,
            checked_in,
        });
        id
    }

    pub fn add_order(&self, lat: f64, lng: f64) -> OrderId {
        let mut state = self.state.lock().unwrap();
        let id = state.orders.len() as OrderId + 1;
        state.orders.push(Order {
            id,
            customer: format!("customer-{id}"),
            location: Location::new(lat, lng),
            warehouse_id: 1,
            assigned: false,
            agent_id: None,
        });
        id
    }

    /// Seed an order that was assigned by an earlier pass.
    pub fn add_assigned_order(
        &self,
        lat: f64,
        lng: f64,
        agent_id: AgentId,
        assigned_at: DateTime<Utc>,
    ) -> OrderId {
        let id = self.add_order(lat, lng);
        let mut state = self.state.lock().unwrap();
        record_assignment(&mut state, id, agent_id, assigned_at);
        id
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        let state = self.state.lock().unwrap();
        state.orders.iter().find(|o| o.id == id).cloned()
    }

    /// Current lease holder, if its lease has not expired.
    pub fn lease_holder(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .lease
            .as_ref()
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(holder, _)| holder.clone())
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        self.state.lock().unwrap().assignments.clone()
    }

    pub fn fail_agent_reads(&self, fail: bool) {
        self.faults.lock().unwrap().agents = fail;
    }

    pub fn fail_order_reads(&self, fail: bool) {
        self.faults.lock().unwrap().orders = fail;
    }

    pub fn fail_commit_for(&self, order_id: OrderId) {
        self.faults.lock().unwrap().commits.insert(order_id);
    }

    /// Every commit sleeps this long first. Keeps a pass in flight for tests
    /// that race triggers or shutdown against it.
    pub fn set_commit_delay(&self, delay: Duration) {
        self.faults.lock().unwrap().commit_delay = Some(delay);
    }
}

fn record_assignment(
    state: &mut State,
    order_id: OrderId,
    agent_id: AgentId,
    assigned_at: DateTime<Utc>,
) -> Assignment {
    if let Some(order) = state.orders.iter_mut().find(|o| o.id == order_id) {
        order.assigned = true;
        order.agent_id = Some(agent_id);
    }
    let assignment = Assignment {
        id: state.assignments.len() as i64 + 1,
        agent_id,
        order_id,
        assigned_at,
    };
    state.assignments.push(assignment.clone());
    assignment
}

fn unavailable(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_checked_in_agents(&self) -> Result<Vec<Agent>, StoreError> {
        if self.faults.lock().unwrap().agents {
            return Err(unavailable("agent read"));
        }
        let state = self.state.lock().unwrap();
        Ok(state.agents.iter().filter(|a| a.checked_in).cloned().collect())
    }

    async fn list_unassigned_orders(&self) -> Result<Vec<Order>, StoreError> {
        if self.faults.lock().unwrap().orders {
            return Err(unavailable("order read"));
        }
        let state = self.state.lock().unwrap();
        Ok(state.orders.iter().filter(|o| !o.assigned).cloned().collect())
    }

    async fn assigned_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.assigned_at >= since)
            .filter_map(|a| state.orders.iter().find(|o| o.id == a.order_id).cloned())
            .collect())
    }

    async fn commit_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, StoreError> {
        let (fail, delay) = {
            let faults = self.faults.lock().unwrap();
            (faults.commits.contains(&order_id), faults.commit_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(unavailable("commit"));
        }

        let mut state = self.state.lock().unwrap();
        match state.orders.iter().find(|o| o.id == order_id) {
            None => return Err(StoreError::NotFound(format!("order {order_id}"))),
            Some(o) if o.assigned => {
                return Err(StoreError::Conflict(format!(
                    "order {order_id} is already assigned"
                )))
            }
            Some(_) => {}
        }
        Ok(record_assignment(&mut state, order_id, agent_id, Utc::now()))
    }

    async fn agent_order_counts(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AgentOrderCount>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut counts = std::collections::BTreeMap::<AgentId, u64>::new();
        for order in state.orders.iter().filter(|o| o.assigned) {
            if let Some(agent_id) = order.agent_id {
                *counts.entry(agent_id).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(agent_id, orders)| AgentOrderCount { agent_id, orders })
            .collect())
    }

    async fn count_agents_with_orders(&self) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        let distinct: HashSet<AgentId> = state
            .orders
            .iter()
            .filter(|o| o.assigned)
            .filter_map(|o| o.agent_id)
            .collect();
        Ok(distinct.len() as u64)
    }

    async fn order_totals(&self) -> Result<OrderTotals, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(OrderTotals {
            total: state.orders.len() as u64,
            assigned: state.orders.iter().filter(|o| o.assigned).count() as u64,
        })
    }

    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<Agent>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.agents.iter().find(|a| a.id == agent_id).cloned())
    }

    async fn assigned_order_count(&self, agent_id: AgentId) -> Result<u64, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .orders
            .iter()
            .filter(|o| o.assigned && o.agent_id == Some(agent_id))
            .count() as u64)
    }

    async fn list_assignments(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_assignments(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().unwrap().assignments.len() as u64)
    }

    async fn try_acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let free = match &state.lease {
            None => true,
            Some((current, expires_at)) => current == holder || *expires_at <= now,
        };
        if free {
            let expires_at = chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.lease = Some((holder.to_string(), expires_at));
        }
        Ok(free)
    }

    async fn release_lease(&self, holder: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.lease.as_ref().is_some_and(|(current, _)| current == holder) {
            state.lease = None;
        }
        Ok(())
    }
}
