use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type WarehouseId = i64;
pub type AgentId = i64;
pub type OrderId = i64;
pub type AssignmentId = i64;

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub location: Location,
}

/// A courier attached to one warehouse. Only checked-in agents receive orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub warehouse_id: WarehouseId,
    pub checked_in: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub customer: String,
    pub location: Location,
    pub warehouse_id: WarehouseId,
    pub assigned: bool,
    /// Set together with `assigned`, never cleared.
    pub agent_id: Option<AgentId>,
}

/// Input for creating an order. Orders always start unassigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewOrder {
    pub customer: String,
    pub lat: f64,
    pub lng: f64,
    pub warehouse_id: WarehouseId,
}

impl NewOrder {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkOrderRequest {
    pub orders: Vec<NewOrder>,
}

/// One row of the append-only assignment ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: AssignmentId,
    pub agent_id: AgentId,
    pub order_id: OrderId,
    pub assigned_at: DateTime<Utc>,
}
