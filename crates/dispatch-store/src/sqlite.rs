use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dispatch_models::schema::DISPATCH_SCHEMA_DDL;
use dispatch_models::{
    Agent, AgentId, Assignment, Location, NewOrder, Order, OrderId, Warehouse, WarehouseId,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{AgentOrderCount, OrderTotals, Store};

const AGENT_COLUMNS: &str = "id, name, warehouse_id, checked_in";
const ORDER_COLUMNS: &str = "id, customer, lat, lng, warehouse_id, assigned, agent_id";

/// SQLite-backed store for warehouses, agents, orders and the assignment ledger.
///
/// File databases run in WAL mode so reporting reads proceed while an
/// allocation pass writes. Access is synchronized via `Mutex` since
/// `rusqlite::Connection` is not `Sync`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file. Creates the schema if missing.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn).inspect(|_| info!(path, "Opened dispatch store"))
    }

    /// Open an in-memory database with the schema applied. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(DISPATCH_SCHEMA_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn create_warehouse(&self, name: &str, location: Location) -> Result<Warehouse, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO warehouses (name, lat, lng) VALUES (?1, ?2, ?3)",
            params![name, location.lat, location.lng],
        )?;
        Ok(Warehouse {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            location,
        })
    }

    pub fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>, StoreError> {
        let conn = self.lock()?;
        Ok(query_warehouse(&conn, id)?)
    }

    /// Check an agent in. Repeating the check-in for the same name and
    /// warehouse flips the flag back on and returns the existing agent.
    pub fn check_in_agent(&self, name: &str, warehouse_id: WarehouseId) -> Result<Agent, StoreError> {
        let conn = self.lock()?;
        require_warehouse(&conn, warehouse_id)?;
        let agent = conn.query_row(
            &format!(
                "INSERT INTO agents (name, warehouse_id, checked_in) VALUES (?1, ?2, 1) \
                 ON CONFLICT (name, warehouse_id) DO UPDATE SET checked_in = 1 \
                 RETURNING {AGENT_COLUMNS}"
            ),
            params![name, warehouse_id],
            agent_from_row,
        )?;
        debug!(agent_id = agent.id, warehouse_id, "Agent checked in");
        Ok(agent)
    }

    pub fn check_out_agent(&self, agent_id: AgentId) -> Result<Agent, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("UPDATE agents SET checked_in = 0 WHERE id = ?1 RETURNING {AGENT_COLUMNS}"),
            params![agent_id],
            agent_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("agent {agent_id}")))
    }

    pub fn create_order(&self, order: &NewOrder) -> Result<Order, StoreError> {
        let conn = self.lock()?;
        insert_order(&conn, order)
    }

    /// Insert many orders in one transaction. Nothing is written if any
    /// order references an unknown warehouse.
    pub fn create_orders(&self, orders: &[NewOrder]) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let created = orders
            .iter()
            .map(|order| insert_order(&tx, order))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(created)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
                params![order_id],
                order_from_row,
            )
            .optional()?)
    }

    /// Number of orders whose `assigned` flag disagrees with the presence of
    /// a ledger row. Zero on a consistent database.
    pub fn ledger_mismatches(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orders o \
             LEFT JOIN assignments a ON a.order_id = o.id \
             WHERE (o.assigned = 1) != (a.id IS NOT NULL) \
                OR (a.id IS NOT NULL AND a.agent_id IS NOT o.agent_id)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_checked_in_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE checked_in = 1 ORDER BY id"
        ))?;
        let agents = stmt
            .query_map([], agent_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(agents)
    }

    async fn list_unassigned_orders(&self) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE assigned = 0 ORDER BY id"
        ))?;
        let orders = stmt
            .query_map([], order_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    async fn assigned_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT o.id, o.customer, o.lat, o.lng, o.warehouse_id, o.assigned, o.agent_id \
             FROM assignments a JOIN orders o ON o.id = a.order_id \
             WHERE a.assigned_at >= ?1 ORDER BY a.id",
        )?;
        let orders = stmt
            .query_map(params![since], order_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    async fn commit_assignment(
        &self,
        order_id: OrderId,
        agent_id: AgentId,
    ) -> Result<Assignment, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE orders SET assigned = 1, agent_id = ?1 WHERE id = ?2 AND assigned = 0",
            params![agent_id, order_id],
        )?;
        if updated == 0 {
            // Dropping `tx` rolls back.
            let exists = tx
                .query_row("SELECT 1 FROM orders WHERE id = ?1", params![order_id], |_| Ok(()))
                .optional()?
                .is_some();
            return Err(if exists {
                StoreError::Conflict(format!("order {order_id} is already assigned"))
            } else {
                StoreError::NotFound(format!("order {order_id}"))
            });
        }

        let assigned_at = Utc::now();
        tx.execute(
            "INSERT INTO assignments (agent_id, order_id, assigned_at) VALUES (?1, ?2, ?3)",
            params![agent_id, order_id, assigned_at],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(order_id, agent_id, assignment_id = id, "Assignment committed");
        Ok(Assignment {
            id,
            agent_id,
            order_id,
            assigned_at,
        })
    }

    async fn agent_order_counts(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AgentOrderCount>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT agent_id, COUNT(*) FROM orders \
             WHERE assigned = 1 AND agent_id IS NOT NULL \
             GROUP BY agent_id ORDER BY agent_id LIMIT ?1 OFFSET ?2",
        )?;
        let counts = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(AgentOrderCount {
                    agent_id: row.get(0)?,
                    orders: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    async fn count_agents_with_orders(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT agent_id) FROM orders WHERE assigned = 1 AND agent_id IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn order_totals(&self) -> Result<OrderTotals, StoreError> {
        let conn = self.lock()?;
        let (total, assigned): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(assigned), 0) FROM orders",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(OrderTotals {
            total: total as u64,
            assigned: assigned as u64,
        })
    }

    async fn find_agent(&self, agent_id: AgentId) -> Result<Option<Agent>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                params![agent_id],
                agent_from_row,
            )
            .optional()?)
    }

    async fn assigned_order_count(&self, agent_id: AgentId) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE assigned = 1 AND agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn list_assignments(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Assignment>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, order_id, assigned_at FROM assignments \
             ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(Assignment {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    order_id: row.get(2)?,
                    assigned_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn count_assignments(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM assignments", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn try_acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(format!("invalid lease ttl: {e}")))?;
        let now = Utc::now();
        let conn = self.lock()?;
        let claimed = conn.execute(
            "INSERT INTO allocation_lease (id, holder, expires_at) VALUES (1, ?1, ?2) \
             ON CONFLICT (id) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at \
             WHERE allocation_lease.holder IS NULL \
                OR allocation_lease.holder = excluded.holder \
                OR allocation_lease.expires_at <= ?3",
            params![holder, now + ttl, now],
        )?;
        if claimed == 1 {
            debug!(holder, "Allocation lease acquired");
        }
        Ok(claimed == 1)
    }

    async fn release_lease(&self, holder: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE allocation_lease SET holder = NULL, expires_at = NULL \
             WHERE id = 1 AND holder = ?1",
            params![holder],
        )?;
        Ok(())
    }
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        warehouse_id: row.get(2)?,
        checked_in: row.get(3)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        customer: row.get(1)?,
        location: Location::new(row.get(2)?, row.get(3)?),
        warehouse_id: row.get(4)?,
        assigned: row.get(5)?,
        agent_id: row.get(6)?,
    })
}

fn query_warehouse(conn: &Connection, id: WarehouseId) -> rusqlite::Result<Option<Warehouse>> {
    conn.query_row(
        "SELECT id, name, lat, lng FROM warehouses WHERE id = ?1",
        params![id],
        |row| {
            Ok(Warehouse {
                id: row.get(0)?,
                name: row.get(1)?,
                location: Location::new(row.get(2)?, row.get(3)?),
            })
        },
    )
    .optional()
}

fn require_warehouse(conn: &Connection, id: WarehouseId) -> Result<(), StoreError> {
    match query_warehouse(conn, id)? {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("warehouse {id}"))),
    }
}

fn insert_order(conn: &Connection, order: &NewOrder) -> Result<Order, StoreError> {
    require_warehouse(conn, order.warehouse_id)?;
    conn.execute(
        "INSERT INTO orders (customer, lat, lng, warehouse_id, assigned) VALUES (?1, ?2, ?3, ?4, 0)",
        params![order.customer, order.lat, order.lng, order.warehouse_id],
    )?;
    Ok(Order {
        id: conn.last_insert_rowid(),
        customer: order.customer.clone(),
        location: order.location(),
        warehouse_id: order.warehouse_id,
        assigned: false,
        agent_id: None,
    })
}
