/// SQLite schema shared by the store and anything that seeds it.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS warehouses (
///     id    INTEGER PRIMARY KEY AUTOINCREMENT,
///     name  TEXT NOT NULL,
///     lat   REAL NOT NULL,
///     lng   REAL NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS agents (
///     id            INTEGER PRIMARY KEY AUTOINCREMENT,
///     name          TEXT NOT NULL,
///     warehouse_id  INTEGER NOT NULL REFERENCES warehouses(id),
///     checked_in    INTEGER NOT NULL DEFAULT 0,
///     UNIQUE (name, warehouse_id)
/// );
///
/// CREATE TABLE IF NOT EXISTS orders (
///     id            INTEGER PRIMARY KEY AUTOINCREMENT,
///     customer      TEXT NOT NULL,
///     lat           REAL NOT NULL,
///     lng           REAL NOT NULL,
///     warehouse_id  INTEGER NOT NULL REFERENCES warehouses(id),
///     assigned      INTEGER NOT NULL DEFAULT 0,
///     agent_id      INTEGER REFERENCES agents(id)
/// );
///
/// CREATE TABLE IF NOT EXISTS assignments (
///     id           INTEGER PRIMARY KEY AUTOINCREMENT,
///     agent_id     INTEGER NOT NULL REFERENCES agents(id),
///     order_id     INTEGER NOT NULL UNIQUE REFERENCES orders(id),
///     assigned_at  TEXT NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS allocation_lease (
///     id          INTEGER PRIMARY KEY CHECK (id = 1),
///     holder      TEXT,
///     expires_at  TEXT
/// );
/// ```
///
/// `assignments.order_id` is unique: an order has at most one ledger row.
/// `allocation_lease` holds at most one row, naming the process whose
/// allocation pass currently owns the database.
pub const DISPATCH_SCHEMA_DDL: &str = "\
CREATE TABLE IF NOT EXISTS warehouses (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL,
    lat   REAL NOT NULL,
    lng   REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS agents (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    warehouse_id  INTEGER NOT NULL REFERENCES warehouses(id),
    checked_in    INTEGER NOT NULL DEFAULT 0,
    UNIQUE (name, warehouse_id)
);
CREATE TABLE IF NOT EXISTS orders (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    customer      TEXT NOT NULL,
    lat           REAL NOT NULL,
    lng           REAL NOT NULL,
    warehouse_id  INTEGER NOT NULL REFERENCES warehouses(id),
    assigned      INTEGER NOT NULL DEFAULT 0,
    agent_id      INTEGER REFERENCES agents(id)
);
CREATE TABLE IF NOT EXISTS assignments (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id     INTEGER NOT NULL REFERENCES agents(id),
    order_id     INTEGER NOT NULL UNIQUE REFERENCES orders(id),
    assigned_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS allocation_lease (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    holder      TEXT,
    expires_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_agents_checked_in ON agents(checked_in);
CREATE INDEX IF NOT EXISTS idx_orders_assigned ON orders(assigned);
CREATE INDEX IF NOT EXISTS idx_orders_agent ON orders(agent_id);
CREATE INDEX IF NOT EXISTS idx_assignments_assigned_at ON assignments(assigned_at);
";

pub const TABLES: [&str; 5] = [
    "warehouses",
    "agents",
    "orders",
    "assignments",
    "allocation_lease",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_creates_every_table() {
        for table in TABLES {
            assert!(
                DISPATCH_SCHEMA_DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn ledger_is_unique_per_order() {
        assert!(DISPATCH_SCHEMA_DDL.contains("order_id     INTEGER NOT NULL UNIQUE"));
    }
}
