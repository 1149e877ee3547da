//! Database migrations

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 4;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }
    if version < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: Option<i32> = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Apply one migration's statements and record its version atomically.
fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute_batch(stmt)?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: domain entities targeted by sync
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                name TEXT NOT NULL,
                phone TEXT,
                address TEXT,
                notes TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_customers_business ON customers(business_id)",
            "CREATE TABLE IF NOT EXISTS sales (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                seller_id TEXT NOT NULL,
                order_id TEXT,
                sale_date TEXT NOT NULL,
                total_amount INTEGER NOT NULL,
                amount_paid INTEGER NOT NULL,
                balance_due INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_sales_business ON sales(business_id, sale_date)",
            // At most one sale per delivered order
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sales_order ON sales(order_id)
             WHERE order_id IS NOT NULL",
            "CREATE TABLE IF NOT EXISTS sale_items (
                sale_id TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                variant_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                unit_price INTEGER NOT NULL,
                subtotal INTEGER NOT NULL,
                PRIMARY KEY (sale_id, position)
            )",
            "CREATE TABLE IF NOT EXISTS payments (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                sale_id TEXT NOT NULL,
                customer_id TEXT,
                amount INTEGER NOT NULL,
                method TEXT NOT NULL,
                reference TEXT,
                paid_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_payments_sale ON payments(sale_id)",
            "CREATE TABLE IF NOT EXISTS distributions (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                seller_id TEXT NOT NULL,
                variant_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                distribution_date TEXT NOT NULL,
                notes TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_distributions_seller
             ON distributions(business_id, seller_id, distribution_date)",
        ],
    )
}

/// Migration to version 2: durable dedup records and temp-id mappings
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            // Exactly one record per (business, operation)
            "CREATE TABLE IF NOT EXISTS sync_operations (
                business_id TEXT NOT NULL,
                operation_id TEXT NOT NULL,
                entity TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                resolved_entity_id TEXT,
                payload TEXT NOT NULL,
                client_timestamp INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                processed_at INTEGER,
                PRIMARY KEY (business_id, operation_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_feed
             ON sync_operations(business_id, status, processed_at)",
            "CREATE TABLE IF NOT EXISTS sync_id_mappings (
                business_id TEXT NOT NULL,
                entity TEXT NOT NULL,
                temp_id TEXT NOT NULL,
                server_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (business_id, entity, temp_id)
            )",
        ],
    )
}

/// Migration to version 3: order aggregates and their event log
fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        3,
        &[
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                business_id TEXT NOT NULL,
                customer_id TEXT NOT NULL,
                seller_id TEXT NOT NULL,
                delivery_date TEXT NOT NULL,
                status TEXT NOT NULL,
                payment_intent TEXT NOT NULL,
                total_amount INTEGER NOT NULL,
                notes TEXT,
                version INTEGER NOT NULL,
                confirmed_snapshot TEXT,
                delivered_snapshot TEXT,
                sale_id TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(business_id, status)",
            "CREATE INDEX IF NOT EXISTS idx_orders_delivery ON orders(business_id, delivery_date)",
            "CREATE TABLE IF NOT EXISTS order_items (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                variant_id TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                delivered_quantity INTEGER,
                unit_price INTEGER NOT NULL,
                final_unit_price INTEGER,
                is_modified INTEGER NOT NULL DEFAULT 0,
                original_quantity INTEGER
            )",
            "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id, position)",
            "CREATE TABLE IF NOT EXISTS order_events (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                business_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                idempotency_key TEXT UNIQUE,
                actor_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (order_id, version)
            )",
        ],
    )
}

/// Migration to version 4: device-side queue, id map and cursor state
fn migrate_v4(conn: &Connection) -> Result<()> {
    apply(
        conn,
        4,
        &[
            "CREATE TABLE IF NOT EXISTS client_operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                entity TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                client_timestamp INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )",
            "CREATE INDEX IF NOT EXISTS idx_client_operations_entity
             ON client_operations(entity, entity_id)",
            "CREATE TABLE IF NOT EXISTS client_id_mappings (
                entity TEXT NOT NULL,
                temp_id TEXT NOT NULL,
                server_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (entity, temp_id)
            )",
            // Key/value state such as the change feed cursor
            "CREATE TABLE IF NOT EXISTS client_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_all_tables_created() {
        let conn = setup();
        run(&conn).unwrap();

        for table in [
            "customers",
            "sales",
            "sale_items",
            "payments",
            "distributions",
            "sync_operations",
            "sync_id_mappings",
            "orders",
            "order_items",
            "order_events",
            "client_operations",
            "client_id_mappings",
            "client_state",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_duplicate_operation_record_rejected() {
        let conn = setup();
        run(&conn).unwrap();

        let insert = "INSERT INTO sync_operations
            (business_id, operation_id, entity, action, entity_id, payload,
             client_timestamp, status, created_at, updated_at)
            VALUES ('b1', 'op-1', 'customers', 'insert', 'c1', '{}', 0, 'pending', 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
