//! Tenant Store - one SQLite ledger per tenant plus the shared master ledger
//!
//! Every call opens its own connection and drops it before returning, on the
//! success path and on every error path. There is no pool and no
//! application-level locking; concurrent writers to one tenant rely on
//! SQLite's file locking, and a "database is locked" failure is retryable by
//! re-running the whole call.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::schema::quote_identifier;
use crate::tenant::TenantId;
use chrono::NaiveDate;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const LEDGER_TABLE: &str = "sales";
pub const MASTER_TABLE: &str = "sales_data";

/// Fixed ledger schema, in declaration order
pub const LEDGER_COLUMNS: [&str; 5] = [
    "item",
    "price",
    "quantity_in_stock",
    "quantity_sold",
    "sale_date",
];

const CREATE_LEDGER_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS "sales" (
        "item" TEXT,
        "price" REAL,
        "quantity_in_stock" INTEGER,
        "quantity_sold" INTEGER,
        "sale_date" TEXT
    )
"#;

const CREATE_MASTER_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS "sales_data" (
        "id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "phone_number" TEXT,
        "item" TEXT,
        "price" REAL,
        "quantity_in_stock" INTEGER,
        "quantity_sold" INTEGER,
        "sale_date" TEXT
    )
"#;

/// One result row, keyed by canonical or aliased column name
pub type Record = serde_json::Map<String, Value>;

/// One ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub item: String,
    pub price: f64,
    pub quantity_in_stock: i64,
    pub quantity_sold: i64,
    pub sale_date: NaiveDate,
}

impl SaleRecord {
    pub fn new(
        item: impl Into<String>,
        price: f64,
        quantity_in_stock: i64,
        quantity_sold: i64,
        sale_date: NaiveDate,
    ) -> Self {
        Self {
            item: item.into(),
            price,
            quantity_in_stock,
            quantity_sold,
            sale_date,
        }
    }
}

pub struct TenantStore {
    data_dir: PathBuf,
    master_db_path: PathBuf,
}

impl TenantStore {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            master_db_path: config.master_db_path.clone(),
        }
    }

    pub fn ledger_path(&self, tenant: &TenantId) -> PathBuf {
        self.data_dir.join(tenant.ledger_file_name())
    }

    pub fn master_path(&self) -> &Path {
        &self.master_db_path
    }

    pub fn ledger_exists(&self, tenant: &TenantId) -> bool {
        self.ledger_path(tenant).exists()
    }

    /// Create the tenant's ledger if it does not exist yet.
    ///
    /// Idempotent: an existing table is never altered and its rows are never
    /// touched. Failure here is fatal for the tenant and propagates.
    pub fn ensure_table(&self, tenant: &TenantId) -> Result<()> {
        let path = self.ledger_path(tenant);
        let existed = path.exists();

        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            error!(tenant = %tenant, error = %e, "Could not create ledger directory");
            LedgerError::TableCreation(format!(
                "creating {} for tenant {}: {}",
                self.data_dir.display(),
                tenant,
                e
            ))
        })?;

        let conn = Connection::open(&path).map_err(|e| table_creation_error(tenant, e))?;
        conn.execute(CREATE_LEDGER_TABLE, [])
            .map_err(|e| table_creation_error(tenant, e))?;

        if !existed {
            info!(tenant = %tenant, path = %path.display(), "Created ledger with the fixed schema");
        }
        Ok(())
    }

    /// Create the master ledger if it does not exist yet
    pub fn ensure_master(&self) -> Result<()> {
        if let Some(parent) = self.master_db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.master_db_path).map_err(|e| {
            LedgerError::TableCreation(format!("opening master ledger: {}", e))
        })?;
        conn.execute(CREATE_MASTER_TABLE, []).map_err(|e| {
            LedgerError::TableCreation(format!("creating master ledger: {}", e))
        })?;
        Ok(())
    }

    /// Live column names of the tenant's ledger table, in declaration order
    pub fn columns(&self, tenant: &TenantId) -> Result<Vec<String>> {
        let conn = self.open_read_only(tenant)?;
        let sql = format!("PRAGMA table_info({})", quote_identifier(LEDGER_TABLE));
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_error(tenant, "reading schema", e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| storage_error(tenant, "reading schema", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| storage_error(tenant, "reading schema", e))?;
        Ok(names)
    }

    /// Run one read-only statement with bound values
    pub fn query(&self, tenant: &TenantId, sql: &str, bound: &[SqlValue]) -> Result<Vec<Record>> {
        let conn = self.open_read_only(tenant)?;
        debug!(tenant = %tenant, sql = %sql, "Executing ledger query");

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| storage_error(tenant, "preparing query", e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(bound.iter()))
            .map_err(|e| storage_error(tenant, "running query", e))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| storage_error(tenant, "reading rows", e))?
        {
            let mut record = Record::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| storage_error(tenant, "reading rows", e))?;
                record.insert(name.clone(), json_value(value));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Like [`TenantStore::query`], but a storage failure is logged and
    /// surfaced as "no data".
    pub fn execute(&self, tenant: &TenantId, sql: &str, bound: &[SqlValue]) -> Vec<Record> {
        match self.query(tenant, sql, bound) {
            Ok(records) => records,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Ledger query failed. Returning no data.");
                Vec::new()
            }
        }
    }

    /// Append rows to the tenant ledger in one transaction, then mirror them
    /// into the master ledger. Returns the number of rows written.
    pub fn append_sales(&self, tenant: &TenantId, sales: &[SaleRecord]) -> Result<usize> {
        if sales.is_empty() {
            return Ok(0);
        }
        self.ensure_table(tenant)?;

        let mut conn = Connection::open(self.ledger_path(tenant))
            .map_err(|e| storage_error(tenant, "opening ledger", e))?;
        let tx = conn
            .transaction()
            .map_err(|e| storage_error(tenant, "starting transaction", e))?;
        for sale in sales {
            tx.execute(
                r#"INSERT INTO "sales" ("item", "price", "quantity_in_stock", "quantity_sold", "sale_date")
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    sale.item,
                    sale.price,
                    sale.quantity_in_stock,
                    sale.quantity_sold,
                    sale.sale_date.format("%Y-%m-%d").to_string()
                ],
            )
            .map_err(|e| storage_error(tenant, "inserting sale", e))?;
        }
        tx.commit()
            .map_err(|e| storage_error(tenant, "committing sales", e))?;

        self.sync_to_master(tenant, sales)?;
        info!(tenant = %tenant, rows = sales.len(), "Sales appended and synced to master");
        Ok(sales.len())
    }

    fn sync_to_master(&self, tenant: &TenantId, sales: &[SaleRecord]) -> Result<()> {
        self.ensure_master()?;
        let mut conn = Connection::open(&self.master_db_path)
            .map_err(|e| storage_error(tenant, "opening master ledger", e))?;
        let tx = conn
            .transaction()
            .map_err(|e| storage_error(tenant, "starting master transaction", e))?;
        for sale in sales {
            tx.execute(
                r#"INSERT INTO "sales_data" ("phone_number", "item", "price", "quantity_in_stock", "quantity_sold", "sale_date")
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    tenant.as_str(),
                    sale.item,
                    sale.price,
                    sale.quantity_in_stock,
                    sale.quantity_sold,
                    sale.sale_date.format("%Y-%m-%d").to_string()
                ],
            )
            .map_err(|e| storage_error(tenant, "syncing sale to master", e))?;
        }
        tx.commit()
            .map_err(|e| storage_error(tenant, "committing master sync", e))?;
        Ok(())
    }

    /// Reads never create a ledger file as a side effect
    fn open_read_only(&self, tenant: &TenantId) -> Result<Connection> {
        let path = self.ledger_path(tenant);
        if !path.exists() {
            return Err(LedgerError::Storage(format!(
                "no ledger for tenant {} at {}",
                tenant,
                path.display()
            )));
        }
        Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| storage_error(tenant, "opening ledger", e))
    }
}

fn storage_error(tenant: &TenantId, action: &str, err: rusqlite::Error) -> LedgerError {
    LedgerError::Storage(format!("{} for tenant {}: {}", action, tenant, err))
}

fn table_creation_error(tenant: &TenantId, err: rusqlite::Error) -> LedgerError {
    error!(tenant = %tenant, error = %err, "Could not create ledger");
    LedgerError::TableCreation(format!("tenant {}: {}", tenant, err))
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TenantStore, TenantId) {
        let temp_dir = TempDir::new().unwrap();
        let store = TenantStore::new(&LedgerConfig::rooted_at(temp_dir.path()));
        let tenant = TenantId::parse("9800000001").unwrap();
        (temp_dir, store, tenant)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let (_dir, store, tenant) = setup();
        store.ensure_table(&tenant).unwrap();
        store
            .append_sales(&tenant, &[SaleRecord::new("Rice", 100.0, 50, 5, date("2025-01-10"))])
            .unwrap();

        store.ensure_table(&tenant).unwrap();

        let rows = store.query(&tenant, r#"SELECT COUNT(*) AS n FROM "sales""#, &[]).unwrap();
        assert_eq!(rows[0]["n"], json!(1));
        assert_eq!(store.columns(&tenant).unwrap(), LEDGER_COLUMNS.to_vec());
    }

    #[test]
    fn test_reads_do_not_create_ledgers() {
        let (_dir, store, tenant) = setup();
        assert!(store.columns(&tenant).is_err());
        assert!(store.execute(&tenant, r#"SELECT * FROM "sales""#, &[]).is_empty());
        assert!(!store.ledger_exists(&tenant));
    }

    #[test]
    fn test_query_binds_values() {
        let (_dir, store, tenant) = setup();
        store
            .append_sales(
                &tenant,
                &[
                    SaleRecord::new("Rice", 100.0, 50, 5, date("2025-01-10")),
                    SaleRecord::new("Oil", 200.0, 20, 2, date("2025-02-15")),
                ],
            )
            .unwrap();

        let rows = store
            .query(
                &tenant,
                r#"SELECT "item", "price" FROM "sales" WHERE "item" = ?"#,
                &[SqlValue::Text("Oil".to_string())],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["item"], json!("Oil"));
        assert_eq!(rows[0]["price"], json!(200.0));
    }

    #[test]
    fn test_engine_error_degrades_to_empty() {
        let (_dir, store, tenant) = setup();
        store.ensure_table(&tenant).unwrap();
        assert!(store.query(&tenant, "SELECT nope FROM nowhere", &[]).is_err());
        assert!(store.execute(&tenant, "SELECT nope FROM nowhere", &[]).is_empty());
    }

    #[test]
    fn test_append_syncs_master() {
        let (_dir, store, tenant) = setup();
        let written = store
            .append_sales(&tenant, &[SaleRecord::new("Rice", 100.0, 50, 5, date("2025-01-10"))])
            .unwrap();
        assert_eq!(written, 1);

        let conn = Connection::open(store.master_path()).unwrap();
        let (phone, item, sale_date): (String, String, String) = conn
            .query_row(
                r#"SELECT "phone_number", "item", "sale_date" FROM "sales_data""#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(phone, "9800000001");
        assert_eq!(item, "Rice");
        assert_eq!(sale_date, "2025-01-10");
    }

    #[test]
    fn test_ensure_table_keeps_foreign_schema() {
        let (_dir, store, tenant) = setup();
        std::fs::create_dir_all(store.ledger_path(&tenant).parent().unwrap()).unwrap();
        let conn = Connection::open(store.ledger_path(&tenant)).unwrap();
        conn.execute(r#"CREATE TABLE "sales" ("id" INTEGER PRIMARY KEY, "item" TEXT)"#, [])
            .unwrap();
        drop(conn);

        store.ensure_table(&tenant).unwrap();
        assert_eq!(store.columns(&tenant).unwrap(), vec!["id", "item"]);
    }
}
