//! Dashboard read models
//!
//! Fixed-shape summaries over one tenant ledger. The SQL here is static; the
//! only inputs (dates, thresholds) are bound. Storage failures degrade to
//! zeros / empty lists.

use crate::shaper;
use crate::store::{Record, TenantStore};
use crate::tenant::TenantId;
use chrono::{Datelike, Months, NaiveDate};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Items at or below this stock count are "low stock"
pub const LOW_STOCK_THRESHOLD: i64 = 5;
pub const TREND_MONTHS: u32 = 7;
pub const INVENTORY_SLICES: i64 = 5;
pub const RECENT_SALES_ROWS: i64 = 10;

/// Placeholder target is actual sales plus ten percent
const TARGET_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_sales: f64,
    /// Distinct sale dates, standing in for orders
    pub total_orders: i64,
    pub inventory_value: f64,
    pub low_stock_items: i64,
    /// Not derivable from the ledger
    pub customer_growth: f64,
    pub top_selling: String,
}

impl Default for DashboardSummary {
    fn default() -> Self {
        Self {
            total_sales: 0.0,
            total_orders: 0,
            inventory_value: 0.0,
            low_stock_items: 0,
            customer_growth: 0.0,
            top_selling: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    /// Short month name, e.g. "Jan"
    pub name: String,
    pub sales: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventorySlice {
    pub name: String,
    pub value: f64,
}

pub struct Dashboard<'a> {
    store: &'a TenantStore,
}

impl<'a> Dashboard<'a> {
    pub fn new(store: &'a TenantStore) -> Self {
        Self { store }
    }

    pub fn summary(&self, tenant: &TenantId) -> DashboardSummary {
        if !self.store.ledger_exists(tenant) {
            warn!(tenant = %tenant, "User database not found for dashboard summary");
            return DashboardSummary::default();
        }

        let totals = self.store.execute(
            tenant,
            r#"SELECT
                COALESCE(SUM("price" * "quantity_sold"), 0) AS total_sales,
                COUNT(DISTINCT "sale_date") AS total_orders,
                COALESCE(SUM("price" * "quantity_in_stock"), 0) AS inventory_value,
                COUNT(DISTINCT CASE WHEN "quantity_in_stock" <= ? THEN "item" END) AS low_stock_items
               FROM "sales""#,
            &[SqlValue::Integer(LOW_STOCK_THRESHOLD)],
        );
        let top = self.store.execute(
            tenant,
            r#"SELECT "item", SUM("price" * "quantity_sold") AS total_item_sales
               FROM "sales"
               GROUP BY "item"
               ORDER BY total_item_sales DESC
               LIMIT 1"#,
            &[],
        );

        let mut summary = DashboardSummary::default();
        if let Some(row) = totals.first() {
            summary.total_sales = number(row, "total_sales");
            summary.total_orders = integer(row, "total_orders");
            summary.inventory_value = number(row, "inventory_value");
            summary.low_stock_items = integer(row, "low_stock_items");
        }
        if let Some(item) = top.first().and_then(|row| row.get("item")).and_then(Value::as_str) {
            summary.top_selling = item.to_string();
        }
        summary
    }

    /// Monthly sales for the `TREND_MONTHS` calendar months ending at `today`'s
    /// month, oldest first, with empty months filled as zero.
    pub fn sales_trend(&self, tenant: &TenantId, today: NaiveDate) -> Vec<TrendPoint> {
        let months = trailing_months(today, TREND_MONTHS);
        let Some(start) = months.first().copied() else {
            return Vec::new();
        };
        if !self.store.ledger_exists(tenant) {
            warn!(tenant = %tenant, "User database not found for sales trend");
            return Vec::new();
        }

        let rows = self.store.execute(
            tenant,
            r#"SELECT strftime('%Y-%m', "sale_date") AS month,
                      SUM("price" * "quantity_sold") AS total_sales
               FROM "sales"
               WHERE "sale_date" >= ?
               GROUP BY month
               ORDER BY month ASC"#,
            &[SqlValue::Text(start.format("%Y-%m-%d").to_string())],
        );
        let by_month: HashMap<String, f64> = rows
            .iter()
            .filter_map(|row| {
                let month = row.get("month")?.as_str()?.to_string();
                Some((month, number(row, "total_sales")))
            })
            .collect();

        months
            .iter()
            .map(|month| {
                let sales = by_month
                    .get(&month.format("%Y-%m").to_string())
                    .copied()
                    .unwrap_or(0.0);
                TrendPoint {
                    name: month.format("%b").to_string(),
                    sales,
                    target: sales * TARGET_FACTOR,
                }
            })
            .collect()
    }

    /// Top items by summed stock
    pub fn inventory_distribution(&self, tenant: &TenantId) -> Vec<InventorySlice> {
        if !self.store.ledger_exists(tenant) {
            warn!(tenant = %tenant, "User database not found for inventory distribution");
            return Vec::new();
        }
        self.store
            .execute(
                tenant,
                r#"SELECT "item", SUM("quantity_in_stock") AS total_stock
                   FROM "sales"
                   GROUP BY "item"
                   ORDER BY total_stock DESC
                   LIMIT ?"#,
                &[SqlValue::Integer(INVENTORY_SLICES)],
            )
            .iter()
            .map(|row| InventorySlice {
                name: row
                    .get("item")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                value: number(row, "total_stock"),
            })
            .collect()
    }

    /// Latest ledger rows by sale date
    pub fn recent_sales(&self, tenant: &TenantId) -> Vec<Record> {
        if !self.store.ledger_exists(tenant) {
            warn!(tenant = %tenant, "User database not found for recent sales data");
            return Vec::new();
        }
        let mut rows = self.store.execute(
            tenant,
            r#"SELECT "item", "price", "quantity_in_stock", "quantity_sold", "sale_date"
               FROM "sales"
               ORDER BY "sale_date" DESC
               LIMIT ?"#,
            &[SqlValue::Integer(RECENT_SALES_ROWS)],
        );
        shaper::normalize_dates(&mut rows);
        rows
    }
}

/// First days of the `count` months ending with `today`'s month, oldest first
fn trailing_months(today: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let Some(current) = today.with_day(1) else {
        return Vec::new();
    };
    (0..count)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .collect()
}

fn number(row: &Record, key: &str) -> f64 {
    row.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn integer(row: &Record, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::store::SaleRecord;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seeded() -> (TempDir, TenantStore, TenantId) {
        let temp_dir = TempDir::new().unwrap();
        let store = TenantStore::new(&LedgerConfig::rooted_at(temp_dir.path()));
        let tenant = TenantId::parse("9800000001").unwrap();
        store
            .append_sales(
                &tenant,
                &[
                    SaleRecord::new("Rice", 100.0, 50, 5, date("2025-01-10")),
                    SaleRecord::new("Rice", 100.0, 45, 5, date("2025-02-10")),
                    SaleRecord::new("Oil", 200.0, 20, 2, date("2025-02-15")),
                    SaleRecord::new("Salt", 20.0, 3, 1, date("2024-06-01")),
                ],
            )
            .unwrap();
        (temp_dir, store, tenant)
    }

    #[test]
    fn test_summary() {
        let (_dir, store, tenant) = seeded();
        let summary = Dashboard::new(&store).summary(&tenant);
        assert_eq!(summary.total_sales, 1420.0);
        assert_eq!(summary.total_orders, 4);
        assert_eq!(summary.inventory_value, 50.0 * 100.0 + 45.0 * 100.0 + 20.0 * 200.0 + 3.0 * 20.0);
        assert_eq!(summary.low_stock_items, 1);
        assert_eq!(summary.top_selling, "Rice");
    }

    #[test]
    fn test_summary_without_ledger() {
        let (_dir, store, _) = seeded();
        let stranger = TenantId::parse("1").unwrap();
        assert_eq!(Dashboard::new(&store).summary(&stranger), DashboardSummary::default());
    }

    #[test]
    fn test_sales_trend_fills_missing_months() {
        let (_dir, store, tenant) = seeded();
        let trend = Dashboard::new(&store).sales_trend(&tenant, date("2025-02-20"));
        let names: Vec<&str> = trend.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb"]);
        assert_eq!(trend[5].sales, 500.0);
        assert_eq!(trend[6].sales, 900.0);
        assert_eq!(trend[0].sales, 0.0);
        assert!((trend[6].target - 990.0).abs() < 1e-9);
    }

    #[test]
    fn test_inventory_distribution() {
        let (_dir, store, tenant) = seeded();
        let slices = Dashboard::new(&store).inventory_distribution(&tenant);
        assert_eq!(slices[0], InventorySlice { name: "Rice".to_string(), value: 95.0 });
        assert_eq!(slices.len(), 3);
    }

    #[test]
    fn test_recent_sales_latest_first() {
        let (_dir, store, tenant) = seeded();
        let rows = Dashboard::new(&store).recent_sales(&tenant);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0]["sale_date"], Value::from("2025-02-15"));
        assert_eq!(rows[3]["item"], Value::from("Salt"));
    }

    #[test]
    fn test_trailing_months_cross_year() {
        let months = trailing_months(date("2025-01-31"), 3);
        assert_eq!(months, vec![date("2024-11-01"), date("2024-12-01"), date("2025-01-01")]);
    }
}
