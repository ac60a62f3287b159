//! Query Compiler - deterministic SQL generation from a Parameter Set
//!
//! Builds exactly one parameterized statement against the tenant's `sales`
//! table. Identifiers come only from [`TenantSchema::resolve`]; every literal
//! (filter value, date bounds, year, row cap) is a bound `?` parameter.
//!
//! Measure selection, first match wins:
//! 1. `total_sales`, or `price` with `sum`: `SUM(price * quantity_sold) AS total_sales`,
//!    grouped by `x_axis` when present
//! 2. aggregation with both axes: `x, AGG(y) AS y` grouped by `x`
//! 3. both axes: `x, y`
//! 4. otherwise `*` (rejected for strict callers)
//!
//! Strict callers are always ranked by the measure and capped, defaulting to
//! [`DEFAULT_CHART_LIMIT`] rows.

use crate::error::{LedgerError, Result};
use crate::params::{Aggregation, FilterValue, ParameterSet};
use crate::schema::{quote_identifier, Column, TenantSchema};
use crate::store::LEDGER_TABLE;
use crate::time_window::{resolve_time_window, TimeWindow, DATE_FORMAT};
use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Alias of the derived revenue measure
pub const TOTAL_SALES: &str = "total_sales";

/// Row cap for chart data when the caller gives none
pub const DEFAULT_CHART_LIMIT: u64 = 10;

/// What the y axis measures once compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Measure {
    /// A physical ledger column, possibly aggregated under its own name
    Column(Column),
    /// `price * quantity_sold`, summed
    TotalSales,
}

impl Measure {
    /// Name the measure is exposed under in result rows
    pub fn effective_name(&self) -> &str {
        match self {
            Self::Column(column) => column.name(),
            Self::TotalSales => TOTAL_SALES,
        }
    }
}

/// How strictly a caller needs the x/y shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerShape {
    /// Planning pipeline: partial resolution degrades, down to `SELECT *`
    Lenient,
    /// Direct chart data: both axes must resolve, otherwise rejected
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bound: Vec<SqlValue>,
    /// Grouping column, when the query has one
    pub x_axis: Option<String>,
    /// Effective measure name, `None` for `SELECT *`
    pub measure: Option<String>,
}

impl CompiledQuery {
    /// Bound values as JSON, for logging and the CLI
    pub fn bound_json(&self) -> Vec<Value> {
        self.bound
            .iter()
            .map(|v| match v {
                SqlValue::Null => Value::Null,
                SqlValue::Integer(i) => Value::from(*i),
                SqlValue::Real(f) => Value::from(*f),
                SqlValue::Text(s) => Value::from(s.as_str()),
                SqlValue::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
            })
            .collect()
    }
}

pub struct QueryCompiler {
    today: NaiveDate,
}

impl QueryCompiler {
    /// `today` is the reference date for symbolic time periods
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn compile(
        &self,
        params: &ParameterSet,
        schema: &TenantSchema,
        shape: CallerShape,
    ) -> Result<CompiledQuery> {
        let tenant = schema.tenant();

        // Step 1: every role resolves independently
        let x_axis = params.x_axis.as_deref().and_then(|c| schema.resolve(c));
        let y_column = params.y_axis.as_deref().and_then(|c| {
            if c.eq_ignore_ascii_case(TOTAL_SALES) {
                None
            } else {
                schema.resolve(c)
            }
        });
        let filter_column = params.filter_column.as_deref().and_then(|c| schema.resolve(c));
        let sort_by = params.sort_by.as_deref().and_then(|c| {
            if c.eq_ignore_ascii_case(TOTAL_SALES) {
                None
            } else {
                schema.resolve(c)
            }
        });

        let measure = self.measure(params, y_column);

        // Step 2: SELECT / GROUP BY
        let mut select_parts = Vec::new();
        let mut group_by: Option<&Column> = None;

        match (&measure, &x_axis) {
            (Some(Measure::TotalSales), x) => {
                if let Some(x) = x {
                    select_parts.push(x.quoted());
                    group_by = Some(x);
                }
                select_parts.push(format!(
                    "SUM({} * {}) AS {}",
                    quote_identifier("price"),
                    quote_identifier("quantity_sold"),
                    quote_identifier(TOTAL_SALES)
                ));
            }
            (Some(Measure::Column(y)), Some(x)) => {
                select_parts.push(x.quoted());
                match params.aggregation.sql_function() {
                    Some(function) => {
                        select_parts.push(format!("{}({}) AS {}", function, y.quoted(), y.quoted()));
                        group_by = Some(x);
                    }
                    None => select_parts.push(y.quoted()),
                }
            }
            _ => select_parts.push("*".to_string()),
        }

        let effective_measure = match (&measure, &x_axis) {
            (Some(m @ Measure::TotalSales), _) | (Some(m), Some(_)) => Some(m.effective_name().to_string()),
            _ => None,
        };

        if shape == CallerShape::Strict && (x_axis.is_none() || effective_measure.is_none()) {
            warn!(
                tenant = %tenant,
                x_axis = ?params.x_axis,
                y_axis = ?params.y_axis,
                "Insufficient valid columns for chart data"
            );
            return Err(LedgerError::Rejected(format!(
                "chart data needs a resolvable x_axis and y_axis (got x_axis={:?}, y_axis={:?})",
                params.x_axis, params.y_axis
            )));
        }

        let mut bound = Vec::new();
        let mut where_parts = Vec::new();

        // Step 3: time window
        if let Some(token) = params.time_period.as_deref() {
            match resolve_time_window(token, self.today) {
                Some(TimeWindow::Between { start, end }) => {
                    where_parts.push(format!("{} BETWEEN ? AND ?", quote_identifier("sale_date")));
                    bound.push(SqlValue::Text(start.format(DATE_FORMAT).to_string()));
                    bound.push(SqlValue::Text(end.format(DATE_FORMAT).to_string()));
                }
                Some(TimeWindow::Year(year)) => {
                    where_parts.push(format!("strftime('%Y', {}) = ?", quote_identifier("sale_date")));
                    bound.push(SqlValue::Text(year.to_string()));
                }
                None => debug!(tenant = %tenant, time_period = %token, "No time filter applied"),
            }
        }

        // Step 4: equality filter; 0 and "" count as present
        match (&filter_column, &params.filter_value) {
            (Some(column), Some(value)) => {
                where_parts.push(format!("{} = ?", column.quoted()));
                bound.push(bind_filter_value(value));
            }
            (None, Some(_)) if params.filter_column.is_some() => {
                warn!(tenant = %tenant, filter_column = ?params.filter_column, "Filter column did not resolve. Ignoring filter.");
            }
            _ => {}
        }

        // Step 5: ORDER BY, following the measure through aggregation aliasing.
        // Strict callers without a usable sort key are ranked by the measure.
        let order_by = self
            .order_by(params, sort_by.as_ref(), &measure, effective_measure.as_deref())
            .or_else(|| match shape {
                CallerShape::Strict => effective_measure.clone(),
                CallerShape::Lenient => None,
            });

        // Step 6: LIMIT, bound like every other literal
        let limit = match (params.limit, shape) {
            (Some(n), _) => Some(n),
            (None, CallerShape::Strict) => Some(DEFAULT_CHART_LIMIT),
            (None, CallerShape::Lenient) => None,
        }
        .map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        let mut sql_parts = vec![
            format!("SELECT {}", select_parts.join(", ")),
            format!("FROM {}", quote_identifier(LEDGER_TABLE)),
        ];
        if !where_parts.is_empty() {
            sql_parts.push(format!("WHERE {}", where_parts.join(" AND ")));
        }
        if let Some(column) = group_by {
            sql_parts.push(format!("GROUP BY {}", column.quoted()));
        }
        if let Some(target) = order_by {
            sql_parts.push(format!(
                "ORDER BY {} {}",
                quote_identifier(&target),
                params.sort_order.as_sql()
            ));
        }
        if let Some(limit) = limit {
            sql_parts.push("LIMIT ?".to_string());
            bound.push(SqlValue::Integer(limit));
        }

        let sql = sql_parts.join(" ");
        info!(tenant = %tenant, sql = %sql, "Compiled ledger query");

        Ok(CompiledQuery {
            sql,
            bound,
            x_axis: x_axis.map(|c| c.name().to_string()),
            measure: effective_measure,
        })
    }

    fn measure(&self, params: &ParameterSet, y_column: Option<Column>) -> Option<Measure> {
        let requested = params.y_axis.as_deref()?;
        if requested.eq_ignore_ascii_case(TOTAL_SALES) {
            return Some(Measure::TotalSales);
        }
        let column = y_column?;
        if column.name().eq_ignore_ascii_case("price") && params.aggregation == Aggregation::Sum {
            return Some(Measure::TotalSales);
        }
        Some(Measure::Column(column))
    }

    fn order_by(
        &self,
        params: &ParameterSet,
        sort_by: Option<&Column>,
        measure: &Option<Measure>,
        effective_measure: Option<&str>,
    ) -> Option<String> {
        let requested_sort = params.sort_by.as_deref()?;

        // The derived alias is not a schema column but is a valid sort key
        // whenever the query actually produces it.
        if requested_sort.eq_ignore_ascii_case(TOTAL_SALES) {
            return match measure {
                Some(Measure::TotalSales) => Some(TOTAL_SALES.to_string()),
                _ => {
                    warn!(sort_by = %requested_sort, "Sort key is not produced by this query. Omitting ORDER BY.");
                    None
                }
            };
        }

        let Some(sort_by) = sort_by else {
            warn!(sort_by = %requested_sort, "Sort column did not resolve. Omitting ORDER BY.");
            return None;
        };

        let matches_y = params
            .y_axis
            .as_deref()
            .is_some_and(|y| y.eq_ignore_ascii_case(sort_by.name()));
        match effective_measure {
            Some(name) if matches_y => Some(name.to_string()),
            _ => Some(sort_by.name().to_string()),
        }
    }
}

fn bind_filter_value(value: &FilterValue) -> SqlValue {
    match value {
        FilterValue::Text(s) => SqlValue::Text(s.clone()),
        FilterValue::Integer(i) => SqlValue::Integer(*i),
        FilterValue::Real(f) => SqlValue::Real(*f),
        FilterValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LEDGER_COLUMNS;
    use crate::tenant::TenantId;
    use serde_json::json;

    fn schema() -> TenantSchema {
        TenantSchema::from_columns(TenantId::parse("9800000001").unwrap(), LEDGER_COLUMNS)
    }

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(NaiveDate::from_ymd_opt(2025, 2, 15).unwrap())
    }

    fn compile(payload: serde_json::Value, shape: CallerShape) -> Result<CompiledQuery> {
        compiler().compile(&ParameterSet::from_json(&payload), &schema(), shape)
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_price_sum_aliases_to_total_sales() {
        let query = compile(
            json!({
                "x_axis": "item",
                "y_axis": "price",
                "aggregation": "sum",
                "sort_by": "price",
                "sort_order": "desc"
            }),
            CallerShape::Lenient,
        )
        .unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT "item", SUM("price" * "quantity_sold") AS "total_sales" FROM "sales" GROUP BY "item" ORDER BY "total_sales" DESC"#
        );
        assert!(query.bound.is_empty());
        assert_eq!(query.measure.as_deref(), Some("total_sales"));
    }

    #[test]
    fn test_total_sales_without_x_axis() {
        let query = compile(json!({"y_axis": "TOTAL_SALES"}), CallerShape::Lenient).unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT SUM("price" * "quantity_sold") AS "total_sales" FROM "sales""#
        );
        assert_eq!(query.x_axis, None);
    }

    #[test]
    fn test_aggregations_alias_to_y_axis() {
        for (aggregation, function) in [("sum", "SUM"), ("count", "COUNT"), ("average", "AVG")] {
            let query = compile(
                json!({"x_axis": "Item", "y_axis": "Quantity_Sold", "aggregation": aggregation}),
                CallerShape::Lenient,
            )
            .unwrap();
            assert_eq!(
                query.sql,
                format!(
                    r#"SELECT "item", {}("quantity_sold") AS "quantity_sold" FROM "sales" GROUP BY "item""#,
                    function
                )
            );
            assert_eq!(query.measure.as_deref(), Some("quantity_sold"));
        }
    }

    #[test]
    fn test_plain_two_column_select() {
        let query = compile(json!({"x_axis": "sale_date", "y_axis": "quantity_sold"}), CallerShape::Lenient)
            .unwrap();
        assert_eq!(query.sql, r#"SELECT "sale_date", "quantity_sold" FROM "sales""#);
    }

    #[test]
    fn test_empty_parameter_set_selects_all() {
        let query = compile(json!({}), CallerShape::Lenient).unwrap();
        assert_eq!(query.sql, r#"SELECT * FROM "sales""#);
        assert_eq!(query.measure, None);
    }

    #[test]
    fn test_unknown_x_axis_degrades_or_rejects() {
        let payload = json!({"x_axis": "nonexistent_col", "y_axis": "quantity_sold", "aggregation": "sum"});
        let lenient = compile(payload.clone(), CallerShape::Lenient).unwrap();
        assert_eq!(lenient.sql, r#"SELECT * FROM "sales""#);

        let strict = compile(payload, CallerShape::Strict);
        assert!(matches!(strict, Err(LedgerError::Rejected(_))));
    }

    #[test]
    fn test_strict_requires_x_for_total_sales() {
        let strict = compile(json!({"y_axis": "total_sales"}), CallerShape::Strict);
        assert!(matches!(strict, Err(LedgerError::Rejected(_))));

        let ok = compile(json!({"x_axis": "item", "y_axis": "total_sales"}), CallerShape::Strict).unwrap();
        assert_eq!(ok.x_axis.as_deref(), Some("item"));
    }

    #[test]
    fn test_strict_ranks_by_measure_before_cap() {
        let query = compile(
            json!({"x_axis": "item", "y_axis": "total_sales", "limit": 1}),
            CallerShape::Strict,
        )
        .unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT "item", SUM("price" * "quantity_sold") AS "total_sales" FROM "sales" GROUP BY "item" ORDER BY "total_sales" DESC LIMIT ?"#
        );
        assert_eq!(query.bound, vec![SqlValue::Integer(1)]);

        let aggregated = compile(
            json!({"x_axis": "item", "y_axis": "quantity_sold", "aggregation": "sum", "sort_order": "asc", "sort_by": "nope"}),
            CallerShape::Strict,
        )
        .unwrap();
        assert!(aggregated.sql.ends_with(r#"ORDER BY "quantity_sold" ASC LIMIT ?"#));

        let lenient = compile(json!({"x_axis": "item", "y_axis": "total_sales", "limit": 1}), CallerShape::Lenient).unwrap();
        assert!(!lenient.sql.contains("ORDER BY"));
    }

    #[test]
    fn test_strict_default_cap() {
        let query = compile(json!({"x_axis": "item", "y_axis": "quantity_sold"}), CallerShape::Strict).unwrap();
        assert!(query.sql.ends_with("LIMIT ?"));
        assert_eq!(query.bound, vec![SqlValue::Integer(DEFAULT_CHART_LIMIT as i64)]);

        let explicit = compile(json!({"x_axis": "item", "y_axis": "quantity_sold", "limit": 25}), CallerShape::Strict).unwrap();
        assert_eq!(explicit.bound, vec![SqlValue::Integer(25)]);
    }

    #[test]
    fn test_filter_value_is_bound_not_interpolated() {
        let payload = "'); DROP TABLE sales;--";
        let query = compile(
            json!({"x_axis": "item", "y_axis": "price", "filter_column": "item", "filter_value": payload}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert!(!query.sql.contains(payload));
        assert!(!query.sql.contains("DROP"));
        assert_eq!(query.sql, r#"SELECT "item", "price" FROM "sales" WHERE "item" = ?"#);
        assert_eq!(query.bound, vec![text(payload)]);
    }

    #[test]
    fn test_falsy_filter_values_apply() {
        let zero = compile(json!({"filter_column": "quantity_sold", "filter_value": 0}), CallerShape::Lenient)
            .unwrap();
        assert_eq!(zero.sql, r#"SELECT * FROM "sales" WHERE "quantity_sold" = ?"#);
        assert_eq!(zero.bound, vec![SqlValue::Integer(0)]);

        let empty = compile(json!({"filter_column": "item", "filter_value": ""}), CallerShape::Lenient).unwrap();
        assert_eq!(empty.bound, vec![text("")]);
    }

    #[test]
    fn test_filter_needs_both_parts() {
        let no_value = compile(json!({"filter_column": "item"}), CallerShape::Lenient).unwrap();
        assert!(!no_value.sql.contains("WHERE"));

        let bad_column = compile(json!({"filter_column": "colour", "filter_value": "red"}), CallerShape::Lenient)
            .unwrap();
        assert!(!bad_column.sql.contains("WHERE"));
        assert!(bad_column.bound.is_empty());
    }

    #[test]
    fn test_time_windows_bind_dates() {
        let quarter = compile(json!({"time_period": "last_quarter"}), CallerShape::Lenient).unwrap();
        assert_eq!(quarter.sql, r#"SELECT * FROM "sales" WHERE "sale_date" BETWEEN ? AND ?"#);
        assert_eq!(quarter.bound, vec![text("2024-10-01"), text("2024-12-31")]);

        let ytd = compile(json!({"time_period": "ytd"}), CallerShape::Lenient).unwrap();
        assert_eq!(ytd.sql, r#"SELECT * FROM "sales" WHERE strftime('%Y', "sale_date") = ?"#);
        assert_eq!(ytd.bound, vec![text("2025")]);

        for ignored in ["all_time", "someday", "2025-01-01 to soon"] {
            let query = compile(json!({"time_period": ignored}), CallerShape::Lenient).unwrap();
            assert_eq!(query.sql, r#"SELECT * FROM "sales""#);
        }
    }

    #[test]
    fn test_where_predicates_conjoined_in_order() {
        let query = compile(
            json!({
                "x_axis": "item",
                "y_axis": "quantity_sold",
                "aggregation": "sum",
                "filter_column": "item",
                "filter_value": "Rice",
                "time_period": "this_month",
                "limit": 3
            }),
            CallerShape::Lenient,
        )
        .unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT "item", SUM("quantity_sold") AS "quantity_sold" FROM "sales" WHERE "sale_date" BETWEEN ? AND ? AND "item" = ? GROUP BY "item" LIMIT ?"#
        );
        assert_eq!(
            query.bound,
            vec![text("2025-02-01"), text("2025-02-28"), text("Rice"), SqlValue::Integer(3)]
        );
    }

    #[test]
    fn test_sort_by_other_column() {
        let query = compile(
            json!({"x_axis": "item", "y_axis": "quantity_sold", "sort_by": "ITEM", "sort_order": "asc"}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert!(query.sql.ends_with(r#"ORDER BY "item" ASC"#));
    }

    #[test]
    fn test_sort_by_unresolvable_is_omitted() {
        let query = compile(
            json!({"x_axis": "item", "y_axis": "quantity_sold", "sort_by": "popularity"}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert!(!query.sql.contains("ORDER BY"));
    }

    #[test]
    fn test_sort_by_derived_alias() {
        let produced = compile(
            json!({"x_axis": "item", "y_axis": "total_sales", "sort_by": "total_sales", "sort_order": "asc"}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert!(produced.sql.ends_with(r#"ORDER BY "total_sales" ASC"#));

        let absent = compile(
            json!({"x_axis": "item", "y_axis": "quantity_sold", "sort_by": "total_sales"}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert!(!absent.sql.contains("ORDER BY"));
    }

    #[test]
    fn test_limit_robustness() {
        for invalid in [json!("abc"), json!(-5)] {
            let query = compile(json!({"limit": invalid}), CallerShape::Lenient).unwrap();
            assert!(!query.sql.contains("LIMIT"));
            assert!(query.bound.is_empty());
        }
        let capped = compile(json!({"limit": 3}), CallerShape::Lenient).unwrap();
        assert_eq!(capped.sql, r#"SELECT * FROM "sales" LIMIT ?"#);
        assert_eq!(capped.bound, vec![SqlValue::Integer(3)]);
    }

    #[test]
    fn test_sort_order_never_reaches_sql_raw() {
        let query = compile(
            json!({"sort_by": "item", "sort_order": "DESC; DROP TABLE sales"}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert_eq!(query.sql, r#"SELECT * FROM "sales" ORDER BY "item" DESC"#);
    }

    #[test]
    fn test_bound_json() {
        let query = compile(
            json!({"filter_column": "item", "filter_value": "Rice", "limit": 2}),
            CallerShape::Lenient,
        )
        .unwrap();
        assert_eq!(query.bound_json(), vec![json!("Rice"), json!(2)]);
    }
}
