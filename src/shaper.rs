//! Result Shaper
//!
//! Post-processing over rows that already came back from the ledger:
//! `sale_date` normalization and an optional second sort/limit pass whose sort
//! key is matched against the result's own columns, not the tenant schema.
//! Nothing here touches storage.

use crate::compiler::TOTAL_SALES;
use crate::params::{Aggregation, ParameterSet, SortOrder};
use crate::store::Record;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::warn;

const SALE_DATE: &str = "sale_date";

/// Presentation-level sort and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presentation {
    /// Sort key candidates, first one found among the result columns wins
    pub sort_candidates: Vec<String>,
    pub sort_order: SortOrder,
    pub limit: Option<u64>,
}

impl Presentation {
    /// Chart requests sort by `sort_by`, falling back to the y axis; a
    /// `price`+`sum` request sorts by the derived `total_sales`.
    pub fn for_chart(params: &ParameterSet) -> Self {
        let mut sort_candidates = Vec::new();
        if let Some(sort_by) = &params.sort_by {
            sort_candidates.push(sort_by.clone());
        }
        if let Some(y_axis) = &params.y_axis {
            if y_axis.eq_ignore_ascii_case("price") && params.aggregation == Aggregation::Sum {
                sort_candidates.push(TOTAL_SALES.to_string());
            }
            sort_candidates.push(y_axis.clone());
        }
        Self {
            sort_candidates,
            sort_order: params.sort_order,
            limit: params.limit,
        }
    }
}

/// Rewrite every `sale_date` value as `YYYY-MM-DD`; unparseable values become null
pub fn normalize_dates(records: &mut [Record]) {
    for record in records.iter_mut() {
        if let Some(value) = record.get_mut(SALE_DATE) {
            let normalized = match &*value {
                Value::String(raw) => normalize_date(raw)
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
            *value = normalized;
        }
    }
}

fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
                .map(|dt| dt.date())
                .ok()
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()).ok())
}

/// Second sort/limit pass over already-compiled results
pub fn shape(mut records: Vec<Record>, presentation: &Presentation) -> Vec<Record> {
    match sort_column(&records, &presentation.sort_candidates) {
        Some(column) => sort_records(&mut records, &column, presentation.sort_order),
        None if !presentation.sort_candidates.is_empty() && !records.is_empty() => {
            warn!(
                sort_by = ?presentation.sort_candidates,
                "Sort column not found in fetched data. Skipping sort."
            );
        }
        None => {}
    }

    if let Some(limit) = presentation.limit {
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    records
}

/// Case-insensitive match of the candidates against the result's columns
fn sort_column(records: &[Record], candidates: &[String]) -> Option<String> {
    let first = records.first()?;
    candidates.iter().find_map(|candidate| {
        first
            .keys()
            .find(|key| key.to_lowercase() == candidate.to_lowercase())
            .cloned()
    })
}

/// Stable sort; nulls and missing values always go last
fn sort_records(records: &mut [Record], column: &str, order: SortOrder) {
    records.sort_by(|a, b| {
        let left = a.get(column).filter(|v| !v.is_null());
        let right = b.get(column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = compare_values(l, r);
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            }
        }
    });
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            let (l, r) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
