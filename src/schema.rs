//! Schema Validator
//!
//! Resolves caller-supplied column names against a tenant's live ledger schema,
//! case-insensitively. Every identifier the query compiler writes into SQL text
//! is a [`Column`], and a [`Column`] can only be obtained from this module.

use crate::store::TenantStore;
use crate::tenant::TenantId;
use std::fmt;
use tracing::{error, warn};

/// Minimum Jaro-Winkler similarity for a "did you mean" hint
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A physical column of a tenant ledger, with its canonical casing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    pub(crate) fn trusted(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Double-quoted SQL identifier
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column allow-list of one tenant, read fresh for each compile
#[derive(Debug, Clone)]
pub struct TenantSchema {
    tenant: TenantId,
    columns: Vec<String>,
}

impl TenantSchema {
    /// Read the live column list. A missing ledger or a storage failure yields
    /// an empty schema, against which nothing resolves.
    pub fn load(store: &TenantStore, tenant: &TenantId) -> Self {
        let columns = match store.columns(tenant) {
            Ok(columns) => columns,
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Could not read ledger schema");
                Vec::new()
            }
        };
        Self {
            tenant: tenant.clone(),
            columns,
        }
    }

    pub fn from_columns<I, S>(tenant: TenantId, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tenant,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Canonical column for `candidate`, or `None` when the schema has no
    /// case-insensitive match.
    pub fn resolve(&self, candidate: &str) -> Option<Column> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return None;
        }

        if let Some(found) = self
            .columns
            .iter()
            .find(|c| c.to_lowercase() == candidate.to_lowercase())
        {
            return Some(Column::trusted(found));
        }

        match self.closest(candidate) {
            Some(hint) => warn!(
                tenant = %self.tenant,
                column = %candidate,
                closest = %hint,
                "Invalid column suggested. Not found in ledger schema."
            ),
            None => warn!(
                tenant = %self.tenant,
                column = %candidate,
                "Invalid column suggested. Not found in ledger schema."
            ),
        }
        None
    }

    fn closest(&self, candidate: &str) -> Option<&str> {
        let candidate = candidate.to_lowercase();
        self.columns
            .iter()
            .map(|c| (c, strsim::jaro_winkler(&c.to_lowercase(), &candidate)))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(c, _)| c.as_str())
    }
}

/// One-shot resolution: canonical name of `candidate` in the tenant's ledger
pub fn resolve_column(store: &TenantStore, candidate: &str, tenant: &TenantId) -> Option<String> {
    TenantSchema::load(store, tenant)
        .resolve(candidate)
        .map(|c| c.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LEDGER_COLUMNS;

    fn schema() -> TenantSchema {
        TenantSchema::from_columns(TenantId::parse("9800000001").unwrap(), LEDGER_COLUMNS)
    }

    #[test]
    fn test_case_insensitive_resolution() {
        let schema = schema();
        for candidate in ["ITEM", "Item", "item", " item "] {
            assert_eq!(schema.resolve(candidate).unwrap().name(), "item");
        }
        assert_eq!(schema.resolve("Quantity_Sold").unwrap().name(), "quantity_sold");
    }

    #[test]
    fn test_unknown_column_is_not_found() {
        let schema = schema();
        assert!(schema.resolve("nonexistent_col").is_none());
        assert!(schema.resolve("").is_none());
        assert!(schema.resolve("item; DROP TABLE sales").is_none());
    }

    #[test]
    fn test_derived_alias_is_not_a_column() {
        assert!(schema().resolve("total_sales").is_none());
    }

    #[test]
    fn test_empty_schema_resolves_nothing() {
        let schema = TenantSchema::from_columns(TenantId::parse("1").unwrap(), Vec::<String>::new());
        assert!(schema.is_empty());
        assert!(schema.resolve("item").is_none());
    }

    #[test]
    fn test_closest_hint() {
        let schema = schema();
        assert_eq!(schema.closest("quantity_sol"), Some("quantity_sold"));
        assert_eq!(schema.closest("zzz"), None);
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("item"), "\"item\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
