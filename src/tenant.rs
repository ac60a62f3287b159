//! Tenant identity
//!
//! A tenant is a vendor keyed by phone number. The id ends up in a file name,
//! so it is validated once when parsed and trusted afterwards.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_TENANT_ID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::InvalidTenant("empty phone number".to_string()));
        }
        if trimmed.len() > MAX_TENANT_ID_LEN {
            return Err(LedgerError::InvalidTenant(format!(
                "'{}' is longer than {} characters",
                trimmed, MAX_TENANT_ID_LEN
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_')))
        {
            return Err(LedgerError::InvalidTenant(format!(
                "'{}' contains unsupported character '{}'",
                trimmed, bad
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this tenant's ledger inside the data directory
    pub fn ledger_file_name(&self) -> String {
        format!("sales_{}.db", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}
