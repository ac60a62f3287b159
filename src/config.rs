//! Ledger configuration
//!
//! Where tenant ledgers live, where the master ledger lives, and which UTC
//! offset defines "today" for the business. Loaded from the environment
//! (optionally through a `.env` file) and overridable from the CLI.

use crate::error::{LedgerError, Result};
use chrono::FixedOffset;
use std::path::PathBuf;

/// Asia/Kathmandu, UTC+05:45, no daylight saving.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 5 * 60 + 45;

pub const DEFAULT_DATA_DIR: &str = "user_data";
pub const DEFAULT_MASTER_DB: &str = "master_sales.db";

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Directory holding one `sales_<tenant>.db` file per tenant
    pub data_dir: PathBuf,

    /// Shared cross-tenant ledger file
    pub master_db_path: PathBuf,

    /// Business timezone as minutes east of UTC
    pub utc_offset_minutes: i32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            master_db_path: PathBuf::from(DEFAULT_MASTER_DB),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

impl LedgerConfig {
    /// Build a config rooted at `root`: tenant ledgers under `root/user_data`,
    /// master ledger at `root/master_sales.db`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join(DEFAULT_DATA_DIR),
            master_db_path: root.join(DEFAULT_MASTER_DB),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }

    /// Load from `LEDGER_DATA_DIR`, `LEDGER_MASTER_DB` and
    /// `LEDGER_UTC_OFFSET_MINUTES`, falling back to the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("LEDGER_MASTER_DB") {
            config.master_db_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("LEDGER_UTC_OFFSET_MINUTES") {
            config.utc_offset_minutes = raw.trim().parse().map_err(|_| {
                LedgerError::Config(format!("LEDGER_UTC_OFFSET_MINUTES is not an integer: '{}'", raw))
            })?;
        }
        config.business_offset()?;
        Ok(config)
    }

    pub fn business_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            LedgerError::Config(format!(
                "UTC offset of {} minutes is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}
