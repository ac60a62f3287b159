pub mod compiler;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod insight;
pub mod params;
pub mod prompts;
pub mod schema;
pub mod service;
pub mod shaper;
pub mod store;
pub mod tenant;
pub mod time_window;

pub use compiler::{CallerShape, CompiledQuery, Measure, QueryCompiler};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use params::ParameterSet;
pub use schema::{resolve_column, TenantSchema};
pub use service::LedgerService;
pub use store::{Record, SaleRecord, TenantStore};
pub use tenant::TenantId;
pub use time_window::{resolve_time_window, TimePeriod, TimeWindow};
