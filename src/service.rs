//! Ledger Service - the two caller paths over the compile/execute cycle
//!
//! Validate columns, resolve the period, compile, execute, shape. Every
//! failure except ledger creation degrades to "no data" plus a log line
//! carrying the tenant and the offending parameter.

use crate::compiler::{CallerShape, CompiledQuery, QueryCompiler};
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::params::ParameterSet;
use crate::schema::TenantSchema;
use crate::shaper::{self, Presentation};
use crate::store::{Record, SaleRecord, TenantStore};
use crate::tenant::TenantId;
use crate::time_window::ReferenceDate;
use chrono::NaiveDate;
use tracing::{info, warn};

pub struct LedgerService {
    store: TenantStore,
    reference: ReferenceDate,
}

impl LedgerService {
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            store: TenantStore::new(config),
            reference: ReferenceDate::Business(config.business_offset()?),
        })
    }

    /// Pin "today", e.g. to replay a question asked on another day
    pub fn with_reference_date(mut self, today: NaiveDate) -> Self {
        self.reference = ReferenceDate::Fixed(today);
        self
    }

    pub fn store(&self) -> &TenantStore {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.reference.today()
    }

    /// Create the tenant's ledger if absent. Failure propagates.
    pub fn ensure_tenant(&self, tenant: &TenantId) -> Result<()> {
        self.store.ensure_table(tenant)
    }

    pub fn record_sales(&self, tenant: &TenantId, sales: &[SaleRecord]) -> Result<usize> {
        self.store.append_sales(tenant, sales)
    }

    /// Compile against the tenant's live schema without executing
    pub fn compile(&self, params: &ParameterSet, tenant: &TenantId, shape: CallerShape) -> Result<CompiledQuery> {
        let schema = TenantSchema::load(&self.store, tenant);
        QueryCompiler::new(self.today()).compile(params, &schema, shape)
    }

    /// Planning-pipeline path: tolerant of empty and partially resolvable
    /// parameter sets.
    pub fn fetch_for_analysis(&self, params: &ParameterSet, tenant: &TenantId) -> Vec<Record> {
        self.run(params, tenant, CallerShape::Lenient)
    }

    /// Direct chart-data path: needs both axes, then re-sorts and caps the
    /// rows against the result's own columns.
    pub fn fetch_chart_data(&self, params: &ParameterSet, tenant: &TenantId) -> Vec<Record> {
        let records = self.run(params, tenant, CallerShape::Strict);
        if records.is_empty() {
            warn!(tenant = %tenant, "No data available for charts based on the provided parameters");
            return records;
        }
        shaper::shape(records, &Presentation::for_chart(params))
    }

    fn run(&self, params: &ParameterSet, tenant: &TenantId, shape: CallerShape) -> Vec<Record> {
        if !self.store.ledger_exists(tenant) {
            warn!(tenant = %tenant, "User database not found. Returning no data.");
            return Vec::new();
        }

        let query = match self.compile(params, tenant, shape) {
            Ok(query) => query,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "Query not compiled. Returning no data.");
                return Vec::new();
            }
        };

        let mut records = self.store.execute(tenant, &query.sql, &query.bound);
        shaper::normalize_dates(&mut records);
        info!(tenant = %tenant, rows = records.len(), "Ledger query returned");
        records
    }
}
