use vendor_ledger::compiler::CallerShape;
use vendor_ledger::config::LedgerConfig;
use vendor_ledger::dashboard::Dashboard;
use vendor_ledger::params::ParameterSet;
use vendor_ledger::service::LedgerService;
use vendor_ledger::store::SaleRecord;
use vendor_ledger::tenant::TenantId;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(about = "Per-vendor sales ledger with safe parameter-to-SQL querying")]
#[command(version)]
struct Args {
    /// Directory holding tenant ledgers (or set LEDGER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Master ledger file (or set LEDGER_MASTER_DB)
    #[arg(long, global = true)]
    master_db: Option<PathBuf>,

    /// Pin "today" for time-period resolution (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tenant's ledger if it does not exist
    Init {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
    },
    /// Append one sale to the tenant's ledger and the master ledger
    AddSale {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
        item: String,
        price: f64,
        /// Units left in stock after the sale
        quantity_in_stock: i64,
        quantity_sold: i64,
        /// Sale date, defaults to today in the business timezone
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fetch rows the way the insight planner does
    Query {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
        /// Parameter set as a JSON object
        #[arg(long)]
        params: String,
    },
    /// Fetch chart data: both axes required, rows re-sorted and capped
    Chart {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
        #[arg(long)]
        params: String,
    },
    /// Summary, monthly trend and inventory split
    Dashboard {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
    },
    /// Latest sales rows
    Recent {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
    },
    /// Show the compiled SQL and bound values without executing
    Compile {
        #[arg(value_parser = parse_tenant)]
        phone: TenantId,
        #[arg(long)]
        params: String,
        /// Compile as the chart caller (rejects incomplete requests)
        #[arg(long)]
        strict: bool,
    },
}

fn parse_tenant(raw: &str) -> std::result::Result<TenantId, String> {
    TenantId::parse(raw).map_err(|e| e.to_string())
}

fn parse_params(raw: &str) -> Result<ParameterSet> {
    let value: Value = serde_json::from_str(raw).context("--params must be a JSON object")?;
    Ok(ParameterSet::from_json(&value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = LedgerConfig::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(path) = args.master_db {
        config.master_db_path = path;
    }

    let mut service = LedgerService::new(&config)?;
    if let Some(today) = args.today {
        service = service.with_reference_date(today);
    }

    match args.command {
        Commands::Init { phone } => {
            service.ensure_tenant(&phone)?;
            info!(tenant = %phone, "Ledger ready");
            print_json(&json!({
                "tenant": phone,
                "ledger": service.store().ledger_path(&phone),
            }))
        }
        Commands::AddSale {
            phone,
            item,
            price,
            quantity_in_stock,
            quantity_sold,
            date,
        } => {
            let sale_date = date.unwrap_or_else(|| service.today());
            let sale = SaleRecord::new(item, price, quantity_in_stock, quantity_sold, sale_date);
            let written = service.record_sales(&phone, &[sale])?;
            print_json(&json!({ "tenant": phone, "rows_written": written }))
        }
        Commands::Query { phone, params } => {
            let params = parse_params(&params)?;
            print_json(&service.fetch_for_analysis(&params, &phone))
        }
        Commands::Chart { phone, params } => {
            let params = parse_params(&params)?;
            print_json(&service.fetch_chart_data(&params, &phone))
        }
        Commands::Dashboard { phone } => {
            let dashboard = Dashboard::new(service.store());
            print_json(&json!({
                "summary": dashboard.summary(&phone),
                "salesTrend": dashboard.sales_trend(&phone, service.today()),
                "inventoryDistribution": dashboard.inventory_distribution(&phone),
            }))
        }
        Commands::Recent { phone } => {
            print_json(&Dashboard::new(service.store()).recent_sales(&phone))
        }
        Commands::Compile { phone, params, strict } => {
            let params = parse_params(&params)?;
            let shape = if strict { CallerShape::Strict } else { CallerShape::Lenient };
            let query = service.compile(&params, &phone, shape)?;
            print_json(&json!({
                "sql": query.sql,
                "bound": query.bound_json(),
                "x_axis": query.x_axis,
                "measure": query.measure,
            }))
        }
    }
}
