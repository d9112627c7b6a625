use std::io::Read;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dispatch::models::{BulkOrderRequest, Location, NewOrder};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dispatch", about = "Delivery dispatch - order allocation and reporting")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DISPATCH_CONFIG", default_value = "config/dispatch.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage warehouses
    #[command(subcommand)]
    Warehouse(WarehouseCommand),
    /// Check agents in and out, and show their earnings
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Create delivery orders
    #[command(subcommand)]
    Order(OrderCommand),
    /// Run one allocation pass now
    Allocate,
    /// List the assignment ledger
    Assignments(PageArgs),
    /// Agent and system summaries
    #[command(subcommand)]
    Summary(SummaryCommand),
    /// Count orders whose assigned flag disagrees with the ledger
    Verify,
}

#[derive(Subcommand, Debug)]
enum WarehouseCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    /// Check in an agent, creating it on first check-in
    CheckIn {
        #[arg(long)]
        name: String,
        #[arg(long)]
        warehouse: i64,
    },
    CheckOut {
        #[arg(long)]
        id: i64,
    },
    /// Show an agent with its earnings summary
    Show {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    Create {
        #[arg(long)]
        customer: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        #[arg(long)]
        warehouse: i64,
    },
    /// Create orders from a JSON `{"orders": [...]}` document in one transaction
    Bulk {
        /// Read the request from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SummaryCommand {
    Agents(PageArgs),
    System(PageArgs),
}

#[derive(Args, Debug)]
struct PageArgs {
    /// 1-based page number; 0 means the first page
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Items per page; 0 means the configured default
    #[arg(long, default_value_t = 0)]
    limit: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = dispatch::load_config(&cli.config)?;
    tracing::debug!(config = %cli.config, store = %config.store.sqlite_path, "Loaded config");
    let store = dispatch::open_store(&config)?;

    match cli.command {
        Command::Warehouse(WarehouseCommand::Create { name, lat, lng }) => {
            let warehouse = store
                .create_warehouse(&name, Location::new(lat, lng))
                .context("Failed to create warehouse")?;
            emit(&warehouse, cli.pretty)
        }
        Command::Agent(AgentCommand::CheckIn { name, warehouse }) => {
            let agent = store
                .check_in_agent(&name, warehouse)
                .context("Failed to check in agent")?;
            emit(&agent, cli.pretty)
        }
        Command::Agent(AgentCommand::CheckOut { id }) => {
            let agent = store
                .check_out_agent(id)
                .context("Failed to check out agent")?;
            emit(&agent, cli.pretty)
        }
        Command::Agent(AgentCommand::Show { id }) => {
            let reporter = dispatch::build_reporter(&config, store);
            let detail = reporter
                .agent_detail(id)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to load agent {id}: {e}"))?;
            emit(&detail, cli.pretty)
        }
        Command::Order(OrderCommand::Create {
            customer,
            lat,
            lng,
            warehouse,
        }) => {
            let order = store
                .create_order(&NewOrder {
                    customer,
                    lat,
                    lng,
                    warehouse_id: warehouse,
                })
                .context("Failed to create order")?;
            emit(&order, cli.pretty)
        }
        Command::Order(OrderCommand::Bulk { input }) => {
            let request_json = read_input(input.as_deref())?;
            let request: BulkOrderRequest =
                serde_json::from_str(&request_json).context("Failed to parse bulk order JSON")?;
            let orders = store
                .create_orders(&request.orders)
                .context("Failed to create orders")?;
            emit(&orders, cli.pretty)
        }
        Command::Allocate => {
            let allocator = dispatch::build_allocator(&config, store);
            let report = allocator
                .allocate_within(allocator.trigger_wait())
                .await
                .map_err(|e| anyhow::anyhow!("Allocation failed: {e}"))?;
            emit(&report, cli.pretty)
        }
        Command::Assignments(args) => {
            let reporter = dispatch::build_reporter(&config, store);
            let page = reporter
                .assignments(args.page, args.limit)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to list assignments: {e}"))?;
            emit(&page, cli.pretty)
        }
        Command::Summary(SummaryCommand::Agents(args)) => {
            let reporter = dispatch::build_reporter(&config, store);
            let summary = reporter
                .agent_summary(args.page, args.limit)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to summarize agents: {e}"))?;
            emit(&summary, cli.pretty)
        }
        Command::Summary(SummaryCommand::System(args)) => {
            let reporter = dispatch::build_reporter(&config, store);
            let summary = reporter
                .system_summary(args.page, args.limit)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to summarize system: {e}"))?;
            emit(&summary, cli.pretty)
        }
        Command::Verify => {
            let mismatches = store
                .ledger_mismatches()
                .context("Failed to verify ledger")?;
            emit(&serde_json::json!({ "mismatches": mismatches }), cli.pretty)
        }
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    if let Some(input_path) = path {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        Ok(buf)
    }
}

fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
