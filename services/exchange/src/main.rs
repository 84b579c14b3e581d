use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use exchange::{EngineConfig, MarketRegistry, OrderRequest};
use matching_engine::DEFAULT_DEPTH_LEVELS;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use types::ids::OrderId;
use types::order::{OrderType, Side};

/// Operator tool for the matching engine: every command recovers the
/// configured markets, performs one operation and prints JSON.
#[derive(Parser, Debug)]
#[command(name = "exchange-node", version, about)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `persistence.data_dir`
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured markets and their availability
    Markets,
    /// Show aggregated book depth
    Depth {
        market: String,
        #[arg(long, default_value_t = DEFAULT_DEPTH_LEVELS)]
        levels: usize,
    },
    /// Submit an order
    Place {
        market: String,
        side: SideArg,
        order_type: OrderTypeArg,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        size: Decimal,
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Cancel a resting order
    Cancel { market: String, order_id: String },
    /// Map a numeric market id to its symbol
    Resolve { numeric_id: u32 },
    /// Remove every resting order from a market
    Clear { market: String },
    /// Snapshot every available market now
    Checkpoint,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderTypeArg {
    Limit,
    Market,
}

impl From<OrderTypeArg> for OrderType {
    fn from(arg: OrderTypeArg) -> Self {
        match arg {
            OrderTypeArg::Limit => OrderType::Limit,
            OrderTypeArg::Market => OrderType::Market,
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.persistence.data_dir = dir;
    }

    let registry = MarketRegistry::open(config).context("opening market registry")?;

    match cli.command {
        Command::Markets => print_json(&registry.markets()),
        Command::Depth { market, levels } => print_json(&registry.depth(&market, levels)?),
        Command::Place {
            market,
            side,
            order_type,
            price,
            size,
            client_id,
        } => {
            let request = OrderRequest {
                side: side.into(),
                order_type: order_type.into(),
                price,
                size,
                client_id,
            };
            print_json(&registry.place_order(&market, request)?)
        }
        Command::Cancel { market, order_id } => {
            let order_id = OrderId::try_new(order_id)?;
            print_json(&registry.cancel_order(&market, &order_id)?)
        }
        Command::Resolve { numeric_id } => print_json(&json!({
            "id": numeric_id,
            "symbol": registry.resolve_market(numeric_id),
        })),
        Command::Clear { market } => print_json(&registry.clear_market(&market)?),
        Command::Checkpoint => {
            let mut failed = 0usize;
            let report: Vec<_> = registry
                .checkpoint_all()
                .into_iter()
                .map(|(market, result)| match result {
                    Ok(sequence) => json!({ "market": market, "sequence": sequence }),
                    Err(e) => {
                        failed += 1;
                        json!({ "market": market, "error": e.to_string() })
                    }
                })
                .collect();
            print_json(&report)?;
            anyhow::ensure!(failed == 0, "{failed} market(s) failed to checkpoint");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
