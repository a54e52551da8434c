//! Cycle Trader - Main Entry Point

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cycle_trader::broker::{BrokerRouter, PaperBroker};
use cycle_trader::config::Config;
use cycle_trader::engine::{
    Clock, SnapshotStateMachine, StrategyRunner, SystemClock, TickScheduler, TradingCalendar,
};
use cycle_trader::model::{NewStrategy, StrategyParams, StrategyStatus, StrategyVariant};
use cycle_trader::persistence::{SqliteRepository, StrategyRepository};
use cycle_trader::strategy::StrategyKind;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Cycle Trader CLI
#[derive(Parser)]
#[command(name = "cycle-trader")]
#[command(version, about = "Scheduled cycle-based strategy execution")]
struct Cli {
    /// Config file base name (extension optional)
    #[arg(long, global = true, default_value = "config")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new strategy (starts ACTIVE)
    Create {
        /// Unique strategy name
        name: String,

        /// Strategy variant (AVERAGING or VALUE_REBALANCING)
        #[arg(short, long)]
        variant: StrategyVariant,

        /// Brokerage account reference
        #[arg(short, long)]
        account: String,

        /// Strategy parameter, repeatable (e.g. --param ticker=TQQQ)
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List strategies
    List {
        /// Only strategies with this status
        #[arg(short, long)]
        status: Option<StrategyStatus>,
    },

    /// Resume a paused strategy
    Activate { name: String },

    /// Stop ticking a strategy without losing its state
    Pause { name: String },

    /// Retire a strategy for good
    Terminate { name: String },

    /// Delete a strategy with its snapshots and orders
    Delete { name: String },

    /// Run one tick for every ACTIVE strategy, or for one strategy
    Run {
        /// Only this strategy
        #[arg(short, long)]
        strategy: Option<String>,

        /// Paper broker quote, repeatable (e.g. --price TQQQ=52.10)
        #[arg(long = "price", value_parser = parse_key_value)]
        prices: Vec<(String, String)>,
    },

    /// Tick on the configured interval until Ctrl-C
    Schedule {
        /// Paper broker quote, repeatable
        #[arg(long = "price", value_parser = parse_key_value)]
        prices: Vec<(String, String)>,
    },

    /// Show a strategy's snapshot history
    Snapshots { name: String },

    /// Show the orders of a snapshot
    Orders { snapshot_id: i64 },

    /// Show a strategy's daily summary
    Summary { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(&cli.config)?;
    config.validate()?;

    init_logging(&config)?;

    let repo = Arc::new(SqliteRepository::new(&config.database.path)?);

    match cli.command {
        Commands::Create {
            name,
            variant,
            account,
            params,
            description,
        } => create_strategy(repo.as_ref(), name, variant, account, params, description),
        Commands::List { status } => list_strategies(repo.as_ref(), status),
        Commands::Activate { name } => set_status(repo.as_ref(), &name, StrategyStatus::Active),
        Commands::Pause { name } => set_status(repo.as_ref(), &name, StrategyStatus::Paused),
        Commands::Terminate { name } => {
            set_status(repo.as_ref(), &name, StrategyStatus::Terminated)
        }
        Commands::Delete { name } => {
            let strategy = find_strategy(repo.as_ref(), &name)?;
            repo.delete_strategy(strategy.id)?;
            info!(strategy = %name, "Strategy deleted");
            Ok(())
        }
        Commands::Run { strategy, prices } => {
            let runner = build_runner(&config, repo, &prices).await?;
            match strategy {
                Some(name) => {
                    let outcome = runner.run_named(&name).await?;
                    println!("{name}: {outcome}");
                }
                None => {
                    for (name, outcome) in runner.run_all().await {
                        println!("{name}: {outcome}");
                    }
                }
            }
            Ok(())
        }
        Commands::Schedule { prices } => {
            let runner = Arc::new(build_runner(&config, repo, &prices).await?);
            let scheduler = TickScheduler::start(
                runner,
                Duration::from_secs(config.scheduler.interval_secs),
            );

            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            scheduler.stop().await;
            Ok(())
        }
        Commands::Snapshots { name } => show_snapshots(repo.as_ref(), &name),
        Commands::Orders { snapshot_id } => show_orders(repo.as_ref(), snapshot_id),
        Commands::Summary { name } => {
            let runner = build_runner(&config, repo, &[]).await?;
            print!("{}", runner.summary(&name)?);
            Ok(())
        }
    }
}

/// Initialize logging to stdout and a daily rolling file.
fn init_logging(config: &Config) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all(&config.logging.directory)?;

    let file_appender =
        tracing_appender::rolling::daily(&config.logging.directory, &config.logging.file_prefix);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cycle_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    Ok(())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Build the runner over a paper broker seeded from config and `--price`.
async fn build_runner(
    config: &Config,
    repo: Arc<SqliteRepository>,
    prices: &[(String, String)],
) -> Result<StrategyRunner> {
    let calendar = TradingCalendar::from_offset_hours(config.scheduler.utc_offset_hours);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut quotes = config.paper.quotes();
    for (ticker, value) in prices {
        let price: Decimal = value
            .parse()
            .with_context(|| format!("invalid price for {ticker}: {value}"))?;
        if price <= Decimal::ZERO {
            bail!("price for {ticker} must be positive");
        }
        quotes.insert(ticker.to_uppercase(), price);
    }

    let broker = Arc::new(PaperBroker::with_ledger(
        clock.clone(),
        calendar.offset(),
        &config.database.path,
    )?);
    broker.set_market_open(config.paper.market_open);
    broker.set_prices(quotes).await;
    broker.settle_open_orders().await?;
    info!(
        market_open = config.paper.market_open,
        utc_offset_hours = config.scheduler.utc_offset_hours,
        "Paper broker ready"
    );

    Ok(StrategyRunner::new(
        repo,
        BrokerRouter::single(broker),
        clock,
        SnapshotStateMachine::new(calendar),
        &config.execution,
    ))
}

fn find_strategy(
    repo: &dyn StrategyRepository,
    name: &str,
) -> Result<cycle_trader::model::Strategy> {
    repo.get_strategy(name)?
        .with_context(|| format!("strategy {name} not found"))
}

/// Parameter values are read as JSON when they parse, as text otherwise.
fn to_params(pairs: Vec<(String, String)>) -> StrategyParams {
    pairs
        .into_iter()
        .map(|(key, raw)| {
            let value = serde_json::from_str::<Value>(&raw)
                .ok()
                .filter(|v| !v.is_string())
                .unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect()
}

fn create_strategy(
    repo: &dyn StrategyRepository,
    name: String,
    variant: StrategyVariant,
    account: String,
    params: Vec<(String, String)>,
    description: Option<String>,
) -> Result<()> {
    let new = NewStrategy {
        name,
        account,
        variant,
        params: to_params(params),
        description,
    };

    // Validates parameters before anything is stored
    let candidate = cycle_trader::model::Strategy {
        id: 0,
        name: new.name.clone(),
        account: new.account.clone(),
        variant: new.variant,
        status: StrategyStatus::Active,
        params: new.params.clone(),
        description: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };
    let kind = StrategyKind::from_strategy(&candidate)?;

    let strategy = repo.create_strategy(&new, chrono::Utc::now())?;
    info!(
        strategy = %strategy.name,
        id = strategy.id,
        variant = %strategy.variant,
        ticker = %kind.ticker(),
        "Strategy created"
    );
    Ok(())
}

fn list_strategies(repo: &dyn StrategyRepository, status: Option<StrategyStatus>) -> Result<()> {
    let strategies = repo.list_strategies(status)?;
    if strategies.is_empty() {
        println!("No strategies");
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<18} {:<8} {:<11} {}",
        "ID", "NAME", "VARIANT", "TICKER", "STATUS", "ACCOUNT"
    );
    for s in strategies {
        println!(
            "{:<4} {:<20} {:<18} {:<8} {:<11} {}",
            s.id,
            s.name,
            s.variant,
            s.ticker().unwrap_or("?"),
            s.status,
            s.account
        );
    }
    Ok(())
}

fn set_status(repo: &dyn StrategyRepository, name: &str, status: StrategyStatus) -> Result<()> {
    let strategy = find_strategy(repo, name)?;
    if strategy.status == StrategyStatus::Terminated && status != StrategyStatus::Terminated {
        warn!(strategy = %name, "Reviving a terminated strategy");
    }
    repo.set_strategy_status(strategy.id, status, chrono::Utc::now())?;
    info!(strategy = %name, from = %strategy.status, to = %status, "Strategy status changed");
    Ok(())
}

fn show_snapshots(repo: &dyn StrategyRepository, name: &str) -> Result<()> {
    let strategy = find_strategy(repo, name)?;
    let snapshots = repo.list_snapshots(strategy.id)?;

    println!(
        "{:<6} {:<6} {:<5} {:<12} {:>12} {:>12} {:<25} {}",
        "ID", "CYCLE", "STEP", "STATUS", "QUANTITY", "EQUITY", "CREATED", "ERROR"
    );
    for s in snapshots {
        println!(
            "{:<6} {:<6} {:<5} {:<12} {:>12} {:>12} {:<25} {}",
            s.id.map(|id| id.to_string()).unwrap_or_default(),
            s.cycle,
            s.step,
            s.status,
            s.progress.quantity().normalize(),
            s.progress.equity().round_dp(2),
            s.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

fn show_orders(repo: &dyn StrategyRepository, snapshot_id: i64) -> Result<()> {
    let orders = repo.list_orders(snapshot_id)?;
    if orders.is_empty() {
        println!("No orders for snapshot {snapshot_id}");
        return Ok(());
    }

    let mut by_status: HashMap<String, usize> = HashMap::new();
    println!(
        "{:<10} {:<5} {:<6} {:<9} {:>8} {:>10} {:>8} {:>10} {:<16} {}",
        "BROKER ID", "SIDE", "KIND", "TAG", "QTY", "PRICE", "FILLED", "FILL PX", "STATUS", "ERROR"
    );
    for o in orders {
        *by_status.entry(o.status.to_string()).or_default() += 1;
        println!(
            "{:<10} {:<5} {:<6} {:<9} {:>8} {:>10} {:>8} {:>10} {:<16} {}",
            o.broker_order_id.unwrap_or_else(|| "-".to_string()),
            o.side,
            o.kind,
            o.tag,
            o.quantity.normalize(),
            o.price,
            o.filled_quantity.normalize(),
            o.filled_price.round_dp(2),
            o.status,
            o.error_message.unwrap_or_default()
        );
    }

    let mut counts: Vec<_> = by_status.into_iter().collect();
    counts.sort();
    let counts: Vec<String> = counts.into_iter().map(|(s, n)| format!("{s}={n}")).collect();
    println!("{}", counts.join(" "));
    Ok(())
}
