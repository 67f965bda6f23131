//! Monitor Trade - Main Entry Point
//!
//! `run` (the default) starts the trigger service. The other subcommands act
//! as a short-lived instance sharing the same durable store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monitor_trade::command::CommandHandler;
use monitor_trade::config::Config;
use monitor_trade::exchange::{BinanceClient, BookTickerFeed, ExecutionVenue, FreqtradeClient, PaperVenue};
use monitor_trade::market::{QuoteCache, WatchedPairs};
use monitor_trade::monitor::{MonitorStore, TradeLockManager};
use monitor_trade::notify::{spawn_log_drain, ResultNotifier};
use monitor_trade::store::{self, DurableStore};
use monitor_trade::strategy::{
    spawn_whitelist_refresher, PositionReconciler, QuoteRouter, SignalEvaluator, StatusReporter,
    TradeDispatcher, TradeExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Monitor Trade CLI
#[derive(Parser)]
#[command(name = "monitor-trade")]
#[command(version, about = "Price-trigger monitor dispatching Freqtrade force entries")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trigger service (default)
    Run,

    /// Create or replace a trigger
    Set {
        /// Pair, e.g. BTC or BTC/USDT:USDT
        #[arg(short, long)]
        pair: String,

        /// long or short
        #[arg(short, long)]
        direction: String,

        /// Limit price
        #[arg(long)]
        price: String,
    },

    /// Remove a trigger
    Cancel {
        #[arg(short, long)]
        pair: String,

        #[arg(short, long)]
        direction: String,
    },

    /// List triggers with the remaining lifetime of their replica
    List {
        /// Only show one direction
        #[arg(short, long)]
        direction: Option<String>,
    },

    /// Release a pair's trade lock before it expires
    Unlock {
        #[arg(short, long)]
        pair: String,
    },

    /// Show the current bid/ask for a pair
    Price {
        #[arg(short, long)]
        pair: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    config.validate()?;

    init_logging()?;

    match cli.command {
        None | Some(Commands::Run) => run_service(config).await,
        Some(command) => run_command(config, command).await,
    }
}

/// Execute one operator command and print its reply.
async fn run_command(config: Config, command: Commands) -> Result<()> {
    let shutdown = CancellationToken::new();
    let durable = store::open(&config.redis, &shutdown).await?;
    let monitors = Arc::new(MonitorStore::new(durable.clone(), config.redis.expiry_window()));
    let locks = TradeLockManager::new(durable, config.dispatch.lock_ttl());
    let prices = Arc::new(BinanceClient::new(&config.binance)?);
    let handler = CommandHandler::new(monitors, locks, prices);

    let reply = match command {
        Commands::Set {
            pair,
            direction,
            price,
        } => handler.set(&pair, &direction, &price).await,
        Commands::Cancel { pair, direction } => handler.cancel(&pair, &direction).await,
        Commands::List { direction } => handler.list(direction.as_deref()).await,
        Commands::Unlock { pair } => handler.unlock(&pair).await,
        Commands::Price { pair } => handler.price(&pair).await,
        Commands::Run => Err(anyhow::anyhow!("run is not an operator command")),
    };
    shutdown.cancel();

    match reply {
        Ok(reply) => {
            println!("{reply}");
            Ok(())
        }
        Err(e) => {
            println!("❌ {e:#}");
            Err(e)
        }
    }
}

async fn run_service(config: Config) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║              Monitor Trade v{} - Trigger Service            ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Durable store
    let durable = store::open(&config.redis, &shutdown).await?;
    if config.redis.enable_keyspace_events {
        enable_notifications(durable.as_ref()).await;
    }

    let monitors = Arc::new(MonitorStore::new(durable.clone(), config.redis.expiry_window()));
    match monitors.load_from_durable_store().await {
        Ok(count) => info!("📂 [INIT] Loaded {} monitors from durable store", count),
        Err(e) => warn!("⚠️  [INIT] Failed to load monitors: {}", e),
    }
    let locks = TradeLockManager::new(durable.clone(), config.dispatch.lock_ttl());

    // Execution venue
    let venue: Arc<dyn ExecutionVenue> = if config.dispatch.paper_trading {
        info!(
            "📝 PAPER TRADING MODE - max {} open trades",
            config.dispatch.paper_max_open_trades
        );
        Arc::new(
            PaperVenue::new(config.dispatch.paper_max_open_trades)
                .with_whitelist(config.dispatch.paper_whitelist.clone()),
        )
    } else {
        let client = Arc::new(FreqtradeClient::new(&config.freqtrade)?);
        client
            .login()
            .await
            .context("Freqtrade login failed")?;
        info!("✅ [INIT] Logged in to Freqtrade at {}", config.freqtrade.base_url);
        tasks.push(client.clone().spawn_token_refresher(
            Duration::from_secs(config.freqtrade.token_refresh_secs),
            shutdown.clone(),
        ));
        client
    };
    let binance = Arc::new(BinanceClient::new(&config.binance)?);

    // Queues
    let (notifier, notifications) = ResultNotifier::channel(config.dispatch.notification_capacity);
    let (dispatcher, intents) = TradeDispatcher::channel(config.dispatch.trade_queue_capacity);
    let (quote_tx, quote_rx) = mpsc::channel(config.dispatch.quote_queue_capacity);

    let quotes = Arc::new(QuoteCache::new());
    let watched = Arc::new(WatchedPairs::new());

    // Background tasks
    tasks.push(tokio::spawn(
        monitors
            .clone()
            .run_replication(config.dispatch.replication_backoff(), shutdown.clone()),
    ));
    tasks.push(spawn_whitelist_refresher(
        venue.clone(),
        watched.clone(),
        Duration::from_secs(config.freqtrade.whitelist_refresh_secs),
        shutdown.clone(),
    ));
    tasks.push(
        Arc::new(PositionReconciler::new(venue.clone(), monitors.clone(), notifier.clone()))
            .spawn(Duration::from_secs(config.freqtrade.status_poll_secs), shutdown.clone()),
    );
    tasks.push(spawn_log_drain(notifications, shutdown.clone()));
    tasks.push(
        Arc::new(StatusReporter::new(monitors.clone(), quotes.clone(), watched.clone()))
            .spawn(Duration::from_secs(config.dispatch.status_report_secs), shutdown.clone()),
    );

    let executor = Arc::new(TradeExecutor::new(
        venue,
        locks,
        monitors.clone(),
        notifier.clone(),
    ));
    tasks.extend(executor.spawn_workers(intents, config.dispatch.executor_workers, shutdown.clone()));

    let evaluator = SignalEvaluator::new(
        monitors.clone(),
        dispatcher,
        binance,
        notifier,
        config.dispatch.funding_rate_threshold,
    )
    .with_order_type(config.dispatch.order_type);
    tasks.push(tokio::spawn(QuoteRouter::new(evaluator).run(quote_rx, shutdown.clone())));

    let feed = BookTickerFeed::new(&config.binance, quotes, watched, quote_tx);
    tasks.push(tokio::spawn(feed.run(shutdown.clone())));

    // Shutdown signal
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.cancel();
    });

    info!("🚀 Monitoring {} triggers", monitors.len());
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    shutdown.cancelled().await;
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    info!("👋 Monitor Trade shutdown complete");
    Ok(())
}

async fn enable_notifications(durable: &dyn DurableStore) {
    match durable.enable_notifications().await {
        Ok(true) => info!("✅ [INIT] Keyspace notifications enabled"),
        Ok(false) => info!("✅ [INIT] Keyspace notifications already enabled"),
        Err(e) => warn!("⚠️  [INIT] Failed to enable keyspace notifications: {}", e),
    }
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "monitor-trade.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("monitor_trade=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Durable Store: {} (db {})", config.redis.url, config.redis.db);
    info!("   Monitor Expiry Window: {}s", config.redis.key_expire_secs);
    info!("   Freqtrade: {}", config.freqtrade.base_url);
    info!("   Binance WS: {}", config.binance.futures_ws_url);
    info!(
        "   Funding Rate Threshold: {}%",
        config.dispatch.funding_rate_threshold
    );
    info!("   Trade Lock TTL: {}s", config.dispatch.lock_ttl_secs);
    info!(
        "   Queues: trade {}, quote {}, notify {}",
        config.dispatch.trade_queue_capacity,
        config.dispatch.quote_queue_capacity,
        config.dispatch.notification_capacity
    );
    info!("   Executor Workers: {}", config.dispatch.executor_workers);
    info!("   Order Type: {}", config.dispatch.order_type);
}
