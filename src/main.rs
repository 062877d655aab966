//! Copy-Trading Engine - mirrors curated leader wallets on Solana
//!
//! # WARNING
//! - This engine trades with real money. Only use funds you can afford to lose.
//! - Leader wallets change behavior; past performance does not persist.
//! - Always rehearse with `start --dry-run` before arming live execution.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use copytrader::chain::{ChainClient, DryRunRouter, HttpQuoteRouter, QuoteRouter, RpcChainClient};
use copytrader::config::Config;
use copytrader::engine::Engine;
use copytrader::ingest::run_ingest;
use copytrader::output::{AuditLog, JsonlWriter};
use copytrader::panic::PanicSentinel;
use copytrader::profile::WalletProfileStore;
use copytrader::reconciler::Reconciler;
use copytrader::snapshot::providers::{ScreenerProvider, SecurityScanProvider};
use copytrader::snapshot::{SnapshotProvider, SnapshotStore};

/// Copy-trading engine for curated leader wallets
#[derive(Parser)]
#[command(name = "copytrader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine
    Start {
        /// Run in dry-run mode (no real orders)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Validate the configuration and exit
    CheckConfig,

    /// Arm or disarm the panic kill-switch
    Panic {
        #[command(subcommand)]
        action: PanicAction,
    },
}

#[derive(Subcommand)]
enum PanicAction {
    /// Block all new entries
    On,
    /// Allow entries again
    Off,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("COPYTRADER_LOG_JSON").map(|v| v == "1").unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // Config validation failures exit with a dedicated status and a
    // single-line diagnostic.
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run } => runtime.block_on(run_start(config, dry_run)),
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
        Commands::CheckConfig => {
            println!("configuration OK");
            Ok(())
        }
        Commands::Panic { action } => run_panic(&config, action),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_panic(config: &Config, action: PanicAction) -> Result<()> {
    let sentinel = PanicSentinel::new(&config.panic.sentinel_path);
    match action {
        PanicAction::On => {
            sentinel.arm().context("failed to arm panic sentinel")?;
            println!("panic armed: new entries blocked");
        }
        PanicAction::Off => {
            sentinel.disarm().context("failed to disarm panic sentinel")?;
            println!("panic disarmed");
        }
    }
    Ok(())
}

async fn run_start(config: Config, dry_run: bool) -> Result<()> {
    info!(dry_run, "Starting copy-trading engine");

    let sentinel = Arc::new(PanicSentinel::new(&config.panic.sentinel_path));
    if sentinel.is_panic_active() {
        warn!("Panic sentinel is armed at startup; entries will be blocked");
    }

    // Snapshot providers: primary market screener, secondary security scan.
    let primary: Arc<dyn SnapshotProvider> = Arc::new(ScreenerProvider::new(
        config.snapshot.primary_url.clone(),
        config.snapshot.provider_timeout_ms,
        config.snapshot.max_retries,
    ));
    let secondary: Option<Arc<dyn SnapshotProvider>> = if config.snapshot.secondary_url.is_empty()
    {
        None
    } else {
        Some(Arc::new(SecurityScanProvider::new(
            config.snapshot.secondary_url.clone(),
            config.snapshot.provider_timeout_ms,
            config.snapshot.max_retries,
        )))
    };
    let snapshots = Arc::new(SnapshotStore::new(
        primary,
        secondary,
        std::time::Duration::from_secs(config.snapshot.ttl_secs),
    ));

    let profiles = Arc::new(WalletProfileStore::new(&config.wallets.profiles_path));
    profiles
        .load()
        .await
        .context("failed to load wallet profiles")?;

    let use_dry_router = dry_run || config.router.base_url.is_empty();
    let router: Arc<dyn QuoteRouter> = if use_dry_router {
        if !dry_run {
            warn!("router.base_url not set; falling back to dry-run router");
        }
        Arc::new(DryRunRouter)
    } else {
        Arc::new(HttpQuoteRouter::new(
            config.router.base_url.clone(),
            config.router.timeout_ms,
        ))
    };

    let audit = Arc::new(
        AuditLog::new(config.output.audit_log_max_entries)
            .with_file(&config.output.audit_log_path)
            .await?,
    );

    let chain: Option<Arc<dyn ChainClient>> = if config.rpc.wallet_pubkey.is_empty() {
        warn!("rpc.wallet_pubkey not set; reorg polling and reconciliation disabled");
        None
    } else {
        Some(Arc::new(RpcChainClient::new(
            &config.rpc.endpoint,
            &config.rpc.wallet_pubkey,
            config.rpc.timeout_ms,
            config.rpc.max_retries,
        )?))
    };

    let reconciler = Reconciler::new(config.reconciler.clone());
    let daily_metrics_out = JsonlWriter::open(&config.output.daily_metrics_path).await?;
    let execution_metrics_out = JsonlWriter::open(&config.output.execution_metrics_path).await?;

    let ingest_path = config.ingest.path.clone();
    let channel_capacity = config.ingest.channel_capacity;
    let reorg_poll_secs = config.reorg.poll_interval_secs.max(1);

    let mut engine = Engine::new(
        config,
        snapshots,
        profiles,
        router,
        sentinel,
        audit,
        use_dry_router,
    )?
    .with_signals_file()
    .await?
    .attach_idempotency_journal()
    .await?;

    // One ingest task feeding the decision task over a bounded channel.
    let (event_tx, event_rx) = async_channel::bounded(channel_capacity);
    let ingest_handle = tokio::spawn(async move { run_ingest(&ingest_path, event_tx).await });

    let mut timeout_sweep = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut reorg_poll = tokio::time::interval(std::time::Duration::from_secs(reorg_poll_secs));
    let mut reconcile_tick = tokio::time::interval(std::time::Duration::from_secs(
        reconciler.interval_seconds().max(1),
    ));
    let mut metrics_tick = tokio::time::interval(std::time::Duration::from_secs(60));

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        // Each observed leader trade doubles as a price
                        // tick for open positions in that mint.
                        let now = chrono::Utc::now();
                        engine.process_tick(&event.mint, event.price, now).await;
                        engine.process_event(event).await;
                    }
                    Err(_) => {
                        info!("Event stream closed, shutting down");
                        break;
                    }
                }
            }
            _ = timeout_sweep.tick() => {
                engine.process_partial_timeouts(chrono::Utc::now()).await;
                engine.prune_idempotency();
            }
            _ = reorg_poll.tick() => {
                if let Some(chain) = &chain {
                    if let Err(e) = engine.poll_reorgs(chain.as_ref(), chrono::Utc::now()).await {
                        warn!(error = %e, "Reorg poll failed");
                    }
                }
            }
            _ = reconcile_tick.tick() => {
                if reconciler.enabled() {
                    if let Some(chain) = &chain {
                        if let Err(e) = engine.reconcile(&reconciler, chain.as_ref()).await {
                            warn!(error = %e, "Reconciliation failed");
                        }
                    }
                }
            }
            _ = metrics_tick.tick() => {
                let now = chrono::Utc::now();
                if let Err(e) = execution_metrics_out.append(&engine.execution_metrics(now)).await {
                    warn!(error = %e, "Execution metrics write failed");
                }
                if let Err(e) = daily_metrics_out.append(&engine.daily_metrics()).await {
                    warn!(error = %e, "Daily metrics write failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    // Final metrics flush.
    let now = chrono::Utc::now();
    execution_metrics_out
        .append(&engine.execution_metrics(now))
        .await
        .ok();
    daily_metrics_out.append(&engine.daily_metrics()).await.ok();

    ingest_handle.abort();
    match ingest_handle.await {
        Ok(Ok(summary)) => info!(
            accepted = summary.accepted,
            malformed = summary.malformed,
            "Ingest summary"
        ),
        Ok(Err(e)) => warn!(error = %e, "Ingest task failed"),
        Err(_) => {}
    }

    Ok(())
}
