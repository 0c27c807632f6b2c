//! ha-bot: Heikin-Ashi reversal bot for Bybit perpetuals.
//!
//! Single-binary Tokio application that, once per poll interval:
//! 1. Fetches recent klines, balance and open positions
//! 2. Runs the Heikin-Ashi transform with its persisted seed
//! 3. Detects reversal signals and sizes them against the risk budget
//! 4. Places a market order with stop-loss and take-profit when the gate admits it

mod balance;
mod config;
mod cycle;
mod journal;
mod market;

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};

use bybit_client::{BybitAuth, BybitRestClient};
use common::config::BotConfig;
use common::Position;
use cycle::{run_strategy_cycle, CycleContext};
use journal::{now_iso, resolve_trades_dir, write_trade_event, SharedTradeJournal, TradeJournal};
use strategy::{FileStateStore, StrategyEngine};

/// Heikin-Ashi reversal bot
#[derive(Parser)]
#[command(name = "ha-bot", about = "Heikin-Ashi reversal trading bot for Bybit")]
struct Cli {
    /// Just test authentication and print balance and positions, then exit.
    #[arg(long)]
    check_auth: bool,

    /// Evaluate signals every cycle but never submit orders.
    #[arg(long)]
    dry_run: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Path to the TOML config file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ha_bot=info,bybit_client=info,strategy=info".into()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("ha-bot starting up...");

    // Load configuration.
    let needs_credentials = cli.check_auth || !cli.dry_run;
    let cfg = match config::load_config(&cli.config, needs_credentials) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let env_label = if cfg.use_testnet { "TESTNET" } else { "MAINNET" };
    info!("Environment: {}", env_label);
    info!(
        "Market: {} {} interval={} candles={} lot={}",
        cfg.market.category,
        cfg.market.symbol,
        cfg.market.interval,
        cfg.market.candle_limit,
        cfg.market.lot_size
    );
    info!(
        "Strategy: sl_buffer={} tp_extra={} seed_override={:?}",
        cfg.strategy.sl_buffer, cfg.strategy.tp_extra, cfg.strategy.seed_override
    );
    info!(
        "Risk: risk={:.2}% cap={:.2}% balance_mode={:?} poll={}s",
        cfg.risk.risk_percent * 100.0,
        cfg.risk.cap_percent * 100.0,
        cfg.balance.mode,
        cfg.timing.poll_interval_secs
    );

    let trades_dir = resolve_trades_dir();
    let journal = match TradeJournal::open(trades_dir) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to initialize trade journal: {}", e);
            std::process::exit(1);
        }
    };
    info!("Trade journal path: {}", journal.dir().display());
    let trade_journal: SharedTradeJournal = Arc::new(Mutex::new(journal));
    write_trade_event(
        &trade_journal,
        json!({
            "ts": now_iso(),
            "kind": "bot_start",
            "bot": journal::BOT_TRADE_DIR,
            "mode": if cli.dry_run { "dry_run" } else { "live" },
            "use_testnet": cfg.use_testnet,
            "symbol": cfg.market.symbol,
            "interval": cfg.market.interval,
            "strategy": {
                "sl_buffer": cfg.strategy.sl_buffer,
                "tp_extra": cfg.strategy.tp_extra,
                "seed_override": cfg.strategy.seed_override
            },
            "risk": {
                "risk_percent": cfg.risk.risk_percent,
                "cap_percent": cfg.risk.cap_percent,
                "lot_size": cfg.market.lot_size
            },
            "state_path": cfg.state.path
        }),
    )
    .await;

    // Initialize auth. Public market data works without it.
    let auth = if cfg.api_key.is_empty() || cfg.api_secret.is_empty() {
        None
    } else {
        match BybitAuth::new(&cfg.api_key, &cfg.api_secret) {
            Ok(a) => Some(a),
            Err(e) => {
                error!("Auth initialization failed: {}", e);
                write_trade_event(
                    &trade_journal,
                    json!({
                        "ts": now_iso(),
                        "kind": "auth_init",
                        "status": "error",
                        "error": e.to_string()
                    }),
                )
                .await;
                std::process::exit(1);
            }
        }
    };

    let rest_client = match BybitRestClient::new(auth, cfg.use_testnet, &cfg.market.category) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build REST client: {}", e);
            std::process::exit(1);
        }
    };
    info!("REST endpoint: {}", rest_client.base_url());

    // ── Check-auth mode ──────────────────────────────────────────────
    if cli.check_auth {
        let ok = check_auth(&rest_client, &cfg, &trade_journal).await;
        std::process::exit(if ok { 0 } else { 1 });
    }

    let engine = StrategyEngine::new(&cfg, FileStateStore::new(&cfg.state.path));
    let balance_provider = balance::from_config(&cfg, &rest_client);
    info!(
        "State file: {} | balance source: {}",
        cfg.state.path,
        balance_provider.label()
    );

    let poll_interval = Duration::from_secs(cfg.timing.poll_interval_secs);
    let ctx = CycleContext {
        cfg,
        market: Box::new(rest_client),
        engine,
        balance: balance_provider,
        journal: trade_journal.clone(),
        dry_run: cli.dry_run,
    };

    // ── Single-cycle mode ────────────────────────────────────────────
    if cli.once {
        run_strategy_cycle(&ctx, 1).await;
        write_trade_event(
            &trade_journal,
            json!({
                "ts": now_iso(),
                "kind": "bot_shutdown",
                "reason": "once"
            }),
        )
        .await;
        info!("Single cycle complete.");
        return;
    }

    let strategy_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cycle_id: u64 = 0;

        loop {
            interval.tick().await;
            cycle_id = cycle_id.saturating_add(1);
            run_strategy_cycle(&ctx, cycle_id).await;
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("ha-bot is running. Press Ctrl+C to stop.");

    let shutdown_reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            "ctrl_c"
        }
        r = strategy_handle => {
            error!("Strategy task exited: {:?}", r);
            "strategy_task_exit"
        }
    };

    write_trade_event(
        &trade_journal,
        json!({
            "ts": now_iso(),
            "kind": "bot_shutdown",
            "reason": shutdown_reason
        }),
    )
    .await;

    info!("ha-bot shut down.");
}

async fn check_auth(client: &BybitRestClient, cfg: &BotConfig, journal: &SharedTradeJournal) -> bool {
    info!("Running auth check...");
    let result = async {
        let balance = client.get_wallet_balance(&cfg.balance.coin).await?;
        let positions = client.get_positions(&cfg.market.symbol).await?;
        Ok::<_, common::Error>((balance, positions))
    }
    .await;

    match result {
        Ok((balance, positions)) => {
            let open: Vec<&Position> = positions.iter().filter(|p| p.size > 0.0).collect();
            info!(
                "Auth successful! {} balance: {} | open positions on {}: {}",
                cfg.balance.coin,
                balance,
                cfg.market.symbol,
                open.len()
            );
            for p in &open {
                info!("  {:?} size={} avg={}", p.side, p.size, p.avg_price);
            }
            write_trade_event(
                journal,
                json!({
                    "ts": now_iso(),
                    "kind": "auth_check",
                    "status": "ok",
                    "balance": balance,
                    "open_positions": open.len()
                }),
            )
            .await;
            true
        }
        Err(e) => {
            error!("Auth check failed: {}", e);
            write_trade_event(
                journal,
                json!({
                    "ts": now_iso(),
                    "kind": "auth_check",
                    "status": "error",
                    "error": e.to_string()
                }),
            )
            .await;
            false
        }
    }
}
