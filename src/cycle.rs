//! One polling cycle: fetch, run the strategy engine, submit, journal.
//!
//! Every failure ends the cycle with a journal entry; none of them stop the
//! polling loop.

use common::config::BotConfig;
use common::{Position, RawCandle};
use serde_json::json;
use strategy::{CycleError, Decision, FileStateStore, Signal, StrategyEngine};
use tracing::{debug, error, info, warn};

use crate::balance::BalanceProvider;
use crate::journal::{now_iso, write_trade_event, SharedTradeJournal};
use crate::market::MarketGateway;

/// Everything a strategy cycle needs, owned by the strategy task.
pub struct CycleContext {
    pub cfg: BotConfig,
    pub market: Box<dyn MarketGateway>,
    pub engine: StrategyEngine<FileStateStore>,
    pub balance: Box<dyn BalanceProvider>,
    pub journal: SharedTradeJournal,
    pub dry_run: bool,
}

async fn fetch_market_state(
    ctx: &CycleContext,
) -> Result<(Vec<RawCandle>, f64, Vec<Position>), common::Error> {
    let market = &ctx.cfg.market;
    let candles = ctx
        .market
        .klines(&market.symbol, &market.interval, market.candle_limit)
        .await?;
    let balance = ctx.balance.balance().await?;
    let positions = if ctx.market.has_credentials() {
        ctx.market.positions(&market.symbol).await?
    } else {
        debug!("No credentials; treating account as flat");
        Vec::new()
    };
    Ok((candles, balance, positions))
}

pub async fn run_strategy_cycle(ctx: &CycleContext, cycle_id: u64) {
    info!("Running strategy cycle {}...", cycle_id);
    let symbol = ctx.cfg.market.symbol.as_str();

    let (candles, balance, positions) = match fetch_market_state(ctx).await {
        Ok(state) => state,
        Err(e) => {
            warn!("Failed to fetch market state: {}", e);
            write_trade_event(
                &ctx.journal,
                json!({
                    "ts": now_iso(),
                    "kind": "strategy_cycle_error",
                    "cycle_id": cycle_id,
                    "stage": "fetch",
                    "transport": e.is_transport(),
                    "error": e.to_string()
                }),
            )
            .await;
            return;
        }
    };

    write_trade_event(
        &ctx.journal,
        json!({
            "ts": now_iso(),
            "kind": "strategy_cycle_start",
            "cycle_id": cycle_id,
            "symbol": symbol,
            "candles": candles.len(),
            "balance": balance,
            "positions": positions.len()
        }),
    )
    .await;

    let outcome = match ctx.engine.run_cycle(&candles, balance, positions.as_slice()) {
        Ok(o) => o,
        Err(e) => {
            match &e {
                CycleError::InsufficientData { .. } => warn!("Skipping cycle {}: {}", cycle_id, e),
                _ => error!("Strategy cycle {} failed: {}", cycle_id, e),
            }
            write_trade_event(
                &ctx.journal,
                json!({
                    "ts": now_iso(),
                    "kind": "strategy_cycle_error",
                    "cycle_id": cycle_id,
                    "stage": "strategy",
                    "error": e.to_string()
                }),
            )
            .await;
            return;
        }
    };

    let ha = outcome.last_candle;
    write_trade_event(
        &ctx.journal,
        json!({
            "ts": now_iso(),
            "kind": "ha_snapshot",
            "cycle_id": cycle_id,
            "open": ha.open,
            "high": ha.high,
            "low": ha.low,
            "close": ha.close
        }),
    )
    .await;

    if let (Some(side), Some(levels)) = (outcome.signal.side(), outcome.signal.levels()) {
        write_trade_event(
            &ctx.journal,
            json!({
                "ts": now_iso(),
                "kind": "signal",
                "cycle_id": cycle_id,
                "side": side.as_str(),
                "entry": levels.entry,
                "stop_loss": levels.stop_loss,
                "take_profit": levels.take_profit,
                "quantity": outcome.quantity
            }),
        )
        .await;
    }

    let order = match outcome.decision {
        Decision::Skip(reason) => {
            info!(
                "CYCLE {} SUMMARY: signal={} qty={} decision=skip({}) ha_close={}",
                cycle_id,
                signal_label(&outcome.signal),
                outcome.quantity,
                reason.as_str(),
                ha.close
            );
            write_trade_event(
                &ctx.journal,
                json!({
                    "ts": now_iso(),
                    "kind": "decision",
                    "cycle_id": cycle_id,
                    "decision": "skip",
                    "reason": reason.as_str()
                }),
            )
            .await;
            return;
        }
        Decision::Place(order) => order,
    };

    info!(
        "CYCLE {} SUMMARY: signal={} qty={} decision=place sl={} tp={}",
        cycle_id,
        signal_label(&outcome.signal),
        order.quantity,
        order.stop_loss,
        order.take_profit
    );
    write_trade_event(
        &ctx.journal,
        json!({
            "ts": now_iso(),
            "kind": "decision",
            "cycle_id": cycle_id,
            "decision": "place",
            "side": order.side.as_str(),
            "quantity": order.quantity,
            "dry_run": ctx.dry_run
        }),
    )
    .await;

    if ctx.dry_run {
        info!("[DRY RUN] Would place {} {} {}", order.side, order.quantity, symbol);
        return;
    }

    match ctx
        .market
        .place_order(symbol, &order, ctx.cfg.market.lot_size)
        .await
    {
        Ok(ack) => {
            info!(
                "Order placed: {} {} {} id={} link={}",
                order.side, order.quantity, symbol, ack.order_id, ack.order_link_id
            );
            write_trade_event(
                &ctx.journal,
                json!({
                    "ts": now_iso(),
                    "kind": "order_placed",
                    "cycle_id": cycle_id,
                    "symbol": symbol,
                    "side": order.side.as_str(),
                    "quantity": order.quantity,
                    "stop_loss": order.stop_loss,
                    "take_profit": order.take_profit,
                    "order_id": ack.order_id,
                    "order_link_id": ack.order_link_id
                }),
            )
            .await;
        }
        Err(e) => {
            // No retry: the next cycle re-derives the signal from fresh data.
            error!("Order failed for {}: {}", symbol, e);
            write_trade_event(
                &ctx.journal,
                json!({
                    "ts": now_iso(),
                    "kind": "order_failed",
                    "cycle_id": cycle_id,
                    "symbol": symbol,
                    "side": order.side.as_str(),
                    "quantity": order.quantity,
                    "error": e.to_string()
                }),
            )
            .await;
        }
    }
}

fn signal_label(signal: &Signal) -> &'static str {
    match signal {
        Signal::None => "none",
        Signal::Buy(_) => "buy",
        Signal::Sell(_) => "sell",
    }
}
