//! One strategy cycle: transform, detect, size, gate.
//!
//! The engine performs no I/O besides the state store. Candles, balance and
//! positions are fetched by the caller, and the returned decision is
//! submitted by the caller.

use common::config::BotConfig;
use common::{HaCandle, RawCandle};
use tracing::{debug, info};

use crate::error::CycleError;
use crate::gate::{Decision, OpenPositionQuery, OrderGate};
use crate::heikin_ashi::{HeikinAshiTransformer, SeedPolicy};
use crate::signal::{Signal, SignalDetector};
use crate::sizing::RiskSizer;
use crate::state::StateStore;

/// Raw candles required before a cycle touches any state.
pub const MIN_RAW_CANDLES: usize = 3;

/// Result of a cycle that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    /// Most recent HA candle.
    pub last_candle: HaCandle,
    pub signal: Signal,
    /// Sized quantity; 0 when there is no signal.
    pub quantity: f64,
    pub decision: Decision,
}

pub struct StrategyEngine<S> {
    transformer: HeikinAshiTransformer<S>,
    detector: SignalDetector,
    sizer: RiskSizer,
    gate: OrderGate,
}

impl<S: StateStore> StrategyEngine<S> {
    pub fn new(config: &BotConfig, store: S) -> Self {
        let policy = SeedPolicy::from_override(config.strategy.seed_override);
        Self {
            transformer: HeikinAshiTransformer::new(store, policy),
            detector: SignalDetector::new(config.strategy.sl_buffer, config.strategy.tp_extra),
            sizer: RiskSizer::new(
                config.risk.risk_percent,
                config.risk.cap_percent,
                config.market.lot_size,
            ),
            gate: OrderGate,
        }
    }

    pub fn store(&self) -> &S {
        self.transformer.store()
    }

    /// Run one cycle over `candles` (ascending).
    ///
    /// Fails without touching state when fewer than [`MIN_RAW_CANDLES`]
    /// candles are supplied or the input is malformed.
    pub fn run_cycle<Q>(
        &self,
        candles: &[RawCandle],
        balance: f64,
        positions: &Q,
    ) -> Result<CycleOutcome, CycleError>
    where
        Q: OpenPositionQuery + ?Sized,
    {
        if candles.len() < MIN_RAW_CANDLES {
            return Err(CycleError::InsufficientData {
                needed: MIN_RAW_CANDLES,
                got: candles.len(),
            });
        }

        let ha = self.transformer.transform(candles)?;
        let signal = self.detector.detect(&ha)?;
        let Some(&last_candle) = ha.last() else {
            return Err(CycleError::EmptyInput);
        };

        let quantity = match signal.levels() {
            Some(levels) => {
                info!(
                    "SIGNAL: {:?} entry={} sl={} tp={}",
                    signal.side(),
                    levels.entry,
                    levels.stop_loss,
                    levels.take_profit
                );
                self.sizer.size(balance, levels.entry, levels.stop_loss)
            }
            None => {
                debug!(
                    "No signal: last HA o={} h={} l={} c={}",
                    last_candle.open, last_candle.high, last_candle.low, last_candle.close
                );
                0.0
            }
        };

        let decision = self.gate.admit(&signal, quantity, positions);

        Ok(CycleOutcome {
            last_candle,
            signal,
            quantity,
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::SkipReason;
    use crate::heikin_ashi::heikin_ashi;
    use crate::state::{FileStateStore, HaState, MemoryStateStore};
    use common::{Position, Side};

    fn config() -> BotConfig {
        let mut cfg = BotConfig::default();
        cfg.strategy.sl_buffer = 0.001;
        cfg.strategy.tp_extra = 0.002;
        cfg.risk.risk_percent = 0.045;
        cfg.risk.cap_percent = 0.45;
        cfg.market.lot_size = 1.0;
        cfg
    }

    /// Bearish, bearish, bullish with a higher low when seeded at 10.0.
    fn reversal_candles() -> Vec<RawCandle> {
        vec![
            RawCandle::new(0, 10.0, 10.5, 9.0, 9.5),
            RawCandle::new(60_000, 9.5, 9.6, 8.8, 9.0),
            RawCandle::new(120_000, 9.2, 10.4, 9.0, 10.2),
        ]
    }

    fn flat() -> Vec<Position> {
        Vec::new()
    }

    #[test]
    fn test_buy_cycle_places_order() {
        let engine = StrategyEngine::new(
            &config(),
            MemoryStateStore::with_state(HaState { last_ha_open: 10.0 }),
        );
        let candles = reversal_candles();
        let expected = heikin_ashi(&candles, 10.0);

        let outcome = engine.run_cycle(&candles, 1000.0, flat().as_slice()).unwrap();

        let Signal::Buy(levels) = outcome.signal else {
            panic!("expected buy, got {:?}", outcome.signal);
        };
        assert_eq!(levels.entry, expected[2].close);
        assert_eq!(levels.stop_loss, expected[1].low - 0.001);
        assert_eq!(levels.stop_loss, 8.8 - 0.001);
        assert_eq!(outcome.last_candle, expected[2]);

        // 45 / 0.901 ≈ 49.9 units, notional above the 450 cap -> 450 / 9.7 ≈ 46.4
        assert_eq!(outcome.quantity, 46.0);
        assert_eq!(
            outcome.decision,
            Decision::Place(common::SizedOrder {
                side: Side::Buy,
                quantity: 46.0,
                stop_loss: levels.stop_loss,
                take_profit: levels.take_profit,
            })
        );

        assert_eq!(
            engine.store().load(),
            Some(HaState {
                last_ha_open: expected[2].open
            })
        );
    }

    #[test]
    fn test_open_position_blocks_order() {
        let engine = StrategyEngine::new(
            &config(),
            MemoryStateStore::with_state(HaState { last_ha_open: 10.0 }),
        );
        let positions = vec![Position {
            symbol: "ADAUSDT".into(),
            side: Some(Side::Buy),
            size: 46.0,
            avg_price: 9.7,
        }];

        let outcome = engine
            .run_cycle(&reversal_candles(), 1000.0, positions.as_slice())
            .unwrap();
        assert!(matches!(outcome.signal, Signal::Buy(_)));
        assert_eq!(
            outcome.decision,
            Decision::Skip(SkipReason::PositionAlreadyOpen)
        );
    }

    #[test]
    fn test_zero_balance_skips_with_zero_quantity() {
        let engine = StrategyEngine::new(
            &config(),
            MemoryStateStore::with_state(HaState { last_ha_open: 10.0 }),
        );
        let outcome = engine
            .run_cycle(&reversal_candles(), 0.0, flat().as_slice())
            .unwrap();
        assert_eq!(outcome.quantity, 0.0);
        assert_eq!(outcome.decision, Decision::Skip(SkipReason::ZeroQuantity));
    }

    #[test]
    fn test_insufficient_data_leaves_state_untouched() {
        let engine = StrategyEngine::new(&config(), MemoryStateStore::new());
        let candles = &reversal_candles()[..2];

        let err = engine.run_cycle(candles, 1000.0, flat().as_slice()).unwrap_err();
        assert!(matches!(
            err,
            CycleError::InsufficientData { needed: 3, got: 2 }
        ));
        assert_eq!(engine.store().load(), None);
    }

    #[test]
    fn test_no_signal_still_advances_state() {
        let engine = StrategyEngine::new(&config(), MemoryStateStore::new());
        let candles = vec![
            RawCandle::new(0, 1.0, 1.2, 0.9, 1.1),
            RawCandle::new(1, 1.1, 1.3, 1.0, 1.2),
            RawCandle::new(2, 1.2, 1.4, 1.1, 1.3),
        ];

        let outcome = engine.run_cycle(&candles, 1000.0, flat().as_slice()).unwrap();
        assert_eq!(outcome.signal, Signal::None);
        assert_eq!(outcome.quantity, 0.0);
        assert_eq!(outcome.decision, Decision::Skip(SkipReason::NoSignal));

        let expected = heikin_ashi(&candles, (1.0 + 1.1) / 2.0);
        assert_eq!(
            engine.store().load(),
            Some(HaState {
                last_ha_open: expected[2].open
            })
        );
    }

    #[test]
    fn test_seed_override_applies_once_across_cycles() {
        let mut cfg = config();
        cfg.strategy.seed_override = Some(10.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ha_state.json");
        let candles = reversal_candles();

        let first = StrategyEngine::new(&cfg, FileStateStore::new(&path));
        first.run_cycle(&candles, 1000.0, flat().as_slice()).unwrap();
        let after_first = heikin_ashi(&candles, 10.0)[2].open;
        assert_eq!(
            first.store().load(),
            Some(HaState {
                last_ha_open: after_first
            })
        );

        // Restart: a fresh engine over the same file must continue from the
        // persisted open, not the override.
        let second = StrategyEngine::new(&cfg, FileStateStore::new(&path));
        let outcome = second.run_cycle(&candles, 1000.0, flat().as_slice()).unwrap();
        let continued = heikin_ashi(&candles, after_first);
        assert_eq!(outcome.last_candle, continued[2]);
        assert_eq!(
            second.store().load(),
            Some(HaState {
                last_ha_open: continued[2].open
            })
        );
    }
}
