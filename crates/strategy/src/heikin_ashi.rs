//! Heikin-Ashi transform.
//!
//! Each HA candle is derived from one raw candle and the previous HA candle:
//!
//! ```text
//! close = (open + high + low + close) / 4          (raw values)
//! open  = seed                                      (first candle)
//!       = (prev_ha_open + prev_ha_close) / 2        (after)
//! high  = max(raw_high, open, close)
//! low   = min(raw_low, open, close)
//! ```
//!
//! The final HA open of every successful pass is persisted and becomes the
//! seed of the next pass.

use common::{HaCandle, RawCandle};
use tracing::{debug, info};

use crate::error::CycleError;
use crate::state::{HaState, StateStore};

/// How to seed the recurrence when nothing has been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeedPolicy {
    /// Operator-supplied HA open.
    Manual(f64),
    /// `(open + close) / 2` of the first raw candle.
    FirstCandleMidpoint,
}

impl SeedPolicy {
    pub fn from_override(seed_override: Option<f64>) -> Self {
        match seed_override {
            Some(v) => SeedPolicy::Manual(v),
            None => SeedPolicy::FirstCandleMidpoint,
        }
    }

    pub fn seed(&self, first: &RawCandle) -> f64 {
        match *self {
            SeedPolicy::Manual(v) => v,
            SeedPolicy::FirstCandleMidpoint => (first.open + first.close) / 2.0,
        }
    }
}

/// Where the seed of a pass came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    Persisted,
    Manual,
    FirstCandleMidpoint,
}

/// Pure HA recurrence over `raw`, starting from `seed`.
pub fn heikin_ashi(raw: &[RawCandle], seed: f64) -> Vec<HaCandle> {
    let mut out: Vec<HaCandle> = Vec::with_capacity(raw.len());

    for candle in raw {
        let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => seed,
        };
        let high = candle.high.max(open).max(close);
        let low = candle.low.min(open).min(close);

        out.push(HaCandle {
            open,
            high,
            low,
            close,
        });
    }

    out
}

fn validate(raw: &[RawCandle]) -> Result<(), CycleError> {
    if raw.is_empty() {
        return Err(CycleError::EmptyInput);
    }
    for (index, candle) in raw.iter().enumerate() {
        if !candle.is_finite() {
            return Err(CycleError::NonFiniteInput { index });
        }
        if index > 0 && candle.open_time <= raw[index - 1].open_time {
            return Err(CycleError::UnorderedInput { index });
        }
    }
    Ok(())
}

/// Stateful transformer: resolves the seed, runs the recurrence and
/// persists the last HA open.
#[derive(Debug)]
pub struct HeikinAshiTransformer<S> {
    store: S,
    policy: SeedPolicy,
}

impl<S: StateStore> HeikinAshiTransformer<S> {
    pub fn new(store: S, policy: SeedPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persisted state wins; the policy only applies on a cold start.
    pub fn resolve_seed(&self, first: &RawCandle) -> (f64, SeedSource) {
        if let Some(state) = self.store.load() {
            return (state.last_ha_open, SeedSource::Persisted);
        }
        let source = match self.policy {
            SeedPolicy::Manual(_) => SeedSource::Manual,
            SeedPolicy::FirstCandleMidpoint => SeedSource::FirstCandleMidpoint,
        };
        (self.policy.seed(first), source)
    }

    /// Transform `raw` (ascending, non-empty) and persist the final HA open.
    ///
    /// Nothing is written when validation or persistence fails.
    pub fn transform(&self, raw: &[RawCandle]) -> Result<Vec<HaCandle>, CycleError> {
        validate(raw)?;

        let (seed, source) = self.resolve_seed(&raw[0]);
        if source == SeedSource::Persisted {
            debug!("HA seed {} (persisted)", seed);
        } else {
            info!("HA cold start: seed {} from {:?}", seed, source);
        }

        let candles = heikin_ashi(raw, seed);

        if let Some(last) = candles.last() {
            self.store
                .save(HaState {
                    last_ha_open: last.open,
                })
                .map_err(CycleError::StatePersist)?;
            debug!(
                "HA pass over {} candles: last open={} close={}",
                candles.len(),
                last.open,
                last.close
            );
        }

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use proptest::prelude::*;

    fn raw(t: i64, o: f64, h: f64, l: f64, c: f64) -> RawCandle {
        RawCandle::new(t, o, h, l, c)
    }

    #[test]
    fn test_recurrence_exact_values() {
        let candles = [raw(0, 1.0, 10.0, 8.0, 9.0), raw(1, 9.0, 12.0, 7.0, 11.0)];
        let ha = heikin_ashi(&candles, 9.5);

        assert_eq!(ha[0].open, 9.5);
        assert_eq!(ha[0].close, 7.0);
        assert_eq!(ha[0].high, 10.0);
        assert_eq!(ha[0].low, 7.0);

        assert_eq!(ha[1].open, 8.25);
        assert_eq!(ha[1].close, 9.75);
        assert_eq!(ha[1].high, 12.0);
        assert_eq!(ha[1].low, 7.0);
    }

    #[test]
    fn test_transform_persists_last_open() {
        let transformer =
            HeikinAshiTransformer::new(MemoryStateStore::new(), SeedPolicy::Manual(9.5));
        let candles = [raw(0, 1.0, 10.0, 8.0, 9.0), raw(1, 9.0, 12.0, 7.0, 11.0)];

        let ha = transformer.transform(&candles).unwrap();
        assert_eq!(ha.len(), 2);
        assert_eq!(
            transformer.store().load(),
            Some(HaState { last_ha_open: 8.25 })
        );
    }

    #[test]
    fn test_manual_override_beats_midpoint_on_cold_start() {
        let first = raw(0, 2.0, 3.0, 1.0, 4.0);
        let manual = HeikinAshiTransformer::new(MemoryStateStore::new(), SeedPolicy::Manual(0.5));
        assert_eq!(manual.resolve_seed(&first), (0.5, SeedSource::Manual));

        let auto = HeikinAshiTransformer::new(
            MemoryStateStore::new(),
            SeedPolicy::FirstCandleMidpoint,
        );
        assert_eq!(auto.resolve_seed(&first), (3.0, SeedSource::FirstCandleMidpoint));
    }

    #[test]
    fn test_override_never_reapplies_once_persisted() {
        let transformer =
            HeikinAshiTransformer::new(MemoryStateStore::new(), SeedPolicy::Manual(100.0));
        let candles = [raw(0, 1.0, 2.0, 0.5, 1.5), raw(1, 1.5, 2.5, 1.0, 2.0)];

        let first_pass = transformer.transform(&candles).unwrap();
        assert_eq!(first_pass[0].open, 100.0);

        let persisted = first_pass[1].open;
        let (seed, source) = transformer.resolve_seed(&candles[0]);
        assert_eq!(source, SeedSource::Persisted);
        assert_eq!(seed, persisted);

        let second_pass = transformer.transform(&candles).unwrap();
        assert_eq!(second_pass[0].open, persisted);
    }

    #[test]
    fn test_empty_input_rejected_without_write() {
        let transformer = HeikinAshiTransformer::new(
            MemoryStateStore::new(),
            SeedPolicy::FirstCandleMidpoint,
        );
        assert!(matches!(
            transformer.transform(&[]),
            Err(CycleError::EmptyInput)
        ));
        assert_eq!(transformer.store().load(), None);
    }

    #[test]
    fn test_unordered_input_rejected_without_write() {
        let transformer = HeikinAshiTransformer::new(
            MemoryStateStore::with_state(HaState { last_ha_open: 1.0 }),
            SeedPolicy::FirstCandleMidpoint,
        );
        let candles = [raw(5, 1.0, 2.0, 0.5, 1.5), raw(3, 1.5, 2.5, 1.0, 2.0)];
        assert!(matches!(
            transformer.transform(&candles),
            Err(CycleError::UnorderedInput { index: 1 })
        ));
        assert_eq!(
            transformer.store().load(),
            Some(HaState { last_ha_open: 1.0 })
        );
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let transformer = HeikinAshiTransformer::new(
            MemoryStateStore::new(),
            SeedPolicy::FirstCandleMidpoint,
        );
        let candles = [raw(0, 1.0, f64::INFINITY, 0.5, 1.5)];
        assert!(matches!(
            transformer.transform(&candles),
            Err(CycleError::NonFiniteInput { index: 0 })
        ));
    }

    #[test]
    fn test_single_candle_transform() {
        let transformer = HeikinAshiTransformer::new(
            MemoryStateStore::new(),
            SeedPolicy::FirstCandleMidpoint,
        );
        let ha = transformer.transform(&[raw(0, 2.0, 3.0, 1.0, 4.0)]).unwrap();
        assert_eq!(ha[0].open, 3.0);
        assert_eq!(ha[0].close, 2.5);
        assert_eq!(ha[0].high, 3.0);
        assert_eq!(ha[0].low, 1.0);
    }

    fn candle_series() -> impl Strategy<Value = Vec<RawCandle>> {
        prop::collection::vec((1.0f64..1000.0, 0.0f64..50.0, 0.0f64..50.0, 0.0f64..1.0), 1..40)
            .prop_map(|rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (open, up, down, frac))| {
                        let high = open + up;
                        let low = (open - down).max(0.01);
                        let close = low + (high - low) * frac;
                        RawCandle::new(i as i64 * 60_000, open, high, low, close)
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn prop_transform_is_deterministic(candles in candle_series(), seed in 0.01f64..1000.0) {
            let a = HeikinAshiTransformer::new(
                MemoryStateStore::with_state(HaState { last_ha_open: seed }),
                SeedPolicy::FirstCandleMidpoint,
            );
            let b = HeikinAshiTransformer::new(
                MemoryStateStore::with_state(HaState { last_ha_open: seed }),
                SeedPolicy::Manual(-1.0),
            );

            let out_a = a.transform(&candles).unwrap();
            let out_b = b.transform(&candles).unwrap();
            prop_assert_eq!(&out_a, &out_b);
            prop_assert_eq!(a.store().load(), b.store().load());
        }

        #[test]
        fn prop_ha_bounds_hold(candles in candle_series(), seed in 0.01f64..1000.0) {
            let ha = heikin_ashi(&candles, seed);
            prop_assert_eq!(ha.len(), candles.len());
            for (h, r) in ha.iter().zip(&candles) {
                prop_assert!(h.high >= h.open && h.high >= h.close && h.high >= r.high);
                prop_assert!(h.low <= h.open && h.low <= h.close && h.low <= r.low);
            }
        }
    }
}
