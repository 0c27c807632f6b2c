//! Reversal signal detection over the last two HA candles.

use common::{HaCandle, Side};
use tracing::warn;

use crate::error::CycleError;

/// Entry, stop and target prices of a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    None,
    Buy(SignalLevels),
    Sell(SignalLevels),
}

impl Signal {
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::None => None,
            Signal::Buy(_) => Some(Side::Buy),
            Signal::Sell(_) => Some(Side::Sell),
        }
    }

    pub fn levels(&self) -> Option<&SignalLevels> {
        match self {
            Signal::None => None,
            Signal::Buy(levels) | Signal::Sell(levels) => Some(levels),
        }
    }
}

/// Bearish-to-bullish (or the mirror) HA reversal detector.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    /// Absolute distance beyond the previous candle's extreme.
    pub sl_buffer: f64,
    /// Extra target margin as a fraction of entry.
    pub tp_extra: f64,
}

impl SignalDetector {
    pub fn new(sl_buffer: f64, tp_extra: f64) -> Self {
        Self { sl_buffer, tp_extra }
    }

    /// Classify the last two candles of `ha`.
    ///
    /// Ties on any comparison are not a signal.
    pub fn detect(&self, ha: &[HaCandle]) -> Result<Signal, CycleError> {
        let [.., prev, last] = ha else {
            return Err(CycleError::InsufficientData {
                needed: 2,
                got: ha.len(),
            });
        };

        let buy = last.is_bullish() && prev.is_bearish() && last.low > prev.low;
        let sell = last.is_bearish() && prev.is_bullish() && last.high < prev.high;
        debug_assert!(!(buy && sell), "buy and sell matched on the same candles");

        if buy {
            let entry = last.close;
            let stop_loss = prev.low - self.sl_buffer;
            let take_profit = entry + 2.0 * (entry - stop_loss) + entry * self.tp_extra;
            return Ok(Signal::Buy(SignalLevels {
                entry,
                stop_loss,
                take_profit,
            }));
        }

        if sell {
            let entry = last.close;
            let stop_loss = prev.high + self.sl_buffer;
            let take_profit = entry - 2.0 * (stop_loss - entry) - entry * self.tp_extra;
            if take_profit <= 0.0 {
                warn!(
                    "Sell take-profit {} is not positive (entry={} stop={}); the gate will skip it",
                    take_profit, entry, stop_loss
                );
            }
            return Ok(Signal::Sell(SignalLevels {
                entry,
                stop_loss,
                take_profit,
            }));
        }

        Ok(Signal::None)
    }
}
