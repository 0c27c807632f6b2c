//! Domain types shared by the exchange client, the strategy core and the bot.

use serde::{Deserialize, Serialize};

/// Order / position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire label used by the exchange ("Buy" / "Sell").
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Parse the exchange label. Empty or unknown labels mean "no side",
    /// which is how the exchange reports a flat position slot.
    pub fn from_wire(raw: &str) -> Option<Side> {
        match raw {
            "Buy" => Some(Side::Buy),
            "Sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exchange-reported price interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    /// Interval start, milliseconds since the Unix epoch.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl RawCandle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// A smoothed Heikin-Ashi candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HaCandle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HaCandle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Snapshot of one open position slot on the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// `None` when the exchange reports an empty slot.
    pub side: Option<Side>,
    pub size: f64,
    pub avg_price: f64,
}

/// Order handed to the exchange after it passed the order gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizedOrder {
    pub side: Side,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Acknowledgement returned by the exchange for a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub order_link_id: String,
}
