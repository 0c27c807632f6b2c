//! Risk-bounded position sizing.

use tracing::{debug, warn};

/// Sizes orders from balance, risk budget and capital cap.
#[derive(Debug, Clone)]
pub struct RiskSizer {
    /// Fraction of balance lost if the stop is hit.
    pub risk_percent: f64,
    /// Max fraction of balance committed to the position.
    pub cap_percent: f64,
    /// Quantity step; results are rounded to the nearest multiple.
    pub lot_size: f64,
}

impl RiskSizer {
    pub fn new(risk_percent: f64, cap_percent: f64, lot_size: f64) -> Self {
        Self {
            risk_percent,
            cap_percent,
            lot_size,
        }
    }

    /// Quantity for an entry at `entry` with its stop at `stop_loss`.
    ///
    /// Returns 0 for a zero risk distance and for any non-finite or
    /// non-positive input. Never negative.
    pub fn size(&self, balance: f64, entry: f64, stop_loss: f64) -> f64 {
        let inputs = [balance, entry, stop_loss, self.risk_percent, self.cap_percent, self.lot_size];
        if inputs.iter().any(|v| !v.is_finite()) || balance <= 0.0 || entry <= 0.0 || self.lot_size <= 0.0 {
            debug!(
                "Sizing skipped: balance={} entry={} stop={} lot={}",
                balance, entry, stop_loss, self.lot_size
            );
            return 0.0;
        }

        let risk_distance = (entry - stop_loss).abs();
        if risk_distance == 0.0 {
            warn!("Zero risk distance at entry {}, quantity forced to 0", entry);
            return 0.0;
        }

        let risk_capital = balance * self.risk_percent;
        let mut quantity = risk_capital / risk_distance;

        let capital_cap = balance * self.cap_percent;
        if quantity * entry > capital_cap {
            debug!(
                "Capping quantity {:.4} (notional {:.4}) to cap {:.4}",
                quantity,
                quantity * entry,
                capital_cap
            );
            quantity = capital_cap / entry;
        }

        let rounded = (quantity / self.lot_size).round() * self.lot_size;
        debug!(
            "Sized: risk_capital={:.4} distance={} raw={:.4} rounded={}",
            risk_capital, risk_distance, quantity, rounded
        );

        rounded.max(0.0)
    }
}
