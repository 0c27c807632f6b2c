//! Order gate: at most one position per side.
//!
//! The gate keeps no memory of its own orders. It re-derives the guard from
//! the account's live positions every cycle.

use common::{Position, Side, SizedOrder};

use crate::signal::Signal;

/// Answers whether a side already carries a positive-size position.
pub trait OpenPositionQuery {
    fn has_open_position(&self, side: Side) -> bool;
}

impl OpenPositionQuery for [Position] {
    fn has_open_position(&self, side: Side) -> bool {
        self.iter().any(|p| p.side == Some(side) && p.size > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSignal,
    ZeroQuantity,
    /// Take-profit at or below zero, which the exchange rejects.
    NonPositiveTarget,
    PositionAlreadyOpen,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoSignal => "no_signal",
            SkipReason::ZeroQuantity => "zero_quantity",
            SkipReason::NonPositiveTarget => "non_positive_target",
            SkipReason::PositionAlreadyOpen => "position_already_open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Place(SizedOrder),
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderGate;

impl OrderGate {
    pub fn admit<Q>(&self, signal: &Signal, quantity: f64, positions: &Q) -> Decision
    where
        Q: OpenPositionQuery + ?Sized,
    {
        let (side, levels) = match signal {
            Signal::None => return Decision::Skip(SkipReason::NoSignal),
            Signal::Buy(levels) => (Side::Buy, levels),
            Signal::Sell(levels) => (Side::Sell, levels),
        };

        if quantity.is_nan() || quantity <= 0.0 {
            return Decision::Skip(SkipReason::ZeroQuantity);
        }

        if levels.take_profit.is_nan() || levels.take_profit <= 0.0 {
            return Decision::Skip(SkipReason::NonPositiveTarget);
        }

        if positions.has_open_position(side) {
            return Decision::Skip(SkipReason::PositionAlreadyOpen);
        }

        Decision::Place(SizedOrder {
            side,
            quantity,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
        })
    }
}
