//! Errors raised by the strategy core.
//!
//! Expected conditions (no signal, zero quantity, open position) are not
//! errors; they come back as a `CycleOutcome`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("insufficient data: need at least {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("empty candle sequence")]
    EmptyInput,

    #[error("candles not in ascending open-time order at index {index}")]
    UnorderedInput { index: usize },

    #[error("non-finite price in candle at index {index}")]
    NonFiniteInput { index: usize },

    #[error("failed to persist HA state: {0}")]
    StatePersist(#[source] common::Error),
}
