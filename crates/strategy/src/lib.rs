//! Strategy core.
//!
//! Heikin-Ashi transform with persisted seed, reversal signal detection,
//! risk-bounded sizing and the open-position order gate.

pub mod engine;
pub mod error;
pub mod gate;
pub mod heikin_ashi;
pub mod signal;
pub mod sizing;
pub mod state;

pub use engine::{CycleOutcome, StrategyEngine, MIN_RAW_CANDLES};
pub use error::CycleError;
pub use gate::{Decision, OpenPositionQuery, OrderGate, SkipReason};
pub use heikin_ashi::{heikin_ashi, HeikinAshiTransformer, SeedPolicy, SeedSource};
pub use signal::{Signal, SignalDetector, SignalLevels};
pub use sizing::RiskSizer;
pub use state::{FileStateStore, HaState, MemoryStateStore, StateStore};
