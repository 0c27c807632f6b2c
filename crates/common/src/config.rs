//! Bot configuration types.

use serde::{Deserialize, Serialize};

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bybit API key.
    #[serde(default)]
    pub api_key: String,

    /// Bybit API secret used for HMAC signing.
    #[serde(default)]
    pub api_secret: String,

    /// Use testnet (true) or mainnet (false).
    #[serde(default = "default_true")]
    pub use_testnet: bool,

    /// Traded instrument and candle feed.
    #[serde(default)]
    pub market: MarketConfig,

    /// Signal parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Position sizing parameters.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,

    /// Where the account balance comes from.
    #[serde(default)]
    pub balance: BalanceConfig,

    /// Persisted Heikin-Ashi state.
    #[serde(default)]
    pub state: StateConfig,
}

/// Instrument and candle feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Instrument symbol (e.g., "ADAUSDT").
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Bybit product category ("linear", "inverse", "spot").
    #[serde(default = "default_category")]
    pub category: String,

    /// Kline interval as Bybit spells it ("1", "15", "60", "D", ...).
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Number of candles fetched per cycle.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    /// Minimum tradable quantity step. 1.0 means whole units.
    #[serde(default = "default_lot_size")]
    pub lot_size: f64,
}

/// Signal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Absolute price buffer placed beyond the previous candle's extreme.
    #[serde(default = "default_sl_buffer")]
    pub sl_buffer: f64,

    /// Extra take-profit margin as a fraction of the entry price.
    #[serde(default = "default_tp_extra")]
    pub tp_extra: f64,

    /// Manual HA seed, used only on a cold start with no persisted state.
    #[serde(default)]
    pub seed_override: Option<f64>,
}

/// Position sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of balance risked between entry and stop-loss.
    #[serde(default = "default_risk_percent")]
    pub risk_percent: f64,

    /// Max fraction of balance committed to one position.
    #[serde(default = "default_cap_percent")]
    pub cap_percent: f64,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Strategy cycle interval.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Balance source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// Use `test_balance` as-is.
    Fixed,
    /// Query the exchange wallet every cycle.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_balance_mode")]
    pub mode: BalanceMode,

    /// Balance reported in `fixed` mode (quote currency).
    #[serde(default = "default_test_balance")]
    pub test_balance: f64,

    /// Wallet coin queried in `live` mode.
    #[serde(default = "default_coin")]
    pub coin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// JSON file holding the last HA open.
    #[serde(default = "default_state_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "ADAUSDT".into()
}
fn default_category() -> String {
    "linear".into()
}
fn default_interval() -> String {
    "15".into()
}
fn default_candle_limit() -> u32 {
    50
}
fn default_lot_size() -> f64 {
    1.0
}

fn default_sl_buffer() -> f64 {
    0.001
}
fn default_tp_extra() -> f64 {
    0.002
}

fn default_risk_percent() -> f64 {
    0.045
}
fn default_cap_percent() -> f64 {
    0.45
}

fn default_poll_interval() -> u64 {
    60
}

fn default_balance_mode() -> BalanceMode {
    BalanceMode::Live
}
fn default_test_balance() -> f64 {
    5.0
}
fn default_coin() -> String {
    "USDT".into()
}

fn default_state_path() -> String {
    "ha_state.json".into()
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            category: default_category(),
            interval: default_interval(),
            candle_limit: default_candle_limit(),
            lot_size: default_lot_size(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sl_buffer: default_sl_buffer(),
            tp_extra: default_tp_extra(),
            seed_override: None,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percent: default_risk_percent(),
            cap_percent: default_cap_percent(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            mode: default_balance_mode(),
            test_balance: default_test_balance(),
            coin: default_coin(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            use_testnet: true,
            market: MarketConfig::default(),
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            timing: TimingConfig::default(),
            balance: BalanceConfig::default(),
            state: StateConfig::default(),
        }
    }
}
