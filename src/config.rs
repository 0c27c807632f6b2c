//! Configuration loader: merges env vars, .env file, and config.toml.

use common::config::{BalanceMode, BotConfig};
use common::Error;
use std::path::Path;

fn parse_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number")))?;
    if !parsed.is_finite() {
        return Err(Error::Config(format!("{env_name} must be finite")));
    }
    Ok(parsed)
}

fn parse_non_negative_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = parse_f64(raw, env_name)?;
    if parsed < 0.0 {
        return Err(Error::Config(format!("{env_name} must be a number >= 0")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &BotConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.market.symbol.trim().is_empty() {
        issues.push("market.symbol must not be empty".into());
    }
    if !matches!(config.market.category.as_str(), "linear" | "inverse" | "spot") {
        issues.push("market.category must be one of: linear, inverse, spot".into());
    }
    if config.market.interval.trim().is_empty() {
        issues.push("market.interval must not be empty".into());
    }
    if (config.market.candle_limit as usize) < strategy::MIN_RAW_CANDLES
        || config.market.candle_limit > 1000
    {
        issues.push(format!(
            "market.candle_limit must be in [{}, 1000]",
            strategy::MIN_RAW_CANDLES
        ));
    }
    if !(config.market.lot_size.is_finite() && config.market.lot_size > 0.0) {
        issues.push("market.lot_size must be > 0".into());
    }

    if !(config.strategy.sl_buffer.is_finite() && config.strategy.sl_buffer >= 0.0) {
        issues.push("strategy.sl_buffer must be >= 0".into());
    }
    if !(config.strategy.tp_extra.is_finite() && config.strategy.tp_extra >= 0.0) {
        issues.push("strategy.tp_extra must be >= 0".into());
    }
    if let Some(seed) = config.strategy.seed_override {
        if !seed.is_finite() {
            issues.push("strategy.seed_override must be finite".into());
        }
    }

    if !(config.risk.risk_percent > 0.0 && config.risk.risk_percent <= 1.0) {
        issues.push("risk.risk_percent must be in (0,1]".into());
    }
    if !(config.risk.cap_percent > 0.0 && config.risk.cap_percent <= 1.0) {
        issues.push("risk.cap_percent must be in (0,1]".into());
    }

    if config.timing.poll_interval_secs == 0 {
        issues.push("timing.poll_interval_secs must be > 0".into());
    }

    if !(config.balance.test_balance.is_finite() && config.balance.test_balance >= 0.0) {
        issues.push("balance.test_balance must be >= 0".into());
    }
    if config.balance.mode == BalanceMode::Live && config.balance.coin.trim().is_empty() {
        issues.push("balance.coin must not be empty in live mode".into());
    }

    if config.state.path.trim().is_empty() {
        issues.push("state.path must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides using `lookup` for variable access.
fn apply_env_overrides<F>(config: &mut BotConfig, lookup: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("BYBIT_API_KEY") {
        config.api_key = key;
    }
    if let Some(secret) = lookup("BYBIT_API_SECRET") {
        config.api_secret = secret;
    }
    if let Some(raw) = lookup("USE_TESTNET") {
        config.use_testnet = parse_bool(&raw);
    }
    if let Some(raw) = lookup("HA_SYMBOL") {
        config.market.symbol = raw.trim().to_ascii_uppercase();
    }
    if let Some(raw) = lookup("HA_INTERVAL") {
        config.market.interval = raw.trim().to_string();
    }
    if let Some(raw) = lookup("HA_LOT_SIZE") {
        config.market.lot_size = parse_non_negative_f64(&raw, "HA_LOT_SIZE")?;
    }
    if let Some(raw) = lookup("HA_RISK_PERCENT") {
        config.risk.risk_percent = parse_non_negative_f64(&raw, "HA_RISK_PERCENT")?;
    }
    if let Some(raw) = lookup("HA_CAP_PERCENT") {
        config.risk.cap_percent = parse_non_negative_f64(&raw, "HA_CAP_PERCENT")?;
    }
    if let Some(raw) = lookup("HA_SL_BUFFER") {
        config.strategy.sl_buffer = parse_non_negative_f64(&raw, "HA_SL_BUFFER")?;
    }
    if let Some(raw) = lookup("HA_TP_EXTRA") {
        config.strategy.tp_extra = parse_non_negative_f64(&raw, "HA_TP_EXTRA")?;
    }
    if let Some(raw) = lookup("HA_SEED_OVERRIDE") {
        let trimmed = raw.trim();
        config.strategy.seed_override = if trimmed.is_empty() {
            None
        } else {
            Some(parse_f64(trimmed, "HA_SEED_OVERRIDE")?)
        };
    }
    if let Some(raw) = lookup("HA_POLL_INTERVAL_SECS") {
        config.timing.poll_interval_secs = parse_positive_u64(&raw, "HA_POLL_INTERVAL_SECS")?;
    }
    if let Some(raw) = lookup("HA_TEST_BALANCE") {
        config.balance.test_balance = parse_non_negative_f64(&raw, "HA_TEST_BALANCE")?;
    }
    if let Some(raw) = lookup("HA_BALANCE_MODE") {
        config.balance.mode = match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" | "test" => BalanceMode::Fixed,
            "live" => BalanceMode::Live,
            _ => {
                return Err(Error::Config(
                    "HA_BALANCE_MODE must be one of: fixed, live".into(),
                ));
            }
        };
    }
    if let Some(raw) = lookup("HA_STATE_PATH") {
        config.state.path = raw.trim().to_string();
    }

    Ok(())
}

/// Parse a config file body. Missing sections fall back to defaults.
fn parse_config_file(contents: &str) -> Result<BotConfig, Error> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
}

/// Load bot configuration from environment and optional config file.
///
/// Credentials are only required when `needs_credentials` is set (live
/// order submission or a live balance).
pub fn load_config(config_path: &Path, needs_credentials: bool) -> Result<BotConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced by the config file if present.
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        parse_config_file(&contents)?
    } else {
        tracing::debug!("No config file at {}", config_path.display());
        BotConfig::default()
    };

    // 3. Environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    // 4. Validate.
    let needs_credentials = needs_credentials || config.balance.mode == BalanceMode::Live;
    if needs_credentials && (config.api_key.is_empty() || config.api_secret.is_empty()) {
        return Err(Error::Config(
            "BYBIT_API_KEY and BYBIT_API_SECRET are required (set in .env or environment)".into(),
        ));
    }

    validate_config(&config)?;

    Ok(config)
}
