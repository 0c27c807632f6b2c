//! Where the sizing balance comes from each cycle.

use async_trait::async_trait;
use bybit_client::BybitRestClient;
use common::config::{BalanceMode, BotConfig};
use common::Error;
use tracing::warn;

#[async_trait]
pub trait BalanceProvider: Send + Sync {
    /// Balance in quote currency, never negative.
    async fn balance(&self) -> Result<f64, Error>;

    fn label(&self) -> &'static str;
}

/// Constant balance for testing against small notional amounts.
#[derive(Debug, Clone, Copy)]
pub struct FixedBalance(pub f64);

#[async_trait]
impl BalanceProvider for FixedBalance {
    async fn balance(&self) -> Result<f64, Error> {
        Ok(clamp_balance(self.0))
    }

    fn label(&self) -> &'static str {
        "fixed"
    }
}

/// Wallet balance of one coin, queried from the exchange.
#[derive(Debug, Clone)]
pub struct LiveBalance {
    client: BybitRestClient,
    coin: String,
}

impl LiveBalance {
    pub fn new(client: BybitRestClient, coin: impl Into<String>) -> Self {
        Self {
            client,
            coin: coin.into(),
        }
    }
}

#[async_trait]
impl BalanceProvider for LiveBalance {
    async fn balance(&self) -> Result<f64, Error> {
        let raw = self.client.get_wallet_balance(&self.coin).await?;
        if !raw.is_finite() {
            return Err(Error::MalformedData(format!(
                "non-finite {} balance: {}",
                self.coin, raw
            )));
        }
        Ok(clamp_balance(raw))
    }

    fn label(&self) -> &'static str {
        "live"
    }
}

fn clamp_balance(raw: f64) -> f64 {
    if raw < 0.0 {
        warn!("Negative balance {} treated as 0", raw);
        0.0
    } else {
        raw
    }
}

pub fn from_config(config: &BotConfig, client: &BybitRestClient) -> Box<dyn BalanceProvider> {
    match config.balance.mode {
        BalanceMode::Fixed => Box::new(FixedBalance(config.balance.test_balance)),
        BalanceMode::Live => Box::new(LiveBalance::new(client.clone(), config.balance.coin.clone())),
    }
}
