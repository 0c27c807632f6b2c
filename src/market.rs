//! Exchange operations the polling loop depends on.

use async_trait::async_trait;
use bybit_client::BybitRestClient;
use common::{Error, OrderAck, Position, RawCandle, SizedOrder};

#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Most recent `limit` candles, oldest first.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<RawCandle>, Error>;

    async fn positions(&self, symbol: &str) -> Result<Vec<Position>, Error>;

    async fn place_order(
        &self,
        symbol: &str,
        order: &SizedOrder,
        lot_size: f64,
    ) -> Result<OrderAck, Error>;

    /// Without credentials only public market data is reachable.
    fn has_credentials(&self) -> bool;
}

#[async_trait]
impl MarketGateway for BybitRestClient {
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<RawCandle>, Error> {
        self.get_klines(symbol, interval, limit).await
    }

    async fn positions(&self, symbol: &str) -> Result<Vec<Position>, Error> {
        self.get_positions(symbol).await
    }

    async fn place_order(
        &self,
        symbol: &str,
        order: &SizedOrder,
        lot_size: f64,
    ) -> Result<OrderAck, Error> {
        self.create_order(symbol, order, lot_size).await
    }

    fn has_credentials(&self) -> bool {
        BybitRestClient::has_credentials(self)
    }
}
