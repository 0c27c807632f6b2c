//! Bybit v5 API client library.
//!
//! Provides signed REST access to the endpoints the bot needs: klines,
//! wallet balance, positions and order creation.

pub mod auth;
pub mod rate_limit;
pub mod rest;

pub use auth::BybitAuth;
pub use rate_limit::RateLimiter;
pub use rest::BybitRestClient;
