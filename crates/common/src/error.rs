//! Unified error type for the ha-bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Bybit API error (status={status}, retCode={code}): {message}")]
    ExchangeApi {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Malformed exchange data: {0}")]
    MalformedData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of the network collaborator. The polling loop
    /// abandons the cycle on these and tries again next interval.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::ExchangeApi { .. }
                | Error::RateLimited { .. }
                | Error::MalformedData(_)
        )
    }
}
