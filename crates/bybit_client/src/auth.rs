//! HMAC-SHA256 authentication for the Bybit v5 API.
//!
//! Signature format: `hex(HMAC_SHA256(secret, timestamp + api_key + recv_window + payload))`.
//! `payload` is the raw query string for GET and the raw JSON body for POST.

use common::Error;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default receive window in milliseconds.
pub const DEFAULT_RECV_WINDOW_MS: u64 = 5000;

/// Holds API credentials.
#[derive(Clone)]
pub struct BybitAuth {
    pub api_key: String,
    secret: String,
    recv_window_ms: u64,
}

impl std::fmt::Debug for BybitAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitAuth")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

impl BybitAuth {
    pub fn new(api_key: &str, secret: &str) -> Result<Self, Error> {
        let api_key = api_key.trim();
        let secret = secret.trim();
        if api_key.is_empty() || secret.is_empty() {
            return Err(Error::Auth("API key and secret must both be set".into()));
        }

        Ok(Self {
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
        })
    }

    /// Hex signature for `payload` at `timestamp_ms`.
    pub fn sign(&self, timestamp_ms: i64, payload: &str) -> Result<String, Error> {
        let message = format!(
            "{}{}{}{}",
            timestamp_ms, self.api_key, self.recv_window_ms, payload
        );
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Auth(format!("Invalid API secret: {e}")))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build the authenticated header set for a request carrying `payload`.
    pub fn headers(&self, payload: &str) -> Result<HeaderMap, Error> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, payload)?;

        let mut headers = HeaderMap::new();
        headers.insert("X-BAPI-API-KEY", header_value(&self.api_key)?);
        headers.insert("X-BAPI-TIMESTAMP", header_value(&timestamp.to_string())?);
        headers.insert(
            "X-BAPI-RECV-WINDOW",
            header_value(&self.recv_window_ms.to_string())?,
        );
        headers.insert("X-BAPI-SIGN", header_value(&signature)?);
        Ok(headers)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(raw).map_err(|e| Error::Auth(format!("invalid header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        let auth = BybitAuth::new("test-key", "test-secret").unwrap();
        let sig = auth
            .sign(1_700_000_000_000, "category=linear&symbol=ADAUSDT")
            .unwrap();
        assert_eq!(
            sig,
            "b76a76c4eff5fc5b3ff30e04468eb947cf82b36d5312fcef50aa9e461d36228a"
        );
    }

    #[test]
    fn test_payload_changes_signature() {
        let auth = BybitAuth::new("test-key", "test-secret").unwrap();
        let a = auth.sign(1_700_000_000_000, "symbol=ADAUSDT").unwrap();
        let b = auth.sign(1_700_000_000_000, "symbol=XRPUSDT").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_headers_present() {
        let auth = BybitAuth::new("test-key", "test-secret").unwrap();
        let headers = auth.headers("{}").unwrap();
        assert_eq!(headers["X-BAPI-API-KEY"], "test-key");
        assert_eq!(headers["X-BAPI-RECV-WINDOW"], "5000");
        assert!(headers["X-BAPI-TIMESTAMP"]
            .to_str()
            .unwrap()
            .parse::<i64>()
            .is_ok());
        assert_eq!(headers["X-BAPI-SIGN"].len(), 64);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(matches!(BybitAuth::new("", "secret"), Err(Error::Auth(_))));
        assert!(matches!(BybitAuth::new("key", "  "), Err(Error::Auth(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let auth = BybitAuth::new("test-key", "super-secret").unwrap();
        let dbg = format!("{:?}", auth);
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
