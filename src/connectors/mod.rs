//! Venue connector layer.
//!
//! Each connector owns one venue's public REST surface and implements the
//! subset of capabilities the venue supports (spot tickers, perp tickers,
//! funding, open interest). `refresh` fetches the venue's slice, normalizes
//! symbols to canonical form and publishes into the market snapshot by
//! replacement. Failures never cross connector boundaries; the scheduler
//! decides retry and backoff from the error kind.

pub mod binance;
pub mod binance_futures;
pub mod bingx;
pub mod bitget;
pub mod bithumb;
pub mod bybit;
pub mod gate;
pub mod hyperliquid;
pub mod okx;
pub mod synthetix;
pub mod upbit;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::models::Venue;
use crate::snapshot::MarketSnapshot;

pub const USER_AGENT: &str = "ArbScan/0.1";

/// Failure taxonomy for one refresh attempt.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Transient transport failure; retried on the next tick.
    #[error("network error: {0}")]
    Network(String),
    /// Structural payload mismatch; the slice is left stale and the error is
    /// logged with the offending endpoint.
    #[error("decode error at {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    /// HTTP 429; the scheduler applies exponential backoff.
    #[error("rate limited")]
    RateLimited,
}

impl ConnectorError {
    pub fn decode(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::Decode { endpoint: endpoint.into(), message: message.into() }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ConnectorError::RateLimited)
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            ConnectorError::RateLimited
        } else if err.is_decode() {
            ConnectorError::decode(
                err.url().map(|u| u.path().to_string()).unwrap_or_default(),
                err.to_string(),
            )
        } else {
            ConnectorError::Network(err.to_string())
        }
    }
}

/// A venue feed adapter. One `refresh` call fetches the venue's whole slice.
#[async_trait]
pub trait Connector: Send + Sync {
    fn venue(&self) -> Venue;

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError>;
}

/// Shared HTTP client with the connector timeout applied per request.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// GET a JSON payload, mapping transport/status/decode failures onto the
/// connector error taxonomy.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ConnectorError> {
    let response = client.get(url).send().await?.error_for_status()?;
    response.json::<T>().await.map_err(ConnectorError::from)
}

/// POST a JSON body and decode the JSON response (DEX-style info endpoints).
pub async fn post_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<T, ConnectorError> {
    let response = client.post(url).json(body).send().await?.error_for_status()?;
    response.json::<T>().await.map_err(ConnectorError::from)
}

/// Restriction of detection to the configured pair universe.
#[derive(Debug, Clone, Default)]
pub struct SymbolUniverse {
    pairs: Vec<(String, String)>,
}

impl SymbolUniverse {
    pub fn from_config(cfg: &Config) -> Self {
        let pairs = cfg
            .trading_symbols
            .iter()
            .filter_map(|s| {
                let (base, quote) = s.split_once('/')?;
                Some((base.to_uppercase(), quote.to_uppercase()))
            })
            .collect();
        Self { pairs }
    }

    /// Empty universe admits every pair.
    pub fn allows(&self, base: &str, quote: &str) -> bool {
        self.pairs.is_empty() || self.pairs.iter().any(|(b, q)| b == base && q == quote)
    }

    /// Same filter ignoring the quote side, for KRW venues where the quote
    /// currency differs from the configured USDT pairs.
    pub fn allows_base(&self, base: &str) -> bool {
        self.pairs.is_empty() || self.pairs.iter().any(|(b, _)| b == base)
    }

}

const KNOWN_QUOTES: &[&str] = &[
    "USDT", "USDC", "FDUSD", "TUSD", "USD", "KRW", "BTC", "ETH", "EUR",
];

/// Canonicalize a venue symbol into (base, quote).
///
/// Handles delimiter styles (`BTC-USDT`, `BTC_USDT`, `BTC/USDT`,
/// `BTC/USDT:USDT`), perp suffixes (`-SWAP`, `-PERP`) and KRW-prefixed
/// Korean markets (`KRW-BTC`). Undelimited symbols are split on a known
/// quote suffix. Returns `None` when no split is possible.
pub fn normalize_symbol(raw: &str) -> Option<(String, String)> {
    let mut s = raw.trim().to_uppercase();
    if s.is_empty() {
        return None;
    }

    // Settlement suffix (`BTC/USDT:USDT`) carries no extra information.
    if let Some(idx) = s.find(':') {
        s.truncate(idx);
    }
    let mut had_perp_suffix = false;
    for suffix in ["-SWAP", "-PERP", "_SWAP", "_PERP"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
            had_perp_suffix = true;
            break;
        }
    }

    // Korean market convention puts the quote first.
    if let Some(base) = s.strip_prefix("KRW-") {
        return (!base.is_empty()).then(|| (base.to_string(), "KRW".to_string()));
    }

    if let Some(idx) = s.find(['-', '_', '/']) {
        let (base, quote) = (&s[..idx], &s[idx + 1..]);
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        return Some((base.to_string(), quote.to_string()));
    }

    for quote in KNOWN_QUOTES {
        if let Some(base) = s.strip_suffix(quote) {
            if !base.is_empty() {
                return Some((base.to_string(), quote.to_string()));
            }
        }
    }

    // `ETH-PERP` style symbols name only the base; the suffix implies a
    // USD-margined contract.
    if had_perp_suffix {
        return Some((s, "USD".to_string()));
    }
    None
}

/// Assemble the enabled connector set from configuration.
pub fn build(cfg: &Config) -> Vec<Arc<dyn Connector>> {
    let universe = SymbolUniverse::from_config(cfg);
    let timeout = cfg.connector_timeout;
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    if cfg.enable_binance {
        connectors.push(Arc::new(binance::BinanceSpot::new(timeout, universe.clone())));
    }
    if cfg.enable_bybit {
        connectors.push(Arc::new(bybit::Bybit::new(timeout, universe.clone())));
    }
    if cfg.enable_okx {
        connectors.push(Arc::new(okx::Okx::new(timeout, universe.clone())));
    }
    if cfg.enable_upbit {
        connectors.push(Arc::new(upbit::Upbit::new(timeout, universe.clone())));
    }
    if cfg.enable_bithumb {
        connectors.push(Arc::new(bithumb::Bithumb::new(timeout, universe.clone())));
    }
    if cfg.enable_gate {
        connectors.push(Arc::new(gate::Gate::new(timeout, universe.clone())));
    }
    if cfg.enable_bitget {
        connectors.push(Arc::new(bitget::Bitget::new(timeout, universe.clone())));
    }
    if cfg.enable_bingx {
        connectors.push(Arc::new(bingx::Bingx::new(timeout, universe.clone())));
    }
    if cfg.enable_binance_futures {
        connectors.push(Arc::new(binance_futures::BinanceFutures::new(
            timeout,
            universe.clone(),
        )));
    }
    if cfg.enable_hyperliquid {
        connectors.push(Arc::new(hyperliquid::Hyperliquid::new(timeout, universe.clone())));
    }
    if cfg.enable_synthetix {
        connectors.push(Arc::new(synthetix::Synthetix::new(timeout, universe)));
    }

    connectors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiters_are_removed() {
        for raw in ["BTC-USDT", "BTC_USDT", "BTC/USDT", "btc/usdt"] {
            assert_eq!(
                normalize_symbol(raw),
                Some(("BTC".to_string(), "USDT".to_string())),
                "failed for {raw}"
            );
        }
    }

    #[test]
    fn perp_suffixes_are_stripped() {
        assert_eq!(
            normalize_symbol("BTC-USDT-SWAP"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(
            normalize_symbol("ETH-PERP"),
            Some(("ETH".to_string(), "USD".to_string()))
        );
        // OKX style settle suffix
        assert_eq!(
            normalize_symbol("BTC/USDT:USDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
    }

    #[test]
    fn krw_prefixed_markets_flip_base_and_quote() {
        assert_eq!(
            normalize_symbol("KRW-BTC"),
            Some(("BTC".to_string(), "KRW".to_string()))
        );
    }

    #[test]
    fn undelimited_symbols_split_on_known_quote() {
        assert_eq!(
            normalize_symbol("BTCUSDT"),
            Some(("BTC".to_string(), "USDT".to_string()))
        );
        assert_eq!(
            normalize_symbol("DOGEKRW"),
            Some(("DOGE".to_string(), "KRW".to_string()))
        );
        assert_eq!(normalize_symbol("GARBAGE"), None);
    }

    #[test]
    fn universe_filter() {
        let mut cfg = Config::default();
        cfg.trading_symbols = vec!["BTC/USDT".into(), "ETH/USDT".into()];
        let universe = SymbolUniverse::from_config(&cfg);
        assert!(universe.allows("BTC", "USDT"));
        assert!(!universe.allows("SOL", "USDT"));
        assert!(universe.allows_base("ETH"));

        let empty = SymbolUniverse::default();
        assert!(empty.allows("ANY", "THING"));
    }
}
