//! Application configuration loaded from environment variables.
//!
//! Every knob has a compiled default so the detector runs out of the box;
//! `.env` is honored via dotenv. Config parse failure is the only fatal
//! startup error.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::allocator::{AllocAction, CurvePoint};

/// Runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    // Per-venue toggles
    pub enable_binance: bool,
    pub enable_bybit: bool,
    pub enable_okx: bool,
    pub enable_upbit: bool,
    pub enable_bithumb: bool,
    pub enable_gate: bool,
    pub enable_bitget: bool,
    pub enable_bingx: bool,
    pub enable_binance_futures: bool,
    pub enable_hyperliquid: bool,
    pub enable_synthetix: bool,

    /// Base/quote pairs to watch (e.g. "BTC/USDT"); empty means no filter.
    pub trading_symbols: Vec<String>,

    // Cadence
    pub detect_interval: Duration,
    pub connector_timeout: Duration,
    pub subscriber_write_timeout: Duration,
    pub fx_refresh_interval: Duration,

    // Freshness windows
    pub max_ticker_age: Duration,
    pub stale_ttl: Duration,
    pub last_good_ttl: Duration,
    pub alert_ttl: Duration,

    // Detection gates
    pub max_opportunities: usize,
    pub min_oi_usd: f64,
    pub min_funding_8h_pct: f64,
    pub min_basis_bps: f64,
    pub min_spread_bps: f64,
    pub min_kimchi_pct: f64,
    pub max_kimchi_abs_pct: f64,
    pub min_kimchi_allocation_pct: f64,
    pub max_combined_spread_bps: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,

    // Sizing
    pub base_notional_usd: f64,
    pub tether_total_equity_usd: f64,
    pub allocation_curve: Vec<CurvePoint>,

    pub fx_fallback_krw_per_usd: f64,

    // Optional read-only credentials (wallet status on venues that need them)
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            enable_binance: true,
            enable_bybit: true,
            enable_okx: true,
            enable_upbit: true,
            enable_bithumb: true,
            enable_gate: true,
            enable_bitget: true,
            enable_bingx: false,
            enable_binance_futures: true,
            enable_hyperliquid: true,
            enable_synthetix: false,
            trading_symbols: default_symbols(),
            detect_interval: Duration::from_secs(3),
            connector_timeout: Duration::from_secs(5),
            subscriber_write_timeout: Duration::from_secs(2),
            fx_refresh_interval: Duration::from_secs(60),
            max_ticker_age: Duration::from_secs(10),
            stale_ttl: Duration::from_secs(30),
            last_good_ttl: Duration::from_secs(30),
            alert_ttl: Duration::from_secs(60),
            max_opportunities: 200,
            min_oi_usd: 100_000.0,
            min_funding_8h_pct: 0.01,
            min_basis_bps: 10.0,
            min_spread_bps: 5.0,
            min_kimchi_pct: 0.3,
            max_kimchi_abs_pct: 50.0,
            min_kimchi_allocation_pct: 0.0,
            max_combined_spread_bps: 20.0,
            fee_bps: 10.0,
            slippage_bps: 0.0,
            base_notional_usd: 10_000.0,
            tether_total_equity_usd: 100_000.0,
            allocation_curve: default_allocation_curve(),
            fx_fallback_krw_per_usd: 1450.0,
            binance_api_key: None,
            binance_api_secret: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut cfg = Config::default();

        cfg.port = env_parse("PORT", cfg.port)?;

        cfg.enable_binance = env_flag("ENABLE_BINANCE", cfg.enable_binance);
        cfg.enable_bybit = env_flag("ENABLE_BYBIT", cfg.enable_bybit);
        cfg.enable_okx = env_flag("ENABLE_OKX", cfg.enable_okx);
        cfg.enable_upbit = env_flag("ENABLE_UPBIT", cfg.enable_upbit);
        cfg.enable_bithumb = env_flag("ENABLE_BITHUMB", cfg.enable_bithumb);
        cfg.enable_gate = env_flag("ENABLE_GATE", cfg.enable_gate);
        cfg.enable_bitget = env_flag("ENABLE_BITGET", cfg.enable_bitget);
        cfg.enable_bingx = env_flag("ENABLE_BINGX", cfg.enable_bingx);
        cfg.enable_binance_futures = env_flag("ENABLE_BINANCE_FUTURES", cfg.enable_binance_futures);
        cfg.enable_hyperliquid = env_flag("ENABLE_HYPERLIQUID", cfg.enable_hyperliquid);
        cfg.enable_synthetix = env_flag("ENABLE_SYNTHETIX", cfg.enable_synthetix);

        if let Ok(raw) = env::var("TRADING_SYMBOLS") {
            cfg.trading_symbols = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        cfg.detect_interval = env_secs("DETECT_INTERVAL_SECS", cfg.detect_interval)?;
        cfg.connector_timeout = env_secs("CONNECTOR_TIMEOUT_SECS", cfg.connector_timeout)?;
        cfg.subscriber_write_timeout =
            env_secs("SUBSCRIBER_WRITE_TIMEOUT_SECS", cfg.subscriber_write_timeout)?;
        cfg.fx_refresh_interval = env_secs("FX_REFRESH_INTERVAL_SECS", cfg.fx_refresh_interval)?;
        cfg.max_ticker_age = env_secs("MAX_TICKER_AGE_SECS", cfg.max_ticker_age)?;
        cfg.stale_ttl = env_secs("STALE_TTL_SECS", cfg.stale_ttl)?;
        cfg.last_good_ttl = env_secs("LAST_GOOD_TTL_SECS", cfg.last_good_ttl)?;
        cfg.alert_ttl = env_secs("ALERT_TTL_SECS", cfg.alert_ttl)?;

        cfg.max_opportunities = env_parse("MAX_OPPORTUNITIES", cfg.max_opportunities)?;
        cfg.min_oi_usd = env_parse("MIN_OI_USD", cfg.min_oi_usd)?;
        cfg.min_funding_8h_pct = env_parse("MIN_FUNDING_8H_PCT", cfg.min_funding_8h_pct)?;
        cfg.min_basis_bps = env_parse("MIN_BASIS_BPS", cfg.min_basis_bps)?;
        cfg.min_spread_bps = env_parse("MIN_SPREAD_BPS", cfg.min_spread_bps)?;
        cfg.min_kimchi_pct = env_parse("MIN_KIMCHI_PCT", cfg.min_kimchi_pct)?;
        cfg.max_kimchi_abs_pct = env_parse("MAX_KIMCHI_ABS_PCT", cfg.max_kimchi_abs_pct)?;
        cfg.min_kimchi_allocation_pct =
            env_parse("MIN_KIMCHI_ALLOCATION_PCT", cfg.min_kimchi_allocation_pct)?;
        cfg.max_combined_spread_bps =
            env_parse("MAX_COMBINED_SPREAD_BPS", cfg.max_combined_spread_bps)?;
        cfg.fee_bps = env_parse("FEE_BPS", cfg.fee_bps)?;
        cfg.slippage_bps = env_parse("SLIPPAGE_BPS", cfg.slippage_bps)?;

        cfg.base_notional_usd = env_parse("BASE_NOTIONAL_USD", cfg.base_notional_usd)?;
        cfg.tether_total_equity_usd =
            env_parse("TETHER_TOTAL_EQUITY_USD", cfg.tether_total_equity_usd)?;
        if let Ok(raw) = env::var("ALLOCATION_CURVE") {
            cfg.allocation_curve = serde_json::from_str(&raw)
                .context("ALLOCATION_CURVE must be a JSON list of curve breakpoints")?;
            cfg.allocation_curve
                .sort_by(|a, b| a.premium_pct.total_cmp(&b.premium_pct));
        }

        cfg.fx_fallback_krw_per_usd =
            env_parse("FX_FALLBACK_KRW_PER_USD", cfg.fx_fallback_krw_per_usd)?;

        cfg.binance_api_key = env::var("BINANCE_API_KEY").ok().filter(|v| !v.is_empty());
        cfg.binance_api_secret = env::var("BINANCE_API_SECRET").ok().filter(|v| !v.is_empty());

        Ok(cfg)
    }

    /// True when `base/quote` is inside the configured universe (empty list
    /// admits everything).
    pub fn symbol_enabled(&self, base: &str, quote: &str) -> bool {
        if self.trading_symbols.is_empty() {
            return true;
        }
        let pair = format!("{}/{}", base.to_uppercase(), quote.to_uppercase());
        self.trading_symbols.iter().any(|s| s == &pair)
    }

}

fn default_symbols() -> Vec<String> {
    [
        "BTC/USDT", "ETH/USDT", "XRP/USDT", "SOL/USDT", "DOGE/USDT", "ADA/USDT", "LINK/USDT",
        "AVAX/USDT", "DOT/USDT", "TRX/USDT", "SUI/USDT", "APT/USDT", "ARB/USDT", "OP/USDT",
        "ATOM/USDT", "NEAR/USDT", "SEI/USDT", "TIA/USDT", "INJ/USDT", "WLD/USDT",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_allocation_curve() -> Vec<CurvePoint> {
    vec![
        CurvePoint { premium_pct: -5.0, allocation_pct: 100.0, action: AllocAction::BuyKrw },
        CurvePoint { premium_pct: -2.0, allocation_pct: 70.0, action: AllocAction::BuyKrw },
        CurvePoint { premium_pct: -1.0, allocation_pct: 50.0, action: AllocAction::BuyKrw },
        CurvePoint { premium_pct: 0.0, allocation_pct: 20.0, action: AllocAction::Flat },
        CurvePoint { premium_pct: 1.0, allocation_pct: 5.0, action: AllocAction::SellKrw },
        CurvePoint { premium_pct: 3.0, allocation_pct: 0.0, action: AllocAction::SellKrw },
    ]
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    let secs = env_parse(key, default.as_secs_f64())?;
    if secs <= 0.0 {
        anyhow::bail!("{key} must be positive");
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.detect_interval, Duration::from_secs(3));
        assert_eq!(cfg.max_opportunities, 200);
        assert!(cfg.allocation_curve.windows(2).all(|w| w[0].premium_pct <= w[1].premium_pct));
    }

    #[test]
    fn symbol_filter_admits_all_when_empty() {
        let mut cfg = Config::default();
        cfg.trading_symbols.clear();
        assert!(cfg.symbol_enabled("PEPE", "USDT"));

        cfg.trading_symbols = vec!["BTC/USDT".into()];
        assert!(cfg.symbol_enabled("btc", "usdt"));
        assert!(!cfg.symbol_enabled("ETH", "USDT"));
    }

    #[test]
    fn curve_json_round_trips() {
        let raw = r#"[
            {"premium_pct": 0.0, "allocation_pct": 0.0, "action": "flat"},
            {"premium_pct": 2.0, "allocation_pct": 25.0, "action": "sell_krw"}
        ]"#;
        let curve: Vec<CurvePoint> = serde_json::from_str(raw).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[1].action, AllocAction::SellKrw);
    }
}
