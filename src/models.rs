//! Core market-data and opportunity types shared across connectors,
//! detectors and the API surface.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Venues the connector layer knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Binance,
    BinanceFutures,
    Bybit,
    Okx,
    Upbit,
    Bithumb,
    Gate,
    Bitget,
    Bingx,
    Hyperliquid,
    Synthetix,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::BinanceFutures => "binance_futures",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Upbit => "upbit",
            Venue::Bithumb => "bithumb",
            Venue::Gate => "gate",
            Venue::Bitget => "bitget",
            Venue::Bingx => "bingx",
            Venue::Hyperliquid => "hyperliquid",
            Venue::Synthetix => "synthetix",
        }
    }

    /// KRW-quoted venues on the Korean side of the kimchi trade.
    pub fn is_korean(&self) -> bool {
        matches!(self, Venue::Upbit | Venue::Bithumb)
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    Spot,
    Perp,
    Fx,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::Spot => "spot",
            VenueKind::Perp => "perp",
            VenueKind::Fx => "fx",
        }
    }
}

/// Canonical trading-pair identity after symbol normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
    pub kind: VenueKind,
}

impl Instrument {
    pub fn new(base: impl Into<String>, quote: impl Into<String>, kind: VenueKind) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
            kind,
        }
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

/// Top-of-book quote for one (venue, instrument).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: Venue,
    pub kind: VenueKind,
    pub base: String,
    pub quote: String,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Price to buy at: ask when quoted, otherwise last.
    pub fn buy_price(&self) -> f64 {
        self.ask.unwrap_or(self.last)
    }

    /// Price to sell at: bid when quoted, otherwise last.
    pub fn sell_price(&self) -> f64 {
        self.bid.unwrap_or(self.last)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= max_age
    }
}

/// Perp market state: top of book plus funding and open interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerpMarket {
    pub venue: Venue,
    pub base: String,
    pub quote: String,
    pub last: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Funding as a fraction per native interval, as the venue reports it.
    pub funding_rate: f64,
    /// Native funding interval in hours (8 for most CEXes, 1 for Hyperliquid,
    /// 24 for Synthetix).
    pub funding_interval_hours: f64,
    pub next_funding_time: Option<DateTime<Utc>>,
    pub open_interest_usd: f64,
    pub timestamp: DateTime<Utc>,
}

impl PerpMarket {
    /// Funding normalized to an 8-hour interval; all detectors compare on
    /// this scale.
    pub fn funding_rate_8h(&self) -> f64 {
        if self.funding_interval_hours <= 0.0 {
            return 0.0;
        }
        self.funding_rate * (8.0 / self.funding_interval_hours)
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    pub fn buy_price(&self) -> f64 {
        self.ask.unwrap_or(self.last)
    }

    pub fn sell_price(&self) -> f64 {
        self.bid.unwrap_or(self.last)
    }

    pub fn mid(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => (b + a) / 2.0,
            _ => self.last,
        }
    }

    /// Top-of-book spread in bps; 0 when only last is known.
    pub fn book_spread_bps(&self) -> f64 {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > b => ((a - b) / ((a + b) / 2.0)) * 10_000.0,
            _ => 0.0,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= max_age
    }
}

/// Resolved USD/KRW exchange rate.
#[derive(Debug, Clone, Serialize)]
pub struct FxRate {
    pub krw_per_usd: f64,
    pub source: String,
    /// True when the configured fixed fallback is in effect.
    pub is_fallback: bool,
    pub fetched_at: DateTime<Utc>,
}

impl FxRate {
    pub fn usd_per_krw(&self) -> f64 {
        1.0 / self.krw_per_usd
    }
}

/// Per-(venue, asset) wallet flags. `None` means the venue did not report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalletEntry {
    pub deposit: Option<bool>,
    pub withdraw: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    SpotCross,
    KimchiPremium,
    FundingArb,
    SpotVsPerp,
    PerpPerpSpread,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::SpotCross => "spot_cross",
            OpportunityKind::KimchiPremium => "kimchi_premium",
            OpportunityKind::FundingArb => "funding_arb",
            OpportunityKind::SpotVsPerp => "spot_vs_perp",
            OpportunityKind::PerpPerpSpread => "perp_perp_spread",
        }
    }
}

/// One executable side of an opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub exchange: Venue,
    pub venue_type: VenueKind,
    pub side: Side,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
}

impl OpportunityLeg {
    pub fn signed_notional(&self) -> f64 {
        self.side.sign() * self.price * self.quantity
    }
}

/// Tri-state tradeability verdict from the wallet oracle. `Unknown` goes out
/// on the wire as `null` so clients can render "?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tradeable {
    Yes,
    No,
    Unknown,
}

impl Serialize for Tradeable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tradeable::Yes => serializer.serialize_bool(true),
            Tradeable::No => serializer.serialize_bool(false),
            Tradeable::Unknown => serializer.serialize_none(),
        }
    }
}

/// Per-leg wallet flags attached to kimchi opportunities.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DepositStatus {
    pub buy: Option<bool>,
    pub sell: Option<bool>,
}

/// A detected arbitrage opportunity. Regenerated on every tick, never
/// mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub symbol: String,
    pub spread_bps: f64,
    pub expected_pnl_pct: f64,
    pub notional: f64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub legs: Vec<OpportunityLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeable: Option<Tradeable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_status: Option<DepositStatus>,
}

impl Opportunity {
    /// Content-derived id: identical inputs always hash to the same UUID so
    /// re-running the engine on the same snapshot reproduces the same ids.
    pub fn content_id(kind: OpportunityKind, symbol: &str, legs: &[OpportunityLeg]) -> Uuid {
        let mut name = String::with_capacity(64);
        name.push_str(kind.as_str());
        name.push('|');
        name.push_str(symbol);
        for leg in legs {
            name.push('|');
            name.push_str(leg.exchange.as_str());
            name.push(':');
            name.push_str(match leg.side {
                Side::Buy => "buy",
                Side::Sell => "sell",
            });
            name.push(':');
            name.push_str(&format!("{:.10}:{:.10}", leg.price, leg.quantity));
        }
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    /// Sum of signed leg notionals; near zero for delta-neutral pairs.
    pub fn net_notional(&self) -> f64 {
        self.legs.iter().map(OpportunityLeg::signed_notional).sum()
    }
}

/// Smart price formatting for descriptions: large prices keep 2 decimals,
/// small ones keep enough digits to be meaningful.
pub fn format_price(price: f64) -> String {
    if price >= 1000.0 {
        format!("{price:.2}")
    } else if price >= 1.0 {
        trim_zeros(format!("{price:.5}"))
    } else if price >= 0.01 {
        trim_zeros(format!("{price:.6}"))
    } else {
        trim_zeros(format!("{price:.8}"))
    }
}

fn trim_zeros(s: String) -> String {
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funding_normalizes_to_8h() {
        let mut perp = PerpMarket {
            venue: Venue::Hyperliquid,
            base: "BTC".into(),
            quote: "USDT".into(),
            last: 60_000.0,
            bid: None,
            ask: None,
            funding_rate: 0.0002,
            funding_interval_hours: 1.0,
            next_funding_time: None,
            open_interest_usd: 50_000_000.0,
            timestamp: Utc::now(),
        };
        assert!((perp.funding_rate_8h() - 0.0016).abs() < 1e-12);

        perp.funding_interval_hours = 24.0;
        perp.funding_rate = 0.0003;
        assert!((perp.funding_rate_8h() - 0.0001).abs() < 1e-12);

        perp.funding_interval_hours = 8.0;
        assert!((perp.funding_rate_8h() - perp.funding_rate).abs() < 1e-12);
    }

    #[test]
    fn content_id_is_deterministic() {
        let legs = vec![
            OpportunityLeg {
                exchange: Venue::Binance,
                venue_type: VenueKind::Spot,
                side: Side::Buy,
                symbol: "BTC/USDT".into(),
                price: 60_000.0,
                quantity: 0.1,
            },
            OpportunityLeg {
                exchange: Venue::Okx,
                venue_type: VenueKind::Spot,
                side: Side::Sell,
                symbol: "BTC/USDT".into(),
                price: 60_150.0,
                quantity: 0.1,
            },
        ];
        let a = Opportunity::content_id(OpportunityKind::SpotCross, "BTC/USDT", &legs);
        let b = Opportunity::content_id(OpportunityKind::SpotCross, "BTC/USDT", &legs);
        assert_eq!(a, b);

        let mut other = legs.clone();
        other[0].price = 60_001.0;
        let c = Opportunity::content_id(OpportunityKind::SpotCross, "BTC/USDT", &other);
        assert_ne!(a, c);
    }

    #[test]
    fn tradeable_serializes_tristate() {
        assert_eq!(serde_json::to_string(&Tradeable::Yes).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Tradeable::No).unwrap(), "false");
        assert_eq!(serde_json::to_string(&Tradeable::Unknown).unwrap(), "null");
    }

    #[test]
    fn price_formatting_tracks_magnitude() {
        assert_eq!(format_price(60123.456), "60123.46");
        assert_eq!(format_price(3.25), "3.25");
        assert_eq!(format_price(0.123456), "0.123456");
        assert_eq!(format_price(0.00001234), "0.00001234");
    }
}
