//! Fused in-memory market view.
//!
//! The snapshot is the only shared mutable state in the process. Connectors
//! publish their slice by whole-venue replacement under a write lock;
//! detectors take one consistent cloned view per tick so every detector in a
//! tick sees identical data. A failing connector leaves its old slice in
//! place until `stale_ttl` ages it out of the view.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};

#[derive(Default)]
struct Inner {
    tickers: HashMap<Venue, Vec<Ticker>>,
    perps: HashMap<Venue, Vec<PerpMarket>>,
}

#[derive(Default)]
pub struct MarketSnapshot {
    inner: RwLock<Inner>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the spot/ticker slice for one venue.
    pub fn publish_tickers(&self, venue: Venue, tickers: Vec<Ticker>) {
        self.inner.write().tickers.insert(venue, tickers);
    }

    /// Replace the perp slice for one venue.
    pub fn publish_perps(&self, venue: Venue, perps: Vec<PerpMarket>) {
        self.inner.write().perps.insert(venue, perps);
    }

    /// Consistent read view for one detection tick. Entries older than
    /// `stale_ttl` are dropped so dead slices cannot feed detectors.
    pub fn view(&self, now: DateTime<Utc>, stale_ttl: Duration) -> SnapshotView {
        let inner = self.inner.read();
        let tickers = inner
            .tickers
            .values()
            .flatten()
            .filter(|t| now.signed_duration_since(t.timestamp) <= stale_ttl)
            .cloned()
            .collect();
        let perps = inner
            .perps
            .values()
            .flatten()
            .filter(|p| now.signed_duration_since(p.timestamp) <= stale_ttl)
            .cloned()
            .collect();
        SnapshotView { tickers, perps, taken_at: now }
    }
}

/// Immutable per-tick view handed to the detectors.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    pub tickers: Vec<Ticker>,
    pub perps: Vec<PerpMarket>,
    pub taken_at: DateTime<Utc>,
}

impl SnapshotView {
    pub fn ticker(&self, venue: Venue, kind: VenueKind, base: &str, quote: &str) -> Option<&Ticker> {
        self.tickers
            .iter()
            .find(|t| t.venue == venue && t.kind == kind && t.base == base && t.quote == quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(venue: Venue, base: &str, last: f64, age_secs: i64) -> Ticker {
        Ticker {
            venue,
            kind: VenueKind::Spot,
            base: base.into(),
            quote: "USDT".into(),
            last,
            bid: None,
            ask: None,
            timestamp: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn publish_replaces_only_that_venue() {
        let snap = MarketSnapshot::new();
        snap.publish_tickers(Venue::Binance, vec![ticker(Venue::Binance, "BTC", 60_000.0, 0)]);
        snap.publish_tickers(Venue::Okx, vec![ticker(Venue::Okx, "BTC", 60_100.0, 0)]);

        // Re-publishing binance with a different set must not touch okx.
        snap.publish_tickers(Venue::Binance, vec![ticker(Venue::Binance, "ETH", 3_000.0, 0)]);

        let view = snap.view(Utc::now(), Duration::seconds(30));
        assert_eq!(view.tickers.len(), 2);
        assert!(view.ticker(Venue::Okx, VenueKind::Spot, "BTC", "USDT").is_some());
        assert!(view.ticker(Venue::Binance, VenueKind::Spot, "BTC", "USDT").is_none());
        assert!(view.ticker(Venue::Binance, VenueKind::Spot, "ETH", "USDT").is_some());
    }

    #[test]
    fn view_drops_entries_past_stale_ttl() {
        let snap = MarketSnapshot::new();
        snap.publish_tickers(
            Venue::Bithumb,
            vec![ticker(Venue::Bithumb, "BTC", 88_000_000.0, 60)],
        );
        let view = snap.view(Utc::now(), Duration::seconds(30));
        assert!(view.tickers.is_empty());
    }
}
