//! Broadcast hub.
//!
//! Fans each completed detection tick out to WebSocket subscribers over
//! bounded per-subscriber queues and keeps the last good list for the HTTP
//! snapshot. A subscriber whose queue is full is disconnected instead of
//! back-pressuring the detector. The alert tracker rides on top of the
//! publish path so OPEN/CLOSED transitions are derived from exactly the
//! frames subscribers see.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::alerts::{AlertEvent, AlertTracker};
use crate::models::Opportunity;

/// Frames a subscriber may lag behind before being cut loose.
pub const SUBSCRIBER_BUFFER: usize = 16;

/// Alert transitions kept for the monitoring surface.
const RECENT_ALERTS: usize = 128;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<String>,
}

struct LastGood {
    opportunities: Arc<Vec<Opportunity>>,
    frame: String,
    at: DateTime<Utc>,
}

pub struct BroadcastHub {
    subscribers: Mutex<Vec<Subscriber>>,
    last_good: RwLock<Option<LastGood>>,
    alerts: Mutex<AlertTracker>,
    recent_alerts: Mutex<VecDeque<AlertEvent>>,
    last_good_ttl: Duration,
    next_id: AtomicU64,
}

/// Handle returned to a WebSocket session.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<String>,
}

impl BroadcastHub {
    pub fn new(cfg: &Config) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            last_good: RwLock::new(None),
            alerts: Mutex::new(AlertTracker::new(cfg.alert_ttl)),
            recent_alerts: Mutex::new(VecDeque::with_capacity(RECENT_ALERTS)),
            last_good_ttl: Duration::from_std(cfg.last_good_ttl)
                .unwrap_or_else(|_| Duration::seconds(30)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber. The current list is queued immediately so a
    /// fresh client is never empty until the next tick.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Some(last) = self.last_good.read().as_ref() {
            let _ = tx.try_send(last.frame.clone());
        }
        self.subscribers.lock().push(Subscriber { id, tx });
        debug!(subscriber = id, "websocket subscriber registered");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Publish one tick's detection result: run the alert tracker, retain
    /// the list for HTTP pulls and push one frame per subscriber.
    pub fn publish(&self, opportunities: Vec<Opportunity>) {
        let now = Utc::now();

        let events = self.alerts.lock().on_tick(&opportunities, now);
        if !events.is_empty() {
            let mut recent = self.recent_alerts.lock();
            for event in events {
                info!(
                    transition = event.kind.as_str(),
                    kind = event.opportunity_kind.as_str(),
                    symbol = %event.symbol,
                    direction = event.direction,
                    spread_bps = event.spread_bps,
                    "spread alert"
                );
                if recent.len() == RECENT_ALERTS {
                    recent.pop_front();
                }
                recent.push_back(event);
            }
        }

        let frame = match serde_json::to_string(&opportunities) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to serialize opportunity frame");
                return;
            }
        };

        if !opportunities.is_empty() {
            *self.last_good.write() = Some(LastGood {
                opportunities: Arc::new(opportunities),
                frame: frame.clone(),
                at: now,
            });
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| match sub.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber = sub.id, "subscriber queue full; disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Most recent list for HTTP pulls. Returns an empty list with the
    /// stale flag set once the last good data ages past the TTL.
    pub fn snapshot(&self) -> (Arc<Vec<Opportunity>>, bool) {
        let guard = self.last_good.read();
        match guard.as_ref() {
            Some(last) if Utc::now().signed_duration_since(last.at) <= self.last_good_ttl => {
                (last.opportunities.clone(), false)
            }
            _ => (Arc::new(Vec::new()), true),
        }
    }

    /// Latest serialized frame, for WebSocket heartbeats.
    pub fn latest_frame(&self) -> Option<String> {
        self.last_good.read().as_ref().map(|l| l.frame.clone())
    }

    pub fn recent_alerts(&self) -> Vec<AlertEvent> {
        self.recent_alerts.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpportunityKind, OpportunityLeg, Side, Venue, VenueKind};

    fn opp(symbol: &str, spread_bps: f64) -> Opportunity {
        let legs = vec![
            OpportunityLeg {
                exchange: Venue::Binance,
                venue_type: VenueKind::Spot,
                side: Side::Buy,
                symbol: symbol.to_string(),
                price: 100.0,
                quantity: 1.0,
            },
            OpportunityLeg {
                exchange: Venue::Okx,
                venue_type: VenueKind::Spot,
                side: Side::Sell,
                symbol: symbol.to_string(),
                price: 100.0,
                quantity: 1.0,
            },
        ];
        Opportunity {
            id: Opportunity::content_id(OpportunityKind::SpotCross, symbol, &legs),
            kind: OpportunityKind::SpotCross,
            symbol: symbol.to_string(),
            spread_bps,
            expected_pnl_pct: 0.1,
            notional: 1000.0,
            timestamp: Utc::now(),
            description: String::new(),
            legs,
            metadata: None,
            tradeable: None,
            deposit_status: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_frames() {
        let hub = BroadcastHub::new(&Config::default());
        let mut sub = hub.subscribe();
        hub.publish(vec![opp("BTC/USDT", 25.0)]);

        let frame = sub.rx.recv().await.unwrap();
        assert!(frame.contains("BTC/USDT"));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_and_others_continue() {
        let hub = BroadcastHub::new(&Config::default());
        let _slow = hub.subscribe(); // never drained
        let mut healthy = hub.subscribe();

        for _ in 0..=SUBSCRIBER_BUFFER {
            hub.publish(vec![opp("BTC/USDT", 25.0)]);
            // Keep the healthy subscriber drained.
            while healthy.rx.try_recv().is_ok() {}
        }

        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(vec![opp("ETH/USDT", 30.0)]);
        let frame = healthy.rx.recv().await.unwrap();
        assert!(frame.contains("ETH/USDT"));
    }

    #[tokio::test]
    async fn new_subscriber_gets_last_good_immediately() {
        let hub = BroadcastHub::new(&Config::default());
        hub.publish(vec![opp("BTC/USDT", 25.0)]);

        let mut sub = hub.subscribe();
        let frame = sub.rx.try_recv().unwrap();
        assert!(frame.contains("BTC/USDT"));
    }

    #[test]
    fn empty_ticks_keep_last_good_within_ttl() {
        let hub = BroadcastHub::new(&Config::default());
        hub.publish(vec![opp("BTC/USDT", 25.0)]);
        hub.publish(vec![]);

        let (list, stale) = hub.snapshot();
        assert!(!stale);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn snapshot_goes_stale_past_ttl() {
        let mut cfg = Config::default();
        cfg.last_good_ttl = std::time::Duration::from_secs(0);
        let hub = BroadcastHub::new(&cfg);
        hub.publish(vec![opp("BTC/USDT", 25.0)]);

        std::thread::sleep(std::time::Duration::from_millis(5));
        let (list, stale) = hub.snapshot();
        assert!(stale);
        assert!(list.is_empty());
    }

    #[test]
    fn publish_records_alert_transitions() {
        let hub = BroadcastHub::new(&Config::default());
        hub.publish(vec![opp("BTC/USDT", 25.0)]);
        hub.publish(vec![]);

        let alerts = hub.recent_alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, crate::engine::alerts::AlertKind::Opened);
        assert_eq!(alerts[1].kind, crate::engine::alerts::AlertKind::Closed);
    }
}
