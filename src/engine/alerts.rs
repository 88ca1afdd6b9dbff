//! Alert transition tracking layered on top of the broadcast hub.
//!
//! An alert is keyed by `(kind, symbol, sign(spread))`: it OPENs when the
//! spread first clears its threshold (i.e. the opportunity appears in a
//! tick) and CLOSEs when it drops back out. Repeat sightings in the same
//! state emit nothing. An alert that never closes expires after the TTL and
//! starts a fresh cycle; a sign flip closes the old direction and opens the
//! new one.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Opportunity, OpportunityKind};

type Key = (OpportunityKind, String, i8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Opened,
    Closed,
    Expired,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Opened => "opened",
            AlertKind::Closed => "closed",
            AlertKind::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub opportunity_kind: OpportunityKind,
    pub symbol: String,
    pub direction: i8,
    pub spread_bps: f64,
    pub at: DateTime<Utc>,
}

pub struct AlertTracker {
    ttl: Duration,
    open: HashMap<Key, DateTime<Utc>>,
}

impl AlertTracker {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(60)),
            open: HashMap::new(),
        }
    }

    /// Feed one tick's opportunity list and collect state transitions.
    pub fn on_tick(&mut self, opportunities: &[Opportunity], now: DateTime<Utc>) -> Vec<AlertEvent> {
        // Strongest spread per key this tick.
        let mut current: HashMap<Key, f64> = HashMap::new();
        for opp in opportunities {
            let key = (opp.kind, opp.symbol.clone(), sign(opp.spread_bps));
            let entry = current.entry(key).or_insert(opp.spread_bps);
            if opp.spread_bps.abs() > entry.abs() {
                *entry = opp.spread_bps;
            }
        }

        let mut events = Vec::new();

        for (key, spread_bps) in &current {
            match self.open.get(key).copied() {
                None => {
                    self.open.insert(key.clone(), now);
                    events.push(make_event(AlertKind::Opened, key, *spread_bps, now));
                }
                Some(opened_at) => {
                    if now.signed_duration_since(opened_at) > self.ttl {
                        self.open.insert(key.clone(), now);
                        events.push(make_event(AlertKind::Expired, key, *spread_bps, now));
                    }
                }
            }
        }

        let closed: Vec<Key> =
            self.open.keys().filter(|k| !current.contains_key(*k)).cloned().collect();
        for key in closed {
            self.open.remove(&key);
            events.push(make_event(AlertKind::Closed, &key, 0.0, now));
        }

        events
    }
}

fn make_event(kind: AlertKind, key: &Key, spread_bps: f64, at: DateTime<Utc>) -> AlertEvent {
    AlertEvent {
        kind,
        opportunity_kind: key.0,
        symbol: key.1.clone(),
        direction: key.2,
        spread_bps,
        at,
    }
}

fn sign(spread_bps: f64) -> i8 {
    if spread_bps < 0.0 {
        -1
    } else {
        1
    }
}
