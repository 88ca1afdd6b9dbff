//! Detection tick driver.
//!
//! Every tick, each eligible connector refreshes concurrently under its own
//! timeout, with a little start jitter to smooth API load. All refreshes
//! for the tick are awaited (or timed out) before the detector runs, so a
//! slow venue delays only its own slice, never the engine. Consecutive
//! failures push a connector onto an exponential backoff schedule capped at
//! five intervals; one success resets it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connectors::Connector;
use crate::engine::OpportunityEngine;
use crate::fx::FxResolver;
use crate::hub::BroadcastHub;
use crate::snapshot::MarketSnapshot;

/// Backoff cap as a multiple of the detect interval.
const MAX_BACKOFF_INTERVALS: u32 = 5;

/// Jitter fraction applied to each connector's start within a tick.
const JITTER_FRACTION: f64 = 0.1;

struct ConnectorState {
    consecutive_failures: u32,
    eligible_at: Instant,
}

pub struct Scheduler {
    cfg: Config,
    connectors: Vec<Arc<dyn Connector>>,
    snapshot: Arc<MarketSnapshot>,
    engine: Arc<OpportunityEngine>,
    fx: Arc<FxResolver>,
    hub: Arc<BroadcastHub>,
}

impl Scheduler {
    pub fn new(
        cfg: Config,
        connectors: Vec<Arc<dyn Connector>>,
        snapshot: Arc<MarketSnapshot>,
        engine: Arc<OpportunityEngine>,
        fx: Arc<FxResolver>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self { cfg, connectors, snapshot, engine, fx, hub }
    }

    pub fn spawn(self) {
        tokio::spawn(async move { self.run().await });
    }

    async fn run(self) {
        info!(
            connectors = self.connectors.len(),
            interval_secs = self.cfg.detect_interval.as_secs_f64(),
            "scheduler started"
        );
        let mut states: Vec<ConnectorState> = self
            .connectors
            .iter()
            .map(|_| ConnectorState { consecutive_failures: 0, eligible_at: Instant::now() })
            .collect();

        let mut ticker = tokio::time::interval(self.cfg.detect_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_tick(&mut states).await;
        }
    }

    async fn run_tick(&self, states: &mut [ConnectorState]) {
        let tick_start = Instant::now();

        let mut handles = Vec::with_capacity(self.connectors.len());
        for (idx, connector) in self.connectors.iter().enumerate() {
            if states[idx].eligible_at > tick_start {
                debug!(venue = connector.venue().as_str(), "connector backing off; skipped");
                continue;
            }
            let connector = connector.clone();
            let snapshot = self.snapshot.clone();
            let jitter = jitter_delay(self.cfg.detect_interval);
            let connector_timeout = self.cfg.connector_timeout;
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(jitter).await;
                let outcome = timeout(connector_timeout, connector.refresh(&snapshot)).await;
                (idx, outcome)
            }));
        }

        for handle in handles {
            let Ok((idx, outcome)) = handle.await else {
                continue;
            };
            let venue = self.connectors[idx].venue();
            match outcome {
                Ok(Ok(())) => {
                    if states[idx].consecutive_failures > 0 {
                        info!(venue = venue.as_str(), "connector recovered");
                    }
                    states[idx].consecutive_failures = 0;
                    states[idx].eligible_at = tick_start;
                }
                Ok(Err(err)) => {
                    self.record_failure(&mut states[idx], venue.as_str(), &err.to_string());
                    if err.is_rate_limited() {
                        warn!(venue = venue.as_str(), "rate limited; backing off");
                    }
                }
                Err(_elapsed) => {
                    self.record_failure(&mut states[idx], venue.as_str(), "refresh timed out");
                }
            }
        }

        let view = self.snapshot.view(
            Utc::now(),
            chrono::Duration::from_std(self.cfg.stale_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
        );
        let fx_rate = self.fx.current();
        let opportunities = self.engine.detect(&view, &fx_rate);
        debug!(
            tickers = view.tickers.len(),
            perps = view.perps.len(),
            opportunities = opportunities.len(),
            elapsed_ms = tick_start.elapsed().as_millis() as u64,
            "tick complete"
        );
        self.hub.publish(opportunities);
    }

    fn record_failure(&self, state: &mut ConnectorState, venue: &str, reason: &str) {
        state.consecutive_failures += 1;
        let backoff = backoff_delay(self.cfg.detect_interval, state.consecutive_failures);
        state.eligible_at = Instant::now() + backoff;
        warn!(
            venue,
            failures = state.consecutive_failures,
            backoff_secs = backoff.as_secs_f64(),
            reason,
            "connector refresh failed"
        );
    }
}

/// Uniform start jitter within ±10% of the tick interval (implemented as a
/// delay in [0, 2 × 10%) of the interval, centered on one jitter fraction).
fn jitter_delay(interval: Duration) -> Duration {
    let max_jitter = interval.as_secs_f64() * JITTER_FRACTION * 2.0;
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max_jitter))
}

/// Exponential backoff: doubles per consecutive failure, capped at five
/// detect intervals.
fn backoff_delay(interval: Duration, consecutive_failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(consecutive_failures.min(8));
    interval.saturating_mul(factor).min(interval.saturating_mul(MAX_BACKOFF_INTERVALS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let interval = Duration::from_secs(3);
        assert_eq!(backoff_delay(interval, 1), Duration::from_secs(6));
        assert_eq!(backoff_delay(interval, 2), Duration::from_secs(12));
        // 2^3 = 8 intervals would exceed the cap of 5.
        assert_eq!(backoff_delay(interval, 3), Duration::from_secs(15));
        assert_eq!(backoff_delay(interval, 30), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_inside_the_window() {
        let interval = Duration::from_secs(3);
        for _ in 0..100 {
            let jitter = jitter_delay(interval);
            assert!(jitter < Duration::from_secs_f64(0.6 + f64::EPSILON));
        }
    }
}
