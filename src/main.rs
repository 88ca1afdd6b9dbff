//! ArbScan - real-time cross-venue arbitrage opportunity detector.
//!
//! Wires the pieces together: connectors per venue toggle, the market
//! snapshot, fx and wallet refreshers, the detection scheduler, and the
//! axum HTTP/WebSocket surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arbscan_backend::api::{create_router, AppState};
use arbscan_backend::config::Config;
use arbscan_backend::connectors;
use arbscan_backend::engine::OpportunityEngine;
use arbscan_backend::fx::{spawn_fx_refresher, FxResolver};
use arbscan_backend::hub::BroadcastHub;
use arbscan_backend::scheduler::Scheduler;
use arbscan_backend::snapshot::MarketSnapshot;
use arbscan_backend::wallet::{spawn_wallet_refresher, WalletOracle};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Configuration parse failure is the only fatal startup error.
    let cfg = Config::from_env().context("invalid configuration")?;

    info!("🚀 ArbScan starting");
    info!(
        symbols = cfg.trading_symbols.len(),
        detect_interval_secs = cfg.detect_interval.as_secs_f64(),
        "configuration loaded"
    );

    let snapshot = Arc::new(MarketSnapshot::new());
    let fx = Arc::new(FxResolver::new(&cfg, snapshot.clone()));
    let wallet = Arc::new(WalletOracle::new(&cfg));
    let hub = Arc::new(BroadcastHub::new(&cfg));
    let engine = Arc::new(OpportunityEngine::new(cfg.clone(), wallet.clone()));

    let connectors = connectors::build(&cfg);
    info!(count = connectors.len(), "🔌 venue connectors enabled");

    spawn_fx_refresher(fx.clone(), cfg.fx_refresh_interval);
    spawn_wallet_refresher(wallet.clone());
    Scheduler::new(
        cfg.clone(),
        connectors,
        snapshot.clone(),
        engine,
        fx.clone(),
        hub.clone(),
    )
    .spawn();

    let state = AppState { cfg: Arc::new(cfg.clone()), hub, fx };
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🎯 API server listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbscan_backend=info,arbscan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
