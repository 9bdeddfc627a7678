use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, TickSource, Transport};
use engine::{BinanceBookTickerPoller, BinanceTradeStream, Engine, SourceFactory};
use risk::RiskConfig;
use strategy::SmcFileConfig;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    let file = SmcFileConfig::load(&cfg.params_path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {e}", cfg.params_path));
    info!(
        symbols = ?cfg.symbols,
        transport = ?cfg.transport,
        bias_secs = file.params.bias_timeframe_secs,
        entry_secs = file.params.entry_timeframe_secs,
        "SmcBot starting"
    );

    let risk = RiskConfig {
        risk_amount: cfg.risk_amount,
        instrument: file.instrument,
    };

    // ── Tick sources (injected based on SMC_TRANSPORT) ────────────────────────
    let sources: SourceFactory = match cfg.transport {
        Transport::Stream => Arc::new(|symbol: &str| {
            Box::new(BinanceTradeStream::spawn(symbol)) as Box<dyn TickSource>
        }) as SourceFactory,
        Transport::Poll => {
            let every = Duration::from_millis(cfg.poll_interval_ms);
            Arc::new(move |symbol: &str| match BinanceBookTickerPoller::new(symbol, every) {
                Ok(poller) => Box::new(poller) as Box<dyn TickSource>,
                Err(e) => panic!("Failed to build HTTP client for {symbol}: {e}"),
            }) as SourceFactory
        }
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(cfg.symbols.clone(), file.params, risk, sources);
    let mut snapshots = handle.subscribe();
    tokio::spawn(engine.run());
    handle.send(EngineCommand::Start).await;

    // ── Snapshot observer ─────────────────────────────────────────────────────
    tokio::spawn(async move {
        loop {
            match snapshots.recv().await {
                Ok(snap) => {
                    let decision = snap.last_decision.as_ref().map(|d| d.detail.as_str()).unwrap_or("-");
                    let trade = snap
                        .active_trade
                        .as_ref()
                        .map(|t| format!("{} @ {:.5} pnl {:.2}", t.signal.direction, t.fill_price, t.live_pnl));
                    info!(
                        symbol = %snap.symbol,
                        state = %snap.state,
                        bias_candles = snap.bias_candles.len(),
                        entry_candles = snap.entry_candles.len(),
                        decision = %decision,
                        trade = ?trade,
                        "Snapshot"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Snapshot observer lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.unwrap();
    handle.send(EngineCommand::Stop).await;
    info!("Shutdown signal received. Exiting.");
}
