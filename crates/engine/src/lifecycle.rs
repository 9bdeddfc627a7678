use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use common::{EngineCommand, EngineState, TickSource};
use risk::RiskConfig;
use strategy::SmcParams;

use crate::instrument::{InstrumentEngine, InstrumentEvent, InstrumentSnapshot};

/// Builds a fresh tick source for a symbol each time the engine starts.
pub type SourceFactory = Arc<dyn Fn(&str) -> Box<dyn TickSource> + Send + Sync>;

type Snapshots = Arc<RwLock<HashMap<String, InstrumentSnapshot>>>;

/// Cloneable handle for controlling the engine and observing instruments.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    snapshot_tx: broadcast::Sender<InstrumentSnapshot>,
    latest: Snapshots,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to snapshots published after every tick that changed something.
    pub fn subscribe(&self) -> broadcast::Receiver<InstrumentSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Most recent snapshot of `symbol`, if it has published one.
    pub async fn snapshot(&self, symbol: &str) -> Option<InstrumentSnapshot> {
        self.latest.read().await.get(symbol).cloned()
    }
}

/// The runtime: one task per instrument, driven by [`EngineCommand`]s.
///
/// Start builds a fresh [`InstrumentEngine`] and tick source per symbol;
/// Stop aborts the tasks and waits for them to end, discarding all
/// per-instrument state before the state reads Stopped.
pub struct Engine {
    symbols: Vec<String>,
    params: SmcParams,
    risk: RiskConfig,
    sources: SourceFactory,
    state: Arc<RwLock<EngineState>>,
    snapshot_tx: broadcast::Sender<InstrumentSnapshot>,
    latest: Snapshots,
    command_rx: mpsc::Receiver<EngineCommand>,
    #[allow(dead_code)] // kept to prevent channel close
    command_tx: mpsc::Sender<EngineCommand>,
}

impl Engine {
    pub fn new(
        symbols: Vec<String>,
        params: SmcParams,
        risk: RiskConfig,
        sources: SourceFactory,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (snapshot_tx, _) = broadcast::channel(1024);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let latest: Snapshots = Arc::new(RwLock::new(HashMap::new()));

        let handle = EngineHandle {
            command_tx: command_tx.clone(),
            state: state.clone(),
            snapshot_tx: snapshot_tx.clone(),
            latest: latest.clone(),
        };

        let engine = Engine {
            symbols,
            params,
            risk,
            sources,
            state,
            snapshot_tx,
            latest,
            command_rx,
            command_tx,
        };

        (engine, handle)
    }

    /// Run the command loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Engine initialized in Stopped state. Waiting for Start command.");

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        loop {
            match self.command_rx.recv().await {
                Some(EngineCommand::Start) => {
                    let current = *self.state.read().await;
                    if current != EngineState::Stopped {
                        info!(state = %current, "Engine already started");
                        continue;
                    }

                    info!(symbols = ?self.symbols, "Starting instruments");
                    *self.state.write().await = EngineState::Running;

                    for symbol in &self.symbols {
                        let instrument = match InstrumentEngine::new(symbol.clone(), self.params.clone(), self.risk) {
                            Ok(instrument) => instrument,
                            Err(e) => {
                                error!(symbol = %symbol, error = %e, "Cannot build instrument engine");
                                continue;
                            }
                        };
                        let source = (self.sources)(symbol);
                        tasks.push(tokio::spawn(drive(
                            source,
                            instrument,
                            self.state.clone(),
                            self.snapshot_tx.clone(),
                            self.latest.clone(),
                        )));
                    }
                }

                Some(EngineCommand::Stop) => {
                    info!("Engine stopping, aborting instrument tasks");
                    // wait for each task to finish so none can publish after the clear
                    for h in tasks.drain(..) {
                        h.abort();
                        let _ = h.await;
                    }
                    self.latest.write().await.clear();
                    *self.state.write().await = EngineState::Stopped;
                }

                Some(EngineCommand::Pause) => {
                    let current = *self.state.read().await;
                    if current == EngineState::Running {
                        info!("Engine paused, candles and open trades keep updating, signals suppressed");
                        *self.state.write().await = EngineState::Paused;
                    }
                }

                Some(EngineCommand::Resume) => {
                    let current = *self.state.read().await;
                    if current == EngineState::Paused {
                        info!("Engine resumed");
                        *self.state.write().await = EngineState::Running;
                    }
                }

                None => {
                    warn!("Engine command channel closed, shutting down");
                    for h in tasks.drain(..) {
                        h.abort();
                    }
                    break;
                }
            }
        }
    }
}

/// Feed one instrument from its source until the source is exhausted.
async fn drive(
    mut source: Box<dyn TickSource>,
    mut instrument: InstrumentEngine,
    state: Arc<RwLock<EngineState>>,
    snapshot_tx: broadcast::Sender<InstrumentSnapshot>,
    latest: Snapshots,
) {
    let symbol = source.symbol().to_string();
    info!(symbol = %symbol, "Instrument task started");

    while let Some(tick) = source.next_tick().await {
        let current = *state.read().await;
        instrument.set_signals_enabled(current == EngineState::Running);

        let events = match instrument.on_tick(&tick) {
            Ok(events) => events,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Tick skipped");
                continue;
            }
        };
        if events.is_empty() {
            continue;
        }

        for event in &events {
            log_event(&symbol, event);
        }
        let snapshot = instrument.snapshot(current);
        latest.write().await.insert(symbol.clone(), snapshot.clone());
        // Ignore send errors (no active receivers)
        let _ = snapshot_tx.send(snapshot);
    }

    info!(symbol = %symbol, "Tick source exhausted");
}

fn log_event(symbol: &str, event: &InstrumentEvent) {
    match event {
        InstrumentEvent::CandleClosed { timeframe, candle } => {
            info!(symbol = %symbol, timeframe = %timeframe, time = candle.time, close = candle.close, "Candle closed");
        }
        InstrumentEvent::Decision(d) => {
            info!(
                symbol = %symbol,
                action = ?d.action,
                reason = ?d.reason,
                detail = %d.detail,
                "Decision"
            );
        }
        InstrumentEvent::TradeOpened(t) => {
            info!(symbol = %symbol, id = %t.id, direction = %t.signal.direction, fill = t.fill_price, units = t.units, "Trade opened");
        }
        InstrumentEvent::TradeRejected(e) => {
            warn!(symbol = %symbol, error = %e, "Trade rejected");
        }
        InstrumentEvent::TradeClosed(c) => {
            info!(symbol = %symbol, reason = %c.reason, exit = c.exit_price, pnl = c.pnl, "Trade closed");
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::instrument::fixtures::*;
    use crate::replay::ReplaySource;
    use common::{Action, Tick};

    fn replay_factory(ticks: Vec<Tick>) -> SourceFactory {
        Arc::new(move |symbol: &str| Box::new(ReplaySource::new(symbol, ticks.clone())) as Box<dyn TickSource>)
    }

    /// Hourly ticks over six bars, enough for one analysis on a fresh engine.
    fn hourly_ticks() -> Vec<Tick> {
        (0..6).map(|i| tick(i * H1 + 1, 100.0 + i as f64)).collect()
    }

    async fn wait_for_snapshot(handle: &EngineHandle, symbol: &str) -> InstrumentSnapshot {
        for _ in 0..100 {
            if let Some(s) = handle.snapshot(symbol).await {
                if s.entry_candles.len() == 5 {
                    return s;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no snapshot for {symbol}");
    }

    #[tokio::test]
    async fn start_runs_each_symbol_independently() {
        let symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let (engine, handle) = Engine::new(
            symbols,
            SmcParams::default(),
            RiskConfig::default(),
            replay_factory(hourly_ticks()),
        );
        tokio::spawn(engine.run());
        assert_eq!(handle.state().await, EngineState::Stopped);

        handle.send(EngineCommand::Start).await;
        let btc = wait_for_snapshot(&handle, "BTCUSDT").await;
        let eth = wait_for_snapshot(&handle, "ETHUSDT").await;
        assert_eq!(btc.symbol, "BTCUSDT");
        assert_eq!(eth.entry_candles.len(), 5);
        assert_eq!(btc.last_decision.map(|d| d.action), Some(Action::NoTrade));
        assert_eq!(handle.state().await, EngineState::Running);
    }

    #[tokio::test]
    async fn pause_resume_and_stop_transitions() {
        let (engine, handle) = Engine::new(
            vec!["BTCUSDT".to_string()],
            SmcParams::default(),
            RiskConfig::default(),
            replay_factory(Vec::new()),
        );
        tokio::spawn(engine.run());

        // pause is ignored while stopped
        handle.send(EngineCommand::Pause).await;
        handle.send(EngineCommand::Start).await;
        handle.send(EngineCommand::Pause).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Paused);

        handle.send(EngineCommand::Resume).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Running);

        handle.send(EngineCommand::Stop).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state().await, EngineState::Stopped);
        assert!(handle.snapshot("BTCUSDT").await.is_none());
    }

    #[tokio::test]
    async fn stop_leaves_no_snapshot_behind() {
        let ticks: Vec<Tick> = (0..5000).map(|i| tick(i * H1 + 1, 100.0 + (i % 7) as f64)).collect();
        let (engine, handle) = Engine::new(
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            SmcParams::default(),
            RiskConfig::default(),
            Arc::new(move |symbol: &str| {
                Box::new(ReplaySource::new(symbol, ticks.clone()).with_delay(Duration::from_millis(1)))
                    as Box<dyn TickSource>
            }),
        );
        tokio::spawn(engine.run());
        handle.send(EngineCommand::Start).await;
        for _ in 0..100 {
            if handle.snapshot("BTCUSDT").await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.snapshot("BTCUSDT").await.is_some());

        handle.send(EngineCommand::Stop).await;
        for _ in 0..100 {
            if handle.state().await == EngineState::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.state().await, EngineState::Stopped);
        assert!(handle.snapshot("BTCUSDT").await.is_none());
        assert!(handle.snapshot("ETHUSDT").await.is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.snapshot("BTCUSDT").await.is_none());
        assert!(handle.snapshot("ETHUSDT").await.is_none());
    }

    #[tokio::test]
    async fn paused_engine_publishes_candles_without_decisions() {
        let (engine, handle) = Engine::new(
            vec!["BTCUSDT".to_string()],
            SmcParams::default(),
            RiskConfig::default(),
            Arc::new(|symbol: &str| {
                Box::new(ReplaySource::new(symbol, hourly_ticks()).with_delay(Duration::from_millis(30)))
                    as Box<dyn TickSource>
            }),
        );
        tokio::spawn(engine.run());
        handle.send(EngineCommand::Start).await;
        handle.send(EngineCommand::Pause).await;

        let snap = wait_for_snapshot(&handle, "BTCUSDT").await;
        assert_eq!(snap.state, EngineState::Paused);
        assert!(snap.last_decision.is_none());
    }
}
