use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Candle, Decision, EngineState, Error, Evaluation, Result, Tick, Timeframe};
use risk::{ActiveTrade, ClosedTrade, RiskConfig, TradeError, TradeTracker};
use strategy::{SmcAnalyzer, SmcParams};

use crate::aggregator::CandleAggregator;

/// Something that happened while processing one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentEvent {
    CandleClosed { timeframe: Timeframe, candle: Candle },
    Decision(Decision),
    TradeOpened(ActiveTrade),
    TradeRejected(TradeError),
    TradeClosed(ClosedTrade),
}

/// Read-only view of one instrument for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    pub symbol: String,
    pub state: EngineState,
    pub bias_candles: Vec<Candle>,
    pub entry_candles: Vec<Candle>,
    pub last_decision: Option<Decision>,
    pub active_trade: Option<ActiveTrade>,
    pub last_close: Option<ClosedTrade>,
}

/// Tick-driven core for a single instrument.
///
/// Owns both candle aggregators, the analyzer (and with it the mitigation
/// sets) and the trade slot. Performs no I/O; one tick is fully processed
/// before the next.
#[derive(Debug, Clone)]
pub struct InstrumentEngine {
    symbol: String,
    bias: CandleAggregator,
    entry: CandleAggregator,
    analyzer: SmcAnalyzer,
    tracker: TradeTracker,
    signals_enabled: bool,
    last_tick: Option<DateTime<Utc>>,
    last_decision: Option<Decision>,
    last_close: Option<ClosedTrade>,
}

impl InstrumentEngine {
    pub fn new(symbol: impl Into<String>, params: SmcParams, risk: RiskConfig) -> Result<Self> {
        Self::with_history(symbol, params, risk, Vec::new(), Vec::new())
    }

    /// Start with closed bias and entry candles already known.
    pub fn with_history(
        symbol: impl Into<String>,
        params: SmcParams,
        risk: RiskConfig,
        bias_history: Vec<Candle>,
        entry_history: Vec<Candle>,
    ) -> Result<Self> {
        params.validate()?;
        let bias = CandleAggregator::with_history(Timeframe::Bias, params.bias_timeframe_secs, bias_history)?;
        let entry = CandleAggregator::with_history(Timeframe::Entry, params.entry_timeframe_secs, entry_history)?;
        Ok(Self {
            symbol: symbol.into(),
            bias,
            entry,
            analyzer: SmcAnalyzer::new(params),
            tracker: TradeTracker::new(risk),
            signals_enabled: true,
            last_tick: None,
            last_decision: None,
            last_close: None,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// When disabled, candles and the open trade keep updating but no new
    /// evaluation runs.
    pub fn set_signals_enabled(&mut self, enabled: bool) {
        self.signals_enabled = enabled;
    }

    pub fn active_trade(&self) -> Option<&ActiveTrade> {
        self.tracker.active()
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.last_decision.as_ref()
    }

    pub fn bias_candles(&self) -> &[Candle] {
        self.bias.closed()
    }

    pub fn entry_candles(&self) -> &[Candle] {
        self.entry.closed()
    }

    /// Process one tick.
    ///
    /// The tick is checked against both timeframes before either changes, so
    /// a rejected tick leaves no trace. An open trade is marked first; then,
    /// on an entry-bar close with the slot free, the analyzer runs and a
    /// signal is filled at this tick's quote.
    pub fn on_tick(&mut self, tick: &Tick) -> Result<Vec<InstrumentEvent>> {
        tick.validate()?;
        if let Some(last) = self.last_tick {
            if tick.timestamp < last {
                warn!(symbol = %self.symbol, tick = %tick.timestamp, last = %last, "Tick older than previous tick rejected");
                return Err(Error::InvalidTick(format!(
                    "timestamp {} precedes previous tick {}",
                    tick.timestamp, last
                )));
            }
        }
        self.bias.check(tick)?;
        self.entry.check(tick)?;
        self.last_tick = Some(tick.timestamp);

        let mut events = Vec::new();
        if let Some(candle) = self.bias.apply(tick) {
            events.push(InstrumentEvent::CandleClosed {
                timeframe: Timeframe::Bias,
                candle,
            });
        }
        let entry_closed = self.entry.apply(tick);
        if let Some(candle) = entry_closed {
            events.push(InstrumentEvent::CandleClosed {
                timeframe: Timeframe::Entry,
                candle,
            });
        }

        let quote = tick.quote();
        if let Some(closed) = self.tracker.on_quote(quote, tick.timestamp) {
            info!(symbol = %self.symbol, reason = %closed.reason, pnl = closed.pnl, "Trade finished");
            self.last_close = Some(closed.clone());
            events.push(InstrumentEvent::TradeClosed(closed));
        }

        if self.tracker.is_active() || entry_closed.is_none() || !self.signals_enabled {
            return Ok(events);
        }

        let evaluation = self.analyzer.evaluate(self.bias.closed(), self.entry.closed());
        let decision = Decision::from(&evaluation);
        self.last_decision = Some(decision.clone());
        events.push(InstrumentEvent::Decision(decision));

        if let Evaluation::Signal(signal) = evaluation {
            match self.tracker.open(signal, quote, tick.timestamp) {
                Ok(trade) => {
                    info!(symbol = %self.symbol, id = %trade.id, direction = %trade.signal.direction, "Signal filled");
                    events.push(InstrumentEvent::TradeOpened(trade.clone()));
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Signal not filled");
                    events.push(InstrumentEvent::TradeRejected(e));
                }
            }
        }

        Ok(events)
    }

    pub fn snapshot(&self, state: EngineState) -> InstrumentSnapshot {
        InstrumentSnapshot {
            symbol: self.symbol.clone(),
            state,
            bias_candles: self.bias.closed().to_vec(),
            entry_candles: self.entry.closed().to_vec(),
            last_decision: self.last_decision.clone(),
            active_trade: self.tracker.active().cloned(),
            last_close: self.last_close.clone(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use common::{Candle, Tick};

    pub const H4: i64 = 4 * 3600;
    pub const H1: i64 = 3600;
    /// First entry candle; sits after the bias history.
    pub const ENTRY_START: i64 = 5 * H4;

    /// Sweep of the bar-2 swing low, close above the bar-1 swing high, order
    /// block at bar 2 tapped by the following bars.
    pub const BULLISH: [(f64, f64, f64, f64); 5] = [
        (10.0, 11.0, 9.0, 10.5),
        (10.5, 12.0, 9.5, 11.0),
        (11.0, 11.5, 8.0, 9.0),
        (9.0, 12.4, 8.8, 12.2),
        (12.2, 13.0, 7.5, 12.5),
    ];

    pub fn series(start: i64, step: i64, bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| Candle::new(start + i as i64 * step, o, h, l, c))
            .collect()
    }

    pub fn tick(secs: i64, price: f64) -> Tick {
        Tick::new(price, Utc.timestamp_opt(secs, 0).unwrap())
    }

    /// Ticks forming the last bullish entry bar, then one tick (bid 8.0,
    /// ask 8.02) that closes it.
    pub fn closing_ticks() -> Vec<Tick> {
        let bar = ENTRY_START + 4 * H1;
        vec![
            tick(bar, 12.2),
            tick(bar + 60, 13.0),
            tick(bar + 120, 7.5),
            tick(bar + 180, 12.5),
            tick(bar + H1, 8.01).with_quote(8.0, 8.02),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use common::{Action, Direction, ReasonCode};
    use risk::CloseReason;

    fn primed() -> InstrumentEngine {
        InstrumentEngine::with_history(
            "BTCUSDT",
            SmcParams::default(),
            RiskConfig::default(),
            series(0, H4, &BULLISH),
            series(ENTRY_START, H1, &BULLISH[..4]),
        )
        .unwrap()
    }

    fn feed(engine: &mut InstrumentEngine, ticks: &[Tick]) -> Vec<InstrumentEvent> {
        ticks
            .iter()
            .flat_map(|t| engine.on_tick(t).unwrap())
            .collect()
    }

    #[test]
    fn entry_close_with_setup_opens_trade_at_quote() {
        let mut engine = primed();
        let events = feed(&mut engine, &closing_ticks());

        let decision = events
            .iter()
            .find_map(|e| match e {
                InstrumentEvent::Decision(d) => Some(d.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(decision.action, Action::TakeTrade);
        assert_eq!(decision.direction, Some(Direction::Buy));

        let trade = engine.active_trade().unwrap();
        assert!((trade.fill_price - 8.02).abs() < 1e-12);
        assert!((trade.signal.entry - 8.0).abs() < 1e-12);
        assert!(events.iter().any(|e| matches!(e, InstrumentEvent::TradeOpened(_))));
        assert_eq!(engine.entry_candles().len(), 5);
    }

    #[test]
    fn open_trade_is_closed_and_slot_freed() {
        let mut engine = primed();
        feed(&mut engine, &closing_ticks());
        let t = ENTRY_START + 5 * H1;

        let events = feed(&mut engine, &[tick(t + 10, 8.05)]);
        assert!(events.is_empty());
        assert!(engine.active_trade().is_some());

        let events = feed(&mut engine, &[tick(t + 20, 8.09)]);
        let closed = events
            .iter()
            .find_map(|e| match e {
                InstrumentEvent::TradeClosed(c) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(closed.reason, CloseReason::TakeProfit);
        assert!(engine.active_trade().is_none());
        assert_eq!(engine.snapshot(EngineState::Running).last_close, Some(closed));
    }

    #[test]
    fn no_analysis_while_trade_active() {
        let mut engine = primed();
        feed(&mut engine, &closing_ticks());
        let t = ENTRY_START + 6 * H1;
        // closes another entry bar; the trade stays open and nothing is evaluated
        let events = feed(&mut engine, &[tick(t, 8.03)]);
        assert!(events
            .iter()
            .all(|e| matches!(e, InstrumentEvent::CandleClosed { .. })));
        assert!(!events.is_empty());
    }

    #[test]
    fn disabled_signals_still_aggregate() {
        let mut engine = primed();
        engine.set_signals_enabled(false);
        let events = feed(&mut engine, &closing_ticks());
        assert!(engine.active_trade().is_none());
        assert!(engine.last_decision().is_none());
        assert!(events
            .iter()
            .any(|e| matches!(e, InstrumentEvent::CandleClosed { timeframe: Timeframe::Entry, .. })));
    }

    #[test]
    fn fresh_engine_reports_insufficient_history() {
        let mut engine = InstrumentEngine::new("EURUSD", SmcParams::default(), RiskConfig::default()).unwrap();
        feed(&mut engine, &[tick(0, 1.1), tick(H1, 1.2)]);
        let decision = engine.last_decision().unwrap();
        assert_eq!(decision.reason, Some(ReasonCode::InvalidStructure));
    }

    #[test]
    fn fill_through_stop_is_reported_not_opened() {
        let mut engine = primed();
        let mut ticks = closing_ticks();
        let last = ticks.len() - 1;
        ticks[last] = tick(ENTRY_START + 5 * H1, 7.9);
        let events = feed(&mut engine, &ticks);
        assert!(events
            .iter()
            .any(|e| matches!(e, InstrumentEvent::TradeRejected(TradeError::InvalidSize { .. }))));
        assert!(engine.active_trade().is_none());
    }

    #[test]
    fn stale_and_invalid_ticks_are_rejected() {
        let mut engine = primed();
        let bar = ENTRY_START + 4 * H1;
        engine.on_tick(&tick(bar + 100, 12.0)).unwrap();
        assert!(matches!(engine.on_tick(&tick(bar + 50, 12.0)), Err(Error::InvalidTick(_))));
        assert!(matches!(engine.on_tick(&tick(bar + 200, f64::NAN)), Err(Error::InvalidTick(_))));
        assert!(matches!(engine.on_tick(&tick(bar + 200, -1.0)), Err(Error::InvalidTick(_))));
    }

    #[test]
    fn tick_rejected_by_one_timeframe_changes_neither() {
        let mut engine = primed();
        // inside the last historical entry bar, but a fresh bias bucket
        let stale = tick(ENTRY_START + 3 * H1 + 10, 99.0);
        assert!(matches!(engine.on_tick(&stale), Err(Error::InvalidTick(_))));
        assert!(engine.bias.open_bar().is_none());
        assert!(engine.entry.open_bar().is_none());
        assert!(engine.last_tick.is_none());

        let events = feed(&mut engine, &closing_ticks());
        assert!(events.iter().any(|e| matches!(e, InstrumentEvent::TradeOpened(_))));
        assert_eq!(engine.bias.open_bar().map(|c| c.open), Some(12.2));
    }

    #[test]
    fn close_on_entry_boundary_evaluates_that_bar() {
        let mut engine = primed();
        feed(&mut engine, &closing_ticks());

        // hits the target on the tick that closes the next entry bar
        let events = feed(&mut engine, &[tick(ENTRY_START + 6 * H1, 8.09)]);
        let closed_at = events
            .iter()
            .position(|e| matches!(e, InstrumentEvent::TradeClosed(_)))
            .unwrap();
        let decided_at = events
            .iter()
            .position(|e| matches!(e, InstrumentEvent::Decision(_)))
            .unwrap();
        assert!(closed_at < decided_at);
        assert!(events
            .iter()
            .any(|e| matches!(e, InstrumentEvent::CandleClosed { timeframe: Timeframe::Entry, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, InstrumentEvent::TradeClosed(c) if c.reason == CloseReason::TakeProfit)));
    }

    #[test]
    fn snapshot_serializes() {
        let mut engine = primed();
        feed(&mut engine, &closing_ticks());
        let snap = engine.snapshot(EngineState::Paused);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["state"], "paused");
        assert_eq!(json["last_decision"]["action"], "take_trade");
        assert_eq!(json["entry_candles"].as_array().unwrap().len(), 5);
    }
}
