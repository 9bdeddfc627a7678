use chrono::{TimeZone, Utc};
use common::{Action, Candle, Direction, Tick, TickSource};
use engine::{InstrumentEngine, InstrumentEvent, ReplaySource};
use risk::{CloseReason, RiskConfig};
use strategy::SmcParams;

const H4: i64 = 4 * 3600;
const H1: i64 = 3600;
const ENTRY_START: i64 = 5 * H4;

const BULLISH: [(f64, f64, f64, f64); 5] = [
    (10.0, 11.0, 9.0, 10.5),
    (10.5, 12.0, 9.5, 11.0),
    (11.0, 11.5, 8.0, 9.0),
    (9.0, 12.4, 8.8, 12.2),
    (12.2, 13.0, 7.5, 12.5),
];

fn series(start: i64, step: i64, bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    bars.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle::new(start + i as i64 * step, o, h, l, c))
        .collect()
}

fn tick(secs: i64, price: f64) -> Tick {
    Tick::new(price, Utc.timestamp_opt(secs, 0).unwrap())
}

async fn replay(engine: &mut InstrumentEngine, mut source: ReplaySource) -> Vec<InstrumentEvent> {
    let mut events = Vec::new();
    while let Some(t) = source.next_tick().await {
        events.extend(engine.on_tick(&t).unwrap());
    }
    events
}

#[tokio::test]
async fn signal_fill_and_stop_out_in_tick_order() {
    let mut engine = InstrumentEngine::with_history(
        "EURUSD",
        SmcParams::default(),
        RiskConfig::default(),
        series(0, H4, &BULLISH),
        series(ENTRY_START, H1, &BULLISH[..4]),
    )
    .unwrap();

    let bar = ENTRY_START + 4 * H1;
    let next = bar + H1;
    let source = ReplaySource::new(
        "EURUSD",
        vec![
            tick(bar, 12.2),
            tick(bar + 60, 13.0),
            tick(bar + 120, 7.5),
            tick(bar + 180, 12.5),
            tick(next, 8.01).with_quote(8.0, 8.02),
            tick(next + 10, 7.99),
            tick(next + 20, 8.10),
        ],
    );

    let events = replay(&mut engine, source).await;

    let decisions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            InstrumentEvent::Decision(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].action, Action::TakeTrade);
    assert_eq!(decisions[0].direction, Some(Direction::Buy));

    let closes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            InstrumentEvent::TradeClosed(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].reason, CloseReason::StopLoss);
    assert!((closes[0].exit_price - 7.99).abs() < 1e-12);
    assert!(closes[0].pnl < 0.0);
    assert!(engine.active_trade().is_none());
}

#[tokio::test]
async fn gapped_stream_still_closes_each_bar_once() {
    let mut engine = InstrumentEngine::new("BTCUSDT", SmcParams::default(), RiskConfig::default()).unwrap();
    let source = ReplaySource::new(
        "BTCUSDT",
        vec![tick(0, 100.0), tick(30, 101.0), tick(10 * H1, 99.0), tick(10 * H1 + 5, 98.0), tick(11 * H1, 97.0)],
    );
    let events = replay(&mut engine, source).await;
    let entry_closes = events
        .iter()
        .filter(|e| matches!(e, InstrumentEvent::CandleClosed { timeframe: common::Timeframe::Entry, .. }))
        .count();
    assert_eq!(entry_closes, 2);
    assert_eq!(engine.entry_candles()[0].close, 101.0);
    assert_eq!(engine.entry_candles()[1].low, 98.0);
}
