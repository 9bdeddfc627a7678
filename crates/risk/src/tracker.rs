use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{Direction, InstrumentSpec, PnlUnit, Quote, TradeSignal};

use crate::sizing::position_size;
use crate::TradeError;

/// User-configurable sizing parameters for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Account-currency amount lost if the stop is hit.
    pub risk_amount: f64,
    pub instrument: InstrumentSpec,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_amount: 100.0,
            instrument: InstrumentSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed(CloseReason),
}

/// A filled signal being monitored against live quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrade {
    pub id: Uuid,
    pub signal: TradeSignal,
    /// Spread-adjusted fill: ask for BUY, bid for SELL.
    pub fill_price: f64,
    pub units: f64,
    /// Distance from the fill to the stop.
    pub stop_distance: f64,
    /// PnL at the latest mark, in `pnl_unit`.
    pub live_pnl: f64,
    pub pnl_unit: PnlUnit,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
}

impl ActiveTrade {
    pub fn direction(&self) -> Direction {
        self.signal.direction
    }

    /// Price the position would be closed at: bid for longs, ask for shorts.
    pub fn mark(&self, quote: &Quote) -> f64 {
        match self.direction() {
            Direction::Buy => quote.bid,
            Direction::Sell => quote.ask,
        }
    }

    fn pnl_at(&self, price: f64, instrument: &InstrumentSpec) -> f64 {
        let diff = match self.direction() {
            Direction::Buy => price - self.fill_price,
            Direction::Sell => self.fill_price - price,
        };
        match instrument.pnl_unit {
            PnlUnit::Percent => diff / self.fill_price * 100.0,
            PnlUnit::Pips => diff / instrument.pip_size,
            PnlUnit::Currency => diff * self.units * instrument.unit_risk_factor,
        }
    }

    /// Stop first, then target.
    fn exit_reason(&self, mark: f64) -> Option<CloseReason> {
        let s = &self.signal;
        match self.direction() {
            Direction::Buy if mark <= s.stop_loss => Some(CloseReason::StopLoss),
            Direction::Buy if mark >= s.take_profit => Some(CloseReason::TakeProfit),
            Direction::Sell if mark >= s.stop_loss => Some(CloseReason::StopLoss),
            Direction::Sell if mark <= s.take_profit => Some(CloseReason::TakeProfit),
            _ => None,
        }
    }
}

/// A finished trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade: ActiveTrade,
    pub reason: CloseReason,
    pub exit_price: f64,
    pub pnl: f64,
    pub closed_at: DateTime<Utc>,
}

/// Holds the single active trade of one instrument.
///
/// Fills signals at the spread-aware price, sizes them from the configured
/// risk, and closes them on the first quote that crosses stop or target.
#[derive(Debug, Clone)]
pub struct TradeTracker {
    config: RiskConfig,
    active: Option<ActiveTrade>,
}

impl TradeTracker {
    pub fn new(config: RiskConfig) -> Self {
        Self { config, active: None }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn active(&self) -> Option<&ActiveTrade> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Fill `signal` against `quote` and start tracking it.
    pub fn open(
        &mut self,
        signal: TradeSignal,
        quote: Quote,
        at: DateTime<Utc>,
    ) -> Result<&ActiveTrade, TradeError> {
        if self.active.is_some() {
            return Err(TradeError::AlreadyActive);
        }
        validate_quote(&quote)?;

        let (fill_price, stop_distance) = match signal.direction {
            Direction::Buy => (quote.ask, quote.ask - signal.stop_loss),
            Direction::Sell => (quote.bid, signal.stop_loss - quote.bid),
        };
        let units = position_size(
            self.config.risk_amount,
            stop_distance,
            self.config.instrument.unit_risk_factor,
        )
        .inspect_err(|e| warn!(error = %e, direction = %signal.direction, fill = fill_price, "Signal rejected by sizing"))?;

        let mut trade = ActiveTrade {
            id: Uuid::new_v4(),
            signal,
            fill_price,
            units,
            stop_distance,
            live_pnl: 0.0,
            pnl_unit: self.config.instrument.pnl_unit,
            status: TradeStatus::Open,
            opened_at: at,
        };
        trade.live_pnl = trade.pnl_at(trade.mark(&quote), &self.config.instrument);

        info!(
            id = %trade.id,
            direction = %trade.direction(),
            fill = fill_price,
            units = units,
            stop = signal.stop_loss,
            target = signal.take_profit,
            "Trade opened"
        );
        Ok(&*self.active.insert(trade))
    }

    /// Mark the active trade to `quote`; close it if stop or target is crossed.
    pub fn on_quote(&mut self, quote: Quote, at: DateTime<Utc>) -> Option<ClosedTrade> {
        let trade = self.active.as_mut()?;
        let mark = trade.mark(&quote);
        trade.live_pnl = trade.pnl_at(mark, &self.config.instrument);

        let Some(reason) = trade.exit_reason(mark) else {
            debug!(id = %trade.id, mark = mark, pnl = trade.live_pnl, "Trade marked");
            return None;
        };

        let mut trade = self.active.take()?;
        trade.status = TradeStatus::Closed(reason);
        let pnl = trade.live_pnl;
        info!(
            id = %trade.id,
            direction = %trade.direction(),
            reason = %reason,
            exit = mark,
            pnl = pnl,
            unit = ?trade.pnl_unit,
            "Trade closed"
        );
        Some(ClosedTrade {
            trade,
            reason,
            exit_price: mark,
            pnl,
            closed_at: at,
        })
    }
}

fn validate_quote(quote: &Quote) -> Result<(), TradeError> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    if !ok(quote.bid) || !ok(quote.ask) || quote.bid > quote.ask {
        return Err(TradeError::InvalidQuote(format!(
            "bid {} / ask {}",
            quote.bid, quote.ask
        )));
    }
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::Poi;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn signal(direction: Direction, entry: f64, stop: f64, target: f64) -> TradeSignal {
        TradeSignal {
            direction,
            entry,
            stop_loss: stop,
            take_profit: target,
            poi: Poi {
                low: entry.min(stop),
                high: entry.max(stop),
                time: 0,
                direction,
            },
        }
    }

    fn tracker(unit: PnlUnit) -> TradeTracker {
        TradeTracker::new(RiskConfig {
            risk_amount: 100.0,
            instrument: InstrumentSpec {
                pnl_unit: unit,
                pip_size: 0.0001,
                unit_risk_factor: 1.0,
            },
        })
    }

    fn q(bid: f64, ask: f64) -> Quote {
        Quote { bid, ask }
    }

    #[test]
    fn buy_fills_at_ask_and_sizes_from_fill() {
        let mut t = tracker(PnlUnit::Percent);
        let trade = t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(100.0, 100.5), now()).unwrap();
        assert!((trade.fill_price - 100.5).abs() < 1e-12);
        assert!((trade.stop_distance - 1.5).abs() < 1e-12);
        assert!((trade.units - 100.0 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn sell_fills_at_bid() {
        let mut t = tracker(PnlUnit::Percent);
        let trade = t.open(signal(Direction::Sell, 100.0, 101.0, 96.0), q(99.8, 100.2), now()).unwrap();
        assert!((trade.fill_price - 99.8).abs() < 1e-12);
        assert!((trade.stop_distance - 1.2).abs() < 1e-9);
    }

    #[test]
    fn fill_through_stop_is_rejected() {
        let mut t = tracker(PnlUnit::Percent);
        let err = t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(98.5, 98.9), now()).unwrap_err();
        assert!(matches!(err, TradeError::InvalidSize { .. }));
        assert!(!t.is_active());
    }

    #[test]
    fn second_open_is_rejected_while_active() {
        let mut t = tracker(PnlUnit::Percent);
        t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(100.0, 100.0), now()).unwrap();
        let err = t.open(signal(Direction::Sell, 100.0, 101.0, 96.0), q(100.0, 100.0), now()).unwrap_err();
        assert_eq!(err, TradeError::AlreadyActive);
    }

    #[test]
    fn crossed_quote_is_rejected() {
        let mut t = tracker(PnlUnit::Percent);
        let err = t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(101.0, 100.0), now()).unwrap_err();
        assert!(matches!(err, TradeError::InvalidQuote(_)));
    }

    #[test]
    fn buy_closes_on_bid_at_target() {
        let mut t = tracker(PnlUnit::Percent);
        t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(100.0, 100.0), now()).unwrap();
        assert!(t.on_quote(q(103.9, 104.5), now()).is_none());
        let closed = t.on_quote(q(104.0, 104.1), now()).unwrap();
        assert_eq!(closed.reason, CloseReason::TakeProfit);
        assert!((closed.pnl - 4.0).abs() < 1e-9);
        assert_eq!(closed.trade.status, TradeStatus::Closed(CloseReason::TakeProfit));
        assert!(!t.is_active());
    }

    #[test]
    fn sell_closes_on_ask_at_stop() {
        let mut t = tracker(PnlUnit::Pips);
        t.open(signal(Direction::Sell, 1.1000, 1.1010, 1.0950), q(1.1000, 1.1001), now()).unwrap();
        assert!(t.on_quote(q(1.1008, 1.1009), now()).is_none());
        let closed = t.on_quote(q(1.1009, 1.1010), now()).unwrap();
        assert_eq!(closed.reason, CloseReason::StopLoss);
        assert!((closed.pnl - (-10.0)).abs() < 1e-6);
    }

    #[test]
    fn first_level_crossed_in_tick_order_wins() {
        let mut t = tracker(PnlUnit::Percent);
        t.open(signal(Direction::Buy, 100.0, 99.0, 104.0), q(100.0, 100.0), now()).unwrap();
        let closed = t.on_quote(q(104.2, 104.2), now()).unwrap();
        assert_eq!(closed.reason, CloseReason::TakeProfit);
        // the later stop-crossing tick has nothing to close
        assert!(t.on_quote(q(98.0, 98.0), now()).is_none());
    }

    #[test]
    fn currency_pnl_scales_with_units() {
        let mut t = tracker(PnlUnit::Currency);
        t.open(signal(Direction::Buy, 100.0, 99.0, 110.0), q(100.0, 100.0), now()).unwrap();
        // 100 units risked over a 1.0 stop distance
        assert!(t.on_quote(q(101.0, 101.0), now()).is_none());
        assert!((t.active().unwrap().live_pnl - 100.0).abs() < 1e-9);
    }
}
