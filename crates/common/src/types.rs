use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single trade/quote update from the transport.
///
/// `bid`/`ask` are optional: trade streams only carry a last price, book
/// ticker polls carry both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    #[serde(default)]
    pub quantity: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
}

impl Tick {
    pub fn new(price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            quantity: None,
            timestamp,
            bid: None,
            ask: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_quote(mut self, bid: f64, ask: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    /// Reject ticks that cannot be aggregated or priced.
    pub fn validate(&self) -> Result<()> {
        if !positive(self.price) {
            return Err(Error::InvalidTick(format!("price {} is not a positive number", self.price)));
        }
        if let Some(q) = self.quantity {
            if !q.is_finite() || q < 0.0 {
                return Err(Error::InvalidTick(format!("quantity {q} is invalid")));
            }
        }
        for (side, value) in [("bid", self.bid), ("ask", self.ask)] {
            if let Some(v) = value {
                if !positive(v) {
                    return Err(Error::InvalidTick(format!("{side} {v} is not a positive number")));
                }
            }
        }
        Ok(())
    }

    /// Best bid/ask for pricing. Missing sides fall back to the last price.
    pub fn quote(&self) -> Quote {
        Quote {
            bid: self.bid.unwrap_or(self.price),
            ask: self.ask.unwrap_or(self.price),
        }
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Two-sided price used for fills and stop/target monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn mid(price: f64) -> Self {
        Self { bid: price, ask: price }
    }
}

/// A closed fixed-interval bar.
///
/// `time` is the bucket start in epoch seconds; `index` is the position of
/// the bar within its timeframe's sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, skip_serializing)]
    pub index: usize,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: 0.0,
            index: 0,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Reject bars that cannot come from a real market: non-positive or
    /// non-finite prices, `high < low`, or open/close outside the range.
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("open", self.open), ("high", self.high), ("low", self.low), ("close", self.close)] {
            if !positive(v) {
                return Err(Error::InvalidCandle(format!("{name} {v} is not a positive number")));
            }
        }
        if self.high < self.low {
            return Err(Error::InvalidCandle(format!("high {} below low {}", self.high, self.low)));
        }
        for (name, v) in [("open", self.open), ("close", self.close)] {
            if v < self.low || v > self.high {
                return Err(Error::InvalidCandle(format!(
                    "{name} {v} outside range [{}, {}]",
                    self.low, self.high
                )));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::InvalidCandle(format!("volume {} is invalid", self.volume)));
        }
        Ok(())
    }

    /// True when the bar's range intersects `[low, high]`.
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        self.low <= high && self.high >= low
    }
}

/// Trade direction. Serialized as `"BUY"` / `"SELL"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// The two analysis tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Higher timeframe that fixes directional bias (4h by default).
    Bias,
    /// Lower timeframe that times the entry (1h by default).
    Entry,
}

/// Compact duration label for logs and details: `4h`, `15m`, `90s`.
pub fn duration_label(secs: i64) -> String {
    match secs {
        s if s > 0 && s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s > 0 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s > 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::Bias => write!(f, "bias"),
            Timeframe::Entry => write!(f, "entry"),
        }
    }
}

/// Order-block price zone selected after a market structure shift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub low: f64,
    pub high: f64,
    /// Formation time of the order-block candle (epoch seconds).
    pub time: i64,
    pub direction: Direction,
}

impl Poi {
    pub fn from_candle(candle: &Candle, direction: Direction) -> Self {
        Self {
            low: candle.low,
            high: candle.high,
            time: candle.time,
            direction,
        }
    }
}

/// A proposed trade with raw (pre-spread) levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub poi: Poi,
}

/// Reason attached to every no-trade result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "INVALID_STRUCTURE")]
    InvalidStructure,
    #[serde(rename = "NO_SETUP")]
    NoSetup,
    #[serde(rename = "NO_VALID_POI")]
    NoValidPoi,
    #[serde(rename = "WAITING_FOR_4H_MSS")]
    WaitingForBiasMss,
    #[serde(rename = "WAITING_FOR_1H_MSS")]
    WaitingForEntryMss,
    #[serde(rename = "WAITING_FOR_4H_POI_MITIGATION")]
    WaitingForBiasPoiMitigation,
    #[serde(rename = "WAITING_FOR_1H_POI_MITIGATION")]
    WaitingForEntryPoiMitigation,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidStructure => "INVALID_STRUCTURE",
            ReasonCode::NoSetup => "NO_SETUP",
            ReasonCode::NoValidPoi => "NO_VALID_POI",
            ReasonCode::WaitingForBiasMss => "WAITING_FOR_4H_MSS",
            ReasonCode::WaitingForEntryMss => "WAITING_FOR_1H_MSS",
            ReasonCode::WaitingForBiasPoiMitigation => "WAITING_FOR_4H_POI_MITIGATION",
            ReasonCode::WaitingForEntryPoiMitigation => "WAITING_FOR_1H_POI_MITIGATION",
        }
    }

    /// Pending MSS code for a timeframe.
    pub fn waiting_for_mss(tf: Timeframe) -> Self {
        match tf {
            Timeframe::Bias => ReasonCode::WaitingForBiasMss,
            Timeframe::Entry => ReasonCode::WaitingForEntryMss,
        }
    }

    /// Pending mitigation code for a timeframe.
    pub fn waiting_for_mitigation(tf: Timeframe) -> Self {
        match tf {
            Timeframe::Bias => ReasonCode::WaitingForBiasPoiMitigation,
            Timeframe::Entry => ReasonCode::WaitingForEntryPoiMitigation,
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed no-trade result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoTrade {
    pub reason: ReasonCode,
    pub detail: String,
}

impl NoTrade {
    pub fn new(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Outcome of one bias/entry evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Signal(TradeSignal),
    NoTrade(NoTrade),
}

impl Evaluation {
    pub fn signal(&self) -> Option<&TradeSignal> {
        match self {
            Evaluation::Signal(s) => Some(s),
            Evaluation::NoTrade(_) => None,
        }
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Evaluation::Signal(_) => None,
            Evaluation::NoTrade(n) => Some(n.reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TakeTrade,
    NoTrade,
}

/// Wire-level decision record handed to callers and observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    pub detail: String,
}

impl From<&Evaluation> for Decision {
    fn from(eval: &Evaluation) -> Self {
        match eval {
            Evaluation::Signal(s) => Decision {
                action: Action::TakeTrade,
                direction: Some(s.direction),
                entry: Some(s.entry),
                stop: Some(s.stop_loss),
                target: Some(s.take_profit),
                reason: None,
                detail: format!(
                    "{} from POI [{:.5}, {:.5}] formed at {}",
                    s.direction, s.poi.low, s.poi.high, s.poi.time
                ),
            },
            Evaluation::NoTrade(n) => Decision {
                action: Action::NoTrade,
                direction: None,
                entry: None,
                stop: None,
                target: None,
                reason: Some(n.reason),
                detail: n.detail.clone(),
            },
        }
    }
}

impl From<NoTrade> for Decision {
    fn from(n: NoTrade) -> Self {
        Decision::from(&Evaluation::NoTrade(n))
    }
}

/// How live PnL is expressed for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PnlUnit {
    #[default]
    Percent,
    Pips,
    Currency,
}

/// Per-instrument pricing conventions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSpec {
    pub pnl_unit: PnlUnit,
    /// Price increment of one pip (0.0001 for most FX majors).
    pub pip_size: f64,
    /// Account-currency value of a 1.0 price move on one unit.
    pub unit_risk_factor: f64,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            pnl_unit: PnlUnit::Percent,
            pip_size: 0.0001,
            unit_risk_factor: 1.0,
        }
    }
}

/// Current state of the runtime engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
}
