use common::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

/// A local extremum: an interior candle tagged high or low.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub candle: Candle,
}

impl SwingPoint {
    pub fn time(&self) -> i64 {
        self.candle.time
    }

    /// The extreme that makes this candle a swing.
    pub fn price(&self) -> f64 {
        match self.kind {
            SwingKind::High => self.candle.high,
            SwingKind::Low => self.candle.low,
        }
    }
}

/// Swing highs and lows of one candle window, each in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Swings {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl Swings {
    /// Structure can only be read when both sides have at least one swing.
    pub fn is_complete(&self) -> bool {
        !self.highs.is_empty() && !self.lows.is_empty()
    }
}

/// Detect swing points over `candles`.
///
/// A swing high must be `>=` the previous high and strictly `>` the next
/// high; swing lows mirror this with `<=` / `<`. The first and last candles
/// are never swings.
pub fn detect_swings(candles: &[Candle]) -> Swings {
    let mut swings = Swings::default();
    for w in candles.windows(3) {
        let (prev, curr, next) = (&w[0], &w[1], &w[2]);
        if curr.high >= prev.high && curr.high > next.high {
            swings.highs.push(SwingPoint {
                kind: SwingKind::High,
                candle: *curr,
            });
        }
        if curr.low <= prev.low && curr.low < next.low {
            swings.lows.push(SwingPoint {
                kind: SwingKind::Low,
                candle: *curr,
            });
        }
    }
    swings
}
