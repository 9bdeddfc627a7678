use common::{Candle, Direction, Poi};

use crate::swing::SwingPoint;

/// Three-candle imbalance used as an inducement filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValueGap {
    pub low: f64,
    pub high: f64,
    /// Time of the middle (displacement) candle.
    pub time: i64,
    pub direction: Direction,
}

/// Order-block candidates in chronological order.
///
/// `prev` is a candidate when the following candle moves the opposite way
/// with a body larger than `multiplier` times `prev`'s body. Bullish blocks
/// are bearish candles followed by a strong bullish candle, and vice versa.
pub fn order_blocks(candles: &[Candle], direction: Direction, multiplier: f64) -> Vec<Candle> {
    candles
        .windows(2)
        .filter(|w| {
            let (prev, curr) = (&w[0], &w[1]);
            let strong = curr.body() > prev.body() * multiplier;
            let pattern = match direction {
                Direction::Buy => prev.is_bearish() && curr.is_bullish(),
                Direction::Sell => prev.is_bullish() && curr.is_bearish(),
            };
            strong && pattern
        })
        .map(|w| w[0])
        .collect()
}

/// Fair value gaps in `direction`, chronological.
pub fn fair_value_gaps(candles: &[Candle], direction: Direction) -> Vec<FairValueGap> {
    candles
        .windows(3)
        .filter_map(|w| {
            let (c1, c2, c3) = (&w[0], &w[1], &w[2]);
            match direction {
                Direction::Buy if c1.high < c3.low => Some(FairValueGap {
                    low: c1.high,
                    high: c3.low,
                    time: c2.time,
                    direction,
                }),
                Direction::Sell if c1.low > c3.high => Some(FairValueGap {
                    low: c3.high,
                    high: c1.low,
                    time: c2.time,
                    direction,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Pick one POI from the candles formed after the MSS level.
///
/// Candidates already in the mitigated set are skipped. When an FVG exists,
/// the extremal candidate lying entirely beyond the latest gap wins (lowest
/// low for bullish, highest high for bearish); otherwise the most recent
/// remaining candidate is used.
pub fn select_poi<F>(
    candles: &[Candle],
    direction: Direction,
    multiplier: f64,
    is_mitigated: F,
) -> Option<Poi>
where
    F: Fn(i64) -> bool,
{
    let candidates: Vec<Candle> = order_blocks(candles, direction, multiplier)
        .into_iter()
        .filter(|ob| !is_mitigated(ob.time))
        .collect();

    let beyond_gap = fair_value_gaps(candles, direction)
        .last()
        .and_then(|gap| extremal_beyond(&candidates, gap));

    beyond_gap
        .or_else(|| candidates.last().copied())
        .map(|ob| Poi::from_candle(&ob, direction))
}

fn extremal_beyond(candidates: &[Candle], gap: &FairValueGap) -> Option<Candle> {
    let beyond = candidates.iter().filter(|ob| match gap.direction {
        Direction::Buy => ob.high <= gap.low,
        Direction::Sell => ob.low >= gap.high,
    });
    match gap.direction {
        Direction::Buy => beyond.min_by(|a, b| a.low.total_cmp(&b.low)).copied(),
        Direction::Sell => beyond.max_by(|a, b| a.high.total_cmp(&b.high)).copied(),
    }
}

/// Search for a POI in the candles strictly after the structure level.
pub fn find_poi_after<F>(
    level: &SwingPoint,
    candles: &[Candle],
    direction: Direction,
    multiplier: f64,
    is_mitigated: F,
) -> Option<Poi>
where
    F: Fn(i64) -> bool,
{
    let start = candles.partition_point(|c| c.time <= level.time());
    select_poi(&candles[start..], direction, multiplier, is_mitigated)
}
