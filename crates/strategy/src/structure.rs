use common::{Candle, Direction};

use crate::sweep::find_sweep;
use crate::swing::{SwingPoint, Swings};

/// Result of reading market structure on one side of the book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StructureOutcome {
    /// No sweep, or no structure level to break after it.
    Absent,
    /// Liquidity swept but the latest close has not broken the level yet.
    AwaitingShift { swept: SwingPoint, level: SwingPoint },
    /// Sweep followed by a close beyond the structure level.
    Shift { swept: SwingPoint, level: SwingPoint },
}

/// Latest opposite-side swing formed strictly before the swept point.
pub fn structure_level(swept: &SwingPoint, opposite: &[SwingPoint]) -> Option<SwingPoint> {
    opposite
        .iter()
        .filter(|s| s.time() < swept.time())
        .max_by_key(|s| s.time())
        .copied()
}

/// A shift is confirmed when the close is beyond the level in `direction`.
pub fn is_shift_confirmed(level: &SwingPoint, latest: &Candle, direction: Direction) -> bool {
    match direction {
        Direction::Buy => latest.close > level.candle.high,
        Direction::Sell => latest.close < level.candle.low,
    }
}

/// Sweep then MSS for one direction.
///
/// Bullish (`Buy`) structure sweeps a swing low and breaks the preceding
/// swing high; bearish mirrors it.
pub fn analyze_structure(swings: &Swings, latest: &Candle, direction: Direction) -> StructureOutcome {
    let (swept_side, opposite) = match direction {
        Direction::Buy => (&swings.lows, &swings.highs),
        Direction::Sell => (&swings.highs, &swings.lows),
    };

    let Some(swept) = find_sweep(swept_side, latest) else {
        return StructureOutcome::Absent;
    };
    let Some(level) = structure_level(&swept, opposite) else {
        return StructureOutcome::Absent;
    };

    if is_shift_confirmed(&level, latest, direction) {
        StructureOutcome::Shift { swept, level }
    } else {
        StructureOutcome::AwaitingShift { swept, level }
    }
}
