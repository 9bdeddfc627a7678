use common::Candle;

use crate::swing::{SwingKind, SwingPoint};

/// Check whether `latest` took the liquidity resting beyond the most recent
/// swing on one side.
///
/// Only the last swing in `swings` is consulted. A low-side sweep needs
/// `latest.low` strictly below the swing low; a high-side sweep needs
/// `latest.high` strictly above the swing high.
pub fn find_sweep(swings: &[SwingPoint], latest: &Candle) -> Option<SwingPoint> {
    let last = swings.last()?;
    let swept = match last.kind {
        SwingKind::Low => latest.low < last.candle.low,
        SwingKind::High => latest.high > last.candle.high,
    };
    swept.then_some(*last)
}
