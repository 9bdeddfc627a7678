use std::collections::BTreeSet;

use common::{Candle, Poi, Timeframe};

/// True when any candle formed after the POI overlaps its zone.
pub fn is_tapped(poi: &Poi, candles: &[Candle]) -> bool {
    candles
        .iter()
        .filter(|c| c.time > poi.time)
        .any(|c| c.overlaps(poi.low, poi.high))
}

/// Formation times of POIs already tapped, per timeframe.
///
/// Entries persist across evaluations until `clear` starts a new search
/// cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MitigationTracker {
    bias: BTreeSet<i64>,
    entry: BTreeSet<i64>,
}

impl MitigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, tf: Timeframe) -> &BTreeSet<i64> {
        match tf {
            Timeframe::Bias => &self.bias,
            Timeframe::Entry => &self.entry,
        }
    }

    pub fn is_mitigated(&self, tf: Timeframe, poi_time: i64) -> bool {
        self.set(tf).contains(&poi_time)
    }

    /// Record a mitigated POI. Returns `false` if it was already recorded.
    pub fn record(&mut self, tf: Timeframe, poi_time: i64) -> bool {
        match tf {
            Timeframe::Bias => self.bias.insert(poi_time),
            Timeframe::Entry => self.entry.insert(poi_time),
        }
    }

    pub fn len(&self, tf: Timeframe) -> usize {
        self.set(tf).len()
    }

    pub fn is_empty(&self) -> bool {
        self.bias.is_empty() && self.entry.is_empty()
    }

    /// Forget both timeframes.
    pub fn clear(&mut self) {
        self.bias.clear();
        self.entry.clear();
    }
}
