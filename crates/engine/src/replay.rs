//! In-memory tick source for backtests and tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use common::{Tick, TickSource};

/// Replays a pre-loaded tick list in order, then reports exhaustion.
pub struct ReplaySource {
    symbol: String,
    ticks: VecDeque<Tick>,
    /// Pause between ticks; zero replays at full speed.
    delay: Duration,
}

impl ReplaySource {
    pub fn new(symbol: impl Into<String>, ticks: impl IntoIterator<Item = Tick>) -> Self {
        Self {
            symbol: symbol.into(),
            ticks: ticks.into_iter().collect(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

#[async_trait]
impl TickSource for ReplaySource {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn next_tick(&mut self) -> Option<Tick> {
        if !self.delay.is_zero() && !self.ticks.is_empty() {
            tokio::time::sleep(self.delay).await;
        }
        self.ticks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn replays_in_order_then_ends() {
        let ticks = (0..3).map(|i| Tick::new(1.0 + i as f64, Utc.timestamp_opt(i, 0).unwrap()));
        let mut source = ReplaySource::new("ETHUSDT", ticks);
        assert_eq!(source.symbol(), "ETHUSDT");
        assert_eq!(source.remaining(), 3);

        let mut prices = Vec::new();
        while let Some(t) = source.next_tick().await {
            prices.push(t.price);
        }
        assert_eq!(prices, vec![1.0, 2.0, 3.0]);
        assert!(source.next_tick().await.is_none());
    }
}
