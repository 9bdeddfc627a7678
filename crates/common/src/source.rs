use async_trait::async_trait;

use crate::Tick;

/// Abstraction over the tick transport for one instrument.
///
/// `BinanceTradeStream` (WebSocket push) and `BinanceBookTickerPoller`
/// (REST poll) implement this for live data; `ReplaySource` replays a fixed
/// list for tests. Adapters own reconnection and backoff: the core only ever
/// sees a (possibly gapped) sequence of ticks in time order.
#[async_trait]
pub trait TickSource: Send {
    /// Instrument symbol this source delivers, e.g. "BTCUSDT".
    fn symbol(&self) -> &str;

    /// Wait for the next tick. `None` means the source is exhausted.
    async fn next_tick(&mut self) -> Option<Tick>;
}

#[async_trait]
impl<S: TickSource + ?Sized> TickSource for Box<S> {
    fn symbol(&self) -> &str {
        (**self).symbol()
    }

    async fn next_tick(&mut self) -> Option<Tick> {
        (**self).next_tick().await
    }
}
