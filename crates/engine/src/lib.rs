//! Tick-driven runtime: candle aggregation, the per-instrument core and the
//! Binance transports feeding it.

pub mod aggregator;
pub mod binance;
pub mod instrument;
pub mod lifecycle;
pub mod replay;

pub use aggregator::CandleAggregator;
pub use binance::{BinanceBookTickerPoller, BinanceTradeStream};
pub use instrument::{InstrumentEngine, InstrumentEvent, InstrumentSnapshot};
pub use lifecycle::{Engine, EngineHandle, SourceFactory};
pub use replay::ReplaySource;
