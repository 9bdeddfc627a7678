pub mod rest;
pub mod stream;

pub use rest::BinanceBookTickerPoller;
pub use stream::BinanceTradeStream;
