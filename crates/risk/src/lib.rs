pub mod sizing;
pub mod tracker;

pub use sizing::position_size;
pub use tracker::{ActiveTrade, CloseReason, ClosedTrade, RiskConfig, TradeStatus, TradeTracker};

use thiserror::Error;

/// Reasons a signal could not be turned into a tracked trade.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradeError {
    #[error("a trade is already active for this instrument")]
    AlreadyActive,

    #[error("position size {units} is not positive (risk {risk_amount}, stop distance {stop_distance})")]
    InvalidSize {
        units: f64,
        risk_amount: f64,
        stop_distance: f64,
    },

    #[error("invalid quote: {0}")]
    InvalidQuote(String),
}
