//! Smart Money Concepts analysis: swing points, liquidity sweeps, market
//! structure shifts, order-block POIs and their mitigation, combined into a
//! higher-timeframe bias / lower-timeframe entry state machine.

pub mod analyzer;
pub mod batch;
pub mod config;
pub mod mitigation;
pub mod poi;
pub mod structure;
pub mod sweep;
pub mod swing;

pub use analyzer::{prepare_signal, SmcAnalyzer};
pub use batch::{evaluate_json, evaluate_value};
pub use config::{SmcFileConfig, SmcParams};
pub use mitigation::MitigationTracker;
pub use swing::{detect_swings, SwingKind, SwingPoint, Swings};
