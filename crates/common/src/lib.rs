pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::{Config, Transport};
pub use error::{Error, Result};
pub use source::TickSource;
pub use types::*;
