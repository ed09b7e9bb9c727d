// Library crate - signal engine, trade lifecycle and the Deriv transport

pub mod api;
pub mod config;
pub mod deriv;
pub mod streams;
pub mod trading_core;
pub mod types;

// Re-export commonly used types
pub use config::{FeedMode, SessionConfig};
pub use types::*;
