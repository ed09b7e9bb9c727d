//! Trading Core - signal engine and trade lifecycle shared by live and demo feeds
//!
//! This module contains the core components:
//! - Tick history (last digit + price colour)
//! - Cycling and pattern signal pillars
//! - Adaptive per-pattern weighting
//! - Decision engine with pillar configuration and rotation
//! - Trade lifecycle state machine with stake management
//! - Trading session orchestration

pub mod ticks;
pub mod patterns;
pub mod signals;
pub mod learning;
pub mod engine;
pub mod state_machine;
pub mod transport;
pub mod trader;

// Re-export commonly used types
pub use ticks::{PriceColor, Parity, TickObservation, TickHistory, TickData};
pub use patterns::{Direction, PatternId, SignalSource, SCANNING_LABEL};
pub use learning::PatternWeights;
pub use engine::{DecisionEngine, Pillar, PillarConfig, Scene};
pub use state_machine::{
    ContractType, DurationUnit, StrategyConfig, TradeDuration, TradeHistoryItem, TradeLifecycle,
    TradeResult, TradeState, TradeStatus,
};
pub use transport::{BrokerEvent, ContractUpdate, RawTick, TransportRequest};
pub use trader::{SessionOutput, SessionSettings, SessionSnapshot, Stats, TradingSession};
