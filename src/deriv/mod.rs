//! Deriv API Integration
//!
//! Market data and contract execution over the Deriv WebSocket API.
//!
//! # Components
//!
//! - [`client`] - WebSocket connection with request ids and an event channel
//! - [`models`] - Request/response data types and the JSON codec
//! - [`simulator`] - In-process market used in demo mode
//!
//! # Environment Variables
//!
//! - `DERIV_APP_ID` (optional) - Application id, defaults to the public 1089
//! - `DERIV_API_TOKEN` (optional) - API token; without it ticks stream as guest
//!
//! # API Calls Used
//!
//! - `authorize` - Authentication
//! - `balance` - Account balance (optionally subscribed)
//! - `ticks` / `forget_all` - Tick subscription
//! - `proposal` / `buy` - Contract purchase
//! - `proposal_open_contract` - Contract monitoring
//! - `ping` - Keep-alive

pub mod client;
pub mod models;
pub mod simulator;

// Re-export commonly used types
pub use client::{ConnectionState, DerivConnection, DEFAULT_APP_ID, DERIV_WS_URL};
pub use models::{decode_event, encode_request};
pub use simulator::MarketSimulator;
