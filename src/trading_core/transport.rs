//! Contract between the trading core and a market-data/execution transport.
//!
//! The core consumes `BrokerEvent`s and emits `TransportRequest`s. Requests
//! are fire-and-forget: responses come back later as events.

use serde::{Deserialize, Serialize};

use super::state_machine::{ContractType, TradeDuration};

/// Error code the broker sends for a duplicate subscription
pub const ALREADY_SUBSCRIBED: &str = "AlreadySubscribed";

/// Raw tick as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTick {
    pub quote: f64,
    pub epoch: i64,
    pub id: Option<String>,
    pub pip_size: Option<u32>,
    pub symbol: Option<String>,
}

/// Open-contract monitoring update
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContractUpdate {
    pub contract_id: Option<u64>,
    pub entry_spot: Option<f64>,
    pub is_sold: bool,
    pub profit: f64,
    pub exit_tick: Option<f64>,
}

/// Protocol-level error reported by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// Request type the error answers, e.g. "authorize"
    pub msg_type: Option<String>,
}

impl ApiError {
    pub fn is_already_subscribed(&self) -> bool {
        self.code == ALREADY_SUBSCRIBED
    }

    pub fn is_authorization_failure(&self) -> bool {
        self.msg_type.as_deref() == Some("authorize")
    }
}

/// Everything the transport can tell the core
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Socket open
    Connected,
    /// Socket closed
    Disconnected { reason: String },
    /// Socket-level failure
    TransportError { message: String },
    Authorized { balance: f64, currency: String },
    BalanceUpdated { balance: f64, currency: String },
    TickReceived(RawTick),
    ProposalReceived { id: String, ask_price: f64 },
    BoughtConfirmed { contract_id: u64 },
    ContractUpdated(ContractUpdate),
    ErrorOccurred(ApiError),
}

/// Parameters of a price proposal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalSpec {
    pub req_id: u64,
    pub symbol: String,
    pub contract_type: ContractType,
    pub stake: f64,
    pub duration: TradeDuration,
    pub currency: String,
}

/// Everything the core can ask the transport to do
#[derive(Debug, Clone, PartialEq)]
pub enum TransportRequest {
    Authorize { token: String },
    SubscribeTicks { symbol: String },
    UnsubscribeAll,
    RequestProposal(ProposalSpec),
    ConfirmBuy { proposal_id: String, price: f64 },
    SubscribeContract { contract_id: u64 },
    RequestBalance { subscribe: bool },
    Ping,
}

impl std::fmt::Display for TransportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportRequest::Authorize { .. } => write!(f, "authorize"),
            TransportRequest::SubscribeTicks { symbol } => write!(f, "ticks {}", symbol),
            TransportRequest::UnsubscribeAll => write!(f, "forget_all ticks"),
            TransportRequest::RequestProposal(spec) => write!(
                f,
                "proposal {} {} {:.2} {}",
                spec.symbol, spec.contract_type, spec.stake, spec.currency
            ),
            TransportRequest::ConfirmBuy { proposal_id, price } => {
                write!(f, "buy {} @ {:.2}", proposal_id, price)
            }
            TransportRequest::SubscribeContract { contract_id } => {
                write!(f, "proposal_open_contract {}", contract_id)
            }
            TransportRequest::RequestBalance { subscribe } => {
                write!(f, "balance (subscribe={})", subscribe)
            }
            TransportRequest::Ping => write!(f, "ping"),
        }
    }
}
