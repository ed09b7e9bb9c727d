//! Deriv API Data Models
//!
//! Request and response types for the Deriv WebSocket API, plus the codec
//! between them and the transport-neutral `TransportRequest`/`BrokerEvent`.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::trading_core::transport::{ApiError, BrokerEvent, ContractUpdate, RawTick, TransportRequest};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AuthorizeRequest<'a> {
    pub authorize: &'a str,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct TicksRequest<'a> {
    pub ticks: &'a str,
    pub subscribe: u8,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct ForgetAllRequest {
    pub forget_all: &'static str,
    pub req_id: u64,
}

/// Price proposal for a rise/fall contract
#[derive(Debug, Serialize)]
pub struct ProposalRequest<'a> {
    pub proposal: u8,
    pub amount: f64,
    /// Always "stake"
    pub basis: &'static str,
    /// "CALL" or "PUT"
    pub contract_type: &'static str,
    pub currency: &'a str,
    pub duration: u32,
    /// "t", "s" or "m"
    pub duration_unit: &'static str,
    pub symbol: &'a str,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct BuyRequest<'a> {
    /// Proposal id
    pub buy: &'a str,
    pub price: f64,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct OpenContractRequest {
    pub proposal_open_contract: u8,
    pub subscribe: u8,
    pub contract_id: u64,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct BalanceRequest {
    pub balance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<u8>,
    pub req_id: u64,
}

#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub ping: u8,
    pub req_id: u64,
}

/// Serialize a transport request as a Deriv JSON frame
pub fn encode_request(request: &TransportRequest, req_id: u64) -> Result<String> {
    let json = match request {
        TransportRequest::Authorize { token } => serde_json::to_string(&AuthorizeRequest {
            authorize: token,
            req_id,
        }),
        TransportRequest::SubscribeTicks { symbol } => serde_json::to_string(&TicksRequest {
            ticks: symbol,
            subscribe: 1,
            req_id,
        }),
        TransportRequest::UnsubscribeAll => serde_json::to_string(&ForgetAllRequest {
            forget_all: "ticks",
            req_id,
        }),
        TransportRequest::RequestProposal(spec) => serde_json::to_string(&ProposalRequest {
            proposal: 1,
            amount: spec.stake,
            basis: "stake",
            contract_type: spec.contract_type.code(),
            currency: &spec.currency,
            duration: spec.duration.value,
            duration_unit: spec.duration.unit.code(),
            symbol: &spec.symbol,
            req_id,
        }),
        TransportRequest::ConfirmBuy { proposal_id, price } => serde_json::to_string(&BuyRequest {
            buy: proposal_id,
            price: *price,
            req_id,
        }),
        TransportRequest::SubscribeContract { contract_id } => {
            serde_json::to_string(&OpenContractRequest {
                proposal_open_contract: 1,
                subscribe: 1,
                contract_id: *contract_id,
                req_id,
            })
        }
        TransportRequest::RequestBalance { subscribe } => serde_json::to_string(&BalanceRequest {
            balance: 1,
            subscribe: subscribe.then_some(1),
            req_id,
        }),
        TransportRequest::Ping => serde_json::to_string(&PingRequest { ping: 1, req_id }),
    };
    json.with_context(|| format!("Failed to encode {} request", request))
}

// ============================================================================
// Responses
// ============================================================================

/// Accept a number or a numeric string
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept a bool or 0/1
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Accept an integer or an integer string
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizePayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub balance: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub loginid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BalancePayload {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub balance: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TickPayload {
    pub quote: f64,
    pub epoch: i64,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub pip_size: Option<u32>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProposalPayload {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ask_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BuyPayload {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub contract_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OpenContractPayload {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub contract_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_spot: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_sold: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub exit_tick: Option<f64>,
}

/// Top-level frame. Only the payload named by `msg_type` is read.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    pub msg_type: String,
    #[serde(default)]
    pub req_id: Option<u64>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub authorize: Option<AuthorizePayload>,
    #[serde(default)]
    pub balance: Option<BalancePayload>,
    #[serde(default)]
    pub tick: Option<TickPayload>,
    #[serde(default)]
    pub proposal: Option<ProposalPayload>,
    #[serde(default)]
    pub buy: Option<BuyPayload>,
    #[serde(default)]
    pub proposal_open_contract: Option<OpenContractPayload>,
}

/// Parse one Deriv frame. `Ok(None)` for frames the core does not consume.
pub fn decode_event(text: &str) -> Result<Option<BrokerEvent>> {
    let envelope: ResponseEnvelope =
        serde_json::from_str(text).context("Failed to parse Deriv message")?;
    Ok(envelope.into_event())
}

impl ResponseEnvelope {
    pub fn into_event(self) -> Option<BrokerEvent> {
        if let Some(error) = self.error {
            return Some(BrokerEvent::ErrorOccurred(ApiError {
                code: error.code,
                message: error.message,
                msg_type: Some(self.msg_type),
            }));
        }

        match self.msg_type.as_str() {
            "authorize" => self.authorize.map(|a| BrokerEvent::Authorized {
                balance: a.balance.unwrap_or(0.0),
                currency: a.currency.unwrap_or_else(|| "USD".to_string()),
            }),
            "balance" => self.balance.and_then(|b| {
                Some(BrokerEvent::BalanceUpdated {
                    balance: b.balance?,
                    currency: b.currency.unwrap_or_else(|| "USD".to_string()),
                })
            }),
            "tick" => self.tick.map(|t| {
                BrokerEvent::TickReceived(RawTick {
                    quote: t.quote,
                    epoch: t.epoch,
                    id: t.id,
                    pip_size: t.pip_size,
                    symbol: t.symbol,
                })
            }),
            "proposal" => self.proposal.and_then(|p| {
                Some(BrokerEvent::ProposalReceived {
                    id: p.id,
                    ask_price: p.ask_price?,
                })
            }),
            "buy" => self
                .buy
                .and_then(|b| b.contract_id)
                .map(|contract_id| BrokerEvent::BoughtConfirmed { contract_id }),
            "proposal_open_contract" => self.proposal_open_contract.map(|c| {
                BrokerEvent::ContractUpdated(ContractUpdate {
                    contract_id: c.contract_id,
                    entry_spot: c.entry_spot,
                    is_sold: c.is_sold,
                    profit: c.profit.unwrap_or(0.0),
                    exit_tick: c.exit_tick,
                })
            }),
            _ => None,
        }
    }
}
