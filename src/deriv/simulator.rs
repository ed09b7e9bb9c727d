//! Demo market simulator
//!
//! Stands in for the Deriv endpoint when running in demo mode: random-walk
//! ticks, instant proposals at the requested stake, and rise/fall contracts
//! that settle after their duration in ticks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

use crate::trading_core::state_machine::{round2, ContractType, DurationUnit, TradeDuration, MIN_STAKE};
use crate::trading_core::transport::{ApiError, BrokerEvent, ContractUpdate, RawTick, TransportRequest, ALREADY_SUBSCRIBED};

/// Demo account starting balance
pub const DEMO_BALANCE: f64 = 10_000.0;

/// Payout on a winning contract as a fraction of stake
pub const DEMO_PAYOUT_RATIO: f64 = 0.95;

/// Decimal places of simulated quotes
pub const DEMO_PIP_SIZE: u32 = 2;

#[derive(Debug, Clone)]
struct PendingProposal {
    contract_type: ContractType,
    stake: f64,
    duration: TradeDuration,
}

#[derive(Debug, Clone)]
struct OpenContract {
    id: u64,
    contract_type: ContractType,
    stake: f64,
    entry: Option<f64>,
    ticks_remaining: u32,
    watched: bool,
}

/// In-process stand-in for the broker
#[derive(Debug)]
pub struct MarketSimulator {
    rng: StdRng,
    quote: f64,
    epoch: i64,
    symbol: String,
    subscribed: bool,
    balance: f64,
    currency: String,
    proposals: HashMap<String, PendingProposal>,
    contracts: Vec<OpenContract>,
    next_contract_id: u64,
}

impl MarketSimulator {
    pub fn new(start_quote: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), start_quote)
    }

    /// Deterministic simulator for tests
    pub fn seeded(seed: u64, start_quote: f64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), start_quote)
    }

    fn with_rng(rng: StdRng, start_quote: f64) -> Self {
        Self {
            rng,
            quote: start_quote,
            epoch: chrono::Utc::now().timestamp(),
            symbol: String::new(),
            subscribed: false,
            balance: DEMO_BALANCE,
            currency: "USD".to_string(),
            proposals: HashMap::new(),
            contracts: Vec::new(),
            next_contract_id: 1,
        }
    }

    pub fn quote(&self) -> f64 {
        self.quote
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn open_contracts(&self) -> usize {
        self.contracts.len()
    }

    fn balance_event(&self) -> BrokerEvent {
        BrokerEvent::BalanceUpdated {
            balance: round2(self.balance),
            currency: self.currency.clone(),
        }
    }

    fn error(code: &str, message: &str, msg_type: &str) -> BrokerEvent {
        BrokerEvent::ErrorOccurred(ApiError {
            code: code.to_string(),
            message: message.to_string(),
            msg_type: Some(msg_type.to_string()),
        })
    }

    /// Answer one request the way the broker would
    pub fn handle_request(&mut self, request: &TransportRequest) -> Vec<BrokerEvent> {
        match request {
            TransportRequest::Authorize { .. } => vec![BrokerEvent::Authorized {
                balance: round2(self.balance),
                currency: self.currency.clone(),
            }],
            TransportRequest::SubscribeTicks { symbol } => {
                if self.subscribed && *symbol == self.symbol {
                    return vec![Self::error(
                        ALREADY_SUBSCRIBED,
                        &format!("You are already subscribed to {}", symbol),
                        "tick",
                    )];
                }
                self.symbol = symbol.clone();
                self.subscribed = true;
                Vec::new()
            }
            TransportRequest::UnsubscribeAll => {
                self.subscribed = false;
                Vec::new()
            }
            TransportRequest::RequestProposal(spec) => {
                if spec.stake < MIN_STAKE {
                    return vec![Self::error(
                        "ContractCreationFailure",
                        "Stake is below the minimum",
                        "proposal",
                    )];
                }
                let id = uuid::Uuid::new_v4().to_string();
                self.proposals.insert(
                    id.clone(),
                    PendingProposal {
                        contract_type: spec.contract_type,
                        stake: spec.stake,
                        duration: spec.duration,
                    },
                );
                vec![BrokerEvent::ProposalReceived {
                    id,
                    ask_price: spec.stake,
                }]
            }
            TransportRequest::ConfirmBuy { proposal_id, price } => {
                let Some(proposal) = self.proposals.remove(proposal_id) else {
                    return vec![Self::error("InvalidContractProposal", "Unknown proposal", "buy")];
                };
                if *price > self.balance {
                    return vec![Self::error("InsufficientBalance", "Insufficient balance", "buy")];
                }

                let id = self.next_contract_id;
                self.next_contract_id += 1;
                self.balance -= proposal.stake;
                self.contracts.push(OpenContract {
                    id,
                    contract_type: proposal.contract_type,
                    stake: proposal.stake,
                    entry: None,
                    ticks_remaining: duration_in_ticks(proposal.duration),
                    watched: false,
                });
                debug!("Demo contract {} opened", id);
                vec![BrokerEvent::BoughtConfirmed { contract_id: id }, self.balance_event()]
            }
            TransportRequest::SubscribeContract { contract_id } => {
                match self.contracts.iter_mut().find(|c| c.id == *contract_id) {
                    Some(contract) => {
                        contract.watched = true;
                        vec![BrokerEvent::ContractUpdated(ContractUpdate {
                            contract_id: Some(contract.id),
                            entry_spot: contract.entry,
                            ..Default::default()
                        })]
                    }
                    None => vec![Self::error("ContractNotFound", "Contract not found", "proposal_open_contract")],
                }
            }
            TransportRequest::RequestBalance { .. } => vec![self.balance_event()],
            TransportRequest::Ping => Vec::new(),
        }
    }

    /// Produce the next tick and settle any contracts that expire on it
    pub fn advance(&mut self) -> Vec<BrokerEvent> {
        let change: f64 = self.rng.gen_range(-1.0..1.0);
        let scale = 10f64.powi(DEMO_PIP_SIZE as i32);
        self.quote = ((self.quote + change).abs() * scale).round() / scale;
        self.epoch += 1;

        let mut events = Vec::new();
        if self.subscribed {
            events.push(BrokerEvent::TickReceived(RawTick {
                quote: self.quote,
                epoch: self.epoch,
                id: Some(format!("demo-{}", self.epoch)),
                pip_size: Some(DEMO_PIP_SIZE),
                symbol: Some(self.symbol.clone()),
            }));
        }

        let quote = self.quote;
        let mut settled_any = false;
        let mut remaining = Vec::with_capacity(self.contracts.len());

        for mut contract in std::mem::take(&mut self.contracts) {
            let Some(entry) = contract.entry else {
                // Entry spot is the first tick after purchase
                contract.entry = Some(quote);
                if contract.watched {
                    events.push(BrokerEvent::ContractUpdated(ContractUpdate {
                        contract_id: Some(contract.id),
                        entry_spot: Some(quote),
                        ..Default::default()
                    }));
                }
                remaining.push(contract);
                continue;
            };

            contract.ticks_remaining = contract.ticks_remaining.saturating_sub(1);
            if contract.ticks_remaining > 0 {
                remaining.push(contract);
                continue;
            }

            let won = match contract.contract_type {
                ContractType::Rise => quote > entry,
                ContractType::Fall => quote < entry,
            };
            let profit = if won {
                round2(contract.stake * DEMO_PAYOUT_RATIO)
            } else {
                -contract.stake
            };
            if won {
                self.balance += contract.stake + profit;
            }
            settled_any = true;
            debug!("Demo contract {} settled {:+.2}", contract.id, profit);

            if contract.watched {
                events.push(BrokerEvent::ContractUpdated(ContractUpdate {
                    contract_id: Some(contract.id),
                    entry_spot: Some(entry),
                    is_sold: true,
                    profit,
                    exit_tick: Some(quote),
                }));
            }
        }
        self.contracts = remaining;

        if settled_any {
            events.push(self.balance_event());
        }
        events
    }
}

/// Demo ticks arrive about once a second
fn duration_in_ticks(duration: TradeDuration) -> u32 {
    let ticks = match duration.unit {
        DurationUnit::Ticks => duration.value,
        DurationUnit::Seconds => duration.value,
        DurationUnit::Minutes => duration.value.saturating_mul(60),
    };
    ticks.max(1)
}
