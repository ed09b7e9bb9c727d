//! Trade Lifecycle State Machine
//!
//! One contract at a time:
//! 1. IDLE - ready for a new trade
//! 2. PROPOSING - price proposal requested, waiting for a quote
//! 3. BUYING - proposal accepted, waiting for purchase confirmation
//! 4. RUNNING - contract open, waiting for settlement
//!
//! Any state returns to IDLE through `abort`. Settlement applies the stake
//! policy (flat or martingale) and the loss-streak circuit breaker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::{info, warn};

use super::patterns::{Direction, PatternId};
use super::transport::{ContractUpdate, ProposalSpec, TransportRequest};

/// Broker's minimum stake
pub const MIN_STAKE: f64 = 0.35;

/// Settled trades kept for display
pub const TRADE_HISTORY_CAPACITY: usize = 10;

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Rise,
    Fall,
}

impl ContractType {
    /// Broker contract code
    pub fn code(&self) -> &'static str {
        match self {
            ContractType::Rise => "CALL",
            ContractType::Fall => "PUT",
        }
    }
}

impl From<Direction> for ContractType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => ContractType::Rise,
            Direction::Down => ContractType::Fall,
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractType::Rise => write!(f, "RISE"),
            ContractType::Fall => write!(f, "FALL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Idle,
    Proposing,
    Buying,
    Running,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Idle => write!(f, "IDLE"),
            TradeStatus::Proposing => write!(f, "PROPOSING"),
            TradeStatus::Buying => write!(f, "BUYING"),
            TradeStatus::Running => write!(f, "RUNNING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Win,
    Loss,
    Pending,
}

impl std::fmt::Display for TradeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
            TradeResult::Pending => write!(f, "PENDING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Ticks,
    Seconds,
    Minutes,
}

impl DurationUnit {
    /// Broker duration code
    pub fn code(&self) -> &'static str {
        match self {
            DurationUnit::Ticks => "t",
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
        }
    }
}

impl FromStr for DurationUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t" | "tick" | "ticks" => Ok(DurationUnit::Ticks),
            "s" | "sec" | "seconds" => Ok(DurationUnit::Seconds),
            "m" | "min" | "minutes" => Ok(DurationUnit::Minutes),
            other => anyhow::bail!("unknown duration unit: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDuration {
    pub value: u32,
    pub unit: DurationUnit,
}

impl Default for TradeDuration {
    fn default() -> Self {
        Self {
            value: 5,
            unit: DurationUnit::Ticks,
        }
    }
}

impl std::fmt::Display for TradeDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit.code())
    }
}

/// Stake management settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub base_stake: f64,
    pub martingale_multiplier: f64,
    pub max_stake: f64,
    pub martingale_enabled: bool,
    /// Consecutive losses that trip the circuit breaker
    pub max_loss_streak: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            base_stake: 1.0,
            martingale_multiplier: 2.1,
            max_stake: 20.0,
            martingale_enabled: false,
            max_loss_streak: 9,
        }
    }
}

impl StrategyConfig {
    /// Clamp values into a usable range
    pub fn sanitized(mut self) -> Self {
        if !self.base_stake.is_finite() || self.base_stake < MIN_STAKE {
            self.base_stake = MIN_STAKE;
        }
        if !self.max_stake.is_finite() || self.max_stake < self.base_stake {
            self.max_stake = self.base_stake;
        }
        if !self.martingale_multiplier.is_finite() || self.martingale_multiplier <= 0.0 {
            self.martingale_multiplier = 1.0;
        }
        self
    }
}

/// Snapshot of the in-flight trade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeState {
    pub status: TradeStatus,
    #[serde(rename = "type")]
    pub contract_type: Option<ContractType>,
    pub entry_price: Option<f64>,
    /// Display-only countdown; settlement waits for the broker
    pub ticks_left: u32,
    pub result: Option<TradeResult>,
    /// Signal that triggered the trade; absent for manual trades
    pub pattern: Option<PatternId>,
    pub req_id: Option<u64>,
    pub contract_id: Option<u64>,
}

impl Default for TradeState {
    fn default() -> Self {
        Self::idle(None)
    }
}

impl TradeState {
    pub fn idle(result: Option<TradeResult>) -> Self {
        Self {
            status: TradeStatus::Idle,
            contract_type: None,
            entry_price: None,
            ticks_left: 0,
            result,
            pattern: None,
            req_id: None,
            contract_id: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == TradeStatus::Idle
    }
}

/// Settled trade as shown in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeHistoryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub contract_type: Option<ContractType>,
    pub entry: f64,
    pub exit: Option<f64>,
    pub result: TradeResult,
    pub profit: f64,
    pub pattern: Option<PatternId>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a settlement, routed by the session
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub pattern: Option<PatternId>,
    pub is_win: bool,
    pub profit: f64,
    pub breaker_tripped: bool,
    pub record: TradeHistoryItem,
}

/// Gate inputs for a trade request
#[derive(Debug, Clone, Copy)]
pub struct TradeContext<'a> {
    pub symbol: &'a str,
    pub currency: &'a str,
    pub connected: bool,
    pub authorized: bool,
}

/// Why a trade request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRejection {
    Busy(TradeStatus),
    Disconnected,
    Unauthorized,
}

impl std::fmt::Display for TradeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeRejection::Busy(status) => write!(f, "trade already in progress ({})", status),
            TradeRejection::Disconnected => write!(f, "not connected"),
            TradeRejection::Unauthorized => write!(f, "not authorized"),
        }
    }
}

/// Trade state machine with stake management
#[derive(Debug, Clone)]
pub struct TradeLifecycle {
    state: TradeState,
    strategy: StrategyConfig,
    current_stake: f64,
    consecutive_losses: u32,
    duration: TradeDuration,
    history: VecDeque<TradeHistoryItem>,
    /// Contract ids already settled, newest first
    recently_settled: VecDeque<u64>,
}

impl TradeLifecycle {
    pub fn new(strategy: StrategyConfig, duration: TradeDuration) -> Self {
        let strategy = strategy.sanitized();
        Self {
            current_stake: strategy.base_stake,
            state: TradeState::default(),
            strategy,
            consecutive_losses: 0,
            duration,
            history: VecDeque::with_capacity(TRADE_HISTORY_CAPACITY + 1),
            recently_settled: VecDeque::with_capacity(TRADE_HISTORY_CAPACITY + 1),
        }
    }

    pub fn state(&self) -> &TradeState {
        &self.state
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn duration(&self) -> TradeDuration {
        self.duration
    }

    pub fn current_stake(&self) -> f64 {
        self.current_stake
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    /// Newest first
    pub fn history(&self) -> impl Iterator<Item = &TradeHistoryItem> {
        self.history.iter()
    }

    /// Stake actually sent to the broker
    pub fn effective_stake(&self) -> f64 {
        round2(self.current_stake.max(MIN_STAKE))
    }

    pub fn set_strategy(&mut self, strategy: StrategyConfig) {
        let strategy = strategy.sanitized();
        let base_changed = strategy.base_stake != self.strategy.base_stake;
        if !strategy.martingale_enabled || base_changed {
            self.current_stake = strategy.base_stake;
        }
        self.strategy = strategy;
    }

    pub fn set_duration(&mut self, duration: TradeDuration) {
        self.duration = duration;
    }

    /// Start a trade. On success the returned proposal request must be sent.
    pub fn request_trade(
        &mut self,
        contract_type: ContractType,
        pattern: Option<PatternId>,
        ctx: TradeContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<TransportRequest, TradeRejection> {
        if !self.state.is_idle() {
            return Err(TradeRejection::Busy(self.state.status));
        }
        if !ctx.connected {
            return Err(TradeRejection::Disconnected);
        }
        if !ctx.authorized {
            return Err(TradeRejection::Unauthorized);
        }

        let req_id = now.timestamp_millis().max(0) as u64;
        let stake = self.effective_stake();

        self.state = TradeState {
            status: TradeStatus::Proposing,
            contract_type: Some(contract_type),
            entry_price: None,
            ticks_left: 0,
            result: Some(TradeResult::Pending),
            pattern,
            req_id: Some(req_id),
            contract_id: None,
        };

        info!(
            "Trade requested: {} {} stake {:.2} {} [{}]",
            contract_type,
            ctx.symbol,
            stake,
            self.duration,
            pattern.map(|p| p.label()).unwrap_or("MANUAL")
        );

        Ok(TransportRequest::RequestProposal(ProposalSpec {
            req_id,
            symbol: ctx.symbol.to_string(),
            contract_type,
            stake,
            duration: self.duration,
            currency: ctx.currency.to_string(),
        }))
    }

    pub fn on_proposal(&mut self, proposal_id: &str, ask_price: f64) -> Option<TransportRequest> {
        if self.state.status != TradeStatus::Proposing {
            return None;
        }
        self.state.status = TradeStatus::Buying;
        info!("Proposal {} @ {:.2}, buying", proposal_id, ask_price);
        Some(TransportRequest::ConfirmBuy {
            proposal_id: proposal_id.to_string(),
            price: ask_price,
        })
    }

    pub fn on_bought(&mut self, contract_id: u64, last_quote: Option<f64>) -> Option<TransportRequest> {
        if self.state.status != TradeStatus::Buying {
            return None;
        }
        self.state.status = TradeStatus::Running;
        self.state.contract_id = Some(contract_id);
        self.state.entry_price = last_quote;
        self.state.ticks_left = match self.duration.unit {
            DurationUnit::Ticks => self.duration.value,
            _ => 0,
        };
        info!("Contract {} running", contract_id);
        Some(TransportRequest::SubscribeContract { contract_id })
    }

    /// Countdown only; never settles
    pub fn on_tick(&mut self) {
        if self.state.status == TradeStatus::Running && self.state.ticks_left > 0 {
            self.state.ticks_left -= 1;
        }
    }

    pub fn on_contract_update(&mut self, update: &ContractUpdate, now: DateTime<Utc>) -> Option<Settlement> {
        // An update for another contract while running belongs to an aborted trade
        let foreign = match self.state.status {
            TradeStatus::Running => matches!(
                (update.contract_id, self.state.contract_id),
                (Some(incoming), Some(current)) if incoming != current
            ),
            TradeStatus::Idle => false,
            _ => return None,
        };

        if self.state.status == TradeStatus::Running && !foreign {
            if let Some(spot) = update.entry_spot {
                self.state.entry_price = Some(spot);
            }
        }

        if !update.is_sold {
            return None;
        }

        let contract_id = if foreign {
            update.contract_id
        } else {
            update.contract_id.or(self.state.contract_id)
        };
        if contract_id.is_some_and(|id| self.recently_settled.contains(&id)) {
            return None;
        }

        if foreign {
            info!("Late settlement for aborted contract {:?}", contract_id);
        }
        Some(self.settle(update, contract_id, foreign, now))
    }

    /// Record a settlement. A foreign settlement leaves the running trade alone.
    fn settle(
        &mut self,
        update: &ContractUpdate,
        contract_id: Option<u64>,
        foreign: bool,
        now: DateTime<Utc>,
    ) -> Settlement {
        let is_win = update.profit > 0.0;
        let result = if is_win { TradeResult::Win } else { TradeResult::Loss };
        let (pattern, contract_type, entry_estimate) = if foreign {
            (None, None, None)
        } else {
            (self.state.pattern, self.state.contract_type, self.state.entry_price)
        };

        let record = TradeHistoryItem {
            id: contract_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            contract_type,
            entry: update.entry_spot.or(entry_estimate).unwrap_or(0.0),
            exit: update.exit_tick,
            result,
            profit: update.profit,
            pattern,
            timestamp: now,
        };

        let breaker_tripped = self.apply_stake_policy(is_win);

        self.history.push_front(record.clone());
        self.history.truncate(TRADE_HISTORY_CAPACITY);
        if let Some(id) = contract_id {
            self.recently_settled.push_front(id);
            self.recently_settled.truncate(TRADE_HISTORY_CAPACITY);
        }
        if !foreign {
            self.state = TradeState::idle(Some(result));
        }

        info!(
            "Trade settled: {} {:+.2} | next stake {:.2} | loss streak {}",
            result, update.profit, self.current_stake, self.consecutive_losses
        );

        Settlement {
            pattern,
            is_win,
            profit: update.profit,
            breaker_tripped,
            record,
        }
    }

    /// Update the loss counter and next stake. Returns true when the circuit
    /// breaker fired.
    pub fn apply_stake_policy(&mut self, is_win: bool) -> bool {
        if is_win {
            self.consecutive_losses = 0;
        } else {
            self.consecutive_losses += 1;
        }

        if !is_win && self.consecutive_losses >= self.strategy.max_loss_streak {
            warn!(
                "Circuit breaker: {} consecutive losses, stake reset to {:.2}",
                self.consecutive_losses, self.strategy.base_stake
            );
            self.current_stake = self.strategy.base_stake;
            self.consecutive_losses = 0;
            return true;
        }

        self.current_stake = if self.strategy.martingale_enabled && !is_win {
            round2((self.current_stake * self.strategy.martingale_multiplier).min(self.strategy.max_stake))
        } else {
            self.strategy.base_stake
        };
        false
    }

    /// Force the trade back to idle as a loss. No-op when already idle.
    pub fn abort(&mut self, reason: &str) -> bool {
        if self.state.is_idle() {
            return false;
        }
        warn!("Trade aborted in {}: {}", self.state.status, reason);
        self.state = TradeState::idle(Some(TradeResult::Loss));
        true
    }
}
