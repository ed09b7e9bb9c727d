//! Trading Session
//!
//! Broker-agnostic orchestrator used by both the live Deriv feed and the demo
//! simulator. Every transport event goes through `handle_event`, which owns
//! the ordering: tick ingestion, signal analysis, automation, lifecycle and
//! settlement bookkeeping. Requests for the transport come back as values.
//!
//! This module contains no broker-specific code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::engine::{DecisionEngine, Pillar, PillarConfig, Scene};
use super::learning::WeightEntry;
use super::patterns::PatternId;
use super::state_machine::{
    ContractType, DurationUnit, Settlement, StrategyConfig, TradeContext, TradeDuration,
    TradeHistoryItem, TradeLifecycle, TradeRejection, TradeState,
};
use super::ticks::{last_digit, PriceColor, TickData, HISTORY_CAPACITY};
use super::transport::{ApiError, BrokerEvent, ContractUpdate, RawTick, TransportRequest};

/// Minimum gap between automated trades
pub const DEFAULT_BOT_COOLDOWN_MS: i64 = 4000;

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub symbol: String,
    pub api_token: Option<String>,
    pub strategy: StrategyConfig,
    pub duration: TradeDuration,
    pub pillars: PillarConfig,
    pub rotation: bool,
    pub auto_trade: bool,
    pub bot_cooldown_ms: i64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            symbol: "R_10".to_string(),
            api_token: None,
            strategy: StrategyConfig::default(),
            duration: TradeDuration::default(),
            pillars: PillarConfig::default(),
            rotation: false,
            auto_trade: false,
            bot_cooldown_ms: DEFAULT_BOT_COOLDOWN_MS,
        }
    }
}

/// Cumulative session statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_ticks: u64,
    pub green_ticks: u64,
    pub red_ticks: u64,
    pub even_digits: u64,
    pub odd_digits: u64,
    pub profit: f64,
    pub wins: u32,
    pub losses: u32,
    pub consecutive_losses: u32,
}

impl Stats {
    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            0.0
        } else {
            self.wins as f64 / total as f64 * 100.0
        }
    }
}

/// Transport link as seen by the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub connecting: bool,
    pub authorized: bool,
}

/// Result of handling one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOutput {
    pub requests: Vec<TransportRequest>,
    pub settled: Option<TradeHistoryItem>,
}

impl SessionOutput {
    fn requests(requests: Vec<TransportRequest>) -> Self {
        Self {
            requests,
            settled: None,
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

/// Everything the dashboard reads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub symbol: String,
    pub scene: Option<Scene>,
    pub trade: TradeState,
    pub stats: Stats,
    pub trade_history: Vec<TradeHistoryItem>,
    pub tick_history: Vec<TickData>,
    pub weights: Vec<WeightEntry>,
    pub pillars: PillarConfig,
    pub rotation: Option<Pillar>,
    pub auto_trade: bool,
    pub paused: bool,
    pub link: LinkStatus,
    pub balance: Option<f64>,
    pub currency: String,
    pub current_stake: f64,
    pub strategy: StrategyConfig,
    pub duration: TradeDuration,
}

/// Single owner of the engine and the trade lifecycle
#[derive(Debug)]
pub struct TradingSession {
    engine: DecisionEngine,
    lifecycle: TradeLifecycle,
    stats: Stats,
    ticks: VecDeque<TickData>,
    last_quote: Option<f64>,
    scene: Option<Scene>,
    link: LinkStatus,
    balance: Option<f64>,
    currency: String,
    symbol: String,
    api_token: Option<String>,
    auto_trade: bool,
    paused: bool,
    last_bot_trade: Option<DateTime<Utc>>,
    bot_cooldown_ms: i64,
}

impl TradingSession {
    pub fn new(settings: SessionSettings) -> Self {
        let mut engine = DecisionEngine::new(settings.pillars);
        engine.set_rotation(settings.rotation);

        Self {
            engine,
            lifecycle: TradeLifecycle::new(settings.strategy, settings.duration),
            stats: Stats::default(),
            ticks: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            last_quote: None,
            scene: None,
            link: LinkStatus::default(),
            balance: None,
            currency: "USD".to_string(),
            symbol: settings.symbol,
            api_token: settings.api_token.filter(|t| !t.trim().is_empty()),
            auto_trade: settings.auto_trade,
            paused: false,
            last_bot_trade: None,
            bot_cooldown_ms: settings.bot_cooldown_ms,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn lifecycle(&self) -> &TradeLifecycle {
        &self.lifecycle
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn link(&self) -> LinkStatus {
        self.link
    }

    pub fn balance(&self) -> Option<f64> {
        self.balance
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn auto_trade(&self) -> bool {
        self.auto_trade
    }

    /// Dispatch one transport event
    pub fn handle_event(&mut self, event: BrokerEvent, now: DateTime<Utc>) -> SessionOutput {
        match event {
            BrokerEvent::Connected => self.on_connected(),
            BrokerEvent::Disconnected { reason } => {
                info!("Disconnected: {}", reason);
                self.link = LinkStatus::default();
                self.balance = None;
                self.lifecycle.abort("connection lost");
                SessionOutput::none()
            }
            BrokerEvent::TransportError { message } => {
                warn!("Transport error: {}", message);
                self.link.connecting = false;
                self.lifecycle.abort("transport error");
                SessionOutput::none()
            }
            BrokerEvent::Authorized { balance, currency } => {
                info!("Authorized: balance {:.2} {}", balance, currency);
                self.link.authorized = true;
                self.balance = Some(balance);
                self.currency = currency;
                SessionOutput::requests(vec![
                    TransportRequest::RequestBalance { subscribe: true },
                    TransportRequest::UnsubscribeAll,
                    TransportRequest::SubscribeTicks {
                        symbol: self.symbol.clone(),
                    },
                ])
            }
            BrokerEvent::BalanceUpdated { balance, currency } => {
                self.balance = Some(balance);
                self.currency = currency;
                SessionOutput::none()
            }
            BrokerEvent::TickReceived(tick) => self.on_tick(tick, now),
            BrokerEvent::ProposalReceived { id, ask_price } => {
                SessionOutput::requests(self.lifecycle.on_proposal(&id, ask_price).into_iter().collect())
            }
            BrokerEvent::BoughtConfirmed { contract_id } => SessionOutput::requests(
                self.lifecycle
                    .on_bought(contract_id, self.last_quote)
                    .into_iter()
                    .collect(),
            ),
            BrokerEvent::ContractUpdated(update) => self.on_contract_update(&update, now),
            BrokerEvent::ErrorOccurred(error) => {
                self.on_api_error(&error);
                SessionOutput::none()
            }
        }
    }

    fn on_connected(&mut self) -> SessionOutput {
        self.link.connected = true;
        self.link.connecting = false;
        let request = match &self.api_token {
            Some(token) => TransportRequest::Authorize { token: token.clone() },
            None => {
                info!("No API token, streaming {} as guest", self.symbol);
                TransportRequest::SubscribeTicks {
                    symbol: self.symbol.clone(),
                }
            }
        };
        SessionOutput::requests(vec![request])
    }

    fn on_tick(&mut self, tick: RawTick, now: DateTime<Utc>) -> SessionOutput {
        let color = PriceColor::from_move(self.last_quote, tick.quote);
        self.last_quote = Some(tick.quote);

        if self.paused {
            return SessionOutput::none();
        }

        let digit = last_digit(tick.quote, tick.pip_size);
        self.ticks.push_front(TickData {
            id: tick.id.unwrap_or_else(|| tick.epoch.to_string()),
            quote: tick.quote,
            last_digit: digit,
            color,
            epoch: tick.epoch,
        });
        self.ticks.truncate(HISTORY_CAPACITY);

        self.engine.push_tick(digit, color);
        self.scene = self.engine.analyze();
        self.lifecycle.on_tick();

        let mut requests = Vec::new();
        if let Some(request) = self.maybe_auto_trade(now) {
            requests.push(request);
        }

        self.stats.total_ticks += 1;
        match color {
            PriceColor::Green => self.stats.green_ticks += 1,
            PriceColor::Red => self.stats.red_ticks += 1,
        }
        if digit % 2 == 0 {
            self.stats.even_digits += 1;
        } else {
            self.stats.odd_digits += 1;
        }

        SessionOutput::requests(requests)
    }

    fn maybe_auto_trade(&mut self, now: DateTime<Utc>) -> Option<TransportRequest> {
        if !self.auto_trade || !self.lifecycle.state().is_idle() {
            return None;
        }
        let scene = self.scene.as_ref()?;
        let decision = scene.decision?;
        let pattern = scene.pattern;

        if let Some(last) = self.last_bot_trade {
            if (now - last).num_milliseconds() < self.bot_cooldown_ms {
                return None;
            }
        }

        match self.request_trade(decision.into(), pattern, now) {
            Ok(request) => {
                self.last_bot_trade = Some(now);
                Some(request)
            }
            Err(reason) => {
                debug!("Auto trade skipped: {}", reason);
                None
            }
        }
    }

    fn request_trade(
        &mut self,
        contract_type: ContractType,
        pattern: Option<PatternId>,
        now: DateTime<Utc>,
    ) -> Result<TransportRequest, TradeRejection> {
        let ctx = TradeContext {
            symbol: &self.symbol,
            currency: &self.currency,
            connected: self.link.connected,
            authorized: self.link.authorized,
        };
        self.lifecycle.request_trade(contract_type, pattern, ctx, now)
    }

    fn on_contract_update(&mut self, update: &ContractUpdate, now: DateTime<Utc>) -> SessionOutput {
        let Some(settlement) = self.lifecycle.on_contract_update(update, now) else {
            return SessionOutput::none();
        };
        self.record_settlement(&settlement);

        SessionOutput {
            requests: vec![TransportRequest::RequestBalance { subscribe: false }],
            settled: Some(settlement.record),
        }
    }

    fn record_settlement(&mut self, settlement: &Settlement) {
        if let Some(pattern) = settlement.pattern {
            self.engine.report_result(pattern, settlement.is_win);
        }
        if self.engine.rotation_enabled() {
            self.engine.advance_rotation();
        }

        self.stats.profit += settlement.profit;
        if settlement.is_win {
            self.stats.wins += 1;
        } else {
            self.stats.losses += 1;
        }
        self.stats.consecutive_losses = self.lifecycle.consecutive_losses();

        if settlement.breaker_tripped {
            warn!("Loss streak limit reached, stake back to base");
        }
    }

    fn on_api_error(&mut self, error: &ApiError) {
        warn!(
            "Broker error [{}] {}{}",
            error.code,
            error.message,
            error.msg_type.as_deref().map(|t| format!(" ({})", t)).unwrap_or_default()
        );

        if error.is_authorization_failure() {
            self.link.authorized = false;
            self.balance = None;
        }
        if !error.is_already_subscribed() {
            self.lifecycle.abort(&error.message);
        }
    }

    // ========================================================================
    // Operator controls
    // ========================================================================

    /// Trade on operator request. Manual trades carry no pattern.
    pub fn manual_trade(&mut self, contract_type: ContractType, now: DateTime<Utc>) -> Option<TransportRequest> {
        match self.request_trade(contract_type, None, now) {
            Ok(request) => Some(request),
            Err(reason) => {
                warn!("Manual trade rejected: {}", reason);
                None
            }
        }
    }

    /// Switch market, resubscribing when connected
    pub fn set_symbol(&mut self, symbol: &str) -> Vec<TransportRequest> {
        if symbol == self.symbol {
            return Vec::new();
        }
        info!("Market {} -> {}", self.symbol, symbol);
        self.symbol = symbol.to_string();
        self.ticks.clear();
        self.last_quote = None;
        self.engine.reset_history();
        self.scene = None;

        if !self.link.connected {
            return Vec::new();
        }
        vec![
            TransportRequest::UnsubscribeAll,
            TransportRequest::SubscribeTicks {
                symbol: self.symbol.clone(),
            },
        ]
    }

    pub fn set_auto_trade(&mut self, enabled: bool) {
        if enabled != self.auto_trade {
            info!("Auto trade {}", if enabled { "ON" } else { "OFF" });
        }
        self.auto_trade = enabled;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_pillars(&mut self, config: PillarConfig) {
        if !self.engine.set_pillars(config) {
            debug!("Pillar change ignored while rotation is active");
        }
    }

    pub fn set_rotation(&mut self, enabled: bool) {
        self.engine.set_rotation(enabled);
    }

    pub fn set_strategy(&mut self, strategy: StrategyConfig) {
        self.lifecycle.set_strategy(strategy);
    }

    /// Negative values are clamped to zero
    pub fn set_duration(&mut self, value: i64, unit: DurationUnit) {
        let value = value.clamp(0, u32::MAX as i64) as u32;
        self.lifecycle.set_duration(TradeDuration { value, unit });
    }

    /// Replace the API token. Takes effect on the next connection.
    pub fn set_token(&mut self, token: Option<String>) {
        self.api_token = token.filter(|t| !t.trim().is_empty());
    }

    pub fn mark_connecting(&mut self) {
        self.link.connecting = true;
    }

    /// Automation wants a link and none is up or pending
    pub fn needs_reconnect(&self) -> bool {
        self.auto_trade && !self.link.connected && !self.link.connecting
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            symbol: self.symbol.clone(),
            scene: self.scene.clone(),
            trade: self.lifecycle.state().clone(),
            stats: self.stats.clone(),
            trade_history: self.lifecycle.history().cloned().collect(),
            tick_history: self.ticks.iter().cloned().collect(),
            weights: self.engine.weights().snapshot(),
            pillars: self.engine.active_pillars(),
            rotation: self.engine.active_rotation_pillar(),
            auto_trade: self.auto_trade,
            paused: self.paused,
            link: self.link,
            balance: self.balance,
            currency: self.currency.clone(),
            current_stake: self.lifecycle.current_stake(),
            strategy: self.lifecycle.strategy().clone(),
            duration: self.lifecycle.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::state_machine::{TradeResult, TradeStatus};
    use chrono::Duration;

    fn tick(quote: f64) -> BrokerEvent {
        BrokerEvent::TickReceived(RawTick {
            quote,
            epoch: 1_700_000_000,
            id: None,
            pip_size: Some(2),
            symbol: Some("R_10".to_string()),
        })
    }

    fn authorized_session(settings: SessionSettings) -> TradingSession {
        let mut session = TradingSession::new(SessionSettings {
            api_token: Some("token".to_string()),
            ..settings
        });
        let now = Utc::now();
        session.handle_event(BrokerEvent::Connected, now);
        session.handle_event(
            BrokerEvent::Authorized {
                balance: 1000.0,
                currency: "USD".to_string(),
            },
            now,
        );
        session
    }

    /// Quotes whose last digits/colours end in (7,G)(9,G)(6,R)(8,R), which
    /// the pattern pillar reads as DOWN.
    const PATTERN_QUOTES: [f64; 6] = [100.01, 100.03, 100.07, 100.09, 100.06, 99.98];

    fn run_to_running(session: &mut TradingSession, now: DateTime<Utc>) -> u64 {
        let req = session.manual_trade(ContractType::Rise, now).unwrap();
        assert!(matches!(req, TransportRequest::RequestProposal(_)));
        session.handle_event(
            BrokerEvent::ProposalReceived {
                id: "p".to_string(),
                ask_price: 1.0,
            },
            now,
        );
        session.handle_event(BrokerEvent::BoughtConfirmed { contract_id: 77 }, now);
        assert_eq!(session.lifecycle().state().status, TradeStatus::Running);
        77
    }

    #[test]
    fn test_connect_with_and_without_token() {
        let mut guest = TradingSession::new(SessionSettings::default());
        let out = guest.handle_event(BrokerEvent::Connected, Utc::now());
        assert_eq!(
            out.requests,
            vec![TransportRequest::SubscribeTicks {
                symbol: "R_10".to_string()
            }]
        );

        let mut user = TradingSession::new(SessionSettings {
            api_token: Some("abc".to_string()),
            ..Default::default()
        });
        let out = user.handle_event(BrokerEvent::Connected, Utc::now());
        assert_eq!(
            out.requests,
            vec![TransportRequest::Authorize {
                token: "abc".to_string()
            }]
        );
    }

    #[test]
    fn test_authorize_resubscribes() {
        let mut session = TradingSession::new(SessionSettings::default());
        let out = session.handle_event(
            BrokerEvent::Authorized {
                balance: 50.0,
                currency: "EUR".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(out.requests.len(), 3);
        assert_eq!(out.requests[0], TransportRequest::RequestBalance { subscribe: true });
        assert_eq!(out.requests[1], TransportRequest::UnsubscribeAll);
        assert!(session.link().authorized);
        assert_eq!(session.balance(), Some(50.0));
    }

    #[test]
    fn test_ticks_update_stats_and_scene() {
        let mut session = TradingSession::new(SessionSettings::default());
        for q in PATTERN_QUOTES {
            session.handle_event(tick(q), Utc::now());
        }

        let stats = session.stats();
        assert_eq!(stats.total_ticks, 6);
        assert_eq!(stats.green_ticks, 4);
        assert_eq!(stats.red_ticks, 2);
        assert_eq!(stats.odd_digits, 4);
        assert_eq!(stats.even_digits, 2);

        let scene = session.scene().unwrap();
        assert_eq!(scene.pattern, Some(PatternId::GreenOddUpRedEvenUp));
        assert_eq!(session.snapshot().tick_history[0].last_digit, 8);
    }

    #[test]
    fn test_paused_ticks_only_track_colour() {
        let mut session = TradingSession::new(SessionSettings::default());
        session.set_paused(true);
        session.handle_event(tick(100.0), Utc::now());
        assert_eq!(session.stats().total_ticks, 0);

        session.set_paused(false);
        session.handle_event(tick(99.0), Utc::now());
        // Colour compares against the quote seen while paused
        assert_eq!(session.stats().red_ticks, 1);
    }

    #[test]
    fn test_auto_trade_fires_with_pattern() {
        let mut session = authorized_session(SessionSettings {
            auto_trade: true,
            ..Default::default()
        });
        let now = Utc::now();
        let mut requests = Vec::new();
        for q in PATTERN_QUOTES {
            requests.extend(session.handle_event(tick(q), now).requests);
        }

        let proposal = requests
            .iter()
            .find_map(|r| match r {
                TransportRequest::RequestProposal(spec) => Some(spec.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(proposal.contract_type, ContractType::Fall);
        assert_eq!(session.lifecycle().state().pattern, Some(PatternId::GreenOddUpRedEvenUp));
    }

    #[test]
    fn test_auto_trade_respects_cooldown() {
        let mut session = authorized_session(SessionSettings {
            auto_trade: true,
            pillars: PillarConfig {
                cycling: true,
                pattern: false,
            },
            ..Default::default()
        });
        let t0 = Utc::now();
        for q in [100.01, 100.02, 100.03, 100.04, 100.05] {
            session.handle_event(tick(q), t0);
        }
        assert_eq!(session.lifecycle().state().status, TradeStatus::Proposing);
        session.lifecycle.abort("test");

        // Still inside the cooldown
        let out = session.handle_event(tick(100.07), t0 + Duration::milliseconds(1000));
        assert!(out.requests.is_empty());

        let out = session.handle_event(tick(100.09), t0 + Duration::milliseconds(4000));
        assert_eq!(out.requests.len(), 1);
    }

    #[test]
    fn test_manual_trade_requires_auth() {
        let mut session = TradingSession::new(SessionSettings::default());
        session.handle_event(BrokerEvent::Connected, Utc::now());
        assert!(session.manual_trade(ContractType::Rise, Utc::now()).is_none());
        assert!(session.lifecycle().state().is_idle());
        assert_eq!(session.lifecycle().state().result, None);
    }

    #[test]
    fn test_disconnect_aborts_once() {
        let mut session = authorized_session(SessionSettings::default());
        run_to_running(&mut session, Utc::now());

        let reason = "socket closed".to_string();
        session.handle_event(BrokerEvent::Disconnected { reason: reason.clone() }, Utc::now());
        let state = session.lifecycle().state().clone();
        assert_eq!(state.status, TradeStatus::Idle);
        assert_eq!(state.result, Some(TradeResult::Loss));
        assert!(!session.link().connected);
        assert_eq!(session.balance(), None);

        session.handle_event(BrokerEvent::Disconnected { reason }, Utc::now());
        assert_eq!(session.lifecycle().state(), &state);
        // Aborts do not count as settled trades
        assert_eq!(session.stats().losses, 0);
    }

    #[test]
    fn test_transport_error_aborts_running_trade() {
        let mut session = authorized_session(SessionSettings::default());
        run_to_running(&mut session, Utc::now());
        let stats = session.stats().clone();

        let output = session.handle_event(
            BrokerEvent::TransportError {
                message: "connection reset".to_string(),
            },
            Utc::now(),
        );
        assert!(output.requests.is_empty());
        assert_eq!(output.settled, None);

        let state = session.lifecycle().state();
        assert_eq!(state.status, TradeStatus::Idle);
        assert_eq!(state.result, Some(TradeResult::Loss));
        assert!(!session.link().connecting);
        assert_eq!(session.stats(), &stats);
        assert!(session.lifecycle().history().next().is_none());
    }

    #[test]
    fn test_settlement_updates_stats_weights_and_rotation() {
        let mut session = authorized_session(SessionSettings {
            rotation: true,
            ..Default::default()
        });
        let now = Utc::now();
        session.lifecycle.request_trade(
            ContractType::Rise,
            Some(PatternId::CyclingGreenOddStepUp),
            TradeContext {
                symbol: "R_10",
                currency: "USD",
                connected: true,
                authorized: true,
            },
            now,
        )
        .unwrap();
        session.handle_event(
            BrokerEvent::ProposalReceived {
                id: "p".to_string(),
                ask_price: 1.0,
            },
            now,
        );
        session.handle_event(BrokerEvent::BoughtConfirmed { contract_id: 5 }, now);

        let out = session.handle_event(
            BrokerEvent::ContractUpdated(ContractUpdate {
                contract_id: Some(5),
                entry_spot: Some(100.0),
                is_sold: true,
                profit: 0.95,
                exit_tick: Some(100.5),
            }),
            now,
        );
        assert_eq!(out.requests, vec![TransportRequest::RequestBalance { subscribe: false }]);
        assert_eq!(out.settled.unwrap().result, TradeResult::Win);

        assert_eq!(session.stats().wins, 1);
        assert!((session.stats().profit - 0.95).abs() < 1e-9);
        assert!((session.engine().weights().weight(PatternId::CyclingGreenOddStepUp) - 1.1).abs() < 1e-9);
        assert_eq!(session.snapshot().rotation, Some(Pillar::Pattern));
    }

    #[test]
    fn test_manual_settlement_leaves_weights() {
        let mut session = authorized_session(SessionSettings::default());
        let now = Utc::now();
        run_to_running(&mut session, now);
        session.handle_event(
            BrokerEvent::ContractUpdated(ContractUpdate {
                contract_id: Some(77),
                is_sold: true,
                profit: -1.0,
                ..Default::default()
            }),
            now,
        );
        assert_eq!(session.stats().losses, 1);
        assert_eq!(session.stats().consecutive_losses, 1);
        assert!(session
            .engine()
            .weights()
            .snapshot()
            .iter()
            .all(|w| w.weight == 1.0));
    }

    #[test]
    fn test_api_errors() {
        let mut session = authorized_session(SessionSettings::default());
        let now = Utc::now();
        session.manual_trade(ContractType::Fall, now).unwrap();

        session.handle_event(
            BrokerEvent::ErrorOccurred(ApiError {
                code: "AlreadySubscribed".to_string(),
                message: "already subscribed".to_string(),
                msg_type: Some("ticks".to_string()),
            }),
            now,
        );
        assert_eq!(session.lifecycle().state().status, TradeStatus::Proposing);

        session.handle_event(
            BrokerEvent::ErrorOccurred(ApiError {
                code: "InsufficientBalance".to_string(),
                message: "no money".to_string(),
                msg_type: Some("buy".to_string()),
            }),
            now,
        );
        assert!(session.lifecycle().state().is_idle());
        assert!(session.link().authorized);

        session.handle_event(
            BrokerEvent::ErrorOccurred(ApiError {
                code: "InvalidToken".to_string(),
                message: "bad token".to_string(),
                msg_type: Some("authorize".to_string()),
            }),
            now,
        );
        assert!(!session.link().authorized);
        assert_eq!(session.balance(), None);
    }

    #[test]
    fn test_set_symbol() {
        let mut session = TradingSession::new(SessionSettings::default());
        assert!(session.set_symbol("R_50").is_empty());
        assert_eq!(session.symbol(), "R_50");

        session.handle_event(BrokerEvent::Connected, Utc::now());
        let requests = session.set_symbol("R_100");
        assert_eq!(
            requests,
            vec![
                TransportRequest::UnsubscribeAll,
                TransportRequest::SubscribeTicks {
                    symbol: "R_100".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_set_symbol_starts_fresh_history() {
        let mut session = authorized_session(SessionSettings::default());
        for q in PATTERN_QUOTES {
            session.handle_event(tick(q), Utc::now());
        }
        assert_eq!(session.engine().history().len(), 6);
        assert!(session.scene().is_some());

        session.set_symbol("R_25");
        assert!(session.engine().history().is_empty());
        assert!(session.scene().is_none());
        assert!(session.snapshot().tick_history.is_empty());

        session.handle_event(tick(250.31), Utc::now());
        assert_eq!(session.engine().history().len(), 1);
        assert_eq!(session.snapshot().tick_history.len(), 1);
        assert!(session.scene().is_none());
    }

    #[test]
    fn test_needs_reconnect() {
        let mut session = TradingSession::new(SessionSettings::default());
        assert!(!session.needs_reconnect());
        session.set_auto_trade(true);
        assert!(session.needs_reconnect());
        session.mark_connecting();
        assert!(!session.needs_reconnect());
        session.handle_event(BrokerEvent::Connected, Utc::now());
        assert!(!session.needs_reconnect());
    }

    #[test]
    fn test_set_duration_clamps() {
        let mut session = TradingSession::new(SessionSettings::default());
        session.set_duration(-3, DurationUnit::Ticks);
        assert_eq!(session.lifecycle().duration().value, 0);
    }
}
