//! Configuration for the trading session

use serde::{Deserialize, Serialize};

use crate::deriv::DEFAULT_APP_ID;
use crate::trading_core::engine::PillarConfig;
use crate::trading_core::state_machine::{StrategyConfig, TradeDuration};
use crate::trading_core::trader::{SessionSettings, DEFAULT_BOT_COOLDOWN_MS};

/// Where ticks and contract results come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// In-process market simulator
    Demo,
    /// Deriv WebSocket API
    Live,
}

impl Default for FeedMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Tradable synthetic index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Market {
    pub symbol: &'static str,
    pub name: &'static str,
}

pub const MARKETS: [Market; 6] = [
    Market { symbol: "R_10", name: "Volatility 10 Index" },
    Market { symbol: "R_25", name: "Volatility 25 Index" },
    Market { symbol: "R_50", name: "Volatility 50 Index" },
    Market { symbol: "R_75", name: "Volatility 75 Index" },
    Market { symbol: "R_100", name: "Volatility 100 Index" },
    Market { symbol: "stpRNG", name: "Step Index 100" },
];

pub fn find_market(symbol: &str) -> Option<&'static Market> {
    MARKETS.iter().find(|m| m.symbol == symbol)
}

/// Configuration for a trading session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Demo simulator or live Deriv feed
    pub mode: FeedMode,

    /// Deriv application id
    pub app_id: String,

    /// API token. Never serialized.
    #[serde(skip)]
    pub api_token: Option<String>,

    /// Market symbol (e.g., "R_10")
    pub symbol: String,

    /// Stake management
    pub strategy: StrategyConfig,

    /// Contract duration
    pub duration: TradeDuration,

    /// Pillars enabled outside rotation mode
    pub pillars: PillarConfig,

    /// Alternate pillars after every settlement
    pub rotation: bool,

    /// Trade automatically on signals
    pub auto_trade: bool,

    /// Minimum gap between automated trades (ms)
    pub bot_cooldown_ms: i64,

    /// Keep-alive ping period (s)
    pub keepalive_secs: u64,

    /// Reconnect watchdog period while automation is on (s)
    pub reconnect_secs: u64,

    /// Demo tick period (ms)
    pub demo_tick_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::Demo,
            app_id: DEFAULT_APP_ID.to_string(),
            api_token: None,
            symbol: MARKETS[0].symbol.to_string(),
            strategy: StrategyConfig::default(),
            duration: TradeDuration::default(),
            pillars: PillarConfig::default(),
            rotation: false,
            auto_trade: false,
            bot_cooldown_ms: DEFAULT_BOT_COOLDOWN_MS,
            keepalive_secs: 14,     // Deriv drops idle sockets after ~2 min
            reconnect_secs: 5,
            demo_tick_ms: 1000,     // Synthetic indices tick once a second
        }
    }
}

impl SessionConfig {
    /// Clamp values into a usable range
    pub fn sanitized(mut self) -> Self {
        self.strategy = self.strategy.sanitized();
        self.api_token = self.api_token.filter(|t| !t.trim().is_empty());
        self.bot_cooldown_ms = self.bot_cooldown_ms.max(0);
        self.keepalive_secs = self.keepalive_secs.max(1);
        self.reconnect_secs = self.reconnect_secs.max(1);
        self.demo_tick_ms = self.demo_tick_ms.max(10);
        self
    }

    /// Demo mode has an account without a real token
    pub fn effective_token(&self) -> Option<String> {
        match self.mode {
            FeedMode::Demo => Some(self.api_token.clone().unwrap_or_else(|| "demo".to_string())),
            FeedMode::Live => self.api_token.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            symbol: self.symbol.clone(),
            api_token: self.effective_token(),
            strategy: self.strategy.clone(),
            duration: self.duration,
            pillars: self.pillars,
            rotation: self.rotation,
            auto_trade: self.auto_trade,
            bot_cooldown_ms: self.bot_cooldown_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::state_machine::{DurationUnit, MIN_STAKE};

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.mode, FeedMode::Demo);
        assert_eq!(config.app_id, "1089");
        assert_eq!(config.symbol, "R_10");
        assert_eq!(config.strategy.base_stake, 1.0);
        assert_eq!(config.strategy.martingale_multiplier, 2.1);
        assert_eq!(config.strategy.max_stake, 20.0);
        assert!(!config.strategy.martingale_enabled);
        assert_eq!(config.strategy.max_loss_streak, 9);
        assert_eq!(config.duration.value, 5);
        assert_eq!(config.duration.unit, DurationUnit::Ticks);
        assert_eq!(config.keepalive_secs, 14);
    }

    #[test]
    fn test_sanitized() {
        let mut config = SessionConfig::default();
        config.strategy.base_stake = 0.0;
        config.api_token = Some("  ".to_string());
        config.bot_cooldown_ms = -5;

        let config = config.sanitized();
        assert_eq!(config.strategy.base_stake, MIN_STAKE);
        assert_eq!(config.api_token, None);
        assert_eq!(config.bot_cooldown_ms, 0);
    }

    #[test]
    fn test_demo_always_has_token() {
        let config = SessionConfig::default();
        assert_eq!(config.effective_token().as_deref(), Some("demo"));

        let live = SessionConfig {
            mode: FeedMode::Live,
            ..Default::default()
        };
        assert_eq!(live.effective_token(), None);
    }

    #[test]
    fn test_token_not_serialized() {
        let config = SessionConfig {
            api_token: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_markets() {
        assert_eq!(MARKETS.len(), 6);
        assert_eq!(find_market("stpRNG").unwrap().name, "Step Index 100");
        assert!(find_market("BTCUSD").is_none());
    }
}
