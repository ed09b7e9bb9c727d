use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::config::FeedMode;
use crate::trading_core::{
    ContractType, DurationUnit, SessionSnapshot, StrategyConfig, TradeHistoryItem,
};

/// Server -> browser messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    Connected { symbol: String, mode: FeedMode },
    Snapshot(Box<SessionSnapshot>),
    TradeSettled(TradeHistoryItem),
    Error { message: String },
}

/// Browser -> server controls
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommand {
    Connect,
    Disconnect,
    SetAutoTrade { enabled: bool },
    SetPaused { paused: bool },
    SetMarket { symbol: String },
    Trade { direction: ContractType },
    SetPillars { cycling: bool, pattern: bool },
    SetRotation { enabled: bool },
    SetStrategy(StrategyConfig),
    SetDuration { value: i64, unit: DurationUnit },
    SetToken { token: Option<String> },
}

/// Shared application state
pub struct AppState {
    pub tx: broadcast::Sender<WsMessage>,
    pub commands: mpsc::Sender<ControlCommand>,
    pub snapshot: RwLock<Option<SessionSnapshot>>,
    pub mode: FeedMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_controls() {
        let cmd: ControlCommand = serde_json::from_str(r#"{"action":"trade","direction":"rise"}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Trade {
                direction: ContractType::Rise
            }
        );

        let cmd: ControlCommand =
            serde_json::from_str(r#"{"action":"set_duration","value":3,"unit":"minutes"}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::SetDuration {
                value: 3,
                unit: DurationUnit::Minutes
            }
        );

        let cmd: ControlCommand = serde_json::from_str(
            r#"{"action":"set_strategy","baseStake":2,"martingaleMultiplier":2,"maxStake":50,"martingaleEnabled":true,"maxLossStreak":4}"#,
        )
        .unwrap();
        match cmd {
            ControlCommand::SetStrategy(s) => {
                assert_eq!(s.base_stake, 2.0);
                assert!(s.martingale_enabled);
                assert_eq!(s.max_loss_streak, 4);
            }
            other => panic!("unexpected {:?}", other),
        }

        let cmd: ControlCommand = serde_json::from_str(r#"{"action":"connect"}"#).unwrap();
        assert_eq!(cmd, ControlCommand::Connect);
    }

    #[test]
    fn test_message_tagging() {
        let msg = WsMessage::Connected {
            symbol: "R_10".to_string(),
            mode: FeedMode::Demo,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"Connected","symbol":"R_10","mode":"demo"}"#);
    }
}
