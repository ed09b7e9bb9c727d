use anyhow::Result;
use chrono::Utc;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::trade_log::TradeLogger;
use crate::config::{find_market, SessionConfig};
use crate::deriv::DerivConnection;
use crate::trading_core::{
    BrokerEvent, PillarConfig, SessionOutput, TradingSession, TransportRequest,
};
use crate::types::{AppState, ControlCommand, WsMessage};

/// Drive one trading session until the command channel closes.
///
/// Owns the session and the connection; broker events, operator commands,
/// keep-alive pings and the reconnect watchdog are processed one at a time.
pub async fn run_trading_session(
    config: SessionConfig,
    state: Arc<AppState>,
    mut commands: mpsc::Receiver<ControlCommand>,
    trade_log: Option<PathBuf>,
) -> Result<()> {
    let config = config.sanitized();
    let mut session = TradingSession::new(config.session_settings());
    let mut connection = DerivConnection::new(
        config.mode,
        config.app_id.clone(),
        Duration::from_millis(config.demo_tick_ms),
    );

    let mut logger = match trade_log {
        Some(path) => match TradeLogger::new(&path) {
            Ok(logger) => {
                info!("Logging trades to {}", path.display());
                Some(logger)
            }
            Err(e) => {
                warn!("Trade log disabled: {:#}", e);
                None
            }
        },
        None => None,
    };

    info!(
        "Session starting: {} mode, {} ({}), stake {:.2}, auto trade {}",
        config.mode,
        config.symbol,
        find_market(&config.symbol).map(|m| m.name).unwrap_or("unknown market"),
        config.strategy.base_stake,
        if config.auto_trade { "ON" } else { "OFF" }
    );

    open_connection(&mut session, &mut connection).await;
    publish(&state, &session).await;

    let mut keepalive = tokio::time::interval(Duration::from_secs(config.keepalive_secs));
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut watchdog = tokio::time::interval(Duration::from_secs(config.reconnect_secs));
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(event) = connection.next_event() => {
                if matches!(event, BrokerEvent::Disconnected { .. }) {
                    connection.mark_disconnected();
                }
                let output = session.handle_event(event, Utc::now());
                apply_output(output, &mut session, &mut connection, &state, logger.as_mut()).await;
                publish(&state, &session).await;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("Command channel closed, stopping session");
                    break;
                };
                handle_command(command, &mut session, &mut connection, &state, logger.as_mut()).await;
                publish(&state, &session).await;
            }
            _ = keepalive.tick() => {
                if connection.is_connected() {
                    dispatch(vec![TransportRequest::Ping], &mut session, &mut connection).await;
                }
            }
            _ = watchdog.tick() => {
                if session.needs_reconnect() {
                    info!("Watchdog: automation on but link down, reconnecting");
                    open_connection(&mut session, &mut connection).await;
                    publish(&state, &session).await;
                }
            }
        }
    }

    connection.disconnect().await?;
    Ok(())
}

async fn open_connection(session: &mut TradingSession, connection: &mut DerivConnection) {
    session.mark_connecting();
    if let Err(e) = connection.connect().await {
        error!("Connection failed: {:#}", e);
        let output = session.handle_event(
            BrokerEvent::TransportError {
                message: format!("{:#}", e),
            },
            Utc::now(),
        );
        dispatch(output.requests, session, connection).await;
    }
}

/// Send requests; a failed send is reported back to the session as a
/// transport error.
async fn dispatch(
    requests: Vec<TransportRequest>,
    session: &mut TradingSession,
    connection: &mut DerivConnection,
) {
    for request in requests {
        if let Err(e) = connection.send(&request).await {
            warn!("{:#}", e);
            session.handle_event(
                BrokerEvent::TransportError {
                    message: format!("{:#}", e),
                },
                Utc::now(),
            );
            break;
        }
    }
}

async fn apply_output(
    output: SessionOutput,
    session: &mut TradingSession,
    connection: &mut DerivConnection,
    state: &AppState,
    logger: Option<&mut TradeLogger>,
) {
    if let Some(trade) = output.settled {
        if let Some(logger) = logger {
            if let Err(e) = logger.log(&trade) {
                warn!("Failed to log trade: {:#}", e);
            }
        }
        let _ = state.tx.send(WsMessage::TradeSettled(trade));
    }
    dispatch(output.requests, session, connection).await;
}

async fn handle_command(
    command: ControlCommand,
    session: &mut TradingSession,
    connection: &mut DerivConnection,
    state: &AppState,
    logger: Option<&mut TradeLogger>,
) {
    let requests = match command {
        ControlCommand::Connect => {
            if !connection.is_connected() {
                open_connection(session, connection).await;
            }
            Vec::new()
        }
        ControlCommand::Disconnect => {
            if let Err(e) = connection.disconnect().await {
                warn!("Disconnect failed: {:#}", e);
            }
            Vec::new()
        }
        ControlCommand::SetAutoTrade { enabled } => {
            session.set_auto_trade(enabled);
            Vec::new()
        }
        ControlCommand::SetPaused { paused } => {
            session.set_paused(paused);
            Vec::new()
        }
        ControlCommand::SetMarket { symbol } => {
            if find_market(&symbol).is_none() {
                let _ = state.tx.send(WsMessage::Error {
                    message: format!("Unknown market: {}", symbol),
                });
                return;
            }
            session.set_symbol(&symbol)
        }
        ControlCommand::Trade { direction } => session
            .manual_trade(direction, Utc::now())
            .into_iter()
            .collect(),
        ControlCommand::SetPillars { cycling, pattern } => {
            session.set_pillars(PillarConfig { cycling, pattern });
            Vec::new()
        }
        ControlCommand::SetRotation { enabled } => {
            session.set_rotation(enabled);
            Vec::new()
        }
        ControlCommand::SetStrategy(strategy) => {
            session.set_strategy(strategy);
            Vec::new()
        }
        ControlCommand::SetDuration { value, unit } => {
            session.set_duration(value, unit);
            Vec::new()
        }
        ControlCommand::SetToken { token } => {
            session.set_token(token);
            Vec::new()
        }
    };

    apply_output(
        SessionOutput {
            requests,
            settled: None,
        },
        session,
        connection,
        state,
        logger,
    )
    .await;
}

async fn publish(state: &AppState, session: &TradingSession) {
    let snapshot = session.snapshot();
    *state.snapshot.write().await = Some(snapshot.clone());
    // No receivers is fine
    let _ = state.tx.send(WsMessage::Snapshot(Box::new(snapshot)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedMode;
    use tokio::sync::{broadcast, RwLock};

    fn app_state() -> (Arc<AppState>, mpsc::Receiver<ControlCommand>) {
        let (tx, _rx) = broadcast::channel(100);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let state = Arc::new(AppState {
            tx,
            commands: cmd_tx,
            snapshot: RwLock::new(None),
            mode: FeedMode::Demo,
        });
        (state, cmd_rx)
    }

    #[tokio::test]
    async fn test_demo_session_streams_ticks() {
        let (state, cmd_rx) = app_state();
        let config = SessionConfig {
            demo_tick_ms: 10,
            ..Default::default()
        };

        let runner = tokio::spawn(run_trading_session(config, state.clone(), cmd_rx, None));

        let mut ticks = 0;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(snapshot) = state.snapshot.read().await.as_ref() {
                ticks = snapshot.stats.total_ticks;
                if ticks >= 5 {
                    assert!(snapshot.link.connected);
                    assert!(snapshot.link.authorized);
                    break;
                }
            }
        }
        assert!(ticks >= 5, "expected demo ticks, got {}", ticks);
        runner.abort();
    }

    #[tokio::test]
    async fn test_manual_trade_through_commands() {
        let (state, cmd_rx) = app_state();
        let config = SessionConfig {
            demo_tick_ms: 10,
            duration: crate::trading_core::TradeDuration {
                value: 1,
                unit: crate::trading_core::DurationUnit::Ticks,
            },
            ..Default::default()
        };
        let mut updates = state.tx.subscribe();
        let runner = tokio::spawn(run_trading_session(config, state.clone(), cmd_rx, None));

        // Wait until authorized
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let ready = state
                .snapshot
                .read()
                .await
                .as_ref()
                .map(|s| s.link.authorized)
                .unwrap_or(false);
            if ready {
                break;
            }
        }

        state
            .commands
            .send(ControlCommand::Trade {
                direction: crate::trading_core::ContractType::Rise,
            })
            .await
            .unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match updates.recv().await {
                    Ok(WsMessage::TradeSettled(trade)) => return trade,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("feed closed: {}", e),
                }
            }
        })
        .await
        .expect("trade should settle");

        assert_eq!(settled.pattern, None);
        runner.abort();
    }
}
