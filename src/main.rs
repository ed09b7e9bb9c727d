use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use tick_sniper::api;
use tick_sniper::config::{find_market, FeedMode, SessionConfig};
use tick_sniper::streams::run_trading_session;
use tick_sniper::trading_core::{DurationUnit, PillarConfig, StrategyConfig, TradeDuration};
use tick_sniper::types::{AppState, ControlCommand, WsMessage};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Feed mode: demo simulator or live Deriv
    #[arg(short, long, value_enum, default_value = "demo", env = "TICK_SNIPER_MODE")]
    mode: FeedMode,

    /// Deriv application id
    #[arg(long, default_value = "1089", env = "DERIV_APP_ID")]
    app_id: String,

    /// Deriv API token (required to trade live)
    #[arg(long, env = "DERIV_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Market symbol
    #[arg(short, long, default_value = "R_10")]
    symbol: String,

    /// Port to run the web server on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Contract duration
    #[arg(long, default_value = "5")]
    duration: u32,

    /// Duration unit: ticks, seconds or minutes
    #[arg(long, default_value = "ticks")]
    duration_unit: DurationUnit,

    /// Base stake
    #[arg(long, default_value = "1.0")]
    base_stake: f64,

    /// Enable martingale stake progression
    #[arg(long)]
    martingale: bool,

    /// Martingale multiplier
    #[arg(long, default_value = "2.1")]
    multiplier: f64,

    /// Stake ceiling
    #[arg(long, default_value = "20.0")]
    max_stake: f64,

    /// Consecutive losses before the circuit breaker resets the stake
    #[arg(long, default_value = "9")]
    max_loss_streak: u32,

    /// Start with automated trading on
    #[arg(long)]
    auto_trade: bool,

    /// Alternate pillars after every settled trade
    #[arg(long)]
    rotation: bool,

    /// Disable the cycling pillar
    #[arg(long)]
    no_cycling: bool,

    /// Disable the pattern pillar
    #[arg(long)]
    no_pattern: bool,

    /// Append settled trades to this CSV file
    #[arg(long)]
    trade_log: Option<PathBuf>,

    /// Demo tick period in milliseconds
    #[arg(long, default_value = "1000")]
    demo_tick_ms: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            mode: self.mode,
            app_id: self.app_id.clone(),
            api_token: self.api_token.clone(),
            symbol: self.symbol.clone(),
            strategy: StrategyConfig {
                base_stake: self.base_stake,
                martingale_multiplier: self.multiplier,
                max_stake: self.max_stake,
                martingale_enabled: self.martingale,
                max_loss_streak: self.max_loss_streak,
            },
            duration: TradeDuration {
                value: self.duration,
                unit: self.duration_unit,
            },
            pillars: PillarConfig {
                cycling: !self.no_cycling,
                pattern: !self.no_pattern,
            },
            rotation: self.rotation,
            auto_trade: self.auto_trade,
            demo_tick_ms: self.demo_tick_ms,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tick_sniper=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if find_market(&args.symbol).is_none() {
        anyhow::bail!("Unknown market: {}", args.symbol);
    }

    info!("Starting Tick Sniper");
    info!("Mode: {}", args.mode);
    info!("Market: {}", args.symbol);
    info!("Port: {}", args.port);
    if args.mode == FeedMode::Live && args.api_token.is_none() {
        warn!("No DERIV_API_TOKEN set, ticks will stream but trading is disabled");
    }

    let (tx, _rx) = broadcast::channel::<WsMessage>(1000);
    let (cmd_tx, cmd_rx) = mpsc::channel::<ControlCommand>(100);

    let state = Arc::new(AppState {
        tx,
        commands: cmd_tx,
        snapshot: RwLock::new(None),
        mode: args.mode,
    });

    // Spawn trading session task
    let config = args.session_config();
    let trade_log = args.trade_log.clone();
    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = run_trading_session(config, state_clone, cmd_rx, trade_log).await {
            error!("Trading session error: {:#}", e);
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/snapshot", get(api::get_snapshot))
        .route("/api/trades", get(api::get_trades))
        .route("/api/weights", get(api::get_weights))
        .route("/api/markets", get(api::get_markets))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.tx.subscribe();

    // Greet with the current state
    let current = state.snapshot.read().await.clone();
    let symbol = current.as_ref().map(|s| s.symbol.clone()).unwrap_or_default();
    let mut greeting = vec![WsMessage::Connected {
        symbol,
        mode: state.mode,
    }];
    if let Some(snapshot) = current {
        greeting.push(WsMessage::Snapshot(Box::new(snapshot)));
    }
    for msg in greeting {
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
    }

    // Forward session updates to this client
    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    let Ok(json) = serde_json::to_string(&msg) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // A slow client skips stale snapshots
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Controls from the dashboard
    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            match serde_json::from_str::<ControlCommand>(&text) {
                Ok(command) => {
                    if state_clone.commands.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Ignoring control message: {}", e);
                    let _ = state_clone.tx.send(WsMessage::Error {
                        message: format!("Invalid control message: {}", e),
                    });
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("WebSocket client disconnected");
}
