//! Deriv WebSocket connection management
//!
//! Owns the socket (or the demo simulator), allocates request ids and turns
//! inbound frames into `BrokerEvent`s on a channel the session loop drains.

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::models::{decode_event, encode_request};
use super::simulator::MarketSimulator;
use crate::config::FeedMode;
use crate::trading_core::transport::{BrokerEvent, TransportRequest};

/// Deriv public WebSocket endpoint
pub const DERIV_WS_URL: &str = "wss://ws.derivws.com/websockets/v3";

/// Public demo application id
pub const DEFAULT_APP_ID: &str = "1089";

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Starting quote for demo ticks
const DEMO_START_QUOTE: f64 = 1000.0;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Build the endpoint URL for an application id
pub fn endpoint_url(app_id: &str) -> Result<Url> {
    Url::parse_with_params(DERIV_WS_URL, &[("app_id", app_id)]).context("Invalid Deriv endpoint URL")
}

/// Deriv connection wrapper. In demo mode requests are answered by a
/// `MarketSimulator` instead of the network.
pub struct DerivConnection {
    mode: FeedMode,
    app_id: String,
    demo_tick_interval: Duration,
    state: ConnectionState,
    event_tx: mpsc::Sender<BrokerEvent>,
    event_rx: mpsc::Receiver<BrokerEvent>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    tasks: Vec<JoinHandle<()>>,
    simulator: Option<Arc<Mutex<MarketSimulator>>>,
    req_counter: u64,
}

impl DerivConnection {
    pub fn new(mode: FeedMode, app_id: impl Into<String>, demo_tick_interval: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);

        Self {
            mode,
            app_id: app_id.into(),
            demo_tick_interval,
            state: ConnectionState::Disconnected,
            event_tx,
            event_rx,
            outbound: None,
            tasks: Vec::new(),
            simulator: None,
            req_counter: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    fn next_req_id(&mut self) -> u64 {
        self.req_counter += 1;
        self.req_counter
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outbound = None;
    }

    /// Open the connection. Emits `Connected` on success.
    pub async fn connect(&mut self) -> Result<()> {
        self.stop_tasks();
        self.state = ConnectionState::Connecting;

        let result = match self.mode {
            FeedMode::Demo => self.start_demo(),
            FeedMode::Live => self.start_live().await,
        };
        if let Err(e) = result {
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }

        self.state = ConnectionState::Connected;
        let _ = self.event_tx.send(BrokerEvent::Connected).await;
        Ok(())
    }

    fn start_demo(&mut self) -> Result<()> {
        info!("Demo mode - ticks from the market simulator");
        let simulator = self
            .simulator
            .get_or_insert_with(|| Arc::new(Mutex::new(MarketSimulator::new(DEMO_START_QUOTE))))
            .clone();
        let tx = self.event_tx.clone();
        let period = self.demo_tick_interval;

        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let events = simulator.lock().await.advance();
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn start_live(&mut self) -> Result<()> {
        let url = endpoint_url(&self.app_id)?;
        info!("Connecting to Deriv at {}...", url);

        let (ws_stream, _) = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            connect_async(url.as_str()),
        )
        .await
        .context("Deriv connection timed out")?
        .context("Failed to connect to Deriv")?;

        info!("Connected to Deriv");
        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!("Deriv send failed: {}", e);
                    break;
                }
            }
        });

        let tx = self.event_tx.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match decode_event(&text) {
                        Ok(Some(event)) => {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Dropping frame: {:#}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = tx
                            .send(BrokerEvent::TransportError {
                                message: e.to_string(),
                            })
                            .await;
                        break e.to_string();
                    }
                    None => break "stream ended".to_string(),
                }
            };
            let _ = tx.send(BrokerEvent::Disconnected { reason }).await;
        });

        self.outbound = Some(out_tx);
        self.tasks.push(writer);
        self.tasks.push(reader);
        Ok(())
    }

    /// Close the connection. Emits `Disconnected`.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Message::Close(None));
            // Let the writer flush the close frame
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.stop_tasks();
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            let _ = self
                .event_tx
                .send(BrokerEvent::Disconnected {
                    reason: "closed by operator".to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Record a link loss reported by the reader task
    pub fn mark_disconnected(&mut self) {
        self.stop_tasks();
        self.state = ConnectionState::Disconnected;
    }

    /// Send a request. Returns the request id used on the wire.
    pub async fn send(&mut self, request: &TransportRequest) -> Result<u64> {
        if !self.is_connected() {
            bail!("Cannot send {}: not connected", request);
        }

        let req_id = match request {
            TransportRequest::RequestProposal(spec) => spec.req_id,
            _ => self.next_req_id(),
        };

        match self.mode {
            FeedMode::Demo => {
                let Some(simulator) = &self.simulator else {
                    bail!("Demo simulator not running");
                };
                let events = simulator.lock().await.handle_request(request);
                for event in events {
                    self.event_tx
                        .send(event)
                        .await
                        .context("Event channel closed")?;
                }
            }
            FeedMode::Live => {
                let json = encode_request(request, req_id)?;
                debug!("-> {}", json);
                let Some(outbound) = &self.outbound else {
                    bail!("Deriv writer not running");
                };
                outbound
                    .send(Message::Text(json))
                    .context("Deriv writer closed")?;
            }
        }
        Ok(req_id)
    }

    /// Get next event (blocks until available)
    pub async fn next_event(&mut self) -> Option<BrokerEvent> {
        self.event_rx.recv().await
    }

    /// Get event sender for external use
    pub fn event_sender(&self) -> mpsc::Sender<BrokerEvent> {
        self.event_tx.clone()
    }
}

impl Drop for DerivConnection {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> DerivConnection {
        DerivConnection::new(FeedMode::Demo, DEFAULT_APP_ID, Duration::from_millis(10))
    }

    #[test]
    fn test_endpoint_url() {
        let url = endpoint_url("1089").unwrap();
        assert_eq!(url.as_str(), "wss://ws.derivws.com/websockets/v3?app_id=1089");
    }

    #[tokio::test]
    async fn test_demo_connection() {
        let mut conn = demo();
        conn.connect().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.next_event().await, Some(BrokerEvent::Connected));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut conn = demo();
        assert!(conn.send(&TransportRequest::Ping).await.is_err());
    }

    #[tokio::test]
    async fn test_demo_authorize_and_ticks() {
        let mut conn = demo();
        conn.connect().await.unwrap();
        assert_eq!(conn.next_event().await, Some(BrokerEvent::Connected));

        let id1 = conn
            .send(&TransportRequest::Authorize {
                token: "demo".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(conn.next_event().await, Some(BrokerEvent::Authorized { .. })));

        let id2 = conn
            .send(&TransportRequest::SubscribeTicks {
                symbol: "R_10".to_string(),
            })
            .await
            .unwrap();
        assert!(id2 > id1);

        loop {
            match conn.next_event().await {
                Some(BrokerEvent::TickReceived(tick)) => {
                    assert_eq!(tick.symbol.as_deref(), Some("R_10"));
                    break;
                }
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_emits_event() {
        let mut conn = demo();
        conn.connect().await.unwrap();
        conn.disconnect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let mut saw_disconnect = false;
        while let Ok(event) = conn.event_rx.try_recv() {
            if matches!(event, BrokerEvent::Disconnected { .. }) {
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);
    }
}
