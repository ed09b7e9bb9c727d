use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Market, MARKETS};
use crate::trading_core::learning::WeightEntry;
use crate::trading_core::{Stats, TradeHistoryItem};
use crate::types::AppState;

/// Response for the trade list
#[derive(Serialize)]
pub struct TradesResponse {
    pub trades: Vec<TradeHistoryItem>,
    pub stats: Stats,
    pub win_rate: f64,
}

/// Response for the learned weights
#[derive(Serialize)]
pub struct WeightsResponse {
    pub weights: Vec<WeightEntry>,
}

#[derive(Serialize)]
pub struct MarketsResponse {
    pub markets: &'static [Market],
}

/// Query params for the trades endpoint
#[derive(Debug, Deserialize)]
pub struct TradesQueryParams {
    pub limit: Option<usize>,
}

fn not_ready() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"error": "Session not started"})),
    )
}

/// GET /api/snapshot - Full session state
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.snapshot.read().await.as_ref() {
        Some(snapshot) => (StatusCode::OK, Json(serde_json::json!(snapshot))),
        None => not_ready(),
    }
}

/// GET /api/trades - Recent settled trades, newest first
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TradesQueryParams>,
) -> impl IntoResponse {
    let guard = state.snapshot.read().await;
    let Some(snapshot) = guard.as_ref() else {
        return not_ready();
    };

    let limit = params.limit.unwrap_or(snapshot.trade_history.len());
    let response = TradesResponse {
        trades: snapshot.trade_history.iter().take(limit).cloned().collect(),
        stats: snapshot.stats.clone(),
        win_rate: snapshot.stats.win_rate(),
    };
    (StatusCode::OK, Json(serde_json::json!(response)))
}

/// GET /api/weights - Pattern weights learned this session
pub async fn get_weights(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.snapshot.read().await.as_ref() {
        Some(snapshot) => (
            StatusCode::OK,
            Json(serde_json::json!(WeightsResponse {
                weights: snapshot.weights.clone(),
            })),
        ),
        None => not_ready(),
    }
}

/// GET /api/markets
pub async fn get_markets() -> impl IntoResponse {
    Json(MarketsResponse { markets: &MARKETS })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedMode;
    use crate::trading_core::{SessionSettings, TradingSession};
    use tokio::sync::{broadcast, mpsc, RwLock};

    fn state(with_snapshot: bool) -> Arc<AppState> {
        let (tx, _rx) = broadcast::channel(16);
        let (commands, _cmd_rx) = mpsc::channel(16);
        let snapshot = with_snapshot.then(|| TradingSession::new(SessionSettings::default()).snapshot());
        Arc::new(AppState {
            tx,
            commands,
            snapshot: RwLock::new(snapshot),
            mode: FeedMode::Demo,
        })
    }

    #[tokio::test]
    async fn test_snapshot_before_start() {
        let response = get_snapshot(State(state(false))).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_endpoints_with_session() {
        let state = state(true);

        let response = get_snapshot(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_trades(State(state.clone()), Query(TradesQueryParams { limit: Some(5) }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_weights(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_markets_response() {
        let json = serde_json::to_value(MarketsResponse { markets: &MARKETS }).unwrap();
        assert_eq!(json["markets"].as_array().unwrap().len(), 6);
        assert_eq!(json["markets"][0]["symbol"], "R_10");
    }
}
