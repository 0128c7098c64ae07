use crate::boundary::{self, BoundaryFilter};
use crate::config::Listener as ListenerConfig;
use crate::errors::ScoreError;
use crate::player::LeaderboardEntry;
use crate::service::{ScoreService, normalize_score};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use shared::shutdown::shutdown_signal;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The `/api` routes sit behind the boundary filter. The liveness route does
/// not, so health checks without an `Origin` always get through. Every
/// response carries CORS headers.
pub fn router(service: Arc<ScoreService>, filter: Arc<BoundaryFilter>) -> Router {
    Router::new()
        .route("/api/sync-score", post(sync_score))
        .route("/api/leaderboard", get(leaderboard))
        .route_layer(middleware::from_fn_with_state(
            filter.clone(),
            boundary::enforce,
        ))
        .route("/", get(liveness))
        .with_state(service)
        .layer(filter.cors_layer())
}

pub async fn serve(listener: &ListenerConfig, app: Router) -> Result<(), ApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SyncScoreRequest {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    current_score: Option<Number>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncScoreResponse {
    success: bool,
    high_score: i64,
    name: String,
}

async fn liveness() -> &'static str {
    "Minesweeper API Online"
}

async fn sync_score(
    State(service): State<Arc<ScoreService>>,
    payload: Result<Json<SyncScoreRequest>, JsonRejection>,
) -> Result<Json<SyncScoreResponse>, ScoreError> {
    let Json(request) = payload.map_err(|e| ScoreError::BadRequest(e.body_text()))?;
    let score = normalize_score(request.current_score.as_ref())?;

    let synced = service.sync_score(request.token.as_deref(), score).await?;

    Ok(Json(SyncScoreResponse {
        success: true,
        high_score: synced.high_score,
        name: synced.name,
    }))
}

async fn leaderboard(
    State(service): State<Arc<ScoreService>>,
) -> Result<Json<Vec<LeaderboardEntry>>, ScoreError> {
    service.top_players().await.map(Json)
}
