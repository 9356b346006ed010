use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::relay_loop::RelayCommand;
use crate::ws::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub peers: usize,
}

#[derive(Debug, Serialize)]
pub struct ScoresResponse {
    pub message: &'static str,
    pub scores: Vec<serde_json::Value>,
}

/// `GET /api/status`
pub async fn status_handler(State(app_state): State<AppState>) -> Json<StatusResponse> {
    let (resp_tx, resp_rx) = oneshot::channel();
    let peers = if app_state
        .relay_tx
        .send(RelayCommand::PeerCount { response: resp_tx })
        .await
        .is_ok()
    {
        resp_rx.await.unwrap_or(0)
    } else {
        0
    };
    Json(StatusResponse {
        status: "ok",
        message: "Platformer relay is running",
        peers,
    })
}

/// `GET /api/scores`. Scores are not persisted yet.
pub async fn scores_handler() -> Json<ScoresResponse> {
    Json(ScoresResponse {
        message: "Scores are not recorded on this server",
        scores: Vec::new(),
    })
}
