//! Platformer relay server library.
//!
//! Gives every connected peer id a reliable ordered link to any other peer id,
//! plus a small status API. Exposed as a library for tests and binaries.

pub mod config;
pub mod relay_loop;
pub mod state;
pub mod status;
pub mod ws;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use relay_loop::{run_relay_loop, RelayCommand};
use ws::AppState;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/peer/{id}", get(ws::ws_handler))
        .route("/api/status", get(status::status_handler))
        .route("/api/scores", get(status::scores_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Spawn the relay loop and serve on `listener` until the server stops.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> std::io::Result<()> {
    let (relay_tx, relay_rx) = mpsc::channel::<RelayCommand>(256);
    let app_state = AppState {
        relay_tx,
        outbound_queue: config.outbound_queue,
    };
    tokio::spawn(run_relay_loop(relay_rx, config));
    axum::serve(listener, router(app_state)).await
}
