use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use platformer_shared::relay::{ClientMsg, ServerMsg, WelcomeMsg, RELAY_VERSION};
use tokio::sync::{mpsc, oneshot};

use crate::relay_loop::RelayCommand;

/// Shared app state passed to each handler
#[derive(Clone)]
pub struct AppState {
    pub relay_tx: mpsc::Sender<RelayCommand>,
    pub outbound_queue: usize,
}

/// HTTP handler for `/peer/{id}` WebSocket upgrades
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(peer_id): Path<String>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, app_state))
}

fn encode(msg: &ServerMsg) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to encode relay frame: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, peer_id: String, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Register with the relay loop
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(app_state.outbound_queue);
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .relay_tx
        .send(RelayCommand::Register {
            id: peer_id.clone(),
            outbound: out_tx,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Register command");
        return;
    }

    let generation = match resp_rx.await {
        Ok(Ok(generation)) => generation,
        Ok(Err(e)) => {
            let refusal = ServerMsg::Error {
                peer: String::new(),
                reason: e.to_string(),
            };
            if let Some(frame) = encode(&refusal) {
                let _ = sink.send(frame).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::error!("Relay loop dropped registration of {}", peer_id);
            return;
        }
    };

    tracing::info!("Peer {} connected", peer_id);

    let welcome = ServerMsg::Welcome(WelcomeMsg {
        protocol_version: RELAY_VERSION,
        self_id: peer_id.clone(),
    });
    let welcomed = match encode(&welcome) {
        Some(frame) => sink.send(frame).await.is_ok(),
        None => false,
    };

    if welcomed {
        loop {
            tokio::select! {
                // Peer -> Relay
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMsg>(&text) {
                                Ok(frame) => {
                                    let cmd = RelayCommand::Frame { from: peer_id.clone(), msg: frame };
                                    if app_state.relay_tx.send(cmd).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::debug!("Bad frame from {}: {}", peer_id, e),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        _ => {} // Ignore ping/pong/binary
                    }
                }

                // Relay -> Peer
                out = out_rx.recv() => {
                    let Some(out) = out else {
                        // Dropped by the relay loop
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if let Some(frame) = encode(&out) {
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .relay_tx
        .send(RelayCommand::Unregister {
            id: peer_id.clone(),
            generation,
        })
        .await;
    tracing::info!("Peer {} disconnected", peer_id);
}
