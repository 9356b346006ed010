//! [`Transport`] over the relay server's WebSocket.
//!
//! The socket lives on a background thread running its own tokio runtime.
//! Commands go in over an unbounded channel and relay frames come back over a
//! std channel that the game loop drains with `poll_events`, so the game loop
//! itself never blocks on network I/O.

use std::sync::mpsc::{self, Receiver, Sender};

use platformer_shared::relay::{ClientMsg, ServerMsg, RELAY_VERSION};
use url::Url;

use crate::transport::{ChannelEvent, Transport};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("relay url must use ws:// or wss:// (got {0})")]
    UnsupportedScheme(String),
}

type CmdSender = tokio::sync::mpsc::UnboundedSender<ClientMsg>;

pub struct RelayTransport {
    id: String,
    cmd_tx: CmdSender,
    event_rx: Receiver<ChannelEvent>,
}

/// `{base}/peer/{id}` for a relay base url such as `ws://127.0.0.1:9001`.
pub fn peer_url(base: &str, id: &str) -> Result<Url, RelayError> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(RelayError::UnsupportedScheme(other.to_string())),
    }
    let path = format!("{}/peer/{}", url.path().trim_end_matches('/'), id);
    url.set_path(&path);
    Ok(url)
}

impl RelayTransport {
    /// Register `id` with the relay at `base`. Registration completes in the
    /// background; failure shows up as an `Offline` event.
    pub fn open(base: &str, id: &str) -> Result<Self, RelayError> {
        let url = peer_url(base, id)?;
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>();
        let cmd_tx = spawn_relay_thread(url, event_tx);
        Ok(Self {
            id: id.to_string(),
            cmd_tx,
            event_rx,
        })
    }

    fn command(&self, msg: ClientMsg) -> bool {
        self.cmd_tx.send(msg).is_ok()
    }
}

impl Transport for RelayTransport {
    fn local_id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, remote: &str) -> bool {
        self.command(ClientMsg::Connect {
            to: remote.to_string(),
        })
    }

    fn send(&mut self, remote: &str, text: &str) -> bool {
        self.command(ClientMsg::Send {
            to: remote.to_string(),
            payload: text.to_string(),
        })
    }

    fn close(&mut self, remote: &str) {
        self.command(ClientMsg::Close {
            to: remote.to_string(),
        });
    }

    fn poll_events(&mut self) -> Vec<ChannelEvent> {
        self.event_rx.try_iter().collect()
    }
}

/// Translate a relay frame into a channel event. `None` for frames that carry
/// nothing for the session.
fn to_channel_event(msg: ServerMsg) -> Option<ChannelEvent> {
    match msg {
        ServerMsg::Welcome(_) => None,
        ServerMsg::Open { peer } => Some(ChannelEvent::Open(peer)),
        ServerMsg::Message { from, payload } => Some(ChannelEvent::Message(from, payload)),
        ServerMsg::Closed { peer } => Some(ChannelEvent::Close(peer)),
        ServerMsg::Error { peer, reason } if peer.is_empty() => {
            Some(ChannelEvent::Offline { reason })
        }
        ServerMsg::Error { peer, reason } => Some(ChannelEvent::Error(peer, reason)),
    }
}

fn spawn_relay_thread(url: Url, event_tx: Sender<ChannelEvent>) -> CmdSender {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel::<ClientMsg>();

    std::thread::spawn(move || {
        let offline = |reason: String| {
            let _ = event_tx.send(ChannelEvent::Offline { reason });
        };

        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                offline(format!("failed to build runtime: {e}"));
                return;
            }
        };

        rt.block_on(async {
            let (ws_stream, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok(x) => x,
                Err(e) => {
                    tracing::warn!("relay connect to {} failed: {}", url, e);
                    offline(format!("relay unreachable: {e}"));
                    return;
                }
            };
            tracing::info!("connected to relay {}", url);

            let (mut write, mut read) = ws_stream.split();

            let reason = loop {
                tokio::select! {
                    biased;

                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else {
                            // Transport dropped
                            let _ = write.close().await;
                            break "transport closed".to_string();
                        };
                        if let Ok(text) = serde_json::to_string(&cmd) {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                break "relay write failed".to_string();
                            }
                        }
                    }

                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(txt))) => {
                                let frame = match serde_json::from_str::<ServerMsg>(&txt) {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        tracing::warn!("bad relay frame: {}", e);
                                        continue;
                                    }
                                };
                                if let ServerMsg::Welcome(welcome) = &frame {
                                    if welcome.protocol_version != RELAY_VERSION {
                                        let _ = write.close().await;
                                        break format!(
                                            "relay version mismatch: relay {}, peer {}",
                                            welcome.protocol_version, RELAY_VERSION
                                        );
                                    }
                                    tracing::info!("registered with relay as {}", welcome.self_id);
                                }
                                if let Some(event) = to_channel_event(frame) {
                                    let _ = event_tx.send(event);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                break "relay connection closed".to_string();
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                break format!("relay connection error: {e}");
                            }
                        }
                    }
                }
            };

            tracing::warn!("relay link down: {}", reason);
            offline(reason);
        });
    });

    cmd_tx
}
