use crate::config::ServerConfig;
use crate::state::{Delivery, PeerId, RegisterError, RelayState};
use platformer_shared::relay::{ClientMsg, ServerMsg};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Commands from peer connections to the relay loop
pub enum RelayCommand {
    Register {
        id: PeerId,
        outbound: mpsc::Sender<ServerMsg>,
        /// Answers with the connection's generation on success
        response: oneshot::Sender<Result<u64, RegisterError>>,
    },
    /// Only acts if `generation` still owns `id`. A handler whose peer was
    /// already dropped must not evict a newer connection with the same id.
    Unregister {
        id: PeerId,
        generation: u64,
    },
    Frame {
        from: PeerId,
        msg: ClientMsg,
    },
    PeerCount {
        response: oneshot::Sender<usize>,
    },
}

/// A registered peer's queue, tagged with the connection that owns it
struct Outbound {
    generation: u64,
    tx: mpsc::Sender<ServerMsg>,
}

/// Run the relay loop. Owns the link table and every peer's outbound queue.
pub async fn run_relay_loop(mut cmd_rx: mpsc::Receiver<RelayCommand>, config: ServerConfig) {
    let mut state = RelayState::new(config.max_peers);
    let mut outbound: HashMap<PeerId, Outbound> = HashMap::new();
    let mut next_generation: u64 = 0;

    while let Some(cmd) = cmd_rx.recv().await {
        let deliveries = match cmd {
            RelayCommand::Register {
                id,
                outbound: tx,
                response,
            } => {
                let result = state.register(&id).map(|()| {
                    next_generation += 1;
                    next_generation
                });
                match &result {
                    Ok(generation) => {
                        outbound.insert(
                            id.clone(),
                            Outbound {
                                generation: *generation,
                                tx,
                            },
                        );
                        tracing::info!("Peer {} registered ({} online)", id, state.peer_count());
                    }
                    Err(e) => tracing::warn!("Rejected peer {}: {}", id, e),
                }
                let _ = response.send(result);
                Vec::new()
            }
            RelayCommand::Unregister { id, generation } => {
                let owned = outbound
                    .get(&id)
                    .is_some_and(|out| out.generation == generation);
                if owned {
                    outbound.remove(&id);
                    let out = state.unregister(&id);
                    tracing::info!("Peer {} left ({} online)", id, state.peer_count());
                    out
                } else {
                    tracing::debug!("Ignoring stale unregister of {}", id);
                    Vec::new()
                }
            }
            RelayCommand::Frame { from, msg } => match msg {
                ClientMsg::Connect { to } => state.connect(&from, &to),
                ClientMsg::Send { to, payload } => {
                    state.send(&from, &to, payload).into_iter().collect()
                }
                ClientMsg::Close { to } => state.close(&from, &to).into_iter().collect(),
            },
            RelayCommand::PeerCount { response } => {
                let _ = response.send(state.peer_count());
                Vec::new()
            }
        };

        deliver(&mut state, &mut outbound, deliveries);
    }

    tracing::info!("Relay loop ended");
}

/// Push frames to their peers' queues. A peer whose queue is full is dropped
/// and its links closed, which can cascade into more deliveries.
fn deliver(
    state: &mut RelayState,
    outbound: &mut HashMap<PeerId, Outbound>,
    deliveries: Vec<Delivery>,
) {
    let mut pending: VecDeque<Delivery> = deliveries.into();
    while let Some(Delivery { to, msg }) = pending.pop_front() {
        let Some(out) = outbound.get(&to) else {
            continue;
        };
        match out.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Peer {} is not keeping up, dropping it", to);
                outbound.remove(&to);
                pending.extend(state.unregister(&to));
            }
            Err(TrySendError::Closed(_)) => {
                outbound.remove(&to);
                pending.extend(state.unregister(&to));
            }
        }
    }
}
