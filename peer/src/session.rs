//! Session protocol: lobby membership, player mirrors and message dispatch.
//!
//! Topology is a star around the host. The lobby code is the host's own peer
//! id, joiners open a single channel to it, and the host forwards player
//! traffic between them with the original `sender` kept intact. Level
//! geometry only ever flows from the host.

use std::collections::{BTreeMap, BTreeSet};

use platformer_shared::level::LevelSync;
use platformer_shared::player::PlayerState;
use platformer_shared::protocol::{Message, PeerMessage};
use serde::{Deserialize, Serialize};

use crate::transport::{ChannelEvent, PeerId, Transport};

const UNKNOWN_PLAYER: &str = "Unknown Player";
const UNKNOWN_COLOR: &str = "#FFFFFF";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub id: String,
    pub username: String,
    pub color: String,
}

/// Membership view rebuilt on every connection-table change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySnapshot {
    pub lobby_id: String,
    pub host_id: String,
    pub members: Vec<LobbyMember>,
}

impl LobbySnapshot {
    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}

/// What the session surfaces to the game after a pump.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LobbyJoined { lobby_id: String },
    JoinFailed { lobby_id: String, reason: String },
    PeerJoined { id: String, username: String },
    PeerLeft { id: String },
    /// Host only: a newcomer needs the authoritative level
    SyncRequested { peer: String },
    LevelSync(LevelSync),
    PlayerDied { id: String, username: String },
    LevelComplete { id: String, username: String },
    GameStart,
    NewLevel,
    ConnectionError { peer: String, reason: String },
    HostLost,
    Offline { reason: String },
}

#[derive(Debug, Clone)]
struct Lobby {
    id: String,
    is_host: bool,
    /// Non-hosts are joined once the channel to the host opens
    joined: bool,
}

pub struct Session<T: Transport> {
    transport: T,
    lobby: Option<Lobby>,
    channels: BTreeSet<PeerId>,
    mirrors: BTreeMap<PeerId, PlayerState>,
    snapshot: Option<LobbySnapshot>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            lobby: None,
            channels: BTreeSet::new(),
            mirrors: BTreeMap::new(),
            snapshot: None,
        }
    }

    pub fn local_id(&self) -> &str {
        self.transport.local_id()
    }

    pub fn is_host(&self) -> bool {
        self.lobby.as_ref().is_some_and(|l| l.is_host)
    }

    pub fn in_lobby(&self) -> bool {
        self.lobby.is_some()
    }

    pub fn lobby_id(&self) -> Option<&str> {
        self.lobby.as_ref().map(|l| l.id.as_str())
    }

    pub fn lobby(&self) -> Option<&LobbySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn others(&self) -> &BTreeMap<PeerId, PlayerState> {
        &self.mirrors
    }

    /// Become host of a lobby whose code is our own peer id.
    pub fn create_lobby(&mut self, local: &PlayerState) -> String {
        let id = self.local_id().to_string();
        self.lobby = Some(Lobby {
            id: id.clone(),
            is_host: true,
            joined: true,
        });
        self.rebuild_lobby(local);
        tracing::info!("lobby {} created", id);
        id
    }

    /// Ask for a channel to the host of `code`. Completes on `LobbyJoined`.
    pub fn join_lobby(&mut self, code: &str, local: &PlayerState) -> bool {
        if !self.transport.connect(code) {
            return false;
        }
        self.lobby = Some(Lobby {
            id: code.to_string(),
            is_host: false,
            joined: false,
        });
        self.rebuild_lobby(local);
        tracing::info!("joining lobby {}", code);
        true
    }

    /// Close every channel and forget the lobby.
    pub fn leave(&mut self) {
        let channels: Vec<PeerId> = self.channels.iter().cloned().collect();
        for peer in channels {
            self.transport.close(&peer);
        }
        self.channels.clear();
        self.mirrors.clear();
        self.lobby = None;
        self.snapshot = None;
    }

    /// Send `body` to every open channel. Returns how many sends went out.
    pub fn broadcast(&mut self, body: Message) -> usize {
        let envelope = PeerMessage::new(body, self.local_id());
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("dropping {} broadcast: {}", envelope.body.kind(), e);
                return 0;
            }
        };
        self.send_text_all(&text, None)
    }

    pub fn send_to(&mut self, peer: &str, body: Message) -> bool {
        let envelope = PeerMessage::new(body, self.local_id());
        match envelope.encode() {
            Ok(text) => self.send_text(peer, &text),
            Err(e) => {
                tracing::warn!("dropping {} to {}: {}", envelope.body.kind(), peer, e);
                false
            }
        }
    }

    fn send_text(&mut self, peer: &str, text: &str) -> bool {
        if !self.channels.contains(peer) {
            return false;
        }
        let sent = self.transport.send(peer, text);
        if !sent {
            tracing::debug!("send to {} dropped", peer);
        }
        sent
    }

    fn send_text_all(&mut self, text: &str, except: Option<&str>) -> usize {
        let targets: Vec<PeerId> = self
            .channels
            .iter()
            .filter(|p| Some(p.as_str()) != except)
            .cloned()
            .collect();
        targets
            .iter()
            .filter(|peer| self.send_text(peer, text))
            .count()
    }

    /// Drain the transport and apply everything that arrived.
    pub fn pump(&mut self, local: &PlayerState) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for event in self.transport.poll_events() {
            match event {
                ChannelEvent::Open(peer) => self.on_open(peer, local, &mut events),
                ChannelEvent::Message(peer, text) => self.on_message(&peer, &text, &mut events),
                ChannelEvent::Close(peer) => self.on_close(&peer, &mut events),
                ChannelEvent::Error(peer, reason) => self.on_error(peer, reason, &mut events),
                ChannelEvent::Offline { reason } => self.on_offline(reason, &mut events),
            }
        }
        self.rebuild_lobby(local);
        events
    }

    fn on_open(&mut self, peer: PeerId, local: &PlayerState, events: &mut Vec<SessionEvent>) {
        let Some(lobby) = self.lobby.as_mut() else {
            tracing::debug!("rejecting channel from {}: not in a lobby", peer);
            self.transport.close(&peer);
            return;
        };
        if !lobby.is_host {
            if peer != lobby.id {
                tracing::debug!("rejecting channel from {}: only the host may connect", peer);
                self.transport.close(&peer);
                return;
            }
            if !lobby.joined {
                lobby.joined = true;
                events.push(SessionEvent::LobbyJoined {
                    lobby_id: lobby.id.clone(),
                });
                tracing::info!("joined lobby {}", lobby.id);
            }
        }
        tracing::info!("channel to {} open", peer);
        self.channels.insert(peer.clone());
        self.send_to(&peer, Message::Join(local.clone()));
    }

    fn on_message(&mut self, from: &str, text: &str, events: &mut Vec<SessionEvent>) {
        if !self.channels.contains(from) {
            tracing::debug!("ignoring message from {} without an open channel", from);
            return;
        }
        let envelope = match PeerMessage::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("discarding message from {}: {}", from, e);
                return;
            }
        };
        if envelope.sender == self.local_id() {
            return;
        }
        let is_host = self.is_host();
        let from_host = self.lobby.as_ref().is_some_and(|l| !l.is_host && l.id == from);
        let sender = envelope.sender.clone();

        match envelope.body {
            Message::Join(mut state) => {
                state.id = sender.clone();
                let username = state.username.clone();
                let is_new = self.mirrors.insert(sender.clone(), state).is_none();
                if is_new {
                    tracing::info!("{} ({}) joined", username, sender);
                    events.push(SessionEvent::PeerJoined {
                        id: sender.clone(),
                        username,
                    });
                }
                if is_host && sender == from {
                    self.introduce(from, text);
                    events.push(SessionEvent::SyncRequested {
                        peer: from.to_string(),
                    });
                }
            }
            Message::PlayerUpdate(update) => {
                // Late updates for players already gone are dropped
                if let Some(mirror) = self.mirrors.get_mut(&sender) {
                    mirror.apply_update(&update);
                }
                if is_host {
                    self.send_text_all(text, Some(from));
                }
            }
            Message::LevelSync(sync) => {
                if from_host {
                    events.push(SessionEvent::LevelSync(sync));
                } else {
                    tracing::warn!("ignoring level-sync from non-host {}", sender);
                }
            }
            Message::PlayerDied { username } => {
                events.push(SessionEvent::PlayerDied {
                    id: sender,
                    username,
                });
                if is_host {
                    self.send_text_all(text, Some(from));
                }
            }
            Message::LevelComplete { username } => {
                events.push(SessionEvent::LevelComplete {
                    id: sender,
                    username,
                });
                if is_host {
                    self.send_text_all(text, Some(from));
                }
            }
            Message::PlayerDisconnect { id } => {
                if from_host && self.mirrors.remove(&id).is_some() {
                    events.push(SessionEvent::PeerLeft { id });
                }
            }
            Message::GameStart => {
                if from_host {
                    events.push(SessionEvent::GameStart);
                }
            }
            Message::NewLevel => {
                if from_host {
                    events.push(SessionEvent::NewLevel);
                }
            }
            Message::Unrecognized(kind) => {
                tracing::warn!("unknown message type {:?} from {}", kind, sender);
            }
        }
    }

    /// Host side of a newcomer's join: forward it to everyone else and replay
    /// everyone else's join to the newcomer.
    fn introduce(&mut self, newcomer: &str, join_text: &str) {
        self.send_text_all(join_text, Some(newcomer));
        let existing: Vec<PlayerState> = self
            .mirrors
            .iter()
            .filter(|(id, _)| id.as_str() != newcomer)
            .map(|(_, state)| state.clone())
            .collect();
        for state in existing {
            let envelope = PeerMessage::new(Message::Join(state.clone()), state.id.clone());
            match envelope.encode() {
                Ok(text) => {
                    self.send_text(newcomer, &text);
                }
                Err(e) => tracing::warn!("could not replay join of {}: {}", state.id, e),
            }
        }
    }

    fn on_close(&mut self, peer: &str, events: &mut Vec<SessionEvent>) {
        let was_open = self.channels.remove(peer);
        let Some(lobby) = self.lobby.clone() else {
            return;
        };

        if !lobby.is_host && peer == lobby.id {
            if !lobby.joined {
                self.lobby = None;
                events.push(SessionEvent::JoinFailed {
                    lobby_id: lobby.id,
                    reason: "host closed the channel".to_string(),
                });
                return;
            }
            tracing::warn!("lost connection to host {}", peer);
            // Everyone we knew was reached through the host
            for id in std::mem::take(&mut self.mirrors).into_keys() {
                events.push(SessionEvent::PeerLeft { id });
            }
            events.push(SessionEvent::HostLost);
            return;
        }

        if self.mirrors.remove(peer).is_some() || was_open {
            tracing::info!("{} left", peer);
            events.push(SessionEvent::PeerLeft {
                id: peer.to_string(),
            });
        }
        if lobby.is_host && was_open {
            self.broadcast(Message::PlayerDisconnect {
                id: peer.to_string(),
            });
        }
    }

    fn on_error(&mut self, peer: PeerId, reason: String, events: &mut Vec<SessionEvent>) {
        if let Some(lobby) = &self.lobby {
            if !lobby.is_host && !lobby.joined && peer == lobby.id {
                tracing::warn!("could not join lobby {}: {}", lobby.id, reason);
                events.push(SessionEvent::JoinFailed {
                    lobby_id: lobby.id.clone(),
                    reason,
                });
                self.lobby = None;
                return;
            }
        }
        tracing::warn!("connection error with {}: {}", peer, reason);
        events.push(SessionEvent::ConnectionError {
            peer: peer.clone(),
            reason,
        });
        if self.channels.contains(&peer) {
            self.transport.close(&peer);
            self.on_close(&peer, events);
        }
    }

    fn on_offline(&mut self, reason: String, events: &mut Vec<SessionEvent>) {
        tracing::warn!("transport offline: {}", reason);
        for id in std::mem::take(&mut self.mirrors).into_keys() {
            events.push(SessionEvent::PeerLeft { id });
        }
        self.channels.clear();
        self.lobby = None;
        events.push(SessionEvent::Offline { reason });
    }

    fn rebuild_lobby(&mut self, local: &PlayerState) {
        let Some(lobby) = &self.lobby else {
            self.snapshot = None;
            return;
        };
        let mut members = vec![LobbyMember {
            id: self.transport.local_id().to_string(),
            username: local.username.clone(),
            color: local.color.clone(),
        }];
        members.extend(self.mirrors.iter().map(|(id, p)| LobbyMember {
            id: id.clone(),
            username: p.username.clone(),
            color: p.color.clone(),
        }));
        members.extend(
            self.channels
                .iter()
                .filter(|id| !self.mirrors.contains_key(*id))
                .map(|id| LobbyMember {
                    id: id.clone(),
                    username: UNKNOWN_PLAYER.to_string(),
                    color: UNKNOWN_COLOR.to_string(),
                }),
        );
        self.snapshot = Some(LobbySnapshot {
            lobby_id: lobby.id.clone(),
            host_id: lobby.id.clone(),
            members,
        });
    }
}
