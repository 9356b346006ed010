//! Peer-to-peer message envelope.
//!
//! Every message travels as JSON text `{type, data, sender, timestamp}`. The
//! `type` string selects the variant of [`Message`]; unknown types decode to
//! [`Message::Unrecognized`] so callers can log and drop them.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::level::LevelSync;
use crate::player::{PlayerState, PlayerUpdate};

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

pub const JOIN: &str = "join";
pub const PLAYER_UPDATE: &str = "player-update";
pub const LEVEL_SYNC: &str = "level-sync";
pub const PLAYER_DIED: &str = "player-died";
pub const LEVEL_COMPLETE: &str = "level-complete";
pub const PLAYER_DISCONNECT: &str = "player-disconnect";
pub const GAME_START: &str = "game-start";
pub const NEW_LEVEL: &str = "new-level";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One message body per type.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Join(PlayerState),
    PlayerUpdate(PlayerUpdate),
    LevelSync(LevelSync),
    PlayerDied { username: String },
    LevelComplete { username: String },
    PlayerDisconnect { id: String },
    GameStart,
    NewLevel,
    /// A type this build does not know; carries the raw type string
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct UsernamePayload {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct DisconnectPayload {
    pub id: String,
}

impl Message {
    pub fn kind(&self) -> &str {
        match self {
            Message::Join(_) => JOIN,
            Message::PlayerUpdate(_) => PLAYER_UPDATE,
            Message::LevelSync(_) => LEVEL_SYNC,
            Message::PlayerDied { .. } => PLAYER_DIED,
            Message::LevelComplete { .. } => LEVEL_COMPLETE,
            Message::PlayerDisconnect { .. } => PLAYER_DISCONNECT,
            Message::GameStart => GAME_START,
            Message::NewLevel => NEW_LEVEL,
            Message::Unrecognized(kind) => kind.as_str(),
        }
    }

    fn data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Message::Join(state) => serde_json::to_value(state),
            Message::PlayerUpdate(update) => serde_json::to_value(update),
            Message::LevelSync(sync) => serde_json::to_value(sync),
            Message::PlayerDied { username } | Message::LevelComplete { username } => {
                serde_json::to_value(UsernamePayload {
                    username: username.clone(),
                })
            }
            Message::PlayerDisconnect { id } => {
                serde_json::to_value(DisconnectPayload { id: id.clone() })
            }
            Message::GameStart | Message::NewLevel | Message::Unrecognized(_) => {
                Ok(serde_json::Value::Object(Default::default()))
            }
        }
    }

    fn from_parts(kind: &str, data: serde_json::Value) -> Result<Message, ProtocolError> {
        let payload = |source| ProtocolError::Payload {
            kind: kind.to_string(),
            source,
        };
        let message = match kind {
            JOIN => Message::Join(serde_json::from_value(data).map_err(payload)?),
            PLAYER_UPDATE => Message::PlayerUpdate(serde_json::from_value(data).map_err(payload)?),
            LEVEL_SYNC => Message::LevelSync(serde_json::from_value(data).map_err(payload)?),
            PLAYER_DIED => {
                let p: UsernamePayload = serde_json::from_value(data).map_err(payload)?;
                Message::PlayerDied {
                    username: p.username,
                }
            }
            LEVEL_COMPLETE => {
                let p: UsernamePayload = serde_json::from_value(data).map_err(payload)?;
                Message::LevelComplete {
                    username: p.username,
                }
            }
            PLAYER_DISCONNECT => {
                let p: DisconnectPayload = serde_json::from_value(data).map_err(payload)?;
                Message::PlayerDisconnect { id: p.id }
            }
            GAME_START => Message::GameStart,
            NEW_LEVEL => Message::NewLevel,
            other => Message::Unrecognized(other.to_string()),
        };
        Ok(message)
    }
}

/// Raw wire shape; `data` is decoded once `type` is known.
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
    sender: String,
    timestamp: u64,
}

/// A message with its origin and send time (epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMessage {
    pub body: Message,
    pub sender: String,
    pub timestamp: u64,
}

impl PeerMessage {
    pub fn new(body: Message, sender: impl Into<String>) -> Self {
        Self {
            body,
            sender: sender.into(),
            timestamp: now_millis(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let raw = RawEnvelope {
            kind: self.body.kind().to_string(),
            data: self.body.data().map_err(ProtocolError::Encode)?,
            sender: self.sender.clone(),
            timestamp: self.timestamp,
        };
        serde_json::to_string(&raw).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<PeerMessage, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
        Ok(PeerMessage {
            body: Message::from_parts(&raw.kind, raw.data)?,
            sender: raw.sender,
            timestamp: raw.timestamp,
        })
    }
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
