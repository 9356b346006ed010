//! Frames exchanged between a peer and the relay server.
//!
//! The relay gives every registered peer id a reliable ordered link to any
//! other peer id. Payloads are opaque text (encoded [`crate::protocol::PeerMessage`]s).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Relay frame version, checked against `welcome`.
pub const RELAY_VERSION: u32 = 1;

// === Relay -> Peer ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    /// A link to `peer` is now open
    #[serde(rename = "open")]
    Open { peer: String },
    #[serde(rename = "message")]
    Message { from: String, payload: String },
    #[serde(rename = "closed")]
    Closed { peer: String },
    /// Link-level failure; `peer` is empty for errors about this connection
    #[serde(rename = "error")]
    Error { peer: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub self_id: String,
}

// === Peer -> Relay ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "connect")]
    Connect { to: String },
    #[serde(rename = "send")]
    Send { to: String, payload: String },
    #[serde(rename = "close")]
    Close { to: String },
}
