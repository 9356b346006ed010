use platformer_shared::relay::ServerMsg;
use std::collections::{BTreeSet, HashSet};

pub type PeerId = String;

/// Longest peer id the relay accepts
pub const MAX_PEER_ID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("peer id {0} is already registered")]
    Duplicate(String),
    #[error("relay is full ({0} peers)")]
    Full(usize),
    #[error("invalid peer id")]
    InvalidId,
}

/// A frame the relay must deliver to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: PeerId,
    pub msg: ServerMsg,
}

impl Delivery {
    fn new(to: &str, msg: ServerMsg) -> Self {
        Self {
            to: to.to_string(),
            msg,
        }
    }
}

fn link_key(a: &str, b: &str) -> (PeerId, PeerId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PEER_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Registered peers and the links between them, owned by the relay task.
///
/// Every operation returns the frames it produced instead of sending them, so
/// the table can be driven synchronously in tests.
pub struct RelayState {
    peers: HashSet<PeerId>,
    /// Open links, stored with the smaller id first
    links: BTreeSet<(PeerId, PeerId)>,
    max_peers: usize,
}

impl RelayState {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashSet::new(),
            links: BTreeSet::new(),
            max_peers,
        }
    }

    pub fn register(&mut self, id: &str) -> Result<(), RegisterError> {
        if !valid_id(id) {
            return Err(RegisterError::InvalidId);
        }
        if self.peers.contains(id) {
            return Err(RegisterError::Duplicate(id.to_string()));
        }
        if self.peers.len() >= self.max_peers {
            return Err(RegisterError::Full(self.max_peers));
        }
        self.peers.insert(id.to_string());
        Ok(())
    }

    /// Remove a peer and close all of its links.
    pub fn unregister(&mut self, id: &str) -> Vec<Delivery> {
        if !self.peers.remove(id) {
            return Vec::new();
        }
        let dropped: Vec<(PeerId, PeerId)> = self
            .links
            .iter()
            .filter(|(a, b)| a == id || b == id)
            .cloned()
            .collect();
        dropped
            .into_iter()
            .map(|(a, b)| {
                self.links.remove(&(a.clone(), b.clone()));
                let other = if a == id { b } else { a };
                Delivery::new(
                    &other,
                    ServerMsg::Closed {
                        peer: id.to_string(),
                    },
                )
            })
            .collect()
    }

    /// Open a link from `from` to `to`. Both ends get `open`; connecting an
    /// already linked pair does nothing.
    pub fn connect(&mut self, from: &str, to: &str) -> Vec<Delivery> {
        if !self.peers.contains(from) {
            return Vec::new();
        }
        if from == to || !self.peers.contains(to) {
            return vec![Delivery::new(
                from,
                ServerMsg::Error {
                    peer: to.to_string(),
                    reason: "peer unavailable".to_string(),
                },
            )];
        }
        if !self.links.insert(link_key(from, to)) {
            return Vec::new();
        }
        vec![
            Delivery::new(
                from,
                ServerMsg::Open {
                    peer: to.to_string(),
                },
            ),
            Delivery::new(
                to,
                ServerMsg::Open {
                    peer: from.to_string(),
                },
            ),
        ]
    }

    /// Forward `payload` over an open link. Without a link it is dropped.
    pub fn send(&self, from: &str, to: &str, payload: String) -> Option<Delivery> {
        if !self.linked(from, to) {
            return None;
        }
        Some(Delivery::new(
            to,
            ServerMsg::Message {
                from: from.to_string(),
                payload,
            },
        ))
    }

    pub fn close(&mut self, from: &str, to: &str) -> Option<Delivery> {
        if !self.links.remove(&link_key(from, to)) {
            return None;
        }
        Some(Delivery::new(
            to,
            ServerMsg::Closed {
                peer: from.to_string(),
            },
        ))
    }

    pub fn linked(&self, a: &str, b: &str) -> bool {
        self.links.contains(&link_key(a, b))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(ids: &[&str]) -> RelayState {
        let mut state = RelayState::new(8);
        for id in ids {
            state.register(id).unwrap();
        }
        state
    }

    #[test]
    fn register_rejects_duplicates_and_overflow() {
        let mut state = RelayState::new(2);
        assert!(state.register("A").is_ok());
        assert_eq!(
            state.register("A"),
            Err(RegisterError::Duplicate("A".to_string()))
        );
        assert!(state.register("B").is_ok());
        assert_eq!(state.register("C"), Err(RegisterError::Full(2)));
        assert_eq!(state.peer_count(), 2);
    }

    #[test]
    fn register_rejects_bad_ids() {
        let mut state = RelayState::new(8);
        assert_eq!(state.register(""), Err(RegisterError::InvalidId));
        assert_eq!(state.register("a b"), Err(RegisterError::InvalidId));
        assert_eq!(
            state.register(&"X".repeat(MAX_PEER_ID_LEN + 1)),
            Err(RegisterError::InvalidId)
        );
        assert!(state.register("ABC-12_x").is_ok());
    }

    #[test]
    fn connect_opens_both_ends_once() {
        let mut state = state_with(&["A", "B"]);
        let out = state.connect("A", "B");
        assert_eq!(
            out,
            vec![
                Delivery::new(
                    "A",
                    ServerMsg::Open {
                        peer: "B".to_string()
                    }
                ),
                Delivery::new(
                    "B",
                    ServerMsg::Open {
                        peer: "A".to_string()
                    }
                ),
            ]
        );
        assert!(state.connect("B", "A").is_empty());
        assert_eq!(state.link_count(), 1);
    }

    #[test]
    fn connect_to_unknown_or_self_is_an_error() {
        let mut state = state_with(&["A"]);
        for target in ["NOPE", "A"] {
            let out = state.connect("A", target);
            assert!(matches!(
                out.as_slice(),
                [Delivery { to, msg: ServerMsg::Error { peer, .. } }] if to == "A" && peer == target
            ));
        }
        assert_eq!(state.link_count(), 0);
    }

    #[test]
    fn send_needs_a_link() {
        let mut state = state_with(&["A", "B"]);
        assert!(state.send("A", "B", "hi".to_string()).is_none());
        state.connect("A", "B");
        let out = state.send("B", "A", "hi".to_string()).unwrap();
        assert_eq!(out.to, "A");
        assert_eq!(
            out.msg,
            ServerMsg::Message {
                from: "B".to_string(),
                payload: "hi".to_string()
            }
        );
    }

    #[test]
    fn close_notifies_other_end() {
        let mut state = state_with(&["A", "B"]);
        state.connect("A", "B");
        let out = state.close("B", "A").unwrap();
        assert_eq!(
            out,
            Delivery::new(
                "A",
                ServerMsg::Closed {
                    peer: "B".to_string()
                }
            )
        );
        assert!(state.close("B", "A").is_none());
        assert!(!state.linked("A", "B"));
    }

    #[test]
    fn unregister_closes_every_link() {
        let mut state = state_with(&["A", "B", "C"]);
        state.connect("A", "B");
        state.connect("C", "B");
        state.connect("A", "C");
        let mut notified: Vec<PeerId> = state.unregister("B").into_iter().map(|d| d.to).collect();
        notified.sort();
        assert_eq!(notified, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(state.link_count(), 1);
        assert_eq!(state.peer_count(), 2);
        assert!(state.unregister("B").is_empty());
        // The id is free again
        assert!(state.register("B").is_ok());
    }
}
