//! Channel abstraction between peers.
//!
//! A [`Transport`] is opened for one local peer id and gives reliable ordered
//! text channels to other peer ids. Everything that happens on those channels
//! comes back through [`Transport::poll_events`], which the game loop drains
//! once per frame.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

pub type PeerId = String;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A channel to this peer is open (either side initiated it)
    Open(PeerId),
    Message(PeerId, String),
    Close(PeerId),
    Error(PeerId, String),
    /// The transport itself is gone; every channel is closed
    Offline { reason: String },
}

pub trait Transport {
    fn local_id(&self) -> &str;

    /// Request a channel to `remote`. Returns false when the request could not
    /// be issued at all; otherwise the result arrives as `Open` or `Error`.
    fn connect(&mut self, remote: &str) -> bool;

    /// Send over an open channel. Sends to a closed channel are dropped and
    /// return false.
    fn send(&mut self, remote: &str, text: &str) -> bool;

    /// Close the channel to `remote`. Idempotent.
    fn close(&mut self, remote: &str);

    fn poll_events(&mut self) -> Vec<ChannelEvent>;
}

#[derive(Debug, Default)]
struct HubState {
    inboxes: HashMap<PeerId, VecDeque<ChannelEvent>>,
    /// Open links, stored with the smaller id first
    links: BTreeSet<(PeerId, PeerId)>,
}

fn link_key(a: &str, b: &str) -> (PeerId, PeerId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl HubState {
    fn push(&mut self, to: &str, event: ChannelEvent) {
        if let Some(inbox) = self.inboxes.get_mut(to) {
            inbox.push_back(event);
        }
    }
}

/// In-process transport hub. Every peer opened on the same hub can reach the
/// others; delivery happens when the receiver polls.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` on the hub and return its transport.
    pub fn open(&self, id: &str) -> LoopbackTransport {
        self.state
            .borrow_mut()
            .inboxes
            .insert(id.to_string(), VecDeque::new());
        LoopbackTransport {
            id: id.to_string(),
            hub: self.state.clone(),
        }
    }

    /// Drop `id` from the hub as if its process died. Every peer linked to it
    /// sees `Close`.
    pub fn disconnect(&self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.inboxes.remove(id);
        let dropped: Vec<(PeerId, PeerId)> = state
            .links
            .iter()
            .filter(|(a, b)| a == id || b == id)
            .cloned()
            .collect();
        for (a, b) in dropped {
            state.links.remove(&(a.clone(), b.clone()));
            let other = if a == id { b } else { a };
            state.push(&other, ChannelEvent::Close(id.to_string()));
        }
    }

    pub fn link_count(&self) -> usize {
        self.state.borrow().links.len()
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    id: PeerId,
    hub: Rc<RefCell<HubState>>,
}

impl Transport for LoopbackTransport {
    fn local_id(&self) -> &str {
        &self.id
    }

    fn connect(&mut self, remote: &str) -> bool {
        let mut state = self.hub.borrow_mut();
        if !state.inboxes.contains_key(&self.id) {
            return false;
        }
        if remote == self.id || !state.inboxes.contains_key(remote) {
            state.push(
                &self.id,
                ChannelEvent::Error(remote.to_string(), "peer unavailable".to_string()),
            );
            return true;
        }
        if state.links.insert(link_key(&self.id, remote)) {
            state.push(&self.id, ChannelEvent::Open(remote.to_string()));
            state.push(remote, ChannelEvent::Open(self.id.clone()));
        }
        true
    }

    fn send(&mut self, remote: &str, text: &str) -> bool {
        let mut state = self.hub.borrow_mut();
        if !state.links.contains(&link_key(&self.id, remote)) {
            return false;
        }
        state.push(
            remote,
            ChannelEvent::Message(self.id.clone(), text.to_string()),
        );
        true
    }

    fn close(&mut self, remote: &str) {
        let mut state = self.hub.borrow_mut();
        if state.links.remove(&link_key(&self.id, remote)) {
            state.push(remote, ChannelEvent::Close(self.id.clone()));
        }
    }

    fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut state = self.hub.borrow_mut();
        match state.inboxes.get_mut(&self.id) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
