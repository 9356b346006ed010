//! Peer side of the platformer: session protocol, channel transports and the
//! game orchestrator that ties them to the shared simulation.

pub mod autopilot;
pub mod game;
pub mod relay_transport;
pub mod session;
pub mod transport;
