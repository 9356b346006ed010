//! Simulation core shared by every peer and by the relay server.
//!
//! Everything in here is pure and single-threaded: level generation, the
//! fixed-step physics engine, and the wire types exchanged between peers.

pub mod config;
pub mod geometry;
pub mod level;
pub mod physics;
pub mod player;
pub mod protocol;
pub mod relay;
pub mod vec3;
