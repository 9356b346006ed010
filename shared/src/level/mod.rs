pub mod entities;
pub mod generator;
pub mod stream;

pub use entities::{LevelSection, Obstacle, ObstacleKind, Platform, PlatformKind};
pub use generator::{generate, section_rng};
pub use stream::{LevelStream, LevelSync};
