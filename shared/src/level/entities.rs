//! Level entities and their time-derived state.
//!
//! Entities are immutable once generated. Anything that animates (moving
//! platforms, fading platforms, beams, rocks) is a pure function of the level
//! clock plus the entity's own `phase`, so two peers with the same clock agree
//! on where everything is.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::Aabb;
use crate::vec3::{add, offset_z, scale, Vec3};

/// Full fade cycle of a disappearing platform (seconds)
pub const DISAPPEAR_CYCLE: f64 = 4.0;
/// Fraction of the cycle a disappearing platform stays fully opaque
const DISAPPEAR_OPAQUE_FRACTION: f64 = 0.7;
/// Platforms fainter than this are not solid
const SOLID_OPACITY: f64 = 0.2;

/// Full cycle of a falling rock: rest for the first half, drop in the second
pub const ROCK_CYCLE: f64 = 3.0;
const ROCK_GRAVITY: f64 = 9.8;
/// Rocks snap back to their spawn height once they pass this
const ROCK_FLOOR: f64 = -10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlatformKind {
    Normal,
    Moving {
        /// Unit vector along x or y
        #[serde(rename = "movingDirection")]
        #[ts(type = "[number, number, number]")]
        direction: Vec3,
        #[serde(rename = "movingSpeed")]
        speed: f64,
        #[serde(rename = "movingDistance")]
        distance: f64,
        #[serde(rename = "initialPosition")]
        #[ts(type = "[number, number, number]")]
        initial_position: Vec3,
    },
    Disappearing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub id: String,
    #[ts(type = "[number, number, number]")]
    pub position: Vec3,
    /// Full extents
    #[ts(type = "[number, number, number]")]
    pub size: Vec3,
    #[serde(flatten)]
    pub kind: PlatformKind,
    /// Animation offset in seconds
    pub phase: f64,
}

impl Platform {
    pub fn normal(id: String, position: Vec3, size: Vec3, phase: f64) -> Self {
        Self {
            id,
            position,
            size,
            kind: PlatformKind::Normal,
            phase,
        }
    }

    /// Centre at level time `t`.
    pub fn center_at(&self, t: f64) -> Vec3 {
        match &self.kind {
            PlatformKind::Moving {
                direction,
                speed,
                distance,
                initial_position,
            } => {
                let offset = ((self.phase + t) * speed).sin() * distance;
                add(*initial_position, scale(*direction, offset))
            }
            _ => self.position,
        }
    }

    /// Render opacity at level time `t`; only disappearing platforms fade.
    pub fn opacity_at(&self, t: f64) -> f64 {
        match self.kind {
            PlatformKind::Disappearing => {
                let u = (self.phase + t).rem_euclid(DISAPPEAR_CYCLE) / DISAPPEAR_CYCLE;
                if u < DISAPPEAR_OPAQUE_FRACTION {
                    1.0
                } else {
                    1.0 - (u - DISAPPEAR_OPAQUE_FRACTION) / (1.0 - DISAPPEAR_OPAQUE_FRACTION)
                }
            }
            _ => 1.0,
        }
    }

    pub fn is_solid_at(&self, t: f64) -> bool {
        self.opacity_at(t) > SOLID_OPACITY
    }

    /// Collision box at level time `t`, or `None` while faded out.
    pub fn collision_box_at(&self, t: f64) -> Option<Aabb> {
        if !self.is_solid_at(t) {
            return None;
        }
        Some(Aabb::from_center_size(self.center_at(t), self.size))
    }

    /// Copy shifted along the scroll axis.
    pub fn translated(&self, dz: f64) -> Platform {
        let mut out = self.clone();
        out.position = offset_z(out.position, dz);
        if let PlatformKind::Moving {
            initial_position, ..
        } = &mut out.kind
        {
            *initial_position = offset_z(*initial_position, dz);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObstacleKind {
    Spike,
    #[serde(rename_all = "camelCase")]
    RotatingBeam { rotation_speed: f64 },
    #[serde(rename_all = "camelCase")]
    FallingRock { falling_speed: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    pub id: String,
    /// Spawn position; rocks fall from here
    #[ts(type = "[number, number, number]")]
    pub position: Vec3,
    #[ts(type = "[number, number, number]")]
    pub size: Vec3,
    #[serde(flatten)]
    pub kind: ObstacleKind,
    pub phase: f64,
}

impl Obstacle {
    /// Centre at level time `t`.
    pub fn center_at(&self, t: f64) -> Vec3 {
        match self.kind {
            ObstacleKind::FallingRock { falling_speed } => {
                let c = (self.phase + t).rem_euclid(ROCK_CYCLE);
                let half = ROCK_CYCLE / 2.0;
                if c < half {
                    return self.position;
                }
                let y = self.position.y - falling_speed * ROCK_GRAVITY * (c - half);
                if y < ROCK_FLOOR {
                    self.position
                } else {
                    Vec3::new(self.position.x, y, self.position.z)
                }
            }
            _ => self.position,
        }
    }

    /// Yaw around the vertical axis in radians; only beams rotate.
    pub fn yaw_at(&self, t: f64) -> f64 {
        match self.kind {
            ObstacleKind::RotatingBeam { rotation_speed } => (self.phase + t) * rotation_speed,
            _ => 0.0,
        }
    }

    /// Collision box at level time `t`. A rotated beam uses the bounding box of
    /// its rotated footprint.
    pub fn collision_box_at(&self, t: f64) -> Aabb {
        let center = self.center_at(t);
        let yaw = self.yaw_at(t);
        let (sin, cos) = (yaw.sin().abs(), yaw.cos().abs());
        let size = Vec3::new(
            self.size.x * cos + self.size.z * sin,
            self.size.y,
            self.size.x * sin + self.size.z * cos,
        );
        Aabb::from_center_size(center, size)
    }

    pub fn translated(&self, dz: f64) -> Obstacle {
        let mut out = self.clone();
        out.position = offset_z(out.position, dz);
        out
    }
}

/// A contiguous, fully generated slice of the level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LevelSection {
    pub id: String,
    /// Position of this section in the generated sequence
    pub index: u32,
    pub start_offset: f64,
    pub platforms: Vec<Platform>,
    pub obstacles: Vec<Obstacle>,
    #[ts(type = "[number, number, number]")]
    pub finish_position: Vec3,
    pub difficulty: u32,
    /// Extent along the scroll axis, measured from `start_offset`
    pub length: f64,
}

impl LevelSection {
    /// Scroll coordinate where this section ends.
    pub fn end(&self) -> f64 {
        self.start_offset + self.length
    }
}
