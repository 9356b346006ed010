use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::vec3::Vec3;

pub const MAX_USERNAME_LEN: usize = 15;

/// Display colors handed out to players.
pub const PLAYER_COLORS: [&str; 6] = [
    "#FF5733", "#33FF57", "#3357FF", "#F033FF", "#FF33F9", "#33FFF5",
];

/// Where every player starts a level.
pub const SPAWN_POSITION: Vec3 = Vec3 {
    x: 0.0,
    y: 1.0,
    z: 0.0,
};

/// Full state of one player. Owned by its peer, mirrored everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    pub username: String,
    #[ts(type = "[number, number, number]")]
    pub position: Vec3,
    #[ts(type = "[number, number, number]")]
    pub velocity: Vec3,
    pub is_jumping: bool,
    pub is_grounded: bool,
    pub score: u32,
    pub color: String,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, username: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            position: SPAWN_POSITION,
            velocity: Vec3::ZERO,
            is_jumping: false,
            is_grounded: false,
            score: 0,
            color: color.into(),
        }
    }

    /// Put the player back at the spawn point, keeping identity and score.
    pub fn reset_pose(&mut self) {
        self.position = SPAWN_POSITION;
        self.velocity = Vec3::ZERO;
        self.is_jumping = false;
        self.is_grounded = false;
    }

    /// Fields broadcast on the periodic update cadence.
    pub fn to_update(&self) -> PlayerUpdate {
        PlayerUpdate {
            position: Some(self.position),
            velocity: Some(self.velocity),
            is_jumping: Some(self.is_jumping),
            is_grounded: Some(self.is_grounded),
            score: Some(self.score),
        }
    }

    /// Merge a partial update; absent fields are left unchanged.
    pub fn apply_update(&mut self, update: &PlayerUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(velocity) = update.velocity {
            self.velocity = velocity;
        }
        if let Some(is_jumping) = update.is_jumping {
            self.is_jumping = is_jumping;
        }
        if let Some(is_grounded) = update.is_grounded {
            self.is_grounded = is_grounded;
        }
        if let Some(score) = update.score {
            self.score = score;
        }
    }
}

/// Partial player state carried by `player-update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "[number, number, number] | null")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "[number, number, number] | null")]
    pub velocity: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_jumping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_grounded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username must not be empty")]
    Empty,
    #[error("username must be 15 characters or less (got {0})")]
    TooLong(usize),
}

/// Trim and check a submitted username.
pub fn validate_username(raw: &str) -> Result<String, UsernameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UsernameError::Empty);
    }
    let len = trimmed.chars().count();
    if len > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong(len));
    }
    Ok(trimmed.to_string())
}

/// Pick a display color from the palette.
pub fn random_color(rng: &mut impl Rng) -> &'static str {
    PLAYER_COLORS.choose(rng).copied().unwrap_or(PLAYER_COLORS[0])
}

/// Generate a 6-character uppercase peer code, also used as a lobby code.
pub fn random_peer_code(rng: &mut impl Rng) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
