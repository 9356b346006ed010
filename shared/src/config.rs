/// Player physics tunables. Every peer must run with identical values.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct PhysicsConfig {
    pub gravity: f64,
    pub jump_force: f64,
    pub move_speed: f64,
    /// Terminal fall speed (positive, applied downward)
    pub max_fall_speed: f64,
    /// Below this height the player has fallen off the level
    pub death_height: f64,
    pub tick_rate_hz: u32,
    /// How far below the feet the grounded probe reaches
    pub ground_probe: f64,
    pub player_half_width: f64,
    /// Player box extends this far below `position.y`
    pub player_height: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 20.0,
            jump_force: 10.0,
            move_speed: 5.0,
            max_fall_speed: 20.0,
            death_height: -10.0,
            tick_rate_hz: 60,
            ground_probe: 0.1,
            player_half_width: 0.5,
            player_height: 1.0,
        }
    }
}

impl PhysicsConfig {
    /// Duration of one fixed physics tick in seconds.
    pub fn tick_dt(&self) -> f64 {
        1.0 / self.tick_rate_hz as f64
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.gravity.is_finite() || self.gravity <= 0.0 {
            return Err("gravity must be finite and > 0".to_string());
        }
        if !self.jump_force.is_finite() || self.jump_force <= 0.0 {
            return Err("jump_force must be finite and > 0".to_string());
        }
        if !self.move_speed.is_finite() || self.move_speed < 0.0 {
            return Err("move_speed must be finite and >= 0".to_string());
        }
        if !self.max_fall_speed.is_finite() || self.max_fall_speed <= 0.0 {
            return Err("max_fall_speed must be finite and > 0".to_string());
        }
        if self.tick_rate_hz == 0 {
            return Err("tick_rate_hz must be > 0".to_string());
        }
        if !self.ground_probe.is_finite() || self.ground_probe <= 0.0 {
            return Err("ground_probe must be finite and > 0".to_string());
        }
        if self.player_half_width <= 0.0 || self.player_height <= 0.0 {
            return Err("player extents must be > 0".to_string());
        }
        Ok(())
    }
}

/// Level streaming configuration
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    pub max_difficulty: u32,
    /// Transition progress gained per second while playing
    pub scroll_rate: f64,
    /// How far the next section slides in over a full transition
    pub conveyor_distance: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            max_difficulty: 10,
            scroll_rate: 0.5,
            conveyor_distance: 5.0,
        }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_difficulty == 0 {
            return Err("max_difficulty must be >= 1".to_string());
        }
        if !self.scroll_rate.is_finite() || self.scroll_rate < 0.0 {
            return Err("scroll_rate must be finite and >= 0".to_string());
        }
        if !self.conveyor_distance.is_finite() {
            return Err("conveyor_distance must be finite".to_string());
        }
        Ok(())
    }
}

/// Game orchestration configuration
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Pose broadcast cadence
    pub update_rate_hz: u32,
    pub finish_radius: f64,
    /// Seconds on the death/complete screen before retry fires by itself
    pub auto_retry_after: f64,
    pub completion_bonus: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: 20,
            finish_radius: 2.0,
            auto_retry_after: 5.0,
            completion_bonus: 100,
        }
    }
}

impl GameConfig {
    pub fn update_interval(&self) -> f64 {
        1.0 / self.update_rate_hz as f64
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_rate_hz == 0 {
            return Err("update_rate_hz must be > 0".to_string());
        }
        if !self.finish_radius.is_finite() || self.finish_radius <= 0.0 {
            return Err("finish_radius must be finite and > 0".to_string());
        }
        if !self.auto_retry_after.is_finite() || self.auto_retry_after < 0.0 {
            return Err("auto_retry_after must be finite and >= 0".to_string());
        }
        Ok(())
    }
}

/// Everything a peer needs to run a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub physics: PhysicsConfig,
    pub level: LevelConfig,
    pub game: GameConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.physics.validate()?;
        self.level.validate()?;
        self.game.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn default_tick_is_one_sixtieth() {
        assert!((PhysicsConfig::default().tick_dt() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn zero_tick_rate_invalid() {
        let mut config = Config::default();
        config.physics.tick_rate_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_gravity_invalid() {
        let mut physics = PhysicsConfig::default();
        physics.gravity = -1.0;
        assert!(physics.validate().is_err());
    }

    #[test]
    fn zero_max_difficulty_invalid() {
        let mut level = LevelConfig::default();
        level.max_difficulty = 0;
        assert!(level.validate().is_err());
    }

    #[test]
    fn update_interval_at_20hz() {
        assert!((GameConfig::default().update_interval() - 0.05).abs() < 1e-12);
    }
}
