//! Headless driver that produces a control vector from the visible level.
//! Walks toward the nearest platform ahead and jumps when the ground runs out.
use platformer_shared::level::Platform;
use platformer_shared::physics::Controls;
use platformer_shared::player::PlayerState;

/// Lateral dead zone before steering kicks in
const STEER_DEADBAND: f64 = 0.3;
/// Look this far ahead along the scroll axis for ground
const EDGE_LOOKAHEAD: f64 = 0.8;
const JUMP_COOLDOWN: f64 = 0.4;
/// Chance per second of a spontaneous hop
const HOP_RATE: f64 = 0.2;

#[derive(Debug)]
pub struct Autopilot {
    jump_cooldown: f64,
    seed: u32,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self {
            jump_cooldown: 0.0,
            seed: 1,
        }
    }
}

fn over_platform(x: f64, z: f64, platform: &Platform) -> bool {
    let half_x = platform.size.x / 2.0;
    let half_z = platform.size.z / 2.0;
    (x - platform.position.x).abs() <= half_x && (z - platform.position.z).abs() <= half_z
}

impl Autopilot {
    pub fn with_seed(seed: u32) -> Self {
        Self {
            jump_cooldown: 0.0,
            seed: seed.max(1),
        }
    }

    fn next_random(&mut self) -> f64 {
        self.seed = self.seed.wrapping_mul(1664525).wrapping_add(1013904223) & 0x7fff_ffff;
        self.seed as f64 / 0x7fff_ffffu32 as f64
    }

    pub fn update(&mut self, dt: f64, player: &PlayerState, platforms: &[Platform]) -> Controls {
        self.jump_cooldown = (self.jump_cooldown - dt).max(0.0);
        let pos = player.position;

        // Nearest platform whose centre lies ahead of us
        let target = platforms
            .iter()
            .filter(|p| p.position.z > pos.z + 0.5)
            .min_by(|a, b| a.position.z.total_cmp(&b.position.z));

        let mut controls = Controls::default();
        let Some(target) = target else {
            return controls;
        };

        let dx = target.position.x - pos.x;
        controls.rightward = dx > STEER_DEADBAND;
        controls.leftward = dx < -STEER_DEADBAND;
        // The level extends toward +z, which is "backward" on the control vector
        controls.backward = true;

        if player.is_grounded && self.jump_cooldown <= 0.0 {
            let ahead_z = pos.z + EDGE_LOOKAHEAD;
            let ground_ahead = platforms.iter().any(|p| over_platform(pos.x, ahead_z, p));
            let hop = self.next_random() < HOP_RATE * dt;
            if !ground_ahead || hop {
                controls.jump = true;
                self.jump_cooldown = JUMP_COOLDOWN;
            }
        }
        controls
    }

    pub fn reset(&mut self) {
        self.jump_cooldown = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platformer_shared::vec3::vec3;

    fn platform(x: f64, z: f64, depth: f64) -> Platform {
        Platform::normal("p".to_string(), vec3(x, 0.0, z), vec3(3.0, 0.5, depth), 0.0)
    }

    fn grounded_at(x: f64, z: f64) -> PlayerState {
        let mut p = PlayerState::new("A", "bot", "#FF5733");
        p.position = vec3(x, 1.25, z);
        p.is_grounded = true;
        p
    }

    #[test]
    fn steers_toward_next_platform() {
        let mut bot = Autopilot::default();
        let platforms = [platform(0.0, 0.0, 10.0), platform(4.0, 9.0, 3.0)];
        let c = bot.update(0.0, &grounded_at(0.0, 0.0), &platforms);
        assert!(c.rightward && !c.leftward);
        assert!(c.backward && !c.forward);
        assert!(!c.jump);
    }

    #[test]
    fn jumps_at_the_edge() {
        let mut bot = Autopilot::default();
        let platforms = [platform(0.0, 0.0, 10.0), platform(0.0, 9.0, 3.0)];
        let c = bot.update(0.0, &grounded_at(0.0, 4.8), &platforms);
        assert!(c.jump);
        // Cooldown holds the next jump back
        let c = bot.update(0.1, &grounded_at(0.0, 4.8), &platforms);
        assert!(!c.jump);
    }

    #[test]
    fn idles_with_nothing_ahead() {
        let mut bot = Autopilot::default();
        let c = bot.update(0.016, &grounded_at(0.0, 50.0), &[platform(0.0, 0.0, 10.0)]);
        assert_eq!(c, Controls::default());
    }
}
