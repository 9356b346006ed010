//! Fixed-timestep player physics.
//!
//! One call to [`PhysicsEngine::step`] advances a player by exactly one tick of
//! `PhysicsConfig::tick_dt()`. Frames feed a [`FixedStep`] accumulator and drain
//! it in whole ticks so every peer integrates with the same step regardless of
//! frame rate.
//!
//! Obstacle and finish checks are separate predicates ([`collides`],
//! [`near_finish`]); the caller decides their order.

use crate::config::PhysicsConfig;
use crate::geometry::Aabb;
use crate::player::PlayerState;
use crate::vec3::{horizontal_distance, Axis, Vec3};

/// Frames longer than this are clamped before accumulation
const MAX_FRAME_DT: f64 = 0.25;

/// Boolean control vector sampled once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub forward: bool,
    pub backward: bool,
    pub leftward: bool,
    pub rightward: bool,
    pub jump: bool,
}

fn axis_input(positive: bool, negative: bool) -> f64 {
    (positive as i8 - negative as i8) as f64
}

/// Result of one tick as seen by the game.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Continuing,
    Fell,
    HitObstacle(String),
    ReachedFinish,
}

/// Player bounding box for a position: `half_width` around x/z, `height`
/// below the position on y.
pub fn player_box(config: &PhysicsConfig, position: Vec3) -> Aabb {
    Aabb::new(
        Vec3::new(
            position.x - config.player_half_width,
            position.y - config.player_height,
            position.z - config.player_half_width,
        ),
        Vec3::new(
            position.x + config.player_half_width,
            position.y,
            position.z + config.player_half_width,
        ),
    )
}

/// True when the player box overlaps the obstacle box.
pub fn collides(player: &Aabb, obstacle: &Aabb) -> bool {
    player.overlaps(obstacle)
}

/// True when the player is within `radius` of `point` on the ground plane.
pub fn near_finish(player: &PlayerState, point: Vec3, radius: f64) -> bool {
    horizontal_distance(player.position, point) < radius
}

#[derive(Debug, Clone, Copy)]
pub struct PhysicsEngine {
    config: PhysicsConfig,
}

impl PhysicsEngine {
    pub fn new(config: PhysicsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn player_box(&self, position: Vec3) -> Aabb {
        player_box(&self.config, position)
    }

    /// Whether a probe box lowered by `ground_probe` touches any platform.
    pub fn is_grounded(&self, position: Vec3, platforms: &[Aabb]) -> bool {
        let probe = self
            .player_box(position)
            .translated(Vec3::new(0.0, -self.config.ground_probe, 0.0));
        platforms.iter().any(|p| probe.overlaps(p))
    }

    /// Advance `player` by one tick. Only `Continuing` or `Fell` come back from
    /// here; a fallen player is returned without collision resolution.
    pub fn step(
        &self,
        player: &PlayerState,
        controls: Controls,
        platforms: &[Aabb],
    ) -> (PlayerState, TickOutcome) {
        let dt = self.config.tick_dt();
        let mut next = player.clone();

        let grounded = self.is_grounded(player.position, platforms);
        next.is_grounded = grounded;

        if grounded {
            next.velocity.y = 0.0;
            if controls.jump && !player.is_jumping {
                next.velocity.y = self.config.jump_force;
                next.is_jumping = true;
            }
            if player.is_jumping {
                next.is_jumping = false;
            }
        } else {
            next.velocity.y =
                (next.velocity.y - self.config.gravity * dt).max(-self.config.max_fall_speed);
        }

        next.velocity.x = axis_input(controls.rightward, controls.leftward) * self.config.move_speed;
        next.velocity.z = axis_input(controls.backward, controls.forward) * self.config.move_speed;

        next.position.x += next.velocity.x * dt;
        next.position.y += next.velocity.y * dt;
        next.position.z += next.velocity.z * dt;

        if next.position.y < self.config.death_height {
            return (next, TickOutcome::Fell);
        }

        for platform in platforms {
            self.resolve(&mut next, platform);
        }

        (next, TickOutcome::Continuing)
    }

    /// Push the player out of `platform` along the axis of least penetration.
    fn resolve(&self, player: &mut PlayerState, platform: &Aabb) {
        let body = self.player_box(player.position);
        if !body.overlaps(platform) {
            return;
        }

        let ox = body.overlap_on(platform, Axis::X);
        let oy = body.overlap_on(platform, Axis::Y);
        let oz = body.overlap_on(platform, Axis::Z);
        let axis = if ox < oy && ox < oz {
            Axis::X
        } else if oy < ox && oy < oz {
            Axis::Y
        } else {
            Axis::Z
        };
        let depth = body.overlap_on(platform, axis);
        let outward = body.center().get(axis) >= platform.center().get(axis);
        let push = if outward { depth } else { -depth };
        player.position.set(axis, player.position.get(axis) + push);

        if axis == Axis::Y {
            if outward {
                player.velocity.y = 0.0;
                player.is_grounded = true;
            } else {
                player.velocity.y = player.velocity.y.min(0.0);
            }
        }
    }
}

/// Accumulates frame time and hands it out in whole ticks.
#[derive(Debug, Clone, Copy)]
pub struct FixedStep {
    dt: f64,
    accumulator: f64,
}

impl FixedStep {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            accumulator: 0.0,
        }
    }

    pub fn accumulate(&mut self, frame_dt: f64) {
        if frame_dt.is_finite() && frame_dt > 0.0 {
            self.accumulator += frame_dt.min(MAX_FRAME_DT);
        }
    }

    /// Consume one tick if enough time has built up.
    pub fn try_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Drop leftover time, e.g. when the player dies mid-frame.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    #[cfg(test)]
    pub fn pending(&self) -> f64 {
        self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3::vec3;

    fn engine() -> PhysicsEngine {
        PhysicsEngine::new(PhysicsConfig::default())
    }

    fn player_at(x: f64, y: f64, z: f64) -> PlayerState {
        let mut p = PlayerState::new("P1", "tester", "#FF5733");
        p.position = vec3(x, y, z);
        p
    }

    /// Top surface at y = 0
    fn floor() -> Aabb {
        Aabb::from_center_size(vec3(0.0, -0.25, 0.0), vec3(10.0, 0.5, 10.0))
    }

    #[test]
    fn grounded_iff_probe_touches_platform() {
        let e = engine();
        let platforms = [floor()];
        assert!(e.is_grounded(vec3(0.0, 1.0, 0.0), &platforms));
        assert!(e.is_grounded(vec3(0.0, 1.05, 0.0), &platforms));
        assert!(!e.is_grounded(vec3(0.0, 1.2, 0.0), &platforms));
        assert!(!e.is_grounded(vec3(20.0, 1.0, 0.0), &platforms));
        // Idempotent
        for _ in 0..3 {
            assert!(e.is_grounded(vec3(0.0, 1.0, 0.0), &platforms));
        }
    }

    #[test]
    fn resting_player_stays_put() {
        let e = engine();
        let p = player_at(0.0, 1.0, 0.0);
        let (next, outcome) = e.step(&p, Controls::default(), &[floor()]);
        assert_eq!(outcome, TickOutcome::Continuing);
        assert!(next.is_grounded);
        assert_eq!(next.velocity.y, 0.0);
        assert_eq!(next.position, p.position);
    }

    #[test]
    fn gravity_accelerates_to_terminal_speed() {
        let e = engine();
        let mut p = player_at(0.0, 5000.0, 0.0);
        let (next, _) = e.step(&p, Controls::default(), &[]);
        assert!((next.velocity.y + 20.0 / 60.0).abs() < 1e-12);

        for _ in 0..200 {
            p = e.step(&p, Controls::default(), &[]).0;
        }
        assert_eq!(p.velocity.y, -20.0);
    }

    #[test]
    fn jump_from_ground() {
        let e = engine();
        let p = player_at(0.0, 1.0, 0.0);
        let controls = Controls {
            jump: true,
            ..Default::default()
        };
        let (next, _) = e.step(&p, controls, &[floor()]);
        assert_eq!(next.velocity.y, 10.0);
        assert!(next.is_jumping);
        assert!(next.position.y > 1.0);

        // Holding jump in the air does nothing more
        let (after, _) = e.step(&next, controls, &[floor()]);
        assert!(after.velocity.y < 10.0);
    }

    #[test]
    fn landing_clears_jumping() {
        let e = engine();
        let mut p = player_at(0.0, 1.0, 0.0);
        p.is_jumping = true;
        let (next, _) = e.step(&p, Controls::default(), &[floor()]);
        assert!(!next.is_jumping);
    }

    #[test]
    fn horizontal_velocity_is_set_not_accumulated() {
        let e = engine();
        let p = player_at(0.0, 1.0, 0.0);
        let controls = Controls {
            forward: true,
            rightward: true,
            ..Default::default()
        };
        let (a, _) = e.step(&p, controls, &[floor()]);
        let (b, _) = e.step(&a, controls, &[floor()]);
        assert_eq!(b.velocity.x, 5.0);
        assert_eq!(b.velocity.z, -5.0);

        let both = Controls {
            leftward: true,
            rightward: true,
            ..Default::default()
        };
        let (c, _) = e.step(&b, both, &[floor()]);
        assert_eq!(c.velocity.x, 0.0);
    }

    #[test]
    fn falling_below_death_height_reports_fell() {
        let e = engine();
        let p = player_at(0.0, -10.5, 0.0);
        let (_, outcome) = e.step(&p, Controls::default(), &[floor()]);
        assert_eq!(outcome, TickOutcome::Fell);
    }

    #[test]
    fn landing_pushes_up_and_grounds() {
        let e = engine();
        let mut p = player_at(0.0, 0.9, 0.0);
        p.velocity.y = -6.0;
        let (next, outcome) = e.step(&p, Controls::default(), &[floor()]);
        assert_eq!(outcome, TickOutcome::Continuing);
        assert!(next.is_grounded);
        assert_eq!(next.velocity.y, 0.0);
        assert!((next.position.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn head_bump_clamps_upward_velocity() {
        let e = engine();
        // Ceiling bottom at y = 3
        let ceiling = Aabb::from_center_size(vec3(0.0, 3.25, 0.0), vec3(10.0, 0.5, 10.0));
        let mut p = player_at(0.0, 2.95, 0.0);
        p.velocity.y = 8.0;
        let (next, _) = e.step(&p, Controls::default(), &[ceiling]);
        assert!(next.velocity.y <= 0.0);
        assert!(!next.is_grounded);
        assert!(next.position.y <= 3.0 + 1e-9);
    }

    #[test]
    fn side_hit_resolves_on_x() {
        let e = engine();
        // Tall wall with its left face at x = 1
        let wall = Aabb::new(vec3(1.0, -5.0, -5.0), vec3(3.0, 5.0, 5.0));
        let p = player_at(0.45, 1.0, 0.0);
        let controls = Controls {
            rightward: true,
            ..Default::default()
        };
        let (next, _) = e.step(&p, controls, &[wall]);
        assert!((next.position.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_overlap_on_resolved_axis() {
        let e = engine();
        let platforms = [
            floor(),
            Aabb::from_center_size(vec3(3.0, 0.5, 2.0), vec3(3.0, 0.5, 3.0)),
            Aabb::from_center_size(vec3(-2.0, 1.0, -3.0), vec3(2.0, 0.5, 4.0)),
        ];
        for i in 0..40 {
            let x = -4.0 + i as f64 * 0.2;
            let mut p = player_at(x, 0.8 + (i % 5) as f64 * 0.2, 1.0 - (i % 7) as f64 * 0.5);
            p.velocity.y = -3.0;
            for platform in &platforms {
                let before = p.clone();
                e.resolve(&mut p, platform);
                if p.position != before.position {
                    let body = e.player_box(p.position);
                    let moved = Axis::ALL
                        .into_iter()
                        .find(|a| p.position.get(*a) != before.position.get(*a));
                    let axis = moved.unwrap();
                    assert!(body.overlap_on(platform, axis) <= 1e-9);
                }
            }
        }
    }

    #[test]
    fn obstacle_and_finish_predicates() {
        let config = PhysicsConfig::default();
        let spike = Aabb::from_center_size(vec3(0.0, 1.5, 0.0), vec3(1.0, 1.0, 1.0));
        assert!(collides(&player_box(&config, vec3(0.0, 1.5, 0.0)), &spike));
        assert!(!collides(&player_box(&config, vec3(3.0, 1.5, 0.0)), &spike));

        let p = player_at(1.0, 30.0, 1.0);
        assert!(near_finish(&p, vec3(0.0, 1.0, 0.0), 2.0));
        assert!(!near_finish(&p, vec3(0.0, 1.0, 3.0), 2.0));
    }

    #[test]
    fn fixed_step_drains_whole_ticks() {
        let mut step = FixedStep::new(0.125);
        step.accumulate(0.3125);
        assert!(step.try_tick());
        assert!(step.try_tick());
        assert!(!step.try_tick());
        assert_eq!(step.pending(), 0.0625);
        step.reset();
        assert_eq!(step.pending(), 0.0);

        // A long stall only counts for MAX_FRAME_DT
        step.accumulate(10.0);
        let mut ticks = 0;
        while step.try_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }
}
