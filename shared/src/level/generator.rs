//! Procedural level generation.
//!
//! `generate` is pure given its random source: the same difficulty, offset and
//! RNG state always produce the same section. Peers get identical geometry by
//! seeding with [`section_rng`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::entities::{LevelSection, Obstacle, ObstacleKind, Platform, PlatformKind};
use crate::vec3::{vec3, Vec3};

/// Nominal section length before difficulty scaling
pub const BASE_LENGTH: f64 = 40.0;
pub const LENGTH_PER_DIFFICULTY: f64 = 10.0;

/// Gap between the landing platform and the first generated platform
const LANDING_CLEARANCE: f64 = 10.0;
/// Gap between the last generated platform and the finish platform
const FINISH_CLEARANCE: f64 = 10.0;
/// Finish marker sits this far past the finish platform's centre line
const FINISH_MARKER_OFFSET: f64 = 5.0;
/// Section ends this far past the finish marker
const SECTION_TAIL: f64 = 5.0;

const STEP_MIN: f64 = 3.0;
const STEP_MAX: f64 = 6.0;
const LATERAL_SPREAD: f64 = 8.0;
/// Entity animation phases are drawn from [0, PHASE_SPAN)
const PHASE_SPAN: f64 = 10.0;

const LANDING_SIZE: Vec3 = Vec3 {
    x: 10.0,
    y: 0.5,
    z: 10.0,
};
const SMALL_PLATFORM_SIZE: Vec3 = Vec3 {
    x: 3.0,
    y: 0.5,
    z: 3.0,
};

/// RNG for section `index` of a session seeded with `seed`.
pub fn section_rng(seed: u32, index: u32) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    rng.set_stream(index as u64);
    rng
}

/// Nominal length for a difficulty: 40 + 10 * difficulty.
pub fn nominal_length(difficulty: u32) -> f64 {
    BASE_LENGTH + LENGTH_PER_DIFFICULTY * difficulty as f64
}

/// Generate one level section starting at `start_offset` along the scroll axis.
///
/// Difficulties below 1 are treated as 1.
pub fn generate(
    difficulty: u32,
    start_offset: f64,
    index: u32,
    rng: &mut impl Rng,
) -> LevelSection {
    let difficulty = difficulty.max(1);
    let d = difficulty as f64;
    let section_id = format!("section-{index}");

    let platform_count = (nominal_length(difficulty) / 4.0).floor() as usize + difficulty as usize;
    let obstacle_count = (1.5 * d).floor() as usize;

    let mut platforms: Vec<Platform> = Vec::with_capacity(platform_count + 2);
    let mut obstacles: Vec<Obstacle> = Vec::with_capacity(obstacle_count);

    platforms.push(Platform::normal(
        format!("{section_id}-p0"),
        vec3(0.0, 0.0, start_offset),
        LANDING_SIZE,
        rng.gen_range(0.0..PHASE_SPAN),
    ));

    let mut current_z = start_offset + LANDING_CLEARANCE;
    for _ in 0..platform_count {
        let z = current_z + rng.gen_range(STEP_MIN..STEP_MAX);
        let x = rng.gen_range(-LATERAL_SPREAD..LATERAL_SPREAD);
        let y = rng.gen_range(-1.0..1.0_f64) * d * 0.2;
        let position = vec3(x, y, z);
        let id = format!("{section_id}-p{}", platforms.len());
        let roll: f64 = rng.gen();

        let platform = if roll < 0.1 * d && difficulty > 2 {
            Platform {
                id,
                position,
                size: SMALL_PLATFORM_SIZE,
                kind: PlatformKind::Disappearing,
                phase: rng.gen_range(0.0..PHASE_SPAN),
            }
        } else if roll < 0.3 * d && difficulty > 1 {
            let direction = if rng.gen_bool(0.5) {
                vec3(1.0, 0.0, 0.0)
            } else {
                vec3(0.0, 1.0, 0.0)
            };
            Platform {
                id,
                position,
                size: SMALL_PLATFORM_SIZE,
                kind: PlatformKind::Moving {
                    direction,
                    speed: rng.gen_range(0.5..0.5 + d * 0.1),
                    distance: rng.gen_range(2.0..2.0 + d),
                    initial_position: position,
                },
                phase: rng.gen_range(0.0..PHASE_SPAN),
            }
        } else {
            let width = rng.gen_range(2.0..5.0);
            let depth = rng.gen_range(2.0..5.0);
            Platform::normal(
                id,
                position,
                vec3(width, 0.5, depth),
                rng.gen_range(0.0..PHASE_SPAN),
            )
        };
        platforms.push(platform);
        current_z = z;
    }

    for n in 0..obstacle_count {
        // Never anchor on the landing platform
        let anchor = platforms[rng.gen_range(1..platforms.len())].position;
        let x = anchor.x + rng.gen_range(-1.0..1.0_f64);
        let y = anchor.y + 1.0;
        let z = anchor.z + rng.gen_range(-1.0..1.0_f64);
        let id = format!("{section_id}-o{n}");
        let roll: f64 = rng.gen();

        let (position, size, kind) = if roll < 0.4 {
            (vec3(x, y, z), vec3(1.0, 1.0, 1.0), ObstacleKind::Spike)
        } else if roll < 0.7 {
            (
                vec3(x, y + 1.0, z),
                vec3(6.0, 0.5, 0.5),
                ObstacleKind::RotatingBeam {
                    rotation_speed: rng.gen_range(0.5..0.5 + d * 0.2),
                },
            )
        } else {
            (
                vec3(x, y + 5.0, z),
                vec3(2.0, 2.0, 2.0),
                ObstacleKind::FallingRock {
                    falling_speed: rng.gen_range(0.1..0.1 + d * 0.05),
                },
            )
        };
        obstacles.push(Obstacle {
            id,
            position,
            size,
            kind,
            phase: rng.gen_range(0.0..PHASE_SPAN),
        });
    }

    let finish_z = current_z + FINISH_CLEARANCE;
    platforms.push(Platform::normal(
        format!("{section_id}-p{}", platforms.len()),
        vec3(0.0, 0.0, finish_z),
        LANDING_SIZE,
        rng.gen_range(0.0..PHASE_SPAN),
    ));

    let finish_position = vec3(0.0, 1.0, finish_z + FINISH_MARKER_OFFSET);
    LevelSection {
        id: section_id,
        index,
        start_offset,
        platforms,
        obstacles,
        finish_position,
        difficulty,
        length: finish_position.z + SECTION_TAIL - start_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generate_is_total_and_long_enough() {
        for difficulty in 1..=12 {
            for offset in [-500.0, 0.0, 73.5, 10_000.0] {
                let mut rng = section_rng(7, difficulty);
                let section = generate(difficulty, offset, 0, &mut rng);
                assert!(
                    section.length >= nominal_length(difficulty),
                    "difficulty {} offset {}: length {}",
                    difficulty,
                    offset,
                    section.length
                );
                assert_eq!(section.difficulty, difficulty);
                assert_eq!(section.start_offset, offset);
            }
        }
    }

    #[test]
    fn finish_lies_beyond_every_platform() {
        for difficulty in 1..=10 {
            let mut rng = section_rng(99, difficulty);
            let section = generate(difficulty, 120.0, difficulty, &mut rng);
            for p in &section.platforms {
                assert!(section.finish_position.z > p.position.z);
            }
        }
    }

    #[test]
    fn ids_are_unique_within_section() {
        let mut rng = section_rng(3, 0);
        let section = generate(8, 0.0, 0, &mut rng);
        let mut ids = HashSet::new();
        for id in section
            .platforms
            .iter()
            .map(|p| &p.id)
            .chain(section.obstacles.iter().map(|o| &o.id))
        {
            assert!(ids.insert(id.clone()), "duplicate id {}", id);
        }
    }

    #[test]
    fn entity_counts_follow_difficulty() {
        for difficulty in 1..=10u32 {
            let mut rng = section_rng(11, difficulty);
            let section = generate(difficulty, 0.0, 0, &mut rng);
            let expected_platforms =
                (nominal_length(difficulty) / 4.0).floor() as usize + difficulty as usize + 2;
            assert_eq!(section.platforms.len(), expected_platforms);
            assert_eq!(
                section.obstacles.len(),
                (1.5 * difficulty as f64).floor() as usize
            );
        }
    }

    #[test]
    fn difficulty_one_has_only_normal_platforms() {
        for seed in 0..20 {
            let mut rng = section_rng(seed, 0);
            let section = generate(1, 0.0, 0, &mut rng);
            assert!(section
                .platforms
                .iter()
                .all(|p| p.kind == PlatformKind::Normal));
        }
    }

    #[test]
    fn no_disappearing_platforms_below_difficulty_three() {
        for seed in 0..20 {
            let mut rng = section_rng(seed, 0);
            let section = generate(2, 0.0, 0, &mut rng);
            assert!(section
                .platforms
                .iter()
                .all(|p| p.kind != PlatformKind::Disappearing));
        }
    }

    #[test]
    fn landing_and_finish_platforms_are_oversized() {
        let mut rng = section_rng(5, 0);
        let section = generate(4, 30.0, 0, &mut rng);
        let first = section.platforms.first().unwrap();
        let last = section.platforms.last().unwrap();
        assert_eq!(first.position, vec3(0.0, 0.0, 30.0));
        assert_eq!(first.size, LANDING_SIZE);
        assert_eq!(last.size, LANDING_SIZE);
        assert_eq!(section.finish_position.z, last.position.z + 5.0);
    }

    #[test]
    fn same_seed_same_section() {
        let a = generate(6, 15.0, 2, &mut section_rng(42, 2));
        let b = generate(6, 15.0, 2, &mut section_rng(42, 2));
        assert_eq!(a, b);
        let c = generate(6, 15.0, 2, &mut section_rng(43, 2));
        assert_ne!(a, c);
    }

    #[test]
    fn difficulty_zero_is_clamped() {
        let section = generate(0, 0.0, 0, &mut section_rng(1, 0));
        assert_eq!(section.difficulty, 1);
    }
}
