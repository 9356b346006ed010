//! Two-section level double buffer.
//!
//! The stream keeps the section being played (`current`) and the one sliding
//! in behind it (`next`). Each section is generated in world coordinates
//! starting at its `start_offset`; while a transition is in progress the next
//! section is drawn `conveyor_distance * transition` short of the current
//! section's end.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::entities::{LevelSection, Obstacle, Platform};
use super::generator::{generate, section_rng};
use crate::config::LevelConfig;
use crate::geometry::Aabb;
use crate::vec3::Vec3;

/// Authoritative level fields pushed by the host. Absent fields are left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(rename_all = "camelCase")]
pub struct LevelSync {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section: Option<LevelSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_section: Option<LevelSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_sections: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<f64>,
}

/// Difficulty after `completed` sections: one step every two sections.
pub fn difficulty_for(completed: u32, max_difficulty: u32) -> u32 {
    (completed / 2 + 1).min(max_difficulty)
}

#[derive(Debug, Clone)]
pub struct LevelStream {
    config: LevelConfig,
    seed: u32,
    current: LevelSection,
    next: Option<LevelSection>,
    transition: f64,
    completed: u32,
    difficulty: u32,
    /// Level time driving moving/fading/falling entities
    clock: f64,
}

impl LevelStream {
    pub fn new(config: LevelConfig, seed: u32) -> Self {
        let current = generate(1, 0.0, 0, &mut section_rng(seed, 0));
        let mut stream = Self {
            config,
            seed,
            current,
            next: None,
            transition: 0.0,
            completed: 0,
            difficulty: 1,
            clock: 0.0,
        };
        stream.initialize();
        stream
    }

    /// Generate the first two sections at difficulty 1 and zero the counters.
    pub fn initialize(&mut self) {
        self.current = generate(1, 0.0, 0, &mut section_rng(self.seed, 0));
        self.next = Some(generate(
            1,
            self.current.end(),
            1,
            &mut section_rng(self.seed, 1),
        ));
        self.transition = 0.0;
        self.completed = 0;
        self.difficulty = 1;
        self.clock = 0.0;
    }

    /// Start over with a new seed.
    pub fn reset(&mut self, seed: u32) {
        self.seed = seed;
        self.initialize();
    }

    /// Move the transition forward by `delta * scroll_rate`. Returns true when
    /// this reached the end and the stream advanced to the next section.
    pub fn advance_transition(&mut self, delta: f64, scroll_rate: f64) -> bool {
        self.transition = (self.transition + delta * scroll_rate).min(1.0);
        if self.transition >= 1.0 {
            self.advance_to_next();
            return true;
        }
        false
    }

    pub fn advance_to_next(&mut self) {
        let next = match self.next.take() {
            Some(next) => next,
            None => {
                let index = self.current.index + 1;
                generate(
                    self.difficulty,
                    self.current.end(),
                    index,
                    &mut section_rng(self.seed, index),
                )
            }
        };
        self.current = next;
        self.completed += 1;
        self.difficulty = difficulty_for(self.completed, self.config.max_difficulty);

        let index = self.current.index + 1;
        self.next = Some(generate(
            self.difficulty,
            self.current.end(),
            index,
            &mut section_rng(self.seed, index),
        ));
        self.transition = 0.0;
        tracing::debug!(
            completed = self.completed,
            difficulty = self.difficulty,
            "advanced to section {}",
            self.current.index
        );
    }

    pub fn advance_clock(&mut self, dt: f64) {
        self.clock += dt;
    }

    /// The next section while it is sliding in, with the z shift that places it.
    fn incoming(&self) -> Option<(&LevelSection, f64)> {
        if self.transition <= 0.0 {
            return None;
        }
        let next = self.next.as_ref()?;
        let placed_at = self.current.end() - self.transition * self.config.conveyor_distance;
        Some((next, placed_at - next.start_offset))
    }

    pub fn visible_platforms(&self) -> Vec<Platform> {
        let mut platforms = self.current.platforms.clone();
        if let Some((next, dz)) = self.incoming() {
            platforms.extend(next.platforms.iter().map(|p| p.translated(dz)));
        }
        platforms
    }

    pub fn visible_obstacles(&self) -> Vec<Obstacle> {
        let mut obstacles = self.current.obstacles.clone();
        if let Some((next, dz)) = self.incoming() {
            obstacles.extend(next.obstacles.iter().map(|o| o.translated(dz)));
        }
        obstacles
    }

    /// Finish marker of the current section, hidden while a transition runs.
    pub fn visible_finish(&self) -> Option<Vec3> {
        if self.next.is_some() && self.transition > 0.0 {
            return None;
        }
        Some(self.current.finish_position)
    }

    /// Boxes of every solid visible platform at the current clock.
    pub fn collision_boxes(&self) -> Vec<Aabb> {
        self.visible_platforms()
            .iter()
            .filter_map(|p| p.collision_box_at(self.clock))
            .collect()
    }

    pub fn obstacle_boxes(&self) -> Vec<(String, Aabb)> {
        self.visible_obstacles()
            .into_iter()
            .map(|o| {
                let aabb = o.collision_box_at(self.clock);
                (o.id, aabb)
            })
            .collect()
    }

    /// Everything a peer needs to reproduce this stream.
    pub fn snapshot(&self) -> LevelSync {
        LevelSync {
            current_section: Some(self.current.clone()),
            next_section: self.next.clone(),
            transition: Some(self.transition),
            seed: Some(self.seed),
            completed_sections: Some(self.completed),
            clock: Some(self.clock),
        }
    }

    /// Overwrite local fields from a host sync.
    pub fn apply_sync(&mut self, sync: &LevelSync) {
        if let Some(seed) = sync.seed {
            self.seed = seed;
        }
        if let Some(current) = &sync.current_section {
            self.current = current.clone();
        }
        if let Some(next) = &sync.next_section {
            self.next = Some(next.clone());
        }
        if let Some(transition) = sync.transition {
            self.transition = transition.clamp(0.0, 1.0);
        }
        if let Some(completed) = sync.completed_sections {
            self.completed = completed;
            self.difficulty = difficulty_for(completed, self.config.max_difficulty);
        }
        if let Some(clock) = sync.clock {
            self.clock = clock;
        }
    }

    pub fn current(&self) -> &LevelSection {
        &self.current
    }

    pub fn next(&self) -> Option<&LevelSection> {
        self.next.as_ref()
    }

    pub fn transition(&self) -> f64 {
        self.transition
    }

    pub fn completed_sections(&self) -> u32 {
        self.completed
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }
}
