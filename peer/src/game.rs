//! Game orchestrator.
//!
//! `Game` owns every piece of mutable game state for one peer: the local
//! player, the level stream, the physics accumulator and the session. All of
//! it is advanced from [`Game::frame`], called once per rendered frame with the
//! wall-clock delta and the current control vector.

use platformer_shared::config::Config;
use platformer_shared::geometry::Aabb;
use platformer_shared::level::LevelStream;
use platformer_shared::physics::{collides, near_finish, Controls, FixedStep, PhysicsEngine, TickOutcome};
use platformer_shared::player::{random_color, validate_username, PlayerState, UsernameError};
use platformer_shared::protocol::Message;
use platformer_shared::vec3::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::session::{LobbySnapshot, Session, SessionEvent};
use crate::transport::{PeerId, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Lobby,
    Playing,
    Dead,
    Complete,
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("only the host can do that")]
    NotHost,
    #[error("already in lobby {0}")]
    AlreadyInLobby(String),
    #[error("not in a lobby")]
    NotInLobby,
    #[error("cannot join your own lobby")]
    OwnLobby,
    #[error("could not connect to lobby {0}")]
    ConnectFailed(String),
}

/// Things the UI layer reacts to. Drained with [`Game::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    LobbyJoined { lobby_id: String },
    JoinFailed { lobby_id: String, reason: String },
    PeerJoined { id: String, username: String },
    PeerLeft { id: String },
    PlayerDied { id: String, username: String },
    LevelComplete { id: String, username: String },
    PhaseChanged(GamePhase),
    ConnectionError { peer: String, reason: String },
    HostLost,
    Offline { reason: String },
}

pub struct Game<T: Transport> {
    config: Config,
    session: Session<T>,
    local: PlayerState,
    level: LevelStream,
    physics: PhysicsEngine,
    step: FixedStep,
    phase: GamePhase,
    /// Numbered level shown to players; bumped by every host retry
    current_level: u32,
    update_timer: f64,
    retry_timer: f64,
    rng: ChaCha8Rng,
    events: Vec<GameEvent>,
}

impl<T: Transport> Game<T> {
    pub fn new(transport: T, config: Config, username: &str, seed: u64) -> Result<Self, GameError> {
        config.validate().map_err(GameError::InvalidConfig)?;
        let username = validate_username(username)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let color = random_color(&mut rng);
        let local = PlayerState::new(transport.local_id(), username, color);
        let level = LevelStream::new(config.level, rng.gen());
        Ok(Self {
            config,
            session: Session::new(transport),
            local,
            level,
            physics: PhysicsEngine::new(config.physics),
            step: FixedStep::new(config.physics.tick_dt()),
            phase: GamePhase::Lobby,
            current_level: 1,
            update_timer: 0.0,
            retry_timer: 0.0,
            rng,
            events: Vec::new(),
        })
    }

    pub fn create_lobby(&mut self) -> Result<String, GameError> {
        if let Some(id) = self.session.lobby_id() {
            return Err(GameError::AlreadyInLobby(id.to_string()));
        }
        let code = self.session.create_lobby(&self.local);
        self.set_phase(GamePhase::Lobby);
        Ok(code)
    }

    /// Start joining the lobby `code`. The join completes (or fails) during a
    /// later `frame`.
    pub fn join_lobby(&mut self, code: &str) -> Result<(), GameError> {
        if let Some(id) = self.session.lobby_id() {
            return Err(GameError::AlreadyInLobby(id.to_string()));
        }
        let code = code.trim().to_uppercase();
        if code == self.local.id {
            return Err(GameError::OwnLobby);
        }
        if !self.session.join_lobby(&code, &self.local) {
            return Err(GameError::ConnectFailed(code));
        }
        self.set_phase(GamePhase::Lobby);
        Ok(())
    }

    pub fn leave_lobby(&mut self) -> Result<(), GameError> {
        if !self.session.in_lobby() {
            return Err(GameError::NotInLobby);
        }
        self.session.leave();
        self.local.reset_pose();
        self.local.score = 0;
        self.level.reset(self.rng.gen());
        self.current_level = 1;
        self.set_phase(GamePhase::Lobby);
        tracing::info!("left lobby");
        Ok(())
    }

    /// Host only: start play for everyone.
    pub fn start_game(&mut self) -> Result<(), GameError> {
        self.require_host()?;
        self.session.broadcast(Message::GameStart);
        self.level.reset(self.rng.gen());
        self.session.broadcast(Message::LevelSync(self.level.snapshot()));
        self.current_level = 1;
        tracing::info!("game started with seed {}", self.level.seed());
        self.begin_playing();
        Ok(())
    }

    /// Retry/continue from the death or complete screen. The host regenerates
    /// the level for everyone; anyone else just resets their own pose and waits
    /// for the host's `new-level`.
    pub fn retry(&mut self) -> Result<(), GameError> {
        if !self.session.in_lobby() {
            return Err(GameError::NotInLobby);
        }
        if !matches!(self.phase, GamePhase::Dead | GamePhase::Complete) {
            tracing::debug!("retry ignored in {:?}", self.phase);
            return Ok(());
        }
        self.retry_timer = 0.0;
        if !self.session.is_host() {
            self.local.reset_pose();
            return Ok(());
        }
        self.level.reset(self.rng.gen());
        self.session.broadcast(Message::NewLevel);
        self.session.broadcast(Message::LevelSync(self.level.snapshot()));
        self.current_level += 1;
        tracing::info!("level {} started", self.current_level);
        self.begin_playing();
        Ok(())
    }

    /// Advance one rendered frame.
    pub fn frame(&mut self, dt: f64, controls: Controls) {
        for event in self.session.pump(&self.local) {
            self.on_session_event(event);
        }

        match self.phase {
            GamePhase::Playing => self.play(dt, controls),
            GamePhase::Dead | GamePhase::Complete => {
                self.retry_timer += dt;
                if self.retry_timer >= self.config.game.auto_retry_after {
                    self.retry_timer = 0.0;
                    if let Err(e) = self.retry() {
                        tracing::debug!("auto retry skipped: {}", e);
                    }
                }
            }
            GamePhase::Lobby => {}
        }
    }

    fn play(&mut self, dt: f64, controls: Controls) {
        if self.level.advance_transition(dt, self.config.level.scroll_rate) && self.session.is_host() {
            self.session
                .broadcast(Message::LevelSync(self.level.snapshot()));
            tracing::info!(
                "advanced to section {} (difficulty {})",
                self.level.current().index,
                self.level.difficulty()
            );
        }
        self.level.advance_clock(dt);

        let platforms = self.level.collision_boxes();
        let obstacles = self.level.obstacle_boxes();
        let finish = self.level.visible_finish();

        self.step.accumulate(dt);
        while self.step.try_tick() {
            let (next, outcome) = self.tick(controls, &platforms, &obstacles, finish);
            match outcome {
                TickOutcome::Continuing => self.local = next,
                TickOutcome::HitObstacle(id) => {
                    tracing::info!("hit obstacle {}", id);
                    self.die();
                    break;
                }
                TickOutcome::Fell => {
                    tracing::info!("fell off the level");
                    self.die();
                    break;
                }
                TickOutcome::ReachedFinish => {
                    self.session.broadcast(Message::LevelComplete {
                        username: self.local.username.clone(),
                    });
                    self.events.push(GameEvent::LevelComplete {
                        id: self.local.id.clone(),
                        username: self.local.username.clone(),
                    });
                    self.enter_complete();
                    break;
                }
            }
        }

        if self.phase != GamePhase::Playing {
            return;
        }
        let interval = self.config.game.update_interval();
        self.update_timer += dt;
        if self.update_timer >= interval {
            // Keep the overshoot so the rate holds at any frame rate, but
            // never bank more than one pending update after a stall
            self.update_timer = (self.update_timer - interval).min(interval);
            self.session
                .broadcast(Message::PlayerUpdate(self.local.to_update()));
        }
    }

    /// One physics tick plus the game's checks. An obstacle hit beats a fall,
    /// and a fall beats reaching the finish.
    fn tick(
        &self,
        controls: Controls,
        platforms: &[Aabb],
        obstacles: &[(String, Aabb)],
        finish: Option<Vec3>,
    ) -> (PlayerState, TickOutcome) {
        let (next, outcome) = self.physics.step(&self.local, controls, platforms);
        let body = self.physics.player_box(next.position);
        if let Some((id, _)) = obstacles.iter().find(|(_, aabb)| collides(&body, aabb)) {
            return (next, TickOutcome::HitObstacle(id.clone()));
        }
        if outcome == TickOutcome::Fell {
            return (next, outcome);
        }
        match finish {
            Some(point) if near_finish(&next, point, self.config.game.finish_radius) => {
                (next, TickOutcome::ReachedFinish)
            }
            _ => (next, TickOutcome::Continuing),
        }
    }

    fn die(&mut self) {
        self.session.broadcast(Message::PlayerDied {
            username: self.local.username.clone(),
        });
        self.events.push(GameEvent::PlayerDied {
            id: self.local.id.clone(),
            username: self.local.username.clone(),
        });
        self.enter_dead();
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LobbyJoined { lobby_id } => {
                self.events.push(GameEvent::LobbyJoined { lobby_id });
            }
            SessionEvent::JoinFailed { lobby_id, reason } => {
                self.events.push(GameEvent::JoinFailed { lobby_id, reason });
            }
            SessionEvent::PeerJoined { id, username } => {
                self.events.push(GameEvent::PeerJoined { id, username });
            }
            SessionEvent::PeerLeft { id } => {
                self.events.push(GameEvent::PeerLeft { id });
            }
            SessionEvent::SyncRequested { peer } => {
                // A late joiner mid-game starts playing, then takes our level
                if self.phase == GamePhase::Playing {
                    self.session.send_to(&peer, Message::GameStart);
                }
                let sync = self.level.snapshot();
                self.session.send_to(&peer, Message::LevelSync(sync));
            }
            SessionEvent::LevelSync(sync) => self.level.apply_sync(&sync),
            SessionEvent::PlayerDied { id, username } => {
                tracing::info!("{} died", username);
                self.events.push(GameEvent::PlayerDied { id, username });
                if self.phase == GamePhase::Playing {
                    self.enter_dead();
                }
            }
            SessionEvent::LevelComplete { id, username } => {
                tracing::info!("{} reached the finish", username);
                self.events.push(GameEvent::LevelComplete { id, username });
                if self.phase == GamePhase::Playing {
                    self.enter_complete();
                }
            }
            SessionEvent::GameStart => {
                let seed = self.level.seed();
                self.level.reset(seed);
                self.current_level = 1;
                self.begin_playing();
            }
            SessionEvent::NewLevel => {
                let seed = self.level.seed();
                self.level.reset(seed);
                self.current_level += 1;
                self.begin_playing();
            }
            SessionEvent::ConnectionError { peer, reason } => {
                self.events.push(GameEvent::ConnectionError { peer, reason });
            }
            SessionEvent::HostLost => {
                tracing::warn!("host left; level can no longer advance");
                self.events.push(GameEvent::HostLost);
            }
            SessionEvent::Offline { reason } => {
                self.events.push(GameEvent::Offline { reason });
                self.set_phase(GamePhase::Lobby);
            }
        }
    }

    fn begin_playing(&mut self) {
        self.local.reset_pose();
        self.step.reset();
        self.update_timer = 0.0;
        self.retry_timer = 0.0;
        self.set_phase(GamePhase::Playing);
    }

    fn enter_dead(&mut self) {
        self.step.reset();
        self.retry_timer = 0.0;
        self.set_phase(GamePhase::Dead);
    }

    fn enter_complete(&mut self) {
        self.step.reset();
        self.retry_timer = 0.0;
        self.local.score += self.config.game.completion_bonus;
        self.set_phase(GamePhase::Complete);
    }

    fn set_phase(&mut self, phase: GamePhase) {
        if self.phase != phase {
            tracing::debug!("phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.events.push(GameEvent::PhaseChanged(phase));
        }
    }

    fn require_host(&self) -> Result<(), GameError> {
        if !self.session.in_lobby() {
            return Err(GameError::NotInLobby);
        }
        if !self.session.is_host() {
            return Err(GameError::NotHost);
        }
        Ok(())
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn local_player(&self) -> &PlayerState {
        &self.local
    }

    pub fn others(&self) -> &BTreeMap<PeerId, PlayerState> {
        self.session.others()
    }

    pub fn level(&self) -> &LevelStream {
        &self.level
    }

    pub fn lobby(&self) -> Option<&LobbySnapshot> {
        self.session.lobby()
    }

    pub fn current_level(&self) -> u32 {
        self.current_level
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Place the local player directly. Used by tools and tests.
    pub fn teleport(&mut self, player: PlayerState) {
        self.local = PlayerState {
            id: self.local.id.clone(),
            ..player
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelEvent, LoopbackHub, LoopbackTransport};
    use platformer_shared::level::{LevelSync, Obstacle, ObstacleKind};
    use platformer_shared::protocol::PeerMessage;
    use platformer_shared::vec3::vec3;

    fn solo(hub: &LoopbackHub, id: &str) -> Game<LoopbackTransport> {
        Game::new(hub.open(id), Config::default(), "solo", 7).unwrap()
    }

    /// A playing host plus a bare channel that records what it broadcasts.
    fn host_with_listener(hub: &LoopbackHub) -> (Game<LoopbackTransport>, LoopbackTransport) {
        let mut game = solo(hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        let mut listener = hub.open("LISTEN");
        assert!(listener.connect("HOST01"));
        // Let the host see the channel, then drop its greeting
        game.frame(0.0, Controls::default());
        listener.poll_events();
        (game, listener)
    }

    fn received_kinds(listener: &mut LoopbackTransport) -> Vec<String> {
        listener
            .poll_events()
            .iter()
            .filter_map(|e| match e {
                ChannelEvent::Message(_, text) => PeerMessage::decode(text).ok(),
                _ => None,
            })
            .map(|m| m.body.kind().to_string())
            .collect()
    }

    /// Replace the current section's obstacles with a single spike.
    fn place_spike(game: &mut Game<LoopbackTransport>, center: Vec3, size: Vec3) {
        let mut section = game.level().current().clone();
        section.obstacles = vec![Obstacle {
            id: "spike-test".to_string(),
            position: center,
            size,
            kind: ObstacleKind::Spike,
            phase: 0.0,
        }];
        game.level.apply_sync(&LevelSync {
            current_section: Some(section),
            ..LevelSync::default()
        });
    }

    #[test]
    fn new_rejects_bad_username() {
        let hub = LoopbackHub::new();
        let err = Game::new(hub.open("A"), Config::default(), "   ", 1);
        assert!(matches!(err, Err(GameError::InvalidUsername(_))));
        let err = Game::new(hub.open("B"), Config::default(), "abcdefghijklmnop", 1);
        assert!(matches!(err, Err(GameError::InvalidUsername(_))));
    }

    #[test]
    fn new_rejects_bad_config() {
        let hub = LoopbackHub::new();
        let mut config = Config::default();
        config.physics.tick_rate_hz = 0;
        let err = Game::new(hub.open("A"), config, "ok", 1);
        assert!(matches!(err, Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn lobby_guards() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        assert!(matches!(game.start_game(), Err(GameError::NotInLobby)));
        assert!(matches!(game.leave_lobby(), Err(GameError::NotInLobby)));
        assert_eq!(game.create_lobby().unwrap(), "HOST01");
        assert!(matches!(
            game.create_lobby(),
            Err(GameError::AlreadyInLobby(_))
        ));
        assert!(matches!(
            game.join_lobby("XYZ"),
            Err(GameError::AlreadyInLobby(_))
        ));

        let mut other = solo(&hub, "OTHER1");
        assert!(matches!(other.join_lobby("other1"), Err(GameError::OwnLobby)));
    }

    #[test]
    fn start_game_plays_and_spawns() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        assert_eq!(game.phase(), GamePhase::Playing);
        assert_eq!(game.local_player().position, vec3(0.0, 1.0, 0.0));
        assert!(game
            .drain_events()
            .contains(&GameEvent::PhaseChanged(GamePhase::Playing)));
    }

    #[test]
    fn standing_on_landing_platform_keeps_playing() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        for _ in 0..30 {
            game.frame(1.0 / 60.0, Controls::default());
        }
        assert_eq!(game.phase(), GamePhase::Playing);
        assert!(game.local_player().is_grounded);
        assert!((game.local_player().position.y - 0.25 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn falling_kills_and_auto_retry_restarts() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        let mut p = game.local_player().clone();
        p.position = vec3(100.0, -9.99, 0.0);
        p.velocity = vec3(0.0, -20.0, 0.0);
        game.teleport(p);
        game.frame(1.0 / 30.0, Controls::default());
        assert_eq!(game.phase(), GamePhase::Dead);
        // Not committed: the fatal tick never lands in local state
        assert!(game.local_player().position.y > -10.0);

        for _ in 0..6 {
            game.frame(1.0, Controls::default());
        }
        assert_eq!(game.phase(), GamePhase::Playing);
        assert_eq!(game.current_level(), 2);
    }

    #[test]
    fn reaching_finish_completes_with_bonus() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        let finish = game.level().current().finish_position;
        let mut p = game.local_player().clone();
        // Standing on the finish platform, 1.1 from the marker
        p.position = vec3(finish.x + 0.5, finish.y + 0.25, finish.z - 1.0);
        game.teleport(p);
        // Zero frame time keeps the transition at zero so the finish stays visible
        game.step.accumulate(1.0 / 60.0);
        game.play(0.0, Controls::default());
        assert_eq!(game.phase(), GamePhase::Complete);
        assert_eq!(game.local_player().score, 100);
    }

    #[test]
    fn retry_outside_death_is_ignored() {
        let hub = LoopbackHub::new();
        let mut game = solo(&hub, "HOST01");
        game.create_lobby().unwrap();
        game.start_game().unwrap();
        game.retry().unwrap();
        assert_eq!(game.current_level(), 1);
    }

    #[test]
    fn player_updates_hold_their_rate_at_any_frame_rate() {
        for fps in [30u32, 60, 120, 144] {
            let hub = LoopbackHub::new();
            let (mut game, mut listener) = host_with_listener(&hub);
            for _ in 0..fps {
                game.frame(1.0 / fps as f64, Controls::default());
            }
            assert_eq!(game.phase(), GamePhase::Playing);
            let updates = received_kinds(&mut listener)
                .iter()
                .filter(|k| k.as_str() == "player-update")
                .count();
            assert!(
                (19..=20).contains(&updates),
                "{} updates in one second at {} fps",
                updates,
                fps
            );
        }
    }

    #[test]
    fn update_timer_does_not_burst_after_a_stall() {
        let hub = LoopbackHub::new();
        let (mut game, mut listener) = host_with_listener(&hub);
        // One long frame, then two empty ones that only look at the timer
        game.play(1.0, Controls::default());
        game.play(0.0, Controls::default());
        game.play(0.0, Controls::default());
        let updates = received_kinds(&mut listener)
            .iter()
            .filter(|k| k.as_str() == "player-update")
            .count();
        assert_eq!(updates, 2);
    }

    #[test]
    fn touching_an_obstacle_kills_and_tells_everyone() {
        let hub = LoopbackHub::new();
        let (mut game, mut listener) = host_with_listener(&hub);
        let start = game.local_player().position;
        // Spike around the spawn point, overlapping the player's body
        place_spike(&mut game, vec3(start.x, start.y - 0.5, start.z), vec3(1.0, 1.0, 1.0));
        game.drain_events();

        game.step.accumulate(1.0 / 60.0);
        game.play(0.0, Controls::default());

        assert_eq!(game.phase(), GamePhase::Dead);
        assert_eq!(game.local_player().position, start);
        assert!(game.drain_events().contains(&GameEvent::PlayerDied {
            id: "HOST01".to_string(),
            username: "solo".to_string(),
        }));
        assert!(received_kinds(&mut listener).contains(&"player-died".to_string()));
    }

    #[test]
    fn obstacle_hit_wins_over_a_fall_in_the_same_tick() {
        let hub = LoopbackHub::new();
        let (mut game, _listener) = host_with_listener(&hub);
        let mut p = game.local_player().clone();
        p.position = vec3(100.0, -9.99, 0.0);
        p.velocity = vec3(0.0, -20.0, 0.0);
        game.teleport(p);
        // Straddles the death height, so the falling tick also lands in it
        place_spike(&mut game, vec3(100.0, -10.3, 0.0), vec3(2.0, 2.0, 2.0));

        let level = game.level();
        let (next, outcome) = game.tick(
            Controls::default(),
            &level.collision_boxes(),
            &level.obstacle_boxes(),
            level.visible_finish(),
        );
        assert!(next.position.y < -10.0);
        assert_eq!(outcome, TickOutcome::HitObstacle("spike-test".to_string()));
    }

    #[test]
    fn fall_wins_over_the_finish_in_the_same_tick() {
        let hub = LoopbackHub::new();
        let (mut game, _listener) = host_with_listener(&hub);
        let mut p = game.local_player().clone();
        p.position = vec3(100.0, -9.99, 0.0);
        p.velocity = vec3(0.0, -20.0, 0.0);
        game.teleport(p);

        // Finish right below, within the horizontal radius
        let finish = Some(vec3(100.0, -10.3, 0.0));
        let (_, outcome) = game.tick(Controls::default(), &[], &[], finish);
        assert_eq!(outcome, TickOutcome::Fell);

        // Above the death height the same finish completes the level
        let mut p = game.local_player().clone();
        p.position = vec3(100.0, 5.0, 0.0);
        p.velocity = vec3(0.0, 0.0, 0.0);
        game.teleport(p);
        let (_, outcome) = game.tick(Controls::default(), &[], &[], finish);
        assert_eq!(outcome, TickOutcome::ReachedFinish);
    }
}
