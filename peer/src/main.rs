//! Headless peer.
//!
//! Usage: platformer-peer --name NAME (--create | --join CODE) [OPTIONS]
//!
//! Options:
//!   --relay URL      Relay base url (default: $PLATFORMER_RELAY_URL or ws://127.0.0.1:9001)
//!   --autopilot      Drive the player with the built-in autopilot
//!   --start-after S  Host starts the game after S seconds in the lobby (default: 5)
//!   --seed N         Seed for peer id, color and level seeds

use std::time::{Duration, Instant};

use platformer_peer::autopilot::Autopilot;
use platformer_peer::game::{Game, GameEvent, GamePhase};
use platformer_peer::relay_transport::RelayTransport;
use platformer_shared::config::Config;
use platformer_shared::physics::Controls;
use platformer_shared::player::random_peer_code;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:9001";
const FRAME_RATE: f64 = 60.0;

enum Mode {
    Create,
    Join(String),
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();

    let mut name: Option<String> = None;
    let mut mode: Option<Mode> = None;
    let mut relay =
        std::env::var("PLATFORMER_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string());
    let mut autopilot = false;
    let mut start_after: f64 = 5.0;
    let mut seed: u64 = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                i += 1;
                name = args.get(i).cloned();
            }
            "--create" => mode = Some(Mode::Create),
            "--join" => {
                i += 1;
                mode = args.get(i).cloned().map(Mode::Join);
            }
            "--relay" => {
                i += 1;
                relay = args.get(i).cloned().unwrap_or(relay);
            }
            "--autopilot" => autopilot = true,
            "--start-after" => {
                i += 1;
                start_after = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(5.0);
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(seed);
            }
            other => eprintln!("ignoring unknown argument {}", other),
        }
        i += 1;
    }

    let (Some(name), Some(mode)) = (name, mode) else {
        eprintln!("usage: platformer-peer --name NAME (--create | --join CODE) [--relay URL] [--autopilot]");
        std::process::exit(2);
    };

    let config = Config::default();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let peer_id = random_peer_code(&mut rng);

    let transport = match RelayTransport::open(&relay, &peer_id) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let mut game = match Game::new(transport, config, &name, seed) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let joined = match &mode {
        Mode::Create => game.create_lobby().map(|code| {
            println!("Lobby code: {}", code);
        }),
        Mode::Join(code) => game.join_lobby(code),
    };
    if let Err(e) = joined {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing::info!("peer {} ({}) via {}", peer_id, name, relay);

    let frame = Duration::from_secs_f64(1.0 / FRAME_RATE);
    let mut bot = Autopilot::with_seed(seed as u32);
    let mut lobby_time = 0.0;
    let mut last = Instant::now();

    loop {
        std::thread::sleep(frame);
        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;

        let controls = if autopilot && game.phase() == GamePhase::Playing {
            let platforms = game.level().visible_platforms();
            bot.update(dt, game.local_player(), &platforms)
        } else {
            Controls::default()
        };
        game.frame(dt, controls);

        if game.is_host() && game.phase() == GamePhase::Lobby {
            lobby_time += dt;
            if lobby_time >= start_after {
                lobby_time = 0.0;
                if let Err(e) = game.start_game() {
                    tracing::warn!("could not start: {}", e);
                }
            }
        }

        for event in game.drain_events() {
            match event {
                GameEvent::JoinFailed { lobby_id, reason } => {
                    eprintln!("could not join {}: {}", lobby_id, reason);
                    std::process::exit(1);
                }
                GameEvent::Offline { reason } => {
                    eprintln!("relay lost: {}", reason);
                    std::process::exit(1);
                }
                GameEvent::PhaseChanged(GamePhase::Playing) => {
                    bot.reset();
                    println!("Level {} started", game.current_level());
                }
                GameEvent::PlayerDied { username, .. } => println!("{} died", username),
                GameEvent::LevelComplete { username, .. } => {
                    println!("{} reached the finish", username)
                }
                GameEvent::PeerJoined { username, .. } => println!("{} joined", username),
                GameEvent::PeerLeft { id } => println!("{} left", id),
                GameEvent::HostLost => println!("host left the lobby"),
                other => tracing::debug!("{:?}", other),
            }
        }
    }
}
