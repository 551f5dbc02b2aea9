use std::env;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use overseer_core::{
    load_overseer_config_from_env, Controller, Hivemind, Hostile, LogCapture, Position, RoomIntel,
    RoomName, RoomSnapshot, SimWorld, StructureKind, World,
};

const DEFAULT_TICKS: u64 = 500;
const DEFAULT_INVASION_TICK: u64 = 200;
const INVASION_LENGTH: u64 = 40;

fn main() {
    let capture = LogCapture::new();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .with(capture.layer())
        .init();

    let (config, config_path) = load_overseer_config_from_env();
    let ticks = read_env_u64("HEADLESS_TICKS").unwrap_or(DEFAULT_TICKS);
    let invasion_tick = read_env_u64("HEADLESS_INVASION_TICK").unwrap_or(DEFAULT_INVASION_TICK);

    let home = room("W1N1");
    let mut hivemind = Hivemind::new(build_world(), config);
    info!(
        target: "overseer::headless",
        ticks,
        invasion_tick,
        config = config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
        "headless.ready"
    );

    for _ in 0..ticks {
        let tick = hivemind.world().tick();
        if tick == invasion_tick {
            if let Some(snapshot) = hivemind.world_mut().room_mut(&home) {
                for x in 10..13 {
                    snapshot.hostiles.push(Hostile::invader(Position::new(home, x, 3)));
                }
            }
            info!(target: "overseer::headless", room = %home, "invasion.started");
        } else if tick == invasion_tick + INVASION_LENGTH {
            if let Some(snapshot) = hivemind.world_mut().room_mut(&home) {
                snapshot.hostiles.clear();
            }
            info!(target: "overseer::headless", room = %home, "invasion.ended");
        }

        match hivemind.tick() {
            Ok(report) => {
                let warnings = capture.drain_warnings().len();
                info!(
                    target: "overseer::headless",
                    warnings,
                    "{}",
                    report.metrics.summary()
                );
            }
            Err(fault) => {
                error!(target: "overseer::headless", error = %fault, "headless.aborted");
                break;
            }
        }
        hivemind.world_mut().advance();
    }

    let memory = hivemind.memory();
    match memory.to_json().and_then(|json| Ok((json, memory.encode_binary()?))) {
        Ok((json, bytes)) => info!(
            target: "overseer::headless",
            json_bytes = json.len(),
            binary_bytes = bytes.len(),
            directives = hivemind.overseer().directive_count(),
            "headless.finished"
        ),
        Err(err) => error!(target: "overseer::headless", error = %err, "memory.encode_failed"),
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn room(name: &str) -> RoomName {
    RoomName::parse(name).unwrap_or_else(|err| panic!("builtin room name: {err}"))
}

/// Three colonies of different maturity plus a ring of unclaimed rooms.
fn build_world() -> SimWorld {
    let mut world = SimWorld::new(1);

    let colonies = [("W1N1", 7u8, 2_300u32), ("W4N1", 8, 5_600), ("W2N3", 4, 1_300)];
    for (name, level, capacity) in colonies {
        let name = room(name);
        let mut snapshot = RoomSnapshot::owned(name, level)
            .with_structure(StructureKind::Spawn, 24, 20)
            .with_structure(StructureKind::Tower, 26, 22)
            .with_energy(capacity, capacity)
            .with_sources(&[(8, 8), (42, 40)]);
        if level >= 5 {
            snapshot = snapshot
                .with_structure(StructureKind::Storage, 25, 27)
                .with_structure(StructureKind::Terminal, 27, 27)
                .with_structure(StructureKind::Spawn, 22, 20);
        }
        world.insert_room(snapshot);
        world.set_role_count(name, "queen", 1);
    }

    for name in ["W2N1", "W1N2", "W3N2", "W2N2"] {
        let name = room(name);
        let mut snapshot = RoomSnapshot::new(name).with_sources(&[(12, 30), (35, 14)]);
        snapshot.controller = Some(Controller::neutral(Position::new(name, 25, 25)));
        world.insert_room(snapshot);
        world.set_intel(
            name,
            RoomIntel {
                owner: None,
                reservation: None,
                sources: Some(vec![Position::new(name, 12, 30), Position::new(name, 35, 14)]),
            },
        );
    }
    world
}
