mod common;

use common::{manual_config, room, run_ticks, world_with_colony};
use overseer_core::{DirectiveKind, Hivemind, Marker, MemoryError, MemoryImage, Position, TaskRef};
use overseer_schema::MEMORY_VERSION;

#[test]
fn memory_image_restores_suspensions_and_spawn_caches() -> anyhow::Result<()> {
    let home = room("W1N1");
    let mut hivemind = Hivemind::new(world_with_colony("W1N1", 5, 10), manual_config());
    let marker = Marker::new(DirectiveKind::Guard, Position::new(home, 12, 12), Some(home), 10);
    hivemind.load_markers([marker.clone()]);
    let sleeper = TaskRef::new("miner:W1N1");
    hivemind.overseer_mut().suspend_until(&sleeper, 900);
    run_ticks(&mut hivemind, 2)?;

    let image = hivemind.memory();
    assert!(image.spawn_groups.contains_key("W1N1"));
    let json = image.to_json()?;

    let mut restored = Hivemind::new(world_with_colony("W1N1", 5, 12), manual_config());
    restored.load_memory(MemoryImage::from_json(&json)?);
    assert_eq!(restored.overseer().suspension().resume_tick(&sleeper), Some(900));
    assert_eq!(
        restored.spawn_groups().cache().get(&home),
        image.spawn_groups.get("W1N1")
    );
    assert_eq!(restored.memory(), image);

    let mut from_bytes = Hivemind::new(world_with_colony("W1N1", 5, 12), manual_config());
    from_bytes.load_memory(MemoryImage::decode_binary(&image.encode_binary()?)?);
    assert_eq!(from_bytes.memory(), image);
    Ok(())
}

#[test]
fn corrupt_memory_is_rejected() {
    assert!(MemoryImage::from_json("{\"version\": \"one\"}").is_err());
}

#[test]
fn memory_from_a_newer_build_is_rejected_in_either_encoding() -> anyhow::Result<()> {
    let newer = MemoryImage {
        version: MEMORY_VERSION + 1,
        ..MemoryImage::default()
    };
    let json = newer.to_json()?;
    assert!(matches!(
        MemoryImage::from_json(&json),
        Err(MemoryError::UnsupportedVersion { .. })
    ));
    assert!(matches!(
        MemoryImage::decode_binary(&newer.encode_binary()?),
        Err(MemoryError::UnsupportedVersion { .. })
    ));
    Ok(())
}
