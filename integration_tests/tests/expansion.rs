mod common;

use common::{colony_room, room, run_ticks};
use overseer_core::{DirectiveKind, Hivemind, OverseerConfig, RoomIntel, RoomSnapshot, SimWorld};

/// W2N2 colony with two unclaimed neighbours: W3N2 has sources near the
/// shared border, W2N1 has them on its far side.
fn frontier_world(tick: u64) -> SimWorld {
    let mut world = SimWorld::new(tick)
        .with_room(colony_room("W2N2", 4))
        .with_room(RoomSnapshot::new(room("W3N2")).with_sources(&[(45, 20), (44, 24)]))
        .with_room(RoomSnapshot::new(room("W2N1")).with_sources(&[(25, 45), (30, 46)]));
    world.set_role_count(room("W2N2"), "queen", 1);
    world
}

#[test]
fn closest_neighbour_by_source_distance_becomes_an_outpost() -> anyhow::Result<()> {
    let mut hivemind = Hivemind::new(frontier_world(250), OverseerConfig::builtin());
    run_ticks(&mut hivemind, 1)?;

    let outposts: Vec<_> = hivemind
        .overseer()
        .directives_of_kind(DirectiveKind::Outpost)
        .map(|d| d.anchor().room)
        .collect();
    assert_eq!(outposts, vec![room("W3N2")]);

    run_ticks(&mut hivemind, 1)?;
    let colony = hivemind.colonies().get(&room("W2N2")).expect("colony");
    assert_eq!(colony.outposts, vec![room("W3N2")]);
    Ok(())
}

#[test]
fn owned_or_unreachable_neighbours_are_skipped() -> anyhow::Result<()> {
    let mut world = frontier_world(250);
    world.set_intel(
        room("W3N2"),
        RoomIntel {
            owner: Some("neighbour".to_string()),
            reservation: None,
            sources: None,
        },
    );
    world.set_unavailable(room("W2N1"));
    let mut hivemind = Hivemind::new(world, OverseerConfig::builtin());
    run_ticks(&mut hivemind, 1)?;

    assert_eq!(
        hivemind
            .overseer()
            .directives_of_kind(DirectiveKind::Outpost)
            .count(),
        0
    );
    Ok(())
}

#[test]
fn expansion_only_runs_on_the_colony_cadence() -> anyhow::Result<()> {
    let mut hivemind = Hivemind::new(frontier_world(251), OverseerConfig::builtin());
    run_ticks(&mut hivemind, 20)?;
    assert_eq!(
        hivemind
            .overseer()
            .directives_of_kind(DirectiveKind::Outpost)
            .count(),
        0
    );
    Ok(())
}
