mod common;

use common::{manual_config, room, run_ticks, world_with_colony, CallLog, Tracer};
use overseer_core::{DirectiveKind, Hivemind, Marker, Position, TaskRef};

#[test]
fn lower_priority_value_runs_first_regardless_of_registration_order() -> anyhow::Result<()> {
    let log = CallLog::default();
    let mut hivemind = Hivemind::new(world_with_colony("W1N1", 5, 1), manual_config());
    hivemind
        .overseer_mut()
        .register_overlord(Tracer::boxed("a", 10, "W1N1", &log), None)?;
    hivemind
        .overseer_mut()
        .register_overlord(Tracer::boxed("b", 5, "W1N1", &log), None)?;

    run_ticks(&mut hivemind, 1)?;

    assert_eq!(
        *log.borrow(),
        vec!["1:init:b", "1:init:a", "1:run:b", "1:run:a"]
    );
    Ok(())
}

#[test]
fn suspension_skips_a_task_until_its_resume_tick() -> anyhow::Result<()> {
    let log = CallLog::default();
    let sleeper = TaskRef::new("sleeper");
    let mut hivemind = Hivemind::new(world_with_colony("W1N1", 5, 100), manual_config());
    hivemind
        .overseer_mut()
        .register_overlord(Tracer::boxed("sleeper", 1, "W1N1", &log), None)?;
    hivemind.overseer_mut().refresh(100);
    hivemind.overseer_mut().suspend_for(&sleeper, 5);

    for tick in 100..=104 {
        run_ticks(&mut hivemind, 1)?;
        assert!(hivemind.overseer_mut().is_suspended(&sleeper), "tick {tick}");
    }
    assert!(log.borrow().is_empty());

    run_ticks(&mut hivemind, 1)?;
    assert!(!hivemind.overseer_mut().is_suspended(&sleeper));
    assert_eq!(*log.borrow(), vec!["105:init:sleeper", "105:run:sleeper"]);
    assert!(hivemind.memory().suspend_until.is_empty());
    Ok(())
}

#[test]
fn removing_a_directive_takes_its_overlords_with_it() -> anyhow::Result<()> {
    let home = room("W1N1");
    let mut hivemind = Hivemind::new(world_with_colony("W1N1", 5, 1), manual_config());
    let marker = Marker::new(DirectiveKind::Guard, Position::new(home, 30, 30), Some(home), 1);
    assert_eq!(hivemind.load_markers([marker.clone()]), 1);
    assert_eq!(hivemind.overseer().overlord_count(), 1);

    run_ticks(&mut hivemind, 3)?;
    assert!(hivemind.overseer_mut().remove_directive(&marker.name));
    assert_eq!(hivemind.overseer().overlord_count(), 0);
    assert!(hivemind.overseer().overlords_for_colony(&home).is_empty());

    run_ticks(&mut hivemind, 1)?;
    assert_eq!(hivemind.overseer().directive_count(), 0);
    Ok(())
}

#[test]
fn guards_retire_once_their_room_stays_quiet() -> anyhow::Result<()> {
    let home = room("W1N1");
    let mut hivemind = Hivemind::new(world_with_colony("W1N1", 5, 1), manual_config());
    let marker = Marker::new(DirectiveKind::Guard, Position::new(home, 30, 30), Some(home), 1);
    hivemind.load_markers([marker.clone()]);

    run_ticks(&mut hivemind, 50)?;
    assert!(hivemind.overseer().directive(&marker.name).is_some());

    run_ticks(&mut hivemind, 70)?;
    assert!(hivemind.overseer().directive(&marker.name).is_none());
    assert_eq!(hivemind.overseer().overlord_count(), 0);
    Ok(())
}
