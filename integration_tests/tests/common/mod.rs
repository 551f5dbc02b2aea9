#![allow(dead_code)]

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use overseer_core::{
    ColonyName, Hivemind, Overlord, OverseerConfig, Priority, RoomName, RoomSnapshot, SimWorld,
    StructureKind, TaskError, TaskRef, TickContext,
};

pub fn fixture_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_overseer_config.json")
}

pub fn room(name: &str) -> RoomName {
    RoomName::parse(name).expect("valid room name")
}

/// Builtin tuning with automatic expansion switched off, so only the
/// behaviour under test places directives.
pub fn manual_config() -> Arc<OverseerConfig> {
    let mut config = (*OverseerConfig::builtin()).clone();
    config.expansion.autonomy = overseer_core::Autonomy::Manual;
    Arc::new(config)
}

/// A healthy colony: spawn, storage, terminal, full energy.
pub fn colony_room(name: &str, level: u8) -> RoomSnapshot {
    RoomSnapshot::owned(room(name), level)
        .with_structure(StructureKind::Spawn, 20, 20)
        .with_structure(StructureKind::Storage, 22, 22)
        .with_structure(StructureKind::Terminal, 24, 22)
        .with_energy(1_800, 1_800)
        .with_sources(&[(10, 10), (40, 40)])
}

pub fn world_with_colony(name: &str, level: u8, tick: u64) -> SimWorld {
    let mut world = SimWorld::new(tick).with_room(colony_room(name, level));
    world.set_role_count(room(name), "queen", 1);
    world
}

pub fn run_ticks(hivemind: &mut Hivemind<SimWorld>, ticks: u64) -> anyhow::Result<()> {
    for _ in 0..ticks {
        let report = hivemind.tick()?;
        anyhow::ensure!(
            report.faults.is_empty(),
            "unexpected faults: {:?}",
            report.faults
        );
        hivemind.world_mut().advance();
    }
    Ok(())
}

pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Overlord that only records when the scheduler visits it.
pub struct Tracer {
    pub task_ref: TaskRef,
    pub priority: Priority,
    pub colony: ColonyName,
    pub log: CallLog,
}

impl Tracer {
    pub fn boxed(name: &str, priority: u32, colony: &str, log: &CallLog) -> Box<dyn Overlord> {
        Box::new(Self {
            task_ref: TaskRef::new(name),
            priority: Priority(priority),
            colony: room(colony),
            log: Rc::clone(log),
        })
    }
}

impl Overlord for Tracer {
    fn task_ref(&self) -> &TaskRef {
        &self.task_ref
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn colony(&self) -> &ColonyName {
        &self.colony
    }

    fn init(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        self.log
            .borrow_mut()
            .push(format!("{}:init:{}", ctx.tick, self.task_ref));
        Ok(())
    }

    fn run(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        self.log
            .borrow_mut()
            .push(format!("{}:run:{}", ctx.tick, self.task_ref));
        Ok(())
    }
}
