//! Tick-synchronous colony scheduler.
//!
//! [`Hivemind::tick`] drives one turn: the [`Overseer`] initializes every
//! directive and overlord in priority order, spawn groups route the creep
//! requests raised during init to the best nearby hatchery, then everything
//! runs and situational evaluators place new directives for what the
//! colonies see.

mod body;
mod colony;
pub mod config;
pub mod directives;
mod hivemind;
pub mod log_capture;
pub mod metrics;
mod overseer;
mod safety;
pub mod sim_world;
mod spawn_group;
mod suspension;
mod task;
mod world;

pub use body::{body_cost, BodyPart, CreepSetup, SpawnRequest, MAX_CREEP_SIZE, SPAWN_TICKS_PER_PART};
pub use colony::{
    Colony, ColonyName, ColonyRegistry, ColonyStage, Hatchery, LogisticsKind, LogisticsRequest,
    LogisticsRequests, Producer, ProducerSet, SpawnOrder, SpawnSlot,
};
pub use config::{load_overseer_config_from_env, Autonomy, OverseerConfig, OverseerConfigError, ServerKind};
pub use directives::{queen_setup, StandingDirective, StandingDirectiveFactory, StandingOverlord};
pub use hivemind::{Hivemind, TickReport};
pub use log_capture::{FieldValue, LogCapture, LogCaptureLayer, LogEnvelope};
pub use metrics::TickMetrics;
pub use overseer::{Overseer, OverseerStats, RegistrationError, TickEnv};
pub use safety::SafetyTracker;
pub use sim_world::SimWorld;
pub use spawn_group::{
    AllocationOutcome, SpawnGroup, SpawnGroupCache, SpawnGroupRegistry, SpawnGroupSettings,
};
pub use suspension::SuspensionLedger;
pub use task::{
    Annotation, Directive, DirectiveFactory, DirectiveKind, FaultLog, Marker, Overlord, Phase,
    PresenceScope, Priority, TaskError, TaskFault, TaskKind, TaskRef, TickContext,
};
pub use world::{
    Controller, DroppedResource, Hostile, HostileTraits, Nuke, PathResult, Position, Remains,
    RoomIntel, RoomName, RoomNameError, RoomSnapshot, RoomType, SafeModeError, Structure,
    StructureKind, Tick, World,
};

pub use overseer_schema::{MemoryError, MemoryImage, SpawnGroupRecord};
