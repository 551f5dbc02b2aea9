//! Directives, overlords and the context handed to them each tick.

use std::fmt;

use thiserror::Error;

use crate::body::SpawnRequest;
use crate::colony::{Colony, ColonyName, ColonyRegistry, Producer};
use crate::config::OverseerConfig;
use crate::safety::SafetyTracker;
use crate::spawn_group::{SpawnGroupRegistry, SpawnGroupSettings};
use crate::suspension::SuspensionLedger;
use crate::world::{Position, RoomName, Tick, World};

/// Stable identifier of a directive or overlord.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskRef(String);

impl TaskRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference for a child task, e.g. `guard:W1N1:20:20/guard`.
    pub fn child(&self, role: &str) -> Self {
        Self(format!("{}/{}", self.0, role))
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Scheduling priority; lower values run first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(pub u32);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Directive,
    Overlord,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Directive => f.write_str("directive"),
            TaskKind::Overlord => f.write_str("overlord"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => f.write_str("init"),
            Phase::Run => f.write_str("run"),
        }
    }
}

/// Error returned by a task's own `init` or `run`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("{reason}")]
    Failed { reason: String },
    #[error("colony {0} is not registered")]
    MissingColony(ColonyName),
    #[error("room {0} is not visible")]
    MissingRoom(RoomName),
}

impl TaskError {
    pub fn failed(reason: impl Into<String>) -> Self {
        TaskError::Failed {
            reason: reason.into(),
        }
    }
}

/// A [`TaskError`] annotated with the task that raised it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} {task} failed during {phase} at tick {tick}: {source}")]
pub struct TaskFault {
    pub task: TaskRef,
    pub kind: TaskKind,
    pub phase: Phase,
    pub tick: Tick,
    #[source]
    pub source: TaskError,
}

/// Faults collected over one tick.
#[derive(Debug, Default, Clone)]
pub struct FaultLog {
    faults: Vec<TaskFault>,
}

impl FaultLog {
    pub fn push(&mut self, fault: TaskFault) {
        self.faults.push(fault);
    }

    pub fn len(&self) -> usize {
        self.faults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskFault> {
        self.faults.iter()
    }

    pub fn drain(&mut self) -> Vec<TaskFault> {
        std::mem::take(&mut self.faults)
    }

    pub fn clear(&mut self) {
        self.faults.clear();
    }
}

/// Debug text anchored to a position; rendering belongs to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub pos: Option<Position>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Bootstrap,
    OutpostDefense,
    Guard,
    InvasionDefense,
    NukeResponse,
    Outpost,
    Colonize,
    TerminalEvacuation,
    Custom(&'static str),
}

impl DirectiveKind {
    pub const BUILTIN: [DirectiveKind; 8] = [
        DirectiveKind::Bootstrap,
        DirectiveKind::OutpostDefense,
        DirectiveKind::Guard,
        DirectiveKind::InvasionDefense,
        DirectiveKind::NukeResponse,
        DirectiveKind::Outpost,
        DirectiveKind::Colonize,
        DirectiveKind::TerminalEvacuation,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            DirectiveKind::Bootstrap => "bootstrap",
            DirectiveKind::OutpostDefense => "outpost_defense",
            DirectiveKind::Guard => "guard",
            DirectiveKind::InvasionDefense => "invasion_defense",
            DirectiveKind::NukeResponse => "nuke_response",
            DirectiveKind::Outpost => "outpost",
            DirectiveKind::Colonize => "colonize",
            DirectiveKind::TerminalEvacuation => "evacuate_terminal",
            DirectiveKind::Custom(prefix) => prefix,
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::BUILTIN
            .into_iter()
            .find(|kind| kind.prefix() == prefix)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Where an existing directive counts as "already present".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceScope {
    Position,
    Room,
}

/// World anchor a directive is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: TaskRef,
    pub kind: DirectiveKind,
    pub pos: Position,
    pub colony: Option<ColonyName>,
    pub created: Tick,
}

impl Marker {
    pub fn new(kind: DirectiveKind, pos: Position, colony: Option<ColonyName>, created: Tick) -> Self {
        Self {
            name: TaskRef::new(format!("{}:{}", kind.prefix(), pos)),
            kind,
            pos,
            colony,
            created,
        }
    }

    /// Parses `<prefix>:<room>:<x>:<y>` marker names for builtin kinds.
    pub fn parse(name: &str, colony: Option<ColonyName>, created: Tick) -> Option<Self> {
        let mut parts = name.split(':');
        let kind = DirectiveKind::from_prefix(parts.next()?)?;
        let room = RoomName::parse(parts.next()?).ok()?;
        let x: u8 = parts.next()?.parse().ok()?;
        let y: u8 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || x >= 50 || y >= 50 {
            return None;
        }
        Some(Self::new(kind, Position::new(room, x, y), colony, created))
    }
}

/// A standing, location-anchored intent.
pub trait Directive {
    fn name(&self) -> &TaskRef;

    fn kind(&self) -> DirectiveKind;

    fn anchor(&self) -> &Position;

    fn colony(&self) -> Option<&ColonyName>;

    /// Builds the overlords this directive owns, keyed by role. Called once,
    /// when the directive is registered.
    fn spawn_overlords(&mut self) -> Vec<(String, Box<dyn Overlord>)>;

    fn init(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        Ok(())
    }

    fn run(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError>;

    fn visuals(&self, _out: &mut Vec<Annotation>) {}
}

/// A prioritized unit of recurring work.
///
/// `priority` is read once at registration; changing it afterwards has no
/// effect on scheduling order.
pub trait Overlord {
    fn task_ref(&self) -> &TaskRef;

    fn priority(&self) -> Priority;

    fn colony(&self) -> &ColonyName;

    /// Runs before `init` for every non-suspended overlord.
    fn pre_init(&mut self, _ctx: &mut TickContext<'_>) {}

    fn init(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError>;

    fn run(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError>;

    fn visuals(&self, _out: &mut Vec<Annotation>) {}
}

/// Turns markers into directive implementations.
pub trait DirectiveFactory {
    fn build(&self, marker: &Marker) -> Option<Box<dyn Directive>>;
}

/// Registry changes requested by tasks; applied after the current phase.
pub(crate) enum OverseerCommand {
    RegisterDirective(Box<dyn Directive>),
    RemoveDirective(TaskRef),
    RegisterOverlord {
        overlord: Box<dyn Overlord>,
        initiator: Option<TaskRef>,
    },
}

/// What a task can see and touch while it runs.
pub struct TickContext<'c> {
    pub tick: Tick,
    pub config: &'c OverseerConfig,
    pub world: &'c dyn World,
    pub colonies: &'c mut ColonyRegistry,
    pub spawn_groups: &'c mut SpawnGroupRegistry,
    pub safety: &'c SafetyTracker,
    suspension: &'c mut SuspensionLedger,
    commands: &'c mut Vec<OverseerCommand>,
}

impl<'c> TickContext<'c> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tick: Tick,
        config: &'c OverseerConfig,
        world: &'c dyn World,
        colonies: &'c mut ColonyRegistry,
        spawn_groups: &'c mut SpawnGroupRegistry,
        safety: &'c SafetyTracker,
        suspension: &'c mut SuspensionLedger,
        commands: &'c mut Vec<OverseerCommand>,
    ) -> Self {
        Self {
            tick,
            config,
            world,
            colonies,
            spawn_groups,
            safety,
            suspension,
            commands,
        }
    }

    pub fn colony(&self, name: &ColonyName) -> Option<&Colony> {
        self.colonies.get(name)
    }

    pub fn is_suspended(&mut self, task: &TaskRef) -> bool {
        self.suspension.is_suspended(task, self.tick)
    }

    pub fn suspend_for(&mut self, task: &TaskRef, duration: u64) {
        self.suspension.suspend_for(task, duration, self.tick);
    }

    pub fn suspend_until(&mut self, task: &TaskRef, resume_tick: Tick) {
        self.suspension.suspend_until(task, resume_tick);
    }

    pub fn register_directive(&mut self, directive: Box<dyn Directive>) {
        self.commands
            .push(OverseerCommand::RegisterDirective(directive));
    }

    pub fn remove_directive(&mut self, name: &TaskRef) {
        self.commands
            .push(OverseerCommand::RemoveDirective(name.clone()));
    }

    pub fn register_overlord(&mut self, overlord: Box<dyn Overlord>, initiator: Option<TaskRef>) {
        self.commands.push(OverseerCommand::RegisterOverlord {
            overlord,
            initiator,
        });
    }

    /// Routes a request through the spawn group `owner` holds at `anchor`.
    pub fn request_spawn(
        &mut self,
        owner: &TaskRef,
        anchor: RoomName,
        settings: SpawnGroupSettings,
        request: SpawnRequest,
    ) {
        self.spawn_groups.enqueue(
            owner,
            anchor,
            settings,
            request,
            self.tick,
            self.world,
            &*self.colonies,
            self.config,
        );
    }

    /// Queues a request directly on a colony's own hatchery.
    pub fn enqueue_at_colony(
        &mut self,
        colony: &ColonyName,
        request: SpawnRequest,
    ) -> Result<(), TaskError> {
        let hatchery = self
            .colonies
            .get_mut(colony)
            .ok_or(TaskError::MissingColony(*colony))?
            .hatchery
            .as_mut()
            .ok_or_else(|| TaskError::failed(format!("colony {colony} has no hatchery")))?;
        hatchery.enqueue(request);
        Ok(())
    }
}
