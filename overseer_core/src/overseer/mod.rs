//! The scheduler: owns every directive and overlord and drives them through
//! the two tick phases.

mod situational;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::colony::{ColonyName, ColonyRegistry};
use crate::config::OverseerConfig;
use crate::safety::SafetyTracker;
use crate::spawn_group::SpawnGroupRegistry;
use crate::suspension::SuspensionLedger;
use crate::task::{
    Annotation, Directive, DirectiveFactory, DirectiveKind, FaultLog, Marker, Overlord,
    OverseerCommand, Phase, PresenceScope, Priority, TaskError, TaskFault, TaskKind, TaskRef,
    TickContext,
};
use crate::world::{Position, RoomName, Tick, World};

use overseer_schema::SuspensionRecords;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("task {0} is already registered")]
    Duplicate(TaskRef),
}

/// Everything outside the scheduler that a phase needs for one tick.
pub struct TickEnv<'a> {
    pub tick: Tick,
    pub config: &'a OverseerConfig,
    pub world: &'a mut dyn World,
    pub colonies: &'a mut ColonyRegistry,
    pub spawn_groups: &'a mut SpawnGroupRegistry,
    pub safety: &'a SafetyTracker,
    pub faults: &'a mut FaultLog,
}

/// Per-tick counters, reset by [`Overseer::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverseerStats {
    pub overlords_suspended: usize,
    pub directives_created: usize,
    pub logistics_requests: usize,
}

struct DirectiveEntry {
    directive: Box<dyn Directive>,
    /// Role -> reference of each overlord this directive spawned.
    overlords: BTreeMap<String, TaskRef>,
    created: Tick,
}

struct OverlordEntry {
    task_ref: TaskRef,
    /// Read once at registration.
    priority: Priority,
    colony: ColonyName,
    initiator: Option<TaskRef>,
    /// Tick of the last `init`; `run` only visits overlords initialized this tick.
    initialized: Option<Tick>,
    overlord: Box<dyn Overlord>,
}

pub struct Overseer {
    tick: Tick,
    directives: Vec<DirectiveEntry>,
    overlords: Vec<OverlordEntry>,
    colony_overlords: BTreeMap<ColonyName, Vec<(Priority, TaskRef)>>,
    sorted: bool,
    suspension: SuspensionLedger,
    factory: Box<dyn DirectiveFactory>,
    pending: Vec<OverseerCommand>,
    stats: OverseerStats,
}

impl Overseer {
    pub fn new(factory: Box<dyn DirectiveFactory>) -> Self {
        Self {
            tick: 0,
            directives: Vec::new(),
            overlords: Vec::new(),
            colony_overlords: BTreeMap::new(),
            sorted: true,
            suspension: SuspensionLedger::new(),
            factory,
            pending: Vec::new(),
            stats: OverseerStats::default(),
        }
    }

    pub fn refresh(&mut self, tick: Tick) {
        self.tick = tick;
        self.stats = OverseerStats::default();
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn stats(&self) -> OverseerStats {
        self.stats
    }

    pub fn suspension(&self) -> &SuspensionLedger {
        &self.suspension
    }

    pub fn load_suspension(&mut self, records: SuspensionRecords) {
        self.suspension = SuspensionLedger::from_records(records);
    }

    // Registration

    /// Registers a directive together with every overlord it spawns.
    pub fn register_directive(
        &mut self,
        mut directive: Box<dyn Directive>,
    ) -> Result<(), RegistrationError> {
        let name = directive.name().clone();
        if self.directive_index(&name).is_some() {
            return Err(RegistrationError::Duplicate(name));
        }

        // Nothing is registered unless the whole batch is.
        let spawned = directive.spawn_overlords();
        for (index, (_, overlord)) in spawned.iter().enumerate() {
            let task_ref = overlord.task_ref();
            let repeated = spawned[..index]
                .iter()
                .any(|(_, earlier)| earlier.task_ref() == task_ref);
            if repeated || self.overlord_index(task_ref).is_some() {
                return Err(RegistrationError::Duplicate(task_ref.clone()));
            }
        }

        let mut owned = BTreeMap::new();
        for (role, overlord) in spawned {
            let task_ref = overlord.task_ref().clone();
            self.register_overlord(overlord, Some(name.clone()))?;
            owned.insert(role, task_ref);
        }

        tracing::debug!(
            target: "overseer::scheduler",
            directive = %name,
            overlords = owned.len(),
            "directive.registered"
        );
        self.directives.push(DirectiveEntry {
            directive,
            overlords: owned,
            created: self.tick,
        });
        Ok(())
    }

    /// Removes a directive and every overlord it owns or initiated.
    pub fn remove_directive(&mut self, name: &TaskRef) -> bool {
        let Some(index) = self.directive_index(name) else {
            return false;
        };
        let entry = self.directives.remove(index);
        for task_ref in entry.overlords.values() {
            self.remove_overlord(task_ref);
        }
        let initiated: Vec<TaskRef> = self
            .overlords
            .iter()
            .filter(|o| o.initiator.as_ref() == Some(name))
            .map(|o| o.task_ref.clone())
            .collect();
        for task_ref in &initiated {
            self.remove_overlord(task_ref);
        }
        tracing::debug!(
            target: "overseer::scheduler",
            directive = %name,
            overlords = entry.overlords.len() + initiated.len(),
            "directive.removed"
        );
        true
    }

    pub fn register_overlord(
        &mut self,
        overlord: Box<dyn Overlord>,
        initiator: Option<TaskRef>,
    ) -> Result<(), RegistrationError> {
        let task_ref = overlord.task_ref().clone();
        if self.overlord_index(&task_ref).is_some() {
            return Err(RegistrationError::Duplicate(task_ref));
        }
        let priority = overlord.priority();
        let colony = *overlord.colony();
        self.colony_overlords
            .entry(colony)
            .or_default()
            .push((priority, task_ref.clone()));
        self.overlords.push(OverlordEntry {
            task_ref,
            priority,
            colony,
            initiator,
            initialized: None,
            overlord,
        });
        self.sorted = false;
        Ok(())
    }

    pub(crate) fn remove_overlord(&mut self, task_ref: &TaskRef) -> bool {
        let Some(index) = self.overlord_index(task_ref) else {
            return false;
        };
        let entry = self.overlords.remove(index);
        self.suspension.forget(task_ref);
        if let Some(list) = self.colony_overlords.get_mut(&entry.colony) {
            list.retain(|(_, r)| r != task_ref);
            if list.is_empty() {
                self.colony_overlords.remove(&entry.colony);
            }
        }
        self.sorted = false;
        true
    }

    // Suspension

    pub fn is_suspended(&mut self, task: &TaskRef) -> bool {
        self.suspension.is_suspended(task, self.tick)
    }

    pub fn suspend_for(&mut self, task: &TaskRef, duration: u64) {
        self.suspension.suspend_for(task, duration, self.tick);
    }

    pub fn suspend_until(&mut self, task: &TaskRef, resume_tick: Tick) {
        self.suspension.suspend_until(task, resume_tick);
    }

    // Tick phases

    pub fn init(&mut self, env: &mut TickEnv<'_>) -> Result<(), TaskFault> {
        self.tick = env.tick;

        for index in 0..self.directives.len() {
            let directive = &mut self.directives[index].directive;
            let name = directive.name().clone();
            let mut ctx = context(env, &mut self.suspension, &mut self.pending);
            let result = directive.init(&mut ctx);
            record_fault(env, &name, TaskKind::Directive, Phase::Init, result)?;
        }
        self.apply_pending();

        if !self.sorted {
            self.sort_overlords();
        }

        for index in 0..self.overlords.len() {
            let entry = &mut self.overlords[index];
            if self.suspension.is_suspended(&entry.task_ref, env.tick) {
                self.stats.overlords_suspended += 1;
                continue;
            }
            entry.initialized = Some(env.tick);
            let mut ctx = context(env, &mut self.suspension, &mut self.pending);
            entry.overlord.pre_init(&mut ctx);
            let result = entry.overlord.init(&mut ctx);
            record_fault(env, &entry.task_ref, TaskKind::Overlord, Phase::Init, result)?;
        }
        self.apply_pending();

        let threshold = env.config.logistics.dropped_resource_threshold;
        for colony in env.colonies.iter_mut() {
            colony.logistics.clear();
            colony.collect_logistics(&*env.world, threshold);
            self.stats.logistics_requests += colony.logistics.len();
        }
        Ok(())
    }

    pub fn run(&mut self, env: &mut TickEnv<'_>) -> Result<(), TaskFault> {
        for index in 0..self.directives.len() {
            let directive = &mut self.directives[index].directive;
            let name = directive.name().clone();
            let mut ctx = context(env, &mut self.suspension, &mut self.pending);
            let result = directive.run(&mut ctx);
            record_fault(env, &name, TaskKind::Directive, Phase::Run, result)?;
        }
        self.apply_pending();

        // Overlords registered since init wait for the next tick's init.
        if !self.sorted {
            self.sort_overlords();
        }
        for index in 0..self.overlords.len() {
            let entry = &mut self.overlords[index];
            if entry.initialized != Some(env.tick)
                || self.suspension.is_suspended(&entry.task_ref, env.tick)
            {
                continue;
            }
            let mut ctx = context(env, &mut self.suspension, &mut self.pending);
            let result = entry.overlord.run(&mut ctx);
            record_fault(env, &entry.task_ref, TaskKind::Overlord, Phase::Run, result)?;
        }
        self.apply_pending();

        for colony in env.colonies.names() {
            self.handle_safe_mode(env, &colony);
            self.place_directives(env, &colony);
        }
        Ok(())
    }

    /// Annotations from every directive and every overlord not suspended.
    pub fn visuals(&mut self) -> Vec<Annotation> {
        let mut out = Vec::new();
        for entry in &self.directives {
            entry.directive.visuals(&mut out);
        }
        for entry in &self.overlords {
            if !self.suspension.is_suspended(&entry.task_ref, self.tick) {
                entry.overlord.visuals(&mut out);
            }
        }
        out
    }

    fn sort_overlords(&mut self) {
        self.overlords.sort_by_key(|entry| entry.priority);
        for list in self.colony_overlords.values_mut() {
            list.sort_by_key(|(priority, _)| *priority);
        }
        self.sorted = true;
        tracing::trace!(
            target: "overseer::scheduler",
            overlords = self.overlords.len(),
            "overlords.sorted"
        );
    }

    fn apply_pending(&mut self) {
        for command in std::mem::take(&mut self.pending) {
            let result = match command {
                OverseerCommand::RegisterDirective(directive) => self.register_directive(directive),
                OverseerCommand::RemoveDirective(name) => {
                    self.remove_directive(&name);
                    Ok(())
                }
                OverseerCommand::RegisterOverlord {
                    overlord,
                    initiator,
                } => self.register_overlord(overlord, initiator),
            };
            if let Err(err) = result {
                tracing::warn!(
                    target: "overseer::scheduler",
                    error = %err,
                    "registration.rejected"
                );
            }
        }
    }

    // Markers and placement

    /// Builds and registers directives for markers that already exist.
    pub fn load_markers(&mut self, markers: impl IntoIterator<Item = Marker>) -> usize {
        let mut loaded = 0;
        for marker in markers {
            if self.directive_index(&marker.name).is_some() {
                continue;
            }
            let Some(directive) = self.factory.build(&marker) else {
                tracing::debug!(
                    target: "overseer::scheduler",
                    marker = %marker.name,
                    "marker.unrecognized"
                );
                continue;
            };
            if self.register_directive(directive).is_ok() {
                loaded += 1;
            }
        }
        loaded
    }

    pub fn is_directive_present(
        &self,
        kind: DirectiveKind,
        pos: &Position,
        scope: PresenceScope,
    ) -> bool {
        self.directives_of_kind(kind)
            .any(|directive| match scope {
                PresenceScope::Position => directive.anchor() == pos,
                PresenceScope::Room => directive.anchor().room == pos.room,
            })
    }

    /// Places a directive of `kind` at `pos` unless one is already present
    /// within `scope`. Returns whether a directive was created.
    pub fn create_directive_if_absent(
        &mut self,
        kind: DirectiveKind,
        pos: Position,
        scope: PresenceScope,
        colony: Option<ColonyName>,
    ) -> bool {
        if self.is_directive_present(kind, &pos, scope) {
            return false;
        }
        let marker = Marker::new(kind, pos, colony, self.tick);
        let Some(directive) = self.factory.build(&marker) else {
            tracing::warn!(
                target: "overseer::scheduler",
                kind = %kind,
                pos = %pos,
                "directive.unbuildable"
            );
            return false;
        };
        match self.register_directive(directive) {
            Ok(()) => {
                self.stats.directives_created += 1;
                tracing::info!(
                    target: "overseer::situational",
                    kind = %kind,
                    pos = %pos,
                    colony = colony.map(|c| c.to_string()).unwrap_or_default(),
                    "directive.created"
                );
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: "overseer::scheduler",
                    error = %err,
                    "registration.rejected"
                );
                false
            }
        }
    }

    // Lookups

    pub fn directive(&self, name: &TaskRef) -> Option<&dyn Directive> {
        self.directive_index(name)
            .map(|index| self.directives[index].directive.as_ref() as &dyn Directive)
    }

    pub fn directive_created(&self, name: &TaskRef) -> Option<Tick> {
        self.directive_index(name)
            .map(|index| self.directives[index].created)
    }

    /// Role -> overlord reference for each overlord `name` owns.
    pub fn owned_overlords(&self, name: &TaskRef) -> Option<&BTreeMap<String, TaskRef>> {
        self.directive_index(name)
            .map(|index| &self.directives[index].overlords)
    }

    pub fn directives(&self) -> impl Iterator<Item = &dyn Directive> + '_ {
        self.directives
            .iter()
            .map(|entry| entry.directive.as_ref() as &dyn Directive)
    }

    pub fn directives_of_kind(
        &self,
        kind: DirectiveKind,
    ) -> impl Iterator<Item = &dyn Directive> + '_ {
        self.directives().filter(move |directive| directive.kind() == kind)
    }

    pub fn directives_in_room(&self, room: RoomName) -> impl Iterator<Item = &dyn Directive> + '_ {
        self.directives()
            .filter(move |directive| directive.anchor().room == room)
    }

    pub fn directive_count(&self) -> usize {
        self.directives.len()
    }

    pub fn overlord(&self, task_ref: &TaskRef) -> Option<&dyn Overlord> {
        self.overlord_index(task_ref)
            .map(|index| self.overlords[index].overlord.as_ref() as &dyn Overlord)
    }

    pub fn overlord_count(&self) -> usize {
        self.overlords.len()
    }

    /// Global scheduling order as of the last sort.
    pub fn overlord_order(&self) -> Vec<TaskRef> {
        self.overlords
            .iter()
            .map(|entry| entry.task_ref.clone())
            .collect()
    }

    pub fn overlords_for_colony(&self, colony: &ColonyName) -> Vec<TaskRef> {
        self.colony_overlords
            .get(colony)
            .map(|list| list.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Rooms held by outpost directives, grouped by owning colony.
    pub fn outpost_rooms(&self) -> BTreeMap<ColonyName, Vec<RoomName>> {
        let mut rooms: BTreeMap<ColonyName, Vec<RoomName>> = BTreeMap::new();
        for directive in self.directives_of_kind(DirectiveKind::Outpost) {
            if let Some(colony) = directive.colony() {
                let list = rooms.entry(*colony).or_default();
                if !list.contains(&directive.anchor().room) {
                    list.push(directive.anchor().room);
                }
            }
        }
        rooms
    }

    pub fn outpost_rooms_of(&self, colony: &ColonyName) -> Vec<RoomName> {
        self.outpost_rooms().remove(colony).unwrap_or_default()
    }

    fn directive_index(&self, name: &TaskRef) -> Option<usize> {
        self.directives
            .iter()
            .position(|entry| entry.directive.name() == name)
    }

    fn overlord_index(&self, task_ref: &TaskRef) -> Option<usize> {
        self.overlords
            .iter()
            .position(|entry| &entry.task_ref == task_ref)
    }
}

fn context<'c>(
    env: &'c mut TickEnv<'_>,
    suspension: &'c mut SuspensionLedger,
    commands: &'c mut Vec<OverseerCommand>,
) -> TickContext<'c> {
    TickContext::new(
        env.tick,
        env.config,
        &*env.world,
        &mut *env.colonies,
        &mut *env.spawn_groups,
        env.safety,
        suspension,
        commands,
    )
}

/// Annotates a failed task result with its origin. Isolated faults are
/// logged and kept; otherwise the fault aborts the phase.
fn record_fault(
    env: &mut TickEnv<'_>,
    task: &TaskRef,
    kind: TaskKind,
    phase: Phase,
    result: Result<(), TaskError>,
) -> Result<(), TaskFault> {
    let Err(source) = result else {
        return Ok(());
    };
    let fault = TaskFault {
        task: task.clone(),
        kind,
        phase,
        tick: env.tick,
        source,
    };
    tracing::warn!(
        target: "overseer::scheduler",
        task = %fault.task,
        kind = %kind,
        phase = %phase,
        error = %fault.source,
        "task.fault"
    );
    if env.config.scheduler.isolate_faults {
        env.faults.push(fault);
        Ok(())
    } else {
        Err(fault)
    }
}
