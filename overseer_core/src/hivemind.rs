//! Tick driver tying the world, colonies, scheduler and spawn allocation
//! together.

use std::sync::Arc;

use overseer_schema::{MemoryImage, MEMORY_VERSION};

use crate::colony::{ColonyRegistry, SpawnOrder};
use crate::config::OverseerConfig;
use crate::directives::StandingDirectiveFactory;
use crate::metrics::TickMetrics;
use crate::overseer::{Overseer, TickEnv};
use crate::safety::SafetyTracker;
use crate::spawn_group::{SpawnGroupCache, SpawnGroupRegistry};
use crate::task::{Annotation, DirectiveFactory, FaultLog, Marker, TaskFault};
use crate::world::{RoomName, World};

#[derive(Debug, Clone)]
pub struct TickReport {
    pub metrics: TickMetrics,
    pub faults: Vec<TaskFault>,
    pub spawned: Vec<SpawnOrder>,
}

pub struct Hivemind<W: World> {
    world: W,
    config: Arc<OverseerConfig>,
    colonies: ColonyRegistry,
    overseer: Overseer,
    spawn_groups: SpawnGroupRegistry,
    safety: SafetyTracker,
    faults: FaultLog,
}

impl<W: World> Hivemind<W> {
    pub fn new(world: W, config: Arc<OverseerConfig>) -> Self {
        Self::with_factory(world, config, Box::new(StandingDirectiveFactory))
    }

    pub fn with_factory(
        world: W,
        config: Arc<OverseerConfig>,
        factory: Box<dyn DirectiveFactory>,
    ) -> Self {
        Self {
            world,
            config,
            colonies: ColonyRegistry::new(),
            overseer: Overseer::new(factory),
            spawn_groups: SpawnGroupRegistry::new(),
            safety: SafetyTracker::new(),
            faults: FaultLog::default(),
        }
    }

    /// Runs one full tick against the world's current state.
    ///
    /// Only returns `Err` when fault isolation is disabled; otherwise faults
    /// are reported in the [`TickReport`].
    pub fn tick(&mut self) -> Result<TickReport, TaskFault> {
        let tick = self.world.tick();
        self.overseer.refresh(tick);
        let outposts = self.overseer.outpost_rooms();
        self.colonies.refresh(&self.world, &outposts);
        let observed: Vec<RoomName> = self
            .colonies
            .iter()
            .flat_map(|colony| colony.room_names())
            .collect();
        self.safety.observe_world(&self.world, &observed);
        self.spawn_groups.refresh();
        self.faults.clear();

        let mut env = TickEnv {
            tick,
            config: &self.config,
            world: &mut self.world,
            colonies: &mut self.colonies,
            spawn_groups: &mut self.spawn_groups,
            safety: &self.safety,
            faults: &mut self.faults,
        };

        self.overseer.init(&mut env)?;
        env.colonies.init_producers(tick);
        let allocation = env
            .spawn_groups
            .init(&mut *env.colonies, self.config.spawning.handoff_ticks);
        self.overseer.run(&mut env)?;
        env.spawn_groups.run();

        let spawned = env.colonies.run_producers(tick);
        for order in &spawned {
            env.world.spawn_creep(order);
        }

        let stats = self.overseer.stats();
        let metrics = TickMetrics {
            tick,
            colonies: self.colonies.len(),
            directives: self.overseer.directive_count(),
            overlords: self.overseer.overlord_count(),
            overlords_suspended: stats.overlords_suspended,
            faults: self.faults.len(),
            spawn_requests_assigned: allocation.assigned,
            spawn_requests_dropped: allocation.dropped,
            creeps_spawned: spawned.len(),
            directives_created: stats.directives_created,
            logistics_requests: stats.logistics_requests,
        };
        tracing::debug!(
            target: "overseer::scheduler",
            tick,
            directives = metrics.directives,
            overlords = metrics.overlords,
            faults = metrics.faults,
            "tick.completed"
        );

        Ok(TickReport {
            metrics,
            faults: self.faults.drain(),
            spawned,
        })
    }

    /// Builds directives for markers that exist before the first tick.
    pub fn load_markers(&mut self, markers: impl IntoIterator<Item = Marker>) -> usize {
        self.overseer.refresh(self.world.tick());
        self.overseer.load_markers(markers)
    }

    pub fn memory(&self) -> MemoryImage {
        MemoryImage {
            version: MEMORY_VERSION,
            suspend_until: self.overseer.suspension().records().clone(),
            spawn_groups: self.spawn_groups.cache().export(),
            safety: self.safety.export(),
        }
    }

    pub fn load_memory(&mut self, image: MemoryImage) {
        self.overseer.load_suspension(image.suspend_until);
        self.spawn_groups =
            SpawnGroupRegistry::with_cache(SpawnGroupCache::import(&image.spawn_groups));
        self.safety = SafetyTracker::import(&image.safety);
    }

    pub fn visuals(&mut self) -> Vec<Annotation> {
        self.overseer.visuals()
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn config(&self) -> &OverseerConfig {
        &self.config
    }

    pub fn overseer(&self) -> &Overseer {
        &self.overseer
    }

    pub fn overseer_mut(&mut self) -> &mut Overseer {
        &mut self.overseer
    }

    pub fn colonies(&self) -> &ColonyRegistry {
        &self.colonies
    }

    pub fn spawn_groups(&self) -> &SpawnGroupRegistry {
        &self.spawn_groups
    }

    pub fn safety(&self) -> &SafetyTracker {
        &self.safety
    }
}
