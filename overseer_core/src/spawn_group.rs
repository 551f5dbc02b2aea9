//! Decentralized spawn allocation.
//!
//! A spawn group routes requests raised at an anchor room to whichever nearby
//! colony can start them soonest. Which colonies are close enough, and how
//! far away they are, is cached per anchor in [`SpawnGroupCache`] and shared
//! by every group at that anchor; each group then narrows the cached set with
//! its own [`SpawnGroupSettings`].

use std::collections::BTreeMap;

use overseer_schema::SpawnGroupRecord;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Deserialize;

use crate::body::SpawnRequest;
use crate::colony::{ColonyName, ProducerSet};
use crate::config::OverseerConfig;
use crate::task::TaskRef;
use crate::world::{RoomName, Tick, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpawnGroupSettings {
    pub max_path_distance: u32,
    pub required_level: u8,
    /// When false only full-size bodies are acceptable.
    pub flexible_energy: bool,
}

impl Default for SpawnGroupSettings {
    fn default() -> Self {
        Self {
            max_path_distance: 400,
            required_level: 7,
            flexible_energy: true,
        }
    }
}

impl SpawnGroupSettings {
    pub fn with_max_path_distance(mut self, distance: u32) -> Self {
        self.max_path_distance = distance;
        self
    }

    pub fn with_required_level(mut self, level: u8) -> Self {
        self.required_level = level;
        self
    }

    pub fn with_flexible_energy(mut self, flexible: bool) -> Self {
        self.flexible_energy = flexible;
        self
    }
}

/// Anchor room -> cached producer eligibility.
#[derive(Debug, Clone, Default)]
pub struct SpawnGroupCache {
    records: BTreeMap<RoomName, SpawnGroupRecord>,
}

impl SpawnGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, anchor: &RoomName) -> Option<&SpawnGroupRecord> {
        self.records.get(anchor)
    }

    pub fn insert(&mut self, anchor: RoomName, record: SpawnGroupRecord) {
        self.records.insert(anchor, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read-through accessor: recomputes the record when missing or expired.
    pub fn ensure_fresh(
        &mut self,
        anchor: RoomName,
        tick: Tick,
        world: &dyn World,
        config: &OverseerConfig,
    ) -> &SpawnGroupRecord {
        let record = self.records.entry(anchor).or_default();
        if record.is_expired(tick) {
            *record = Self::recompute(anchor, tick, world, config);
            tracing::debug!(
                target: "overseer::spawn",
                anchor = %anchor,
                colonies = record.colonies.len(),
                average_distance = record.average_distance().unwrap_or_default(),
                expiration = record.expiration,
                "spawn_group.recached"
            );
        }
        record
    }

    /// Builds a fresh record for `anchor`.
    ///
    /// Uses the fixed spawning bounds from config, never a group's own
    /// settings, and depends only on world state and `tick`: two calls in the
    /// same tick produce the same record.
    pub fn recompute(
        anchor: RoomName,
        tick: Tick,
        world: &dyn World,
        config: &OverseerConfig,
    ) -> SpawnGroupRecord {
        let spawning = &config.spawning;
        let mut record = SpawnGroupRecord::default();

        for colony in world.owned_rooms() {
            if colony.linear_distance(&anchor) > spawning.max_linear_distance {
                continue;
            }
            let Some(spawn) = world.room(&colony).and_then(|room| room.spawns().next()) else {
                continue;
            };
            let Some(route) = world.find_route(&colony, &anchor) else {
                continue;
            };
            let path = world.find_path_to_room(&spawn.pos, &anchor, &route);
            if path.incomplete || path.length > spawning.max_path_distance {
                continue;
            }

            let key = colony.to_string();
            record.colonies.push(key.clone());
            record.distances.insert(key.clone(), path.length);
            let mut rooms: BTreeMap<String, bool> =
                route.iter().map(|room| (room.to_string(), true)).collect();
            rooms.insert(key.clone(), true);
            record.routes.insert(key, rooms);
        }

        let mut rng = SmallRng::seed_from_u64(recache_seed(anchor, config.seed ^ tick));
        let jitter = rng.gen_range(0..=spawning.recache_jitter);
        record.expiration = tick + spawning.recache_ticks(config.server) + jitter;
        record
    }

    pub fn export(&self) -> BTreeMap<String, SpawnGroupRecord> {
        self.records
            .iter()
            .map(|(anchor, record)| (anchor.to_string(), record.clone()))
            .collect()
    }

    pub fn import(records: &BTreeMap<String, SpawnGroupRecord>) -> Self {
        let records = records
            .iter()
            .filter_map(|(anchor, record)| Some((RoomName::parse(anchor).ok()?, record.clone())))
            .collect();
        Self { records }
    }
}

/// FNV-1a over the anchor's name then `salt`. Hosts sharing a seed and tick
/// draw the same recache jitter for an anchor.
fn recache_seed(anchor: RoomName, salt: u64) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    anchor
        .to_string()
        .bytes()
        .chain(salt.to_le_bytes())
        .fold(OFFSET_BASIS, |state, byte| {
            (state ^ u64::from(byte)).wrapping_mul(PRIME)
        })
}

/// What happened to the requests a group held at init.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub assigned: usize,
    pub dropped: usize,
}

impl AllocationOutcome {
    fn absorb(&mut self, other: AllocationOutcome) {
        self.assigned += other.assigned;
        self.dropped += other.dropped;
    }
}

/// One owner's view of the producers around an anchor, rebuilt every tick.
#[derive(Debug, Clone)]
pub struct SpawnGroup {
    pub owner: TaskRef,
    pub anchor: RoomName,
    pub settings: SpawnGroupSettings,
    /// Cached colonies that also pass this group's settings.
    colonies: Vec<(ColonyName, u32)>,
    energy_capacity_available: u32,
    requests: Vec<SpawnRequest>,
}

impl SpawnGroup {
    /// Narrows a cached record down to the colonies this group may use.
    pub fn derive(
        owner: TaskRef,
        anchor: RoomName,
        settings: SpawnGroupSettings,
        record: &SpawnGroupRecord,
        producers: &dyn ProducerSet,
    ) -> Self {
        let colonies: Vec<(ColonyName, u32)> = record
            .colonies
            .iter()
            .filter_map(|name| {
                let colony = RoomName::parse(name).ok()?;
                let distance = record.distance(name)?;
                let eligible = distance <= settings.max_path_distance
                    && producers.level(&colony)? >= settings.required_level
                    && producers.producer(&colony).is_some();
                eligible.then_some((colony, distance))
            })
            .collect();

        if colonies.is_empty() {
            tracing::debug!(
                target: "overseer::spawn",
                anchor = %anchor,
                owner = %owner,
                "spawn_group.no_eligible_colonies"
            );
        }

        let energy_capacity_available = colonies
            .iter()
            .filter_map(|(colony, _)| producers.producer(colony))
            .map(|producer| producer.energy_capacity_available())
            .max()
            .unwrap_or(0);

        Self {
            owner,
            anchor,
            settings,
            colonies,
            energy_capacity_available,
            requests: Vec::new(),
        }
    }

    pub fn colonies(&self) -> impl Iterator<Item = &ColonyName> {
        self.colonies.iter().map(|(colony, _)| colony)
    }

    pub fn energy_capacity_available(&self) -> u32 {
        self.energy_capacity_available
    }

    pub fn pending(&self) -> &[SpawnRequest] {
        &self.requests
    }

    pub fn enqueue(&mut self, request: SpawnRequest) {
        self.requests.push(request);
    }

    /// Assigns every buffered request to the producer with the lowest
    /// expected wait, or drops it. Producers must already be initialized.
    pub fn init(&mut self, producers: &mut dyn ProducerSet, handoff: u64) -> AllocationOutcome {
        let mut outcome = AllocationOutcome::default();
        for request in std::mem::take(&mut self.requests) {
            let max_cost = if self.settings.flexible_energy {
                request.setup.body_cost_for(self.energy_capacity_available)
            } else {
                request.setup.full_size_cost()
            };

            let best = self
                .colonies
                .iter()
                .filter_map(|&(colony, distance)| {
                    let producer = producers.producer(&colony)?;
                    (producer.energy_capacity_available() >= max_cost)
                        .then(|| (colony, producer.next_availability() + u64::from(distance) + handoff))
                })
                .min_by_key(|&(_, cost)| cost)
                .map(|(colony, _)| colony);

            match best.and_then(|colony| producers.producer_mut(&colony)) {
                Some(producer) => {
                    producer.enqueue(request);
                    outcome.assigned += 1;
                }
                None => {
                    tracing::warn!(
                        target: "overseer::spawn",
                        role = request.role(),
                        room = %self.anchor,
                        owner = %request.owner,
                        "spawn_group.request_dropped"
                    );
                    outcome.dropped += 1;
                }
            }
        }
        outcome
    }

    /// All work happens in `init`.
    pub fn run(&mut self) {}
}

/// Every spawn group alive this tick plus the shared cache behind them.
#[derive(Debug, Default)]
pub struct SpawnGroupRegistry {
    cache: SpawnGroupCache,
    groups: BTreeMap<TaskRef, SpawnGroup>,
}

impl SpawnGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: SpawnGroupCache) -> Self {
        Self {
            cache,
            groups: BTreeMap::new(),
        }
    }

    pub fn cache(&self) -> &SpawnGroupCache {
        &self.cache
    }

    /// Groups only live for one tick; owners re-create them on demand.
    pub fn refresh(&mut self) {
        self.groups.clear();
    }

    pub fn group(&self, owner: &TaskRef) -> Option<&SpawnGroup> {
        self.groups.get(owner)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Buffers `request` on the group `owner` holds at `anchor`, building
    /// the group if this is its first request this tick.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &mut self,
        owner: &TaskRef,
        anchor: RoomName,
        settings: SpawnGroupSettings,
        request: SpawnRequest,
        tick: Tick,
        world: &dyn World,
        producers: &dyn ProducerSet,
        config: &OverseerConfig,
    ) {
        if !self.groups.contains_key(owner) {
            let record = self.cache.ensure_fresh(anchor, tick, world, config);
            let group = SpawnGroup::derive(owner.clone(), anchor, settings, record, producers);
            self.groups.insert(owner.clone(), group);
        }
        if let Some(group) = self.groups.get_mut(owner) {
            group.enqueue(request);
        }
    }

    pub fn init(&mut self, producers: &mut dyn ProducerSet, handoff: u64) -> AllocationOutcome {
        let mut outcome = AllocationOutcome::default();
        for group in self.groups.values_mut() {
            outcome.absorb(group.init(producers, handoff));
        }
        outcome
    }

    pub fn run(&mut self) {
        for group in self.groups.values_mut() {
            group.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyPart, CreepSetup};
    use crate::colony::Producer;
    use crate::task::Priority;

    #[test]
    fn recache_seeds_differ_by_anchor_and_salt() {
        let anchor = RoomName::parse("W2N1").unwrap();
        let other = RoomName::parse("W1N2").unwrap();
        assert_eq!(recache_seed(anchor, 7), recache_seed(anchor, 7));
        assert_ne!(recache_seed(anchor, 7), recache_seed(anchor, 8));
        assert_ne!(recache_seed(anchor, 7), recache_seed(other, 7));
    }

    struct FakeProducer {
        next: Tick,
        capacity: u32,
        queued: Vec<SpawnRequest>,
    }

    impl Producer for FakeProducer {
        fn next_availability(&self) -> Tick {
            self.next
        }

        fn energy_capacity_available(&self) -> u32 {
            self.capacity
        }

        fn enqueue(&mut self, request: SpawnRequest) {
            self.queued.push(request);
        }
    }

    #[derive(Default)]
    struct FakeProducers {
        producers: BTreeMap<ColonyName, (u8, FakeProducer)>,
    }

    impl FakeProducers {
        fn add(&mut self, name: &str, level: u8, next: Tick, capacity: u32) -> ColonyName {
            let colony = RoomName::parse(name).unwrap();
            self.producers.insert(
                colony,
                (
                    level,
                    FakeProducer {
                        next,
                        capacity,
                        queued: Vec::new(),
                    },
                ),
            );
            colony
        }

        fn queued(&self, colony: &ColonyName) -> usize {
            self.producers[colony].1.queued.len()
        }
    }

    impl ProducerSet for FakeProducers {
        fn producer(&self, colony: &ColonyName) -> Option<&dyn Producer> {
            self.producers.get(colony).map(|(_, p)| p as &dyn Producer)
        }

        fn producer_mut(&mut self, colony: &ColonyName) -> Option<&mut dyn Producer> {
            self.producers
                .get_mut(colony)
                .map(|(_, p)| p as &mut dyn Producer)
        }

        fn level(&self, colony: &ColonyName) -> Option<u8> {
            self.producers.get(colony).map(|(level, _)| *level)
        }
    }

    fn record(entries: &[(&ColonyName, u32)]) -> SpawnGroupRecord {
        let mut record = SpawnGroupRecord::default();
        for (colony, distance) in entries {
            record.colonies.push(colony.to_string());
            record.distances.insert(colony.to_string(), *distance);
        }
        record
    }

    fn request(pattern: &[BodyPart]) -> SpawnRequest {
        SpawnRequest::new(
            CreepSetup::new("hauler", pattern),
            TaskRef::new("outpost:W3N3:25:25/hauler"),
            Priority(100),
        )
    }

    #[test]
    fn lowest_expected_wait_wins() {
        let mut producers = FakeProducers::default();
        let a = producers.add("W1N1", 8, 0, 1_000);
        let b = producers.add("W2N1", 8, 10, 1_000);
        let c = producers.add("W3N1", 8, 5, 1_000);
        let record = record(&[(&a, 50), (&b, 20), (&c, 5)]);

        let anchor = RoomName::parse("W3N3").unwrap();
        let mut group = SpawnGroup::derive(
            TaskRef::new("owner"),
            anchor,
            SpawnGroupSettings::default(),
            &record,
            &producers,
        );
        group.enqueue(request(&[BodyPart::Carry, BodyPart::Move]));
        let outcome = group.init(&mut producers, 25);

        assert_eq!(outcome, AllocationOutcome { assigned: 1, dropped: 0 });
        assert_eq!(producers.queued(&c), 1);
        assert_eq!(producers.queued(&a) + producers.queued(&b), 0);
    }

    #[test]
    fn settings_narrow_the_cached_set() {
        let mut producers = FakeProducers::default();
        let far = producers.add("W1N1", 8, 0, 1_000);
        let young = producers.add("W2N1", 5, 0, 1_000);
        let ok = producers.add("W3N1", 7, 0, 1_000);
        let record = record(&[(&far, 450), (&young, 10), (&ok, 300)]);

        let group = SpawnGroup::derive(
            TaskRef::new("owner"),
            RoomName::parse("W3N3").unwrap(),
            SpawnGroupSettings::default(),
            &record,
            &producers,
        );
        assert_eq!(group.colonies().copied().collect::<Vec<_>>(), vec![ok]);
    }

    #[test]
    fn rigid_energy_requires_full_size_capacity() {
        let mut producers = FakeProducers::default();
        let small = producers.add("W1N1", 8, 0, 300);
        let record = record(&[(&small, 10)]);

        let mut group = SpawnGroup::derive(
            TaskRef::new("owner"),
            RoomName::parse("W1N2").unwrap(),
            SpawnGroupSettings::default().with_flexible_energy(false),
            &record,
            &producers,
        );
        group.enqueue(request(&[BodyPart::Carry, BodyPart::Move]));
        let outcome = group.init(&mut producers, 25);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(producers.queued(&small), 0);
    }

    #[test]
    fn empty_group_drops_requests() {
        let mut producers = FakeProducers::default();
        let mut group = SpawnGroup::derive(
            TaskRef::new("owner"),
            RoomName::parse("W1N2").unwrap(),
            SpawnGroupSettings::default(),
            &SpawnGroupRecord::default(),
            &producers,
        );
        group.enqueue(request(&[BodyPart::Move]));
        group.enqueue(request(&[BodyPart::Move]));
        assert_eq!(group.init(&mut producers, 25).dropped, 2);
        assert!(group.pending().is_empty());
    }
}
