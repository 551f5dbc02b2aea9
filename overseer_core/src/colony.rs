//! Colonies and the hatcheries that produce their creeps.

use std::collections::BTreeMap;

use crate::body::{body_cost, BodyPart, SpawnRequest, SPAWN_TICKS_PER_PART};
use crate::task::TaskRef;
use crate::world::{Position, RoomName, RoomSnapshot, Tick, World};

/// Colonies are named after their primary room.
pub type ColonyName = RoomName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColonyStage {
    /// No storage yet.
    Larva,
    /// Storage built, controller below level 8.
    Pupa,
    Adult,
}

impl ColonyStage {
    pub fn of(room: &RoomSnapshot) -> Self {
        if room.storage().is_none() {
            ColonyStage::Larva
        } else if room.level() < 8 {
            ColonyStage::Pupa
        } else {
            ColonyStage::Adult
        }
    }
}

/// Something a producer can start this tick; reported to the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOrder {
    pub colony: ColonyName,
    pub spawn: Position,
    pub role: String,
    pub owner: TaskRef,
    pub body: Vec<BodyPart>,
}

/// Narrow contract the spawn allocator uses to talk to a producer.
pub trait Producer {
    /// Tick at which the producer could begin a new spawn.
    fn next_availability(&self) -> Tick;

    fn energy_capacity_available(&self) -> u32;

    fn enqueue(&mut self, request: SpawnRequest);
}

/// Lookup of producers by owning colony.
pub trait ProducerSet {
    fn producer(&self, colony: &ColonyName) -> Option<&dyn Producer>;

    fn producer_mut(&mut self, colony: &ColonyName) -> Option<&mut dyn Producer>;

    /// Development level of the colony owning the producer.
    fn level(&self, colony: &ColonyName) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnSlot {
    pub pos: Position,
    pub busy_until: Tick,
}

impl SpawnSlot {
    pub fn is_idle(&self, tick: Tick) -> bool {
        self.busy_until <= tick
    }
}

#[derive(Debug, Clone)]
pub struct Hatchery {
    pub pos: Position,
    pub spawns: Vec<SpawnSlot>,
    pub energy_available: u32,
    pub energy_capacity_available: u32,
    /// Blocks everything but emergency requests.
    pub suppress_spawning: bool,
    queue: Vec<SpawnRequest>,
    next_availability: Tick,
}

impl Hatchery {
    /// Builds the hatchery for a room, carrying spawn timers and suppression
    /// over from the previous tick. Rooms without spawns have no hatchery.
    pub fn from_room(room: &RoomSnapshot, previous: Option<&Hatchery>) -> Option<Self> {
        let spawns: Vec<SpawnSlot> = room
            .spawns()
            .map(|spawn| SpawnSlot {
                pos: spawn.pos,
                busy_until: previous
                    .and_then(|prev| prev.spawns.iter().find(|slot| slot.pos == spawn.pos))
                    .map(|slot| slot.busy_until)
                    .unwrap_or(0),
            })
            .collect();
        let pos = spawns.first()?.pos;
        Some(Self {
            pos,
            spawns,
            energy_available: room.energy_available,
            energy_capacity_available: room.energy_capacity_available,
            suppress_spawning: previous.map(|prev| prev.suppress_spawning).unwrap_or(false),
            queue: Vec::new(),
            next_availability: 0,
        })
    }

    pub fn queue(&self) -> &[SpawnRequest] {
        &self.queue
    }

    /// Recomputes `next_availability` from spawn timers and the queue so far.
    pub fn init(&mut self, tick: Tick) {
        let earliest = self
            .spawns
            .iter()
            .map(|slot| slot.busy_until.max(tick))
            .min()
            .unwrap_or(tick);
        let queued_parts: u64 = self
            .queue
            .iter()
            .map(|request| request.setup.generate_body(self.energy_capacity_available).len() as u64)
            .sum();
        let spawn_count = self.spawns.len().max(1) as u64;
        self.next_availability = earliest + queued_parts * SPAWN_TICKS_PER_PART / spawn_count;
    }

    /// Starts at most one request per idle spawn, best priority first.
    ///
    /// The head of the queue waits for energy rather than letting cheaper,
    /// lower-priority requests jump ahead. The queue is cleared afterwards.
    pub fn run(&mut self, colony: ColonyName, tick: Tick) -> Vec<SpawnOrder> {
        let mut queue = std::mem::take(&mut self.queue);
        queue.sort_by_key(|request| request.priority);
        let suppressed = self.suppress_spawning;
        let mut pending = queue
            .into_iter()
            .filter(|request| !suppressed || request.emergency)
            .peekable();

        let mut orders = Vec::new();
        'slots: for slot in self.spawns.iter_mut().filter(|slot| slot.is_idle(tick)) {
            loop {
                let Some(request) = pending.peek() else {
                    break 'slots;
                };
                let budget = if request.emergency {
                    self.energy_available
                } else {
                    self.energy_capacity_available
                };
                let body = request.setup.generate_body(budget);
                let cost = body_cost(&body);
                if body.is_empty() {
                    // Unbuildable at this budget; dropped.
                    tracing::warn!(
                        target: "overseer::spawn",
                        colony = %colony,
                        role = %request.setup.role,
                        owner = %request.owner,
                        budget,
                        "hatchery.request_unbuildable"
                    );
                    pending.next();
                    continue;
                }
                if cost > self.energy_available {
                    break 'slots;
                }
                let Some(request) = pending.next() else {
                    break 'slots;
                };
                self.energy_available -= cost;
                slot.busy_until = tick + body.len() as u64 * SPAWN_TICKS_PER_PART;
                tracing::debug!(
                    target: "overseer::spawn",
                    colony = %colony,
                    role = %request.setup.role,
                    owner = %request.owner,
                    parts = body.len(),
                    cost,
                    "hatchery.spawning"
                );
                orders.push(SpawnOrder {
                    colony,
                    spawn: slot.pos,
                    role: request.setup.role,
                    owner: request.owner,
                    body,
                });
                break;
            }
        }
        orders
    }
}

impl Producer for Hatchery {
    fn next_availability(&self) -> Tick {
        self.next_availability
    }

    fn energy_capacity_available(&self) -> u32 {
        self.energy_capacity_available
    }

    fn enqueue(&mut self, request: SpawnRequest) {
        self.queue.push(request);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogisticsKind {
    Dropped,
    Remains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogisticsRequest {
    pub pos: Position,
    pub amount: u32,
    pub kind: LogisticsKind,
}

/// Output requests a colony's haulers should pick up this tick.
#[derive(Debug, Clone, Default)]
pub struct LogisticsRequests {
    requests: Vec<LogisticsRequest>,
}

impl LogisticsRequests {
    pub fn request_output(&mut self, pos: Position, amount: u32, kind: LogisticsKind) {
        self.requests.push(LogisticsRequest { pos, amount, kind });
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogisticsRequest> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Colony {
    pub id: u32,
    pub name: ColonyName,
    pub room: RoomName,
    pub pos: Position,
    pub outposts: Vec<RoomName>,
    pub level: u8,
    pub stage: ColonyStage,
    /// Raised by pioneers from elsewhere until its first spawn stands.
    pub incubating: bool,
    /// Spawn count as of the last refresh.
    pub spawn_count: usize,
    pub hatchery: Option<Hatchery>,
    pub logistics: LogisticsRequests,
}

impl Colony {
    /// Primary room first, then outposts.
    pub fn room_names(&self) -> Vec<RoomName> {
        let mut rooms = Vec::with_capacity(1 + self.outposts.len());
        rooms.push(self.room);
        rooms.extend(self.outposts.iter().copied());
        rooms
    }

    /// Registers pickups for dropped resources at or above `threshold` and
    /// for any remains still holding something.
    pub fn collect_logistics(&mut self, world: &dyn World, threshold: u32) {
        for name in self.room_names() {
            let Some(room) = world.room(&name) else {
                continue;
            };
            for drop in room.dropped.iter().filter(|d| d.amount >= threshold) {
                self.logistics
                    .request_output(drop.pos, drop.amount, LogisticsKind::Dropped);
            }
            for remains in room.remains.iter().filter(|r| r.stored > 0) {
                self.logistics
                    .request_output(remains.pos, remains.stored, LogisticsKind::Remains);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ColonyRegistry {
    colonies: BTreeMap<ColonyName, Colony>,
    next_id: u32,
}

impl ColonyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds colony state from the rooms the world reports as owned.
    pub fn refresh(&mut self, world: &dyn World, outposts: &BTreeMap<ColonyName, Vec<RoomName>>) {
        let owned = world.owned_rooms();
        self.colonies.retain(|name, _| owned.contains(name));

        for name in owned {
            let Some(room) = world.room(&name) else {
                continue;
            };
            let previous = self.colonies.remove(&name);
            let id = match &previous {
                Some(colony) => colony.id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            let hatchery =
                Hatchery::from_room(room, previous.as_ref().and_then(|c| c.hatchery.as_ref()));
            let spawn_count = room.spawns().count();
            let colony = Colony {
                id,
                name,
                room: name,
                pos: room
                    .controller
                    .as_ref()
                    .map(|controller| controller.pos)
                    .unwrap_or_else(|| Position::center_of(name)),
                outposts: outposts.get(&name).cloned().unwrap_or_default(),
                level: room.level(),
                stage: ColonyStage::of(room),
                incubating: spawn_count == 0,
                spawn_count,
                hatchery,
                logistics: LogisticsRequests::default(),
            };
            self.colonies.insert(name, colony);
        }
    }

    pub fn insert(&mut self, mut colony: Colony) {
        colony.id = self.next_id;
        self.next_id += 1;
        self.colonies.insert(colony.name, colony);
    }

    pub fn get(&self, name: &ColonyName) -> Option<&Colony> {
        self.colonies.get(name)
    }

    pub fn get_mut(&mut self, name: &ColonyName) -> Option<&mut Colony> {
        self.colonies.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Colony> {
        self.colonies.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Colony> {
        self.colonies.values_mut()
    }

    pub fn names(&self) -> Vec<ColonyName> {
        self.colonies.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.colonies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colonies.is_empty()
    }

    /// Name of the colony that owns or operates `room`.
    pub fn colony_of(&self, room: &RoomName) -> Option<ColonyName> {
        self.colonies
            .values()
            .find(|colony| colony.room == *room || colony.outposts.contains(room))
            .map(|colony| colony.name)
    }

    pub fn init_producers(&mut self, tick: Tick) {
        for hatchery in self.colonies.values_mut().filter_map(|c| c.hatchery.as_mut()) {
            hatchery.init(tick);
        }
    }

    pub fn run_producers(&mut self, tick: Tick) -> Vec<SpawnOrder> {
        let mut orders = Vec::new();
        for colony in self.colonies.values_mut() {
            if let Some(hatchery) = colony.hatchery.as_mut() {
                orders.extend(hatchery.run(colony.name, tick));
            }
        }
        orders
    }
}

impl ProducerSet for ColonyRegistry {
    fn producer(&self, colony: &ColonyName) -> Option<&dyn Producer> {
        self.colonies
            .get(colony)?
            .hatchery
            .as_ref()
            .map(|hatchery| hatchery as &dyn Producer)
    }

    fn producer_mut(&mut self, colony: &ColonyName) -> Option<&mut dyn Producer> {
        self.colonies
            .get_mut(colony)?
            .hatchery
            .as_mut()
            .map(|hatchery| hatchery as &mut dyn Producer)
    }

    fn level(&self, colony: &ColonyName) -> Option<u8> {
        self.colonies.get(colony).map(|c| c.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::CreepSetup;
    use crate::task::Priority;
    use crate::world::StructureKind;

    fn room_name() -> RoomName {
        RoomName::parse("W1N1").unwrap()
    }

    fn hatchery(spawns: usize, energy: u32, capacity: u32) -> Hatchery {
        let mut room = RoomSnapshot::owned(room_name(), 4).with_energy(energy, capacity);
        for i in 0..spawns {
            room = room.with_structure(StructureKind::Spawn, 20 + i as u8, 20);
        }
        Hatchery::from_room(&room, None).expect("room has spawns")
    }

    fn request(role: &str, priority: u32) -> SpawnRequest {
        SpawnRequest::new(
            CreepSetup::new(role, &[BodyPart::Work, BodyPart::Carry, BodyPart::Move]),
            TaskRef::new(format!("test/{role}")),
            Priority(priority),
        )
    }

    #[test]
    fn rooms_without_spawns_have_no_hatchery() {
        assert!(Hatchery::from_room(&RoomSnapshot::owned(room_name(), 1), None).is_none());
    }

    #[test]
    fn availability_accounts_for_queued_parts() {
        let mut hatchery = hatchery(2, 600, 600);
        hatchery.spawns[0].busy_until = 120;
        hatchery.spawns[1].busy_until = 110;
        hatchery.enqueue(request("worker", 10));
        hatchery.init(100);
        // 600 energy buys three 200-cost repeats: nine parts, 27 ticks over two spawns.
        assert_eq!(hatchery.next_availability(), 110 + 13);
    }

    #[test]
    fn run_starts_best_priority_first_and_clears_queue() {
        let mut hatchery = hatchery(1, 400, 400);
        hatchery.enqueue(request("late", 50));
        hatchery.enqueue(request("early", 5));
        let orders = hatchery.run(room_name(), 10);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].role, "early");
        assert_eq!(hatchery.spawns[0].busy_until, 10 + 6 * SPAWN_TICKS_PER_PART);
        assert!(hatchery.queue().is_empty());
    }

    #[test]
    fn suppression_lets_only_emergencies_through() {
        let mut hatchery = hatchery(2, 300, 800);
        hatchery.suppress_spawning = true;
        hatchery.enqueue(request("worker", 1));
        hatchery.enqueue(request("filler", 0).emergency());
        let orders = hatchery.run(room_name(), 0);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].role, "filler");
    }

    #[test]
    fn head_of_queue_waits_for_energy() {
        let mut hatchery = hatchery(1, 100, 800);
        hatchery.enqueue(request("big", 1));
        assert!(hatchery.run(room_name(), 0).is_empty());
    }

    #[test]
    fn unbuildable_requests_are_dropped_instead_of_blocking_the_queue() {
        let mut hatchery = hatchery(1, 300, 300);
        let reserver = CreepSetup::new("reserver", &[BodyPart::Move]).with_prefix(&[BodyPart::Claim]);
        hatchery.enqueue(SpawnRequest::new(
            reserver,
            TaskRef::new("test/reserver"),
            Priority(5),
        ));
        hatchery.enqueue(request("worker", 10));

        let orders = hatchery.run(room_name(), 0);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].role, "worker");
        assert!(hatchery.queue().is_empty());
    }

    #[test]
    fn colonies_whose_room_disappears_are_dropped_and_survivors_keep_their_id() {
        use crate::sim_world::SimWorld;

        let other = RoomName::parse("W3N1").unwrap();
        let mut world = SimWorld::new(1)
            .with_room(RoomSnapshot::owned(room_name(), 4).with_structure(StructureKind::Spawn, 20, 20))
            .with_room(RoomSnapshot::owned(other, 4).with_structure(StructureKind::Spawn, 20, 20));
        let mut registry = ColonyRegistry::new();
        registry.refresh(&world, &BTreeMap::new());
        let survivor_id = registry.get(&other).map(|c| c.id);
        assert_eq!(registry.len(), 2);

        assert!(world.remove_room(&room_name()).is_some());
        registry.refresh(&world, &BTreeMap::new());
        assert_eq!(registry.names(), vec![other]);
        assert_eq!(registry.get(&other).map(|c| c.id), survivor_id);
    }

    #[test]
    fn logistics_cover_home_and_outposts_above_threshold() {
        use crate::sim_world::SimWorld;
        use crate::world::{DroppedResource, Remains};

        let home = room_name();
        let outpost = RoomName::parse("W2N1").unwrap();
        let mut home_room = RoomSnapshot::owned(home, 4).with_structure(StructureKind::Spawn, 20, 20);
        home_room.dropped = vec![
            DroppedResource { pos: Position::new(home, 5, 5), amount: 500 },
            DroppedResource { pos: Position::new(home, 6, 6), amount: 50 },
        ];
        let mut outpost_room = RoomSnapshot::new(outpost);
        outpost_room.remains = vec![
            Remains { pos: Position::new(outpost, 9, 9), stored: 120 },
            Remains { pos: Position::new(outpost, 9, 10), stored: 0 },
        ];
        let world = SimWorld::new(1).with_room(home_room).with_room(outpost_room);

        let mut registry = ColonyRegistry::new();
        registry.refresh(&world, &BTreeMap::from([(home, vec![outpost])]));
        let colony = registry.get_mut(&home).expect("owned room becomes a colony");
        colony.collect_logistics(&world, 200);

        let kinds: Vec<(LogisticsKind, u32)> =
            colony.logistics.iter().map(|r| (r.kind, r.amount)).collect();
        assert_eq!(kinds, vec![(LogisticsKind::Dropped, 500), (LogisticsKind::Remains, 120)]);
    }
}
