//! In-memory [`World`] for tests, benches and the headless driver.
//!
//! Routes walk the grid in a straight line (horizontal first) and path
//! lengths are Chebyshev ranges, so distances are easy to predict by hand.

use std::collections::{BTreeMap, BTreeSet};

use crate::colony::SpawnOrder;
use crate::world::{
    PathResult, Position, RoomIntel, RoomName, RoomSnapshot, SafeModeError, Tick, World,
};

pub const SAFE_MODE_DURATION: u32 = 20_000;
pub const SAFE_MODE_COOLDOWN: u32 = 50_000;

#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    tick: Tick,
    rooms: BTreeMap<RoomName, RoomSnapshot>,
    intel: BTreeMap<RoomName, RoomIntel>,
    impassable: BTreeSet<RoomName>,
    unavailable: BTreeSet<RoomName>,
    creeps: BTreeMap<(String, String), usize>,
    roles: BTreeMap<(RoomName, String), usize>,
    spawned: Vec<SpawnOrder>,
}

impl SimWorld {
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    pub fn with_room(mut self, room: RoomSnapshot) -> Self {
        self.insert_room(room);
        self
    }

    pub fn insert_room(&mut self, room: RoomSnapshot) {
        self.rooms.insert(room.name, room);
    }

    pub fn remove_room(&mut self, name: &RoomName) -> Option<RoomSnapshot> {
        self.rooms.remove(name)
    }

    pub fn room_mut(&mut self, name: &RoomName) -> Option<&mut RoomSnapshot> {
        self.rooms.get_mut(name)
    }

    pub fn set_intel(&mut self, room: RoomName, intel: RoomIntel) {
        self.intel.insert(room, intel);
    }

    /// Routes and paths through `room` fail.
    pub fn block_room(&mut self, room: RoomName) {
        self.impassable.insert(room);
    }

    pub fn set_unavailable(&mut self, room: RoomName) {
        self.unavailable.insert(room);
    }

    pub fn set_creep_count(&mut self, owner: &str, role: &str, count: usize) {
        self.creeps
            .insert((owner.to_string(), role.to_string()), count);
    }

    pub fn set_role_count(&mut self, colony: RoomName, role: &str, count: usize) {
        self.roles.insert((colony, role.to_string()), count);
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Moves time forward one tick and winds down safe mode timers.
    pub fn advance(&mut self) {
        self.tick += 1;
        for controller in self.rooms.values_mut().filter_map(|r| r.controller.as_mut()) {
            controller.safe_mode = controller.safe_mode.saturating_sub(1);
            controller.safe_mode_cooldown = controller.safe_mode_cooldown.saturating_sub(1);
        }
    }

    pub fn spawned(&self) -> &[SpawnOrder] {
        &self.spawned
    }

    fn is_passable(&self, room: &RoomName) -> bool {
        !self.impassable.contains(room)
    }

    fn straight_route(from: &RoomName, to: &RoomName) -> Vec<RoomName> {
        let (mut x, mut y) = from.coords();
        let (tx, ty) = to.coords();
        let mut route = Vec::new();
        while x != tx {
            x += (tx - x).signum();
            route.push(RoomName::from_coords(x, y));
        }
        while y != ty {
            y += (ty - y).signum();
            route.push(RoomName::from_coords(x, y));
        }
        route
    }
}

impl World for SimWorld {
    fn tick(&self) -> Tick {
        self.tick
    }

    fn room(&self, name: &RoomName) -> Option<&RoomSnapshot> {
        self.rooms.get(name)
    }

    fn owned_rooms(&self) -> Vec<RoomName> {
        self.rooms
            .values()
            .filter(|room| room.is_mine())
            .map(|room| room.name)
            .collect()
    }

    fn intel(&self, name: &RoomName) -> Option<RoomIntel> {
        if let Some(intel) = self.intel.get(name) {
            return Some(intel.clone());
        }
        let room = self.rooms.get(name)?;
        let controller = room.controller.as_ref();
        Some(RoomIntel {
            owner: controller.and_then(|c| c.owner.clone()),
            reservation: controller.and_then(|c| c.reservation.clone()),
            sources: Some(room.sources.clone()),
        })
    }

    fn is_room_available(&self, name: &RoomName) -> bool {
        !self.unavailable.contains(name)
    }

    fn find_route(&self, from: &RoomName, to: &RoomName) -> Option<Vec<RoomName>> {
        if !self.is_passable(from) {
            return None;
        }
        let route = Self::straight_route(from, to);
        route
            .iter()
            .all(|room| self.is_passable(room))
            .then_some(route)
    }

    fn find_path_to_room(&self, from: &Position, room: &RoomName, route: &[RoomName]) -> PathResult {
        let reaches = from.room == *room || route.last() == Some(room);
        let blocked = route.iter().any(|r| !self.is_passable(r));
        PathResult {
            length: from.range_to(&Position::center_of(*room)),
            incomplete: !reaches || blocked,
        }
    }

    fn path_distance(&self, from: &Position, to: &Position) -> Option<u32> {
        self.find_route(&from.room, &to.room)?;
        Some(from.range_to(to))
    }

    fn is_reachable(&self, from: &Position, to: &Position, _ignore: &[Position]) -> bool {
        let sealed = self.rooms.get(&to.room).map(|r| r.sealed).unwrap_or(false);
        !sealed && self.find_route(&from.room, &to.room).is_some()
    }

    fn pathable_position(&self, room: &RoomName) -> Position {
        Position::center_of(*room)
    }

    fn count_my_spawns(&self, room: &RoomName) -> usize {
        self.rooms
            .get(room)
            .map(|r| r.spawns().count())
            .unwrap_or(0)
    }

    fn creep_count(&self, owner: &str, role: &str) -> usize {
        self.creeps
            .get(&(owner.to_string(), role.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn role_count(&self, colony: &RoomName, role: &str) -> usize {
        self.roles
            .get(&(*colony, role.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn activate_safe_mode(&mut self, name: &RoomName) -> Result<(), SafeModeError> {
        let controller = self
            .rooms
            .get_mut(name)
            .and_then(|room| room.controller.as_mut())
            .filter(|controller| controller.my)
            .ok_or(SafeModeError::NotOwned(*name))?;
        if controller.safe_mode_active() {
            return Err(SafeModeError::AlreadyActive(*name));
        }
        if controller.safe_mode_cooldown > 0 {
            return Err(SafeModeError::Cooldown {
                room: *name,
                ticks: controller.safe_mode_cooldown,
            });
        }
        if controller.safe_mode_available == 0 {
            return Err(SafeModeError::NoneAvailable(*name));
        }
        controller.safe_mode_available -= 1;
        controller.safe_mode = SAFE_MODE_DURATION;
        controller.safe_mode_cooldown = SAFE_MODE_COOLDOWN;
        Ok(())
    }

    fn spawn_creep(&mut self, order: &SpawnOrder) {
        *self
            .creeps
            .entry((order.owner.as_str().to_string(), order.role.clone()))
            .or_default() += 1;
        *self
            .roles
            .entry((order.colony, order.role.clone()))
            .or_default() += 1;
        self.spawned.push(order.clone());
    }
}
