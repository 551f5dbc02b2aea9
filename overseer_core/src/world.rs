//! Read-mostly view of the simulated world.
//!
//! The overseer never owns world state. Hosts implement [`World`] over
//! whatever backs them (the live game, a replay, or [`crate::SimWorld`]).

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::colony::SpawnOrder;

pub use overseer_schema::Tick;

pub const ROOM_SIZE: i64 = 50;

/// Room on the world grid, e.g. `W3N7`.
///
/// `W0` maps to x = -1 and `E0` to x = 0; likewise `N0` to y = -1 and `S0` to
/// y = 0, so adjacent rooms always differ by one in grid coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomName {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid room name {0:?}")]
pub struct RoomNameError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomType {
    Controller,
    SourceKeeper,
    Center,
    Highway,
}

impl RoomName {
    pub fn from_coords(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn parse(input: &str) -> Result<Self, RoomNameError> {
        let invalid = || RoomNameError(input.to_string());
        let mut chars = input.chars();
        let horizontal = chars.next().ok_or_else(invalid)?;
        let rest = chars.as_str();
        let split = rest
            .find(|c: char| c == 'N' || c == 'S')
            .ok_or_else(invalid)?;
        let (x_digits, vertical_part) = rest.split_at(split);
        let vertical = vertical_part.chars().next().ok_or_else(invalid)?;
        let y_digits = &vertical_part[1..];

        let parse_digits = |digits: &str| -> Result<i32, RoomNameError> {
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            digits.parse().map_err(|_| invalid())
        };
        let xn = parse_digits(x_digits)?;
        let yn = parse_digits(y_digits)?;

        let x = match horizontal {
            'W' => -xn - 1,
            'E' => xn,
            _ => return Err(invalid()),
        };
        let y = match vertical {
            'N' => -yn - 1,
            'S' => yn,
            _ => return Err(invalid()),
        };
        Ok(Self { x, y })
    }

    pub fn coords(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    fn written_numbers(&self) -> (i32, i32) {
        // -(n + 1) stays in range for every negative n, including i32::MIN.
        let xn = if self.x < 0 { -(self.x + 1) } else { self.x };
        let yn = if self.y < 0 { -(self.y + 1) } else { self.y };
        (xn, yn)
    }

    pub fn room_type(&self) -> RoomType {
        let (xn, yn) = self.written_numbers();
        let (xm, ym) = (xn % 10, yn % 10);
        if xm == 0 || ym == 0 {
            RoomType::Highway
        } else if xm == 5 && ym == 5 {
            RoomType::Center
        } else if (4..=6).contains(&xm) && (4..=6).contains(&ym) {
            RoomType::SourceKeeper
        } else {
            RoomType::Controller
        }
    }

    /// Chebyshev distance in rooms.
    pub fn linear_distance(&self, other: &RoomName) -> u32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dy = (i64::from(self.y) - i64::from(other.y)).unsigned_abs();
        u32::try_from(dx.max(dy)).unwrap_or(u32::MAX)
    }

    /// Rooms sharing an exit with this one, in top/right/bottom/left order.
    pub fn neighbors(&self) -> [RoomName; 4] {
        [
            Self::from_coords(self.x, self.y.saturating_sub(1)),
            Self::from_coords(self.x.saturating_add(1), self.y),
            Self::from_coords(self.x, self.y.saturating_add(1)),
            Self::from_coords(self.x.saturating_sub(1), self.y),
        ]
    }

    /// Every room within `radius`, excluding this one.
    pub fn rooms_in_range(&self, radius: u32) -> Vec<RoomName> {
        let r = radius as i32;
        let mut rooms = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                if dx == 0 && dy == 0 {
                    continue;
                }
                rooms.push(Self::from_coords(
                    self.x.saturating_add(dx),
                    self.y.saturating_add(dy),
                ));
            }
        }
        rooms
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (xn, yn) = self.written_numbers();
        let h = if self.x < 0 { 'W' } else { 'E' };
        let v = if self.y < 0 { 'N' } else { 'S' };
        write!(f, "{h}{xn}{v}{yn}")
    }
}

impl FromStr for RoomName {
    type Err = RoomNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomName {
    type Error = RoomNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomName> for String {
    fn from(value: RoomName) -> Self {
        value.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub room: RoomName,
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub fn new(room: RoomName, x: u8, y: u8) -> Self {
        Self { room, x, y }
    }

    pub fn center_of(room: RoomName) -> Self {
        Self::new(room, 25, 25)
    }

    pub fn global(&self) -> (i64, i64) {
        let (rx, ry) = self.room.coords();
        (
            i64::from(rx) * ROOM_SIZE + i64::from(self.x),
            i64::from(ry) * ROOM_SIZE + i64::from(self.y),
        )
    }

    pub fn range_to(&self, other: &Position) -> u32 {
        let (ax, ay) = self.global();
        let (bx, by) = other.global();
        let range = (ax - bx).unsigned_abs().max((ay - by).unsigned_abs());
        u32::try_from(range).unwrap_or(u32::MAX)
    }

    pub fn in_range_to(&self, other: &Position, range: u32) -> bool {
        self.range_to(other) <= range
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.room, self.x, self.y)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostileTraits: u8 {
        /// Carries parts that can damage creeps or structures.
        const DANGEROUS = 0b0001;
        const BOOSTED = 0b0010;
        /// Controlled by another player rather than the environment.
        const PLAYER = 0b0100;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostile {
    pub pos: Position,
    pub owner: String,
    pub traits: HostileTraits,
}

impl Hostile {
    pub fn invader(pos: Position) -> Self {
        Self {
            pos,
            owner: "Invader".to_string(),
            traits: HostileTraits::DANGEROUS,
        }
    }

    pub fn player(owner: &str, pos: Position) -> Self {
        Self {
            pos,
            owner: owner.to_string(),
            traits: HostileTraits::DANGEROUS | HostileTraits::PLAYER,
        }
    }

    pub fn scout(owner: &str, pos: Position) -> Self {
        Self {
            pos,
            owner: owner.to_string(),
            traits: HostileTraits::PLAYER,
        }
    }

    pub fn boosted(mut self) -> Self {
        self.traits |= HostileTraits::BOOSTED;
        self
    }

    pub fn is_dangerous(&self) -> bool {
        self.traits.contains(HostileTraits::DANGEROUS)
    }

    pub fn is_player(&self) -> bool {
        self.traits.contains(HostileTraits::PLAYER)
    }

    pub fn is_boosted(&self) -> bool {
        self.traits.contains(HostileTraits::BOOSTED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    Spawn,
    Extension,
    Storage,
    Terminal,
    Tower,
    Rampart,
    Wall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    pub kind: StructureKind,
    pub pos: Position,
    pub hits: u32,
    pub hits_max: u32,
}

impl Structure {
    pub fn new(kind: StructureKind, pos: Position) -> Self {
        let hits_max = match kind {
            StructureKind::Spawn => 5_000,
            StructureKind::Extension => 1_000,
            StructureKind::Storage | StructureKind::Terminal => 10_000,
            StructureKind::Tower => 3_000,
            StructureKind::Rampart | StructureKind::Wall => 300_000,
        };
        Self {
            kind,
            pos,
            hits: hits_max,
            hits_max,
        }
    }

    pub fn damaged(mut self, hits: u32) -> Self {
        self.hits = hits.min(self.hits_max);
        self
    }

    pub fn is_damaged(&self) -> bool {
        self.hits < self.hits_max
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub pos: Position,
    pub level: u8,
    pub owner: Option<String>,
    pub my: bool,
    pub reservation: Option<String>,
    /// Ticks of safe mode remaining; zero when inactive.
    pub safe_mode: u32,
    pub safe_mode_available: u32,
    pub safe_mode_cooldown: u32,
}

impl Controller {
    pub fn owned(pos: Position, level: u8) -> Self {
        Self {
            pos,
            level,
            owner: None,
            my: true,
            reservation: None,
            safe_mode: 0,
            safe_mode_available: 1,
            safe_mode_cooldown: 0,
        }
    }

    pub fn neutral(pos: Position) -> Self {
        Self {
            pos,
            level: 0,
            owner: None,
            my: false,
            reservation: None,
            safe_mode: 0,
            safe_mode_available: 0,
            safe_mode_cooldown: 0,
        }
    }

    pub fn safe_mode_active(&self) -> bool {
        self.safe_mode > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedResource {
    pub pos: Position,
    pub amount: u32,
}

/// Tombstones and ruins left behind by dead creeps and structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remains {
    pub pos: Position,
    pub stored: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nuke {
    pub landing: Position,
    pub time_to_land: u32,
}

/// Everything visible in one room this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub name: RoomName,
    pub controller: Option<Controller>,
    pub hostiles: Vec<Hostile>,
    pub structures: Vec<Structure>,
    pub dropped: Vec<DroppedResource>,
    pub remains: Vec<Remains>,
    pub nukes: Vec<Nuke>,
    pub sources: Vec<Position>,
    pub energy_available: u32,
    pub energy_capacity_available: u32,
    /// Base fully enclosed by constructed walls.
    pub sealed: bool,
}

impl RoomSnapshot {
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            controller: None,
            hostiles: Vec::new(),
            structures: Vec::new(),
            dropped: Vec::new(),
            remains: Vec::new(),
            nukes: Vec::new(),
            sources: Vec::new(),
            energy_available: 0,
            energy_capacity_available: 0,
            sealed: false,
        }
    }

    /// An owned room with a controller at the room center.
    pub fn owned(name: RoomName, level: u8) -> Self {
        let mut room = Self::new(name);
        room.controller = Some(Controller::owned(Position::new(name, 25, 25), level));
        room
    }

    pub fn with_structure(mut self, kind: StructureKind, x: u8, y: u8) -> Self {
        self.structures
            .push(Structure::new(kind, Position::new(self.name, x, y)));
        self
    }

    pub fn with_energy(mut self, available: u32, capacity: u32) -> Self {
        self.energy_available = available;
        self.energy_capacity_available = capacity;
        self
    }

    pub fn with_sources(mut self, positions: &[(u8, u8)]) -> Self {
        self.sources = positions
            .iter()
            .map(|&(x, y)| Position::new(self.name, x, y))
            .collect();
        self
    }

    pub fn with_hostile(mut self, hostile: Hostile) -> Self {
        self.hostiles.push(hostile);
        self
    }

    pub fn level(&self) -> u8 {
        self.controller.as_ref().map(|c| c.level).unwrap_or(0)
    }

    pub fn is_mine(&self) -> bool {
        self.controller.as_ref().map(|c| c.my).unwrap_or(false)
    }

    pub fn structures_of(&self, kind: StructureKind) -> impl Iterator<Item = &Structure> {
        self.structures.iter().filter(move |s| s.kind == kind)
    }

    pub fn spawns(&self) -> impl Iterator<Item = &Structure> {
        self.structures_of(StructureKind::Spawn)
    }

    pub fn storage(&self) -> Option<&Structure> {
        self.structures_of(StructureKind::Storage).next()
    }

    pub fn terminal(&self) -> Option<&Structure> {
        self.structures_of(StructureKind::Terminal).next()
    }

    pub fn dangerous_hostiles(&self) -> impl Iterator<Item = &Hostile> {
        self.hostiles.iter().filter(|h| h.is_dangerous())
    }

    pub fn dangerous_player_hostiles(&self) -> impl Iterator<Item = &Hostile> {
        self.hostiles
            .iter()
            .filter(|h| h.is_dangerous() && h.is_player())
    }

    pub fn is_safe(&self) -> bool {
        self.dangerous_hostiles().next().is_none()
    }

    /// Source keeper rooms and rooms with a tower fend for themselves.
    pub fn is_self_defended(&self) -> bool {
        self.name.room_type() == RoomType::SourceKeeper
            || self.structures_of(StructureKind::Tower).next().is_some()
    }
}

/// What is remembered about a room that may not be visible right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomIntel {
    pub owner: Option<String>,
    pub reservation: Option<String>,
    /// `None` until the room has been scouted.
    pub sources: Option<Vec<Position>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResult {
    pub length: u32,
    pub incomplete: bool,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SafeModeError {
    #[error("room {0} is not owned")]
    NotOwned(RoomName),
    #[error("safe mode is already active in {0}")]
    AlreadyActive(RoomName),
    #[error("no safe mode activations available in {0}")]
    NoneAvailable(RoomName),
    #[error("safe mode in {room} is cooling down for {ticks} ticks")]
    Cooldown { room: RoomName, ticks: u32 },
}

/// World queries and the two side effects the overseer is allowed to cause.
pub trait World {
    fn tick(&self) -> Tick;

    /// Snapshot of a currently visible room.
    fn room(&self, name: &RoomName) -> Option<&RoomSnapshot>;

    /// Rooms whose controller we own, in a stable order.
    fn owned_rooms(&self) -> Vec<RoomName>;

    fn intel(&self, name: &RoomName) -> Option<RoomIntel>;

    fn is_room_available(&self, name: &RoomName) -> bool;

    fn exits(&self, name: &RoomName) -> Vec<RoomName> {
        name.neighbors().to_vec()
    }

    /// Room-level route, excluding `from` and ending at `to`.
    fn find_route(&self, from: &RoomName, to: &RoomName) -> Option<Vec<RoomName>>;

    fn find_path_to_room(&self, from: &Position, room: &RoomName, route: &[RoomName])
        -> PathResult;

    fn path_distance(&self, from: &Position, to: &Position) -> Option<u32>;

    /// Whether `to` can be reached from `from`, treating `ignore` as walkable.
    fn is_reachable(&self, from: &Position, to: &Position, ignore: &[Position]) -> bool;

    fn pathable_position(&self, room: &RoomName) -> Position;

    /// Uncached spawn count.
    fn count_my_spawns(&self, room: &RoomName) -> usize;

    fn creep_count(&self, owner: &str, role: &str) -> usize;

    fn role_count(&self, colony: &RoomName, role: &str) -> usize;

    fn activate_safe_mode(&mut self, room: &RoomName) -> Result<(), SafeModeError>;

    fn spawn_creep(&mut self, order: &SpawnOrder);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_names_round_trip_through_grid_coordinates() {
        for name in ["W0N0", "E0S0", "W12N7", "E3S45"] {
            let parsed = RoomName::parse(name).expect("valid name");
            assert_eq!(parsed.to_string(), name);
        }
        let w0 = RoomName::parse("W0N0").unwrap();
        let e0 = RoomName::parse("E0N0").unwrap();
        assert_eq!(w0.linear_distance(&e0), 1);
    }

    #[test]
    fn malformed_room_names_are_rejected() {
        for name in ["", "W", "X1N1", "W1Q1", "W-1N1", "W1N", "W1N1x"] {
            assert!(RoomName::parse(name).is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn room_types_follow_sector_layout() {
        let kind = |name: &str| RoomName::parse(name).unwrap().room_type();
        assert_eq!(kind("W10N3"), RoomType::Highway);
        assert_eq!(kind("W3N20"), RoomType::Highway);
        assert_eq!(kind("W5N5"), RoomType::Center);
        assert_eq!(kind("W4N6"), RoomType::SourceKeeper);
        assert_eq!(kind("W2N3"), RoomType::Controller);
    }

    #[test]
    fn ranges_cross_room_borders() {
        let a = Position::new(RoomName::parse("W0N1").unwrap(), 49, 10);
        let b = Position::new(RoomName::parse("E0N1").unwrap(), 0, 10);
        assert_eq!(a.range_to(&b), 1);
    }

    #[test]
    fn rooms_either_side_of_the_meridian_are_a_room_apart() {
        let a = Position::new(RoomName::parse("W1N1").unwrap(), 49, 10);
        let b = Position::new(RoomName::parse("E0N1").unwrap(), 0, 10);
        assert_eq!(a.range_to(&b), 51);
        assert_eq!(a.room.linear_distance(&b.room), 2);
    }

    #[test]
    fn extreme_coordinates_name_and_measure_without_overflow() {
        let far_west = RoomName::from_coords(i32::MIN, i32::MIN);
        let far_east = RoomName::from_coords(i32::MAX, i32::MAX);
        assert_eq!(far_west.to_string(), "W2147483647N2147483647");
        assert_eq!(far_east.to_string(), "E2147483647S2147483647");
        assert_eq!(RoomName::parse(&far_west.to_string()), Ok(far_west));
        assert_eq!(far_west.linear_distance(&far_east), u32::MAX);
        assert_eq!(far_west.room_type(), RoomType::Controller);
    }

    #[test]
    fn rooms_in_range_form_a_ring_without_origin() {
        let origin = RoomName::parse("W5N5").unwrap();
        let rooms = origin.rooms_in_range(2);
        assert_eq!(rooms.len(), 24);
        assert!(!rooms.contains(&origin));
        assert!(rooms.iter().all(|r| r.linear_distance(&origin) <= 2));
    }

    #[test]
    fn hostile_flags_compose() {
        let pos = Position::center_of(RoomName::parse("W1N1").unwrap());
        let hostile = Hostile::player("someone", pos).boosted();
        assert!(hostile.is_dangerous() && hostile.is_player() && hostile.is_boosted());
        assert!(!Hostile::scout("someone", pos).is_dangerous());
        assert!(!Hostile::invader(pos).is_player());
    }
}
