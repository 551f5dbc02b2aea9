use std::collections::BTreeMap;

use overseer_schema::RoomSafetyRecord;

use crate::world::{RoomName, Tick, World};

/// Tracks how long each observed room has been continuously (un)safe.
#[derive(Debug, Clone, Default)]
pub struct SafetyTracker {
    rooms: BTreeMap<RoomName, RoomSafetyRecord>,
}

impl SafetyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation. Repeated calls for the same tick are no-ops.
    pub fn observe(&mut self, room: RoomName, tick: Tick, is_unsafe: bool) {
        if self
            .rooms
            .get(&room)
            .is_some_and(|record| record.last_observed == tick)
        {
            return;
        }
        let record = self.rooms.entry(room).or_insert_with(|| RoomSafetyRecord {
            unsafe_since: None,
            safe_since: None,
            last_observed: tick,
        });
        if is_unsafe {
            record.safe_since = None;
            record.unsafe_since.get_or_insert(tick);
        } else {
            record.unsafe_since = None;
            record.safe_since.get_or_insert(tick);
        }
        record.last_observed = tick;
    }

    /// Observes every visible room among `rooms`.
    pub fn observe_world<'a>(
        &mut self,
        world: &dyn World,
        rooms: impl IntoIterator<Item = &'a RoomName>,
    ) {
        let tick = world.tick();
        for name in rooms {
            if let Some(room) = world.room(name) {
                self.observe(*name, tick, !room.is_safe());
            }
        }
    }

    pub fn unsafe_for(&self, room: &RoomName, tick: Tick) -> u64 {
        self.rooms
            .get(room)
            .map(|record| record.unsafe_for(tick))
            .unwrap_or(0)
    }

    pub fn safe_for(&self, room: &RoomName, tick: Tick) -> u64 {
        self.rooms
            .get(room)
            .map(|record| record.safe_for(tick))
            .unwrap_or(0)
    }

    pub fn export(&self) -> BTreeMap<String, RoomSafetyRecord> {
        self.rooms
            .iter()
            .map(|(room, record)| (room.to_string(), *record))
            .collect()
    }

    /// Rebuilds from persisted records, skipping keys that are not room names.
    pub fn import(records: &BTreeMap<String, RoomSafetyRecord>) -> Self {
        let rooms = records
            .iter()
            .filter_map(|(name, record)| Some((RoomName::parse(name).ok()?, *record)))
            .collect();
        Self { rooms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomName {
        RoomName::parse("W7N3").unwrap()
    }

    #[test]
    fn unsafe_duration_counts_from_first_unsafe_tick() {
        let mut tracker = SafetyTracker::new();
        tracker.observe(room(), 10, false);
        for tick in 11..=40 {
            tracker.observe(room(), tick, true);
        }
        assert_eq!(tracker.unsafe_for(&room(), 40), 29);
        assert_eq!(tracker.safe_for(&room(), 40), 0);
    }

    #[test]
    fn a_safe_tick_resets_the_unsafe_streak() {
        let mut tracker = SafetyTracker::new();
        tracker.observe(room(), 1, true);
        tracker.observe(room(), 30, false);
        tracker.observe(room(), 31, true);
        assert_eq!(tracker.unsafe_for(&room(), 35), 4);
    }

    #[test]
    fn only_the_first_observation_of_a_tick_counts() {
        let mut tracker = SafetyTracker::new();
        tracker.observe(room(), 10, true);
        tracker.observe(room(), 10, false);
        assert_eq!(tracker.unsafe_for(&room(), 15), 5);
        assert_eq!(tracker.safe_for(&room(), 15), 0);
    }

    #[test]
    fn export_and_import_preserve_records() {
        let mut tracker = SafetyTracker::new();
        tracker.observe(room(), 5, true);
        let restored = SafetyTracker::import(&tracker.export());
        assert_eq!(restored.unsafe_for(&room(), 25), 20);
        assert_eq!(restored.unsafe_for(&RoomName::parse("E1S1").unwrap(), 25), 0);
    }
}
