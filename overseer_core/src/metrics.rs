use serde::Serialize;

use crate::world::Tick;

/// Counters gathered over one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickMetrics {
    pub tick: Tick,
    pub colonies: usize,
    pub directives: usize,
    pub overlords: usize,
    pub overlords_suspended: usize,
    pub faults: usize,
    pub spawn_requests_assigned: usize,
    pub spawn_requests_dropped: usize,
    pub creeps_spawned: usize,
    pub directives_created: usize,
    pub logistics_requests: usize,
}

impl TickMetrics {
    pub fn summary(&self) -> String {
        format!(
            "tick={} colonies={} directives={} overlords={} suspended={} faults={} spawn_assigned={} spawn_dropped={} spawned={}",
            self.tick,
            self.colonies,
            self.directives,
            self.overlords,
            self.overlords_suspended,
            self.faults,
            self.spawn_requests_assigned,
            self.spawn_requests_dropped,
            self.creeps_spawned,
        )
    }
}
