use overseer_schema::SuspensionRecords;

use crate::task::TaskRef;
use crate::world::Tick;

/// Persisted map from task reference to the tick it resumes at.
///
/// Records whose resume tick has been reached are dropped the first time they
/// are read; nothing sweeps them otherwise.
#[derive(Debug, Clone, Default)]
pub struct SuspensionLedger {
    records: SuspensionRecords,
}

impl SuspensionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: SuspensionRecords) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &SuspensionRecords {
        &self.records
    }

    pub fn is_suspended(&mut self, task: &TaskRef, tick: Tick) -> bool {
        let Some(&resume) = self.records.entries.get(task.as_str()) else {
            return false;
        };
        if resume > tick {
            return true;
        }
        self.records.entries.remove(task.as_str());
        tracing::debug!(
            target: "overseer::scheduler",
            task = %task,
            resume,
            tick,
            "suspension.expired"
        );
        false
    }

    pub fn suspend_for(&mut self, task: &TaskRef, duration: u64, tick: Tick) {
        self.suspend_until(task, tick.saturating_add(duration));
    }

    pub fn suspend_until(&mut self, task: &TaskRef, resume_tick: Tick) {
        self.records
            .entries
            .insert(task.as_str().to_string(), resume_tick);
    }

    pub fn resume_tick(&self, task: &TaskRef) -> Option<Tick> {
        self.records.entries.get(task.as_str()).copied()
    }

    pub fn forget(&mut self, task: &TaskRef) {
        self.records.entries.remove(task.as_str());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
