use crate::task::{Priority, TaskRef};

pub const MAX_CREEP_SIZE: usize = 50;
pub const SPAWN_TICKS_PER_PART: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Move,
    Work,
    Carry,
    Attack,
    RangedAttack,
    Heal,
    Claim,
    Tough,
}

impl BodyPart {
    pub fn cost(self) -> u32 {
        match self {
            BodyPart::Move => 50,
            BodyPart::Work => 100,
            BodyPart::Carry => 50,
            BodyPart::Attack => 80,
            BodyPart::RangedAttack => 150,
            BodyPart::Heal => 250,
            BodyPart::Claim => 600,
            BodyPart::Tough => 10,
        }
    }
}

pub fn body_cost(body: &[BodyPart]) -> u32 {
    body.iter().map(|part| part.cost()).sum()
}

/// Repeating body template for one role.
///
/// Bodies are `prefix` followed by as many copies of `pattern` as the energy
/// budget, `size_limit` and the 50-part cap allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreepSetup {
    pub role: String,
    pub pattern: Vec<BodyPart>,
    pub prefix: Vec<BodyPart>,
    pub size_limit: usize,
}

impl CreepSetup {
    pub fn new(role: &str, pattern: &[BodyPart]) -> Self {
        Self {
            role: role.to_string(),
            pattern: pattern.to_vec(),
            prefix: Vec::new(),
            size_limit: MAX_CREEP_SIZE,
        }
    }

    pub fn with_prefix(mut self, prefix: &[BodyPart]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn with_size_limit(mut self, repeats: usize) -> Self {
        self.size_limit = repeats;
        self
    }

    pub fn generate_body(&self, energy: u32) -> Vec<BodyPart> {
        let prefix_cost = body_cost(&self.prefix);
        let pattern_cost = body_cost(&self.pattern);
        if prefix_cost > energy || self.prefix.len() > MAX_CREEP_SIZE {
            return Vec::new();
        }
        if self.pattern.is_empty() || pattern_cost == 0 {
            return self.prefix.clone();
        }

        let by_energy = ((energy - prefix_cost) / pattern_cost) as usize;
        let by_size = (MAX_CREEP_SIZE - self.prefix.len()) / self.pattern.len();
        let repeats = by_energy.min(by_size).min(self.size_limit);
        if repeats == 0 {
            return Vec::new();
        }

        let mut body = Vec::with_capacity(self.prefix.len() + repeats * self.pattern.len());
        body.extend_from_slice(&self.prefix);
        for _ in 0..repeats {
            body.extend_from_slice(&self.pattern);
        }
        body
    }

    pub fn body_cost_for(&self, energy: u32) -> u32 {
        body_cost(&self.generate_body(energy))
    }

    /// Cost of the body with no energy ceiling.
    pub fn full_size_cost(&self) -> u32 {
        self.body_cost_for(u32::MAX)
    }
}

/// One creep wanted by a task this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub setup: CreepSetup,
    pub owner: TaskRef,
    pub priority: Priority,
    /// Spawned even while the producer suppresses its normal queue.
    pub emergency: bool,
}

impl SpawnRequest {
    pub fn new(setup: CreepSetup, owner: TaskRef, priority: Priority) -> Self {
        Self {
            setup,
            owner,
            priority,
            emergency: false,
        }
    }

    pub fn emergency(mut self) -> Self {
        self.emergency = true;
        self
    }

    pub fn role(&self) -> &str {
        &self.setup.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hauler() -> CreepSetup {
        CreepSetup::new("hauler", &[BodyPart::Carry, BodyPart::Carry, BodyPart::Move])
    }

    #[test]
    fn body_scales_with_energy_budget() {
        let setup = hauler();
        assert!(setup.generate_body(100).is_empty());
        assert_eq!(setup.generate_body(150).len(), 3);
        assert_eq!(setup.generate_body(449).len(), 6);
        assert_eq!(setup.body_cost_for(450), 450);
    }

    #[test]
    fn size_limit_caps_repeats() {
        let setup = hauler().with_size_limit(2);
        assert_eq!(setup.generate_body(10_000).len(), 6);
        assert_eq!(setup.full_size_cost(), 300);
    }

    #[test]
    fn body_never_exceeds_part_cap() {
        let setup = CreepSetup::new("worker", &[BodyPart::Work, BodyPart::Carry, BodyPart::Move])
            .with_prefix(&[BodyPart::Tough, BodyPart::Tough]);
        let body = setup.generate_body(u32::MAX);
        assert!(body.len() <= MAX_CREEP_SIZE);
        assert_eq!(body.len(), 2 + 16 * 3);
        assert_eq!(&body[..2], &[BodyPart::Tough, BodyPart::Tough]);
    }

    #[test]
    fn prefix_that_cannot_be_afforded_yields_nothing() {
        let setup = CreepSetup::new("claimer", &[BodyPart::Move])
            .with_prefix(&[BodyPart::Claim]);
        assert!(setup.generate_body(599).is_empty());
        assert_eq!(setup.generate_body(650), vec![BodyPart::Claim, BodyPart::Move]);
    }
}
