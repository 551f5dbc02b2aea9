//! Builtin directives: one standing intent per [`DirectiveKind`], each owning
//! a single overlord that keeps a small squad of creeps alive.

use crate::body::{BodyPart, CreepSetup, SpawnRequest};
use crate::colony::ColonyName;
use crate::task::{
    Annotation, Directive, DirectiveFactory, DirectiveKind, Marker, Overlord, Priority,
    TaskError, TaskRef, TickContext,
};
use crate::world::{Position, Tick};

/// Body of the creep that keeps a hatchery's extensions filled.
pub fn queen_setup(role: &str) -> CreepSetup {
    CreepSetup::new(role, &[BodyPart::Carry, BodyPart::Carry, BodyPart::Move]).with_size_limit(8)
}

/// Where an overlord gets its creeps from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// The owning colony's own hatchery, as an emergency request.
    HomeEmergency,
    /// Whichever colony the spawn group at the anchor picks, starting from the
    /// configured allocation settings.
    SpawnGroup { required_level: u8 },
}

#[derive(Debug, Clone, Copy)]
struct Standing {
    role: &'static str,
    priority: u32,
    quantity: usize,
    pattern: &'static [BodyPart],
    source: Source,
}

impl Standing {
    fn for_kind(kind: DirectiveKind) -> Option<Self> {
        let group = |required_level: u8| Source::SpawnGroup { required_level };
        let standing = match kind {
            DirectiveKind::Bootstrap => Standing {
                role: "filler",
                priority: 0,
                quantity: 2,
                pattern: &[BodyPart::Carry, BodyPart::Move],
                source: Source::HomeEmergency,
            },
            DirectiveKind::InvasionDefense => Standing {
                role: "melee_defender",
                priority: 100,
                quantity: 2,
                pattern: &[BodyPart::Tough, BodyPart::Attack, BodyPart::Move],
                source: group(3),
            },
            DirectiveKind::TerminalEvacuation => Standing {
                role: "manager",
                priority: 140,
                quantity: 1,
                pattern: &[BodyPart::Carry, BodyPart::Carry, BodyPart::Move],
                source: group(4),
            },
            DirectiveKind::NukeResponse => Standing {
                role: "nuke_fortifier",
                priority: 150,
                quantity: 1,
                pattern: &[BodyPart::Work, BodyPart::Carry, BodyPart::Move],
                source: group(4),
            },
            DirectiveKind::OutpostDefense => Standing {
                role: "outpost_defender",
                priority: 200,
                quantity: 2,
                pattern: &[BodyPart::RangedAttack, BodyPart::Heal, BodyPart::Move, BodyPart::Move],
                source: group(4),
            },
            DirectiveKind::Guard => Standing {
                role: "guard",
                priority: 250,
                quantity: 1,
                pattern: &[BodyPart::Attack, BodyPart::Move],
                source: group(3),
            },
            DirectiveKind::Colonize => Standing {
                role: "pioneer",
                priority: 300,
                quantity: 2,
                pattern: &[BodyPart::Work, BodyPart::Carry, BodyPart::Move, BodyPart::Move],
                source: group(3),
            },
            DirectiveKind::Outpost => Standing {
                role: "reserver",
                priority: 400,
                quantity: 1,
                pattern: &[BodyPart::Claim, BodyPart::Move],
                source: group(3),
            },
            DirectiveKind::Custom(_) => return None,
        };
        Some(standing)
    }
}

pub struct StandingDirective {
    marker: Marker,
    standing: Standing,
}

impl StandingDirective {
    pub fn from_marker(marker: &Marker) -> Option<Self> {
        Some(Self {
            marker: marker.clone(),
            standing: Standing::for_kind(marker.kind)?,
        })
    }

    pub fn created(&self) -> Tick {
        self.marker.created
    }

    fn home(&self) -> ColonyName {
        self.marker.colony.unwrap_or(self.marker.pos.room)
    }

    /// Reason the directive should retire, if its anchor condition failed.
    fn failed_precondition(&self, ctx: &TickContext<'_>) -> Option<&'static str> {
        let home = self.home();
        let room = self.marker.pos.room;
        let defense = &ctx.config.defense;
        let level = ctx.colony(&home).map(|c| c.level).unwrap_or(0);

        match self.marker.kind {
            DirectiveKind::InvasionDefense if level < defense.invasion_required_level => {
                Some("colony_level")
            }
            DirectiveKind::NukeResponse => {
                if level < defense.nuke_required_level {
                    return Some("colony_level");
                }
                let nuke_remains = ctx
                    .world
                    .room(&room)
                    .map(|r| r.nukes.iter().any(|n| n.landing == self.marker.pos))
                    .unwrap_or(true);
                (!nuke_remains).then_some("nuke_landed")
            }
            DirectiveKind::Bootstrap => {
                let queens = ctx.world.role_count(&home, &ctx.config.spawning.queen_role);
                (queens > 0).then_some("queen_restored")
            }
            DirectiveKind::Guard | DirectiveKind::OutpostDefense => {
                let grace = defense.guard_grace_ticks;
                let quiet = ctx.tick >= self.marker.created + grace
                    && ctx.safety.safe_for(&room, ctx.tick) >= grace;
                quiet.then_some("room_quiet")
            }
            DirectiveKind::TerminalEvacuation => {
                let terminal = ctx.world.room(&room).map(|r| r.terminal().is_some());
                (terminal == Some(false)).then_some("terminal_gone")
            }
            DirectiveKind::Colonize => {
                (ctx.world.count_my_spawns(&room) > 0).then_some("spawn_rebuilt")
            }
            _ => None,
        }
    }
}

impl Directive for StandingDirective {
    fn name(&self) -> &TaskRef {
        &self.marker.name
    }

    fn kind(&self) -> DirectiveKind {
        self.marker.kind
    }

    fn anchor(&self) -> &Position {
        &self.marker.pos
    }

    fn colony(&self) -> Option<&ColonyName> {
        self.marker.colony.as_ref()
    }

    fn spawn_overlords(&mut self) -> Vec<(String, Box<dyn Overlord>)> {
        let overlord = StandingOverlord {
            task_ref: self.marker.name.child(self.standing.role),
            colony: self.home(),
            anchor: self.marker.pos,
            standing: self.standing,
            alive: 0,
        };
        vec![(self.standing.role.to_string(), Box::new(overlord))]
    }

    fn run(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        let Some(reason) = self.failed_precondition(ctx) else {
            return Ok(());
        };
        if self.marker.kind == DirectiveKind::Bootstrap {
            if let Some(hatchery) = ctx
                .colonies
                .get_mut(&self.home())
                .and_then(|c| c.hatchery.as_mut())
            {
                hatchery.suppress_spawning = false;
            }
        }
        tracing::info!(
            target: "overseer::situational",
            directive = %self.marker.name,
            reason,
            "directive.retired"
        );
        ctx.remove_directive(&self.marker.name);
        Ok(())
    }

    fn visuals(&self, out: &mut Vec<Annotation>) {
        out.push(Annotation {
            pos: Some(self.marker.pos),
            text: self.marker.kind.to_string(),
        });
    }
}

/// Keeps `quantity` creeps of one role alive for its directive.
pub struct StandingOverlord {
    task_ref: TaskRef,
    colony: ColonyName,
    anchor: Position,
    standing: Standing,
    alive: usize,
}

impl StandingOverlord {
    fn setup(&self) -> CreepSetup {
        CreepSetup::new(self.standing.role, self.standing.pattern)
    }
}

impl Overlord for StandingOverlord {
    fn task_ref(&self) -> &TaskRef {
        &self.task_ref
    }

    fn priority(&self) -> Priority {
        Priority(self.standing.priority)
    }

    fn colony(&self) -> &ColonyName {
        &self.colony
    }

    fn init(&mut self, ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        self.alive = ctx
            .world
            .creep_count(self.task_ref.as_str(), self.standing.role);
        if self.alive >= self.standing.quantity {
            return Ok(());
        }

        let request = SpawnRequest::new(
            self.setup(),
            self.task_ref.clone(),
            Priority(self.standing.priority),
        );
        match self.standing.source {
            Source::HomeEmergency => ctx.enqueue_at_colony(&self.colony, request.emergency()),
            Source::SpawnGroup { required_level } => {
                let settings = ctx
                    .config
                    .spawning
                    .allocation
                    .with_required_level(required_level);
                ctx.request_spawn(&self.task_ref, self.anchor.room, settings, request);
                Ok(())
            }
        }
    }

    fn run(&mut self, _ctx: &mut TickContext<'_>) -> Result<(), TaskError> {
        Ok(())
    }

    fn visuals(&self, out: &mut Vec<Annotation>) {
        out.push(Annotation {
            pos: Some(self.anchor),
            text: format!(
                "{} {}/{}",
                self.standing.role, self.alive, self.standing.quantity
            ),
        });
    }
}

/// Builds a [`StandingDirective`] for every builtin kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandingDirectiveFactory;

impl DirectiveFactory for StandingDirectiveFactory {
    fn build(&self, marker: &Marker) -> Option<Box<dyn Directive>> {
        StandingDirective::from_marker(marker).map(|d| Box::new(d) as Box<dyn Directive>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::RoomName;

    fn marker(kind: DirectiveKind) -> Marker {
        let room = RoomName::parse("W4N2").unwrap();
        Marker::new(kind, Position::new(room, 12, 30), Some(room), 50)
    }

    #[test]
    fn every_builtin_kind_builds_one_overlord() {
        let factory = StandingDirectiveFactory;
        for kind in DirectiveKind::BUILTIN {
            let mut directive = factory.build(&marker(kind)).expect("builtin kind builds");
            let overlords = directive.spawn_overlords();
            assert_eq!(overlords.len(), 1, "{kind}");
            let (role, overlord) = &overlords[0];
            assert_eq!(overlord.task_ref().as_str(), format!("{}/{role}", directive.name()));
        }
    }

    #[test]
    fn custom_kinds_are_not_built() {
        assert!(StandingDirectiveFactory
            .build(&marker(DirectiveKind::Custom("harvest")))
            .is_none());
    }

    #[test]
    fn defensive_overlords_outrank_economic_ones() {
        let priority = |kind| Standing::for_kind(kind).map(|s| s.priority).unwrap();
        assert!(priority(DirectiveKind::Bootstrap) < priority(DirectiveKind::InvasionDefense));
        assert!(priority(DirectiveKind::InvasionDefense) < priority(DirectiveKind::Guard));
        assert!(priority(DirectiveKind::Guard) < priority(DirectiveKind::Outpost));
    }

    #[test]
    fn queen_body_is_capped() {
        let queen = queen_setup("queen");
        assert_eq!(queen.generate_body(10_000).len(), 24);
        assert_eq!(queen.body_cost_for(300), 300);
    }
}
