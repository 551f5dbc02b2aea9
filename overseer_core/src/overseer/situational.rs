//! Evaluators that place directives in response to what a colony sees.
//!
//! Each runs once per colony at the end of `Overseer::run` and is safe to
//! call every tick: placement always goes through
//! `create_directive_if_absent`.

use crate::colony::{ColonyName, ColonyStage};
use crate::config::Autonomy;
use crate::directives::queen_setup;
use crate::task::{DirectiveKind, PresenceScope};
use crate::world::{Position, RoomName, RoomType, StructureKind, World};

use super::{Overseer, TickEnv};

impl Overseer {
    pub(crate) fn place_directives(&mut self, env: &mut TickEnv<'_>, colony: &ColonyName) {
        self.handle_bootstrapping(env, colony);
        self.handle_outpost_defense(env, colony);
        self.handle_colony_invasions(env, colony);
        self.handle_nukes(env, colony);
        self.handle_new_outposts(env, colony);
        self.handle_unkillable_pioneers(env, colony);
    }

    fn handle_bootstrapping(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        if colony.incubating {
            return;
        }
        let Some(hatchery) = colony.hatchery.as_ref() else {
            return;
        };
        let queen_role = env.config.spawning.queen_role.as_str();
        if env.world.role_count(name, queen_role) > 0 {
            return;
        }
        let queen_cost = queen_setup(queen_role).body_cost_for(hatchery.energy_capacity_available);
        if hatchery.energy_available >= queen_cost {
            return;
        }

        let pos = hatchery.pos;
        self.create_directive_if_absent(
            DirectiveKind::Bootstrap,
            pos,
            PresenceScope::Position,
            Some(*name),
        );
        if let Some(hatchery) = env.colonies.get_mut(name).and_then(|c| c.hatchery.as_mut()) {
            hatchery.suppress_spawning = true;
        }
    }

    fn handle_outpost_defense(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        for outpost in colony.outposts.clone() {
            let Some(room) = env.world.room(&outpost) else {
                continue;
            };
            if room.dangerous_player_hostiles().next().is_some() {
                let pos = env.world.pathable_position(&outpost);
                self.create_directive_if_absent(
                    DirectiveKind::OutpostDefense,
                    pos,
                    PresenceScope::Room,
                    Some(*name),
                );
                return;
            }

            let Some(first) = room.dangerous_hostiles().next() else {
                continue;
            };
            let guarded = self.directives_in_room(outpost).any(|d| {
                matches!(d.kind(), DirectiveKind::Guard | DirectiveKind::OutpostDefense)
            });
            if room.is_self_defended() || guarded {
                continue;
            }
            let pos = first.pos;
            self.create_directive_if_absent(
                DirectiveKind::Guard,
                pos,
                PresenceScope::Position,
                Some(*name),
            );
        }
    }

    fn handle_colony_invasions(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let defense = &env.config.defense;
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        if colony.level < defense.invasion_required_level {
            return;
        }
        let Some(room) = env.world.room(&colony.room) else {
            return;
        };
        let Some(controller) = room.controller.as_ref() else {
            return;
        };

        let effective_count: u32 = room
            .hostiles
            .iter()
            .map(|h| if h.is_boosted() { defense.boosted_hostile_weight } else { 1 })
            .sum();
        let threatened = effective_count >= defense.invasion_threshold
            || room.dangerous_player_hostiles().next().is_some();
        let persistent =
            env.safety.unsafe_for(&colony.room, env.tick) > defense.invasion_persistence_ticks;
        if !(threatened && persistent) {
            return;
        }

        let pos = controller.pos;
        self.create_directive_if_absent(
            DirectiveKind::InvasionDefense,
            pos,
            PresenceScope::Room,
            Some(*name),
        );
    }

    fn handle_nukes(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        if colony.level < env.config.defense.nuke_required_level {
            return;
        }
        let Some(room) = env.world.room(&colony.room) else {
            return;
        };
        let nukes: Vec<(Position, u32)> = room
            .nukes
            .iter()
            .map(|nuke| (nuke.landing, nuke.time_to_land))
            .collect();
        for (landing, time_to_land) in nukes {
            let placed = self.create_directive_if_absent(
                DirectiveKind::NukeResponse,
                landing,
                PresenceScope::Position,
                Some(*name),
            );
            if placed {
                tracing::warn!(
                    target: "overseer::situational",
                    colony = %name,
                    pos = %landing,
                    time_to_land,
                    "nuke.incoming"
                );
            }
        }
    }

    fn handle_new_outposts(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let expansion = &env.config.expansion;
        if expansion.autonomy <= Autonomy::Manual {
            return;
        }
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        let frequency = expansion.outpost_check_frequency(env.config.server);
        if env.tick % frequency != (2 * u64::from(colony.id)) % frequency {
            return;
        }

        let world: &dyn World = &*env.world;
        let known_sources = |room: &RoomName| -> Option<Vec<Position>> {
            match world.room(room) {
                Some(snapshot) => Some(snapshot.sources.clone()),
                None => world.intel(room).and_then(|intel| intel.sources),
            }
        };

        let colony_rooms = colony.room_names();
        let total_sources: usize = colony_rooms
            .iter()
            .map(|room| known_sources(room).map(|s| s.len()).unwrap_or(0))
            .sum();
        let home_sources = known_sources(&colony.room).map(|s| s.len()).unwrap_or(0);
        let remote_sources = total_sources.saturating_sub(home_sources) as u32;
        if remote_sources >= expansion.remote_source_target(colony.level) {
            return;
        }

        let origin = colony
            .hatchery
            .as_ref()
            .map(|h| h.pos)
            .unwrap_or(colony.pos);
        let mut candidates = colony.room.rooms_in_range(expansion.outpost_search_radius);
        candidates.sort();
        candidates.retain(|room| {
            if room.room_type() != RoomType::Controller
                || env.colonies.colony_of(room).is_some()
                || self.is_directive_present(
                    DirectiveKind::Outpost,
                    &Position::center_of(*room),
                    PresenceScope::Room,
                )
            {
                return false;
            }
            let intel = world.intel(room).unwrap_or_default();
            if intel.owner.is_some() || (intel.reservation.is_some() && !env.config.is_private()) {
                return false;
            }
            world
                .exits(room)
                .iter()
                .any(|exit| colony_rooms.contains(exit))
                && world.is_room_available(room)
        });

        // Candidates without source data, or with any source out of reach,
        // are excluded before the minimum is taken.
        let scored = candidates.into_iter().filter_map(|room| {
            let sources = known_sources(&room).filter(|s| !s.is_empty())?;
            let mut total = 0u64;
            for source in &sources {
                let distance = world.path_distance(&origin, source)?;
                if distance > expansion.max_source_distance {
                    return None;
                }
                total += u64::from(distance);
            }
            Some((room, total as f64 / sources.len() as f64))
        });
        let Some((best, mean_distance)) = scored.min_by(|a, b| a.1.total_cmp(&b.1)) else {
            return;
        };

        let pos = world.pathable_position(&best);
        tracing::info!(
            target: "overseer::situational",
            colony = %name,
            room = %best,
            mean_distance,
            "outpost.selected"
        );
        self.create_directive_if_absent(DirectiveKind::Outpost, pos, PresenceScope::Room, Some(*name));
    }

    /// Colonies that lost every spawn get pioneers from their neighbours.
    fn handle_unkillable_pioneers(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        if env.tick % env.config.expansion.pioneer_check_interval != 0 {
            return;
        }
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        if colony.spawn_count > 0 || env.world.count_my_spawns(&colony.room) > 0 {
            return;
        }
        let pos = env.world.pathable_position(&colony.room);
        self.create_directive_if_absent(DirectiveKind::Colonize, pos, PresenceScope::Room, Some(*name));
    }

    pub(crate) fn handle_safe_mode(&mut self, env: &mut TickEnv<'_>, name: &ColonyName) {
        let Some(colony) = env.colonies.get(name) else {
            return;
        };
        if colony.stage == ColonyStage::Larva && !env.config.is_private() {
            return;
        }
        let room_name = colony.room;
        let Some(room) = env.world.room(&room_name) else {
            return;
        };
        let hostiles: Vec<Position> = room.dangerous_hostiles().map(|h| h.pos).collect();
        let Some(first_hostile) = hostiles.first() else {
            return;
        };

        let range = env.config.defense.safe_mode_hostile_range;
        let critical_hit = room
            .structures
            .iter()
            .filter(|s| {
                matches!(
                    s.kind,
                    StructureKind::Spawn | StructureKind::Storage | StructureKind::Terminal
                )
            })
            .any(|s| s.is_damaged() && hostiles.iter().any(|h| h.in_range_to(&s.pos, range)));
        let breached = !critical_hit
            && room.spawns().next().is_some_and(|spawn| {
                let ramparts: Vec<Position> = room
                    .structures_of(StructureKind::Rampart)
                    .map(|s| s.pos)
                    .collect();
                env.world.is_reachable(first_hostile, &spawn.pos, &ramparts)
            });
        if !critical_hit && !breached {
            return;
        }

        if room
            .controller
            .as_ref()
            .is_some_and(|controller| controller.safe_mode_active())
        {
            return;
        }
        let terminal = room.terminal().map(|t| t.pos);

        match env.world.activate_safe_mode(&room_name) {
            Ok(()) => {
                tracing::warn!(
                    target: "overseer::situational",
                    colony = %name,
                    critical_hit,
                    "safe_mode.activated"
                );
            }
            Err(err) => {
                tracing::warn!(
                    target: "overseer::situational",
                    colony = %name,
                    error = %err,
                    "safe_mode.unavailable"
                );
                if let Some(terminal) = terminal {
                    self.create_directive_if_absent(
                        DirectiveKind::TerminalEvacuation,
                        terminal,
                        PresenceScope::Room,
                        Some(*name),
                    );
                }
            }
        }
    }
}
