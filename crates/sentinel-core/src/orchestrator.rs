//! Level-wide coordinator: evaluates puzzle groups and relays sentry alerts.
//!
//! The orchestrator holds ids only. Plates, gates, exits and sentries are
//! owned by the level and lent in for each notification.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{info, warn};

use crate::{ExitId, ExitMap, GateId, GateMap, PlateId, PlateMap, SentryId, SentryMap};

/// What a solved puzzle group drives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupAction {
    pub gates: SmallVec<[GateId; 2]>,
    /// Exit unlocked when solved; a group with an exit is terminal and halts every sentry.
    pub exit: Option<ExitId>,
}

impl GroupAction {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.exit.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty() && self.exit.is_none()
    }
}

/// Plates that must all be active at once to trigger an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PuzzleGroup {
    name: String,
    plates: SmallVec<[PlateId; 4]>,
    action: GroupAction,
    solved: bool,
}

impl PuzzleGroup {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        plates: impl IntoIterator<Item = PlateId>,
        action: GroupAction,
    ) -> Self {
        Self {
            name: name.into(),
            plates: plates.into_iter().collect(),
            action,
            solved: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn plates(&self) -> &[PlateId] {
        &self.plates
    }

    #[must_use]
    pub const fn action(&self) -> &GroupAction {
        &self.action
    }

    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.solved
    }

    /// Groups with no plates or nothing to drive are never evaluated.
    #[must_use]
    pub fn is_evaluable(&self) -> bool {
        !self.plates.is_empty() && !self.action.is_empty()
    }

    /// Every plate present and active. A plate that no longer exists counts as inactive.
    #[must_use]
    pub fn all_plates_active(&self, plates: &PlateMap) -> bool {
        self.plates
            .iter()
            .all(|id| plates.get(*id).is_some_and(|plate| plate.is_active()))
    }
}

/// Command issued while evaluating puzzle groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PuzzleCommand {
    Gate { gate: GateId, open: bool },
    Exit { exit: ExitId, unlocked: bool },
    HaltSentries,
    ReleaseSentries,
}

pub type PuzzleCommands = SmallVec<[PuzzleCommand; 4]>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orchestrator {
    agents: Vec<SentryId>,
    groups: Vec<PuzzleGroup>,
}

impl Orchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_agent(&mut self, agent: SentryId) {
        if !self.agents.contains(&agent) {
            self.agents.push(agent);
        }
    }

    pub fn add_group(&mut self, group: PuzzleGroup) {
        if group.plates.is_empty() {
            warn!(group = %group.name, "puzzle group has no plates; it will never be evaluated");
        } else if group.action.is_empty() {
            warn!(group = %group.name, "puzzle group has no gate or exit; it will never be evaluated");
        }
        self.groups.push(group);
    }

    #[must_use]
    pub fn agents(&self) -> &[SentryId] {
        &self.agents
    }

    #[must_use]
    pub fn groups(&self) -> &[PuzzleGroup] {
        &self.groups
    }

    /// Whether any puzzle group drives `gate`.
    #[must_use]
    pub fn controls_gate(&self, gate: GateId) -> bool {
        self.groups
            .iter()
            .any(|group| group.action.gates.contains(&gate))
    }

    /// Re-evaluate every group after a plate flipped.
    ///
    /// Solved groups re-issue their open/unlock commands on every call;
    /// unsolved groups close their gates only when leaving the solved state.
    pub fn notify_plate_changed(
        &mut self,
        plates: &PlateMap,
        gates: &mut GateMap,
        exits: &mut ExitMap,
        sentries: &mut SentryMap,
    ) -> PuzzleCommands {
        let mut commands = PuzzleCommands::new();
        for group in &mut self.groups {
            if !group.is_evaluable() {
                continue;
            }
            let solved = group.all_plates_active(plates);
            let was_solved = group.solved;
            group.solved = solved;

            if solved {
                if !was_solved {
                    info!(group = %group.name, terminal = group.action.is_terminal(), "puzzle group solved");
                }
                for gate in &group.action.gates {
                    if let Some(actuator) = gates.get_mut(*gate) {
                        actuator.set_commanded_state(true);
                        commands.push(PuzzleCommand::Gate {
                            gate: *gate,
                            open: true,
                        });
                    } else {
                        warn!(group = %group.name, ?gate, "puzzle gate no longer exists");
                    }
                }
                if let Some(exit) = group.action.exit {
                    if let Some(portal) = exits.get_mut(exit) {
                        portal.set_unlocked(true);
                        commands.push(PuzzleCommand::Exit {
                            exit,
                            unlocked: true,
                        });
                    } else {
                        warn!(group = %group.name, ?exit, "puzzle exit no longer exists");
                    }
                    for agent in &self.agents {
                        if let Some(sentry) = sentries.get_mut(*agent) {
                            sentry.halt();
                        }
                    }
                    commands.push(PuzzleCommand::HaltSentries);
                }
            } else {
                if was_solved {
                    info!(group = %group.name, "puzzle group no longer solved");
                    for gate in &group.action.gates {
                        if let Some(actuator) = gates.get_mut(*gate) {
                            actuator.set_commanded_state(false);
                            commands.push(PuzzleCommand::Gate {
                                gate: *gate,
                                open: false,
                            });
                        } else {
                            warn!(group = %group.name, ?gate, "puzzle gate no longer exists");
                        }
                    }
                }
                if let Some(exit) = group.action.exit {
                    if let Some(portal) = exits.get_mut(exit) {
                        portal.set_unlocked(false);
                        commands.push(PuzzleCommand::Exit {
                            exit,
                            unlocked: false,
                        });
                    } else {
                        warn!(group = %group.name, ?exit, "puzzle exit no longer exists");
                    }
                    if was_solved {
                        for agent in &self.agents {
                            if let Some(sentry) = sentries.get_mut(*agent) {
                                sentry.release();
                            }
                        }
                        commands.push(PuzzleCommand::ReleaseSentries);
                    }
                }
            }
        }
        commands
    }

    /// Push every tracked sentry except `origin` into confusion.
    ///
    /// Returns the sentries whose state actually changed.
    pub fn notify_agent_confused(
        &self,
        origin: SentryId,
        sentries: &mut SentryMap,
    ) -> SmallVec<[SentryId; 8]> {
        let name = sentries.get(origin).map_or("<unknown>", |s| s.name()).to_owned();
        info!(origin = %name, "sentry confused; alerting peers");

        let mut confused = SmallVec::new();
        for agent in self.agents.iter().filter(|id| **id != origin) {
            if let Some(sentry) = sentries.get_mut(*agent)
                && sentry.force_confuse()
            {
                confused.push(*agent);
            }
        }
        confused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::KinematicAgent;
    use crate::plate::{BodyLayer, OverlapBody, PressurePlate};
    use crate::{BotStateKind, ExitPortal, GateActuator, Sentry, SentryProfile};
    use glam::Vec3;
    use sentinel_index::Aabb;

    struct Fixture {
        plates: PlateMap,
        gates: GateMap,
        exits: ExitMap,
        sentries: SentryMap,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                plates: PlateMap::with_key(),
                gates: GateMap::with_key(),
                exits: ExitMap::with_key(),
                sentries: SentryMap::with_key(),
            }
        }

        fn plate(&mut self) -> PlateId {
            let volume = Aabb::from_center(Vec3::ZERO, Vec3::ONE).expect("volume");
            self.plates.insert(PressurePlate::new("plate", volume, 80.0))
        }

        fn press(&mut self, plate: PlateId, mass: f32) {
            let body = OverlapBody {
                layer: BodyLayer::Weighted,
                mass: Some(mass),
            };
            self.plates
                .get_mut(plate)
                .expect("plate")
                .on_overlap_stay(&body);
        }

        fn sentry(&mut self, name: &str) -> SentryId {
            self.sentries.insert(Sentry::new(
                name,
                SentryProfile::default(),
                vec![Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0)],
                Box::new(KinematicAgent::new(Vec3::ZERO)),
                0.0,
            ))
        }

        fn notify(&mut self, orchestrator: &mut Orchestrator) -> PuzzleCommands {
            orchestrator.notify_plate_changed(
                &self.plates,
                &mut self.gates,
                &mut self.exits,
                &mut self.sentries,
            )
        }
    }

    #[test]
    fn gate_opens_only_when_every_plate_is_active() {
        let mut fx = Fixture::new();
        let plates = [fx.plate(), fx.plate()];
        let gate = fx
            .gates
            .insert(GateActuator::new("door", Vec3::ZERO, 2.5, 5.0, Vec3::ONE));
        let mut orchestrator = Orchestrator::new();
        orchestrator.add_group(PuzzleGroup::new(
            "vault",
            plates,
            GroupAction {
                gates: SmallVec::from_slice(&[gate]),
                exit: None,
            },
        ));

        fx.press(plates[0], 90.0);
        assert!(fx.notify(&mut orchestrator).is_empty());
        assert!(!fx.gates[gate].is_commanded_open());

        fx.press(plates[1], 90.0);
        let open = fx.notify(&mut orchestrator);
        assert_eq!(open.as_slice(), &[PuzzleCommand::Gate { gate, open: true }]);
        assert_eq!(fx.notify(&mut orchestrator), open);

        fx.press(plates[0], 10.0);
        assert_eq!(
            fx.notify(&mut orchestrator).as_slice(),
            &[PuzzleCommand::Gate { gate, open: false }]
        );
        assert!(!fx.gates[gate].is_commanded_open());
        assert!(fx.notify(&mut orchestrator).is_empty());
    }

    #[test]
    fn groups_without_plates_or_targets_are_skipped() {
        let mut fx = Fixture::new();
        let plate = fx.plate();
        let gate = fx
            .gates
            .insert(GateActuator::new("door", Vec3::ZERO, 2.5, 5.0, Vec3::ONE));
        let mut orchestrator = Orchestrator::new();
        orchestrator.add_group(PuzzleGroup::new(
            "no-plates",
            [],
            GroupAction {
                gates: SmallVec::from_slice(&[gate]),
                exit: None,
            },
        ));
        orchestrator.add_group(PuzzleGroup::new("no-target", [plate], GroupAction::default()));

        fx.press(plate, 100.0);
        assert!(fx.notify(&mut orchestrator).is_empty());
        assert!(!fx.gates[gate].is_commanded_open());
    }

    #[test]
    fn missing_gate_is_skipped_while_others_open() {
        let mut fx = Fixture::new();
        let plate = fx.plate();
        let kept = fx
            .gates
            .insert(GateActuator::new("kept", Vec3::ZERO, 2.5, 5.0, Vec3::ONE));
        let gone = fx
            .gates
            .insert(GateActuator::new("gone", Vec3::X, 2.5, 5.0, Vec3::ONE));
        let mut orchestrator = Orchestrator::new();
        orchestrator.add_group(PuzzleGroup::new(
            "pair",
            [plate],
            GroupAction {
                gates: SmallVec::from_slice(&[gone, kept]),
                exit: None,
            },
        ));
        assert!(orchestrator.controls_gate(gone));
        fx.gates.remove(gone);

        fx.press(plate, 100.0);
        assert_eq!(
            fx.notify(&mut orchestrator).as_slice(),
            &[PuzzleCommand::Gate {
                gate: kept,
                open: true
            }]
        );
        assert!(fx.gates[kept].is_commanded_open());
    }

    #[test]
    fn removed_plate_keeps_group_unsolved() {
        let mut fx = Fixture::new();
        let plates = [fx.plate(), fx.plate()];
        let gate = fx
            .gates
            .insert(GateActuator::new("door", Vec3::ZERO, 2.5, 5.0, Vec3::ONE));
        let mut orchestrator = Orchestrator::new();
        orchestrator.add_group(PuzzleGroup::new(
            "vault",
            plates,
            GroupAction {
                gates: SmallVec::from_slice(&[gate]),
                exit: None,
            },
        ));
        fx.press(plates[0], 100.0);
        fx.plates.remove(plates[1]);
        assert!(fx.notify(&mut orchestrator).is_empty());
    }

    #[test]
    fn terminal_group_unlocks_exit_and_halts_sentries() {
        let mut fx = Fixture::new();
        let plates = [fx.plate(), fx.plate(), fx.plate()];
        let region = Aabb::from_center(Vec3::splat(10.0), Vec3::ONE).expect("region");
        let exit = fx.exits.insert(ExitPortal::new("exit", region));
        let bots = [fx.sentry("a"), fx.sentry("b")];
        let mut orchestrator = Orchestrator::new();
        for bot in bots {
            orchestrator.register_agent(bot);
        }
        orchestrator.add_group(PuzzleGroup::new(
            "final",
            plates,
            GroupAction {
                gates: SmallVec::new(),
                exit: Some(exit),
            },
        ));

        fx.press(plates[0], 100.0);
        fx.press(plates[1], 100.0);
        let commands = fx.notify(&mut orchestrator);
        assert_eq!(
            commands.as_slice(),
            &[PuzzleCommand::Exit {
                exit,
                unlocked: false
            }]
        );
        assert!(bots.iter().all(|id| !fx.sentries[*id].is_halted()));

        fx.press(plates[2], 100.0);
        let commands = fx.notify(&mut orchestrator);
        assert!(commands.contains(&PuzzleCommand::HaltSentries));
        assert!(fx.exits[exit].is_unlocked());
        assert!(bots.iter().all(|id| fx.sentries[*id].is_halted()));

        fx.press(plates[2], 0.0);
        let commands = fx.notify(&mut orchestrator);
        assert!(commands.contains(&PuzzleCommand::ReleaseSentries));
        assert!(!fx.exits[exit].is_unlocked());
        assert!(bots.iter().all(|id| !fx.sentries[*id].is_halted()));
    }

    #[test]
    fn alert_skips_origin_and_is_idempotent() {
        let mut fx = Fixture::new();
        let bots = [fx.sentry("a"), fx.sentry("b"), fx.sentry("c")];
        let mut orchestrator = Orchestrator::new();
        for bot in bots {
            orchestrator.register_agent(bot);
        }

        let confused = orchestrator.notify_agent_confused(bots[0], &mut fx.sentries);
        assert_eq!(confused.as_slice(), &bots[1..]);
        assert_eq!(fx.sentries[bots[0]].state().kind(), BotStateKind::Patrol);
        for bot in &bots[1..] {
            assert_eq!(fx.sentries[*bot].state().kind(), BotStateKind::Confused);
        }

        let again = orchestrator.notify_agent_confused(bots[0], &mut fx.sentries);
        assert!(again.is_empty());
    }
}
