//! The level world: owns every entity and runs the per-tick pipeline.

use glam::Vec3;
use sentinel_index::{Aabb, ColliderId, CollisionScene, SpatialQuery};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

use crate::behavior::BotStateKind;
use crate::gate::{ExitPortal, GateActuator};
use crate::kinetic::{KineticBody, ShiftOutcome};
use crate::nav::{KinematicAgent, PathfindingAgent};
use crate::orchestrator::{Orchestrator, PuzzleCommand, PuzzleGroup};
use crate::plate::{OverlapBody, PlateChange, PressurePlate};
use crate::scheduler::Scheduler;
use crate::sensor::SightTarget;
use crate::sentry::Sentry;
use crate::vitals::{HitOutcome, PlayerVitals};
use crate::{
    BodyId, BodyMap, ExitId, ExitMap, GateId, GateMap, KineticSettings, LevelError, PLAYER_TAG,
    PlateId, PlateMap, SentinelConfig, SentryId, SentryMap, SentryProfile, Tick,
};

const WALL_TAG: &str = "Wall";
const DOOR_TAG: &str = "Door";
const SENTRY_TAG: &str = "Sentry";
const KINETIC_TAG: &str = "Kinetic";

/// How the level ended, if it has.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelOutcome {
    #[default]
    InProgress,
    Victory,
    Defeat,
}

impl LevelOutcome {
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// The player as seen by sentries, plates and exits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Player {
    position: Vec3,
    half_extents: Vec3,
    collider: ColliderId,
}

impl Player {
    /// Centre of the player's bounds.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    #[must_use]
    pub const fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    #[must_use]
    pub const fn collider(&self) -> ColliderId {
        self.collider
    }

    pub fn bounds(&self) -> Result<Aabb, sentinel_index::IndexError> {
        Aabb::from_center(self.position, self.half_extents)
    }
}

/// Behaviour transition observed during a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    pub sentry: SentryId,
    pub from: BotStateKind,
    pub to: BotStateKind,
}

/// Events emitted after processing a level tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    pub transitions: Vec<StateChange>,
    /// Sentries that confused themselves and broadcast an alert.
    pub alerts: Vec<SentryId>,
    /// Sentries pushed into confusion by a peer's alert.
    pub alerted: Vec<SentryId>,
    pub plate_changes: Vec<(PlateId, PlateChange)>,
    pub puzzle_commands: Vec<PuzzleCommand>,
    pub obstacles_reenabled: Vec<BodyId>,
    pub hits: Vec<HitOutcome>,
    /// Set on the tick the level ends.
    pub outcome: Option<LevelOutcome>,
}

/// Compact per-tick snapshot kept in the level history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub clock: f64,
    /// Sentry counts indexed by [`BotStateKind::index`].
    pub state_counts: [usize; 4],
    pub active_plates: usize,
    pub open_gates: usize,
    pub unlocked_exits: usize,
    pub lives: u32,
    pub outcome: LevelOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Subject {
    Obstacle(BodyId),
    Invulnerability,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Deferred {
    ReenableObstacle { carving: bool },
    EndInvulnerability,
}

/// A running level.
pub struct Level {
    config: SentinelConfig,
    tick: Tick,
    clock: f64,
    scene: CollisionScene,
    sentries: SentryMap,
    plates: PlateMap,
    gates: GateMap,
    exits: ExitMap,
    bodies: BodyMap,
    player: Option<Player>,
    orchestrator: Orchestrator,
    scheduler: Scheduler<Subject, Deferred>,
    vitals: PlayerVitals,
    outcome: LevelOutcome,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("tick", &self.tick)
            .field("clock", &self.clock)
            .field("sentries", &self.sentries.len())
            .field("plates", &self.plates.len())
            .field("gates", &self.gates.len())
            .field("exits", &self.exits.len())
            .field("bodies", &self.bodies.len())
            .field("lives", &self.vitals.lives())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Level {
    /// Run one tick of `config.tick_seconds`.
    pub fn step(&mut self) -> TickEvents {
        self.step_by(self.config.tick_seconds)
    }

    /// Run one tick of `dt` seconds. A finished level no longer advances.
    pub fn step_by(&mut self, dt: f32) -> TickEvents {
        if self.outcome.is_finished() {
            return TickEvents {
                tick: self.tick,
                ..TickEvents::default()
            };
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let next_tick = self.tick.next();
        self.clock += f64::from(dt);

        let mut events = TickEvents {
            tick: next_tick,
            ..TickEvents::default()
        };
        self.stage_deferred(&mut events);
        self.stage_sentries(dt, &mut events);
        self.stage_navigation(dt);
        self.stage_plates(&mut events);
        self.stage_plate_doors();
        self.stage_gates(dt);
        self.stage_contacts(&mut events);
        self.stage_exits(&mut events);

        self.tick = next_tick;
        self.stage_history();
        events
    }

    fn stage_deferred(&mut self, events: &mut TickEvents) {
        for (subject, effect) in self.scheduler.drain_due(self.clock) {
            match (subject, effect) {
                (Subject::Obstacle(id), Deferred::ReenableObstacle { carving }) => {
                    if let Some(body) = self.bodies.get_mut(id) {
                        body.reenable_obstacle(carving);
                        events.obstacles_reenabled.push(id);
                    }
                }
                (Subject::Invulnerability, Deferred::EndInvulnerability) => {
                    self.vitals.end_invulnerability();
                    debug!("player invulnerability ended");
                }
                (subject, effect) => {
                    warn!(?subject, ?effect, "dropping mismatched deferred effect");
                }
            }
        }
    }

    fn stage_sentries(&mut self, dt: f32, events: &mut TickEvents) {
        let target = self.player.map(|player| SightTarget {
            position: player.position,
            collider: Some(player.collider),
            tag: Some(PLAYER_TAG),
        });
        let ids: Vec<SentryId> = self.sentries.keys().collect();
        for id in ids {
            let Some(sentry) = self.sentries.get_mut(id) else {
                continue;
            };
            let update = sentry.think(dt, target.as_ref(), &self.scene);
            if update.changed() {
                events.transitions.push(StateChange {
                    sentry: id,
                    from: update.previous,
                    to: update.current,
                });
            }
            if update.alert {
                events.alerts.push(id);
                let confused = self
                    .orchestrator
                    .notify_agent_confused(id, &mut self.sentries);
                events.alerted.extend(confused);
            }
        }
    }

    fn stage_navigation(&mut self, dt: f32) {
        for sentry in self.sentries.values_mut() {
            sentry.advance(dt);
            if let Some(collider) = sentry.collider() {
                sync_collider(&mut self.scene, collider, sentry.bounds(), sentry.name());
            }
        }
    }

    fn stage_plates(&mut self, events: &mut TickEvents) {
        let ids: Vec<PlateId> = self.plates.keys().collect();
        for id in ids {
            let Some(volume) = self.plates.get(id).map(|plate| *plate.volume()) else {
                continue;
            };
            let present = self.bodies_within(&volume);
            let Some(overlaps) = self.plates.get_mut(id).map(|plate| plate.observe(&present)) else {
                continue;
            };
            for overlap in overlaps {
                let Some(change) = self
                    .plates
                    .get_mut(id)
                    .and_then(|plate| plate.handle(&overlap))
                else {
                    continue;
                };
                events.plate_changes.push((id, change));
                let commands = self.orchestrator.notify_plate_changed(
                    &self.plates,
                    &mut self.gates,
                    &mut self.exits,
                    &mut self.sentries,
                );
                events.puzzle_commands.extend(commands);
            }
        }
    }

    /// Plates drive their own door unless a puzzle group owns that door.
    fn stage_plate_doors(&mut self) {
        for plate in self.plates.values() {
            let Some(id) = plate.target_gate() else {
                continue;
            };
            if self.orchestrator.controls_gate(id) {
                continue;
            }
            if let Some(gate) = self.gates.get_mut(id) {
                gate.set_commanded_state(plate.is_active());
            }
        }
    }

    fn stage_gates(&mut self, dt: f32) {
        for gate in self.gates.values_mut() {
            gate.tick(dt);
            if let Some(collider) = gate.collider() {
                sync_collider(&mut self.scene, collider, gate.bounds(), gate.name());
            }
        }
    }

    fn stage_contacts(&mut self, events: &mut TickEvents) {
        let Some(player) = self.player else {
            return;
        };
        let Ok(player_bounds) = player.bounds() else {
            return;
        };
        let margin = Vec3::splat(self.config.contact_margin);
        let touched = self.sentries.values().any(|sentry| {
            sentry.is_active()
                && sentry.bounds().is_ok_and(|bounds| {
                    Aabb::from_center(bounds.center(), bounds.half_extents() + margin)
                        .is_ok_and(|reach| reach.intersects(&player_bounds))
                })
        });
        if !touched {
            return;
        }

        let hit = self.vitals.deduct_life();
        if hit == HitOutcome::Ignored {
            return;
        }
        events.hits.push(hit);
        self.scheduler.schedule(
            Subject::Invulnerability,
            self.clock + f64::from(self.config.invulnerability_duration),
            Deferred::EndInvulnerability,
        );
        if hit == HitOutcome::Defeated {
            info!(tick = self.tick.next().0, "player out of lives");
            self.finish(LevelOutcome::Defeat, events);
        }
    }

    fn stage_exits(&mut self, events: &mut TickEvents) {
        if self.outcome.is_finished() {
            return;
        }
        let Some(player) = self.player else {
            return;
        };
        if let Some(exit) = self.exits.values().find(|exit| exit.admits(player.position)) {
            info!(exit = %exit.name(), "player reached the exit");
            self.finish(LevelOutcome::Victory, events);
        }
    }

    fn stage_history(&mut self) {
        let mut state_counts = [0; 4];
        for sentry in self.sentries.values().filter(|sentry| sentry.is_active()) {
            state_counts[sentry.state().kind().index()] += 1;
        }
        let summary = TickSummary {
            tick: self.tick,
            clock: self.clock,
            state_counts,
            active_plates: self.plates.values().filter(|p| p.is_active()).count(),
            open_gates: self
                .gates
                .values()
                .filter(|g| g.is_commanded_open())
                .count(),
            unlocked_exits: self.exits.values().filter(|e| e.is_unlocked()).count(),
            lives: self.vitals.lives(),
            outcome: self.outcome,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    fn finish(&mut self, outcome: LevelOutcome, events: &mut TickEvents) {
        self.outcome = outcome;
        events.outcome = Some(outcome);
    }

    fn bodies_within(&self, volume: &Aabb) -> Vec<(BodyId, OverlapBody)> {
        self.bodies
            .iter()
            .filter(|(_, body)| {
                body.bounds(&self.config.kinetic)
                    .is_ok_and(|bounds| bounds.intersects(volume))
            })
            .map(|(id, body)| (id, body.overlap_body()))
            .collect()
    }

    /// Grow a kinetic body one tier.
    pub fn increase_body_scale(&mut self, id: BodyId) -> Option<ShiftOutcome> {
        self.shift_body(id, |body, settings, query| body.increase_scale(settings, query))
    }

    /// Shrink a kinetic body one tier.
    pub fn decrease_body_scale(&mut self, id: BodyId) -> Option<ShiftOutcome> {
        self.shift_body(id, |body, settings, query| body.decrease_scale(settings, query))
    }

    pub fn shift_body_to_normal(&mut self, id: BodyId) -> Option<ShiftOutcome> {
        self.shift_body(id, |body, settings, query| {
            Some(body.shift_to_normal(settings, query))
        })
    }

    fn shift_body(
        &mut self,
        id: BodyId,
        shift: impl FnOnce(&mut KineticBody, &KineticSettings, &dyn SpatialQuery) -> Option<ShiftOutcome>,
    ) -> Option<ShiftOutcome> {
        let body = self.bodies.get_mut(id)?;
        let outcome = shift(body, &self.config.kinetic, &self.scene)?;
        if let Some(collider) = body.collider() {
            sync_collider(
                &mut self.scene,
                collider,
                body.bounds(&self.config.kinetic),
                body.name(),
            );
        }
        match outcome.reenable_carving {
            Some(carving) => {
                self.scheduler.schedule(
                    Subject::Obstacle(id),
                    self.clock + f64::from(self.config.obstacle_reenable_delay),
                    Deferred::ReenableObstacle { carving },
                );
            }
            None => {
                self.scheduler.cancel(&Subject::Obstacle(id));
            }
        }
        Some(outcome)
    }

    /// Teleport a kinetic body (centre of its bounds).
    pub fn move_body(&mut self, id: BodyId, position: Vec3) -> bool {
        let Some(body) = self.bodies.get_mut(id) else {
            return false;
        };
        body.set_position(position);
        if let Some(collider) = body.collider() {
            sync_collider(
                &mut self.scene,
                collider,
                body.bounds(&self.config.kinetic),
                body.name(),
            );
        }
        true
    }

    /// Change a body's mass at scale 1; plates notice on their next evaluation.
    pub fn set_body_base_mass(&mut self, id: BodyId, base_mass: f32) -> bool {
        let Some(body) = self.bodies.get_mut(id) else {
            return false;
        };
        body.set_base_mass(base_mass, &self.config.kinetic);
        true
    }

    /// Move the player (centre of its bounds). No-op once the player is removed.
    pub fn set_player_position(&mut self, position: Vec3) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        player.position = position;
        let bounds = player.bounds();
        sync_collider(&mut self.scene, player.collider, bounds, PLAYER_TAG);
    }

    /// Drop the player; sentries chasing it fall back to searching.
    pub fn remove_player(&mut self) -> Option<Player> {
        let player = self.player.take()?;
        self.scene.remove(player.collider);
        Some(player)
    }

    #[must_use]
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Seconds simulated so far.
    #[must_use]
    pub const fn clock(&self) -> f64 {
        self.clock
    }

    #[must_use]
    pub const fn outcome(&self) -> LevelOutcome {
        self.outcome
    }

    #[must_use]
    pub const fn vitals(&self) -> &PlayerVitals {
        &self.vitals
    }

    #[must_use]
    pub const fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    #[must_use]
    pub fn scene(&self) -> &CollisionScene {
        &self.scene
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn sentries(&self) -> &SentryMap {
        &self.sentries
    }

    #[must_use]
    pub fn plates(&self) -> &PlateMap {
        &self.plates
    }

    #[must_use]
    pub fn gates(&self) -> &GateMap {
        &self.gates
    }

    #[must_use]
    pub fn exits(&self) -> &ExitMap {
        &self.exits
    }

    #[must_use]
    pub fn bodies(&self) -> &BodyMap {
        &self.bodies
    }

    #[must_use]
    pub fn sentry_named(&self, name: &str) -> Option<SentryId> {
        self.sentries.iter().find(|(_, s)| s.name() == name).map(|(id, _)| id)
    }

    #[must_use]
    pub fn plate_named(&self, name: &str) -> Option<PlateId> {
        self.plates.iter().find(|(_, p)| p.name() == name).map(|(id, _)| id)
    }

    #[must_use]
    pub fn gate_named(&self, name: &str) -> Option<GateId> {
        self.gates.iter().find(|(_, g)| g.name() == name).map(|(id, _)| id)
    }

    #[must_use]
    pub fn exit_named(&self, name: &str) -> Option<ExitId> {
        self.exits.iter().find(|(_, e)| e.name() == name).map(|(id, _)| id)
    }

    #[must_use]
    pub fn body_named(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().find(|(_, b)| b.name() == name).map(|(id, _)| id)
    }

    /// Is an obstacle re-enable pending for `body`?
    #[must_use]
    pub fn obstacle_reenable_pending(&self, body: BodyId) -> bool {
        self.scheduler.is_pending(&Subject::Obstacle(body))
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

fn sync_collider(
    scene: &mut CollisionScene,
    collider: ColliderId,
    bounds: Result<Aabb, sentinel_index::IndexError>,
    owner: &str,
) {
    if let Err(err) = bounds.and_then(|bounds| scene.set_bounds(collider, bounds)) {
        warn!(owner, error = %err, "failed to sync collider");
    }
}

/// Assembles a [`Level`], wiring every entity into the collision scene and orchestrator.
#[derive(Debug)]
pub struct LevelBuilder {
    config: SentinelConfig,
    scene: CollisionScene,
    sentries: SentryMap,
    plates: PlateMap,
    gates: GateMap,
    exits: ExitMap,
    bodies: BodyMap,
    player: Option<Player>,
    orchestrator: Orchestrator,
}

impl LevelBuilder {
    /// Start a level with a validated configuration.
    pub fn new(config: SentinelConfig) -> Result<Self, LevelError> {
        config.validate()?;
        Ok(Self {
            config,
            scene: CollisionScene::new(),
            sentries: SentryMap::with_key(),
            plates: PlateMap::with_key(),
            gates: GateMap::with_key(),
            exits: ExitMap::with_key(),
            bodies: BodyMap::with_key(),
            player: None,
            orchestrator: Orchestrator::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Static occluding geometry.
    pub fn add_wall(&mut self, bounds: Aabb, tag: Option<String>) -> ColliderId {
        self.scene
            .insert(bounds, Some(tag.unwrap_or_else(|| WALL_TAG.to_owned())))
    }

    /// A door that opens upward by the configured distance.
    pub fn add_gate(
        &mut self,
        name: impl Into<String>,
        closed: Vec3,
        half_extents: Vec3,
    ) -> Result<GateId, LevelError> {
        let gate = GateActuator::new(
            name,
            closed,
            self.config.door_move_distance,
            self.config.door_speed,
            half_extents,
        );
        let collider = self.scene.insert(gate.bounds()?, Some(DOOR_TAG.to_owned()));
        Ok(self.gates.insert(gate.with_collider(collider)))
    }

    pub fn add_exit(&mut self, name: impl Into<String>, region: Aabb) -> ExitId {
        self.exits.insert(ExitPortal::new(name, region))
    }

    /// A plate using the configured mass threshold unless `required_mass` is given.
    pub fn add_plate(
        &mut self,
        name: impl Into<String>,
        volume: Aabb,
        required_mass: Option<f32>,
        ignore_mass_requirement: bool,
        target_gate: Option<GateId>,
    ) -> PlateId {
        let plate = PressurePlate::new(
            name,
            volume,
            required_mass.unwrap_or(self.config.plate_mass_threshold),
        )
        .with_mass_override(ignore_mass_requirement)
        .with_target_gate(target_gate);
        self.plates.insert(plate)
    }

    pub fn add_body(&mut self, body: KineticBody) -> Result<BodyId, LevelError> {
        let bounds = body.bounds(&self.config.kinetic)?;
        let collider = self.scene.insert(bounds, Some(KINETIC_TAG.to_owned()));
        Ok(self.bodies.insert(body.with_collider(collider)))
    }

    /// A sentry driven by a straight-line agent that cannot enter `blocked_zones`.
    pub fn add_sentry(
        &mut self,
        name: impl Into<String>,
        position: Vec3,
        yaw: f32,
        waypoints: Vec<Vec3>,
        profile: Option<SentryProfile>,
        blocked_zones: Vec<Aabb>,
    ) -> Result<SentryId, LevelError> {
        let nav = KinematicAgent::new(position).with_blocked_zones(blocked_zones);
        self.add_sentry_with_agent(name, profile, waypoints, Box::new(nav), yaw)
    }

    /// A sentry steered by a caller-supplied pathfinding agent.
    pub fn add_sentry_with_agent(
        &mut self,
        name: impl Into<String>,
        profile: Option<SentryProfile>,
        waypoints: Vec<Vec3>,
        nav: Box<dyn PathfindingAgent>,
        yaw: f32,
    ) -> Result<SentryId, LevelError> {
        let profile = profile.unwrap_or(self.config.sentry);
        profile.validate()?;
        let sentry = Sentry::new(name, profile, waypoints, nav, yaw);
        let collider = self.scene.insert(sentry.bounds()?, Some(SENTRY_TAG.to_owned()));
        let id = self.sentries.insert(sentry.with_collider(collider));
        self.orchestrator.register_agent(id);
        Ok(id)
    }

    /// Place the player, replacing any previous placement.
    pub fn set_player(&mut self, position: Vec3, half_extents: Vec3) -> Result<(), LevelError> {
        let bounds = Aabb::from_center(position, half_extents)?;
        if let Some(previous) = self.player.take() {
            self.scene.remove(previous.collider);
        }
        let collider = self.scene.insert(bounds, Some(PLAYER_TAG.to_owned()));
        self.player = Some(Player {
            position,
            half_extents,
            collider,
        });
        Ok(())
    }

    pub fn add_puzzle(&mut self, group: PuzzleGroup) {
        self.orchestrator.add_group(group);
    }

    pub fn build(self) -> Level {
        for plate in self.plates.values() {
            if let Some(gate) = plate.target_gate()
                && self.orchestrator.controls_gate(gate)
            {
                warn!(
                    plate = %plate.name(),
                    "plate door is driven by a puzzle group; the plate's own link is ignored"
                );
            }
        }
        let history_capacity = self.config.history_capacity;
        Level {
            vitals: PlayerVitals::new(self.config.player_lives),
            config: self.config,
            tick: Tick::zero(),
            clock: 0.0,
            scene: self.scene,
            sentries: self.sentries,
            plates: self.plates,
            gates: self.gates,
            exits: self.exits,
            bodies: self.bodies,
            player: self.player,
            orchestrator: self.orchestrator,
            scheduler: Scheduler::new(),
            outcome: LevelOutcome::InProgress,
            history: VecDeque::with_capacity(history_capacity),
        }
    }
}
