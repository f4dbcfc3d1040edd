//! Mass-sensitive pressure plates and the overlap tracking that drives them.

use sentinel_index::Aabb;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::{BodyId, GateId};

/// Interaction layer of a body; only weighted bodies can load a plate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyLayer {
    Weighted,
    #[default]
    Default,
}

/// The parts of an overlapping body a plate cares about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OverlapBody {
    pub layer: BodyLayer,
    /// `None` for bodies without a rigid body; those never qualify.
    pub mass: Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPhase {
    Begin,
    Stay,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapEvent {
    pub body: BodyId,
    pub phase: OverlapPhase,
    /// Body state this tick, or the last state seen for `End`.
    pub snapshot: OverlapBody,
}

/// Remembers which bodies were inside a volume last tick.
#[derive(Debug, Clone, Default)]
pub struct OverlapTracker {
    inside: SmallVec<[(BodyId, OverlapBody); 4]>,
}

impl OverlapTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the bodies overlapping now with last tick's set.
    ///
    /// Emits `End` events first, then `Begin`, then `Stay`.
    pub fn diff(&mut self, present: &[(BodyId, OverlapBody)]) -> SmallVec<[OverlapEvent; 4]> {
        let mut events = SmallVec::new();
        for &(body, snapshot) in &self.inside {
            if !present.iter().any(|(id, _)| *id == body) {
                events.push(OverlapEvent {
                    body,
                    phase: OverlapPhase::End,
                    snapshot,
                });
            }
        }
        let mut stays = SmallVec::<[OverlapEvent; 4]>::new();
        for &(body, snapshot) in present {
            let phase = if self.contains(body) {
                OverlapPhase::Stay
            } else {
                OverlapPhase::Begin
            };
            let event = OverlapEvent {
                body,
                phase,
                snapshot,
            };
            match phase {
                OverlapPhase::Begin => events.push(event),
                _ => stays.push(event),
            }
        }
        events.extend(stays);
        self.inside = present.iter().copied().collect();
        events
    }

    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.inside.iter().any(|(id, _)| *id == body)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inside.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }
}

/// Activation flip reported by a plate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlateChange {
    Activated,
    Deactivated,
}

impl PlateChange {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// Trigger volume that turns on while a heavy enough weighted body rests in it.
#[derive(Debug, Clone)]
pub struct PressurePlate {
    name: String,
    volume: Aabb,
    required_mass: f32,
    ignore_mass_requirement: bool,
    active: bool,
    target_gate: Option<GateId>,
    tracker: OverlapTracker,
}

impl PressurePlate {
    #[must_use]
    pub fn new(name: impl Into<String>, volume: Aabb, required_mass: f32) -> Self {
        Self {
            name: name.into(),
            volume,
            required_mass,
            ignore_mass_requirement: false,
            active: false,
            target_gate: None,
            tracker: OverlapTracker::new(),
        }
    }

    /// Accept any weighted body regardless of mass.
    #[must_use]
    pub fn with_mass_override(mut self, ignore: bool) -> Self {
        self.ignore_mass_requirement = ignore;
        self
    }

    /// Door this plate drives directly while active.
    #[must_use]
    pub fn with_target_gate(mut self, gate: Option<GateId>) -> Self {
        self.target_gate = gate;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn volume(&self) -> &Aabb {
        &self.volume
    }

    #[must_use]
    pub const fn required_mass(&self) -> f32 {
        self.required_mass
    }

    #[must_use]
    pub const fn ignores_mass_requirement(&self) -> bool {
        self.ignore_mass_requirement
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn target_gate(&self) -> Option<GateId> {
        self.target_gate
    }

    #[must_use]
    pub fn tracker(&self) -> &OverlapTracker {
        &self.tracker
    }

    /// Weighted body with a mass that meets the threshold (or any mass under override).
    #[must_use]
    pub fn qualifies(&self, body: &OverlapBody) -> bool {
        body.layer == BodyLayer::Weighted
            && body
                .mass
                .is_some_and(|mass| self.ignore_mass_requirement || mass >= self.required_mass)
    }

    /// Update overlap bookkeeping and return the events to feed through [`handle`](Self::handle).
    pub fn observe(&mut self, present: &[(BodyId, OverlapBody)]) -> SmallVec<[OverlapEvent; 4]> {
        self.tracker.diff(present)
    }

    pub fn handle(&mut self, event: &OverlapEvent) -> Option<PlateChange> {
        match event.phase {
            OverlapPhase::Begin => self.on_overlap_begin(&event.snapshot),
            OverlapPhase::Stay => self.on_overlap_stay(&event.snapshot),
            OverlapPhase::End => self.on_overlap_end(&event.snapshot),
        }
    }

    pub fn on_overlap_begin(&mut self, body: &OverlapBody) -> Option<PlateChange> {
        if self.qualifies(body) && !self.active {
            return Some(self.set_active(true));
        }
        None
    }

    /// Re-evaluated every tick while a weighted body stays inside.
    pub fn on_overlap_stay(&mut self, body: &OverlapBody) -> Option<PlateChange> {
        if body.layer != BodyLayer::Weighted {
            return None;
        }
        let qualifies = self.qualifies(body);
        if qualifies != self.active {
            return Some(self.set_active(qualifies));
        }
        None
    }

    /// A weighted body leaving an active plate always switches it off.
    pub fn on_overlap_end(&mut self, body: &OverlapBody) -> Option<PlateChange> {
        if self.active && body.layer == BodyLayer::Weighted {
            return Some(self.set_active(false));
        }
        None
    }

    fn set_active(&mut self, active: bool) -> PlateChange {
        self.active = active;
        debug!(plate = %self.name, active, "plate activation changed");
        if active {
            PlateChange::Activated
        } else {
            PlateChange::Deactivated
        }
    }
}
