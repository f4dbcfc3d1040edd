//! Doors that ease toward a commanded position, and the level exit.

use glam::Vec3;
use sentinel_index::{Aabb, ColliderId};
use serde::{Deserialize, Serialize};

/// Door sliding between a closed position and one raised by a fixed distance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateActuator {
    name: String,
    closed: Vec3,
    open: Vec3,
    position: Vec3,
    commanded_open: bool,
    speed: f32,
    half_extents: Vec3,
    #[serde(skip)]
    collider: Option<ColliderId>,
}

impl GateActuator {
    /// A closed door at `closed` that opens `move_distance` upward.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        closed: Vec3,
        move_distance: f32,
        speed: f32,
        half_extents: Vec3,
    ) -> Self {
        Self {
            name: name.into(),
            closed,
            open: closed + Vec3::Y * move_distance,
            position: closed,
            commanded_open: false,
            speed,
            half_extents,
            collider: None,
        }
    }

    #[must_use]
    pub fn with_collider(mut self, collider: ColliderId) -> Self {
        self.collider = Some(collider);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    #[must_use]
    pub const fn closed_position(&self) -> Vec3 {
        self.closed
    }

    #[must_use]
    pub const fn open_position(&self) -> Vec3 {
        self.open
    }

    #[must_use]
    pub const fn is_commanded_open(&self) -> bool {
        self.commanded_open
    }

    #[must_use]
    pub const fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    /// Record the desired state; motion happens in [`tick`](Self::tick).
    pub fn set_commanded_state(&mut self, open: bool) {
        self.commanded_open = open;
    }

    #[must_use]
    pub fn target(&self) -> Vec3 {
        if self.commanded_open {
            self.open
        } else {
            self.closed
        }
    }

    /// Close the remaining gap by a `dt * speed` fraction.
    pub fn tick(&mut self, dt: f32) {
        let t = (dt * self.speed).clamp(0.0, 1.0);
        self.position = self.position.lerp(self.target(), t);
    }

    pub fn bounds(&self) -> Result<Aabb, sentinel_index::IndexError> {
        Aabb::from_center(self.position, self.half_extents)
    }
}

/// Trigger region that ends the level once unlocked and entered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitPortal {
    name: String,
    region: Aabb,
    unlocked: bool,
}

impl ExitPortal {
    #[must_use]
    pub fn new(name: impl Into<String>, region: Aabb) -> Self {
        Self {
            name: name.into(),
            region,
            unlocked: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn region(&self) -> &Aabb {
        &self.region
    }

    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn set_unlocked(&mut self, unlocked: bool) {
        self.unlocked = unlocked;
    }

    /// Unlocked and containing `point`.
    #[must_use]
    pub fn admits(&self, point: Vec3) -> bool {
        self.unlocked && self.region.contains_point(point)
    }
}
