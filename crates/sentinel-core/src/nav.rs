//! Pathfinding agent interface consumed by sentries, plus a straight-line stand-in.

use glam::Vec3;
use sentinel_index::{Aabb, Ray};
use serde::{Deserialize, Serialize};

use crate::behavior::NavReport;

/// Outcome of the most recent path request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PathStatus {
    /// The full path to the destination exists.
    #[default]
    Complete,
    /// Only part of the way is walkable; the path ends short of the destination.
    Partial,
    /// No path could be built.
    Invalid,
}

/// Mobile entity that can be steered toward a destination by an external navigation system.
pub trait PathfindingAgent: Send {
    fn position(&self) -> Vec3;

    fn velocity(&self) -> Vec3;

    /// Request a path toward `point`.
    fn set_destination(&mut self, point: Vec3);

    /// Suspend or resume movement without discarding the path.
    fn set_stopped(&mut self, stopped: bool);

    fn is_stopped(&self) -> bool;

    fn set_speed(&mut self, speed: f32);

    fn speed(&self) -> f32;

    /// Distance left along the current path.
    fn remaining_distance(&self) -> f32;

    /// Whether a requested path is still being computed.
    fn path_pending(&self) -> bool;

    fn has_path(&self) -> bool;

    fn path_status(&self) -> PathStatus;

    /// Move along the current path for `dt` seconds.
    fn advance(&mut self, dt: f32);

    /// Snapshot of the fields the behaviour state machine reads.
    fn report(&self) -> NavReport {
        NavReport {
            path_pending: self.path_pending(),
            remaining_distance: self.remaining_distance(),
            has_path: self.has_path(),
            path_status: self.path_status(),
        }
    }
}

/// Straight-line mover with optional unwalkable zones.
///
/// Destinations inside a blocked zone produce a partial path that ends where
/// the straight segment first enters the zone.
#[derive(Debug, Clone)]
pub struct KinematicAgent {
    position: Vec3,
    velocity: Vec3,
    speed: f32,
    stopped: bool,
    path_end: Option<Vec3>,
    status: PathStatus,
    blocked: Vec<Aabb>,
}

impl KinematicAgent {
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            speed: 0.0,
            stopped: false,
            path_end: None,
            status: PathStatus::Complete,
            blocked: Vec::new(),
        }
    }

    /// Mark zones the agent can never reach.
    #[must_use]
    pub fn with_blocked_zones(mut self, zones: Vec<Aabb>) -> Self {
        self.blocked = zones;
        self
    }

    /// End point of the current path, if any.
    #[must_use]
    pub fn path_end(&self) -> Option<Vec3> {
        self.path_end
    }

    /// Teleport the agent, dropping its path.
    pub fn warp(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.path_end = None;
    }

    fn plan(&self, point: Vec3) -> (Option<Vec3>, PathStatus) {
        if self.blocked.iter().any(|zone| zone.contains_point(self.position)) {
            return (None, PathStatus::Invalid);
        }
        let Some(zone) = self.blocked.iter().find(|zone| zone.contains_point(point)) else {
            return (Some(point), PathStatus::Complete);
        };
        let to_point = point - self.position;
        let ray = Ray::new(self.position, to_point);
        match zone.ray_intersection(&ray, to_point.length()) {
            Some((distance, _)) => (Some(ray.at(distance)), PathStatus::Partial),
            None => (Some(self.position), PathStatus::Partial),
        }
    }
}

impl PathfindingAgent for KinematicAgent {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_destination(&mut self, point: Vec3) {
        let (end, status) = self.plan(point);
        self.path_end = end;
        self.status = status;
    }

    fn set_stopped(&mut self, stopped: bool) {
        self.stopped = stopped;
        if stopped {
            self.velocity = Vec3::ZERO;
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    fn speed(&self) -> f32 {
        self.speed
    }

    fn remaining_distance(&self) -> f32 {
        self.path_end
            .map_or(0.0, |end| end.distance(self.position))
    }

    fn path_pending(&self) -> bool {
        false
    }

    fn has_path(&self) -> bool {
        self.path_end.is_some()
    }

    fn path_status(&self) -> PathStatus {
        self.status
    }

    fn advance(&mut self, dt: f32) {
        let Some(end) = self.path_end else {
            self.velocity = Vec3::ZERO;
            return;
        };
        if self.stopped || dt <= 0.0 {
            self.velocity = Vec3::ZERO;
            return;
        }
        let to_end = end - self.position;
        let distance = to_end.length();
        let step = self.speed * dt;
        if distance <= step {
            self.position = end;
            self.velocity = Vec3::ZERO;
        } else {
            let direction = to_end / distance;
            self.position += direction * step;
            self.velocity = direction * self.speed;
        }
    }
}
