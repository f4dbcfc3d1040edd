//! Per-sentry driver: feeds sensor and navigation state into the behaviour
//! machine and applies the resulting directives to the pathfinding agent.

use glam::Vec3;
use sentinel_index::{Aabb, ColliderId, SpatialQuery};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::behavior::{Behavior, BehaviorTuning, BotState, BotStateKind, Directive, Perception};
use crate::nav::PathfindingAgent;
use crate::sensor::{ObserverPose, SightTarget, ViewCone, VisibilitySensor};
use crate::{SentryProfile, transition, wrap_signed_angle, yaw_from_direction};

/// Problems with a patrol route definition.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum RouteError {
    #[error("patrol route has no waypoints")]
    Empty,
    #[error("patrol waypoint {index} is not finite")]
    NonFinite { index: usize },
}

/// Cyclic list of waypoints with a cursor pointing at the next one to visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatrolRoute {
    waypoints: Vec<Vec3>,
    next: usize,
}

impl PatrolRoute {
    pub fn new(waypoints: Vec<Vec3>) -> Result<Self, RouteError> {
        if waypoints.is_empty() {
            return Err(RouteError::Empty);
        }
        if let Some(index) = waypoints.iter().position(|point| !point.is_finite()) {
            return Err(RouteError::NonFinite { index });
        }
        Ok(Self { waypoints, next: 0 })
    }

    /// Return the waypoint under the cursor and move the cursor on, wrapping at the end.
    pub fn advance(&mut self) -> Vec3 {
        let point = self.waypoints[self.next];
        self.next = (self.next + 1) % self.waypoints.len();
        point
    }

    /// Index of the waypoint the next [`advance`](Self::advance) returns.
    #[must_use]
    pub const fn next_index(&self) -> usize {
        self.next
    }

    #[must_use]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Why a sentry switched itself off at level load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DisableReason {
    InvalidRoute(RouteError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SentryStatus {
    Active,
    /// Permanently inert; the rest of the level runs without it.
    Disabled(DisableReason),
}

/// What changed during [`Sentry::think`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentryUpdate {
    pub previous: BotStateKind,
    pub current: BotStateKind,
    /// The sentry confused itself and wants its peers alerted.
    pub alert: bool,
}

impl SentryUpdate {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// A patrolling sentry.
pub struct Sentry {
    name: String,
    profile: SentryProfile,
    tuning: BehaviorTuning,
    behavior: Behavior,
    route: Option<PatrolRoute>,
    nav: Box<dyn PathfindingAgent>,
    sensor: VisibilitySensor,
    yaw: f32,
    collider: Option<ColliderId>,
    status: SentryStatus,
    halted: bool,
}

impl fmt::Debug for Sentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sentry")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("behavior", &self.behavior)
            .field("position", &self.nav.position())
            .field("yaw", &self.yaw)
            .field("halted", &self.halted)
            .finish()
    }
}

impl Sentry {
    /// Build a sentry and issue its patrol entry directives.
    ///
    /// An unusable route does not fail construction: the sentry is returned
    /// disabled and never acts.
    pub fn new(
        name: impl Into<String>,
        profile: SentryProfile,
        waypoints: Vec<Vec3>,
        nav: Box<dyn PathfindingAgent>,
        yaw: f32,
    ) -> Self {
        let name = name.into();
        let tuning = BehaviorTuning::from(&profile);
        let spawn = nav.position();
        let entry = Behavior::enter(spawn, &tuning);
        let (route, status) = match PatrolRoute::new(waypoints) {
            Ok(route) => (Some(route), SentryStatus::Active),
            Err(err) => {
                warn!(sentry = %name, error = %err, "disabling sentry with unusable patrol route");
                (None, SentryStatus::Disabled(DisableReason::InvalidRoute(err)))
            }
        };

        let mut sentry = Self {
            name,
            profile,
            tuning,
            behavior: entry.behavior,
            route,
            nav,
            sensor: VisibilitySensor::new(ViewCone::from(&profile), profile.sight_interval),
            yaw: wrap_signed_angle(yaw),
            collider: None,
            status,
            halted: false,
        };
        if sentry.is_active() {
            sentry.apply(&entry.directives);
        }
        sentry
    }

    /// Attach the sentry's own collider so sight rays skip it.
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
    pub fn profile(&self) -> &SentryProfile {
        &self.profile
    }

    #[must_use]
    pub const fn status(&self) -> SentryStatus {
        self.status
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, SentryStatus::Active)
    }

    #[must_use]
    pub const fn state(&self) -> BotState {
        self.behavior.state
    }

    #[must_use]
    pub const fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    #[must_use]
    pub fn route(&self) -> Option<&PatrolRoute> {
        self.route.as_ref()
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.nav.position()
    }

    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.nav.velocity()
    }

    #[must_use]
    pub const fn yaw(&self) -> f32 {
        self.yaw
    }

    #[must_use]
    pub const fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    #[must_use]
    pub fn nav(&self) -> &dyn PathfindingAgent {
        self.nav.as_ref()
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Eye position and facing used for sight checks.
    #[must_use]
    pub fn pose(&self) -> ObserverPose {
        ObserverPose {
            eye: self.nav.position() + Vec3::Y * self.profile.eye_height,
            yaw: self.yaw,
            collider: self.collider,
        }
    }

    /// Collider bounds for the current position (feet at the agent position).
    pub fn bounds(&self) -> Result<Aabb, sentinel_index::IndexError> {
        let half = self.profile.half_extents;
        Aabb::from_center(self.nav.position() + Vec3::Y * half.y, half)
    }

    /// Run one behaviour step: sense if due, transition, apply directives.
    pub fn think(
        &mut self,
        dt: f32,
        target: Option<&SightTarget<'_>>,
        query: &dyn SpatialQuery,
    ) -> SentryUpdate {
        let previous = self.behavior.state.kind();
        if !self.is_active() {
            return SentryUpdate {
                previous,
                current: previous,
                alert: false,
            };
        }

        // The state machine drops the verdict if the sentry is still confused
        // after this tick's handler.
        let due = self.sensor.tick(dt);
        let sighting = match target {
            Some(target) if due => {
                let pose = self.pose();
                Some(self.sensor.evaluate(&pose, target, query))
            }
            _ => None,
        };

        let perception = Perception {
            dt,
            nav: self.nav.report(),
            target: target.map(|target| target.position),
            sighting,
        };
        let step = transition(self.behavior, &perception, &self.tuning);
        self.behavior = step.behavior;
        let alert = self.apply(&step.directives);

        let current = self.behavior.state.kind();
        if current != previous {
            debug!(sentry = %self.name, from = %previous, to = %current, "sentry state changed");
        }
        SentryUpdate {
            previous,
            current,
            alert,
        }
    }

    /// Move along the path and turn toward the direction of travel.
    pub fn advance(&mut self, dt: f32) {
        if !self.is_active() {
            return;
        }
        self.nav.advance(dt);
        self.update_orientation(dt);
    }

    /// Enter `Confused` because another sentry raised an alert. No-op when
    /// already confused or disabled; returns whether the state changed.
    pub fn force_confuse(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.behavior.force_confuse(&self.tuning) {
            Some(next) => {
                debug!(sentry = %self.name, from = %self.behavior.state.kind(), "sentry confused by alert");
                self.behavior = next;
                true
            }
            None => false,
        }
    }

    /// Freeze movement until [`release`](Self::release) regardless of behaviour.
    pub fn halt(&mut self) {
        self.halted = true;
        self.nav.set_stopped(true);
    }

    /// Lift a [`halt`](Self::halt).
    pub fn release(&mut self) {
        if !self.halted {
            return;
        }
        self.halted = false;
        self.nav
            .set_stopped(self.behavior.state.is_confused());
    }

    fn apply(&mut self, directives: &[Directive]) -> bool {
        let mut alert = false;
        for directive in directives {
            match *directive {
                Directive::Resume => self.nav.set_stopped(false),
                Directive::Halt => self.nav.set_stopped(true),
                Directive::SetSpeed(speed) => self.nav.set_speed(speed),
                Directive::SetDestination(point) => self.nav.set_destination(point),
                Directive::NextWaypoint => {
                    if let Some(route) = self.route.as_mut() {
                        let point = route.advance();
                        self.nav.set_destination(point);
                    }
                }
                Directive::Alert => alert = true,
            }
        }
        if self.halted {
            self.nav.set_stopped(true);
        }
        alert
    }

    fn update_orientation(&mut self, dt: f32) {
        let velocity = self.nav.velocity();
        if velocity.length_squared() <= self.profile.turn_speed_threshold_sq {
            return;
        }
        let desired = yaw_from_direction(velocity) + self.profile.rotation_offset_deg.to_radians();
        let t = (dt * self.profile.rotation_speed).clamp(0.0, 1.0);
        let delta = wrap_signed_angle(desired - self.yaw);
        self.yaw = wrap_signed_angle(self.yaw + delta * t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::KinematicAgent;
    use sentinel_index::CollisionScene;

    fn square_route() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
        ]
    }

    fn sentry(waypoints: Vec<Vec3>) -> Sentry {
        Sentry::new(
            "alpha",
            SentryProfile::default(),
            waypoints,
            Box::new(KinematicAgent::new(Vec3::ZERO)),
            0.0,
        )
    }

    #[test]
    fn route_cursor_wraps_forever() {
        let mut route = PatrolRoute::new(square_route()).expect("route");
        for lap in 0..5 {
            for index in 0..3 {
                assert_eq!(route.next_index(), index, "lap {lap}");
                assert_eq!(route.advance(), square_route()[index]);
                assert!(route.next_index() < route.len());
            }
        }

        let mut single = PatrolRoute::new(vec![Vec3::ONE]).expect("single");
        for _ in 0..4 {
            assert_eq!(single.advance(), Vec3::ONE);
            assert_eq!(single.next_index(), 0);
        }
    }

    #[test]
    fn invalid_routes_are_rejected() {
        assert_eq!(PatrolRoute::new(Vec::new()), Err(RouteError::Empty));
        assert_eq!(
            PatrolRoute::new(vec![Vec3::ZERO, Vec3::splat(f32::INFINITY)]),
            Err(RouteError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn empty_route_disables_sentry() {
        let mut bot = sentry(Vec::new());
        assert_eq!(
            bot.status(),
            SentryStatus::Disabled(DisableReason::InvalidRoute(RouteError::Empty))
        );
        let scene = CollisionScene::new();
        let update = bot.think(0.5, None, &scene);
        assert!(!update.changed());
        assert!(!bot.force_confuse());
        bot.advance(1.0);
        assert_eq!(bot.position(), Vec3::ZERO);
    }

    #[test]
    fn patrol_visits_waypoints_in_order() {
        let mut bot = sentry(square_route());
        let scene = CollisionScene::new();
        assert_eq!(bot.route().map(PatrolRoute::next_index), Some(1));

        let mut visited = Vec::new();
        for _ in 0..200 {
            let before = bot.route().map(PatrolRoute::next_index);
            bot.think(0.1, None, &scene);
            bot.advance(0.1);
            let after = bot.route().map(PatrolRoute::next_index);
            if before != after {
                visited.extend(after);
            }
        }
        assert!(visited.len() >= 3);
        for pair in visited.windows(2) {
            assert_eq!(pair[1], (pair[0] + 1) % 3);
        }
    }

    #[test]
    fn orientation_turns_toward_velocity() {
        let mut bot = Sentry::new(
            "beta",
            SentryProfile::default(),
            vec![Vec3::new(10.0, 0.0, 0.0)],
            Box::new(KinematicAgent::new(Vec3::ZERO)),
            1.0,
        );
        let scene = CollisionScene::new();
        for _ in 0..30 {
            bot.think(0.1, None, &scene);
            bot.advance(0.1);
        }
        // Moving along +X (yaw π/2) with a -90° correction settles at yaw 0.
        assert!(bot.yaw().abs() < 0.05, "yaw {}", bot.yaw());
    }

    #[test]
    fn halt_sticks_until_released() {
        let mut bot = sentry(square_route());
        let scene = CollisionScene::new();
        bot.halt();
        for _ in 0..5 {
            bot.think(0.1, None, &scene);
            bot.advance(0.1);
        }
        assert_eq!(bot.position(), Vec3::ZERO);
        assert!(bot.nav().is_stopped());

        bot.release();
        bot.think(0.1, None, &scene);
        bot.advance(0.1);
        assert!(bot.position().length() > 0.0);
    }

    #[test]
    fn sight_check_runs_on_the_tick_confusion_ends() {
        let profile = SentryProfile {
            view_angle_deg: 360.0,
            view_rotation_offset_deg: 0.0,
            sight_interval: 0.5,
            confusion_duration: 1.0,
            ..SentryProfile::default()
        };
        let mut bot = Sentry::new(
            "gamma",
            profile,
            vec![Vec3::new(0.0, 0.0, 10.0)],
            Box::new(KinematicAgent::new(Vec3::ZERO)),
            0.0,
        );
        let mut scene = CollisionScene::new();
        let player_at = Vec3::new(0.0, 0.5, 4.0);
        let player = scene.insert(
            Aabb::from_center(player_at, Vec3::splat(0.5)).expect("player"),
            Some(crate::PLAYER_TAG.to_owned()),
        );
        let target = SightTarget {
            position: player_at,
            collider: Some(player),
            tag: Some(crate::PLAYER_TAG),
        };

        assert!(bot.force_confuse());
        let update = bot.think(0.5, Some(&target), &scene);
        assert_eq!(update.current, BotStateKind::Confused);

        let update = bot.think(0.5, Some(&target), &scene);
        assert_eq!(update.previous, BotStateKind::Confused);
        assert_eq!(update.current, BotStateKind::Chase);
    }
}
