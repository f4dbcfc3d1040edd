//! Core simulation types for Sentinel levels: sentries, puzzle plates, gates and the level loop.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

pub mod behavior;
pub mod gate;
pub mod kinetic;
pub mod layout;
pub mod level;
pub mod nav;
pub mod orchestrator;
pub mod plate;
pub mod scheduler;
pub mod sensor;
pub mod sentry;
pub mod vitals;

pub use behavior::{
    Behavior, BehaviorTuning, BotState, BotStateKind, Directive, Directives, NavReport,
    Perception, Transition, transition,
};
pub use gate::{ExitPortal, GateActuator};
pub use kinetic::{FrictionMaterial, KineticBody, NavObstacle, Placement, ScaleTier, ShiftOutcome};
pub use layout::{
    BodySpec, ExitSpec, GateSpec, LevelLayout, PlateSpec, PlayerSpec, PuzzleSpec, SentrySpec,
    WallSpec,
};
pub use level::{Level, LevelBuilder, LevelOutcome, Player, StateChange, TickEvents, TickSummary};
pub use nav::{KinematicAgent, PathStatus, PathfindingAgent};
pub use orchestrator::{GroupAction, Orchestrator, PuzzleCommand, PuzzleCommands, PuzzleGroup};
pub use plate::{
    BodyLayer, OverlapBody, OverlapEvent, OverlapPhase, OverlapTracker, PlateChange,
    PressurePlate,
};
pub use scheduler::Scheduler;
pub use sensor::{ObserverPose, SightTarget, ViewCone, VisibilitySensor};
pub use sentry::{DisableReason, PatrolRoute, RouteError, Sentry, SentryStatus, SentryUpdate};
pub use vitals::{HitOutcome, PlayerVitals};

new_key_type! {
    /// Stable handle for sentries.
    pub struct SentryId;
    /// Stable handle for pressure plates.
    pub struct PlateId;
    /// Stable handle for gate actuators (doors).
    pub struct GateId;
    /// Stable handle for exit portals.
    pub struct ExitId;
    /// Stable handle for kinetic bodies that can load plates.
    pub struct BodyId;
}

pub type SentryMap = SlotMap<SentryId, Sentry>;
pub type PlateMap = SlotMap<PlateId, PressurePlate>;
pub type GateMap = SlotMap<GateId, GateActuator>;
pub type ExitMap = SlotMap<ExitId, ExitPortal>;
pub type BodyMap = SlotMap<BodyId, KineticBody>;

/// Tag carried by the player's collider; sight rays accept hits on it.
pub const PLAYER_TAG: &str = "Player";

const FULL_TURN: f32 = std::f32::consts::TAU;
const HALF_TURN: f32 = std::f32::consts::PI;

/// Wrap an angle in radians into (-π, π]. Non-finite input maps to 0.
#[must_use]
pub fn wrap_signed_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + HALF_TURN).rem_euclid(FULL_TURN) - HALF_TURN;
    if wrapped <= -HALF_TURN {
        HALF_TURN
    } else {
        wrapped.min(HALF_TURN)
    }
}

/// Horizontal unit vector for a yaw about +Y (yaw 0 faces +Z, yaw π/2 faces +X).
#[must_use]
pub fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Yaw of a direction's horizontal component.
#[must_use]
pub fn yaw_from_direction(direction: Vec3) -> f32 {
    direction.x.atan2(direction.z)
}

/// Unsigned angle between two vectors in degrees; zero-length input yields 0.
#[must_use]
pub fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    let (Some(a), Some(b)) = (a.try_normalize(), b.try_normalize()) else {
        return 0.0;
    };
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// High level simulation clock (ticks processed since the level was built).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors raised while assembling or validating a level.
#[derive(Debug, Error)]
pub enum LevelError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Geometry rejected by the collision scene.
    #[error("invalid geometry: {0}")]
    Geometry(#[from] sentinel_index::IndexError),
}

/// Perception and movement tuning for a single sentry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentryProfile {
    /// Maximum sight distance (exclusive).
    pub view_range: f32,
    /// Full width of the view cone in degrees.
    pub view_angle_deg: f32,
    /// Yaw added to the body's facing before the cone test.
    pub view_rotation_offset_deg: f32,
    /// Height of the eye above the agent's position.
    pub eye_height: f32,
    /// Extra lift applied to the sight ray origin.
    pub eye_lift: f32,
    /// Seconds between sight evaluations.
    pub sight_interval: f32,
    pub patrol_speed: f32,
    pub chase_speed: f32,
    /// Remaining path distance below which a destination counts as reached.
    pub stopping_distance: f32,
    /// Countdown spent at the last-seen position before resuming patrol.
    pub search_duration: f32,
    /// Countdown spent frozen after an alert.
    pub confusion_duration: f32,
    /// Facing interpolation rate (per second).
    pub rotation_speed: f32,
    /// Yaw added to the velocity heading when turning the body.
    pub rotation_offset_deg: f32,
    /// Squared speed above which the body turns toward its velocity.
    pub turn_speed_threshold_sq: f32,
    /// Collider half extents used for occlusion and player contact.
    pub half_extents: Vec3,
}

impl Default for SentryProfile {
    fn default() -> Self {
        Self {
            view_range: 12.0,
            view_angle_deg: 90.0,
            view_rotation_offset_deg: 90.0,
            eye_height: 1.0,
            eye_lift: 0.2,
            sight_interval: 0.5,
            patrol_speed: 2.5,
            chase_speed: 4.5,
            stopping_distance: 0.5,
            search_duration: 4.0,
            confusion_duration: 3.0,
            rotation_speed: 5.0,
            rotation_offset_deg: -90.0,
            turn_speed_threshold_sq: 0.1,
            half_extents: Vec3::new(0.4, 0.9, 0.4),
        }
    }
}

impl SentryProfile {
    fn validate(&self) -> Result<(), LevelError> {
        if !(self.view_range > 0.0) {
            return Err(LevelError::InvalidConfig("view_range must be positive"));
        }
        if !(0.0..=360.0).contains(&self.view_angle_deg) {
            return Err(LevelError::InvalidConfig(
                "view_angle_deg must be within [0, 360]",
            ));
        }
        if self.sight_interval < 0.0
            || self.patrol_speed < 0.0
            || self.chase_speed < 0.0
            || self.stopping_distance < 0.0
            || self.search_duration < 0.0
            || self.confusion_duration < 0.0
            || self.rotation_speed < 0.0
            || self.turn_speed_threshold_sq < 0.0
        {
            return Err(LevelError::InvalidConfig(
                "sentry speeds, durations and intervals must be non-negative",
            ));
        }
        if !self.rotation_offset_deg.is_finite() || !self.view_rotation_offset_deg.is_finite() {
            return Err(LevelError::InvalidConfig(
                "sentry rotation offsets must be finite",
            ));
        }
        if self.half_extents.cmplt(Vec3::ZERO).any() {
            return Err(LevelError::InvalidConfig(
                "sentry half_extents must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Scale tiers and placement tuning for kinetic bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KineticSettings {
    pub small_scale: f32,
    pub base_scale: f32,
    pub large_scale: f32,
    pub small_mass_multiplier: f32,
    pub large_mass_multiplier: f32,
    /// Downward rays cast per horizontal axis when snapping to a surface.
    pub snap_samples_per_axis: u32,
    /// Height above each sample point where the snap ray starts.
    pub snap_ray_start_above: f32,
    pub snap_max_ray_distance: f32,
    /// Vertical step used while resolving residual overlap.
    pub nudge_step: f32,
    /// Nudges tried in each direction before giving up.
    pub max_nudges: u32,
    /// Shrink factor applied to bounds before the overlap test.
    pub overlap_tolerance: f32,
}

impl Default for KineticSettings {
    fn default() -> Self {
        Self {
            small_scale: 0.2,
            base_scale: 1.0,
            large_scale: 3.0,
            small_mass_multiplier: 0.1,
            large_mass_multiplier: 5.0,
            snap_samples_per_axis: 3,
            snap_ray_start_above: 1.0,
            snap_max_ray_distance: 10.0,
            nudge_step: 0.02,
            max_nudges: 15,
            overlap_tolerance: 0.98,
        }
    }
}

/// Static configuration for a level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SentinelConfig {
    /// Fixed simulation step used by [`Level::step`], in seconds.
    pub tick_seconds: f32,
    /// Tuning applied to sentries without their own profile.
    pub sentry: SentryProfile,
    /// Default mass a plate requires before it activates.
    pub plate_mass_threshold: f32,
    /// Height a door rises when open.
    pub door_move_distance: f32,
    /// Door interpolation rate (per second).
    pub door_speed: f32,
    /// Delay before a resized body's navigation obstacle is re-enabled.
    pub obstacle_reenable_delay: f32,
    pub kinetic: KineticSettings,
    pub player_lives: u32,
    /// Seconds of invulnerability after each hit.
    pub invulnerability_duration: f32,
    /// Extra distance beyond collider contact at which a sentry hits the player.
    pub contact_margin: f32,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    /// Optional RNG seed for drivers that need randomness.
    pub rng_seed: Option<u64>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0 / 60.0,
            sentry: SentryProfile::default(),
            plate_mass_threshold: 80.0,
            door_move_distance: 2.5,
            door_speed: 5.0,
            obstacle_reenable_delay: 0.05,
            kinetic: KineticSettings::default(),
            player_lives: 3,
            invulnerability_duration: 3.0,
            contact_margin: 0.05,
            history_capacity: 256,
            rng_seed: None,
        }
    }
}

impl SentinelConfig {
    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), LevelError> {
        if !(self.tick_seconds > 0.0) || !self.tick_seconds.is_finite() {
            return Err(LevelError::InvalidConfig("tick_seconds must be positive"));
        }
        self.sentry.validate()?;
        if self.plate_mass_threshold < 0.0 {
            return Err(LevelError::InvalidConfig(
                "plate_mass_threshold must be non-negative",
            ));
        }
        if self.door_move_distance < 0.0 || self.door_speed < 0.0 {
            return Err(LevelError::InvalidConfig(
                "door distance and speed must be non-negative",
            ));
        }
        if self.obstacle_reenable_delay < 0.0 || self.invulnerability_duration < 0.0 {
            return Err(LevelError::InvalidConfig("delays must be non-negative"));
        }
        let kinetic = &self.kinetic;
        if !(kinetic.small_scale > 0.0
            && kinetic.small_scale < kinetic.base_scale
            && kinetic.base_scale < kinetic.large_scale)
        {
            return Err(LevelError::InvalidConfig(
                "kinetic scales must satisfy 0 < small < base < large",
            ));
        }
        if kinetic.small_mass_multiplier <= 0.0 || kinetic.large_mass_multiplier <= 0.0 {
            return Err(LevelError::InvalidConfig(
                "kinetic mass multipliers must be positive",
            ));
        }
        if kinetic.snap_samples_per_axis == 0
            || kinetic.nudge_step <= 0.0
            || kinetic.snap_max_ray_distance <= 0.0
            || !(kinetic.overlap_tolerance > 0.0 && kinetic.overlap_tolerance <= 1.0)
        {
            return Err(LevelError::InvalidConfig(
                "snap sampling, nudge step, ray distance and overlap tolerance must be positive",
            ));
        }
        if self.contact_margin < 0.0 {
            return Err(LevelError::InvalidConfig("contact_margin must be non-negative"));
        }
        if self.history_capacity == 0 {
            return Err(LevelError::InvalidConfig("history_capacity must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SentinelConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = SentinelConfig {
            tick_seconds: 0.0,
            ..SentinelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LevelError::InvalidConfig("tick_seconds must be positive"))
        ));

        let mut config = SentinelConfig::default();
        config.sentry.view_range = 0.0;
        assert!(matches!(
            config.validate(),
            Err(LevelError::InvalidConfig("view_range must be positive"))
        ));

        let mut config = SentinelConfig::default();
        config.kinetic.large_scale = 0.5;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.sentry.rotation_offset_deg = f32::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(LevelError::InvalidConfig("sentry rotation offsets must be finite"))
        ));
    }

    #[test]
    fn wrap_handles_huge_and_non_finite_angles() {
        for angle in [1.0e9_f32, -1.0e9, 3.4e38, -3.4e38, 1.0e20] {
            let wrapped = wrap_signed_angle(angle);
            assert!(wrapped > -HALF_TURN && wrapped <= HALF_TURN, "{angle} -> {wrapped}");
        }
        assert_eq!(wrap_signed_angle(f32::INFINITY), 0.0);
        assert_eq!(wrap_signed_angle(f32::NEG_INFINITY), 0.0);
        assert_eq!(wrap_signed_angle(-HALF_TURN), HALF_TURN);
        assert!((wrap_signed_angle(FULL_TURN + 0.5) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn yaw_helpers_agree() {
        for yaw in [-3.0_f32, -1.2, 0.0, 0.7, 2.9] {
            let recovered = yaw_from_direction(forward_from_yaw(yaw));
            assert!((wrap_signed_angle(recovered - yaw)).abs() < 1e-5);
        }
        assert!((wrap_signed_angle(3.0 * HALF_TURN) - HALF_TURN).abs() < 1e-5);
        assert_eq!(wrap_signed_angle(f32::NAN), 0.0);
    }

    #[test]
    fn angle_between_handles_degenerate_vectors() {
        assert!((angle_between_deg(Vec3::Z, Vec3::X) - 90.0).abs() < 1e-4);
        assert_eq!(angle_between_deg(Vec3::ZERO, Vec3::X), 0.0);
    }
}
