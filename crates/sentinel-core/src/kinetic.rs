//! Bodies the player can grow and shrink between three scale tiers.
//!
//! A shift changes size, mass and friction, then re-seats the body on the
//! highest surface beneath it. The body's navigation obstacle is switched off
//! for the shift; turning it back on is a delayed effect the caller schedules
//! from [`ShiftOutcome::reenable_carving`].

use glam::Vec3;
use sentinel_index::{Aabb, ColliderId, IndexError, Ray, SpatialQuery};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::KineticSettings;
use crate::plate::{BodyLayer, OverlapBody};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaleTier {
    Small,
    #[default]
    Base,
    Large,
}

impl ScaleTier {
    #[must_use]
    pub const fn scale(self, settings: &KineticSettings) -> f32 {
        match self {
            Self::Small => settings.small_scale,
            Self::Base => settings.base_scale,
            Self::Large => settings.large_scale,
        }
    }

    #[must_use]
    pub const fn mass_multiplier(self, settings: &KineticSettings) -> f32 {
        match self {
            Self::Small => settings.small_mass_multiplier,
            Self::Base => 1.0,
            Self::Large => settings.large_mass_multiplier,
        }
    }

    #[must_use]
    pub const fn larger(self) -> Option<Self> {
        match self {
            Self::Small => Some(Self::Base),
            Self::Base => Some(Self::Large),
            Self::Large => None,
        }
    }

    #[must_use]
    pub const fn smaller(self) -> Option<Self> {
        match self {
            Self::Small => None,
            Self::Base => Some(Self::Small),
            Self::Large => Some(Self::Base),
        }
    }

    #[must_use]
    pub const fn friction(self) -> FrictionMaterial {
        match self {
            Self::Small => FrictionMaterial::Low,
            Self::Base => FrictionMaterial::Default,
            Self::Large => FrictionMaterial::High,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrictionMaterial {
    High,
    Low,
    #[default]
    Default,
}

/// Navigation obstacle attached to a body so sentries path around it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavObstacle {
    pub enabled: bool,
    /// Whether the obstacle cuts a hole in the walkable area.
    pub carving: bool,
}

impl Default for NavObstacle {
    fn default() -> Self {
        Self {
            enabled: true,
            carving: false,
        }
    }
}

/// How the body ended up after re-seating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    /// Resting on a surface with no residual overlap.
    Grounded { surface_y: f32 },
    /// A surface was found but no nudge cleared the overlap; left at best effort.
    Unresolved { surface_y: f32 },
    /// Nothing below; rests at half its height.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftOutcome {
    pub tier: ScaleTier,
    pub mass: f32,
    pub placement: Placement,
    /// Carving flag for the delayed obstacle re-enable; `None` when the body has no obstacle.
    pub reenable_carving: Option<bool>,
}

/// Rescalable rigid body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KineticBody {
    name: String,
    /// Centre of the body's bounds.
    position: Vec3,
    velocity: Vec3,
    /// Half extents at scale 1.
    unit_half_extents: Vec3,
    base_mass: f32,
    mass: f32,
    tier: ScaleTier,
    friction: FrictionMaterial,
    layer: BodyLayer,
    obstacle: Option<NavObstacle>,
    #[serde(skip)]
    collider: Option<ColliderId>,
}

impl KineticBody {
    /// A base-tier body centred on `position`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        position: Vec3,
        unit_half_extents: Vec3,
        base_mass: f32,
        layer: BodyLayer,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            velocity: Vec3::ZERO,
            unit_half_extents,
            base_mass,
            mass: base_mass,
            tier: ScaleTier::Base,
            friction: FrictionMaterial::Default,
            layer,
            obstacle: None,
            collider: None,
        }
    }

    #[must_use]
    pub fn with_obstacle(mut self, obstacle: NavObstacle) -> Self {
        self.obstacle = Some(obstacle);
        self
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

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    #[must_use]
    pub const fn mass(&self) -> f32 {
        self.mass
    }

    #[must_use]
    pub const fn base_mass(&self) -> f32 {
        self.base_mass
    }

    /// Change the mass at scale 1; the current tier's multiplier still applies.
    pub fn set_base_mass(&mut self, base_mass: f32, settings: &KineticSettings) {
        self.base_mass = base_mass;
        self.mass = base_mass * self.tier.mass_multiplier(settings);
    }

    #[must_use]
    pub const fn tier(&self) -> ScaleTier {
        self.tier
    }

    #[must_use]
    pub const fn friction(&self) -> FrictionMaterial {
        self.friction
    }

    #[must_use]
    pub const fn layer(&self) -> BodyLayer {
        self.layer
    }

    #[must_use]
    pub const fn obstacle(&self) -> Option<NavObstacle> {
        self.obstacle
    }

    #[must_use]
    pub const fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    #[must_use]
    pub fn half_extents(&self, settings: &KineticSettings) -> Vec3 {
        self.unit_half_extents * self.tier.scale(settings)
    }

    pub fn bounds(&self, settings: &KineticSettings) -> Result<Aabb, IndexError> {
        Aabb::from_center(self.position, self.half_extents(settings))
    }

    /// What a pressure plate sees of this body.
    #[must_use]
    pub const fn overlap_body(&self) -> OverlapBody {
        OverlapBody {
            layer: self.layer,
            mass: Some(self.mass),
        }
    }

    /// Step one tier up; `None` when already large.
    pub fn increase_scale(
        &mut self,
        settings: &KineticSettings,
        query: &dyn SpatialQuery,
    ) -> Option<ShiftOutcome> {
        let tier = self.tier.larger()?;
        Some(self.perform_scale_shift(tier, settings, query))
    }

    /// Step one tier down; `None` when already small.
    pub fn decrease_scale(
        &mut self,
        settings: &KineticSettings,
        query: &dyn SpatialQuery,
    ) -> Option<ShiftOutcome> {
        let tier = self.tier.smaller()?;
        Some(self.perform_scale_shift(tier, settings, query))
    }

    pub fn shift_to_normal(
        &mut self,
        settings: &KineticSettings,
        query: &dyn SpatialQuery,
    ) -> ShiftOutcome {
        self.perform_scale_shift(ScaleTier::Base, settings, query)
    }

    /// Resize to `tier` and re-seat on the surface below.
    ///
    /// `query` must not yet reflect the new size; the body's own collider is
    /// skipped by every probe.
    pub fn perform_scale_shift(
        &mut self,
        tier: ScaleTier,
        settings: &KineticSettings,
        query: &dyn SpatialQuery,
    ) -> ShiftOutcome {
        if let Some(obstacle) = self.obstacle.as_mut() {
            obstacle.enabled = false;
        }

        self.tier = tier;
        self.mass = self.base_mass * tier.mass_multiplier(settings);
        self.friction = tier.friction();

        let placement = self.snap_to_surface_below(settings, query);
        self.velocity = Vec3::ZERO;

        debug!(body = %self.name, ?tier, mass = self.mass, ?placement, "kinetic body rescaled");
        ShiftOutcome {
            tier,
            mass: self.mass,
            placement,
            reenable_carving: self.obstacle.map(|_| tier == ScaleTier::Large),
        }
    }

    /// Delayed half of a shift: switch the obstacle back on.
    pub fn reenable_obstacle(&mut self, carving: bool) {
        if let Some(obstacle) = self.obstacle.as_mut() {
            obstacle.enabled = true;
            obstacle.carving = carving;
        }
    }

    fn snap_to_surface_below(
        &mut self,
        settings: &KineticSettings,
        query: &dyn SpatialQuery,
    ) -> Placement {
        let half = self.half_extents(settings);
        let own = self.collider;
        let not_self = move |id: ColliderId| Some(id) != own;

        let samples = settings.snap_samples_per_axis.max(1);
        let lerp_at = |index: u32| {
            if samples == 1 {
                0.5
            } else {
                index as f32 / (samples - 1) as f32
            }
        };
        let min = self.position - half;
        let max = self.position + half;

        let mut best: Option<f32> = None;
        for xi in 0..samples {
            let x = min.x + (max.x - min.x) * lerp_at(xi);
            for zi in 0..samples {
                let z = min.z + (max.z - min.z) * lerp_at(zi);
                let start = Vec3::new(x, self.position.y + settings.snap_ray_start_above, z);
                let ray = Ray::new(start, Vec3::NEG_Y);
                if let Some(hit) = query.cast_ray(&ray, settings.snap_max_ray_distance, &not_self)
                    && best.is_none_or(|y| hit.point.y > y)
                {
                    best = Some(hit.point.y);
                }
            }
        }

        let Some(surface_y) = best else {
            self.position.y = half.y;
            return Placement::Fallback;
        };

        self.position.y = surface_y + half.y;
        if !self.is_overlapping(half, settings, query) {
            return Placement::Grounded { surface_y };
        }
        for direction in [Vec3::Y, Vec3::NEG_Y] {
            for _ in 0..settings.max_nudges {
                self.position += direction * settings.nudge_step;
                if !self.is_overlapping(half, settings, query) {
                    return Placement::Grounded { surface_y };
                }
            }
        }

        warn!(
            body = %self.name,
            position = ?self.position,
            "could not resolve overlap after rescaling; leaving body at best-effort position"
        );
        Placement::Unresolved { surface_y }
    }

    fn is_overlapping(&self, half: Vec3, settings: &KineticSettings, query: &dyn SpatialQuery) -> bool {
        let own = self.collider;
        query
            .overlapping(self.position, half * settings.overlap_tolerance)
            .iter()
            .any(|id| Some(*id) != own)
    }
}
