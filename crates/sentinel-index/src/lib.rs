//! Collision scene and ray/overlap query abstractions for level geometry.

use glam::Vec3;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

new_key_type! {
    /// Stable handle for colliders registered in a [`CollisionScene`].
    pub struct ColliderId;
}

/// Errors emitted by collision scene implementations.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    /// Indicates geometry that cannot be used (e.g., inverted or non-finite bounds).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The collider handle is not (or no longer) registered.
    #[error("unknown collider handle")]
    UnknownCollider,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Construct a box from its corners, rejecting inverted or non-finite input.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self, IndexError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(IndexError::InvalidConfig("bounds must be finite"));
        }
        if min.cmpgt(max).any() {
            return Err(IndexError::InvalidConfig("bounds min must not exceed max"));
        }
        Ok(Self { min, max })
    }

    /// Construct a box from a center point and half extents.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Result<Self, IndexError> {
        Self::new(center - half_extents, center + half_extents)
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Same box moved by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Inclusive point containment.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Strict overlap test; boxes that merely share a face do not intersect.
    #[must_use]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmplt(other.max).all() && self.max.cmpgt(other.min).all()
    }

    /// Slab test returning entry distance and surface normal.
    ///
    /// Rays starting inside the box report no hit, matching how physics
    /// engines treat casts that originate within a collider.
    #[must_use]
    pub fn ray_intersection(&self, ray: &Ray, max_distance: f32) -> Option<(f32, Vec3)> {
        let mut t_enter = 0.0_f32;
        let mut t_exit = max_distance;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = Vec3::ZERO;
                normal[axis] = -dir.signum();
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if normal == Vec3::ZERO {
            return None;
        }
        Some((t_enter, normal))
    }
}

/// Half-line used by ray casts. The direction is always unit length or zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalising `direction`.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at distance `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest hit reported by [`SpatialQuery::cast_ray`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub collider: ColliderId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Filter accepting every collider.
#[must_use]
pub fn accept_all(_collider: ColliderId) -> bool {
    true
}

/// Common behaviour exposed by collision query services.
pub trait SpatialQuery {
    /// Report the nearest collider along `ray` within `max_distance` that passes `filter`.
    fn cast_ray(
        &self,
        ray: &Ray,
        max_distance: f32,
        filter: &dyn Fn(ColliderId) -> bool,
    ) -> Option<RayHit>;

    /// Visit every collider overlapping the box described by `center` and `half_extents`.
    fn overlap_region(
        &self,
        center: Vec3,
        half_extents: Vec3,
        visitor: &mut dyn FnMut(ColliderId),
    );

    /// Tag attached to a collider, if any.
    fn tag(&self, collider: ColliderId) -> Option<&str>;

    /// Collect overlapping colliders into a small vector.
    fn overlapping(&self, center: Vec3, half_extents: Vec3) -> SmallVec<[ColliderId; 8]> {
        let mut found = SmallVec::new();
        self.overlap_region(center, half_extents, &mut |id| found.push(id));
        found
    }
}

/// A registered collider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collider {
    pub bounds: Aabb,
    pub tag: Option<String>,
}

/// Brute-force collision scene; levels hold tens of colliders, not thousands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollisionScene {
    colliders: SlotMap<ColliderId, Collider>,
}

impl CollisionScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collider, returning its handle.
    pub fn insert(&mut self, bounds: Aabb, tag: Option<String>) -> ColliderId {
        self.colliders.insert(Collider { bounds, tag })
    }

    /// Remove a collider, returning its last state.
    pub fn remove(&mut self, id: ColliderId) -> Option<Collider> {
        self.colliders.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(id)
    }

    /// Replace the bounds of an existing collider.
    pub fn set_bounds(&mut self, id: ColliderId, bounds: Aabb) -> Result<(), IndexError> {
        let collider = self
            .colliders
            .get_mut(id)
            .ok_or(IndexError::UnknownCollider)?;
        collider.bounds = bounds;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColliderId, &Collider)> + '_ {
        self.colliders.iter()
    }
}

impl SpatialQuery for CollisionScene {
    fn cast_ray(
        &self,
        ray: &Ray,
        max_distance: f32,
        filter: &dyn Fn(ColliderId) -> bool,
    ) -> Option<RayHit> {
        if ray.direction == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }
        self.colliders
            .iter()
            .filter(|(id, _)| filter(*id))
            .filter_map(|(id, collider)| {
                collider
                    .bounds
                    .ray_intersection(ray, max_distance)
                    .map(|(distance, normal)| RayHit {
                        collider: id,
                        point: ray.at(distance),
                        normal,
                        distance,
                    })
            })
            .min_by_key(|hit| OrderedFloat(hit.distance))
    }

    fn overlap_region(
        &self,
        center: Vec3,
        half_extents: Vec3,
        visitor: &mut dyn FnMut(ColliderId),
    ) {
        let half = half_extents.abs();
        let region = Aabb {
            min: center - half,
            max: center + half,
        };
        for (id, collider) in &self.colliders {
            if collider.bounds.intersects(&region) {
                visitor(id);
            }
        }
    }

    fn tag(&self, collider: ColliderId) -> Option<&str> {
        self.colliders.get(collider)?.tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center(center, Vec3::splat(half)).expect("valid cube")
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = Aabb::new(Vec3::ONE, Vec3::ZERO).unwrap_err();
        assert_eq!(
            err,
            IndexError::InvalidConfig("bounds min must not exceed max")
        );
        assert!(Aabb::new(Vec3::ZERO, Vec3::new(f32::NAN, 1.0, 1.0)).is_err());
    }

    #[test]
    fn ray_reports_nearest_collider() {
        let mut scene = CollisionScene::new();
        let far = scene.insert(cube(Vec3::new(0.0, 0.0, 10.0), 1.0), None);
        let near = scene.insert(cube(Vec3::new(0.0, 0.0, 5.0), 1.0), Some("Wall".into()));

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        let hit = scene.cast_ray(&ray, 20.0, &accept_all).expect("hit");
        assert_eq!(hit.collider, near);
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::NEG_Z);
        assert_eq!(scene.tag(hit.collider), Some("Wall"));

        let skip_near = |id: ColliderId| id != near;
        let hit = scene.cast_ray(&ray, 20.0, &skip_near).expect("hit");
        assert_eq!(hit.collider, far);
    }

    #[test]
    fn ray_respects_max_distance_and_ignores_enclosing_collider() {
        let mut scene = CollisionScene::new();
        scene.insert(cube(Vec3::ZERO, 1.0), None);
        scene.insert(cube(Vec3::new(0.0, 0.0, 6.0), 1.0), None);

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(scene.cast_ray(&ray, 4.0, &accept_all).is_none());
        let hit = scene.cast_ray(&ray, 10.0, &accept_all).expect("hit");
        assert!((hit.distance - 5.0).abs() < 1e-5);
    }

    #[test]
    fn overlap_excludes_face_contact() {
        let mut scene = CollisionScene::new();
        let floor = scene.insert(
            Aabb::new(Vec3::new(-5.0, -1.0, -5.0), Vec3::new(5.0, 0.0, 5.0)).expect("floor"),
            None,
        );

        let resting = scene.overlapping(Vec3::new(0.0, 0.5, 0.0), Vec3::splat(0.5));
        assert!(resting.is_empty());

        let sunk = scene.overlapping(Vec3::new(0.0, 0.4, 0.0), Vec3::splat(0.5));
        assert_eq!(sunk.as_slice(), &[floor]);
    }

    #[test]
    fn set_bounds_requires_known_handle() {
        let mut scene = CollisionScene::new();
        let id = scene.insert(cube(Vec3::ZERO, 1.0), None);
        scene.remove(id);
        assert_eq!(
            scene.set_bounds(id, cube(Vec3::ONE, 1.0)),
            Err(IndexError::UnknownCollider)
        );
    }
}
