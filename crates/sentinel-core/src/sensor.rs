//! Range, view-cone and line-of-sight checks used by sentries to spot the player.

use glam::Vec3;
use sentinel_index::{ColliderId, Ray, SpatialQuery};

use crate::{SentryProfile, angle_between_deg, forward_from_yaw};

/// Geometric parameters of a sentry's field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCone {
    /// Maximum sight distance; a target exactly at this distance is not visible.
    pub range: f32,
    /// Half of the full view angle, in degrees.
    pub half_angle_deg: f32,
    /// Yaw correction applied to the body's forward axis, in degrees.
    pub rotation_offset_deg: f32,
    /// Vertical lift of the ray origin above the eye.
    pub eye_lift: f32,
}

impl From<&SentryProfile> for ViewCone {
    fn from(profile: &SentryProfile) -> Self {
        Self {
            range: profile.view_range,
            half_angle_deg: profile.view_angle_deg * 0.5,
            rotation_offset_deg: profile.view_rotation_offset_deg,
            eye_lift: profile.eye_lift,
        }
    }
}

impl ViewCone {
    /// Forward axis after the rotation offset correction.
    #[must_use]
    pub fn corrected_forward(&self, yaw: f32) -> Vec3 {
        forward_from_yaw(yaw + self.rotation_offset_deg.to_radians())
    }

    /// Whether `target` is in range, inside the cone and the first thing the sight ray hits.
    pub fn can_see(
        &self,
        pose: &ObserverPose,
        target: &SightTarget<'_>,
        query: &dyn SpatialQuery,
    ) -> bool {
        let to_target = target.position - pose.eye;
        let distance = to_target.length();
        if distance >= self.range {
            return false;
        }
        if distance <= f32::EPSILON {
            return true;
        }

        let forward = self.corrected_forward(pose.yaw);
        if angle_between_deg(forward, to_target) > self.half_angle_deg {
            return false;
        }

        let ray = Ray::new(pose.eye + Vec3::Y * self.eye_lift, to_target);
        let own = pose.collider;
        let not_self = move |id: ColliderId| Some(id) != own;
        let Some(hit) = query.cast_ray(&ray, self.range, &not_self) else {
            return false;
        };
        if Some(hit.collider) == target.collider {
            return true;
        }
        target
            .tag
            .is_some_and(|tag| query.tag(hit.collider) == Some(tag))
    }
}

/// Where the observer's eye is and which way its body faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverPose {
    pub eye: Vec3,
    pub yaw: f32,
    /// The observer's own collider, skipped by the sight ray.
    pub collider: Option<ColliderId>,
}

/// Thing being looked for, matched by collider identity or tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SightTarget<'a> {
    pub position: Vec3,
    pub collider: Option<ColliderId>,
    pub tag: Option<&'a str>,
}

/// View cone evaluated on a fixed interval rather than every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilitySensor {
    cone: ViewCone,
    interval: f32,
    elapsed: f32,
    last_result: bool,
}

impl VisibilitySensor {
    #[must_use]
    pub fn new(cone: ViewCone, interval: f32) -> Self {
        Self {
            cone,
            interval,
            elapsed: 0.0,
            last_result: false,
        }
    }

    #[must_use]
    pub fn cone(&self) -> &ViewCone {
        &self.cone
    }

    /// Accumulate `dt`; returns `true` when an evaluation is due and restarts the interval.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed >= self.interval {
            self.elapsed = 0.0;
            true
        } else {
            false
        }
    }

    /// Run the check now and remember the verdict.
    pub fn evaluate(
        &mut self,
        pose: &ObserverPose,
        target: &SightTarget<'_>,
        query: &dyn SpatialQuery,
    ) -> bool {
        self.last_result = self.cone.can_see(pose, target, query);
        self.last_result
    }

    /// Verdict of the most recent evaluation; unchanged between checks.
    #[must_use]
    pub fn last_result(&self) -> bool {
        self.last_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PLAYER_TAG;
    use sentinel_index::{Aabb, CollisionScene};

    fn cone() -> ViewCone {
        ViewCone {
            range: 10.0,
            half_angle_deg: 45.0,
            rotation_offset_deg: 0.0,
            eye_lift: 0.0,
        }
    }

    fn player_scene(at: Vec3) -> (CollisionScene, ColliderId) {
        let mut scene = CollisionScene::new();
        let id = scene.insert(
            Aabb::from_center(at, Vec3::splat(0.5)).expect("player"),
            Some(PLAYER_TAG.to_string()),
        );
        (scene, id)
    }

    fn pose() -> ObserverPose {
        ObserverPose {
            eye: Vec3::ZERO,
            yaw: 0.0,
            collider: None,
        }
    }

    #[test]
    fn visible_when_in_range_cone_and_unobstructed() {
        let at = Vec3::new(0.0, 0.0, 5.0);
        let (scene, id) = player_scene(at);
        let target = SightTarget {
            position: at,
            collider: Some(id),
            tag: None,
        };
        assert!(cone().can_see(&pose(), &target, &scene));
    }

    #[test]
    fn range_boundary_is_exclusive() {
        for (distance, expected) in [(9.9_f32, true), (10.0, false), (14.0, false)] {
            let at = Vec3::new(0.0, 0.0, distance);
            let (scene, id) = player_scene(at);
            let target = SightTarget {
                position: at,
                collider: Some(id),
                tag: None,
            };
            assert_eq!(
                cone().can_see(&pose(), &target, &scene),
                expected,
                "distance {distance}"
            );
        }
    }

    #[test]
    fn outside_cone_is_not_visible() {
        let at = Vec3::new(5.0, 0.0, 1.0);
        let (scene, id) = player_scene(at);
        let target = SightTarget {
            position: at,
            collider: Some(id),
            tag: None,
        };
        assert!(!cone().can_see(&pose(), &target, &scene));

        let turned = ViewCone {
            rotation_offset_deg: 90.0,
            ..cone()
        };
        assert!(turned.can_see(&pose(), &target, &scene));
    }

    #[test]
    fn wall_between_blocks_sight() {
        let at = Vec3::new(0.0, 0.0, 8.0);
        let (mut scene, id) = player_scene(at);
        scene.insert(
            Aabb::new(Vec3::new(-2.0, -2.0, 3.0), Vec3::new(2.0, 2.0, 3.5)).expect("wall"),
            Some("Wall".into()),
        );
        let target = SightTarget {
            position: at,
            collider: Some(id),
            tag: Some(PLAYER_TAG),
        };
        assert!(!cone().can_see(&pose(), &target, &scene));
    }

    #[test]
    fn tag_match_counts_as_target() {
        let at = Vec3::new(0.0, 0.0, 5.0);
        let (scene, _) = player_scene(at);
        let target = SightTarget {
            position: at,
            collider: None,
            tag: Some(PLAYER_TAG),
        };
        assert!(cone().can_see(&pose(), &target, &scene));

        let untagged = SightTarget { tag: None, ..target };
        assert!(!cone().can_see(&pose(), &untagged, &scene));
    }

    #[test]
    fn observer_collider_is_ignored() {
        let at = Vec3::new(0.0, 0.0, 5.0);
        let (mut scene, id) = player_scene(at);
        let own = scene.insert(
            Aabb::new(Vec3::new(-0.5, -0.5, 0.5), Vec3::new(0.5, 0.5, 1.0)).expect("body"),
            None,
        );
        let target = SightTarget {
            position: at,
            collider: Some(id),
            tag: None,
        };
        assert!(!cone().can_see(&pose(), &target, &scene));
        let own_pose = ObserverPose {
            collider: Some(own),
            ..pose()
        };
        assert!(cone().can_see(&own_pose, &target, &scene));
    }

    #[test]
    fn sensor_runs_on_interval() {
        let mut sensor = VisibilitySensor::new(cone(), 0.5);
        assert!(!sensor.tick(0.25));
        assert!(sensor.tick(0.25));
        assert!(!sensor.tick(0.25));
        assert!(sensor.tick(0.25));
    }
}
