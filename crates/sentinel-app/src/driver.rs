//! Player movement sources for headless runs.

use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use sentinel_index::Aabb;
use std::f32::consts::PI;

/// Produces the player's position for each tick.
pub trait PlayerDriver {
    /// Position for the coming tick, or `None` to leave the player where it is.
    fn next_position(&mut self, current: Vec3, dt: f32) -> Option<Vec3>;

    /// Short label used in run reports.
    fn label(&self) -> &'static str;
}

/// Walks a fixed list of points at constant speed and stops on the last one.
#[derive(Debug, Clone)]
pub struct ScriptedPath {
    points: Vec<Vec3>,
    next: usize,
    speed: f32,
}

impl ScriptedPath {
    #[must_use]
    pub fn new(points: Vec<Vec3>, speed: f32) -> Self {
        Self {
            points,
            next: 0,
            speed: speed.max(0.0),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.next >= self.points.len()
    }
}

impl PlayerDriver for ScriptedPath {
    fn next_position(&mut self, current: Vec3, dt: f32) -> Option<Vec3> {
        let mut position = current;
        let mut budget = self.speed * dt;
        while let Some(&target) = self.points.get(self.next) {
            let offset = target - position;
            let distance = offset.length();
            if distance <= budget {
                position = target;
                budget -= distance;
                self.next += 1;
            } else {
                position += offset / distance * budget;
                break;
            }
        }
        (position != current).then_some(position)
    }

    fn label(&self) -> &'static str {
        "scripted"
    }
}

/// Wanders inside an arena, picking a fresh heading at a fixed interval.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    rng: SmallRng,
    arena: Aabb,
    speed: f32,
    turn_interval: f32,
    since_turn: f32,
    heading: f32,
}

impl RandomWalk {
    pub fn new(seed: u64, arena: Aabb, speed: f32, turn_interval: f32) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let heading = rng.random_range(-PI..PI);
        Self {
            rng,
            arena,
            speed: speed.max(0.0),
            turn_interval: turn_interval.max(f32::EPSILON),
            since_turn: 0.0,
            heading,
        }
    }
}

impl PlayerDriver for RandomWalk {
    fn next_position(&mut self, current: Vec3, dt: f32) -> Option<Vec3> {
        self.since_turn += dt;
        if self.since_turn >= self.turn_interval {
            self.since_turn = 0.0;
            self.heading = self.rng.random_range(-PI..PI);
        }
        let step = Vec3::new(self.heading.cos(), 0.0, self.heading.sin()) * self.speed * dt;
        let min = self.arena.min;
        let max = self.arena.max;
        let mut next = current + step;
        next.x = next.x.clamp(min.x, max.x);
        next.z = next.z.clamp(min.z, max.z);
        if next.x <= min.x || next.x >= max.x || next.z <= min.z || next.z >= max.z {
            // Bounce off the arena edge on the next tick.
            self.heading = reflect(self.heading);
        }
        Some(next)
    }

    fn label(&self) -> &'static str {
        "random_walk"
    }
}

fn reflect(heading: f32) -> f32 {
    let turned = heading + PI;
    if turned > PI { turned - 2.0 * PI } else { turned }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_path_visits_points_in_order_and_stops() {
        let mut driver =
            ScriptedPath::new(vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 1.0)], 1.0);
        let mut position = Vec3::ZERO;
        let mut visited = Vec::new();
        while let Some(next) = driver.next_position(position, 0.25) {
            position = next;
            visited.push(position);
        }
        assert!(driver.is_finished());
        assert!(position.abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-5));
        assert!(visited.iter().any(|p| p.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5)));
        assert_eq!(visited.len(), 8);
    }

    #[test]
    fn random_walk_is_seeded_and_stays_in_arena() {
        let arena =
            Aabb::new(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 1.0, 2.0)).expect("arena");
        let mut a = RandomWalk::new(7, arena, 3.0, 0.5);
        let mut b = RandomWalk::new(7, arena, 3.0, 0.5);
        let (mut pa, mut pb) = (Vec3::ZERO, Vec3::ZERO);
        for _ in 0..500 {
            pa = a.next_position(pa, 1.0 / 60.0).expect("walk always moves");
            pb = b.next_position(pb, 1.0 / 60.0).expect("walk always moves");
            assert_eq!(pa, pb);
            assert!((-2.0..=2.0).contains(&pa.x) && (-2.0..=2.0).contains(&pa.z));
        }
    }
}
