//! Serializable level description with entities wired together by name.
//!
//! Names are resolved once in [`LevelLayout::build`]. A name that matches
//! nothing is logged and treated as a missing reference: a plate without a
//! door, a puzzle group without that gate, or a group that can never solve
//! because one of its plates does not exist.

use glam::Vec3;
use sentinel_index::Aabb;
use serde::{Deserialize, Serialize};
use slotmap::Key;
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::warn;

use crate::kinetic::{KineticBody, NavObstacle};
use crate::level::{Level, LevelBuilder};
use crate::orchestrator::{GroupAction, PuzzleGroup};
use crate::plate::BodyLayer;
use crate::{ExitId, GateId, LevelError, PlateId, SentinelConfig, SentryProfile};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WallSpec {
    pub min: Vec3,
    pub max: Vec3,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateSpec {
    pub name: String,
    /// Centre of the door when closed.
    pub closed: Vec3,
    pub half_extents: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExitSpec {
    pub name: String,
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlateSpec {
    pub name: String,
    pub min: Vec3,
    pub max: Vec3,
    /// Falls back to `config.plate_mass_threshold`.
    #[serde(default)]
    pub required_mass: Option<f32>,
    #[serde(default)]
    pub ignore_mass_requirement: bool,
    /// Door this plate opens directly.
    #[serde(default)]
    pub target_gate: Option<String>,
}

fn default_body_half_extents() -> Vec3 {
    Vec3::splat(0.5)
}

fn default_body_mass() -> f32 {
    10.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodySpec {
    pub name: String,
    /// Centre of the body.
    pub position: Vec3,
    /// Half extents at scale 1.
    #[serde(default = "default_body_half_extents")]
    pub half_extents: Vec3,
    #[serde(default = "default_body_mass")]
    pub base_mass: f32,
    #[serde(default)]
    pub layer: BodyLayer,
    /// Carries a navigation obstacle.
    #[serde(default)]
    pub obstacle: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentrySpec {
    pub name: String,
    /// Feet position.
    pub position: Vec3,
    #[serde(default)]
    pub yaw: f32,
    pub waypoints: Vec<Vec3>,
    /// Overrides `config.sentry`.
    #[serde(default)]
    pub profile: Option<SentryProfile>,
    /// Regions the sentry can never path into.
    #[serde(default)]
    pub blocked_zones: Vec<WallSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PuzzleSpec {
    pub name: String,
    pub plates: Vec<String>,
    #[serde(default)]
    pub gates: Vec<String>,
    /// Makes the group terminal.
    #[serde(default)]
    pub exit: Option<String>,
}

fn default_player_half_extents() -> Vec3 {
    Vec3::new(0.3, 0.5, 0.3)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSpec {
    pub position: Vec3,
    #[serde(default = "default_player_half_extents")]
    pub half_extents: Vec3,
}

/// Complete level description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelLayout {
    pub name: String,
    pub config: SentinelConfig,
    pub walls: Vec<WallSpec>,
    pub gates: Vec<GateSpec>,
    pub exits: Vec<ExitSpec>,
    pub plates: Vec<PlateSpec>,
    pub bodies: Vec<BodySpec>,
    pub sentries: Vec<SentrySpec>,
    pub puzzles: Vec<PuzzleSpec>,
    pub player: Option<PlayerSpec>,
}

impl LevelLayout {
    /// Build the level, resolving every name reference.
    pub fn build(&self) -> Result<Level, LevelError> {
        let mut builder = LevelBuilder::new(self.config.clone())?;

        for wall in &self.walls {
            builder.add_wall(Aabb::new(wall.min, wall.max)?, wall.tag.clone());
        }

        let mut gates: HashMap<&str, GateId> = HashMap::new();
        for spec in &self.gates {
            let id = builder.add_gate(spec.name.clone(), spec.closed, spec.half_extents)?;
            remember(&mut gates, &spec.name, id, "gate");
        }

        let mut exits: HashMap<&str, ExitId> = HashMap::new();
        for spec in &self.exits {
            let id = builder.add_exit(spec.name.clone(), Aabb::new(spec.min, spec.max)?);
            remember(&mut exits, &spec.name, id, "exit");
        }

        let mut plates: HashMap<&str, PlateId> = HashMap::new();
        for spec in &self.plates {
            let target_gate = spec
                .target_gate
                .as_deref()
                .and_then(|name| resolve(&gates, name, "gate", &spec.name));
            let id = builder.add_plate(
                spec.name.clone(),
                Aabb::new(spec.min, spec.max)?,
                spec.required_mass,
                spec.ignore_mass_requirement,
                target_gate,
            );
            remember(&mut plates, &spec.name, id, "plate");
        }

        for spec in &self.bodies {
            let mut body = KineticBody::new(
                spec.name.clone(),
                spec.position,
                spec.half_extents,
                spec.base_mass,
                spec.layer,
            );
            if spec.obstacle {
                body = body.with_obstacle(NavObstacle::default());
            }
            builder.add_body(body)?;
        }

        for spec in &self.sentries {
            let blocked = spec
                .blocked_zones
                .iter()
                .map(|zone| Aabb::new(zone.min, zone.max))
                .collect::<Result<Vec<_>, _>>()?;
            builder.add_sentry(
                spec.name.clone(),
                spec.position,
                spec.yaw,
                spec.waypoints.clone(),
                spec.profile,
                blocked,
            )?;
        }

        for spec in &self.puzzles {
            // Unknown plates stay in the group as null ids so it can never solve.
            let group_plates = spec.plates.iter().map(|name| {
                resolve(&plates, name, "plate", &spec.name).unwrap_or_else(PlateId::null)
            });
            let action = GroupAction {
                gates: spec
                    .gates
                    .iter()
                    .filter_map(|name| resolve(&gates, name, "gate", &spec.name))
                    .collect::<SmallVec<_>>(),
                exit: spec
                    .exit
                    .as_deref()
                    .and_then(|name| resolve(&exits, name, "exit", &spec.name)),
            };
            builder.add_puzzle(PuzzleGroup::new(spec.name.clone(), group_plates, action));
        }

        if let Some(player) = &self.player {
            builder.set_player(player.position, player.half_extents)?;
        }

        Ok(builder.build())
    }
}

fn remember<'a, K: Copy>(names: &mut HashMap<&'a str, K>, name: &'a str, id: K, kind: &str) {
    if names.insert(name, id).is_some() {
        warn!(kind, name, "duplicate name; later definition wins for lookups");
    }
}

fn resolve<K: Copy>(names: &HashMap<&str, K>, name: &str, kind: &str, owner: &str) -> Option<K> {
    let found = names.get(name).copied();
    if found.is_none() {
        warn!(kind, name, owner, "unknown reference; treating as missing");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LevelLayout {
        LevelLayout {
            name: "test".into(),
            walls: vec![WallSpec {
                min: Vec3::new(-20.0, -1.0, -20.0),
                max: Vec3::new(20.0, 0.0, 20.0),
                tag: Some("Floor".into()),
            }],
            gates: vec![GateSpec {
                name: "door".into(),
                closed: Vec3::new(5.0, 1.0, 0.0),
                half_extents: Vec3::ONE,
            }],
            exits: vec![ExitSpec {
                name: "exit".into(),
                min: Vec3::new(10.0, 0.0, 10.0),
                max: Vec3::new(12.0, 2.0, 12.0),
            }],
            plates: vec![
                PlateSpec {
                    name: "a".into(),
                    min: Vec3::new(-1.0, 0.0, -1.0),
                    max: Vec3::new(1.0, 0.2, 1.0),
                    required_mass: None,
                    ignore_mass_requirement: false,
                    target_gate: Some("missing-door".into()),
                },
                PlateSpec {
                    name: "b".into(),
                    min: Vec3::new(3.0, 0.0, -1.0),
                    max: Vec3::new(4.0, 0.2, 1.0),
                    required_mass: Some(5.0),
                    ignore_mass_requirement: true,
                    target_gate: Some("door".into()),
                },
            ],
            bodies: vec![BodySpec {
                name: "crate".into(),
                position: Vec3::new(0.0, 0.5, 6.0),
                half_extents: Vec3::splat(0.5),
                base_mass: 10.0,
                layer: BodyLayer::Weighted,
                obstacle: true,
            }],
            sentries: vec![SentrySpec {
                name: "guard".into(),
                position: Vec3::new(-5.0, 0.0, -5.0),
                yaw: 0.0,
                waypoints: vec![Vec3::new(-5.0, 0.0, 5.0)],
                profile: None,
                blocked_zones: Vec::new(),
            }],
            puzzles: vec![
                PuzzleSpec {
                    name: "vault".into(),
                    plates: vec!["a".into(), "b".into()],
                    gates: vec!["door".into()],
                    exit: None,
                },
                PuzzleSpec {
                    name: "broken".into(),
                    plates: vec!["a".into(), "ghost".into()],
                    gates: Vec::new(),
                    exit: Some("exit".into()),
                },
            ],
            player: Some(PlayerSpec {
                position: Vec3::new(15.0, 0.5, -15.0),
                half_extents: default_player_half_extents(),
            }),
            ..LevelLayout::default()
        }
    }

    #[test]
    fn names_resolve_to_entities() {
        let level = layout().build().expect("level");
        let door = level.gate_named("door").expect("door");
        let a = level.plate_named("a").expect("a");
        let b = level.plate_named("b").expect("b");

        assert_eq!(level.plates()[a].target_gate(), None);
        assert_eq!(level.plates()[b].target_gate(), Some(door));
        assert!(level.plates()[b].ignores_mass_requirement());
        assert!((level.plates()[a].required_mass() - 80.0).abs() < f32::EPSILON);

        let groups = level.orchestrator().groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].plates(), &[a, b]);
        assert_eq!(groups[0].action().gates.as_slice(), &[door]);
        assert_eq!(groups[1].plates().len(), 2);
        assert!(groups[1].plates()[1].is_null());
        assert!(groups[1].action().is_terminal());
        assert_eq!(level.orchestrator().agents().len(), 1);
        assert!(level.player().is_some());
    }

    #[test]
    fn group_with_unknown_plate_never_solves() {
        let mut layout = layout();
        layout.bodies[0].position = Vec3::new(0.0, 0.5, 0.0);
        layout.bodies[0].base_mass = 100.0;
        let mut level = layout.build().expect("level");
        level.step();
        let a = level.plate_named("a").expect("a");
        assert!(level.plates()[a].is_active());
        let exit = level.exit_named("exit").expect("exit");
        assert!(!level.exits()[exit].is_unlocked());
        assert!(!level.orchestrator().groups()[1].is_solved());
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let mut layout = layout();
        layout.walls[0].min = Vec3::splat(30.0);
        assert!(matches!(layout.build(), Err(LevelError::Geometry(_))));
    }

    #[test]
    fn layout_json_uses_defaults() {
        let json = r#"{
            "name": "tiny",
            "bodies": [{ "name": "box", "position": [0.0, 0.5, 0.0] }],
            "sentries": [{ "name": "s", "position": [1.0, 0.0, 1.0], "waypoints": [] }]
        }"#;
        let layout: LevelLayout = serde_json::from_str(json).expect("parse");
        assert_eq!(layout.bodies[0].base_mass, 10.0);
        assert_eq!(layout.bodies[0].layer, BodyLayer::Default);
        assert_eq!(layout.config, SentinelConfig::default());

        let level = layout.build().expect("level");
        let sentry = level.sentry_named("s").expect("sentry");
        assert!(!level.sentries()[sentry].is_active());
    }

    #[test]
    fn huge_yaw_builds_and_steps() {
        let json = r#"{
            "sentries": [{
                "name": "spinner",
                "position": [0.0, 0.0, 0.0],
                "yaw": 1.0e9,
                "waypoints": [[0.0, 0.0, 5.0], [5.0, 0.0, 5.0]]
            }]
        }"#;
        let layout: LevelLayout = serde_json::from_str(json).expect("parse");
        let mut level = layout.build().expect("level");
        for _ in 0..30 {
            level.step();
        }
        let sentry = &level.sentries()[level.sentry_named("spinner").expect("sentry")];
        assert!(sentry.yaw().is_finite());
        assert!(sentry.yaw().abs() <= std::f32::consts::PI);
    }
}
