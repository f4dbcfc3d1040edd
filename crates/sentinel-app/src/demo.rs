//! Built-in three-stage facility used when no scenario file is given.
//!
//! Stage one is a single plate wired straight to a door. Stage two is a vault
//! door that needs both of its plates loaded. Stage three is a bank of
//! override plates that unlocks the exit and stands every sentry down.

use glam::Vec3;
use sentinel_core::{
    BodyLayer, BodySpec, ExitSpec, GateSpec, LevelLayout, PlateSpec, PlayerSpec, PuzzleSpec,
    SentinelConfig, SentrySpec, WallSpec,
};

use crate::runner::{Action, Scenario, TimedAction};

const PLATE_HALF: f32 = 1.5;

fn plate(name: &str, x: f32, z: f32) -> PlateSpec {
    PlateSpec {
        name: name.to_owned(),
        min: Vec3::new(x - PLATE_HALF, -0.1, z - PLATE_HALF),
        max: Vec3::new(x + PLATE_HALF, 0.3, z + PLATE_HALF),
        required_mass: None,
        ignore_mass_requirement: false,
        target_gate: None,
    }
}

fn crate_body(name: &str, x: f32, z: f32, base_mass: f32) -> BodySpec {
    BodySpec {
        name: name.to_owned(),
        position: Vec3::new(x, 0.5, z),
        half_extents: Vec3::splat(0.5),
        base_mass,
        layer: BodyLayer::Weighted,
        obstacle: false,
    }
}

fn square_patrol(name: &str, min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> SentrySpec {
    SentrySpec {
        name: name.to_owned(),
        position: Vec3::new(min_x, 0.0, min_z),
        yaw: 0.0,
        waypoints: vec![
            Vec3::new(min_x, 0.0, max_z),
            Vec3::new(max_x, 0.0, max_z),
            Vec3::new(max_x, 0.0, min_z),
            Vec3::new(min_x, 0.0, min_z),
        ],
        profile: None,
        blocked_zones: Vec::new(),
    }
}

/// The demo facility layout.
#[must_use]
pub fn demo_layout() -> LevelLayout {
    let mut door_plate = plate("entry-plate", -10.0, -30.0);
    door_plate.target_gate = Some("entry-door".into());

    let mut override_plates: Vec<PlateSpec> = [
        ("override-a", -12.0),
        ("override-b", -6.0),
        ("override-c", 12.0),
    ]
    .into_iter()
    .map(|(name, x)| plate(name, x, 20.0))
    .collect();
    for spec in &mut override_plates {
        spec.ignore_mass_requirement = true;
    }

    let mut entry_crate = crate_body("entry-crate", -10.0, -30.0, 20.0);
    entry_crate.obstacle = true;

    let mut plates = vec![
        door_plate,
        plate("vault-west", -10.0, 0.0),
        plate("vault-east", 10.0, 0.0),
    ];
    plates.extend(override_plates);

    let stray = SentrySpec {
        name: "stray".into(),
        position: Vec3::new(25.0, 0.0, 15.0),
        yaw: 0.0,
        waypoints: vec![Vec3::new(25.0, 0.0, 10.0), Vec3::new(38.0, 0.0, 15.0)],
        profile: None,
        blocked_zones: vec![WallSpec {
            min: Vec3::new(36.0, -1.0, 12.0),
            max: Vec3::new(40.0, 3.0, 18.0),
            tag: None,
        }],
    };

    LevelLayout {
        name: "demo-facility".into(),
        config: SentinelConfig {
            rng_seed: Some(0x5E17_1E1),
            ..SentinelConfig::default()
        },
        walls: vec![WallSpec {
            min: Vec3::new(-40.0, -1.0, -40.0),
            max: Vec3::new(40.0, 0.0, 40.0),
            tag: Some("Floor".into()),
        }],
        gates: vec![
            GateSpec {
                name: "entry-door".into(),
                closed: Vec3::new(0.0, 1.5, -25.0),
                half_extents: Vec3::new(3.0, 1.5, 0.25),
            },
            GateSpec {
                name: "vault-door".into(),
                closed: Vec3::new(0.0, 1.5, 5.0),
                half_extents: Vec3::new(3.0, 1.5, 0.25),
            },
        ],
        exits: vec![ExitSpec {
            name: "exit".into(),
            min: Vec3::new(28.0, 0.0, 28.0),
            max: Vec3::new(32.0, 2.0, 32.0),
        }],
        plates,
        bodies: vec![
            entry_crate,
            crate_body("vault-crate-west", -10.0, 0.0, 20.0),
            crate_body("vault-crate-east", 10.0, 0.0, 20.0),
            crate_body("override-crate-a", -12.0, 15.0, 10.0),
            crate_body("override-crate-b", -6.0, 15.0, 10.0),
            crate_body("override-crate-c", 12.0, 15.0, 10.0),
        ],
        sentries: vec![
            square_patrol("warden", -30.0, -22.0, -15.0, -5.0),
            square_patrol("sentinel", 22.0, 30.0, -15.0, -5.0),
            stray,
        ],
        puzzles: vec![
            PuzzleSpec {
                name: "vault".into(),
                plates: vec!["vault-west".into(), "vault-east".into()],
                gates: vec!["vault-door".into()],
                exit: None,
            },
            PuzzleSpec {
                name: "override".into(),
                plates: vec![
                    "override-a".into(),
                    "override-b".into(),
                    "override-c".into(),
                ],
                gates: Vec::new(),
                exit: Some("exit".into()),
            },
        ],
        player: Some(PlayerSpec {
            position: Vec3::new(0.0, 0.5, -38.0),
            half_extents: Vec3::new(0.3, 0.5, 0.3),
        }),
    }
}

/// Demo layout plus a route and action script that solves every stage.
#[must_use]
pub fn demo_scenario() -> Scenario {
    let grow = |at_tick, body: &str| TimedAction {
        at_tick,
        action: Action::Grow { body: body.into() },
    };
    let place = |at_tick, body: &str, x: f32| TimedAction {
        at_tick,
        action: Action::MoveBody {
            body: body.into(),
            position: Vec3::new(x, 0.5, 20.0),
        },
    };

    Scenario {
        layout: demo_layout(),
        player_path: vec![
            Vec3::new(0.0, 0.5, -38.0),
            Vec3::new(0.0, 0.5, 30.0),
            Vec3::new(30.0, 0.5, 30.0),
        ],
        player_speed: 4.0,
        actions: vec![
            grow(30, "entry-crate"),
            grow(60, "vault-crate-west"),
            grow(61, "vault-crate-east"),
            place(120, "override-crate-a", -12.0),
            place(121, "override-crate-b", -6.0),
            place(122, "override-crate-c", 12.0),
        ],
    }
}
