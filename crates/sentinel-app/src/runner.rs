//! Headless scenario runner: drives a level to completion and reports on it.

use glam::Vec3;
use sentinel_core::{
    BodyId, BotStateKind, Level, LevelError, LevelLayout, LevelOutcome, TickSummary,
};
use sentinel_index::Aabb;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::driver::{PlayerDriver, RandomWalk, ScriptedPath};

fn default_player_speed() -> f32 {
    4.0
}

/// Something the runner does to the level before a given tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Grow { body: String },
    Shrink { body: String },
    Normalize { body: String },
    MoveBody { body: String, position: Vec3 },
    SetBaseMass { body: String, base_mass: f32 },
    RemovePlayer,
}

impl Action {
    fn body(&self) -> Option<&str> {
        match self {
            Self::Grow { body }
            | Self::Shrink { body }
            | Self::Normalize { body }
            | Self::MoveBody { body, .. }
            | Self::SetBaseMass { body, .. } => Some(body),
            Self::RemovePlayer => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedAction {
    /// Applied once the level has processed this many ticks.
    pub at_tick: u64,
    #[serde(flatten)]
    pub action: Action,
}

/// A level plus the player's scripted behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub layout: LevelLayout,
    /// Points the scripted driver walks through, in order.
    #[serde(default)]
    pub player_path: Vec<Vec3>,
    #[serde(default = "default_player_speed")]
    pub player_speed: f32,
    #[serde(default)]
    pub actions: Vec<TimedAction>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, RunnerError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// How the player moves during a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverChoice {
    Scripted,
    RandomWalk { seed: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub max_ticks: u64,
    pub driver: DriverChoice,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_ticks: 3_600,
            driver: DriverChoice::Scripted,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("scenario is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("action at tick {tick} names unknown body `{body}`")]
    UnknownBody { tick: u64, body: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SentryReport {
    pub name: String,
    pub state: BotStateKind,
    pub active: bool,
    pub halted: bool,
    pub position: Vec3,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlateReport {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GateReport {
    pub name: String,
    pub open: bool,
    pub height: f32,
}

/// Summary of a finished (or timed out) run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunReport {
    pub level: String,
    pub driver: &'static str,
    pub ticks: u64,
    pub clock: f64,
    pub outcome: LevelOutcome,
    pub lives: u32,
    pub transitions: usize,
    pub alerts: usize,
    pub alerted: usize,
    pub hits: usize,
    pub plate_changes: usize,
    pub puzzle_commands: usize,
    pub final_summary: Option<TickSummary>,
    pub sentries: Vec<SentryReport>,
    pub plates: Vec<PlateReport>,
    pub gates: Vec<GateReport>,
}

#[derive(Debug, Default)]
struct Tally {
    transitions: usize,
    alerts: usize,
    alerted: usize,
    hits: usize,
    plate_changes: usize,
    puzzle_commands: usize,
}

/// Build the scenario's level and step it until it ends or `max_ticks` pass.
pub fn run(scenario: &Scenario, options: &RunOptions) -> Result<RunReport, RunnerError> {
    let mut level = scenario.layout.build()?;
    let bodies = resolve_bodies(&level, scenario)?;

    let mut driver: Box<dyn PlayerDriver> = match options.driver {
        DriverChoice::Scripted => Box::new(ScriptedPath::new(
            scenario.player_path.clone(),
            scenario.player_speed,
        )),
        DriverChoice::RandomWalk { seed } => Box::new(RandomWalk::new(
            seed,
            walk_arena(&scenario.layout)?,
            scenario.player_speed,
            1.5,
        )),
    };

    let mut actions: Vec<&TimedAction> = scenario.actions.iter().collect();
    actions.sort_by_key(|timed| timed.at_tick);
    let mut pending = actions.into_iter().peekable();

    info!(
        level = %scenario.layout.name,
        driver = driver.label(),
        max_ticks = options.max_ticks,
        "starting run"
    );

    let mut tally = Tally::default();
    let dt = level.config().tick_seconds;
    while level.tick().0 < options.max_ticks && !level.outcome().is_finished() {
        while let Some(timed) = pending.next_if(|timed| timed.at_tick <= level.tick().0) {
            apply(&mut level, &bodies, timed);
        }
        if let Some(player) = level.player()
            && let Some(next) = driver.next_position(player.position(), dt)
        {
            level.set_player_position(next);
        }

        let events = level.step();
        tally.transitions += events.transitions.len();
        tally.alerts += events.alerts.len();
        tally.alerted += events.alerted.len();
        tally.hits += events.hits.len();
        tally.plate_changes += events.plate_changes.len();
        tally.puzzle_commands += events.puzzle_commands.len();
        if let Some(outcome) = events.outcome {
            info!(tick = events.tick.0, ?outcome, "level finished");
        }
    }

    if !level.outcome().is_finished() {
        warn!(ticks = level.tick().0, "run hit the tick limit");
    }
    Ok(report(&level, &scenario.layout.name, driver.label(), &tally))
}

fn resolve_bodies(
    level: &Level,
    scenario: &Scenario,
) -> Result<HashMap<String, BodyId>, RunnerError> {
    let mut bodies = HashMap::new();
    for timed in &scenario.actions {
        let Some(name) = timed.action.body() else {
            continue;
        };
        let id = level
            .body_named(name)
            .ok_or_else(|| RunnerError::UnknownBody {
                tick: timed.at_tick,
                body: name.to_owned(),
            })?;
        bodies.insert(name.to_owned(), id);
    }
    Ok(bodies)
}

fn apply(level: &mut Level, bodies: &HashMap<String, BodyId>, timed: &TimedAction) {
    let body = timed.action.body().and_then(|name| bodies.get(name).copied());
    match (&timed.action, body) {
        (Action::Grow { .. }, Some(id)) => {
            let outcome = level.increase_body_scale(id);
            debug!(tick = timed.at_tick, ?outcome, "grow");
        }
        (Action::Shrink { .. }, Some(id)) => {
            let outcome = level.decrease_body_scale(id);
            debug!(tick = timed.at_tick, ?outcome, "shrink");
        }
        (Action::Normalize { .. }, Some(id)) => {
            let outcome = level.shift_body_to_normal(id);
            debug!(tick = timed.at_tick, ?outcome, "normalize");
        }
        (Action::MoveBody { position, .. }, Some(id)) => {
            level.move_body(id, *position);
        }
        (Action::SetBaseMass { base_mass, .. }, Some(id)) => {
            level.set_body_base_mass(id, *base_mass);
        }
        (Action::RemovePlayer, _) => {
            level.remove_player();
        }
        (action, None) => {
            warn!(?action, "skipping action without a body");
        }
    }
}

/// Horizontal extent of everything in the layout, used to fence a random walk.
fn walk_arena(layout: &LevelLayout) -> Result<Aabb, RunnerError> {
    let corners = layout
        .walls
        .iter()
        .flat_map(|wall| [wall.min, wall.max])
        .chain(layout.player.iter().map(|player| player.position));
    let (min, max) = corners.fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), point| (min.min(point), max.max(point)),
    );
    let (min, max) = if min.is_finite() && max.is_finite() {
        (min, max)
    } else {
        (Vec3::splat(-10.0), Vec3::splat(10.0))
    };
    Aabb::new(min, max).map_err(|err| RunnerError::Level(err.into()))
}

fn report(level: &Level, name: &str, driver: &'static str, tally: &Tally) -> RunReport {
    let sentries = level
        .sentries()
        .values()
        .map(|sentry| SentryReport {
            name: sentry.name().to_owned(),
            state: sentry.state().kind(),
            active: sentry.is_active(),
            halted: sentry.is_halted(),
            position: sentry.position(),
        })
        .collect();
    let plates = level
        .plates()
        .values()
        .map(|plate| PlateReport {
            name: plate.name().to_owned(),
            active: plate.is_active(),
        })
        .collect();
    let gates = level
        .gates()
        .values()
        .map(|gate| GateReport {
            name: gate.name().to_owned(),
            open: gate.is_commanded_open(),
            height: gate.position().y - gate.closed_position().y,
        })
        .collect();

    RunReport {
        level: name.to_owned(),
        driver,
        ticks: level.tick().0,
        clock: level.clock(),
        outcome: level.outcome(),
        lives: level.vitals().lives(),
        transitions: tally.transitions,
        alerts: tally.alerts,
        alerted: tally.alerted,
        hits: tally.hits,
        plate_changes: tally.plate_changes,
        puzzle_commands: tally.puzzle_commands,
        final_summary: level.history().last().cloned(),
        sentries,
        plates,
        gates,
    }
}
