//! Sentry behaviour state machine.
//!
//! [`transition`] is a pure function from the current [`Behavior`] and a
//! per-tick [`Perception`] to the next behaviour plus the [`Directive`]s the
//! caller must apply to the sentry's pathfinding agent. Nothing here touches
//! a live agent, so every rule can be exercised without a running level.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::SentryProfile;
use crate::nav::PathStatus;

/// Behaviour state with its countdown, where the state has one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BotState {
    Patrol,
    Chase,
    Search { remaining: f32 },
    Confused { remaining: f32 },
}

impl BotState {
    #[must_use]
    pub const fn kind(&self) -> BotStateKind {
        match self {
            Self::Patrol => BotStateKind::Patrol,
            Self::Chase => BotStateKind::Chase,
            Self::Search { .. } => BotStateKind::Search,
            Self::Confused { .. } => BotStateKind::Confused,
        }
    }

    #[must_use]
    pub const fn is_confused(&self) -> bool {
        matches!(self, Self::Confused { .. })
    }
}

/// Discriminant of [`BotState`] without its timers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BotStateKind {
    Patrol,
    Chase,
    Search,
    Confused,
}

impl BotStateKind {
    pub const ALL: [BotStateKind; 4] = [Self::Patrol, Self::Chase, Self::Search, Self::Confused];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Patrol => 0,
            Self::Chase => 1,
            Self::Search => 2,
            Self::Confused => 3,
        }
    }
}

impl fmt::Display for BotStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Patrol => "patrol",
            Self::Chase => "chase",
            Self::Search => "search",
            Self::Confused => "confused",
        };
        f.write_str(label)
    }
}

/// Navigation fields sampled from the pathfinding agent before the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavReport {
    pub path_pending: bool,
    pub remaining_distance: f32,
    pub has_path: bool,
    pub path_status: PathStatus,
}

impl NavReport {
    /// Path resolved and remaining distance under the stopping threshold.
    #[must_use]
    pub fn arrived(&self, stopping_distance: f32) -> bool {
        !self.path_pending && self.remaining_distance < stopping_distance
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.has_path && self.path_status == PathStatus::Partial
    }
}

impl Default for NavReport {
    fn default() -> Self {
        Self {
            path_pending: false,
            remaining_distance: 0.0,
            has_path: false,
            path_status: PathStatus::Complete,
        }
    }
}

/// Everything the state machine reads during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perception {
    pub dt: f32,
    pub nav: NavReport,
    /// Target position while the target reference is valid.
    pub target: Option<Vec3>,
    /// Sensor verdict when the sight check ran this tick; `None` between checks.
    pub sighting: Option<bool>,
}

/// Speeds, thresholds and countdown lengths used by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorTuning {
    pub patrol_speed: f32,
    pub chase_speed: f32,
    pub stopping_distance: f32,
    pub search_duration: f32,
    pub confusion_duration: f32,
}

impl From<&SentryProfile> for BehaviorTuning {
    fn from(profile: &SentryProfile) -> Self {
        Self {
            patrol_speed: profile.patrol_speed,
            chase_speed: profile.chase_speed,
            stopping_distance: profile.stopping_distance,
            search_duration: profile.search_duration,
            confusion_duration: profile.confusion_duration,
        }
    }
}

/// Side effect requested from the sentry driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Directive {
    /// Clear the agent's stopped flag.
    Resume,
    /// Set the agent's stopped flag.
    Halt,
    SetSpeed(f32),
    SetDestination(Vec3),
    /// Route to the next patrol waypoint and advance the route cursor.
    NextWaypoint,
    /// Ask the orchestrator to confuse every other sentry.
    Alert,
}

pub type Directives = SmallVec<[Directive; 6]>;

/// State plus the last position the target was seen at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Behavior {
    pub state: BotState,
    pub last_seen: Vec3,
}

/// Result of a state machine step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub behavior: Behavior,
    pub directives: Directives,
}

impl Behavior {
    /// Initial patrol behaviour together with its entry directives.
    #[must_use]
    pub fn enter(spawn: Vec3, tuning: &BehaviorTuning) -> Transition {
        let mut machine = Machine::new(
            Self {
                state: BotState::Patrol,
                last_seen: spawn,
            },
            tuning,
        );
        machine.directives.push(Directive::SetSpeed(tuning.patrol_speed));
        machine.go_to_next_point();
        machine.finish()
    }

    /// External alert: enter `Confused` without broadcasting.
    ///
    /// Returns `None` when already confused.
    #[must_use]
    pub fn force_confuse(self, tuning: &BehaviorTuning) -> Option<Self> {
        if self.state.is_confused() {
            return None;
        }
        Some(Self {
            state: BotState::Confused {
                remaining: tuning.confusion_duration,
            },
            ..self
        })
    }
}

/// Advance the behaviour by one tick.
#[must_use]
pub fn transition(behavior: Behavior, input: &Perception, tuning: &BehaviorTuning) -> Transition {
    let mut machine = Machine::new(behavior, tuning);

    match machine.behavior.state {
        BotState::Patrol => machine.patrol(input),
        BotState::Chase => machine.chase(input),
        BotState::Search { remaining } => machine.search(input, remaining),
        BotState::Confused { remaining } => machine.confused(input, remaining),
    }

    if machine.behavior.state == BotState::Patrol && input.nav.is_partial() {
        machine.trigger_confusion();
    }

    if let (Some(visible), Some(target)) = (input.sighting, input.target)
        && !machine.behavior.state.is_confused()
    {
        if visible {
            machine.behavior.last_seen = target;
            machine.start_chase();
        } else if machine.behavior.state == BotState::Chase {
            machine.start_search();
        }
    }

    machine.finish()
}

struct Machine<'a> {
    behavior: Behavior,
    directives: Directives,
    tuning: &'a BehaviorTuning,
}

impl<'a> Machine<'a> {
    fn new(behavior: Behavior, tuning: &'a BehaviorTuning) -> Self {
        Self {
            behavior,
            directives: Directives::new(),
            tuning,
        }
    }

    fn finish(self) -> Transition {
        Transition {
            behavior: self.behavior,
            directives: self.directives,
        }
    }

    fn patrol(&mut self, input: &Perception) {
        self.directives.push(Directive::Resume);
        self.directives
            .push(Directive::SetSpeed(self.tuning.patrol_speed));
        if input.nav.arrived(self.tuning.stopping_distance) {
            self.go_to_next_point();
        }
    }

    fn chase(&mut self, input: &Perception) {
        let Some(target) = input.target else {
            self.start_search();
            return;
        };
        self.directives.push(Directive::Resume);
        self.directives
            .push(Directive::SetSpeed(self.tuning.chase_speed));
        self.directives.push(Directive::SetDestination(target));
        self.behavior.last_seen = target;
    }

    fn search(&mut self, input: &Perception, remaining: f32) {
        self.directives.push(Directive::Resume);
        self.directives
            .push(Directive::SetSpeed(self.tuning.patrol_speed));

        if input.nav.arrived(self.tuning.stopping_distance) {
            let remaining = remaining - input.dt;
            if remaining <= 0.0 {
                self.behavior.state = BotState::Patrol;
                self.go_to_next_point();
            } else {
                self.behavior.state = BotState::Search { remaining };
            }
        } else {
            self.directives
                .push(Directive::SetDestination(self.behavior.last_seen));
        }
    }

    fn confused(&mut self, input: &Perception, remaining: f32) {
        self.directives.push(Directive::Halt);
        let remaining = remaining - input.dt;
        if remaining <= 0.0 {
            self.behavior.state = BotState::Patrol;
            self.directives.push(Directive::Resume);
            self.go_to_next_point();
        } else {
            self.behavior.state = BotState::Confused { remaining };
        }
    }

    fn go_to_next_point(&mut self) {
        if self.behavior.state == BotState::Patrol {
            self.directives.push(Directive::NextWaypoint);
        }
    }

    fn start_chase(&mut self) {
        if self.behavior.state == BotState::Chase {
            return;
        }
        self.behavior.state = BotState::Chase;
    }

    fn start_search(&mut self) {
        if matches!(self.behavior.state, BotState::Search { .. }) {
            return;
        }
        self.behavior.state = BotState::Search {
            remaining: self.tuning.search_duration,
        };
        self.directives
            .push(Directive::SetDestination(self.behavior.last_seen));
    }

    fn trigger_confusion(&mut self) {
        if self.behavior.state.is_confused() {
            return;
        }
        self.behavior.state = BotState::Confused {
            remaining: self.tuning.confusion_duration,
        };
        self.directives.push(Directive::Alert);
    }
}
