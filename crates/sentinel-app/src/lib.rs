//! Headless driver for Sentinel levels: scenario files, player drivers and run reports.

pub mod demo;
pub mod driver;
pub mod runner;

pub use demo::{demo_layout, demo_scenario};
pub use driver::{PlayerDriver, RandomWalk, ScriptedPath};
pub use runner::{
    Action, DriverChoice, GateReport, PlateReport, RunOptions, RunReport, RunnerError, Scenario,
    SentryReport, TimedAction, run,
};
