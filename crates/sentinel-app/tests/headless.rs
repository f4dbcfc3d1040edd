use sentinel_app::{DriverChoice, RunOptions, Scenario, demo_scenario, run};
use sentinel_core::LevelOutcome;

#[test]
fn scripted_demo_reaches_the_exit() {
    let report = run(&demo_scenario(), &RunOptions::default()).expect("demo run");

    assert_eq!(report.outcome, LevelOutcome::Victory);
    assert_eq!(report.lives, 3);
    assert_eq!(report.hits, 0);
    assert!(report.ticks < RunOptions::default().max_ticks);
    assert!(report.plates.iter().all(|plate| plate.active));
    assert!(report.gates.iter().all(|gate| gate.open));
    assert!(report.sentries.iter().all(|sentry| sentry.halted));
    assert!(report.alerts >= 1, "the stray's blocked waypoint should raise an alert");

    let summary = report.final_summary.expect("summary");
    assert_eq!(summary.outcome, LevelOutcome::Victory);
    assert_eq!(summary.unlocked_exits, 1);
}

#[test]
fn random_walk_runs_are_reproducible() {
    let scenario = demo_scenario();
    let options = RunOptions {
        max_ticks: 600,
        driver: DriverChoice::RandomWalk { seed: 42 },
    };
    let first = run(&scenario, &options).expect("first run");
    let second = run(&scenario, &options).expect("second run");
    assert_eq!(first, second);
    assert_eq!(first.driver, "random_walk");
}

#[test]
fn scenario_round_trips_through_json() {
    let scenario = demo_scenario();
    let json = serde_json::to_string(&scenario).expect("serialize");
    let parsed = Scenario::from_json(&json).expect("parse");
    assert_eq!(parsed, scenario);

    let options = RunOptions {
        max_ticks: 120,
        ..RunOptions::default()
    };
    assert_eq!(
        run(&parsed, &options).expect("parsed run"),
        run(&scenario, &options).expect("direct run")
    );
}

#[test]
fn without_actions_the_exit_stays_locked() {
    let mut scenario = demo_scenario();
    scenario.actions.clear();
    let report = run(&scenario, &RunOptions::default()).expect("run");

    assert_eq!(report.outcome, LevelOutcome::InProgress);
    assert_eq!(report.ticks, RunOptions::default().max_ticks);
    assert!(report.plates.iter().all(|plate| !plate.active));
    assert!(report.sentries.iter().all(|sentry| !sentry.halted));
}
