use std::process::Command;

#[test]
fn demo_run_prints_a_victory_report() {
    let bin = env!("CARGO_BIN_EXE_sentinel-app");
    let output = Command::new(bin)
        .env_remove("SENTINEL_SCENARIO")
        .env("SENTINEL_TICKS", "3600")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run sentinel-app binary");
    assert!(output.status.success(), "demo run failed");

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON report");
    assert_eq!(report["outcome"], "victory");
    assert_eq!(report["level"], "demo-facility");
}

#[test]
fn missing_scenario_file_fails() {
    let bin = env!("CARGO_BIN_EXE_sentinel-app");
    let status = Command::new(bin)
        .args(["--scenario", "/nonexistent/sentinel-scenario.json"])
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run sentinel-app binary");
    assert!(!status.success());
}
