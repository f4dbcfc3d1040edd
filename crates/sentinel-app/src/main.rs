use anyhow::{Context, Result};
use clap::Parser;
use sentinel_app::{DriverChoice, RunOptions, Scenario, demo_scenario, run};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "sentinel-app",
    version,
    about = "Run a Sentinel level headlessly and print a JSON report"
)]
struct Cli {
    /// Scenario JSON file; the built-in demo facility runs when omitted.
    #[arg(long, env = "SENTINEL_SCENARIO")]
    scenario: Option<PathBuf>,

    /// Stop after this many ticks even if the level has not ended.
    #[arg(long, env = "SENTINEL_TICKS", default_value_t = 3_600)]
    ticks: u64,

    /// Simulation rate in ticks per second; overrides the level's `tick_seconds`.
    #[arg(long, env = "SENTINEL_TICK_RATE")]
    tick_rate: Option<f32>,

    /// Let the player wander randomly instead of following the scenario path.
    #[arg(long)]
    random_walk: bool,

    /// Seed for the random walk; falls back to the level's `rng_seed`.
    #[arg(long, env = "SENTINEL_SEED")]
    seed: Option<u64>,

    /// Pretty-print the report.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut scenario = match &cli.scenario {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read scenario {}", path.display()))?;
            Scenario::from_json(&text)
                .with_context(|| format!("failed to parse scenario {}", path.display()))?
        }
        None => {
            info!("no scenario given; running the demo facility");
            demo_scenario()
        }
    };

    if let Some(rate) = cli.tick_rate {
        anyhow::ensure!(rate > 0.0, "tick rate must be positive, got {rate}");
        scenario.layout.config.tick_seconds = rate.recip();
    }

    let driver = if cli.random_walk {
        let seed = cli
            .seed
            .or(scenario.layout.config.rng_seed)
            .unwrap_or(0xFACA_DEAF_0123_4567_u64);
        DriverChoice::RandomWalk { seed }
    } else {
        DriverChoice::Scripted
    };
    let options = RunOptions {
        max_ticks: cli.ticks,
        driver,
    };

    let report = run(&scenario, &options).context("scenario run failed")?;
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
