use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stickfolk_app::{KnobUpdate, RunOptions, run_headless};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "stickfolk",
    version,
    about = "Run the Stickfolk crowd simulation headless"
)]
struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// RNG seed; overrides `rng_seed` from the config file.
    #[arg(long, env = "STICKFOLK_SEED")]
    seed: Option<u64>,
    /// Agents spawned at random before the first tick.
    #[arg(long, default_value_t = 40)]
    agents: usize,
    /// JSON configuration file; missing fields keep their defaults.
    #[arg(long, env = "STICKFOLK_CONFIG")]
    config: Option<PathBuf>,
    /// Knob override as `path=value` (e.g. `crowd.eps=120`); repeatable.
    #[arg(long = "set", value_parser = parse_knob)]
    overrides: Vec<KnobUpdate>,
    /// Write one JSON render frame per line to this file.
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Tick interval between dumped frames.
    #[arg(long, default_value_t = 1)]
    frame_every: u64,
    /// Queue a random spawn request every N ticks (0 disables).
    #[arg(long, default_value_t = 0)]
    spawn_every: u64,
    /// Log a progress summary every N ticks (0 disables).
    #[arg(long, default_value_t = 60)]
    report_every: u64,
}

fn parse_knob(raw: &str) -> Result<KnobUpdate, String> {
    KnobUpdate::parse(raw).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = RunOptions {
        ticks: cli.ticks,
        seed: cli.seed,
        agents: cli.agents,
        config_path: cli.config,
        overrides: cli.overrides,
        frames_path: cli.frames,
        frame_every: cli.frame_every,
        spawn_every: cli.spawn_every,
        report_every: cli.report_every,
    };
    info!(ticks = options.ticks, agents = options.agents, "Starting Stickfolk simulation");
    let report = run_headless(&options)?;
    info!(
        ticks = report.ticks,
        agents = report.agents,
        predators = report.predators,
        captured = report.captured,
        events = report.events_started,
        frames = report.frames_written,
        "Simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
