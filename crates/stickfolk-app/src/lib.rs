//! Headless driver plumbing for the Stickfolk simulation core.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::Serialize;
use stickfolk_core::{Position, StickfolkConfig, WorldState};
use tracing::{info, warn};

pub mod overrides;

pub use overrides::{KnobUpdate, OverrideError, apply_updates};

/// Everything a headless run needs; mirrors the CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ticks: u64,
    pub seed: Option<u64>,
    /// Agents spawned at random inside the world rectangle before the first tick.
    pub agents: usize,
    pub config_path: Option<PathBuf>,
    pub overrides: Vec<KnobUpdate>,
    /// NDJSON destination for render frames.
    pub frames_path: Option<PathBuf>,
    pub frame_every: u64,
    /// Queue one random spawn request every N ticks; 0 disables.
    pub spawn_every: u64,
    /// Log a tick summary every N ticks; 0 disables.
    pub report_every: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ticks: 600,
            seed: None,
            agents: 40,
            config_path: None,
            overrides: Vec::new(),
            frames_path: None,
            frame_every: 1,
            spawn_every: 0,
            report_every: 60,
        }
    }
}

/// Outcome of a headless run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub agents: usize,
    pub predators: usize,
    pub spawned: usize,
    pub captured: usize,
    pub events_started: usize,
    pub phase_changes: usize,
    pub frames_written: usize,
}

/// Load the configuration file (if any), then layer the overrides and seed on top.
pub fn load_config(options: &RunOptions) -> Result<StickfolkConfig> {
    let base = match &options.config_path {
        Some(path) => read_config(path)?,
        None => StickfolkConfig::default(),
    };
    let mut config = apply_updates(&base, &options.overrides).context("applying config overrides")?;
    if options.seed.is_some() {
        config.rng_seed = options.seed;
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<StickfolkConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing config {}", path.display()))
}

fn random_point(rng: &mut SmallRng, config: &StickfolkConfig) -> Position {
    Position::new(
        rng.random_range(0.0..=config.world_width),
        rng.random_range(0.0..=config.world_height),
    )
}

/// Drive a world for `options.ticks` ticks without any renderer attached.
pub fn run_headless(options: &RunOptions) -> Result<RunReport> {
    let config = load_config(options)?;
    // Driver-side randomness (spawn points) stays separate from the world RNG.
    let mut rng = SmallRng::seed_from_u64(config.rng_seed.unwrap_or(0xFACA_DEAF_0123_4567_u64));
    let mut world = WorldState::new(config.clone()).context("building world")?;
    for _ in 0..options.agents {
        world.spawn_agent(random_point(&mut rng, &config))?;
    }

    let mut frames = match &options.frames_path {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating frame dump {}", path.display()))?,
        )),
        None => None,
    };

    let mut report = RunReport::default();
    for tick in 1..=options.ticks {
        if options.spawn_every > 0 && tick % options.spawn_every == 0 {
            if let Err(err) = world.queue_spawn(random_point(&mut rng, &config)) {
                warn!(%err, "spawn request rejected");
            }
        }

        let events = world.step();
        report.spawned += events.spawned.len();
        report.captured += events.captured.len();
        report.events_started += events.events_started;
        report.phase_changes += usize::from(events.phase_changed.is_some());

        if let Some(writer) = frames.as_mut() {
            if options.frame_every > 0 && tick % options.frame_every == 0 {
                serde_json::to_writer(&mut *writer, &world.render_frame())
                    .context("writing render frame")?;
                writer.write_all(b"\n").context("writing render frame")?;
                report.frames_written += 1;
            }
        }

        if options.report_every > 0 && tick % options.report_every == 0 {
            if let Some(summary) = world.history().last() {
                info!(
                    tick = summary.tick.0,
                    phase = ?summary.phase,
                    agents = summary.agent_count,
                    predators = summary.predator_count,
                    crowds = summary.crowd_count,
                    grouped = summary.grouped,
                    "simulation progress"
                );
            }
        }
    }

    if let Some(mut writer) = frames {
        writer.flush().context("flushing frame dump")?;
    }
    report.ticks = world.tick().0;
    report.agents = world.agent_count();
    report.predators = world.predators().len();
    Ok(report)
}
