//! Bootstrap helpers for the headless SnakeBots runner.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use snakebots_core::{AgentId, SnakeBotsConfig, TickSummary, WorldState};
use snakebots_script::{DEMO_SCRIPT, ScriptRuntime};
use tracing::{debug, info};

/// A `name=path` pair naming one scripted bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSpec {
    pub name: String,
    pub path: PathBuf,
}

impl FromStr for BotSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=PATH, got `{s}`"))?;
        let name = name.trim();
        if name.is_empty() || path.trim().is_empty() {
            return Err(format!("expected NAME=PATH, got `{s}`"));
        }
        Ok(Self {
            name: name.to_owned(),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Parse a JSON config; missing fields take their defaults.
pub fn parse_config(json: &str) -> Result<SnakeBotsConfig> {
    let config: SnakeBotsConfig =
        serde_json::from_str(json).context("failed to parse configuration JSON")?;
    config.validate().context("configuration rejected")?;
    Ok(config)
}

/// Load the config file when given, then apply the CLI seed override.
pub fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<SnakeBotsConfig> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            parse_config(&json).with_context(|| format!("in {}", path.display()))?
        }
        None => SnakeBotsConfig::default(),
    };
    if seed.is_some() {
        config.rng_seed = seed;
    }
    Ok(config)
}

/// Add one scripted agent per bot spec, or `demo_count` copies of the bundled bot.
pub fn populate(world: &mut WorldState, bots: &[BotSpec], demo_count: usize) -> Result<Vec<AgentId>> {
    let settings = world.config().script.clone();
    let seed = world.config().rng_seed;
    let mut ids = Vec::new();
    if bots.is_empty() {
        for idx in 0..demo_count {
            let name = format!("demo-{idx}");
            let mut runtime = ScriptRuntime::new(name.as_str(), DEMO_SCRIPT, settings.clone());
            if let Some(seed) = seed {
                runtime = runtime.with_rng_seed(seed.wrapping_add(idx as u64));
            }
            ids.push(world.add_agent(name, Box::new(runtime))?);
        }
        return Ok(ids);
    }
    for (idx, bot) in bots.iter().enumerate() {
        let source = fs::read_to_string(&bot.path)
            .with_context(|| format!("failed to read script for {} at {}", bot.name, bot.path.display()))?;
        let mut runtime = ScriptRuntime::new(bot.name.as_str(), source, settings.clone());
        if let Some(seed) = seed {
            runtime = runtime.with_rng_seed(seed.wrapping_add(idx as u64));
        }
        ids.push(world.add_agent(bot.name.as_str(), Box::new(runtime))?);
    }
    Ok(ids)
}

/// Step the world `ticks` times, writing a debug grid every `snapshot_every` ticks.
pub fn run(
    world: &mut WorldState,
    ticks: u64,
    snapshot_every: Option<u64>,
    out: &mut impl Write,
) -> Result<Option<TickSummary>> {
    let mut last = None;
    for _ in 0..ticks {
        let summary = world.step()?;
        debug!(
            tick = summary.tick.0,
            decisions = summary.decisions,
            faulted = summary.faulted,
            "tick"
        );
        if let Some(every) = snapshot_every.filter(|every| *every > 0)
            && summary.tick.0 % every == 0
        {
            writeln!(out, "tick {}", summary.tick.0)?;
            writeln!(out, "{}", world.debug_snapshot()?)?;
        }
        last = Some(summary);
    }
    if let Some(summary) = &last {
        info!(
            tick = summary.tick.0,
            agents = summary.agent_count,
            faulted = summary.faulted,
            food = summary.food_count,
            "run complete"
        );
    }
    Ok(last)
}
