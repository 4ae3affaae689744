use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use snakebots_app::{BotSpec, load_config, populate, run};
use snakebots_core::WorldState;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "snakebots", version, about = "Run a headless SnakeBots arena")]
struct Cli {
    /// JSON configuration file; omitted fields use defaults.
    #[arg(long, env = "SNAKEBOTS_CONFIG")]
    config: Option<PathBuf>,

    /// Scripted bot as NAME=PATH (repeatable).
    #[arg(long = "bot", value_name = "NAME=PATH")]
    bots: Vec<BotSpec>,

    /// Number of bundled demo bots when no --bot is given.
    #[arg(long, default_value_t = 4)]
    demo_bots: usize,

    /// Ticks to simulate.
    #[arg(long, default_value_t = 200)]
    ticks: u64,

    /// RNG seed overriding the config file.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the ASCII field every N ticks.
    #[arg(long)]
    snapshot_every: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.seed)?;
    let mut world = WorldState::new(config)?;
    let ids = populate(&mut world, &cli.bots, cli.demo_bots)?;
    info!(agents = ids.len(), ticks = cli.ticks, "starting SnakeBots run");

    let stdout = io::stdout();
    let summary = run(&mut world, cli.ticks, cli.snapshot_every, &mut stdout.lock())?;
    if summary.is_some_and(|s| s.faulted > 0) {
        for (_, agent) in world.agents() {
            if let Some(err) = agent.last_error() {
                warn!(agent = %agent.name(), %err, "agent faulted during run");
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
