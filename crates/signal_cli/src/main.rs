use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use signal_core::PipelineConfig;
use signal_runtime::{apply_overrides, load_config, parse_overrides};
use std::path::{Path, PathBuf};

mod replay;
mod soak;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "signal_cli", about = "Traffic-light pipeline replay and soak tools")]
struct Cli {
    /// Pipeline config JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override a config key, e.g. `--set expire_window_ms=5000`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted sequence of payloads on a virtual clock.
    Replay {
        #[arg(long)]
        script: PathBuf,
    },
    /// Feed seeded random payloads through the pipeline and check invariants.
    Soak {
        /// Random seed. A fresh one is drawn when omitted.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1_000)]
        events: usize,
        /// Print every display update, not just the summary.
        #[arg(long)]
        verbose: bool,
    },
}

fn resolve_config(config_path: Option<&Path>, overrides: &[String]) -> Result<PipelineConfig> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, &parse_overrides(overrides)?)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_replay(config: &PipelineConfig, script_path: &Path) -> Result<()> {
    let script = replay::load_script(script_path)?;
    let inputs = script.inputs();
    let end_ms = script.end_ms();
    println!(
        "Replaying '{}': {} events over {end_ms}ms (channel={})",
        script.name,
        inputs.len(),
        config.channel,
    );
    println!("{}", "-".repeat(80));

    let report = replay::simulate(config, &inputs, end_ms);
    for entry in &report.timeline {
        println!("{}", replay::format_entry(entry));
    }

    println!("{}", "-".repeat(80));
    println!(
        "Done. updates={} foreign={} dropped={}",
        report.timeline.len(),
        report.foreign,
        report.dropped
    );
    Ok(())
}

/// Runs long enough past the last input for every timer to drain.
fn soak_end_ms(inputs: &[replay::TimedInput], config: &PipelineConfig) -> u64 {
    inputs
        .last()
        .map_or(0, |i| i.at_ms)
        .saturating_add(config.expire_window_ms.saturating_mul(6))
}

fn run_soak(config: &PipelineConfig, seed: Option<u64>, events: usize, verbose: bool) -> Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let inputs = soak::generate_inputs(&mut rng, events);
    let end_ms = soak_end_ms(&inputs, config);
    println!("Soak: seed={seed} events={events} simulated={end_ms}ms");

    let report = replay::simulate(config, &inputs, end_ms);
    if verbose {
        for entry in &report.timeline {
            println!("{}", replay::format_entry(entry));
        }
    }
    let summary = soak::check_timeline(&report, config.expire_window_ms)
        .with_context(|| format!("invariant violated (seed {seed})"))?;
    println!(
        "OK  signals={}  stale_clears={}  auto_clears={}  foreign={}  dropped={}",
        summary.signals, summary.stale_clears, summary.auto_clears, summary.foreign, summary.dropped,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), &cli.overrides)?;
    match cli.command {
        Commands::Replay { script } => run_replay(&config, &script),
        Commands::Soak {
            seed,
            events,
            verbose,
        } => run_soak(&config, seed, events, verbose),
    }
}
