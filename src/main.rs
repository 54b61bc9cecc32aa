use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::warn;

use soh_control::{logging, RunMode, Service, Settings};

#[derive(Parser, Debug)]
#[command(name = "soh-control")]
#[command(about = "State-of-health calculation and capability rollup for station networks")]
struct Args {
    /// Settings file (TOML, JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level or filter, overrides the settings file (e.g. "debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct Definitions {
    /// Station definitions (JSON array)
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Capability rollup definitions (JSON array)
    #[arg(long)]
    capability: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute station state of health from an extract file
    Run {
        #[command(flatten)]
        definitions: Definitions,

        /// Newline-delimited JSON extracts to follow
        #[arg(long)]
        extracts: Option<PathBuf>,

        /// Newline-delimited JSON extracts used to restore state at startup
        #[arg(long)]
        history: Option<PathBuf>,

        /// Directory for result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Compute a single batch and exit
        #[arg(long)]
        once: bool,

        /// Batch time for --once (RFC 3339, default: now)
        #[arg(long, requires = "once")]
        at: Option<DateTime<Utc>>,
    },

    /// Load and validate definitions, then exit
    Check {
        #[command(flatten)]
        definitions: Definitions,
    },
}

impl Definitions {
    fn apply(self, settings: &mut Settings) {
        if let Some(path) = self.stations {
            settings.station_definitions = path;
        }
        if let Some(path) = self.capability {
            settings.capability_definitions = Some(path);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    logging::init(&settings.log_level, settings.log_json)?;

    match args.command {
        Command::Check { definitions } => {
            definitions.apply(&mut settings);
            let summary = Service::load(settings)?.summary();
            println!(
                "ok: {} stations, {} channels, {} station groups",
                summary.stations, summary.channels, summary.station_groups
            );
            Ok(())
        }
        Command::Run {
            definitions,
            extracts,
            history,
            output_dir,
            once,
            at,
        } => {
            definitions.apply(&mut settings);
            if let Some(path) = extracts {
                settings.extracts = path;
            }
            if let Some(path) = history {
                settings.history = Some(path);
            }
            if let Some(path) = output_dir {
                settings.output_dir = path;
            }

            let mode = if once { RunMode::Once { at } } else { RunMode::Follow };
            Service::load(settings)?.run(mode, shutdown_signal()).await
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
