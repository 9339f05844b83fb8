//! Save Shadow - Main entry point
//!
//! Launches the game with autosaves running, and restarts or restores runs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use save_shadow::utils::format::{format_bytes, format_interval};
use save_shadow::{config::Config, daemon, utils, DirectoryRole, SyncEngine};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the game and capture autosaves until Ctrl+C
    Play {
        /// Game executable or shortcut (defaults to the remembered one)
        #[arg(long, value_name = "REF")]
        launcher: Option<String>,

        /// Capture interval in minutes (saved for next time)
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,
    },
    /// Capture a snapshot right now
    Capture,
    /// Copy the staged run back over the live save folder
    Restart,
    /// Restore a snapshot over the live save folder (latest when omitted)
    Restore { id: Option<String> },
    /// List snapshots, newest first
    List,
    /// Show or change the capture interval
    Interval { minutes: Option<u32> },
    /// Show directories, session markers and snapshot count
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("save-shadow v{}", env!("CARGO_PKG_VERSION"));

    let engine = SyncEngine::new(&config);

    match args.command {
        Command::Play { launcher, interval } => {
            if let Some(minutes) = interval {
                engine.set_interval(minutes)?;
            }
            let Some(reference) = launcher.or_else(|| engine.stored_launcher()) else {
                bail!("no launcher remembered yet, pass --launcher");
            };

            let events = engine.subscribe();
            let minutes = engine.current_interval();
            let report = engine.begin_session(&reference, minutes).await?;
            if let Some(id) = &report.seeded_snapshot {
                println!("First snapshot: {}", id);
            }
            if let Some(error) = &report.launch_error {
                eprintln!("Could not launch {}: {}", report.executable.display(), error);
            }
            println!("Capturing every {}. Press Ctrl+C to stop.", format_interval(minutes));

            let cycles = daemon::run_until_signal(&engine, events).await?;
            println!("Stopped after {} capture(s)", cycles);
        }
        Command::Capture => {
            engine.ensure_layout().await?;
            let report = engine.capture_now().await?;
            if let Some(id) = report.snapshot {
                println!("{}", id);
            }
        }
        Command::Restart => {
            if !engine.can_restart() {
                tracing::warn!("Staging has no run in progress");
            }
            let report = engine.restart().await?;
            println!("Restarted: {} files", report.files_copied);
        }
        Command::Restore { id } => {
            let report = match id {
                Some(id) => engine.restore_snapshot(&id).await?,
                None => engine.restore_latest().await?,
            };
            println!("Restored: {} files ({})", report.files_copied, format_bytes(report.bytes_copied));
        }
        Command::List => {
            for id in engine.list_snapshots()? {
                let info = engine.describe_snapshot(&id)?;
                println!("{}  {:>5} files  {:>10}", info.id, info.files, format_bytes(info.bytes));
            }
        }
        Command::Interval { minutes } => {
            if let Some(minutes) = minutes {
                engine.set_interval(minutes)?;
            }
            println!("{}", format_interval(engine.current_interval()));
        }
        Command::Status => {
            let status = engine.status()?;
            println!("live:     {}", engine.directory(DirectoryRole::Live).display());
            println!("staging:  {}", engine.directory(DirectoryRole::Staging).display());
            println!("backup:   {}", engine.backup_root().display());
            println!("interval: {}", format_interval(status.interval_minutes));
            println!("live run in progress:    {}", status.live_active);
            println!("staged run to restart:   {}", status.staging_active);
            println!(
                "snapshots: {} (latest: {})",
                status.snapshot_count,
                status.latest_snapshot.as_deref().unwrap_or("none")
            );
        }
    }

    Ok(())
}
