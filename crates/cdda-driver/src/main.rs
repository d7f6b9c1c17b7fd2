//! CD-audio device emulator.
//!
//! Accepts the legacy CD-audio command surface (as MCI-style command strings)
//! and plays `trackNN.<ext>` files from a music directory instead of a disc.
//!
//! ## Modes
//! - `shell` (default): read command strings from stdin, one per line.
//! - `play <track>`: open the device, play one track to the end, close.
//! - `tracks`: list the tracks a driver open would find.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cdda_driver::cli::{self, Args};
use cdda_driver::config::{
    CatalogConfig, DriverConfig, OutputChoice, PlayTrackConfig, PlaybackConfig, ShellConfig,
};
use cdda_driver::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    if args.list_devices {
        return runtime::list_devices();
    }

    let driver = driver_config(&args);
    let output = output_choice(&args);
    match args.cmd.clone().unwrap_or(cli::Command::Shell) {
        cli::Command::Shell => runtime::run_shell(
            ShellConfig {
                driver,
                output,
                json: args.json,
            },
            true,
        ),
        cli::Command::Play { track } => runtime::run_play(
            PlayTrackConfig {
                driver,
                output,
                track,
            },
            true,
        ),
        cli::Command::Tracks => runtime::run_tracks(driver.catalog, args.json),
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cdda_driver=info,cdda_player=info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn driver_config(args: &Args) -> DriverConfig {
    DriverConfig {
        catalog: CatalogConfig::with_music_dir(&args.music_dir),
        playback: PlaybackConfig {
            poll_interval: Duration::from_millis(args.poll_ms.max(1)),
            stop_timeout: Duration::from_millis(args.stop_timeout_ms),
        },
        ..DriverConfig::default()
    }
}

fn output_choice(args: &Args) -> OutputChoice {
    if args.null_output {
        OutputChoice::Null {
            speed: args.null_speed,
        }
    } else {
        OutputChoice::Device(args.device.clone())
    }
}
