//! Driver runtime.
//!
//! Provides device enumeration, catalog listing, single-track playback, and
//! the interactive command shell.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cdda_player::catalog::{TrackCatalog, TrackResolver};
use cdda_player::config::CatalogConfig;
use cdda_player::device;
use cdda_player::null_sink::NullBackend;
use cdda_player::output::CpalBackend;
use cdda_player::sink::OutputBackend;
use cdda_player::status::SessionOutcome;
use cdda_types::{Command, Mode, TimeFormat};
use crossbeam_channel::{Receiver, select};
use serde::Serialize;

use crate::command_string::{self, render_reply};
use crate::config::{OutputChoice, PlayTrackConfig, ShellConfig};
use crate::dispatcher::CommandDispatcher;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for (i, name) in device::list_devices(&host)?.iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

/// Backend for the selected output.
pub fn make_backend(output: &OutputChoice) -> Arc<dyn OutputBackend> {
    match output {
        OutputChoice::Device(name) => Arc::new(CpalBackend::new(normalize_device_name(name.clone()))),
        OutputChoice::Null { speed } => Arc::new(NullBackend::with_speed(*speed)),
    }
}

#[derive(Serialize)]
struct TrackListing {
    track_count: u32,
    tracks: Vec<TrackEntry>,
}

#[derive(Serialize)]
struct TrackEntry {
    track: u32,
    format: String,
    path: String,
}

/// Probe the music directory and print what a driver open would find.
pub fn run_tracks(catalog: CatalogConfig, json: bool) -> Result<()> {
    let catalog = TrackCatalog::scan(&TrackResolver::new(catalog));
    let listing = TrackListing {
        track_count: catalog.track_count(),
        tracks: catalog
            .tracks()
            .map(|t| TrackEntry {
                track: t.track,
                format: t.format.to_string(),
                path: t.path.display().to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }
    for entry in &listing.tracks {
        println!("{:02}  {:<4}  {}", entry.track, entry.format, entry.path);
    }
    println!("track count: {}", listing.track_count);
    Ok(())
}

/// Open the device, play one track until it ends (or Ctrl-C), and close.
pub fn run_play(config: PlayTrackConfig, install_ctrlc: bool) -> Result<()> {
    let backend = make_backend(&config.output);
    let shutdown = shutdown_channel(install_ctrlc);
    let mut dispatcher = CommandDispatcher::new(config.driver, backend);

    dispatcher.dispatch(Command::OpenDriver)?;
    dispatcher.dispatch(Command::Open)?;
    dispatcher.dispatch(Command::SetTimeFormat {
        format: TimeFormat::Milliseconds,
    })?;
    dispatcher.dispatch(Command::Play {
        from: Some(config.track),
    })?;

    loop {
        if dispatcher.mode() == Mode::Stopped {
            break;
        }
        select! {
            recv(shutdown) -> _ => {
                tracing::info!("interrupted");
                break;
            }
            default(Duration::from_millis(100)) => {}
        }
    }

    let outcome = dispatcher.engine().last_outcome();
    dispatcher.dispatch(Command::Close)?;
    dispatcher.dispatch(Command::CloseDriver)?;

    match outcome {
        Some(SessionOutcome::Failed(err)) => {
            Err(anyhow::Error::new(err).context(format!("track {}", config.track)))
        }
        _ => Ok(()),
    }
}

/// Result of one shell input line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineResult {
    /// Lines to print; the shell keeps reading.
    Continue(Vec<String>),
    Quit,
}

/// Command-string shell over a dispatcher.
pub struct Shell {
    dispatcher: CommandDispatcher,
    json: bool,
}

#[derive(Serialize)]
struct JsonError {
    error: String,
    code: Option<u32>,
}

impl Shell {
    pub fn new(dispatcher: CommandDispatcher, json: bool) -> Self {
        Self { dispatcher, json }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Execute one input line.
    ///
    /// Besides command strings the shell understands `session` (engine
    /// snapshot), `quit`, and `exit`. Blank lines and `#` comments are skipped.
    pub fn execute_line(&mut self, line: &str) -> LineResult {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return LineResult::Continue(Vec::new());
        }
        match line.to_ascii_lowercase().as_str() {
            "quit" | "exit" => return LineResult::Quit,
            "session" => {
                let snapshot = self.dispatcher.session_info();
                let text = serde_json::to_string(&snapshot)
                    .unwrap_or_else(|e| format!("snapshot unavailable: {e}"));
                return LineResult::Continue(vec![text]);
            }
            _ => {}
        }

        let commands = match command_string::parse(line) {
            Ok(commands) => commands,
            Err(err) => return LineResult::Continue(vec![self.render_error(err.to_string(), None)]),
        };

        let mut out = Vec::new();
        for command in commands {
            match self.dispatcher.dispatch(command) {
                Ok(reply) if self.json => out.push(
                    serde_json::to_string(&reply).unwrap_or_else(|e| format!("reply unavailable: {e}")),
                ),
                Ok(reply) => {
                    let text = render_reply(&reply);
                    if !text.is_empty() {
                        out.push(text);
                    }
                }
                Err(err) => {
                    out.push(self.render_error(err.to_string(), Some(err.code())));
                    break;
                }
            }
        }
        LineResult::Continue(out)
    }

    fn render_error(&self, error: String, code: Option<u32>) -> String {
        if self.json {
            let body = JsonError { error, code };
            serde_json::to_string(&body).unwrap_or_else(|e| format!("error unavailable: {e}"))
        } else {
            format!("error: {error}")
        }
    }
}

/// Read command strings from stdin until EOF, `quit`, or Ctrl-C.
pub fn run_shell(config: ShellConfig, install_ctrlc: bool) -> Result<()> {
    let backend = make_backend(&config.output);
    let shutdown = shutdown_channel(install_ctrlc);
    let mut shell = Shell::new(CommandDispatcher::new(config.driver, backend), config.json);

    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read error: {e}");
                    break;
                }
            }
        }
    });

    let stdout = std::io::stdout();
    loop {
        select! {
            recv(line_rx) -> line => {
                let Ok(line) = line else {
                    break;
                };
                match shell.execute_line(&line) {
                    LineResult::Quit => break,
                    LineResult::Continue(lines) => {
                        let mut out = stdout.lock();
                        for text in lines {
                            writeln!(out, "{text}").context("write reply")?;
                        }
                        out.flush().context("flush stdout")?;
                    }
                }
            }
            recv(shutdown) -> _ => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    // Dropping the dispatcher stops any active session.
    drop(shell);
    Ok(())
}

/// Channel that fires on Ctrl-C; never fires when no handler is installed.
fn shutdown_channel(install_ctrlc: bool) -> Receiver<()> {
    if !install_ctrlc {
        return crossbeam_channel::never();
    }
    let (tx, rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
        return crossbeam_channel::never();
    }
    rx
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
