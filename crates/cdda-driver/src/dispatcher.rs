//! Command dispatcher.
//!
//! Emulates the CD-audio device state machine on top of the playback engine:
//! `Closed → Open-Idle ⇄ Open-Playing ⇄ Open-Paused`. The transport half of
//! the state lives in the engine so that a session that ends on its own
//! returns the device to idle.

use std::sync::Arc;

use cdda_player::catalog::{TrackCatalog, TrackResolver};
use cdda_player::decode::DecoderRegistry;
use cdda_player::engine::PlaybackEngine;
use cdda_player::sink::OutputBackend;
use cdda_types::{
    CapValue, Command, DevCapsItem, DeviceType, Mode, Reply, SessionSnapshot, StatusItem,
    StatusValue, TimeFormat, TrackType,
};

use crate::config::DriverConfig;
use crate::error::CommandError;

/// Bookkeeping half of the device state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceState {
    pub open: bool,
    pub current_track: u32,
    pub track_count: u32,
    pub time_format: TimeFormat,
}

impl DeviceState {
    fn new(config: &DriverConfig) -> Self {
        Self {
            open: false,
            current_track: config.initial_track,
            track_count: config.catalog.fallback_track_count,
            time_format: TimeFormat::default(),
        }
    }
}

pub struct CommandDispatcher {
    state: DeviceState,
    catalog: TrackCatalog,
    engine: PlaybackEngine,
    nominal_length_ms: u32,
}

impl CommandDispatcher {
    pub fn new(config: DriverConfig, backend: Arc<dyn OutputBackend>) -> Self {
        Self::with_decoders(config, backend, Arc::new(DecoderRegistry::with_defaults()))
    }

    pub fn with_decoders(
        config: DriverConfig,
        backend: Arc<dyn OutputBackend>,
        decoders: Arc<DecoderRegistry>,
    ) -> Self {
        let state = DeviceState::new(&config);
        let engine = PlaybackEngine::new(
            TrackResolver::new(config.catalog),
            decoders,
            backend,
            config.playback,
        );
        Self {
            state,
            catalog: TrackCatalog::default(),
            engine,
            nominal_length_ms: config.nominal_length_ms,
        }
    }

    /// Execute one command.
    pub fn dispatch(&mut self, command: Command) -> Result<Reply, CommandError> {
        tracing::debug!(?command, "dispatch");
        match command {
            Command::OpenDriver => {
                self.open_driver();
                return Ok(Reply::Ack);
            }
            Command::CloseDriver => {
                self.close_driver();
                return Ok(Reply::Ack);
            }
            _ if !self.state.open => return Err(CommandError::DeviceNotReady),
            _ => {}
        }

        let reply = match command {
            Command::OpenDriver | Command::CloseDriver => Reply::Ack,
            Command::Open => {
                tracing::info!("open");
                Reply::Ack
            }
            Command::Close => {
                tracing::info!("close");
                self.engine.stop();
                Reply::Ack
            }
            Command::Play { from } => {
                let track = from
                    .map(|value| self.state.time_format.track_of(value))
                    .unwrap_or(self.state.current_track);
                self.play(track);
                Reply::Ack
            }
            Command::Stop => {
                tracing::info!("stop");
                self.engine.stop();
                Reply::Ack
            }
            Command::Pause => {
                if self.engine.mode() == Mode::Playing {
                    self.engine.pause();
                }
                Reply::Ack
            }
            Command::Resume => {
                if self.engine.mode() == Mode::Paused {
                    self.engine.resume();
                }
                Reply::Ack
            }
            Command::Seek { to } => {
                let track = self.state.time_format.track_of(to);
                self.state.current_track = track;
                tracing::info!(track, "seek");
                Reply::Ack
            }
            Command::Status { item } => Reply::Status {
                value: self.status(item),
            },
            Command::SetTimeFormat { format } => {
                self.state.time_format = format;
                tracing::debug!(?format, "time format set");
                Reply::Ack
            }
            Command::GetDevCaps { item } => Reply::Caps {
                value: device_caps(item),
            },
            Command::Info => Reply::Info {
                text: String::new(),
            },
            Command::Unrecognized { name } => {
                tracing::debug!(%name, "unrecognized command");
                return Err(CommandError::UnrecognizedCommand(name));
            }
        };
        Ok(reply)
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    /// Transport mode as a status query reports it.
    pub fn mode(&self) -> Mode {
        self.engine.mode()
    }

    pub fn session_info(&self) -> SessionSnapshot {
        self.engine.session_info()
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    fn open_driver(&mut self) {
        self.catalog = TrackCatalog::scan(self.engine.resolver());
        self.state.track_count = self.catalog.track_count();
        self.state.open = true;
        tracing::info!(tracks = self.state.track_count, "driver open");
    }

    fn close_driver(&mut self) {
        tracing::info!("driver close");
        self.engine.stop();
        self.state.open = false;
    }

    /// The current track only moves when the file resolves.
    fn play(&mut self, track: u32) {
        match self.engine.play(track) {
            Ok(()) => {
                self.state.current_track = track;
                tracing::info!(track, "play");
            }
            Err(err) => tracing::warn!(
                track,
                dir = %self.engine.resolver().music_dir().display(),
                error = %err,
                "play request dropped"
            ),
        }
    }

    fn status(&self, item: StatusItem) -> StatusValue {
        match item {
            StatusItem::TrackCount => StatusValue::Number(self.state.track_count),
            StatusItem::CurrentTrack => StatusValue::Number(self.state.current_track),
            StatusItem::Length => StatusValue::Number(self.nominal_length_ms),
            StatusItem::Mode => StatusValue::Mode(self.engine.mode()),
            StatusItem::MediaPresent | StatusItem::Ready => StatusValue::Flag(true),
            StatusItem::Position => StatusValue::Number(
                self.state.time_format.position_of(self.state.current_track),
            ),
            StatusItem::TimeFormat => StatusValue::TimeFormat(self.state.time_format),
            StatusItem::TrackType => StatusValue::TrackType(TrackType::Audio),
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.engine.stop();
    }
}

fn device_caps(item: DevCapsItem) -> CapValue {
    match item {
        DevCapsItem::CanPlay | DevCapsItem::HasAudio => CapValue::Flag(true),
        DevCapsItem::CanRecord
        | DevCapsItem::HasVideo
        | DevCapsItem::CanEject
        | DevCapsItem::CanSave
        | DevCapsItem::UsesFiles
        | DevCapsItem::IsCompoundDevice => CapValue::Flag(false),
        DevCapsItem::DeviceType => CapValue::DeviceType(DeviceType::CdAudio),
    }
}
