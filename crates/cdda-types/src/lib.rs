use serde::{Deserialize, Serialize};

/// How positions and track arguments are encoded on the command surface.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// Raw numeric value, passed through unchanged.
    Milliseconds,
    /// Packed track/minute/second/frame, one byte each (track in the low byte).
    #[default]
    Tmsf,
}

impl TimeFormat {
    /// Map a legacy protocol code back to a format.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TimeFormat::Milliseconds),
            10 => Some(TimeFormat::Tmsf),
            _ => None,
        }
    }

    /// Extract the track number carried by `value` in this format.
    pub fn track_of(self, value: u32) -> u32 {
        match self {
            TimeFormat::Tmsf => tmsf_track(value),
            TimeFormat::Milliseconds => value,
        }
    }

    /// Encode the start of `track` as a position in this format.
    pub fn position_of(self, track: u32) -> u32 {
        match self {
            TimeFormat::Tmsf => make_tmsf(track, 0, 0, 0),
            TimeFormat::Milliseconds => track,
        }
    }
}

/// Pack a TMSF position. Each component is truncated to one byte.
pub fn make_tmsf(track: u32, minutes: u32, seconds: u32, frames: u32) -> u32 {
    (track & 0xff) | (minutes & 0xff) << 8 | (seconds & 0xff) << 16 | (frames & 0xff) << 24
}

/// Track component of a packed TMSF position.
pub fn tmsf_track(value: u32) -> u32 {
    value & 0xff
}

/// Minutes component of a packed TMSF position.
pub fn tmsf_minutes(value: u32) -> u32 {
    (value >> 8) & 0xff
}

/// Seconds component of a packed TMSF position.
pub fn tmsf_seconds(value: u32) -> u32 {
    (value >> 16) & 0xff
}

/// Frames component of a packed TMSF position.
pub fn tmsf_frames(value: u32) -> u32 {
    (value >> 24) & 0xff
}

/// Device mode reported by a `mode` status query.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Stopped,
    Playing,
    Paused,
}

/// Items accepted by a status query.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusItem {
    TrackCount,
    CurrentTrack,
    Length,
    Mode,
    MediaPresent,
    Ready,
    Position,
    TimeFormat,
    TrackType,
}

/// Items accepted by a capability query.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DevCapsItem {
    CanPlay,
    HasAudio,
    CanRecord,
    HasVideo,
    CanEject,
    CanSave,
    UsesFiles,
    IsCompoundDevice,
    DeviceType,
}

/// Kind of a track on the emulated medium. Every track is audio.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Audio,
}

/// Device class reported by the capability table.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    CdAudio,
}

/// Value returned by a status query.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusValue {
    Number(u32),
    Flag(bool),
    Mode(Mode),
    TimeFormat(TimeFormat),
    TrackType(TrackType),
}

/// Value returned by a capability query.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CapValue {
    Flag(bool),
    DeviceType(DeviceType),
}

/// One command of the legacy device-control surface.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Driver-level open: the device becomes usable and the medium is probed.
    OpenDriver,
    /// Driver-level close: playback stops and the device becomes unusable.
    CloseDriver,
    Open,
    Close,
    /// Play from the given position (encoded per the active time format),
    /// or replay the current track.
    Play { from: Option<u32> },
    Stop,
    Pause,
    Resume,
    /// Move the current-track bookkeeping (encoded per the active time format).
    Seek { to: u32 },
    Status { item: StatusItem },
    SetTimeFormat { format: TimeFormat },
    GetDevCaps { item: DevCapsItem },
    Info,
    /// Anything the device does not implement.
    Unrecognized { name: String },
}

/// Successful command reply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ack,
    Status { value: StatusValue },
    Caps { value: CapValue },
    Info { text: String },
}

/// Reason why the last playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// The output device consumed the whole track.
    Eof,
    /// Resolution, decode, or output error aborted the session.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Lifecycle state of the playback engine.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopping,
}

/// Snapshot of the playback engine, for diagnostics and shell output.
///
/// Track-specific fields are `None` while nothing is loaded.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: EngineState,
    /// Track number of the active session.
    pub track: Option<u32>,
    /// Source file of the active session.
    pub path: Option<String>,
    /// Container format label (for example `flac`).
    pub format: Option<String>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    /// Decoded length in frames.
    pub frames: Option<u64>,
    /// Decoded length in milliseconds.
    pub duration_ms: Option<u64>,
    /// How the previous session ended.
    pub end_reason: Option<PlaybackEndReason>,
    /// Diagnostic message of the last failed session.
    pub last_error: Option<String>,
}
