use thiserror::Error;

/// Command-level failures returned synchronously to the caller.
///
/// Playback failures never show up here; see `cdda_player::PlaybackError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Any command other than a driver open while the device is closed.
    #[error("device not ready")]
    DeviceNotReady,

    #[error("unrecognized command: {0}")]
    UnrecognizedCommand(String),
}

impl CommandError {
    /// Legacy numeric error code.
    pub fn code(&self) -> u32 {
        const ERROR_BASE: u32 = 256;
        match self {
            CommandError::DeviceNotReady => ERROR_BASE + 20,
            CommandError::UnrecognizedCommand(_) => ERROR_BASE + 5,
        }
    }
}
