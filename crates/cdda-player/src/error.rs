//! Playback pipeline errors.
//!
//! None of these reach the command caller: a failed session is logged and
//! recorded as the engine's last outcome.

use std::path::PathBuf;

use thiserror::Error;

use crate::format::AudioFormat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// No file matches the track number under any known extension.
    #[error("no audio file for track {0}")]
    NotFound(u32),

    /// A file matched but no decoder is registered for its format.
    #[error("no decoder registered for {0}")]
    UnsupportedFormat(AudioFormat),

    /// The decoder failed or produced no usable frames.
    #[error("decode failed for {path:?}: {reason}")]
    DecodeFailure { path: PathBuf, reason: String },

    #[error("output device open failed: {0}")]
    DeviceOpenFailure(String),

    #[error("output buffer prepare failed: {0}")]
    PrepareFailure(String),

    #[error("output buffer write failed: {0}")]
    WriteFailure(String),
}

impl PlaybackError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PlaybackError::DecodeFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_stage() {
        assert_eq!(
            PlaybackError::NotFound(4).to_string(),
            "no audio file for track 4"
        );
        assert_eq!(
            PlaybackError::UnsupportedFormat(AudioFormat::Opus).to_string(),
            "no decoder registered for opus"
        );
        let err = PlaybackError::decode("/music/track02.wav", "no audio frames");
        assert!(err.to_string().contains("no audio frames"));
    }
}
