use std::sync::{Arc, Mutex};

use cdda_types::{EngineState, Mode, PlaybackEndReason, SessionSnapshot};

use crate::catalog::ResolvedTrack;
use crate::decode::DecodedAudio;
use crate::error::PlaybackError;

/// How the most recent session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The device consumed the whole buffer.
    Completed,
    /// Cancelled by stop, a new play request, or close.
    Stopped,
    /// A pipeline stage failed.
    Failed(PlaybackError),
}

impl SessionOutcome {
    pub fn end_reason(&self) -> PlaybackEndReason {
        match self {
            SessionOutcome::Completed => PlaybackEndReason::Eof,
            SessionOutcome::Stopped => PlaybackEndReason::Stopped,
            SessionOutcome::Failed(_) => PlaybackEndReason::Error,
        }
    }
}

/// Shared session status, updated by the command thread and the worker.
///
/// `state` doubles as the transport: paused can only be observed while a
/// session exists, since every transition back to `Idle` clears it.
#[derive(Debug, Default)]
pub struct SessionStatusState {
    pub state: EngineState,
    /// Track number of the active session.
    pub track: Option<u32>,
    /// Source file of the active session.
    pub path: Option<String>,
    /// Container format label.
    pub format: Option<String>,
    /// Decoded channel count.
    pub channels: Option<u16>,
    /// Decoded sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Decoded length in frames.
    pub frames: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Outcome of the previous session.
    pub last_outcome: Option<SessionOutcome>,
}

impl SessionStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Device-facing transport mode.
    ///
    /// A session that is still loading already counts as playing: the play
    /// request was accepted.
    pub fn mode(&self) -> Mode {
        match self.state {
            EngineState::Loading | EngineState::Playing => Mode::Playing,
            EngineState::Paused => Mode::Paused,
            EngineState::Idle | EngineState::Stopping => Mode::Stopped,
        }
    }

    /// Record the track a new session is loading.
    pub fn begin(&mut self, track: &ResolvedTrack) {
        self.clear_playback();
        self.state = EngineState::Loading;
        self.track = Some(track.track);
        self.path = Some(track.path.display().to_string());
        self.format = Some(track.format.to_string());
    }

    /// Record the decoded signal parameters.
    pub fn decoded(&mut self, audio: &DecodedAudio) {
        self.channels = Some(audio.channels());
        self.sample_rate = Some(audio.sample_rate());
        self.frames = Some(audio.frames());
        self.duration_ms = audio.duration_ms();
    }

    /// Return to `Idle` and remember how the session ended.
    pub fn finish(&mut self, outcome: SessionOutcome) {
        self.clear_playback();
        self.last_outcome = Some(outcome);
    }

    /// Return a snapshot suitable for status replies.
    pub fn snapshot(&self) -> SessionSnapshot {
        let last_error = match &self.last_outcome {
            Some(SessionOutcome::Failed(err)) => Some(err.to_string()),
            _ => None,
        };
        SessionSnapshot {
            state: self.state,
            track: self.track,
            path: self.path.clone(),
            format: self.format.clone(),
            channels: self.channels,
            sample_rate: self.sample_rate,
            frames: self.frames,
            duration_ms: self.duration_ms,
            end_reason: self.last_outcome.as_ref().map(SessionOutcome::end_reason),
            last_error,
        }
    }

    /// Clear session-specific fields.
    pub fn clear_playback(&mut self) {
        self.state = EngineState::Idle;
        self.track = None;
        self.path = None;
        self.format = None;
        self.channels = None;
        self.sample_rate = None;
        self.frames = None;
        self.duration_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use std::path::PathBuf;

    fn track() -> ResolvedTrack {
        ResolvedTrack {
            track: 4,
            path: PathBuf::from("music/track04.flac"),
            format: AudioFormat::Flac,
        }
    }

    #[test]
    fn mode_follows_engine_state() {
        let mut state = SessionStatusState::default();
        assert_eq!(state.mode(), Mode::Stopped);
        state.state = EngineState::Loading;
        assert_eq!(state.mode(), Mode::Playing);
        state.state = EngineState::Paused;
        assert_eq!(state.mode(), Mode::Paused);
        state.state = EngineState::Stopping;
        assert_eq!(state.mode(), Mode::Stopped);
    }

    #[test]
    fn snapshot_reports_session_fields() {
        let mut state = SessionStatusState::default();
        state.begin(&track());
        state.decoded(&DecodedAudio::new(vec![0; 88_200], 2, 44_100));
        state.state = EngineState::Playing;

        let snap = state.snapshot();
        assert_eq!(snap.state, EngineState::Playing);
        assert_eq!(snap.track, Some(4));
        assert_eq!(snap.format.as_deref(), Some("flac"));
        assert_eq!(snap.frames, Some(44_100));
        assert_eq!(snap.duration_ms, Some(1000));
        assert!(snap.end_reason.is_none());
    }

    #[test]
    fn finish_clears_session_and_keeps_outcome() {
        let mut state = SessionStatusState::default();
        state.begin(&track());
        state.finish(SessionOutcome::Failed(PlaybackError::NotFound(4)));

        let snap = state.snapshot();
        assert_eq!(snap.state, EngineState::Idle);
        assert!(snap.track.is_none());
        assert!(snap.path.is_none());
        assert_eq!(snap.end_reason, Some(PlaybackEndReason::Error));
        assert!(snap.last_error.is_some());
    }
}
