//! Playback engine.
//!
//! Owns at most one playback session. A session is one worker thread that
//! decodes a track, opens the output sink, submits the whole buffer, and
//! polls for completion. The command thread talks to the session through:
//! - a cancellation token, checked after decode, after the sink starts, and
//!   on every poll
//! - the shared sink slot, used for pause/resume and for teardown on stop
//! - the shared status, which also serves as the device transport
//!
//! The worker prepares and writes the sink before publishing it in the slot,
//! so no lock is held across driver calls that may block.
//!
//! Sessions are numbered. The worker only writes status while its number is
//! current, so a late-exiting worker never clobbers a newer session.
//!
//! Lock order is status → sink slot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use cdda_types::{EngineState, Mode, SessionSnapshot};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::catalog::{ResolvedTrack, TrackResolver};
use crate::config::PlaybackConfig;
use crate::decode::DecoderRegistry;
use crate::error::PlaybackError;
use crate::sink::{OpenSink, OutputBackend, PcmFormat};
use crate::status::{SessionOutcome, SessionStatusState};

type SinkSlot = Arc<Mutex<Option<OpenSink>>>;

struct SessionHandle {
    id: u64,
    cancel: Arc<AtomicBool>,
    sink: SinkSlot,
    exited: Receiver<()>,
    join: thread::JoinHandle<()>,
}

/// Single-session playback engine.
pub struct PlaybackEngine {
    resolver: TrackResolver,
    decoders: Arc<DecoderRegistry>,
    backend: Arc<dyn OutputBackend>,
    config: PlaybackConfig,
    status: Arc<Mutex<SessionStatusState>>,
    session_id: Arc<AtomicU64>,
    session: Option<SessionHandle>,
}

impl PlaybackEngine {
    pub fn new(
        resolver: TrackResolver,
        decoders: Arc<DecoderRegistry>,
        backend: Arc<dyn OutputBackend>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            resolver,
            decoders,
            backend,
            config,
            status: SessionStatusState::shared(),
            session_id: Arc::new(AtomicU64::new(0)),
            session: None,
        }
    }

    pub fn resolver(&self) -> &TrackResolver {
        &self.resolver
    }

    /// Start playing `track`, replacing any active session.
    ///
    /// Only resolution happens on the calling thread; `NotFound` is returned
    /// for diagnostics. Later failures are logged and recorded as the session
    /// outcome.
    pub fn play(&mut self, track: u32) -> Result<(), PlaybackError> {
        self.stop();

        let resolved = match self.resolver.resolve(track) {
            Ok(resolved) => resolved,
            Err(err) => {
                lock(&self.status).finish(SessionOutcome::Failed(err.clone()));
                return Err(err);
            }
        };

        let id = self.session_id.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let sink: SinkSlot = Arc::new(Mutex::new(None));
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(1);

        lock(&self.status).begin(&resolved);
        tracing::info!(
            track,
            path = %resolved.path.display(),
            format = %resolved.format,
            session = id,
            "session start"
        );

        let worker = Worker {
            id,
            session_id: self.session_id.clone(),
            cancel: cancel.clone(),
            sink: sink.clone(),
            status: self.status.clone(),
            decoders: self.decoders.clone(),
            backend: self.backend.clone(),
            config: self.config.clone(),
        };
        let join = thread::spawn(move || worker.run(resolved, exit_tx));

        self.session = Some(SessionHandle {
            id,
            cancel,
            sink,
            exited: exit_rx,
            join,
        });
        Ok(())
    }

    /// Cancel the active session and release its resources. Idempotent.
    ///
    /// Waits up to `stop_timeout` for the worker; a worker that does not exit
    /// in time is detached. The sink is torn down here unless the worker
    /// already did it.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.cancel.store(true, Ordering::SeqCst);
        {
            let mut st = lock(&self.status);
            self.session_id.fetch_add(1, Ordering::SeqCst);
            if st.state != EngineState::Idle {
                st.state = EngineState::Stopping;
            }
        }

        match session.exited.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if session.join.join().is_err() {
                    tracing::warn!(session = session.id, "playback worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    session = session.id,
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "playback worker did not exit in time; detaching"
                );
            }
        }

        let sink = lock(&session.sink).take();
        if let Some(mut sink) = sink {
            sink.close();
        }

        let mut st = lock(&self.status);
        if st.state == EngineState::Stopping {
            st.finish(SessionOutcome::Stopped);
            tracing::info!(session = session.id, "session stopped");
        }
    }

    /// Pause the active session. Returns whether anything changed.
    ///
    /// Only a session whose buffer is already written can pause; while it is
    /// still loading this is a no-op.
    pub fn pause(&mut self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let mut st = lock(&self.status);
        if st.state != EngineState::Playing {
            return false;
        }
        st.state = EngineState::Paused;
        if let Some(sink) = lock(&session.sink).as_mut() {
            sink.pause();
        }
        tracing::debug!(session = session.id, "paused");
        true
    }

    /// Resume a paused session. Returns whether anything changed.
    pub fn resume(&mut self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let mut st = lock(&self.status);
        if st.state != EngineState::Paused {
            return false;
        }
        st.state = EngineState::Playing;
        if let Some(sink) = lock(&session.sink).as_mut() {
            sink.resume();
        }
        tracing::debug!(session = session.id, "resumed");
        true
    }

    pub fn state(&self) -> EngineState {
        lock(&self.status).state
    }

    /// Transport as reported to status queries.
    pub fn mode(&self) -> Mode {
        lock(&self.status).mode()
    }

    pub fn session_info(&self) -> SessionSnapshot {
        lock(&self.status).snapshot()
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        lock(&self.status).last_outcome.clone()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Finish {
    Completed,
    Cancelled,
}

struct Worker {
    id: u64,
    session_id: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
    sink: SinkSlot,
    status: Arc<Mutex<SessionStatusState>>,
    decoders: Arc<DecoderRegistry>,
    backend: Arc<dyn OutputBackend>,
    config: PlaybackConfig,
}

impl Worker {
    fn run(self, track: ResolvedTrack, exit_tx: Sender<()>) {
        let result = self.play_session(&track);

        let sink = lock(&self.sink).take();
        if let Some(mut sink) = sink {
            sink.close();
        }

        let outcome = match result {
            Ok(Finish::Completed) => {
                tracing::info!(track = track.track, session = self.id, "track finished");
                SessionOutcome::Completed
            }
            Ok(Finish::Cancelled) => SessionOutcome::Stopped,
            Err(err) => {
                tracing::warn!(
                    track = track.track,
                    session = self.id,
                    error = %err,
                    "playback failed"
                );
                SessionOutcome::Failed(err)
            }
        };

        {
            let mut st = lock(&self.status);
            if self.is_current() {
                st.finish(outcome);
            }
        }
        let _ = exit_tx.send(());
    }

    fn play_session(&self, track: &ResolvedTrack) -> Result<Finish, PlaybackError> {
        let audio = self.decoders.decode(track)?;
        tracing::debug!(
            track = track.track,
            channels = audio.channels(),
            rate_hz = audio.sample_rate(),
            frames = audio.frames(),
            "decoded"
        );
        {
            let mut st = lock(&self.status);
            if self.is_current() {
                st.decoded(&audio);
            }
        }
        if self.cancelled() {
            return Ok(Finish::Cancelled);
        }

        let format = PcmFormat::for_audio(&audio);
        let mut sink = OpenSink::open(self.backend.as_ref(), &format)?;
        sink.start(&audio)?;
        drop(audio);
        if self.cancelled() {
            sink.close();
            return Ok(Finish::Cancelled);
        }
        *lock(&self.sink) = Some(sink);
        self.mark_started();

        loop {
            if self.cancelled() {
                return Ok(Finish::Cancelled);
            }
            let done = match lock(&self.sink).as_ref() {
                Some(sink) => sink.is_done(),
                None => return Ok(Finish::Cancelled),
            };
            if done {
                return Ok(Finish::Completed);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn mark_started(&self) {
        let mut st = lock(&self.status);
        if self.is_current() && st.state == EngineState::Loading {
            st.state = EngineState::Playing;
        }
    }

    fn is_current(&self) -> bool {
        self.session_id.load(Ordering::SeqCst) == self.id
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
