//! Device-less output sink.
//!
//! Plays the buffer against the wall clock: the sink reports done once the
//! buffer's duration (divided by the speed factor) has elapsed outside of
//! pauses. Used for headless runs and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PlaybackError;
use crate::sink::{OutputBackend, OutputSink, PcmFormat};

#[derive(Clone, Debug)]
pub struct NullBackend {
    speed: f64,
}

impl NullBackend {
    /// Real-time playback.
    pub fn realtime() -> Self {
        Self { speed: 1.0 }
    }

    /// Playback `speed` times faster than real time.
    pub fn with_speed(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self { speed }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::realtime()
    }
}

impl OutputBackend for NullBackend {
    fn open(&self, format: &PcmFormat) -> Result<Box<dyn OutputSink>, PlaybackError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(PlaybackError::DeviceOpenFailure(format!(
                "unusable format {}ch {}Hz",
                format.channels, format.sample_rate
            )));
        }
        Ok(Box::new(NullSink {
            format: *format,
            speed: self.speed,
            samples: None,
            clock: Clock::Idle,
        }))
    }
}

enum Clock {
    Idle,
    Running { since: Instant, played: Duration },
    Paused { played: Duration },
}

struct NullSink {
    format: PcmFormat,
    speed: f64,
    samples: Option<Arc<[i16]>>,
    clock: Clock,
}

impl NullSink {
    fn buffer_duration(&self) -> Duration {
        let Some(samples) = &self.samples else {
            return Duration::ZERO;
        };
        let frames = samples.len() / self.format.channels as usize;
        let secs = frames as f64 / self.format.sample_rate as f64 / self.speed;
        Duration::from_secs_f64(secs)
    }

    fn played(&self) -> Duration {
        match self.clock {
            Clock::Idle => Duration::ZERO,
            Clock::Running { since, played } => played + since.elapsed(),
            Clock::Paused { played } => played,
        }
    }
}

impl OutputSink for NullSink {
    fn prepare(&mut self, samples: Arc<[i16]>) -> Result<(), PlaybackError> {
        if samples.len() % self.format.channels as usize != 0 {
            return Err(PlaybackError::PrepareFailure(
                "buffer is not a whole number of frames".into(),
            ));
        }
        self.samples = Some(samples);
        Ok(())
    }

    fn write(&mut self) -> Result<(), PlaybackError> {
        if self.samples.is_none() {
            return Err(PlaybackError::WriteFailure("no prepared buffer".into()));
        }
        self.clock = Clock::Running {
            since: Instant::now(),
            played: Duration::ZERO,
        };
        Ok(())
    }

    fn is_done(&self) -> bool {
        !matches!(self.clock, Clock::Idle) && self.played() >= self.buffer_duration()
    }

    fn pause(&mut self) {
        if let Clock::Running { .. } = self.clock {
            self.clock = Clock::Paused {
                played: self.played(),
            };
        }
    }

    fn resume(&mut self) {
        if let Clock::Paused { played } = self.clock {
            self.clock = Clock::Running {
                since: Instant::now(),
                played,
            };
        }
    }

    fn reset(&mut self) {
        self.clock = Clock::Idle;
    }

    fn unprepare(&mut self) {
        self.samples = None;
    }

    fn close(&mut self) {
        tracing::debug!("null output closed");
    }
}
