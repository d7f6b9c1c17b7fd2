//! Output sink contract.
//!
//! A sink is a stateful output device driven in a fixed sequence:
//! open → prepare → write → poll `is_done` (with optional pause/resume) →
//! reset → unprepare → close.
//!
//! [`OpenSink`] owns an open sink and enforces the teardown rules on every
//! exit path: reset always runs first, unprepare runs only if prepare
//! succeeded, close runs last, and the sample buffer is released after close.

use std::sync::Arc;

use crate::decode::DecodedAudio;
use crate::error::PlaybackError;

/// Linear PCM format descriptor handed to the output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Bytes per frame.
    pub block_align: u16,
    pub avg_bytes_per_sec: u32,
}

impl PcmFormat {
    /// 16-bit interleaved PCM.
    pub fn pcm16(channels: u16, sample_rate: u32) -> Self {
        let block_align = channels.saturating_mul(2);
        Self {
            channels,
            sample_rate,
            bits_per_sample: 16,
            block_align,
            avg_bytes_per_sec: sample_rate.saturating_mul(block_align as u32),
        }
    }

    pub fn for_audio(audio: &DecodedAudio) -> Self {
        Self::pcm16(audio.channels(), audio.sample_rate())
    }
}

/// Factory for output devices.
pub trait OutputBackend: Send + Sync {
    /// Open the device for `format`.
    fn open(&self, format: &PcmFormat) -> Result<Box<dyn OutputSink>, PlaybackError>;
}

/// An open output device.
///
/// All methods are called with the sink behind a mutex, so implementations
/// see one call at a time.
pub trait OutputSink: Send {
    /// Register `samples` (interleaved, in the format the sink was opened with).
    fn prepare(&mut self, samples: Arc<[i16]>) -> Result<(), PlaybackError>;

    /// Start playing the prepared buffer. Returns immediately.
    fn write(&mut self) -> Result<(), PlaybackError>;

    /// Whether the device has consumed the whole buffer.
    fn is_done(&self) -> bool;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Halt device activity; the buffer is no longer in use afterwards.
    fn reset(&mut self);

    /// Drop the sink's reference to the prepared buffer.
    fn unprepare(&mut self);

    fn close(&mut self);
}

/// Owned open sink plus the buffer it was prepared with.
pub struct OpenSink {
    sink: Box<dyn OutputSink>,
    buffer: Option<Arc<[i16]>>,
    closed: bool,
}

impl OpenSink {
    /// Open a sink through `backend`.
    pub fn open(backend: &dyn OutputBackend, format: &PcmFormat) -> Result<Self, PlaybackError> {
        let sink = backend.open(format)?;
        Ok(Self {
            sink,
            buffer: None,
            closed: false,
        })
    }

    /// Prepare the sink with the decoded audio and start playing it.
    ///
    /// On error the sink is left for [`OpenSink::close`] (or drop) to tear down.
    pub fn start(&mut self, audio: &DecodedAudio) -> Result<(), PlaybackError> {
        let samples = audio.shared_samples();
        self.sink.prepare(samples.clone())?;
        self.buffer = Some(samples);
        self.sink.write()
    }

    pub fn is_prepared(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_done(&self) -> bool {
        self.sink.is_done()
    }

    pub fn pause(&mut self) {
        self.sink.pause();
    }

    pub fn resume(&mut self) {
        self.sink.resume();
    }

    /// Reset → unprepare (if prepared) → close → release buffer. Runs once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sink.reset();
        if self.buffer.is_some() {
            self.sink.unprepare();
        }
        self.sink.close();
        self.buffer = None;
    }
}

impl Drop for OpenSink {
    fn drop(&mut self) {
        self.close();
    }
}
