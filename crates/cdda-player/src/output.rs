//! CPAL output sink.
//!
//! A CPAL stream is not `Send`, so each open sink owns a dedicated output
//! thread that builds the stream, keeps it alive, and drops it when the sink
//! closes. The sink and the real-time callback share a [`Playhead`] plus a
//! pair of atomic flags:
//! - `paused` makes the callback emit silence without advancing
//! - `done` is raised by the callback once the buffer is exhausted

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::device;
use crate::error::PlaybackError;
use crate::resample::resample_interleaved;
use crate::sink::{OutputBackend, OutputSink, PcmFormat};

/// Opens sinks on a CPAL output device.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    /// Substring of the device name; `None` selects the host default.
    device: Option<String>,
}

impl CpalBackend {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl OutputBackend for CpalBackend {
    fn open(&self, format: &PcmFormat) -> Result<Box<dyn OutputSink>, PlaybackError> {
        let sink = CpalSink::open(self.device.clone(), *format)
            .map_err(|e| PlaybackError::DeviceOpenFailure(format!("{e:#}")))?;
        Ok(Box::new(sink))
    }
}

/// Device parameters reported back by the output thread.
#[derive(Clone, Debug)]
struct StreamInfo {
    device: String,
    channels: u16,
    sample_rate: u32,
    sample_format: cpal::SampleFormat,
}

/// Buffer position shared with the callback.
struct Playhead {
    samples: Option<Arc<[i16]>>,
    pos: usize,
    src_channels: usize,
    active: bool,
}

struct Shared {
    playhead: Mutex<Playhead>,
    paused: AtomicBool,
    done: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Playhead> {
        self.playhead.lock().unwrap_or_else(|p| p.into_inner())
    }
}

struct CpalSink {
    format: PcmFormat,
    info: StreamInfo,
    shared: Arc<Shared>,
    close_tx: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CpalSink {
    fn open(device_name: Option<String>, format: PcmFormat) -> Result<Self> {
        let shared = Arc::new(Shared {
            playhead: Mutex::new(Playhead {
                samples: None,
                pos: 0,
                src_channels: format.channels as usize,
                active: false,
            }),
            paused: AtomicBool::new(false),
            done: AtomicBool::new(false),
        });

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<StreamInfo, String>>(1);
        let (close_tx, close_rx) = crossbeam_channel::bounded::<()>(0);
        let shared_thread = shared.clone();
        let thread = thread::Builder::new()
            .name("cdda-output".into())
            .spawn(move || run_output(device_name, format, shared_thread, ready_tx, close_rx))
            .context("spawn output thread")?;

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(msg)) => {
                let _ = thread.join();
                return Err(anyhow!(msg));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("output thread exited before the stream was built"));
            }
        };
        tracing::info!(
            device = %info.device,
            channels = info.channels,
            rate_hz = info.sample_rate,
            sample_format = ?info.sample_format,
            "output stream opened"
        );

        Ok(Self {
            format,
            info,
            shared,
            close_tx: Some(close_tx),
            thread: Some(thread),
        })
    }
}

impl OutputSink for CpalSink {
    fn prepare(&mut self, samples: Arc<[i16]>) -> Result<(), PlaybackError> {
        let channels = self.format.channels as usize;
        if samples.len() % channels != 0 {
            return Err(PlaybackError::PrepareFailure(
                "buffer is not a whole number of frames".into(),
            ));
        }
        let samples = if self.info.sample_rate != self.format.sample_rate {
            tracing::info!(
                from_hz = self.format.sample_rate,
                to_hz = self.info.sample_rate,
                "resampling track"
            );
            let converted = resample_interleaved(
                &samples,
                channels,
                self.format.sample_rate,
                self.info.sample_rate,
            )
            .map_err(|e| PlaybackError::PrepareFailure(format!("{e:#}")))?;
            Arc::from(converted)
        } else {
            samples
        };

        let mut ph = self.shared.lock();
        ph.samples = Some(samples);
        ph.pos = 0;
        ph.active = false;
        self.shared.done.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn write(&mut self) -> Result<(), PlaybackError> {
        if self.thread.as_ref().is_none_or(|t| t.is_finished()) {
            return Err(PlaybackError::WriteFailure("output stream is gone".into()));
        }
        let mut ph = self.shared.lock();
        if ph.samples.is_none() {
            return Err(PlaybackError::WriteFailure("no prepared buffer".into()));
        }
        ph.active = true;
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Relaxed)
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    fn reset(&mut self) {
        let mut ph = self.shared.lock();
        ph.active = false;
        ph.pos = 0;
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    fn unprepare(&mut self) {
        self.shared.lock().samples = None;
    }

    fn close(&mut self) {
        // Dropping the sender wakes the output thread, which drops the stream.
        self.close_tx.take();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::warn!("output thread panicked");
            }
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_output(
    device_name: Option<String>,
    format: PcmFormat,
    shared: Arc<Shared>,
    ready_tx: Sender<Result<StreamInfo, String>>,
    close_rx: Receiver<()>,
) {
    let (stream, info) = match open_stream(device_name.as_deref(), &format, shared) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("{e:#}")));
            return;
        }
    };
    if ready_tx.send(Ok(info)).is_err() {
        return;
    }
    // Blocks until the sink drops its sender.
    let _ = close_rx.recv();
    drop(stream);
}

fn open_stream(
    device_name: Option<&str>,
    format: &PcmFormat,
    shared: Arc<Shared>,
) -> Result<(cpal::Stream, StreamInfo)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_name)?;
    let name = device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "<unknown>".into());

    let config = device::pick_output_config(&device, format.channels, format.sample_rate)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    let stream = build_output_stream(&device, &stream_config, config.sample_format(), shared)?;
    stream.play().context("start output stream")?;

    Ok((
        stream,
        StreamInfo {
            device: name,
            channels: stream_config.channels,
            sample_rate: stream_config.sample_rate,
            sample_format: config.sample_format(),
        },
    ))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: Arc<Shared>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, shared),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, shared),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, shared),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, shared),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = config.channels as usize;
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| fill_output(&shared, data, channels_out),
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Real-time callback body: copy the next frames from the playhead into `data`.
fn fill_output<T>(shared: &Shared, data: &mut [T], channels_out: usize)
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    let silence = T::EQUILIBRIUM;
    if shared.paused.load(Ordering::Relaxed) {
        data.fill(silence);
        return;
    }

    let mut ph = shared.lock();
    if !ph.active {
        data.fill(silence);
        return;
    }

    let frames = data.len() / channels_out;
    for frame in 0..frames {
        if ph.remaining() == 0 {
            data[frame * channels_out..].fill(silence);
            ph.active = false;
            shared.done.store(true, Ordering::Relaxed);
            return;
        }
        for ch in 0..channels_out {
            let sample = next_sample_mapped(&mut ph, channels_out, ch);
            data[frame * channels_out + ch] = T::from_sample(sample);
        }
    }
    if ph.remaining() == 0 {
        ph.active = false;
        shared.done.store(true, Ordering::Relaxed);
    }
}

impl Playhead {
    fn remaining(&self) -> usize {
        self.samples
            .as_ref()
            .map(|s| s.len().saturating_sub(self.pos))
            .unwrap_or(0)
    }
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - matching layouts: pass-through
/// - other layouts: clamp to the available source channels
///
/// `pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(ph: &mut Playhead, dst_channels: usize, dst_ch: usize) -> i16 {
    let Some(samples) = ph.samples.as_ref() else {
        return 0;
    };
    let frame_start = ph.pos;
    let src_channels = ph.src_channels;
    let get_src = |ch: usize| -> i16 {
        if ch < src_channels {
            samples.get(frame_start + ch).copied().unwrap_or(0)
        } else {
            0
        }
    };

    let out = match (src_channels, dst_channels) {
        (2, 1) => ((get_src(0) as i32 + get_src(1) as i32) / 2) as i16,
        (1, _) => get_src(0),
        _ => get_src(dst_ch.min(src_channels.saturating_sub(1))),
    };

    if dst_ch + 1 == dst_channels {
        ph.pos += src_channels;
    }
    out
}
