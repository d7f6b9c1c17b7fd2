//! Whole-buffer sample-rate conversion.
//!
//! Tracks are decoded eagerly, so resampling runs once over the complete
//! interleaved `i16` buffer when the output device cannot run at the source
//! rate. Uses Rubato's sinc resampler on `f32` internally.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Input chunk size in frames for each resampler call.
const CHUNK_FRAMES: usize = 1024;

/// Convert interleaved `samples` from `src_rate` to `dst_rate`.
///
/// The output holds `round(frames * dst_rate / src_rate)` frames with the
/// resampler delay already trimmed.
pub fn resample_interleaved(
    samples: &[i16],
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
) -> Result<Vec<i16>> {
    if channels == 0 || src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!(
            "invalid resample request: {channels}ch {src_rate}Hz -> {dst_rate}Hz"
        ));
    }
    if src_rate == dst_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / channels;
    let ratio = dst_rate as f64 / src_rate as f64;
    let expected_frames = (frames as f64 * ratio).round() as usize;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let mut resampler =
        Async::<f32>::new_sinc(ratio, 1.1, &params, CHUNK_FRAMES, channels, FixedAsync::Input)
            .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let delay = resampler.output_delay();
    let wanted = expected_frames + delay;

    let mut input = vec![0.0f32; CHUNK_FRAMES * channels];
    let mut output = vec![0.0f32; resampler.output_frames_max() * channels];
    let mut produced: Vec<f32> = Vec::with_capacity((wanted + CHUNK_FRAMES) * channels);

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    // Past the end of the source the chunk is zero-filled, which also flushes
    // the delayed tail out of the filter.
    let mut consumed = 0usize;
    while produced.len() / channels < wanted {
        let take = frames.saturating_sub(consumed).min(CHUNK_FRAMES);
        let src = &samples[consumed * channels..(consumed + take) * channels];
        for (dst, &s) in input.iter_mut().zip(src) {
            *dst = s as f32 / 32768.0;
        }
        input[take * channels..].fill(0.0);
        consumed += take;

        let input_adapter = InterleavedSlice::new(&input, channels, CHUNK_FRAMES)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let out_capacity_frames = output.len() / channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut output, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process error: {e}"))?;
        produced.extend_from_slice(&output[..nbr_out * channels]);
    }

    let start = delay * channels;
    let end = start + expected_frames * channels;
    Ok(produced[start..end].iter().map(|&s| to_i16(s)).collect())
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
