//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing the stream config closest to a track's PCM layout

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the supported output config closest to `channels` × `target_rate`.
///
/// Ranges with the requested channel count win over others. Within those, the
/// rate closest to the target from below is preferred (the target itself when
/// supported), then the sample format cheapest to convert `i16` into.
pub fn pick_output_config(
    device: &cpal::Device,
    channels: u16,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            channels_match: range.channels() == channels,
            below: rate <= target_rate,
            distance: rate.abs_diff(target_rate),
            format_rank: sample_format_rank(range.sample_format()),
        };
        let replace = match &best {
            None => true,
            Some((b, _)) => candidate.is_better_than(b),
        };
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Names of the host's output devices, in enumeration order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("No output devices")?;
    let mut names = Vec::new();
    for d in devices {
        names.push(d.description()?.to_string());
    }
    Ok(names)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    channels_match: bool,
    below: bool,
    distance: u32,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, other: &Candidate) -> bool {
        if self.channels_match != other.channels_match {
            self.channels_match
        } else if self.distance != other.distance {
            self.distance < other.distance
        } else if self.below != other.below {
            self.below
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(channels_match: bool, rate: u32, target: u32, rank: u8) -> Candidate {
        Candidate {
            channels_match,
            below: rate <= target,
            distance: rate.abs_diff(target),
            format_rank: rank,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", "USB"));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn pick_rate_for_range_clamps() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, 48_000), 48_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, 22_050), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, 192_000), 96_000);
    }

    #[test]
    fn channel_match_beats_exact_rate() {
        let stereo_far = candidate(true, 48_000, 44_100, 1);
        let mono_exact = candidate(false, 44_100, 44_100, 0);
        assert!(stereo_far.is_better_than(&mono_exact));
        assert!(!mono_exact.is_better_than(&stereo_far));
    }

    #[test]
    fn closer_rate_wins() {
        let exact = candidate(true, 44_100, 44_100, 3);
        let near = candidate(true, 48_000, 44_100, 0);
        assert!(exact.is_better_than(&near));
    }

    #[test]
    fn equal_distance_prefers_below_then_format() {
        let below = candidate(true, 40_000, 44_000, 2);
        let above = candidate(true, 48_000, 44_000, 0);
        assert!(below.is_better_than(&above));

        let i16_fmt = candidate(true, 44_100, 44_100, sample_format_rank(cpal::SampleFormat::I16));
        let f32_fmt = candidate(true, 44_100, 44_100, sample_format_rank(cpal::SampleFormat::F32));
        assert!(i16_fmt.is_better_than(&f32_fmt));
    }
}
