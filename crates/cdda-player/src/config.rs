use std::path::PathBuf;
use std::time::Duration;

use crate::format::AudioFormat;

/// Playback engine tuning shared by the worker and the stop path.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// How often the worker polls the sink for completion.
    pub poll_interval: Duration,
    /// Upper bound on how long `stop` waits for the worker to exit.
    pub stop_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_millis(2000),
        }
    }
}

/// Where track files live and how they are probed.
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    /// Directory holding `trackNN.<ext>` files.
    pub music_dir: PathBuf,
    /// Extensions tried for every track, in priority order.
    pub extensions: Vec<AudioFormat>,
    /// First playable track (track 1 is the conventional data track).
    pub first_track: u32,
    /// Last track number probed when counting.
    pub last_track: u32,
    /// Count reported when no track file is found at all.
    pub fallback_track_count: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("music"),
            extensions: AudioFormat::PRIORITY.to_vec(),
            first_track: 2,
            last_track: 99,
            fallback_track_count: 18,
        }
    }
}

impl CatalogConfig {
    /// Default probing rules rooted at `music_dir`.
    pub fn with_music_dir(music_dir: impl Into<PathBuf>) -> Self {
        Self {
            music_dir: music_dir.into(),
            ..Self::default()
        }
    }
}
