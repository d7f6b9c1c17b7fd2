//! Track number → file resolution.
//!
//! Track `N` lives at `<music_dir>/trackNN.<ext>`; extensions are tried in
//! priority order and the first existing file wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::CatalogConfig;
use crate::error::PlaybackError;
use crate::format::AudioFormat;

/// A track number bound to the file that backs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub track: u32,
    pub path: PathBuf,
    pub format: AudioFormat,
}

/// Probes the music directory for track files.
#[derive(Clone, Debug)]
pub struct TrackResolver {
    config: CatalogConfig,
}

impl TrackResolver {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn music_dir(&self) -> &Path {
        &self.config.music_dir
    }

    /// Candidate path for `track` with the given extension.
    pub fn candidate_path(&self, track: u32, format: AudioFormat) -> PathBuf {
        self.config
            .music_dir
            .join(format!("track{track:02}.{}", format.extension()))
    }

    /// Return the highest-priority file present for `track`.
    pub fn resolve(&self, track: u32) -> Result<ResolvedTrack, PlaybackError> {
        self.config
            .extensions
            .iter()
            .map(|&format| (format, self.candidate_path(track, format)))
            .find(|(_, path)| path.is_file())
            .map(|(format, path)| ResolvedTrack {
                track,
                path,
                format,
            })
            .ok_or(PlaybackError::NotFound(track))
    }

    pub fn exists(&self, track: u32) -> bool {
        self.resolve(track).is_ok()
    }

    /// Count playable tracks the way the legacy medium reports them.
    ///
    /// Probing starts at `first_track` and stops at the first gap after a hit.
    /// The result includes the leading data track; with no hit at all the
    /// configured fallback is reported instead.
    pub fn count_tracks(&self) -> u32 {
        TrackCatalog::scan(self).track_count()
    }
}

/// Snapshot of the contiguous run of tracks found when the device opened.
#[derive(Clone, Debug, Default)]
pub struct TrackCatalog {
    tracks: BTreeMap<u32, ResolvedTrack>,
    track_count: u32,
}

impl TrackCatalog {
    /// Probe the configured range once.
    pub fn scan(resolver: &TrackResolver) -> Self {
        let cfg = resolver.config();
        let mut tracks = BTreeMap::new();
        for track in cfg.first_track..=cfg.last_track {
            match resolver.resolve(track) {
                Ok(found) => {
                    tracks.insert(track, found);
                }
                Err(_) if !tracks.is_empty() => break,
                Err(_) => {}
            }
        }

        let hits = tracks.len() as u32;
        let track_count = if hits > 0 {
            hits + 1
        } else {
            cfg.fallback_track_count
        };
        tracing::info!(
            dir = %cfg.music_dir.display(),
            hits,
            track_count,
            "track catalog scanned"
        );
        Self {
            tracks,
            track_count,
        }
    }

    /// Track count reported to status queries.
    pub fn track_count(&self) -> u32 {
        self.track_count
    }

    pub fn get(&self, track: u32) -> Option<&ResolvedTrack> {
        self.tracks.get(&track)
    }

    /// Tracks found, in ascending order.
    pub fn tracks(&self) -> impl Iterator<Item = &ResolvedTrack> {
        self.tracks.values()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
