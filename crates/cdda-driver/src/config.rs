pub use cdda_player::config::{CatalogConfig, PlaybackConfig};

/// Device emulation settings.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub catalog: CatalogConfig,
    pub playback: PlaybackConfig,
    /// Current track right after the device opens.
    pub initial_track: u32,
    /// Value reported by a `length` status query.
    pub nominal_length_ms: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            playback: PlaybackConfig::default(),
            initial_track: 2,
            nominal_length_ms: 180_000,
        }
    }
}

/// Where decoded audio goes.
#[derive(Clone, Debug)]
pub enum OutputChoice {
    /// A CPAL device, by name substring or the host default.
    Device(Option<String>),
    /// No device; playback advances against the wall clock.
    Null { speed: f64 },
}

#[derive(Clone, Debug)]
pub struct ShellConfig {
    pub driver: DriverConfig,
    pub output: OutputChoice,
    /// Print replies as JSON instead of plain text.
    pub json: bool,
}

#[derive(Clone, Debug)]
pub struct PlayTrackConfig {
    pub driver: DriverConfig,
    pub output: OutputChoice,
    pub track: u32,
}
