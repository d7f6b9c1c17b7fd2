pub mod catalog;
pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod format;
pub mod null_sink;
pub mod output;
pub mod resample;
pub mod sink;
pub mod status;

pub use error::PlaybackError;
