use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cdda-driver", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Directory holding trackNN.<ext> files
    #[arg(long, default_value = "music")]
    pub music_dir: PathBuf,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Play against the wall clock instead of an audio device
    #[arg(long)]
    pub null_output: bool,

    /// Speed factor for --null-output (2.0 plays twice as fast)
    #[arg(long, default_value_t = 1.0)]
    pub null_speed: f64,

    /// Append the log to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print shell replies as JSON
    #[arg(long)]
    pub json: bool,

    /// Completion poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub poll_ms: u64,

    /// How long stop waits for the playback worker, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub stop_timeout_ms: u64,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read command strings from stdin, one per line (default)
    Shell,

    /// Open the device, play one track to the end, and close
    Play {
        /// Track number (2 is the first audio track)
        track: u32,
    },

    /// Probe the music directory and list the tracks found
    Tracks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_shell_settings() {
        let args = Args::parse_from(["cdda-driver"]);
        assert!(args.cmd.is_none());
        assert_eq!(args.music_dir, PathBuf::from("music"));
        assert_eq!(args.poll_ms, 100);
        assert_eq!(args.stop_timeout_ms, 2000);
        assert!(!args.null_output);
    }

    #[test]
    fn parses_play_subcommand() {
        let args = Args::parse_from([
            "cdda-driver",
            "--music-dir",
            "/srv/cd",
            "--null-output",
            "play",
            "5",
        ]);
        assert_eq!(args.cmd, Some(Command::Play { track: 5 }));
        assert_eq!(args.music_dir, PathBuf::from("/srv/cd"));
        assert!(args.null_output);
    }
}
