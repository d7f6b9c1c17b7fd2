//! MCI-style command strings.
//!
//! One line is one request, `<verb> cdaudio [arguments]`, matched
//! case-insensitively. A request can expand to several commands: opening the
//! device by name also opens the driver, and closing it closes the driver.

use cdda_types::{
    CapValue, Command, DevCapsItem, DeviceType, Mode, Reply, StatusItem, StatusValue, TimeFormat,
    TrackType, make_tmsf,
};
use thiserror::Error;

/// Device name accepted in command strings.
pub const DEVICE_NAME: &str = "cdaudio";

const VERBS: [&str; 11] = [
    "open",
    "close",
    "play",
    "stop",
    "pause",
    "resume",
    "seek",
    "status",
    "set",
    "capability",
    "info",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("`{0}` needs a device name")]
    MissingDevice(String),

    #[error("unknown device `{0}`")]
    UnknownDevice(String),

    #[error("`{verb}` needs {what}")]
    MissingArgument { verb: String, what: &'static str },

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("unknown item `{0}`")]
    UnknownItem(String),

    #[error("unexpected `{0}`")]
    UnexpectedToken(String),
}

/// Parse one command string into the commands it stands for.
pub fn parse(line: &str) -> Result<Vec<Command>, ParseError> {
    let lowered = line.trim().to_ascii_lowercase();
    let mut tokens = lowered.split_whitespace();
    let verb = tokens.next().ok_or(ParseError::Empty)?;
    let rest: Vec<&str> = tokens.collect();

    if !VERBS.contains(&verb) {
        return Ok(vec![Command::Unrecognized {
            name: verb.to_string(),
        }]);
    }
    let args = device_args(verb, &rest)?;

    let commands = match verb {
        "open" => {
            no_more(args)?;
            vec![Command::OpenDriver, Command::Open]
        }
        "close" => {
            no_more(args)?;
            vec![Command::Close, Command::CloseDriver]
        }
        "play" => match args {
            [] => vec![Command::Play { from: None }],
            ["from", value] => vec![Command::Play {
                from: Some(parse_position(value)?),
            }],
            ["from"] => return Err(missing(verb, "a position after `from`")),
            [other, ..] => return Err(ParseError::UnexpectedToken(other.to_string())),
        },
        "stop" => {
            no_more(args)?;
            vec![Command::Stop]
        }
        "pause" => {
            no_more(args)?;
            vec![Command::Pause]
        }
        "resume" => {
            no_more(args)?;
            vec![Command::Resume]
        }
        "seek" => match args {
            ["to", value] => vec![Command::Seek {
                to: parse_position(value)?,
            }],
            ["to"] | [] => return Err(missing(verb, "`to <position>`")),
            [other, ..] => return Err(ParseError::UnexpectedToken(other.to_string())),
        },
        "status" => {
            if args.is_empty() {
                return Err(missing(verb, "an item"));
            }
            vec![Command::Status {
                item: status_item(args)?,
            }]
        }
        "set" => match args {
            ["time", "format", name] => vec![Command::SetTimeFormat {
                format: time_format(name)?,
            }],
            ["time", "format"] | [] => return Err(missing(verb, "`time format <name>`")),
            [other, ..] => return Err(ParseError::UnexpectedToken(other.to_string())),
        },
        "capability" => {
            if args.is_empty() {
                return Err(missing(verb, "an item"));
            }
            vec![Command::GetDevCaps {
                item: caps_item(args)?,
            }]
        }
        "info" => match args {
            [] | ["product"] => vec![Command::Info],
            [other, ..] => return Err(ParseError::UnexpectedToken(other.to_string())),
        },
        other => vec![Command::Unrecognized {
            name: other.to_string(),
        }],
    };
    Ok(commands)
}

/// Plain-text rendering of a reply, in the style of MCI string returns.
pub fn render_reply(reply: &Reply) -> String {
    match reply {
        Reply::Ack => String::new(),
        Reply::Status { value } => match value {
            StatusValue::Number(n) => n.to_string(),
            StatusValue::Flag(flag) => flag.to_string(),
            StatusValue::Mode(mode) => match mode {
                Mode::Stopped => "stopped".into(),
                Mode::Playing => "playing".into(),
                Mode::Paused => "paused".into(),
            },
            StatusValue::TimeFormat(format) => match format {
                TimeFormat::Tmsf => "tmsf".into(),
                TimeFormat::Milliseconds => "milliseconds".into(),
            },
            StatusValue::TrackType(TrackType::Audio) => "audio".into(),
        },
        Reply::Caps { value } => match value {
            CapValue::Flag(flag) => flag.to_string(),
            CapValue::DeviceType(DeviceType::CdAudio) => DEVICE_NAME.into(),
        },
        Reply::Info { text } => text.clone(),
    }
}

fn device_args<'a, 'b>(verb: &str, rest: &'b [&'a str]) -> Result<&'b [&'a str], ParseError> {
    match rest.split_first() {
        None => Err(ParseError::MissingDevice(verb.to_string())),
        Some((&DEVICE_NAME, args)) => Ok(args),
        Some((other, _)) => Err(ParseError::UnknownDevice(other.to_string())),
    }
}

fn no_more(args: &[&str]) -> Result<(), ParseError> {
    match args.first() {
        None => Ok(()),
        Some(token) => Err(ParseError::UnexpectedToken(token.to_string())),
    }
}

fn missing(verb: &str, what: &'static str) -> ParseError {
    ParseError::MissingArgument {
        verb: verb.to_string(),
        what,
    }
}

/// A plain number, or `t:m:s:f` packed as a TMSF position.
fn parse_position(token: &str) -> Result<u32, ParseError> {
    let invalid = || ParseError::InvalidNumber(token.to_string());
    if !token.contains(':') {
        return token.parse().map_err(|_| invalid());
    }
    let parts = token
        .split(':')
        .map(|p| p.parse::<u8>().map(u32::from))
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|_| invalid())?;
    match parts[..] {
        [t] => Ok(make_tmsf(t, 0, 0, 0)),
        [t, m] => Ok(make_tmsf(t, m, 0, 0)),
        [t, m, s] => Ok(make_tmsf(t, m, s, 0)),
        [t, m, s, f] => Ok(make_tmsf(t, m, s, f)),
        _ => Err(invalid()),
    }
}

/// Time format by name, or by its numeric protocol code.
fn time_format(name: &str) -> Result<TimeFormat, ParseError> {
    match name {
        "tmsf" => Ok(TimeFormat::Tmsf),
        "milliseconds" | "ms" => Ok(TimeFormat::Milliseconds),
        other => other
            .parse()
            .ok()
            .and_then(TimeFormat::from_code)
            .ok_or_else(|| ParseError::UnknownItem(other.to_string())),
    }
}

fn status_item(args: &[&str]) -> Result<StatusItem, ParseError> {
    let item = match args {
        ["number", "of", "tracks"] => StatusItem::TrackCount,
        ["current", "track"] => StatusItem::CurrentTrack,
        ["length"] => StatusItem::Length,
        ["mode"] => StatusItem::Mode,
        ["media", "present"] => StatusItem::MediaPresent,
        ["ready"] => StatusItem::Ready,
        ["position"] => StatusItem::Position,
        ["time", "format"] => StatusItem::TimeFormat,
        // Every track is audio, so a trailing track number is accepted and ignored.
        ["type", "track"] | ["type", "track", _] => StatusItem::TrackType,
        _ => return Err(ParseError::UnknownItem(args.join(" "))),
    };
    Ok(item)
}

fn caps_item(args: &[&str]) -> Result<DevCapsItem, ParseError> {
    let item = match args {
        ["can", "play"] => DevCapsItem::CanPlay,
        ["has", "audio"] => DevCapsItem::HasAudio,
        ["can", "record"] => DevCapsItem::CanRecord,
        ["has", "video"] => DevCapsItem::HasVideo,
        ["can", "eject"] => DevCapsItem::CanEject,
        ["can", "save"] => DevCapsItem::CanSave,
        ["uses", "files"] => DevCapsItem::UsesFiles,
        ["compound", "device"] => DevCapsItem::IsCompoundDevice,
        ["device", "type"] => DevCapsItem::DeviceType,
        _ => return Err(ParseError::UnknownItem(args.join(" "))),
    };
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> Command {
        let mut commands = parse(line).unwrap();
        assert_eq!(commands.len(), 1, "{line}");
        commands.remove(0)
    }

    #[test]
    fn open_and_close_expand_to_driver_commands() {
        assert_eq!(
            parse("open cdaudio").unwrap(),
            vec![Command::OpenDriver, Command::Open]
        );
        assert_eq!(
            parse("CLOSE CDAudio").unwrap(),
            vec![Command::Close, Command::CloseDriver]
        );
    }

    #[test]
    fn play_with_and_without_position() {
        assert_eq!(one("play cdaudio"), Command::Play { from: None });
        assert_eq!(one("play cdaudio from 5"), Command::Play { from: Some(5) });
        assert_eq!(
            one("play cdaudio from 3:01:02:03"),
            Command::Play {
                from: Some(make_tmsf(3, 1, 2, 3))
            }
        );
    }

    #[test]
    fn transport_verbs() {
        assert_eq!(one("stop cdaudio"), Command::Stop);
        assert_eq!(one("pause cdaudio"), Command::Pause);
        assert_eq!(one("resume cdaudio"), Command::Resume);
        assert_eq!(one("seek cdaudio to 7"), Command::Seek { to: 7 });
    }

    #[test]
    fn status_items() {
        let cases = [
            ("number of tracks", StatusItem::TrackCount),
            ("current track", StatusItem::CurrentTrack),
            ("length", StatusItem::Length),
            ("mode", StatusItem::Mode),
            ("media present", StatusItem::MediaPresent),
            ("ready", StatusItem::Ready),
            ("position", StatusItem::Position),
            ("time format", StatusItem::TimeFormat),
            ("type track 4", StatusItem::TrackType),
        ];
        for (words, item) in cases {
            assert_eq!(one(&format!("status cdaudio {words}")), Command::Status { item });
        }
    }

    #[test]
    fn capability_items() {
        assert_eq!(
            one("capability cdaudio can play"),
            Command::GetDevCaps {
                item: DevCapsItem::CanPlay
            }
        );
        assert_eq!(
            one("capability cdaudio compound device"),
            Command::GetDevCaps {
                item: DevCapsItem::IsCompoundDevice
            }
        );
        assert_eq!(
            one("capability cdaudio device type"),
            Command::GetDevCaps {
                item: DevCapsItem::DeviceType
            }
        );
    }

    #[test]
    fn set_time_format() {
        assert_eq!(
            one("set cdaudio time format ms"),
            Command::SetTimeFormat {
                format: TimeFormat::Milliseconds
            }
        );
        assert_eq!(
            one("set cdaudio time format tmsf"),
            Command::SetTimeFormat {
                format: TimeFormat::Tmsf
            }
        );
        assert_eq!(
            parse("set cdaudio time format frames"),
            Err(ParseError::UnknownItem("frames".into()))
        );
    }

    #[test]
    fn set_time_format_by_code() {
        assert_eq!(
            one("set cdaudio time format 0"),
            Command::SetTimeFormat {
                format: TimeFormat::Milliseconds
            }
        );
        assert_eq!(
            one("set cdaudio time format 10"),
            Command::SetTimeFormat {
                format: TimeFormat::Tmsf
            }
        );
        assert_eq!(
            parse("set cdaudio time format 2"),
            Err(ParseError::UnknownItem("2".into()))
        );
    }

    #[test]
    fn info_and_unknown_verbs() {
        assert_eq!(one("info cdaudio product"), Command::Info);
        assert_eq!(
            one("record cdaudio"),
            Command::Unrecognized {
                name: "record".into()
            }
        );
    }

    #[test]
    fn malformed_requests() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("play"), Err(ParseError::MissingDevice("play".into())));
        assert_eq!(
            parse("play waveaudio"),
            Err(ParseError::UnknownDevice("waveaudio".into()))
        );
        assert_eq!(
            parse("play cdaudio from x"),
            Err(ParseError::InvalidNumber("x".into()))
        );
        assert_eq!(
            parse("play cdaudio from 300:0"),
            Err(ParseError::InvalidNumber("300:0".into()))
        );
        assert!(matches!(
            parse("seek cdaudio"),
            Err(ParseError::MissingArgument { .. })
        ));
        assert_eq!(
            parse("stop cdaudio now"),
            Err(ParseError::UnexpectedToken("now".into()))
        );
        assert_eq!(
            parse("status cdaudio volume"),
            Err(ParseError::UnknownItem("volume".into()))
        );
    }

    #[test]
    fn renders_replies_as_text() {
        assert_eq!(render_reply(&Reply::Ack), "");
        assert_eq!(
            render_reply(&Reply::Status {
                value: StatusValue::Mode(Mode::Paused)
            }),
            "paused"
        );
        assert_eq!(
            render_reply(&Reply::Status {
                value: StatusValue::Number(18)
            }),
            "18"
        );
        assert_eq!(
            render_reply(&Reply::Caps {
                value: CapValue::DeviceType(DeviceType::CdAudio)
            }),
            "cdaudio"
        );
    }
}
