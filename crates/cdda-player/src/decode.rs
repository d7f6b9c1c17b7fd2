//! Whole-file decode stage.
//!
//! Every supported container gets one [`Decoder`] implementation. Decoders use
//! Symphonia to:
//! - detect the container (extension hint first, content sniffing second)
//! - check that the codec matches the family the format tag promises
//! - decode every packet into interleaved `i16` samples held in memory
//!
//! [`DecoderRegistry`] maps the resolver's format tag to a decoder, so adding a
//! format means registering one more implementation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecRegistry, CodecType, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

use crate::catalog::ResolvedTrack;
use crate::error::PlaybackError;
use crate::format::AudioFormat;

/// A decode may fall this many frames (plus one percent) short of the length
/// the container declares before the file counts as truncated.
const LENGTH_SLACK_FRAMES: u64 = 4096;

/// How the decoded length is checked against the container's declared length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LengthCheck {
    /// Compare when the container declares a length.
    IfDeclared,
    /// The container must declare one. Ogg only does once its end-of-stream
    /// page has been found.
    Required,
    /// The declared length is an estimate.
    Skip,
}

/// A fully decoded track: interleaved PCM16 plus its layout.
///
/// This is the only owner of the sample memory; the output sink gets a shared
/// handle for the duration of the write and the memory is released when the
/// last handle drops.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        if channels > 0 {
            let whole = samples.len() - samples.len() % channels as usize;
            samples.truncate(whole);
        }
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Shared handle to the sample memory, for handing to an output sink.
    pub fn shared_samples(&self) -> Arc<[i16]> {
        self.samples.clone()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }

    pub fn duration_ms(&self) -> Option<u64> {
        if self.sample_rate == 0 {
            return None;
        }
        Some(self.frames().saturating_mul(1000) / self.sample_rate as u64)
    }
}

/// Decodes one container format into memory.
pub trait Decoder: Send + Sync {
    fn format(&self) -> AudioFormat;

    /// Decode the whole file. Zero decoded frames is a failure.
    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError>;
}

/// Uncompressed RIFF/WAVE.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavDecoder;

/// Free Lossless Audio Codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlacDecoder;

/// MPEG-1/2 audio layer III (layers I/II are accepted too).
#[derive(Clone, Copy, Debug, Default)]
pub struct Mp3Decoder;

/// Vorbis in an Ogg container.
#[derive(Clone, Copy, Debug, Default)]
pub struct VorbisDecoder;

/// Opus in an Ogg container, decoded through libopus.
#[cfg(feature = "opus")]
#[derive(Clone, Copy, Debug, Default)]
pub struct OpusDecoder;

impl Decoder for WavDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError> {
        decode_with_symphonia(
            path,
            self.format(),
            symphonia::default::get_codecs(),
            is_pcm,
            LengthCheck::IfDeclared,
        )
    }
}

impl Decoder for FlacDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Flac
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError> {
        use symphonia::core::codecs::CODEC_TYPE_FLAC;
        decode_with_symphonia(
            path,
            self.format(),
            symphonia::default::get_codecs(),
            |c| c == CODEC_TYPE_FLAC,
            LengthCheck::IfDeclared,
        )
    }
}

impl Decoder for Mp3Decoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError> {
        use symphonia::core::codecs::{CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3};
        // Untagged streams get a length estimated from the bitrate.
        let tagged = File::open(path)
            .and_then(|mut file| mpeg_frame_count_tag(&mut file))
            .unwrap_or(false);
        decode_with_symphonia(
            path,
            self.format(),
            symphonia::default::get_codecs(),
            |c| c == CODEC_TYPE_MP3 || c == CODEC_TYPE_MP2 || c == CODEC_TYPE_MP1,
            if tagged {
                LengthCheck::IfDeclared
            } else {
                LengthCheck::Skip
            },
        )
    }
}

impl Decoder for VorbisDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Ogg
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError> {
        use symphonia::core::codecs::CODEC_TYPE_VORBIS;
        decode_with_symphonia(
            path,
            self.format(),
            symphonia::default::get_codecs(),
            |c| c == CODEC_TYPE_VORBIS,
            LengthCheck::Required,
        )
    }
}

#[cfg(feature = "opus")]
impl Decoder for OpusDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Opus
    }

    fn decode(&self, path: &Path) -> Result<DecodedAudio, PlaybackError> {
        use symphonia::core::codecs::CODEC_TYPE_OPUS;
        decode_with_symphonia(
            path,
            self.format(),
            opus_codecs(),
            |c| c == CODEC_TYPE_OPUS,
            LengthCheck::Required,
        )
    }
}

/// Codec registry with the libopus adapter; Symphonia has no native Opus decoder.
#[cfg(feature = "opus")]
fn opus_codecs() -> &'static CodecRegistry {
    static REGISTRY: std::sync::OnceLock<CodecRegistry> = std::sync::OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<symphonia_adapter_libopus::OpusDecoder>();
        registry
    })
}

fn is_pcm(codec: CodecType) -> bool {
    use symphonia::core::codecs::*;
    matches!(
        codec,
        CODEC_TYPE_PCM_U8
            | CODEC_TYPE_PCM_S8
            | CODEC_TYPE_PCM_S16LE
            | CODEC_TYPE_PCM_S24LE
            | CODEC_TYPE_PCM_S32LE
            | CODEC_TYPE_PCM_F32LE
            | CODEC_TYPE_PCM_F64LE
            | CODEC_TYPE_PCM_ALAW
            | CODEC_TYPE_PCM_MULAW
    )
}

/// Whether the first MPEG audio frame carries a Xing, Info or VBRI tag with a
/// frame count. A leading ID3v2 tag is skipped.
fn mpeg_frame_count_tag<R: Read + Seek>(reader: &mut R) -> std::io::Result<bool> {
    let mut id3 = [0u8; 10];
    reader.read_exact(&mut id3)?;
    let start = if &id3[..3] == b"ID3" {
        let size = id3[6..10]
            .iter()
            .fold(0u64, |acc, &b| (acc << 7) | u64::from(b & 0x7f));
        let footer = if id3[5] & 0x10 != 0 { 10 } else { 0 };
        10 + size + footer
    } else {
        0
    };
    reader.seek(SeekFrom::Start(start))?;

    let mut frame = [0u8; 48];
    reader.read_exact(&mut frame)?;
    if frame[0] != 0xFF || frame[1] & 0xE0 != 0xE0 {
        return Ok(false);
    }
    if &frame[36..40] == b"VBRI" {
        return Ok(true);
    }

    let mpeg1 = (frame[1] >> 3) & 0b11 == 0b11;
    let mono = frame[3] >> 6 == 0b11;
    let side_info = match (mpeg1, mono) {
        (true, true) => 17,
        (true, false) => 32,
        (false, true) => 9,
        (false, false) => 17,
    };
    let tag = 4 + side_info;
    if &frame[tag..tag + 4] != b"Xing" && &frame[tag..tag + 4] != b"Info" {
        return Ok(false);
    }
    let flags = u32::from_be_bytes([
        frame[tag + 4],
        frame[tag + 5],
        frame[tag + 6],
        frame[tag + 7],
    ]);
    Ok(flags & 0x1 != 0)
}

fn check_length(
    path: &Path,
    check: LengthCheck,
    declared: Option<u64>,
    decoded: u64,
) -> Result<(), PlaybackError> {
    let declared = match (check, declared) {
        (LengthCheck::Skip, _) => return Ok(()),
        (LengthCheck::Required, None) => {
            return Err(PlaybackError::decode(
                path,
                "truncated: no end-of-stream marker",
            ));
        }
        (LengthCheck::IfDeclared, None) => return Ok(()),
        (_, Some(frames)) => frames,
    };
    let slack = declared / 100 + LENGTH_SLACK_FRAMES;
    if decoded.saturating_add(slack) < declared {
        return Err(PlaybackError::decode(
            path,
            format!("truncated: decoded {decoded} of {declared} frames"),
        ));
    }
    Ok(())
}

/// Probe `path`, check the codec family, and decode every packet to `i16`.
///
/// Corrupt packets and a stream that ends well before its declared length
/// fail the whole decode.
fn decode_with_symphonia(
    path: &Path,
    format_tag: AudioFormat,
    codecs: &CodecRegistry,
    accepts: impl Fn(CodecType) -> bool,
    length: LengthCheck,
) -> Result<DecodedAudio, PlaybackError> {
    let file = File::open(path).map_err(|e| PlaybackError::decode(path, format!("open: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format_tag.extension());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PlaybackError::decode(path, format!("container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::decode(path, "no audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    if !accepts(codec_params.codec) {
        return Err(PlaybackError::decode(
            path,
            format!(
                "{} container carries unexpected codec {:?}",
                format_tag, codec_params.codec
            ),
        ));
    }

    let mut decoder = codecs
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::decode(path, format!("codec: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut layout: Option<(u16, u32)> = None;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            // Chained streams are not followed.
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(PlaybackError::decode(path, format!("read packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                skipped_packets += 1;
                tracing::debug!(path = %path.display(), "corrupt packet: {e}");
                continue;
            }
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(PlaybackError::decode(path, format!("decode: {e}"))),
        };

        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let channels = spec.channels.count() as u16;
        match layout {
            None => layout = Some((channels, spec.rate)),
            Some((ch, rate)) if ch != channels || rate != spec.rate => {
                tracing::warn!(
                    path = %path.display(),
                    "signal layout changed mid-stream; stopping decode"
                );
                break;
            }
            Some(_) => {}
        }

        let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let Some((channels, sample_rate)) = layout else {
        return Err(PlaybackError::decode(path, "no audio frames decoded"));
    };
    if channels == 0 || sample_rate == 0 {
        return Err(PlaybackError::decode(path, "invalid signal layout"));
    }

    let audio = DecodedAudio::new(samples, channels, sample_rate);
    if audio.frames() == 0 {
        return Err(PlaybackError::decode(path, "no audio frames decoded"));
    }
    if skipped_packets > 0 {
        return Err(PlaybackError::decode(
            path,
            format!("{skipped_packets} corrupt packet(s)"),
        ));
    }
    check_length(path, length, codec_params.n_frames, audio.frames())?;
    tracing::info!(
        format = %format_tag,
        channels,
        rate_hz = sample_rate,
        frames = audio.frames(),
        "decoded"
    );
    Ok(audio)
}

/// Format tag → decoder mapping.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<AudioFormat, Arc<dyn Decoder>>,
}

impl DecoderRegistry {
    /// Registry with no decoders at all.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with every decoder compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(WavDecoder));
        registry.register(Arc::new(FlacDecoder));
        registry.register(Arc::new(Mp3Decoder));
        registry.register(Arc::new(VorbisDecoder));
        #[cfg(feature = "opus")]
        registry.register(Arc::new(OpusDecoder));
        registry
    }

    /// Add or replace the decoder for its format.
    pub fn register(&mut self, decoder: Arc<dyn Decoder>) {
        self.decoders.insert(decoder.format(), decoder);
    }

    pub fn supports(&self, format: AudioFormat) -> bool {
        self.decoders.contains_key(&format)
    }

    pub fn decoder_for(&self, format: AudioFormat) -> Result<Arc<dyn Decoder>, PlaybackError> {
        self.decoders
            .get(&format)
            .cloned()
            .ok_or(PlaybackError::UnsupportedFormat(format))
    }

    /// Decode a resolved track with the decoder its tag selects.
    pub fn decode(&self, track: &ResolvedTrack) -> Result<DecodedAudio, PlaybackError> {
        self.decoder_for(track.format)?.decode(&track.path)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
