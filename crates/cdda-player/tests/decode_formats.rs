use std::fs;
use std::path::{Path, PathBuf};

use cdda_player::PlaybackError;
use cdda_player::catalog::TrackResolver;
use cdda_player::config::CatalogConfig;
use cdda_player::decode::{Decoder, DecoderRegistry, FlacDecoder, Mp3Decoder, VorbisDecoder, WavDecoder};
use cdda_player::format::AudioFormat;

const FLAC_BLOCK: usize = 1024;

/// 40 silent MPEG-1 layer III frames (mono, 44.1 kHz) behind an Info tag.
const MP3_FIXTURE_FRAMES: u64 = 40 * 1152;
const MP3_FRAME_LEN: usize = 417;
/// 255 silent short blocks of mono Vorbis at 22.05 kHz over eight audio pages.
const OGG_FIXTURE_FRAMES: u64 = 255 * 128;
const OGG_AUDIO_PAGE_LEN: usize = 27 + 32 + 32;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        for ch in 0..channels {
            writer.write_sample(test_sample(i, ch)).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn test_sample(frame: usize, channel: u16) -> i16 {
    let v = ((frame % 200) as i32 - 100) * 150;
    if channel % 2 == 0 { v as i16 } else { (-v) as i16 }
}

/// Minimal FLAC stream: STREAMINFO plus fixed-size frames of verbatim
/// subframes, 16-bit, 44.1 kHz.
fn write_flac(path: &Path, channels: u16, frames: usize) {
    assert!(channels == 1 || channels == 2);
    assert_eq!(frames % FLAC_BLOCK, 0);
    let sample_rate: u64 = 44_100;

    let mut out = Vec::new();
    out.extend_from_slice(b"fLaC");
    // Last metadata block, type 0 (STREAMINFO), 34 bytes.
    out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    out.extend_from_slice(&(FLAC_BLOCK as u16).to_be_bytes());
    out.extend_from_slice(&(FLAC_BLOCK as u16).to_be_bytes());
    out.extend_from_slice(&[0; 3]);
    out.extend_from_slice(&[0; 3]);
    let packed = (sample_rate << 44)
        | (((channels - 1) as u64) << 41)
        | (15u64 << 36)
        | frames as u64;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);

    for (index, start) in (0..frames).step_by(FLAC_BLOCK).enumerate() {
        let mut frame = vec![
            0xFF,
            0xF8,
            // Block size from the 16-bit field below, 44.1 kHz.
            0x79,
            // Independent channels, 16 bits per sample.
            ((channels as u8 - 1) << 4) | (0b100 << 1),
            index as u8,
        ];
        frame.extend_from_slice(&((FLAC_BLOCK - 1) as u16).to_be_bytes());
        frame.push(crc8(&frame));

        for ch in 0..channels {
            // Verbatim subframe, no wasted bits.
            frame.push(0x02);
            for i in start..start + FLAC_BLOCK {
                frame.extend_from_slice(&test_sample(i, ch).to_be_bytes());
            }
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&frame);
    }

    fs::write(path, out).unwrap();
}

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    crc
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
    }
    crc
}

fn garbage(path: &Path) {
    fs::write(path, b"this is not audio data, just text padding ".repeat(64)).unwrap();
}

fn truncate(src: &Path, dst: &Path, len: usize) {
    let bytes = fs::read(src).unwrap();
    fs::write(dst, &bytes[..len.min(bytes.len())]).unwrap();
}

fn is_decode_failure<T: std::fmt::Debug>(result: Result<T, PlaybackError>) -> bool {
    matches!(result, Err(PlaybackError::DecodeFailure { .. }))
}

fn failure_reason<T: std::fmt::Debug>(result: Result<T, PlaybackError>) -> String {
    match result {
        Err(PlaybackError::DecodeFailure { reason, .. }) => reason,
        other => panic!("expected decode failure, got {other:?}"),
    }
}

#[test]
fn wav_stereo_decodes_with_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track02.wav");
    write_wav(&path, 2, 44_100, 4410);

    let audio = WavDecoder.decode(&path).unwrap();
    assert_eq!(audio.channels(), 2);
    assert_eq!(audio.sample_rate(), 44_100);
    assert_eq!(audio.frames(), 4410);
    assert_eq!(&audio.samples()[..4], &[test_sample(0, 0), test_sample(0, 1), test_sample(1, 0), test_sample(1, 1)]);
}

#[test]
fn wav_mono_decodes_with_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track03.wav");
    write_wav(&path, 1, 22_050, 1000);

    let audio = WavDecoder.decode(&path).unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.sample_rate(), 22_050);
    assert_eq!(audio.frames(), 1000);
}

#[test]
fn flac_decodes_with_layout() {
    let dir = tempfile::tempdir().unwrap();
    let stereo = dir.path().join("track02.flac");
    let mono = dir.path().join("track03.flac");
    write_flac(&stereo, 2, 4 * FLAC_BLOCK);
    write_flac(&mono, 1, 2 * FLAC_BLOCK);

    let audio = FlacDecoder.decode(&stereo).unwrap();
    assert_eq!(audio.channels(), 2);
    assert_eq!(audio.sample_rate(), 44_100);
    assert_eq!(audio.frames(), 4096);
    assert_eq!(audio.samples()[2], test_sample(1, 0));
    assert_eq!(audio.samples()[3], test_sample(1, 1));

    let audio = FlacDecoder.decode(&mono).unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.frames(), 2048);
}

#[test]
fn empty_wav_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track02.wav");
    write_wav(&path, 2, 44_100, 0);
    assert!(is_decode_failure(WavDecoder.decode(&path)));
}

#[test]
fn garbage_is_a_decode_failure_for_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let decoders: Vec<Box<dyn Decoder>> = vec![
        Box::new(WavDecoder),
        Box::new(FlacDecoder),
        Box::new(Mp3Decoder),
        Box::new(VorbisDecoder),
    ];
    for decoder in decoders {
        let path = dir.path().join(format!("track02.{}", decoder.format().extension()));
        garbage(&path);
        assert!(
            is_decode_failure(decoder.decode(&path)),
            "{} accepted garbage",
            decoder.format()
        );
    }
}

#[test]
fn truncated_headers_are_decode_failures() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("full.wav");
    let flac = dir.path().join("full.flac");
    write_wav(&wav, 2, 44_100, 4410);
    write_flac(&flac, 2, FLAC_BLOCK);

    let short_wav = dir.path().join("short.wav");
    let short_flac = dir.path().join("short.flac");
    truncate(&wav, &short_wav, 20);
    truncate(&flac, &short_flac, 30);

    assert!(is_decode_failure(WavDecoder.decode(&short_wav)));
    assert!(is_decode_failure(FlacDecoder.decode(&short_flac)));
}

#[test]
fn mp3_decodes_with_layout() {
    let audio = Mp3Decoder.decode(&fixture("silence.mp3")).unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.sample_rate(), 44_100);
    assert_eq!(audio.frames(), MP3_FIXTURE_FRAMES);
    assert!(audio.samples().iter().all(|&s| s == 0));
}

#[test]
fn vorbis_decodes_with_layout() {
    let audio = VorbisDecoder.decode(&fixture("silence.ogg")).unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.sample_rate(), 22_050);
    assert_eq!(audio.frames(), OGG_FIXTURE_FRAMES);
    assert!(audio.samples().iter().all(|&s| s == 0));
}

#[test]
fn truncated_wav_data_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let full = dir.path().join("full.wav");
    let short = dir.path().join("short.wav");
    write_wav(&full, 1, 44_100, 44_100);
    // Header plus half of the samples.
    truncate(&full, &short, 44 + 44_100);

    let reason = failure_reason(WavDecoder.decode(&short));
    assert!(reason.starts_with("truncated"), "{reason}");
}

#[test]
fn truncated_flac_frames_are_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let full = dir.path().join("full.flac");
    let short = dir.path().join("short.flac");
    write_flac(&full, 1, 16 * FLAC_BLOCK);
    let len = fs::metadata(&full).unwrap().len() as usize;
    truncate(&full, &short, len / 2);

    assert!(is_decode_failure(FlacDecoder.decode(&short)));
}

#[test]
fn truncated_mp3_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let short = dir.path().join("short.mp3");
    // Info frame, 20 audio frames and part of the next.
    truncate(&fixture("silence.mp3"), &short, 21 * MP3_FRAME_LEN + 200);

    let reason = failure_reason(Mp3Decoder.decode(&short));
    assert!(reason.starts_with("truncated"), "{reason}");
}

#[test]
fn corrupt_mp3_frame_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.mp3");
    let mut bytes = fs::read(fixture("silence.mp3")).unwrap();
    // Scale factor bits that cannot fit in an empty granule of the 10th audio frame.
    let frame = 10 * MP3_FRAME_LEN;
    bytes[frame + 9] |= 0x01;
    bytes[frame + 10] |= 0xE0;
    fs::write(&path, bytes).unwrap();

    let reason = failure_reason(Mp3Decoder.decode(&path));
    assert!(reason.contains("corrupt"), "{reason}");
}

#[test]
fn truncated_ogg_is_a_decode_failure() {
    let dir = tempfile::tempdir().unwrap();
    let full = fixture("silence.ogg");
    let len = fs::metadata(&full).unwrap().len() as usize;

    // Cut on the page boundary before the end-of-stream page.
    let no_last_page = dir.path().join("no_last_page.ogg");
    truncate(&full, &no_last_page, len - OGG_AUDIO_PAGE_LEN);
    let reason = failure_reason(VorbisDecoder.decode(&no_last_page));
    assert!(reason.starts_with("truncated"), "{reason}");

    // Cut in the middle of an audio page.
    let mid_page = dir.path().join("mid_page.ogg");
    truncate(&full, &mid_page, len / 2);
    assert!(is_decode_failure(VorbisDecoder.decode(&mid_page)));
}

#[test]
fn missing_file_is_a_decode_failure() {
    let path = PathBuf::from("/nonexistent/track02.mp3");
    assert!(is_decode_failure(Mp3Decoder.decode(&path)));
}

#[test]
fn flac_decoder_rejects_other_codecs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track02.flac");
    // A WAV file hiding behind a .flac name.
    write_wav(&path, 2, 44_100, 100);

    match FlacDecoder.decode(&path) {
        Err(PlaybackError::DecodeFailure { reason, .. }) => {
            assert!(reason.contains("unexpected codec"), "{reason}")
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
}

#[test]
fn registry_decodes_resolved_tracks() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("track02.wav"), 2, 44_100, 441);
    write_flac(&dir.path().join("track03.flac"), 2, FLAC_BLOCK);

    let resolver = TrackResolver::new(CatalogConfig::with_music_dir(dir.path()));
    let registry = DecoderRegistry::with_defaults();

    let wav = resolver.resolve(2).unwrap();
    assert_eq!(registry.decode(&wav).unwrap().frames(), 441);

    let flac = resolver.resolve(3).unwrap();
    assert_eq!(flac.format, AudioFormat::Flac);
    assert_eq!(registry.decode(&flac).unwrap().frames(), FLAC_BLOCK as u64);
}

#[test]
fn registry_without_decoder_reports_unsupported_format() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("track02.wav"), 1, 8000, 10);
    let resolver = TrackResolver::new(CatalogConfig::with_music_dir(dir.path()));
    let track = resolver.resolve(2).unwrap();

    let registry = DecoderRegistry::empty();
    assert_eq!(
        registry.decode(&track).unwrap_err(),
        PlaybackError::UnsupportedFormat(AudioFormat::Wav)
    );
}
