//! Audio decoding module
//!
//! Uses symphonia to turn in-memory media bytes into planar f64 PCM:
//! - WAV, AIFF (PCM)
//! - FLAC, ALAC (lossless)
//! - MP3, OGG Vorbis, AAC (lossy)
//! - Audio tracks inside MP4/M4A and Matroska/WebM containers

use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::cancel::CancelToken;
use crate::error::{OfflineError, OfflineResult};
use crate::pipeline::PcmBuffer;

/// Extensions accepted as audio when no MIME type is given
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "wav", "wave", "flac", "mp3", "ogg", "oga", "aac", "m4a", "aif", "aiff", "caf", "opus", "wma",
];

/// Extensions accepted as video (audio-in-container) when no MIME type is given
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "mkv", "webm", "avi", "3gp"];

// ═══════════════════════════════════════════════════════════════════════════════
// MEDIA HINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Type hint passed to the format prober
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaHint {
    /// Lowercase file extension without the dot
    pub extension: Option<String>,
    /// MIME-like type, e.g. `audio/mpeg`
    pub mime_type: Option<String>,
}

impl MediaHint {
    /// Build a hint from a file name and a (possibly empty) MIME type
    pub fn new(name: &str, mime_type: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty());
        let mime_type = Some(mime_type.trim().to_ascii_lowercase()).filter(|m| !m.is_empty());

        Self {
            extension,
            mime_type,
        }
    }

    fn to_symphonia(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(ext) = &self.extension {
            hint.with_extension(ext);
        }
        if let Some(mime) = &self.mime_type {
            hint.mime_type(mime);
        }
        hint
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Universal audio decoder using symphonia
pub struct AudioDecoder;

impl AudioDecoder {
    /// Decode the first audio track of `data` to a planar PCM buffer.
    ///
    /// Fails with [`OfflineError::Decode`] when the bytes are not decodable,
    /// when nothing decodes, or when the result would exceed `max_frames`.
    pub fn decode(
        data: Arc<[u8]>,
        hint: &MediaHint,
        max_frames: u64,
        cancel: &CancelToken,
    ) -> OfflineResult<PcmBuffer> {
        let mut format = Self::open(data, hint)?;

        let track = Self::select_track(format.tracks())?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| OfflineError::Decode(format!("Unsupported codec: {}", e)))?;

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f64>> = Vec::new();
        let mut skipped_packets = 0usize;

        loop {
            cancel.check()?;

            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(OfflineError::Decode(format!("Packet read error: {}", e)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if channels.is_empty() {
                        let count = decoded.spec().channels.count().max(1);
                        channels = vec![Vec::new(); count];
                    }
                    if sample_rate == 0 {
                        sample_rate = decoded.spec().rate;
                    }

                    append_planes(&decoded, &mut channels);

                    if channels[0].len() as u64 > max_frames {
                        return Err(OfflineError::Decode(format!(
                            "Decoded audio exceeds budget of {} frames",
                            max_frames
                        )));
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    skipped_packets += 1;
                    log::debug!("Skipping undecodable packet: {}", e);
                }
                Err(e) => {
                    return Err(OfflineError::Decode(format!("Decode error: {}", e)));
                }
            }
        }

        if sample_rate == 0 {
            return Err(OfflineError::Decode("Unknown sample rate".to_string()));
        }

        let buffer = PcmBuffer::from_channels(channels, sample_rate);
        if buffer.is_empty() {
            return Err(OfflineError::Decode(if skipped_packets > 0 {
                format!("No decodable audio ({} packets rejected)", skipped_packets)
            } else {
                "Decoded audio is empty".to_string()
            }));
        }

        if skipped_packets > 0 {
            log::debug!("Decode finished with {} skipped packets", skipped_packets);
        }

        Ok(buffer)
    }

    /// Read stream metadata without decoding
    pub fn probe(data: Arc<[u8]>, hint: &MediaHint) -> OfflineResult<ProbeInfo> {
        let size_bytes = data.len() as u64;
        let format = Self::open(data, hint)?;
        let track = Self::select_track(format.tracks())?;
        let params = &track.codec_params;

        let duration_secs = match (params.n_frames, params.time_base, params.sample_rate) {
            (Some(frames), Some(time_base), _) => {
                let time = time_base.calc_time(frames);
                Some(time.seconds as f64 + time.frac)
            }
            (Some(frames), None, Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
            _ => None,
        };

        let bitrate_estimate = duration_secs
            .filter(|d| *d > 0.0)
            .map(|d| ((size_bytes * 8) as f64 / d).round() as u32);

        Ok(ProbeInfo {
            duration_secs,
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count()),
            bitrate_estimate,
            size_bytes,
        })
    }

    /// Get list of extensions the decoder recognizes
    pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
        AUDIO_EXTENSIONS.iter().chain(VIDEO_EXTENSIONS.iter()).copied()
    }

    fn open(data: Arc<[u8]>, hint: &MediaHint) -> OfflineResult<Box<dyn FormatReader>> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint.to_symphonia(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| OfflineError::Decode(format!("Unrecognized media: {}", e)))?;

        Ok(probed.format)
    }

    /// First track with a known codec, preferring ones that declare a sample rate
    fn select_track(tracks: &[Track]) -> OfflineResult<&Track> {
        let known = |t: &&Track| t.codec_params.codec != CODEC_TYPE_NULL;

        tracks
            .iter()
            .filter(known)
            .find(|t| t.codec_params.sample_rate.is_some())
            .or_else(|| tracks.iter().find(known))
            .ok_or_else(|| OfflineError::Decode("No audio track found".to_string()))
    }
}

/// Append one decoded packet to the planar output, keeping all channels the
/// same length.
fn append_planes(decoded: &AudioBufferRef<'_>, out: &mut [Vec<f64>]) {
    let before = out.first().map(|c| c.len()).unwrap_or(0);

    match decoded {
        AudioBufferRef::U8(buf) => extend_from(&**buf, out),
        AudioBufferRef::U16(buf) => extend_from(&**buf, out),
        AudioBufferRef::U24(buf) => extend_from(&**buf, out),
        AudioBufferRef::U32(buf) => extend_from(&**buf, out),
        AudioBufferRef::S8(buf) => extend_from(&**buf, out),
        AudioBufferRef::S16(buf) => extend_from(&**buf, out),
        AudioBufferRef::S24(buf) => extend_from(&**buf, out),
        AudioBufferRef::S32(buf) => extend_from(&**buf, out),
        AudioBufferRef::F32(buf) => extend_from(&**buf, out),
        AudioBufferRef::F64(buf) => extend_from(&**buf, out),
    }

    let frames = decoded.frames();
    for channel in out.iter_mut() {
        channel.resize(before + frames, 0.0);
    }
}

fn extend_from<S>(buf: &AudioBuffer<S>, out: &mut [Vec<f64>])
where
    S: Sample + IntoSample<f64>,
{
    let planes = buf.planes();
    for (dest, plane) in out.iter_mut().zip(planes.planes().iter()) {
        dest.extend(plane.iter().take(buf.frames()).map(|&s| s.into_sample()));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROBE INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Best-effort stream metadata, advisory only
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProbeInfo {
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    /// Whole-file bits per second
    pub bitrate_estimate: Option<u32>,
    pub size_bytes: u64,
}

impl ProbeInfo {
    /// Get duration as formatted string
    pub fn duration_str(&self) -> String {
        self.duration_secs
            .map(wf_core::format_duration)
            .unwrap_or_else(|| "--:--".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Arc<[u8]> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for ch in 0..channels {
                    let value = if ch == 0 { 16384 } else { -8192 };
                    writer.write_sample(if i % 2 == 0 { value } else { 0i16 }).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        Arc::from(cursor.into_inner())
    }

    #[test]
    fn test_media_hint() {
        let hint = MediaHint::new("Take 1.MP3", " Audio/MPEG ");
        assert_eq!(hint.extension.as_deref(), Some("mp3"));
        assert_eq!(hint.mime_type.as_deref(), Some("audio/mpeg"));

        let bare = MediaHint::new("noext", "");
        assert_eq!(bare, MediaHint::default());
    }

    #[test]
    fn test_decode_wav_planar() {
        let data = wav_bytes(2, 22050, 1000);
        let hint = MediaHint::new("tone.wav", "audio/wav");
        let buffer = AudioDecoder::decode(data, &hint, u64::MAX, &CancelToken::new()).unwrap();

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.sample_rate, 22050);
        assert_eq!(buffer.frames(), 1000);
        assert!((buffer.channels[0][0] - 0.5).abs() < 1e-9);
        assert!((buffer.channels[1][0] + 0.25).abs() < 1e-9);
        assert_eq!(buffer.channels[0][1], 0.0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let data: Arc<[u8]> = Arc::from(&b"definitely not an audio stream"[..]);
        let hint = MediaHint::new("broken.wav", "audio/wav");
        let result = AudioDecoder::decode(data, &hint, u64::MAX, &CancelToken::new());
        assert!(matches!(result, Err(OfflineError::Decode(_))));
    }

    #[test]
    fn test_decode_budget() {
        let data = wav_bytes(1, 8000, 8000);
        let hint = MediaHint::new("long.wav", "");
        let result = AudioDecoder::decode(data, &hint, 100, &CancelToken::new());
        assert!(matches!(result, Err(OfflineError::Decode(_))));
    }

    #[test]
    fn test_decode_observes_cancel() {
        let data = wav_bytes(1, 8000, 800);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = AudioDecoder::decode(data, &MediaHint::default(), u64::MAX, &cancel);
        assert!(matches!(result, Err(OfflineError::Cancelled)));
    }

    #[test]
    fn test_probe_wav() {
        let data = wav_bytes(2, 8000, 16000);
        let size = data.len() as u64;
        let info = AudioDecoder::probe(data, &MediaHint::new("two_seconds.wav", "")).unwrap();

        assert_eq!(info.sample_rate, Some(8000));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.size_bytes, size);
        let duration = info.duration_secs.unwrap();
        assert!((duration - 2.0).abs() < 1e-6);
        assert_eq!(info.duration_str(), "0:02.000");
        assert!(info.bitrate_estimate.unwrap() > 250_000);
    }

    #[test]
    fn test_supported_extensions() {
        let all: Vec<&str> = AudioDecoder::supported_extensions().collect();
        assert!(all.contains(&"wav"));
        assert!(all.contains(&"flac"));
        assert!(all.contains(&"mp4"));
    }
}
