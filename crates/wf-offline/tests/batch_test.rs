//! Batch Runner Integration Tests
//!
//! Drives the converter end to end with WAV fixtures generated in memory.
//! Verifies:
//! - Per-job failure isolation
//! - Cancellation mid-batch and resume
//! - Trim fallback and trim provenance
//! - Container layout of the produced bytes
//! - Single active run

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use crossbeam_channel::{Receiver, Sender, bounded};
use wf_core::{BitDepth, ChannelMode, SampleRate};
use wf_offline::{
    BatchEvent, CancelToken, ConversionSettings, Converter, Diagnostic, JobStatus,
    LinearResampler, OfflineConfig, OfflineError, OfflineResult, PcmBuffer, RenderRequest,
    Resampler, SourceMedia, TargetFormat,
};

/// Generate a 16-bit WAV file with a 440 Hz tone
fn tone_wav(name: &str, channels: u16, sample_rate: u32, seconds: f64) -> SourceMedia {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (seconds * sample_rate as f64) as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            let t = i as f64 / sample_rate as f64;
            let s = (0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 32767.0) as i16;
            for _ in 0..channels {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    SourceMedia::new(name, "audio/wav", cursor.into_inner())
}

fn corrupt(name: &str) -> SourceMedia {
    let mut bytes = b"RIFF\x10\x00\x00\x00WAVE".to_vec();
    bytes.extend(std::iter::repeat_n(0xAB, 500));
    SourceMedia::new(name, "audio/wav", bytes)
}

fn settings(rate: SampleRate, depth: BitDepth, channels: ChannelMode) -> ConversionSettings {
    ConversionSettings::new(TargetFormat::Wav, rate, depth, channels)
}

fn fast_converter() -> Converter {
    Converter::new(OfflineConfig::fast()).unwrap()
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Linear resampler that cancels the run on its `trigger`-th call
struct CancelOnCall {
    calls: AtomicUsize,
    trigger: usize,
}

impl Resampler for CancelOnCall {
    fn name(&self) -> &'static str {
        "cancel-on-call"
    }

    fn render(&self, request: RenderRequest<'_>, cancel: &CancelToken) -> OfflineResult<PcmBuffer> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.trigger {
            cancel.cancel();
        }
        LinearResampler.render(request, cancel)
    }
}

/// Linear resampler that parks until released
struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Resampler for Gate {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn render(&self, request: RenderRequest<'_>, cancel: &CancelToken) -> OfflineResult<PcmBuffer> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(Duration::from_secs(10));
        LinearResampler.render(request, cancel)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE ISOLATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_corrupt_job_does_not_stop_batch() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![
            tone_wav("a.wav", 2, 44100, 0.5),
            corrupt("b.wav"),
            tone_wav("c.wav", 1, 48000, 0.5),
        ])
        .into_result()
        .unwrap();

    let summary = converter.start(ConversionSettings::default()).unwrap();
    assert_eq!((summary.done, summary.failed), (2, 1));
    assert!(!summary.cancelled);

    let statuses: Vec<_> = ids.iter().map(|&id| converter.status(id).unwrap()).collect();
    assert_eq!(statuses, vec![JobStatus::Done, JobStatus::Error, JobStatus::Done]);

    let queue = converter.queue();
    let queue = queue.read();
    let failed = queue.get(ids[1]).unwrap();
    assert!(failed.result().is_none());
    assert!(failed.error().is_some());
    assert!(queue.get(ids[0]).unwrap().error().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cancel_during_third_job() {
    let converter = fast_converter().with_resampler(Box::new(CancelOnCall {
        calls: AtomicUsize::new(0),
        trigger: 3,
    }));
    let events = converter.subscribe();
    let ids = converter
        .submit((0..5).map(|i| tone_wav(&format!("{}.wav", i), 1, 22050, 0.25)))
        .into_result()
        .unwrap();

    let summary = converter.start(ConversionSettings::default()).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.done, 2);

    let statuses: Vec<_> = ids.iter().map(|&id| converter.status(id).unwrap()).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Done,
            JobStatus::Done,
            JobStatus::Waiting,
            JobStatus::Waiting,
            JobStatus::Waiting
        ]
    );

    let received: Vec<BatchEvent> = events.try_iter().collect();
    let started: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            BatchEvent::JobStarted { id, .. } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(started, ids[..3].to_vec());
    assert!(received.contains(&BatchEvent::JobRequeued { id: ids[2] }));

    // A fresh run resumes from the first waiting job.
    let summary = converter.start(ConversionSettings::default()).unwrap();
    assert_eq!(summary.done, 3);
    assert!(ids.iter().all(|&id| converter.status(id) == Some(JobStatus::Done)));
}

#[test]
fn test_cancel_from_another_thread() {
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let converter = Arc::new(fast_converter().with_resampler(Box::new(Gate {
        entered: entered_tx,
        release: release_rx,
    })));
    let ids = converter
        .submit(vec![tone_wav("a.wav", 1, 8000, 0.1), tone_wav("b.wav", 1, 8000, 0.1)])
        .into_result()
        .unwrap();

    let runner = {
        let converter = Arc::clone(&converter);
        thread::spawn(move || converter.start(ConversionSettings::default()))
    };

    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(converter.is_running());
    assert_eq!(converter.status(ids[0]), Some(JobStatus::Processing));

    // Only one run at a time, and the processing job is locked.
    assert!(matches!(
        converter.start(ConversionSettings::default()),
        Err(OfflineError::AlreadyRunning)
    ));
    assert!(matches!(
        converter.remove(ids[0]),
        Err(OfflineError::InvalidTransition { .. })
    ));

    converter.cancel();
    release_tx.send(()).unwrap();

    let summary = runner.join().unwrap().unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.done, 0);
    assert_eq!(converter.status(ids[0]), Some(JobStatus::Waiting));
    assert_eq!(converter.status(ids[1]), Some(JobStatus::Waiting));
    assert!(!converter.is_running());
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRIM
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_trim_outside_source_falls_back() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![tone_wav("long.wav", 1, 8000, 20.0)])
        .into_result()
        .unwrap();

    // Unprobed, so the range is not clamped at edit time.
    converter.set_trim(ids[0], 30.0, 40.0).unwrap();
    converter.start(ConversionSettings::default()).unwrap();

    let result = converter.take_result(ids[0]).unwrap();
    assert_abs_diff_eq!(result.duration_secs, 20.0, epsilon = 1e-3);
    assert!(result.trim.is_none());
    assert_eq!(
        result.diagnostics,
        vec![Diagnostic::TrimFallback {
            requested_start: 30.0,
            requested_end: 40.0
        }]
    );
}

#[test]
fn test_trimmed_result_records_provenance() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![tone_wav("song.mp3", 2, 48000, 4.0)])
        .into_result()
        .unwrap();
    assert_eq!(converter.probe_all(), 1);
    converter.set_trim(ids[0], 1.0, 2.5).unwrap();

    converter
        .start(settings(SampleRate::Hz48000, BitDepth::TwentyFour, ChannelMode::Stereo))
        .unwrap();

    let result = converter.take_result(ids[0]).unwrap();
    assert_eq!(result.output_name, "song.wav");
    assert_abs_diff_eq!(result.duration_secs, 1.5, epsilon = 1e-9);
    assert_eq!(result.byte_size, 44 + 72_000 * 2 * 3);

    let trim = result.trim.unwrap();
    assert_abs_diff_eq!(trim.trim_start, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(trim.trim_end, 2.5, epsilon = 1e-9);
    assert_abs_diff_eq!(trim.original_duration, 4.0, epsilon = 1e-9);
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT CONTAINER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_output_header_is_canonical() {
    let converter = fast_converter();
    let source = tone_wav("in.wav", 2, 44100, 0.25);
    let input: Vec<i16> = hound::WavReader::new(Cursor::new(source.data.to_vec()))
        .unwrap()
        .into_samples::<i16>()
        .map(Result::unwrap)
        .collect();
    let ids = converter.submit(vec![source]).into_result().unwrap();
    converter
        .start(settings(SampleRate::Hz44100, BitDepth::Sixteen, ChannelMode::Stereo))
        .unwrap();

    let bytes = converter.take_result(ids[0]).unwrap().bytes;
    let frames = 11_025usize;
    assert_eq!(bytes.len(), 44 + frames * 2 * 2);
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);
    assert_eq!(&bytes[8..16], b"WAVEfmt ");
    assert_eq!(u32_at(&bytes, 16), 16);
    assert_eq!(u16_at(&bytes, 20), 1);
    assert_eq!(u16_at(&bytes, 22), 2);
    assert_eq!(u32_at(&bytes, 24), 44100);
    assert_eq!(u32_at(&bytes, 28), 44100 * 4);
    assert_eq!(u16_at(&bytes, 32), 4);
    assert_eq!(u16_at(&bytes, 34), 16);
    assert_eq!(&bytes[36..40], b"data");
    assert_eq!(u32_at(&bytes, 40) as usize, frames * 4);

    // Same-rate conversion keeps every sample within one LSB of the source;
    // only the asymmetric positive scale can round a step down.
    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.spec().channels, 2);
    let output: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(output.len(), input.len());
    for (i, (got, want)) in output.iter().zip(&input).enumerate() {
        assert!((*got as i32 - *want as i32).abs() <= 1, "sample {}: {} vs {}", i, got, want);
        if *want <= 0 {
            assert_eq!(got, want, "sample {}", i);
        }
    }
}

#[test]
fn test_mono_target_from_stereo_source() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![tone_wav("in.wav", 2, 48000, 0.5)])
        .into_result()
        .unwrap();
    converter
        .start(settings(SampleRate::Hz44100, BitDepth::TwentyFour, ChannelMode::Mono))
        .unwrap();

    let result = converter.take_result(ids[0]).unwrap();
    assert_eq!(result.format.to_string(), "WAV 44100 Hz / 24-bit / mono");
    assert_eq!(result.byte_size, 44 + 22_050 * 3);

    let mut reader = hound::WavReader::new(Cursor::new(result.bytes)).unwrap();
    assert_eq!(reader.spec().bits_per_sample, 24);
    let peak = reader
        .samples::<i32>()
        .map(|s| s.unwrap().abs())
        .max()
        .unwrap();
    // 0.5 amplitude tone, allowing for interpolation between samples.
    assert!((peak as f64 / 8_388_607.0 - 0.5).abs() < 0.01);
}

#[test]
fn test_non_wav_label_still_encodes_wav() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![tone_wav("clip.wav", 1, 44100, 0.1)])
        .into_result()
        .unwrap();
    converter
        .start(ConversionSettings::new(
            TargetFormat::Mp3,
            SampleRate::Hz44100,
            BitDepth::Sixteen,
            ChannelMode::Stereo,
        ))
        .unwrap();

    let result = converter.take_result(ids[0]).unwrap();
    assert_eq!(result.format.label, TargetFormat::Mp3);
    assert_eq!(result.output_name, "clip.wav");
    assert_eq!(&result.bytes[0..4], b"RIFF");
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUEUE SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_remove_clear_and_release() {
    let converter = fast_converter();
    let ids = converter
        .submit(vec![
            tone_wav("a.wav", 1, 8000, 0.1),
            tone_wav("b.wav", 1, 8000, 0.1),
            tone_wav("c.wav", 1, 8000, 0.1),
        ])
        .into_result()
        .unwrap();

    converter.remove(ids[1]).unwrap();
    assert!(matches!(converter.remove(ids[1]), Err(OfflineError::JobNotFound(_))));

    let summary = converter.start(ConversionSettings::default()).unwrap();
    assert_eq!(summary.done, 2);

    assert!(converter.take_result(ids[0]).is_some());
    assert!(converter.take_result(ids[0]).is_none());

    assert_eq!(converter.clear(), 2);
    assert!(converter.queue().read().is_empty());
    assert!(converter.take_result(ids[2]).is_none());
}

#[test]
fn test_submission_rejections_are_reported() {
    let converter = Converter::new(OfflineConfig::fast().with_max_input_bytes(2048)).unwrap();
    let report = converter.submit(vec![
        tone_wav("big.wav", 2, 44100, 1.0),
        SourceMedia::new("readme.txt", "text/plain", b"hello".to_vec()),
        tone_wav("ok.wav", 1, 8000, 0.01),
    ]);

    assert_eq!(report.accepted.len(), 1);
    let names: Vec<_> = report.rejected.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["big.wav", "readme.txt"]);
    assert_eq!(converter.queue().read().len(), 1);
}
