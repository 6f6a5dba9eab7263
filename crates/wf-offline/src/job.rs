//! Conversion job definitions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decoder::{AUDIO_EXTENSIONS, MediaHint, ProbeInfo, VIDEO_EXTENSIONS};
use crate::formats::FormatDescriptor;
use crate::trim::TrimRange;

/// Unique job identifier
pub type JobId = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE MEDIA
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of submitted media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    /// Audio track inside a video container
    Video,
}

impl MediaKind {
    /// Classify by MIME type, falling back to the name's extension when the
    /// MIME type is empty. `None` means the input is neither audio nor video.
    pub fn classify(name: &str, mime_type: &str) -> Option<Self> {
        let mime = mime_type.trim().to_ascii_lowercase();
        if !mime.is_empty() {
            return if mime.starts_with("audio/") {
                Some(Self::Audio)
            } else if mime.starts_with("video/") {
                Some(Self::Video)
            } else {
                None
            };
        }

        let ext = MediaHint::new(name, "").extension?;
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Raw input handed to the queue. Bytes are shared, never copied.
#[derive(Clone)]
pub struct SourceMedia {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl SourceMedia {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn hint(&self) -> MediaHint {
        MediaHint::new(&self.name, &self.mime_type)
    }
}

impl fmt::Debug for SourceMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMedia")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS & RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Eligible for the next run
    Waiting,
    /// Currently converting (at most one job at a time)
    Processing,
    /// Completed, result available
    Done,
    /// Failed; eligible again on the next run
    Error,
}

impl JobStatus {
    /// Picked up by a batch run
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Waiting | Self::Error)
    }
}

/// Non-fatal note attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Requested trim was empty after clamping; the full source was converted
    TrimFallback {
        requested_start: f64,
        requested_end: f64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrimFallback {
                requested_start,
                requested_end,
            } => write!(
                f,
                "trim {:.3}s..{:.3}s was empty, converted full length",
                requested_start, requested_end
            ),
        }
    }
}

/// Where a trimmed result came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimProvenance {
    pub trim_start: f64,
    pub trim_end: f64,
    /// Decoded source length in seconds
    pub original_duration: f64,
}

/// Output of one successful job
#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Encoded container bytes
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub output_name: String,
    pub duration_secs: f64,
    pub byte_size: u64,
    pub format: FormatDescriptor,
    /// Present iff the job was trimmed
    pub trim: Option<TrimProvenance>,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionResult")
            .field("output_name", &self.output_name)
            .field("duration_secs", &self.duration_secs)
            .field("byte_size", &self.byte_size)
            .field("format", &self.format)
            .field("trim", &self.trim)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB
// ═══════════════════════════════════════════════════════════════════════════════

/// One conversion unit.
///
/// Fields are read through accessors; every mutation goes through
/// [`JobQueue`](crate::queue::JobQueue) so status rules hold.
#[derive(Debug)]
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) source: SourceMedia,
    pub(crate) kind: MediaKind,
    pub(crate) display_name: String,
    pub(crate) probe: Option<ProbeInfo>,
    pub(crate) status: JobStatus,
    pub(crate) progress: u8,
    pub(crate) trim: Option<TrimRange>,
    pub(crate) result: Option<ConversionResult>,
    pub(crate) error: Option<String>,
}

impl Job {
    pub(crate) fn new(id: JobId, source: SourceMedia, kind: MediaKind) -> Self {
        Self {
            id,
            display_name: source.name.clone(),
            source,
            kind,
            probe: None,
            status: JobStatus::Waiting,
            progress: 0,
            trim: None,
            result: None,
            error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &SourceMedia {
        &self.source
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn probe(&self) -> Option<&ProbeInfo> {
        self.probe.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// 0-100, meaningful only while processing
    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn trim(&self) -> Option<TrimRange> {
        self.trim
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Duration from probe data, if any
    pub fn source_duration(&self) -> Option<f64> {
        self.probe.and_then(|p| p.duration_secs)
    }

    pub(crate) fn begin(&mut self) {
        self.status = JobStatus::Processing;
        self.progress = 0;
        self.result = None;
        self.error = None;
    }

    pub(crate) fn complete(&mut self, result: ConversionResult) {
        self.status = JobStatus::Done;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
    }

    pub(crate) fn fail(&mut self, detail: String) {
        self.status = JobStatus::Error;
        self.progress = 0;
        self.result = None;
        self.error = Some(detail);
    }

    pub(crate) fn reset(&mut self) {
        self.status = JobStatus::Waiting;
        self.progress = 0;
        self.result = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_mime() {
        assert_eq!(MediaKind::classify("x.bin", "audio/mpeg"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::classify("x.wav", "Video/MP4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::classify("x.wav", "application/pdf"), None);
    }

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(MediaKind::classify("take.FLAC", ""), Some(MediaKind::Audio));
        assert_eq!(MediaKind::classify("clip.mkv", " "), Some(MediaKind::Video));
        assert_eq!(MediaKind::classify("notes.txt", ""), None);
        assert_eq!(MediaKind::classify("noext", ""), None);
    }

    #[test]
    fn test_new_job_defaults() {
        let source = SourceMedia::new("a.wav", "audio/wav", vec![1u8, 2, 3]);
        let job = Job::new(7, source, MediaKind::Audio);
        assert_eq!(job.id(), 7);
        assert_eq!(job.display_name(), "a.wav");
        assert_eq!(job.status(), JobStatus::Waiting);
        assert_eq!(job.source().size(), 3);
        assert!(job.result().is_none() && job.error().is_none());
    }

    #[test]
    fn test_eligibility() {
        assert!(JobStatus::Waiting.is_eligible());
        assert!(JobStatus::Error.is_eligible());
        assert!(!JobStatus::Processing.is_eligible());
        assert!(!JobStatus::Done.is_eligible());
    }
}
