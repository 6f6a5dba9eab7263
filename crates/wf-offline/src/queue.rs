//! Ordered job collection with an explicit transition API
//!
//! The queue owns every job. Callers may edit jobs that are not
//! processing; the batch runner drives `begin`/`complete`/`fail`. Any
//! mutation that would touch a processing job is rejected.

use std::fmt;

use crate::decoder::ProbeInfo;
use crate::error::{OfflineError, OfflineResult};
use crate::job::{ConversionResult, Job, JobId, JobStatus, MediaKind, SourceMedia};
use crate::trim::TrimRange;

// ═══════════════════════════════════════════════════════════════════════════════
// SUBMISSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a submitted file was not queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    TooLarge { size: u64, limit: u64 },
    UnsupportedType { mime_type: String },
}

/// Submission-time rejection; no job is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub name: String,
    pub reason: ValidationReason,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ValidationReason::TooLarge { size, limit } => write!(
                f,
                "{}: {} bytes exceeds the {} byte limit",
                self.name, size, limit
            ),
            ValidationReason::UnsupportedType { mime_type } if mime_type.is_empty() => {
                write!(f, "{}: not an audio or video file", self.name)
            }
            ValidationReason::UnsupportedType { mime_type } => {
                write!(f, "{}: unsupported type '{}'", self.name, mime_type)
            }
        }
    }
}

/// Outcome of one submission batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub accepted: Vec<JobId>,
    pub rejected: Vec<ValidationError>,
}

impl SubmitReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Accepted ids, or every rejection joined into one validation error
    pub fn into_result(self) -> OfflineResult<Vec<JobId>> {
        if self.rejected.is_empty() {
            return Ok(self.accepted);
        }
        let messages: Vec<String> = self.rejected.iter().map(|e| e.to_string()).collect();
        Err(OfflineError::Validation(messages.join("; ")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered, exclusively owned job list
#[derive(Debug)]
pub struct JobQueue {
    jobs: Vec<Job>,
    next_id: JobId,
    max_input_bytes: u64,
}

impl JobQueue {
    pub fn new(max_input_bytes: u64) -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
            max_input_bytes,
        }
    }

    pub fn set_max_input_bytes(&mut self, limit: u64) {
        self.max_input_bytes = limit;
    }

    /// Validate and enqueue sources in order
    pub fn submit(&mut self, sources: impl IntoIterator<Item = SourceMedia>) -> SubmitReport {
        let mut report = SubmitReport::default();

        for source in sources {
            if source.size() > self.max_input_bytes {
                report.rejected.push(ValidationError {
                    reason: ValidationReason::TooLarge {
                        size: source.size(),
                        limit: self.max_input_bytes,
                    },
                    name: source.name,
                });
                continue;
            }

            let Some(kind) = MediaKind::classify(&source.name, &source.mime_type) else {
                report.rejected.push(ValidationError {
                    reason: ValidationReason::UnsupportedType {
                        mime_type: source.mime_type.trim().to_string(),
                    },
                    name: source.name,
                });
                continue;
            };

            let id = self.next_id;
            self.next_id += 1;
            log::debug!("Queued job {} ({}, {} bytes)", id, source.name, source.size());
            self.jobs.push(Job::new(id, source, kind));
            report.accepted.push(id);
        }

        for rejection in &report.rejected {
            log::warn!("Rejected {}", rejection);
        }

        report
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Ids of jobs a run would pick up, in submission order
    pub fn eligible_ids(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| j.status.is_eligible())
            .map(|j| j.id)
            .collect()
    }

    /// The job currently processing, if any
    pub fn processing(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status == JobStatus::Processing)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    fn job_mut(&mut self, id: JobId) -> OfflineResult<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(OfflineError::JobNotFound(id))
    }

    fn require(
        &mut self,
        id: JobId,
        allowed: &[JobStatus],
        action: &'static str,
    ) -> OfflineResult<&mut Job> {
        let job = self.job_mut(id)?;
        if !allowed.contains(&job.status) {
            return Err(OfflineError::InvalidTransition {
                id,
                status: job.status,
                action,
            });
        }
        Ok(job)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Caller edits
    // ───────────────────────────────────────────────────────────────────────────

    /// Set trim bounds in seconds. Only waiting jobs can be trimmed.
    pub fn set_trim(&mut self, id: JobId, start: f64, end: f64) -> OfflineResult<()> {
        let job = self.require(id, &[JobStatus::Waiting], "set trim")?;

        if !start.is_finite() || !end.is_finite() {
            return Err(OfflineError::InvalidTrim {
                start,
                end,
                reason: "bounds must be finite",
            });
        }
        if start < 0.0 {
            return Err(OfflineError::InvalidTrim {
                start,
                end,
                reason: "start is negative",
            });
        }

        let end = match job.source_duration() {
            Some(duration) => end.min(duration),
            None => end,
        };
        if start >= end {
            return Err(OfflineError::InvalidTrim {
                start,
                end,
                reason: "start must be before end",
            });
        }

        job.trim = Some(TrimRange::new(start, end));
        Ok(())
    }

    /// Back to the full range (`[0, duration]` when probed)
    pub fn reset_trim(&mut self, id: JobId) -> OfflineResult<()> {
        let job = self.require(id, &[JobStatus::Waiting], "reset trim")?;
        job.trim = job.source_duration().map(|d| TrimRange::new(0.0, d));
        Ok(())
    }

    /// Change the display name; the output name follows it
    pub fn rename(&mut self, id: JobId, name: impl Into<String>) -> OfflineResult<()> {
        let name = name.into();
        let job = self.require(id, &[JobStatus::Waiting, JobStatus::Error], "rename")?;
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(OfflineError::InvalidConfig("Display name must not be empty".to_string()));
        }
        job.display_name = trimmed.to_string();
        Ok(())
    }

    /// Move a failed job back to waiting
    pub fn requeue(&mut self, id: JobId) -> OfflineResult<()> {
        let job = self.require(id, &[JobStatus::Error], "requeue")?;
        job.reset();
        Ok(())
    }

    /// Requeue every failed job, returning how many moved
    pub fn requeue_failed(&mut self) -> usize {
        let mut moved = 0;
        for job in self.jobs.iter_mut().filter(|j| j.status == JobStatus::Error) {
            job.reset();
            moved += 1;
        }
        moved
    }

    /// Attach probe data and seed full-range trim bounds if none are set.
    /// Only queued jobs (waiting or failed) accept probe data.
    pub fn apply_probe(&mut self, id: JobId, probe: ProbeInfo) -> OfflineResult<()> {
        let job = self.require(id, &[JobStatus::Waiting, JobStatus::Error], "apply probe")?;
        job.probe = Some(probe);
        if job.trim.is_none() && job.status == JobStatus::Waiting {
            job.trim = probe
                .duration_secs
                .filter(|d| *d > 0.0)
                .map(|d| TrimRange::new(0.0, d));
        }
        Ok(())
    }

    /// Remove a job and release its payload
    pub fn remove(&mut self, id: JobId) -> OfflineResult<Job> {
        let index = self
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(OfflineError::JobNotFound(id))?;
        let status = self.jobs[index].status;
        if status == JobStatus::Processing {
            return Err(OfflineError::InvalidTransition {
                id,
                status,
                action: "remove",
            });
        }
        Ok(self.jobs.remove(index))
    }

    /// Drop every job except one that is processing; returns how many went
    pub fn clear(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.status == JobStatus::Processing);
        before - self.jobs.len()
    }

    /// Move the result payload out. The job stays done; later calls get `None`.
    pub fn take_result(&mut self, id: JobId) -> Option<ConversionResult> {
        self.job_mut(id).ok()?.result.take()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Runner transitions
    // ───────────────────────────────────────────────────────────────────────────

    /// Lease `id` for processing. Fails if another job already holds the lease.
    pub(crate) fn begin(&mut self, id: JobId) -> OfflineResult<&Job> {
        if let Some(current) = self.processing() {
            if current.id != id {
                return Err(OfflineError::InvalidTransition {
                    id,
                    status: self.get(id).map(|j| j.status).unwrap_or(JobStatus::Waiting),
                    action: "start while another job is processing",
                });
            }
        }
        let job = self.require(id, &[JobStatus::Waiting, JobStatus::Error], "start")?;
        job.begin();
        Ok(job)
    }

    pub(crate) fn set_progress(&mut self, id: JobId, progress: u8) {
        if let Ok(job) = self.job_mut(id) {
            if job.status == JobStatus::Processing {
                job.progress = progress.min(100);
            }
        }
    }

    pub(crate) fn complete(&mut self, id: JobId, result: ConversionResult) -> OfflineResult<()> {
        self.require(id, &[JobStatus::Processing], "complete")?.complete(result);
        Ok(())
    }

    pub(crate) fn fail(&mut self, id: JobId, detail: String) -> OfflineResult<()> {
        self.require(id, &[JobStatus::Processing], "fail")?.fail(detail);
        Ok(())
    }

    /// Return a cancelled job to waiting
    pub(crate) fn release(&mut self, id: JobId) -> OfflineResult<()> {
        self.require(id, &[JobStatus::Processing], "release")?.reset();
        Ok(())
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(crate::config::OfflineConfig::default().max_input_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ConversionSettings;

    fn source(name: &str, mime: &str) -> SourceMedia {
        SourceMedia::new(name, mime, vec![0u8; 16])
    }

    fn done_result() -> ConversionResult {
        ConversionResult {
            bytes: vec![1, 2, 3],
            output_name: "a.wav".to_string(),
            duration_secs: 1.0,
            byte_size: 3,
            format: ConversionSettings::default().descriptor(),
            trim: None,
            diagnostics: Vec::new(),
        }
    }

    fn probe(duration: f64) -> ProbeInfo {
        ProbeInfo {
            duration_secs: Some(duration),
            sample_rate: Some(44100),
            channels: Some(2),
            bitrate_estimate: None,
            size_bytes: 16,
        }
    }

    #[test]
    fn test_submit_validates() {
        let mut queue = JobQueue::new(100);
        let report = queue.submit(vec![
            source("a.wav", "audio/wav"),
            SourceMedia::new("huge.wav", "audio/wav", vec![0u8; 101]),
            source("doc.pdf", "application/pdf"),
            source("clip.mp4", ""),
            source("mystery", ""),
        ]);

        assert_eq!(report.accepted, vec![1, 2]);
        assert_eq!(report.rejected.len(), 3);
        assert_eq!(report.rejected[0].name, "huge.wav");
        assert_eq!(
            report.rejected[0].reason,
            ValidationReason::TooLarge { size: 101, limit: 100 }
        );
        assert!(matches!(
            report.rejected[1].reason,
            ValidationReason::UnsupportedType { .. }
        ));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(2).unwrap().kind(), MediaKind::Video);
        assert!(matches!(report.into_result(), Err(OfflineError::Validation(_))));
    }

    #[test]
    fn test_ids_are_unique_after_removal() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav")]);
        queue.remove(1).unwrap();
        let report = queue.submit(vec![source("b.wav", "audio/wav")]);
        assert_eq!(report.into_result().unwrap(), vec![2]);
    }

    #[test]
    fn test_set_trim_rules() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav")]);

        assert!(queue.set_trim(1, 1.0, 2.0).is_ok());
        assert_eq!(queue.get(1).unwrap().trim(), Some(TrimRange::new(1.0, 2.0)));
        assert!(matches!(
            queue.set_trim(1, 2.0, 1.0),
            Err(OfflineError::InvalidTrim { .. })
        ));
        assert!(queue.set_trim(1, -1.0, 1.0).is_err());
        assert!(queue.set_trim(1, f64::NAN, 1.0).is_err());
        assert!(matches!(queue.set_trim(9, 0.0, 1.0), Err(OfflineError::JobNotFound(9))));

        queue.apply_probe(1, probe(10.0)).unwrap();
        queue.set_trim(1, 4.0, 60.0).unwrap();
        assert_eq!(queue.get(1).unwrap().trim(), Some(TrimRange::new(4.0, 10.0)));
        assert!(queue.set_trim(1, 12.0, 60.0).is_err());

        queue.reset_trim(1).unwrap();
        assert_eq!(queue.get(1).unwrap().trim(), Some(TrimRange::new(0.0, 10.0)));
    }

    #[test]
    fn test_probe_seeds_trim_once() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav"), source("b.wav", "audio/wav")]);
        queue.apply_probe(1, probe(5.0)).unwrap();
        assert_eq!(queue.get(1).unwrap().trim(), Some(TrimRange::new(0.0, 5.0)));

        queue.set_trim(2, 1.0, 2.0).unwrap();
        queue.apply_probe(2, probe(5.0)).unwrap();
        assert_eq!(queue.get(2).unwrap().trim(), Some(TrimRange::new(1.0, 2.0)));
    }

    #[test]
    fn test_processing_job_is_locked() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav"), source("b.wav", "audio/wav")]);
        queue.begin(1).unwrap();

        assert!(matches!(
            queue.remove(1),
            Err(OfflineError::InvalidTransition { action: "remove", .. })
        ));
        assert!(queue.set_trim(1, 0.0, 1.0).is_err());
        assert!(queue.rename(1, "x").is_err());
        assert!(matches!(
            queue.apply_probe(1, probe(3.0)),
            Err(OfflineError::InvalidTransition { action: "apply probe", .. })
        ));
        assert!(queue.get(1).unwrap().probe().is_none());
        assert!(queue.begin(2).is_err());
        assert_eq!(queue.processing().map(|j| j.id()), Some(1));

        assert_eq!(queue.clear(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(1).unwrap().status(), JobStatus::Processing);
    }

    #[test]
    fn test_lifecycle_and_take_result() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav"), source("b.wav", "audio/wav")]);

        queue.begin(1).unwrap();
        queue.set_progress(1, 40);
        assert_eq!(queue.get(1).unwrap().progress(), 40);
        queue.complete(1, done_result()).unwrap();
        assert!(queue.apply_probe(1, probe(2.0)).is_err());

        queue.begin(2).unwrap();
        queue.fail(2, "Decode failed: nope".to_string()).unwrap();
        assert_eq!(queue.get(2).unwrap().error(), Some("Decode failed: nope"));
        assert_eq!(queue.eligible_ids(), vec![2]);

        assert!(queue.set_trim(2, 0.0, 1.0).is_err());
        queue.apply_probe(2, probe(2.0)).unwrap();
        assert!(queue.get(2).unwrap().trim().is_none());
        queue.rename(2, "  renamed.ogg ").unwrap();
        assert_eq!(queue.get(2).unwrap().display_name(), "renamed.ogg");
        assert_eq!(queue.requeue_failed(), 1);
        assert_eq!(queue.get(2).unwrap().status(), JobStatus::Waiting);
        assert!(queue.get(2).unwrap().error().is_none());
        assert!(queue.requeue(2).is_err());

        let result = queue.take_result(1).unwrap();
        assert_eq!(result.bytes, vec![1, 2, 3]);
        assert!(queue.take_result(1).is_none());
        assert_eq!(queue.get(1).unwrap().status(), JobStatus::Done);
    }

    #[test]
    fn test_release_returns_to_waiting() {
        let mut queue = JobQueue::new(1000);
        queue.submit(vec![source("a.wav", "audio/wav")]);
        queue.begin(1).unwrap();
        queue.set_progress(1, 55);
        queue.release(1).unwrap();

        let job = queue.get(1).unwrap();
        assert_eq!(job.status(), JobStatus::Waiting);
        assert_eq!(job.progress(), 0);
        assert_eq!(queue.count(JobStatus::Waiting), 1);
    }
}
