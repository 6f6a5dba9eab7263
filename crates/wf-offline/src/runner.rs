//! Sequential batch runner
//!
//! [`Converter`] is the batch control surface. It owns the job queue behind
//! a lock, runs eligible jobs one at a time in submission order and
//! publishes [`BatchEvent`]s to subscribers.
//!
//! The queue lock is held only for state transitions, never while a job is
//! decoding, rendering or encoding. A second `start` while a run is active
//! fails with [`OfflineError::AlreadyRunning`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::OfflineConfig;
use crate::decoder::AudioDecoder;
use crate::error::{OfflineError, OfflineResult};
use crate::formats::ConversionSettings;
use crate::job::{ConversionResult, JobId, JobStatus, SourceMedia};
use crate::pipeline::ConversionPipeline;
use crate::queue::{JobQueue, SubmitReport};
use crate::resample::{self, Resampler};
use crate::waveform::waveform_peaks;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Progress notifications from a batch run
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    RunStarted {
        jobs: usize,
    },
    JobStarted {
        id: JobId,
        index: usize,
        total: usize,
    },
    JobProgress {
        id: JobId,
        percent: u8,
    },
    JobDone {
        id: JobId,
        output_name: String,
        byte_size: u64,
        duration_secs: f64,
    },
    JobFailed {
        id: JobId,
        error: String,
    },
    /// Cancelled mid-job; the job is waiting again
    JobRequeued {
        id: JobId,
    },
    RunFinished(BatchSummary),
}

/// Outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub done: usize,
    pub failed: usize,
    /// Snapshot entries no longer eligible when their turn came
    pub skipped: usize,
    /// Run halted by cancellation
    pub cancelled: bool,
}

impl BatchSummary {
    /// Every job converted and nothing was cancelled
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUN GUARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Holds the single run slot; released on drop
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Batch control surface over a [`JobQueue`]
pub struct Converter {
    queue: Arc<RwLock<JobQueue>>,
    config: OfflineConfig,
    resampler: Box<dyn Resampler>,
    cancel: Mutex<CancelToken>,
    running: AtomicBool,
    subscribers: Mutex<Vec<Sender<BatchEvent>>>,
}

impl Converter {
    /// Create a converter with an empty queue
    pub fn new(config: OfflineConfig) -> OfflineResult<Self> {
        config.validate()?;
        Ok(Self {
            queue: Arc::new(RwLock::new(JobQueue::new(config.max_input_bytes))),
            resampler: resample::resampler_for_quality(config.src_quality),
            config,
            cancel: Mutex::new(CancelToken::new()),
            running: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Replace the resampler chosen from the config
    pub fn with_resampler(mut self, resampler: Box<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// Shared handle to the queue for inspection and caller edits
    pub fn queue(&self) -> Arc<RwLock<JobQueue>> {
        Arc::clone(&self.queue)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> Receiver<BatchEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn emit(&self, event: BatchEvent) {
        // Dropped receivers unsubscribe.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Queue operations
    // ───────────────────────────────────────────────────────────────────────────

    pub fn submit(&self, sources: impl IntoIterator<Item = SourceMedia>) -> SubmitReport {
        self.queue.write().submit(sources)
    }

    /// Remove a job and release its payload. Rejected while it is processing.
    pub fn remove(&self, id: JobId) -> OfflineResult<()> {
        self.queue.write().remove(id).map(|job| {
            log::debug!("Removed job {} ({})", id, job.display_name());
        })
    }

    /// Drop every job that is not processing, releasing all payloads
    pub fn clear(&self) -> usize {
        self.queue.write().clear()
    }

    pub fn set_trim(&self, id: JobId, start: f64, end: f64) -> OfflineResult<()> {
        self.queue.write().set_trim(id, start, end)
    }

    /// Move a result payload out to the caller
    pub fn take_result(&self, id: JobId) -> Option<ConversionResult> {
        self.queue.write().take_result(id)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.queue.read().get(id).map(|j| j.status())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Batch run
    // ───────────────────────────────────────────────────────────────────────────

    /// Request cancellation of the active run
    pub fn cancel(&self) {
        if self.is_running() {
            log::info!("Cancellation requested");
        }
        self.cancel.lock().cancel();
    }

    /// Run every waiting or failed job, in order, with `settings`.
    ///
    /// Blocks until the run finishes or is cancelled. Job failures are
    /// recorded on the job and do not stop the run.
    pub fn start(&self, settings: ConversionSettings) -> OfflineResult<BatchSummary> {
        // The token lock is held across acquire and swap so a `cancel` racing
        // with startup lands on this run's token.
        let (_guard, cancel) = {
            let mut token = self.cancel.lock();
            let guard = RunGuard::acquire(&self.running).ok_or(OfflineError::AlreadyRunning)?;
            *token = CancelToken::new();
            (guard, token.clone())
        };

        let ids = self.queue.read().eligible_ids();
        let total = ids.len();
        log::info!(
            "Batch started: {} job(s) -> {} ({})",
            total,
            settings.descriptor(),
            self.resampler.name()
        );
        self.emit(BatchEvent::RunStarted { jobs: total });

        let pipeline = ConversionPipeline::new(settings, &self.config, self.resampler.as_ref());
        let mut summary = BatchSummary::default();

        for (index, &id) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let lease = {
                let mut queue = self.queue.write();
                match queue.get(id).map(|j| j.status()) {
                    Some(status) if status.is_eligible() => queue
                        .begin(id)
                        .map(|job| (job.source().clone(), job.display_name().to_string(), job.trim())),
                    _ => Err(OfflineError::JobNotFound(id)),
                }
            };
            let (source, name, trim) = match lease {
                Ok(lease) => lease,
                Err(e) => {
                    log::debug!("Skipping job {}: {}", id, e);
                    summary.skipped += 1;
                    continue;
                }
            };

            log::info!("[{}/{}] Converting {}", index + 1, total, name);
            self.emit(BatchEvent::JobStarted { id, index, total });

            let mut last_percent = 0u8;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                pipeline.convert(&source, &name, trim, &cancel, &mut |percent| {
                    if percent != last_percent {
                        last_percent = percent;
                        self.queue.write().set_progress(id, percent);
                        self.emit(BatchEvent::JobProgress { id, percent });
                    }
                })
            }))
            .unwrap_or_else(|payload| {
                Err(OfflineError::Panicked(panic_message(payload.as_ref())))
            });

            match outcome {
                Ok(result) => {
                    let event = BatchEvent::JobDone {
                        id,
                        output_name: result.output_name.clone(),
                        byte_size: result.byte_size,
                        duration_secs: result.duration_secs,
                    };
                    for note in &result.diagnostics {
                        log::warn!("{}: {}", name, note);
                    }
                    log::info!(
                        "{} -> {} ({} bytes, {})",
                        name,
                        result.output_name,
                        result.byte_size,
                        wf_core::format_duration(result.duration_secs)
                    );
                    self.transition(self.queue.write().complete(id, result));
                    summary.done += 1;
                    self.emit(event);
                }
                Err(e) if e.is_cancellation() => {
                    log::info!("{}: cancelled, returned to queue", name);
                    self.transition(self.queue.write().release(id));
                    self.emit(BatchEvent::JobRequeued { id });
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    let detail = e.to_string();
                    log::warn!("{}: {}", name, detail);
                    self.transition(self.queue.write().fail(id, detail.clone()));
                    summary.failed += 1;
                    self.emit(BatchEvent::JobFailed { id, error: detail });
                }
            }
        }

        log::info!(
            "Batch finished: {} done, {} failed, {} skipped{}",
            summary.done,
            summary.failed,
            summary.skipped,
            if summary.cancelled { ", cancelled" } else { "" }
        );
        self.emit(BatchEvent::RunFinished(summary));

        Ok(summary)
    }

    fn transition(&self, result: OfflineResult<()>) {
        if let Err(e) = result {
            log::error!("Job state transition failed: {}", e);
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Best-effort helpers
    // ───────────────────────────────────────────────────────────────────────────

    /// Probe every job that has no probe data yet. Failures are logged and
    /// leave the job untouched. Returns how many jobs were probed.
    pub fn probe_all(&self) -> usize {
        let pending: Vec<(JobId, SourceMedia)> = self
            .queue
            .read()
            .jobs()
            .iter()
            .filter(|j| {
                j.probe().is_none() && matches!(j.status(), JobStatus::Waiting | JobStatus::Error)
            })
            .map(|j| (j.id(), j.source().clone()))
            .collect();

        let mut probed = 0;
        for (id, source) in pending {
            match AudioDecoder::probe(source.data.clone(), &source.hint()) {
                Ok(info) => {
                    if self.queue.write().apply_probe(id, info).is_ok() {
                        probed += 1;
                    }
                }
                Err(e) => log::warn!("Probe failed for {}: {}", source.name, e),
            }
        }
        probed
    }

    /// Peak summary for display, `None` when the source is too large or
    /// does not decode
    pub fn waveform(&self, id: JobId) -> Option<Vec<f32>> {
        let source = self.queue.read().get(id)?.source().clone();
        if source.size() > self.config.waveform_max_bytes {
            log::debug!("{}: too large for a waveform preview", source.name);
            return None;
        }

        match AudioDecoder::decode(
            source.data.clone(),
            &source.hint(),
            self.config.max_decoded_frames,
            &CancelToken::new(),
        ) {
            Ok(buffer) => Some(waveform_peaks(&buffer, self.config.waveform_buckets)),
            Err(e) => {
                log::warn!("Waveform failed for {}: {}", source.name, e);
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
