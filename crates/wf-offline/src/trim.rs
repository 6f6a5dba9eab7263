//! Time-range trimming
//!
//! Turns caller-supplied bounds in seconds into a frame slice of the decoded
//! buffer. Bounds are advisory UI state: a degenerate request falls back to
//! the whole buffer and is reported as a [`TrimOutcome::FellBack`] instead
//! of failing the job.

use serde::{Deserialize, Serialize};

/// Requested trim range in seconds, `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Range length in seconds (may be negative for inverted input)
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// How the requested range was resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimOutcome {
    /// No range requested
    Full,
    /// Requested range applied
    Applied(TrimRange),
    /// Requested range was degenerate; the whole buffer is used
    FellBack(TrimRange),
}

/// Validated frame slice, `start_frame < end_frame` always holds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimSlice {
    pub start_frame: usize,
    pub end_frame: usize,
    pub outcome: TrimOutcome,
}

impl TrimSlice {
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.end_frame - self.start_frame
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.frame_count() as f64 / sample_rate as f64
    }

    /// True when a sub-range (not the whole buffer) was selected
    pub fn is_trimmed(&self) -> bool {
        matches!(self.outcome, TrimOutcome::Applied(_))
    }
}

/// Compute the frame slice for `range` over a buffer of `length_frames`.
///
/// `length_frames` must be non-zero; an empty decode is rejected by the
/// decoder before trimming.
pub fn compute_slice(length_frames: usize, sample_rate: u32, range: Option<TrimRange>) -> TrimSlice {
    let full = |outcome| TrimSlice {
        start_frame: 0,
        end_frame: length_frames,
        outcome,
    };

    let Some(range) = range else {
        return full(TrimOutcome::Full);
    };

    if !range.start.is_finite() || !range.end.is_finite() || sample_rate == 0 {
        log::warn!(
            "Trim range {:?} is not usable, converting full length",
            range
        );
        return full(TrimOutcome::FellBack(range));
    }

    let rate = sample_rate as f64;
    let start_frame = (range.start * rate).floor().max(0.0);
    let end_frame = (range.end * rate).floor().min(length_frames as f64);

    if start_frame >= end_frame {
        log::warn!(
            "Trim range {:.3}s..{:.3}s is empty for {} frames @ {} Hz, converting full length",
            range.start,
            range.end,
            length_frames,
            sample_rate
        );
        return full(TrimOutcome::FellBack(range));
    }

    let start_frame = start_frame as usize;
    let end_frame = end_frame as usize;

    // A range that covers everything is not a trim.
    if start_frame == 0 && end_frame == length_frames {
        return full(TrimOutcome::Full);
    }

    TrimSlice {
        start_frame,
        end_frame,
        outcome: TrimOutcome::Applied(range),
    }
}
