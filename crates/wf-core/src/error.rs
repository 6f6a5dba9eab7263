//! Error types for WaveForge core types

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid sample rate: {0} (expected 44100 or 48000)")]
    InvalidSampleRate(u32),

    #[error("Invalid bit depth: {0} (expected 16 or 24)")]
    InvalidBitDepth(u16),

    #[error("Invalid channel mode: {0} (expected mono or stereo)")]
    InvalidChannelMode(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
