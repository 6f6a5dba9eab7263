//! WF-Offline — Media Conversion Pipeline and Batch Runner
//!
//! Converts in-memory audio and video files to PCM WAV:
//! - Decode any symphonia-supported container to planar f64 PCM
//! - Trim to a time range (degenerate ranges fall back to the full source)
//! - Remix to mono/stereo and resample to 44.1 or 48 kHz
//! - Encode a canonical 16- or 24-bit RIFF/WAVE stream
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Converter                               │
//! │                                                                  │
//! │  ┌─────────┐   ┌─────────┐   ┌────────────┐   ┌──────────────┐  │
//! │  │ Decoder │ → │ Trimmer │ → │ Resampler  │ → │ WAV Encoder  │  │
//! │  │(symph.) │   │ (slice) │   │(lin./sinc) │   │ (16/24-bit)  │  │
//! │  └─────────┘   └─────────┘   └────────────┘   └──────────────┘  │
//! │                                                                  │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              JobQueue (RwLock, one job at a time)           ││
//! │  │  [Done] [Done] [Processing] [Waiting] ... → BatchEvents     ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wf_offline::{ConversionSettings, Converter, OfflineConfig, SourceMedia};
//!
//! let converter = Converter::new(OfflineConfig::default())?;
//! converter.submit(vec![SourceMedia::new("take.mp3", "audio/mpeg", bytes)]);
//!
//! let summary = converter.start(ConversionSettings::default())?;
//! if let Some(result) = converter.take_result(1) {
//!     std::fs::write(&result.output_name, &result.bytes)?;
//! }
//! ```

mod cancel;
mod config;
mod decoder;
mod encoder;
mod error;
mod formats;
mod job;
mod pipeline;
mod queue;
mod resample;
mod runner;
mod trim;
mod waveform;

pub use cancel::*;
pub use config::*;
pub use decoder::*;
pub use encoder::*;
pub use error::*;
pub use formats::*;
pub use job::*;
pub use pipeline::*;
pub use queue::*;
pub use resample::*;
pub use runner::*;
pub use trim::*;
pub use waveform::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
