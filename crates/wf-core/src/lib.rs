//! wf-core: Shared audio parameter types for WaveForge
//!
//! The conversion target of every WaveForge job is described by three small
//! closed enums: sample rate, bit depth and channel layout. Anything outside
//! those sets is unrepresentable once parsed.

mod error;
mod time;

pub use error::*;
pub use time::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported output sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
}

impl SampleRate {
    pub const ALL: [SampleRate; 2] = [SampleRate::Hz44100, SampleRate::Hz48000];

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz44100
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = CoreError;

    fn try_from(value: u32) -> CoreResult<Self> {
        match value {
            44100 => Ok(Self::Hz44100),
            48000 => Ok(Self::Hz48000),
            other => Err(CoreError::InvalidSampleRate(other)),
        }
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.as_u32()
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.as_u32())
    }
}

/// Output PCM bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Sixteen,
    TwentyFour,
}

impl BitDepth {
    #[inline]
    pub fn bits(self) -> u16 {
        match self {
            Self::Sixteen => 16,
            Self::TwentyFour => 24,
        }
    }

    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }
}

impl Default for BitDepth {
    fn default() -> Self {
        Self::Sixteen
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = CoreError;

    fn try_from(value: u16) -> CoreResult<Self> {
        match value {
            16 => Ok(Self::Sixteen),
            24 => Ok(Self::TwentyFour),
            other => Err(CoreError::InvalidBitDepth(other)),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Output channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Mono,
    Stereo,
}

impl ChannelMode {
    #[inline]
    pub fn channel_count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
        }
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        Self::Stereo
    }
}

impl FromStr for ChannelMode {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mono" | "1" => Ok(Self::Mono),
            "stereo" | "2" => Ok(Self::Stereo),
            other => Err(CoreError::InvalidChannelMode(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
