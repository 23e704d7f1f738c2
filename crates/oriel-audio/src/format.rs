//! Stream format negotiation
//!
//! The first audio record of a session carries a textual configuration
//! `"<rate>:<channel>,<channel>,…"`. The rate is restricted to 44.1/48 kHz
//! and each channel name maps to the realtime engine's stable positional
//! integer. Everything after that record is raw S16LE interleaved PCM in
//! the declared channel order; dynamic reconfiguration is not supported.

use crate::error::{AudioError, Result};

/// Channel positions, numerically identical to the realtime engine's
/// channel-position enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChannelPosition {
    FrontLeft = 3,
    FrontRight = 4,
    FrontCenter = 5,
    Lfe = 6,
    SideLeft = 7,
    SideRight = 8,
    FrontLeftCenter = 9,
    FrontRightCenter = 10,
    RearCenter = 11,
    RearLeft = 12,
    RearRight = 13,
    TopCenter = 14,
    TopFrontLeft = 15,
    TopFrontCenter = 16,
    TopFrontRight = 17,
    TopRearLeft = 18,
    TopRearCenter = 19,
    TopRearRight = 20,
    RearLeftCenter = 21,
    RearRightCenter = 22,
    FrontLeftWide = 23,
    FrontRightWide = 24,
    Lfe2 = 25,
    FrontLeftHigh = 26,
    FrontCenterHigh = 27,
    FrontRightHigh = 28,
    TopFrontLeftCenter = 29,
    TopFrontRightCenter = 30,
    TopSideLeft = 31,
    TopSideRight = 32,
    LeftLfe = 33,
    RightLfe = 34,
    BottomCenter = 35,
    BottomLeftCenter = 36,
    BottomRightCenter = 37,
}

impl ChannelPosition {
    /// Map a wire-format channel name to its position
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "FL" => Self::FrontLeft,
            "FR" => Self::FrontRight,
            "FC" => Self::FrontCenter,
            "LFE" => Self::Lfe,
            "SL" => Self::SideLeft,
            "SR" => Self::SideRight,
            "FLC" => Self::FrontLeftCenter,
            "FRC" => Self::FrontRightCenter,
            "RC" => Self::RearCenter,
            "RL" => Self::RearLeft,
            "RR" => Self::RearRight,
            "TC" => Self::TopCenter,
            "TFL" => Self::TopFrontLeft,
            "TFC" => Self::TopFrontCenter,
            "TFR" => Self::TopFrontRight,
            "TRL" => Self::TopRearLeft,
            "TRC" => Self::TopRearCenter,
            "TRR" => Self::TopRearRight,
            "RLC" => Self::RearLeftCenter,
            "RRC" => Self::RearRightCenter,
            "FLW" => Self::FrontLeftWide,
            "FRW" => Self::FrontRightWide,
            "LFE2" => Self::Lfe2,
            "FLH" => Self::FrontLeftHigh,
            "FCH" => Self::FrontCenterHigh,
            "FRH" => Self::FrontRightHigh,
            "TFLC" => Self::TopFrontLeftCenter,
            "TFRC" => Self::TopFrontRightCenter,
            "TSL" => Self::TopSideLeft,
            "TSR" => Self::TopSideRight,
            "LLFE" => Self::LeftLfe,
            "RLFE" => Self::RightLfe,
            "BC" => Self::BottomCenter,
            "BLC" => Self::BottomLeftCenter,
            "BRC" => Self::BottomRightCenter,
            other => return Err(AudioError::UnknownChannel(other.to_string())),
        })
    }

    /// The engine's positional integer
    #[must_use]
    pub fn position(self) -> u32 {
        self as u32
    }
}

/// Sample rates the capture server may declare
pub const SUPPORTED_RATES: [u32; 2] = [44_100, 48_000];

/// Bytes per sample (S16LE)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Negotiated stream format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub rate: u32,
    /// Channel positions in interleave order
    pub channels: Vec<ChannelPosition>,
}

impl AudioConfig {
    /// Parse the first audio record's payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| AudioError::InvalidConfig("not valid ASCII".into()))?
            .trim_end_matches('\0')
            .trim();

        let (rate_str, channels_str) = text
            .split_once(':')
            .ok_or_else(|| AudioError::InvalidConfig(format!("missing ':' in \"{text}\"")))?;

        let rate: u32 = rate_str
            .parse()
            .map_err(|_| AudioError::InvalidConfig(format!("bad rate \"{rate_str}\"")))?;
        if !SUPPORTED_RATES.contains(&rate) {
            return Err(AudioError::UnsupportedRate(rate));
        }

        let channels = channels_str
            .split(',')
            .map(ChannelPosition::from_name)
            .collect::<Result<Vec<_>>>()?;
        if channels.is_empty() {
            return Err(AudioError::InvalidConfig("no channels declared".into()));
        }

        Ok(Self { rate, channels })
    }

    /// Bytes per interleaved frame (one sample per channel)
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.channels.len() * BYTES_PER_SAMPLE
    }

    /// Microseconds of playback represented by `bytes` of PCM
    #[must_use]
    pub fn bytes_to_micros(&self, bytes: usize) -> u64 {
        bytes as u64 * 1_000_000 / self.frame_size() as u64 / u64::from(self.rate)
    }
}
