use serde::{Deserialize, Serialize};

/// Client-declared quality preset. Ordered: a tier compares less than
/// another if it consumes less bandwidth, which is what lets the server
/// downgrade (never upgrade) a declared tier.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    UltraLow,
    Low,
    #[default]
    Normal,
}

impl QualityTier {
    /// Audio constraints for this tier. Pure and deterministic: the same
    /// tier always yields the identical tuple.
    pub const fn constraints(self) -> AudioConstraints {
        match self {
            Self::UltraLow => AudioConstraints::new(16_000, 16_000),
            Self::Low => AudioConstraints::new(24_000, 24_000),
            Self::Normal => AudioConstraints::new(48_000, 48_000),
        }
    }

    /// Server-side clamp: the declared tier may be lowered to `ceiling`,
    /// never raised above it.
    pub fn clamp_to(self, ceiling: QualityTier) -> QualityTier {
        self.min(ceiling)
    }
}

/// Output of the bandwidth policy engine. Channel count, FEC, DTX and the
/// 20 ms frame are fixed policy; only sample rate and bitrate vary by tier.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct AudioConstraints {
    pub channels: u8,
    pub sample_rate_hz: u32,
    pub bitrate_bps: u32,
    pub fec: bool,
    pub dtx: bool,
    pub frame_ms: u32,
}

impl AudioConstraints {
    const fn new(sample_rate_hz: u32, bitrate_bps: u32) -> Self {
        Self {
            channels: 1,
            sample_rate_hz,
            bitrate_bps,
            fec: true,
            dtx: true,
            frame_ms: 20,
        }
    }

    /// Opus fmtp attribute line for this constraint set (RFC 7587 params).
    pub fn fmtp_line(&self) -> String {
        format!(
            "minptime={};useinbandfec={};usedtx={};maxaveragebitrate={};maxplaybackrate={};stereo=0",
            self.frame_ms,
            self.fec as u8,
            self.dtx as u8,
            self.bitrate_bps,
            self.sample_rate_hz,
        )
    }
}
