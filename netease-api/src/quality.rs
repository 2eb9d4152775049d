//! Audio quality levels and the fallback chain used when the server cannot
//! serve the requested level.
//!
//! | Level      | Wire name  | Codec | Nominal bitrate |
//! |------------|------------|-------|-----------------|
//! | `Standard` | `standard` | MP3   | 128 kbps        |
//! | `Higher`   | `higher`   | MP3   | 192 kbps        |
//! | `Exhigh`   | `exhigh`   | MP3   | 320 kbps        |
//! | `Lossless` | `lossless` | FLAC  | varies          |
//! | `Hires`    | `hires`    | FLAC  | varies          |
//!
//! The wire names are sent verbatim as the `level` request parameter and must
//! stay bit-exact with the service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NeteaseError;

/// Audio container/codec of a quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Mp3,
    Flac,
}

impl Codec {
    /// File extension (and `encodeType` request value) for this codec.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
        }
    }
}

/// Requested or achieved audio quality.
///
/// Ordering follows audio quality: `Standard < Higher < Exhigh < Lossless < Hires`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    /// 128 kbps MP3.
    Standard,
    /// 192 kbps MP3.
    Higher,
    /// 320 kbps MP3.
    Exhigh,
    /// Lossless (FLAC). Requires VIP.
    Lossless,
    /// Hi-Res (FLAC). Requires VIP.
    Hires,
}

impl QualityLevel {
    /// All levels, highest first.
    pub const ALL: [Self; 5] = [
        Self::Hires,
        Self::Lossless,
        Self::Exhigh,
        Self::Higher,
        Self::Standard,
    ];

    /// Server-side level identifier.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Higher => "higher",
            Self::Exhigh => "exhigh",
            Self::Lossless => "lossless",
            Self::Hires => "hires",
        }
    }

    pub fn codec(self) -> Codec {
        match self {
            Self::Standard | Self::Higher | Self::Exhigh => Codec::Mp3,
            Self::Lossless | Self::Hires => Codec::Flac,
        }
    }

    /// Nominal bitrate in kbps; `None` for variable-rate lossless levels.
    pub fn nominal_bitrate_kbps(self) -> Option<u32> {
        match self {
            Self::Standard => Some(128),
            Self::Higher => Some(192),
            Self::Exhigh => Some(320),
            Self::Lossless | Self::Hires => None,
        }
    }

    /// Every level from `self` down to `Standard`, inclusive.
    pub fn fallback_chain(self) -> FallbackChain {
        resolve_chain(self)
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for QualityLevel {
    type Err = NeteaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.wire_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NeteaseError::Other(format!("unknown quality level: {s}")))
    }
}

/// Ordered list of acceptable levels, highest to lowest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain(Vec<QualityLevel>);

impl FallbackChain {
    pub fn levels(&self) -> &[QualityLevel] {
        &self.0
    }

    /// The level tried first.
    pub fn preferred(&self) -> QualityLevel {
        self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = QualityLevel> + '_ {
        self.0.iter().copied()
    }
}

impl IntoIterator for FallbackChain {
    type Item = QualityLevel;
    type IntoIter = std::vec::IntoIter<QualityLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build the fallback chain for `requested`.
///
/// Never yields a level above `requested` and always ends at `Standard`.
pub fn resolve_chain(requested: QualityLevel) -> FallbackChain {
    FallbackChain(
        QualityLevel::ALL
            .into_iter()
            .filter(|level| *level <= requested)
            .collect(),
    )
}
