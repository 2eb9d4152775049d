//! Discovery endpoints: daily recommendations and the new-songs chart.
//!
//! | Method | Endpoint | Login |
//! |--------|----------|-------|
//! | [`NeteaseClient::recommend_songs`] | `/v3/discovery/recommend/songs` | required |
//! | [`NeteaseClient::new_songs`] | `/v1/discovery/new/songs` | no |

use std::fmt;
use std::str::FromStr;

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::{NeteaseError, Result};
use crate::types::{Track, tracks_from};

/// Region filter of the new-songs chart (`areaId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Area {
    #[default]
    All = 0,
    Chinese = 7,
    Western = 96,
    Japanese = 8,
    Korean = 16,
}

impl FromStr for Area {
    type Err = NeteaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "chinese" | "zh" => Ok(Self::Chinese),
            "western" | "en" => Ok(Self::Western),
            "japanese" | "ja" => Ok(Self::Japanese),
            "korean" | "ko" => Ok(Self::Korean),
            _ => Err(NeteaseError::Other(format!("unknown area: {s}"))),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Chinese => "chinese",
            Self::Western => "western",
            Self::Japanese => "japanese",
            Self::Korean => "korean",
        };
        f.write_str(name)
    }
}

impl NeteaseClient {
    /// Daily recommended songs for the logged-in user.
    pub async fn recommend_songs(&self) -> Result<Vec<Track>> {
        self.require_login()?;
        let resp = self
            .request(&RequestEnvelope::new("/v3/discovery/recommend/songs"))
            .await?;
        Ok(tracks_from(resp["data"]["dailySongs"].as_array()))
    }

    /// Newly released songs, optionally filtered by region.
    pub async fn new_songs(&self, area: Area) -> Result<Vec<Track>> {
        let envelope = RequestEnvelope::new("/v1/discovery/new/songs")
            .param("areaId", area as u64)
            .param("total", true);
        let resp = self.request(&envelope).await?;
        Ok(tracks_from(resp["data"].as_array()))
    }
}
