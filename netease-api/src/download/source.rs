use async_trait::async_trait;
use tracing::debug;

use crate::client::NeteaseClient;
use crate::error::{NeteaseError, Result};
use crate::quality::QualityLevel;
use crate::transport::ByteStream;
use crate::types::{Lyric, Track, TrackUrl};

/// What the download manager needs from the service.
///
/// [`NeteaseClient`] is the production implementation; tests plug in
/// scripted sources.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Track metadata used for naming.
    async fn track(&self, id: u64) -> Result<Track>;

    /// A URL for `id` at `level`, or `None` if the level is not available.
    async fn resolve(&self, id: u64, level: QualityLevel) -> Result<Option<TrackUrl>>;

    /// Open a resolved URL as a byte stream.
    async fn open(&self, url: &str) -> Result<ByteStream>;

    async fn lyric(&self, id: u64) -> Result<Lyric>;
}

#[async_trait]
impl MediaSource for NeteaseClient {
    async fn track(&self, id: u64) -> Result<Track> {
        self.track_detail(id).await
    }

    /// A null URL or a service `code` refusal (VIP-only, region-locked,
    /// not purchased) both mean this level is out of reach. Session and
    /// transport errors still propagate.
    async fn resolve(&self, id: u64, level: QualityLevel) -> Result<Option<TrackUrl>> {
        let url = match self.download_url(id, level).await {
            Ok(url) => url,
            Err(NeteaseError::Api { code, message }) => {
                debug!(track_id = id, quality = %level, code, %message, "level refused by service");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !url.is_available() {
            debug!(track_id = id, quality = %level, "no download url at this level");
        }
        Ok(url.is_available().then_some(url))
    }

    async fn open(&self, url: &str) -> Result<ByteStream> {
        self.open_stream(url).await
    }

    async fn lyric(&self, id: u64) -> Result<Lyric> {
        self.track_lyric(id).await
    }
}
