//! Track detail, URL, and lyric APIs.
//!
//! # Endpoints
//!
//! ## `track_details`: `POST /weapi/v3/song/detail`
//!
//! Request: `{ "c": "[{\"id\":\"123\",\"v\":0}]" }`
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "songs": [{
//!     "id": 123, "name": "歌名",
//!     "ar": [{ "id": 1, "name": "歌手" }],
//!     "al": { "id": 2, "name": "专辑", "picUrl": "https://..." },
//!     "dt": 240000
//!   }]
//! }
//! ```
//!
//! ## `track_url`: `POST /weapi/song/enhance/player/url/v1`
//!
//! Request: `{ "ids": "[123]", "level": "exhigh", "encodeType": "mp3" }`
//!
//! ## `download_url`: `POST /weapi/song/enhance/download/url/v1`
//!
//! Request: `{ "id": "123", "level": "lossless" }`
//!
//! Both answer with URL records (an array for `player/url`, a single object
//! for `download/url`):
//! ```json
//! { "id": 123, "url": "https://m701.music.126.net/...", "br": 320000,
//!   "size": 12345678, "type": "mp3", "level": "exhigh", "md5": "..." }
//! ```
//!
//! `url` is `null` when the track requires VIP/purchase or is region-locked.
//!
//! ## `track_lyric`: `POST /weapi/song/lyric`
//!
//! Request: `{ "id": 123, "lv": -1, "tv": -1, "rv": -1, "kv": -1, "_nmclfl": 1 }`
//!
//! `lrc`/`tlyric`/`romalrc` may be absent or empty for instrumental tracks.

use serde_json::{Value, json};

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::{NeteaseError, Result};
use crate::quality::QualityLevel;
use crate::types::{Lyric, Track, TrackUrl};

/// Maximum ids per `/v3/song/detail` call.
pub const DETAIL_BATCH: usize = 500;

impl NeteaseClient {
    /// Get track metadata by ID.
    ///
    /// Does not require login for public tracks.
    pub async fn track_detail(&self, id: u64) -> Result<Track> {
        self.track_details(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or(NeteaseError::TrackNotFound(id))
    }

    /// Get metadata for many tracks, batching requests by [`DETAIL_BATCH`].
    ///
    /// Unknown ids are silently absent from the result.
    pub async fn track_details(&self, ids: &[u64]) -> Result<Vec<Track>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(DETAIL_BATCH) {
            let c: Vec<Value> = batch
                .iter()
                .map(|id| json!({ "id": id.to_string(), "v": 0 }))
                .collect();
            let envelope =
                RequestEnvelope::new("/v3/song/detail").param("c", Value::Array(c).to_string());
            let resp = self.request(&envelope).await?;
            if let Some(songs) = resp["songs"].as_array() {
                tracks.extend(songs.iter().map(Track::from_value));
            }
        }
        Ok(tracks)
    }

    /// Get a playback URL record for a track at the requested level.
    ///
    /// The returned URL is a temporary CDN link (typically valid for ~20 minutes).
    /// The server may grant a lower level than requested; check
    /// [`TrackUrl::level`]. An unavailable track yields a record with
    /// `url: None` rather than an error.
    pub async fn track_url(&self, id: u64, level: QualityLevel) -> Result<TrackUrl> {
        let envelope = RequestEnvelope::new("/song/enhance/player/url/v1")
            .param("ids", format!("[{id}]"))
            .param("level", level.wire_name())
            .param("encodeType", level.codec().extension());
        let resp = self.request(&envelope).await?;
        Ok(resp["data"]
            .get(0)
            .map_or_else(|| unavailable(id), TrackUrl::from_value))
    }

    /// Get a download URL record for a track at the requested level.
    pub async fn download_url(&self, id: u64, level: QualityLevel) -> Result<TrackUrl> {
        let envelope = RequestEnvelope::new("/song/enhance/download/url/v1")
            .param("id", id.to_string())
            .param("level", level.wire_name());
        let resp = self.request(&envelope).await?;
        let data = &resp["data"];
        Ok(if data.is_object() {
            TrackUrl::from_value(data)
        } else {
            unavailable(id)
        })
    }

    /// Get lyrics for a track.
    ///
    /// All fields are `None` for instrumental tracks or tracks without
    /// uploaded lyrics.
    pub async fn track_lyric(&self, id: u64) -> Result<Lyric> {
        let envelope = RequestEnvelope::new("/song/lyric")
            .param("id", id)
            .param("lv", -1)
            .param("tv", -1)
            .param("rv", -1)
            .param("kv", -1)
            .param("_nmclfl", 1);
        let resp = self.request(&envelope).await?;
        Ok(Lyric::from_value(&resp))
    }
}

fn unavailable(id: u64) -> TrackUrl {
    TrackUrl {
        id,
        url: None,
        bitrate: 0,
        size: 0,
        kind: None,
        level: None,
        md5: None,
    }
}
