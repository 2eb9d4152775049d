//! Album API.
//!
//! Endpoint: `POST /weapi/v1/album/{id}`
//!
//! Request: `{ "id": "123" }`
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "album": { "id": 123, "name": "专辑", "picUrl": "https://...", "publishTime": 1600000000000 },
//!   "songs": [ { "id": 1, "name": "歌名", "ar": [...], "al": {...}, "dt": 240000 } ]
//! }
//! ```

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::{NeteaseError, Result};
use crate::types::{Album, Track, tracks_from};

impl NeteaseClient {
    /// Get an album and its tracks.
    pub async fn album(&self, id: u64) -> Result<(Album, Vec<Track>)> {
        let envelope = RequestEnvelope::new(format!("/v1/album/{id}")).param("id", id.to_string());
        let resp = self.request(&envelope).await?;
        if !resp["album"].is_object() {
            return Err(NeteaseError::Other(format!("album not found: {id}")));
        }
        Ok((
            Album::from_value(&resp["album"]),
            tracks_from(resp["songs"].as_array()),
        ))
    }
}
