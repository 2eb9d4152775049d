//! Playlist API.
//!
//! Endpoint: `POST /weapi/v6/playlist/detail`
//!
//! Request: `{ "id": "123456", "n": "100000", "s": "0" }`
//!
//! The embedded `tracks` array is capped by the server for large playlists,
//! while `trackIds` is always complete, so [`NeteaseClient::playlist_tracks`]
//! resolves ids through the batched detail endpoint.
//!
//! Response:
//! ```json
//! {
//!   "code": 200,
//!   "playlist": {
//!     "id": 123456,
//!     "name": "歌单名",
//!     "trackCount": 50,
//!     "creator": { "userId": 789, "nickname": "用户名" },
//!     "tracks": [ { "id": 1, "name": "歌名", "ar": [...], "al": {...}, "dt": 240000 } ],
//!     "trackIds": [ { "id": 1 }, ... ]
//!   }
//! }
//! ```

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::{NeteaseError, Result};
use crate::types::{Playlist, Track};

impl NeteaseClient {
    /// Get playlist detail, including the complete `track_ids` list.
    ///
    /// Does not require login for public playlists.
    pub async fn playlist_detail(&self, id: u64) -> Result<Playlist> {
        let envelope = RequestEnvelope::new("/v6/playlist/detail")
            .param("id", id.to_string())
            .param("n", "100000")
            .param("s", "0");
        let resp = self.request(&envelope).await?;
        let p = &resp["playlist"];
        if !p.is_object() {
            return Err(NeteaseError::Other(format!("playlist not found: {id}")));
        }
        Ok(Playlist::from_value(p))
    }

    /// All tracks of a fetched playlist, in playlist order.
    ///
    /// Falls back to the embedded tracks when the response carried no
    /// `trackIds`.
    pub async fn playlist_tracks(&self, playlist: &Playlist) -> Result<Vec<Track>> {
        if playlist.track_ids.is_empty() {
            return Ok(playlist.tracks.clone().unwrap_or_default());
        }
        self.track_details(&playlist.track_ids).await
    }
}
