//! Search API.
//!
//! Endpoint: `POST /weapi/cloudsearch/get/web`
//!
//! Request parameters (encrypted):
//! - `s`: search keyword
//! - `type`: search type (1=track, 10=album, 100=artist, 1000=playlist)
//! - `limit`: page size (default 20, max 100)
//! - `offset`: pagination offset (0-based)
//!
//! Response JSON:
//! ```json
//! {
//!   "code": 200,
//!   "result": {
//!     "songCount": 268,          // when type=1
//!     "songs": [ { "id": 123, "name": "...", "ar": [...], "al": {...}, "dt": 240000 } ],
//!     "albumCount": 5,           // when type=10
//!     "albums": [ { "id": 456, "name": "...", "picUrl": "..." } ],
//!     "artistCount": 3,          // when type=100
//!     "artists": [ { "id": 789, "name": "..." } ],
//!     "playlistCount": 12,       // when type=1000
//!     "playlists": [ { "id": 101, "name": "...", "trackCount": 50, ... } ]
//!   }
//! }
//! ```

use serde_json::Value;

use crate::client::NeteaseClient;
use crate::crypto::RequestEnvelope;
use crate::error::Result;
use crate::types::{Album, Artist, Playlist, SearchResult, SearchType, tracks_from};

impl NeteaseClient {
    /// Search for tracks, albums, artists, or playlists.
    ///
    /// Returns a [`SearchResult`] with exactly one populated field matching
    /// the requested [`SearchType`]. Use `offset` for pagination.
    pub async fn search(
        &self,
        keyword: &str,
        search_type: SearchType,
        limit: u64,
        offset: u64,
    ) -> Result<SearchResult> {
        let envelope = RequestEnvelope::new("/cloudsearch/get/web")
            .param("s", keyword)
            .param("type", search_type as u64)
            .param("limit", limit)
            .param("offset", offset)
            .param("total", true)
            .param("csrf_token", "");
        let resp = self.request(&envelope).await?;
        Ok(parse_search(&resp["result"], search_type, limit, offset))
    }
}

fn parse_search(result: &Value, search_type: SearchType, limit: u64, offset: u64) -> SearchResult {
    let mut sr = SearchResult {
        total: 0,
        offset,
        limit,
        tracks: None,
        albums: None,
        playlists: None,
        artists: None,
    };

    let count_key = match search_type {
        SearchType::Track => {
            sr.tracks = Some(tracks_from(result["songs"].as_array()));
            "songCount"
        }
        SearchType::Album => {
            sr.albums = Some(map_array(&result["albums"], Album::from_value));
            "albumCount"
        }
        SearchType::Artist => {
            sr.artists = Some(map_array(&result["artists"], Artist::from_value));
            "artistCount"
        }
        SearchType::Playlist => {
            sr.playlists = Some(map_array(&result["playlists"], Playlist::from_value));
            "playlistCount"
        }
    };
    sr.total = result[count_key].as_u64().unwrap_or(0);
    sr
}

fn map_array<T>(v: &Value, f: fn(&Value) -> T) -> Vec<T> {
    v.as_array()
        .map(|arr| arr.iter().map(f).collect())
        .unwrap_or_default()
}
