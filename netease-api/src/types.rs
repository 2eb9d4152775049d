//! Data types for Netease Cloud Music API responses.
//!
//! These types are built from the raw JSON returned by the WEAPI endpoints.
//! Field names follow Rust conventions (`snake_case`) rather than the
//! original API naming (camelCase). Endpoints disagree on some field names
//! (`ar` vs `artists`, `al` vs `album`, `dt` vs `duration`), so the
//! `from_value` constructors accept both spellings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quality::{Codec, QualityLevel};

fn str_field(v: &Value, key: &str) -> String {
    v[key].as_str().unwrap_or_default().to_owned()
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v[key].as_str().filter(|s| !s.is_empty()).map(String::from)
}

/// Ids are sometimes sent as strings (`"id": "123"`).
fn id_field(v: &Value) -> u64 {
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

/// A music artist.
///
/// API JSON fields: `id`, `name`, `alias`/`alia` (alternative names).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artist {
    /// Netease artist ID.
    pub id: u64,
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
}

impl Artist {
    pub fn from_value(v: &Value) -> Self {
        let alias = v["alias"]
            .as_array()
            .or_else(|| v["alia"].as_array())
            .map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        Self {
            id: id_field(&v["id"]),
            name: str_field(v, "name"),
            alias,
        }
    }
}

/// An album.
///
/// API JSON fields: `id`, `name`, `picUrl`, `publishTime` (epoch millis).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Album {
    /// Netease album ID.
    pub id: u64,
    /// Album title.
    pub name: String,
    /// Cover image URL (e.g. `https://p1.music.126.net/...`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pic_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<i64>,
}

impl Album {
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: id_field(&v["id"]),
            name: str_field(v, "name"),
            pic_url: opt_str(v, "picUrl"),
            publish_time: v["publishTime"].as_i64(),
        }
    }
}

/// A music track (song).
///
/// API JSON fields: `id`, `name`, `ar`/`artists` (artist array),
/// `al`/`album` (album object), `dt`/`duration` (milliseconds), `fee`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    /// Netease track ID.
    pub id: u64,
    /// Song title.
    pub name: String,
    /// Performing artists.
    pub artists: Vec<Artist>,
    /// Album this track belongs to.
    pub album: Album,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Pricing class: 0 free, 1 VIP, 4 album purchase, 8 free at low quality.
    pub fee: i64,
}

impl Track {
    pub fn from_value(v: &Value) -> Self {
        let artists = v["ar"]
            .as_array()
            .or_else(|| v["artists"].as_array())
            .map(|arr| arr.iter().map(Artist::from_value).collect())
            .unwrap_or_default();
        let al = if v["al"].is_null() { &v["album"] } else { &v["al"] };
        Self {
            id: id_field(&v["id"]),
            name: str_field(v, "name"),
            artists,
            album: if al.is_object() { Album::from_value(al) } else { Album::default() },
            duration_ms: v["dt"]
                .as_u64()
                .or_else(|| v["duration"].as_u64())
                .unwrap_or(0),
            fee: v["fee"].as_i64().unwrap_or(0),
        }
    }

    /// Comma-separated artist names.
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Duration as `m:ss`.
    pub fn duration_display(&self) -> String {
        let secs = self.duration_ms / 1000;
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Parse an optional array of tracks.
pub(crate) fn tracks_from(arr: Option<&Vec<Value>>) -> Vec<Track> {
    arr.map(|a| a.iter().map(Track::from_value).collect())
        .unwrap_or_default()
}

/// A resolved streaming/download URL.
///
/// API JSON fields: `id`, `url` (null if unavailable), `br`, `size`, `type`,
/// `level`, `md5`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackUrl {
    pub id: u64,
    /// Temporary CDN link; `None` when the track is VIP-only, unpurchased,
    /// region-locked, or taken down.
    pub url: Option<String>,
    /// Bitrate in bits per second.
    pub bitrate: u64,
    /// File size in bytes as reported by the server (0 if unknown).
    pub size: u64,
    /// File type (`mp3`, `flac`), lower-cased.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Level the server actually granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<QualityLevel>,
    /// Hex MD5 of the file, lower-cased.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl TrackUrl {
    pub fn from_value(v: &Value) -> Self {
        Self {
            id: id_field(&v["id"]),
            url: opt_str(v, "url"),
            bitrate: v["br"].as_u64().unwrap_or(0),
            size: v["size"].as_u64().unwrap_or(0),
            kind: opt_str(v, "type").map(|t| t.to_ascii_lowercase()),
            level: v["level"].as_str().and_then(|l| l.parse().ok()),
            md5: opt_str(v, "md5").map(|m| m.to_ascii_lowercase()),
        }
    }

    /// Whether the server handed out a usable URL.
    pub fn is_available(&self) -> bool {
        self.url.is_some()
    }

    /// File extension, from the server-reported type or the level's codec.
    pub fn extension(&self, fallback: QualityLevel) -> &str {
        match self.kind.as_deref() {
            Some(kind) if !kind.is_empty() => kind,
            _ => self.level.unwrap_or(fallback).codec().extension(),
        }
    }

    pub fn codec(&self, fallback: QualityLevel) -> Codec {
        match self.extension(fallback) {
            "flac" => Codec::Flac,
            _ => Codec::Mp3,
        }
    }
}

/// A playlist (song list).
///
/// API JSON path: `response.playlist` (detail) or `response.result.playlists` (search).
///
/// Fields from API: `id`, `name`, `description`, `coverImgUrl`, `trackCount`,
/// `playCount`, `creator` (`{ userId, nickname }`), `tracks`, `trackIds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    /// Netease playlist ID.
    pub id: u64,
    /// Playlist title.
    pub name: String,
    /// User-written description (may be absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cover image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// Total number of tracks in the playlist.
    pub track_count: u64,
    pub play_count: u64,
    /// Playlist creator info.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserBrief>,
    /// Track list embedded in the response (often truncated by the server).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<Track>>,
    /// Complete list of track ids (only populated by `playlist_detail`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_ids: Vec<u64>,
}

impl Playlist {
    pub fn from_value(v: &Value) -> Self {
        let creator = &v["creator"];
        Self {
            id: id_field(&v["id"]),
            name: str_field(v, "name"),
            description: opt_str(v, "description"),
            cover_url: opt_str(v, "coverImgUrl"),
            track_count: v["trackCount"].as_u64().unwrap_or(0),
            play_count: v["playCount"].as_u64().unwrap_or(0),
            creator: creator.is_object().then(|| UserBrief {
                id: id_field(&creator["userId"]),
                name: str_field(creator, "nickname"),
            }),
            tracks: v["tracks"]
                .as_array()
                .map(|arr| arr.iter().map(Track::from_value).collect()),
            track_ids: v["trackIds"]
                .as_array()
                .map(|arr| arr.iter().map(|t| id_field(&t["id"])).collect())
                .unwrap_or_default(),
        }
    }

    /// Every track id, preferring the complete `track_ids` list over the
    /// possibly truncated embedded tracks.
    pub fn all_track_ids(&self) -> Vec<u64> {
        if self.track_ids.is_empty() {
            self.tracks.iter().flatten().map(|t| t.id).collect()
        } else {
            self.track_ids.clone()
        }
    }
}

/// Abbreviated user info embedded in [`Playlist`].
///
/// API JSON fields: `userId` (number), `nickname` (string).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBrief {
    /// Netease user ID.
    pub id: u64,
    /// Display name.
    pub name: String,
}

/// Current user profile.
///
/// Built from `/nuser/account/get`: `profile.userId`, `profile.nickname`,
/// `profile.avatarUrl`, and `account.vipType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Netease user ID.
    pub id: u64,
    /// Display nickname.
    pub nickname: String,
    /// Avatar image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// `0` none, `1` VIP, `11` SVIP.
    pub vip_type: i64,
}

impl UserProfile {
    /// Parse the account response. `None` for anonymous sessions, which
    /// answer with `"profile": null`.
    pub fn from_account(resp: &Value) -> Option<Self> {
        let p = &resp["profile"];
        if !p.is_object() {
            return None;
        }
        Some(Self {
            id: id_field(&p["userId"]),
            nickname: str_field(p, "nickname"),
            avatar_url: opt_str(p, "avatarUrl"),
            vip_type: resp["account"]["vipType"].as_i64().unwrap_or(0),
        })
    }

    pub fn vip_label(&self) -> &'static str {
        match self.vip_type {
            0 => "none",
            11 => "SVIP",
            _ => "VIP",
        }
    }
}

/// Song lyrics, as raw LRC text.
///
/// API JSON path: `response.lrc.lyric` (original), `response.tlyric.lyric`
/// (translation), `response.romalrc.lyric` (romanization).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lyric {
    /// Original lyrics in LRC format. `None` if the track has no lyrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lrc: Option<String>,
    /// Translated lyrics. `None` if unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tlyric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub romalrc: Option<String>,
}

impl Lyric {
    pub fn from_value(v: &Value) -> Self {
        Self {
            lrc: opt_str(&v["lrc"], "lyric"),
            tlyric: opt_str(&v["tlyric"], "lyric"),
            romalrc: opt_str(&v["romalrc"], "lyric"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lrc.is_none() && self.tlyric.is_none() && self.romalrc.is_none()
    }
}

/// Paginated search results.
///
/// Exactly one of `tracks`, `albums`, `playlists`, or `artists` will be `Some`,
/// depending on the [`SearchType`] used in the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Total number of matching results on the server.
    pub total: u64,
    /// Current page offset (0-based).
    pub offset: u64,
    /// Page size.
    pub limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Vec<Track>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub albums: Option<Vec<Album>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlists: Option<Vec<Playlist>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artists: Option<Vec<Artist>>,
}

/// Search target type, mapped to the API `type` parameter.
///
/// | Variant    | API value | Searches for |
/// |------------|-----------|--------------|
/// | `Track`    | 1         | Songs        |
/// | `Album`    | 10        | Albums       |
/// | `Artist`   | 100       | Artists      |
/// | `Playlist` | 1000      | Playlists    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Track = 1,
    Album = 10,
    Artist = 100,
    Playlist = 1000,
}
