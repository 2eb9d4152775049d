//! Netease Cloud Music API client library.
//!
//! Provides signed access to the Netease Cloud Music WEAPI (search, track
//! detail/URL/lyric, playlist, album, user and discovery endpoints) and a
//! concurrent downloader with quality fallback.
//!
//! # Authentication
//!
//! Endpoints that need an account use the `MUSIC_U` cookie of a logged-in
//! browser session. The cookie is persisted to `~/.config/ncm/session.json`.
//!
//! ```no_run
//! use netease_api::auth::Session;
//! use netease_api::NeteaseClient;
//!
//! // Save cookie
//! Session::new("YOUR_MUSIC_U").save().unwrap();
//!
//! // Create client (loads session from disk)
//! let client = NeteaseClient::new().unwrap();
//! ```
//!
//! # API endpoint mapping
//!
//! | Method                              | WEAPI endpoint                     | Description          |
//! |-------------------------------------|------------------------------------|----------------------|
//! | [`NeteaseClient::search`]           | `/cloudsearch/get/web`             | Search music         |
//! | [`NeteaseClient::track_details`]    | `/v3/song/detail`                  | Track metadata       |
//! | [`NeteaseClient::track_url`]        | `/song/enhance/player/url/v1`      | Playback URL         |
//! | [`NeteaseClient::download_url`]     | `/song/enhance/download/url/v1`    | Download URL         |
//! | [`NeteaseClient::track_lyric`]      | `/song/lyric`                      | LRC lyrics           |
//! | [`NeteaseClient::playlist_detail`]  | `/v6/playlist/detail`              | Playlist with tracks |
//! | [`NeteaseClient::album`]            | `/v1/album/{id}`                   | Album with tracks    |
//! | [`NeteaseClient::user_info`]        | `/nuser/account/get`               | Current user profile |
//! | [`NeteaseClient::recommend_songs`]  | `/v3/discovery/recommend/songs`    | Daily picks          |
//! | [`NeteaseClient::new_songs`]        | `/v1/discovery/new/songs`          | New releases         |
//!
//! Downloads go through [`download::DownloadManager`].
//!
//! # Encryption
//!
//! All requests use the WEAPI encryption scheme (double AES-128-CBC + RSA),
//! matching the Netease web client. See [`crypto`].

mod album;
pub mod auth;
pub mod client;
pub mod crypto;
mod discover;
pub mod download;
pub mod error;
mod playlist;
pub mod quality;
mod search;
mod track;
pub mod transport;
pub mod types;
mod user;

pub use client::{ClientBuilder, NeteaseClient};
pub use discover::Area;
pub use error::{ErrorCategory, NeteaseError, Result};
pub use quality::{Codec, FallbackChain, QualityLevel, resolve_chain};
pub use track::DETAIL_BATCH;
