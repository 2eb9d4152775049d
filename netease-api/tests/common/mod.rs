//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use md5::{Digest, Md5};
use netease_api::download::MediaSource;
use netease_api::transport::ByteStream;
use netease_api::types::{Album, Artist, Lyric, Track, TrackUrl};
use netease_api::{NeteaseError, QualityLevel, Result};
use reqwest::StatusCode;
use tokio::sync::Notify;

pub const PAYLOAD: &[u8] = b"ID3\x04\x00fake-audio-frames-for-tests";

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

pub fn service_unavailable() -> NeteaseError {
    NeteaseError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        url: "https://cdn.test/media".into(),
    }
}

/// Sorted file names in `dir`, including hidden temp files.
pub fn entries(dir: &Path) -> Vec<String> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn track(id: u64, title: &str, artist: &str) -> Track {
    Track {
        id,
        name: title.into(),
        artists: vec![Artist {
            id: 1,
            name: artist.into(),
            alias: vec![],
        }],
        album: Album {
            name: "Album".into(),
            ..Album::default()
        },
        duration_ms: 180_000,
        fee: 0,
    }
}

/// Decrements an in-flight gauge when the transfer stream is dropped.
struct Gauge(Arc<AtomicUsize>);

impl Drop for Gauge {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted [`MediaSource`].
#[derive(Default)]
pub struct StubSource {
    /// Levels that resolve to a URL; everything else is unavailable.
    pub available: Vec<QualityLevel>,
    /// Level reported in the URL record. Defaults to the requested level.
    pub granted: Option<QualityLevel>,
    pub payload: Vec<u8>,
    /// Size and md5 advertised in URL records; default to the payload's.
    pub advertised_size: Option<u64>,
    pub advertised_md5: Option<String>,
    pub titles: HashMap<u64, (String, String)>,
    pub missing: Vec<u64>,
    /// Error every `resolve` call returns, if set.
    pub resolve_error: Option<fn() -> NeteaseError>,
    /// `open` fails transiently this many times before succeeding.
    pub open_failures: AtomicU32,
    pub chunk_delay: Duration,
    /// Hang forever after the first chunk and signal `stalled`.
    pub stall: bool,
    pub stalled: Arc<Notify>,
    pub lyric: Option<String>,

    pub resolve_calls: Mutex<Vec<(u64, QualityLevel)>>,
    pub open_calls: AtomicU32,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl StubSource {
    pub fn new(available: &[QualityLevel]) -> Self {
        Self {
            available: available.to_vec(),
            payload: PAYLOAD.to_vec(),
            ..Self::default()
        }
    }

    pub fn resolved_levels(&self, id: u64) -> Vec<QualityLevel> {
        self.resolve_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == id)
            .map(|(_, l)| *l)
            .collect()
    }
}

#[async_trait]
impl MediaSource for StubSource {
    async fn track(&self, id: u64) -> Result<Track> {
        if self.missing.contains(&id) {
            return Err(NeteaseError::TrackNotFound(id));
        }
        Ok(match self.titles.get(&id) {
            Some((title, artist)) => track(id, title, artist),
            None => track(id, &format!("Song {id}"), "Artist"),
        })
    }

    async fn resolve(&self, id: u64, level: QualityLevel) -> Result<Option<TrackUrl>> {
        self.resolve_calls.lock().unwrap().push((id, level));
        if let Some(error) = self.resolve_error {
            return Err(error());
        }
        if !self.available.contains(&level) {
            return Ok(None);
        }
        let granted = self.granted.unwrap_or(level);
        Ok(Some(TrackUrl {
            id,
            url: Some(format!("https://cdn.test/{id}.{}", granted.codec().extension())),
            bitrate: 320_000,
            size: self.advertised_size.unwrap_or(self.payload.len() as u64),
            kind: Some(granted.codec().extension().to_owned()),
            level: Some(granted),
            md5: Some(
                self.advertised_md5
                    .clone()
                    .unwrap_or_else(|| md5_hex(&self.payload)),
            ),
        }))
    }

    async fn open(&self, _url: &str) -> Result<ByteStream> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(service_unavailable());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let gauge = Gauge(self.in_flight.clone());

        let chunks: Vec<Bytes> = self.payload.chunks(8).map(Bytes::copy_from_slice).collect();

        if self.stall {
            let first = chunks.into_iter().next().unwrap_or_default();
            let stalled = self.stalled.clone();
            let hang = stream::once(async move {
                let _held = gauge;
                stalled.notify_one();
                std::future::pending::<Result<Bytes>>().await
            });
            return Ok(Box::pin(stream::iter([Ok(first)]).chain(hang)));
        }

        let delay = self.chunk_delay;
        let body = stream::iter(chunks).then(move |chunk| {
            let _held = &gauge;
            async move {
                tokio::time::sleep(delay).await;
                Ok::<_, NeteaseError>(chunk)
            }
        });
        Ok(Box::pin(body))
    }

    async fn lyric(&self, _id: u64) -> Result<Lyric> {
        Ok(Lyric {
            lrc: self.lyric.clone(),
            ..Lyric::default()
        })
    }
}
