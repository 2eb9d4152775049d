//! Concurrent track downloads.
//!
//! A [`DownloadManager`] takes a batch of [`DownloadTask`]s and runs them with
//! a fixed concurrency bound. Each task:
//!
//! 1. fetches track metadata (used for naming),
//! 2. walks the quality fallback chain until the service hands out a URL,
//! 3. streams the file into a temp file in the destination directory while
//!    hashing it,
//! 4. verifies size and MD5 against the URL record,
//! 5. renames the temp file to its final, collision-free name.
//!
//! A final name already on disk from an earlier run is handled per
//! [`ExistingFiles`]; by default the task is skipped and reports the existing
//! file, so re-running a batch resumes it.
//!
//! Transient failures are retried with backoff (see [`RetryPolicy`]). Tasks
//! are isolated: one failing task never affects the others. Cancellation
//! stops tasks that have not started and aborts in-flight transfers without
//! leaving partial files.
//!
//! ```no_run
//! # async fn run() -> netease_api::Result<()> {
//! use std::sync::Arc;
//! use netease_api::{NeteaseClient, QualityLevel};
//! use netease_api::download::{DownloadManager, DownloadTask};
//!
//! let client = Arc::new(NeteaseClient::new()?);
//! let manager = DownloadManager::builder(client).lyrics(true).build();
//! let tasks = vec![DownloadTask::new(1_859_245_776, QualityLevel::Lossless, "./music")];
//! for result in manager.download_all(tasks, 4).await {
//!     println!("{}: {}", result.track_id, result.state());
//! }
//! # Ok(())
//! # }
//! ```

mod retry;
mod source;
mod task;
mod template;
mod writer;

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{NeteaseError, Result};
use crate::quality::QualityLevel;
use crate::types::TrackUrl;

pub use retry::{RetryPolicy, retry_with_backoff};
pub use source::MediaSource;
pub use task::{
    DownloadFailure, DownloadResult, DownloadTask, DownloadedTrack, ExistingFiles, TaskState,
};
pub use template::{DEFAULT_TEMPLATE, MAX_STEM_CHARS, NameTemplate, sanitize_filename};

use writer::{StagedFile, write_sidecar};

/// Callback invoked once per finished task, in completion order.
pub type DownloadCallback = Box<dyn Fn(&DownloadResult) + Send + Sync>;

/// Runs download batches against a [`MediaSource`].
#[derive(Clone)]
pub struct DownloadManager {
    source: Arc<dyn MediaSource>,
    retry: RetryPolicy,
    lyrics: bool,
    existing: ExistingFiles,
    on_complete: Option<Arc<DownloadCallback>>,
}

/// Final paths published (or about to be) by the current batch.
type Claims = Mutex<HashSet<PathBuf>>;

/// Mark `target` as taken by this batch. `false` if another task got there
/// first.
fn claim(claims: &Claims, target: &Path) -> bool {
    claims
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(target.to_path_buf())
}

fn is_claimed(claims: &Claims, target: &Path) -> bool {
    claims
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(target)
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("retry", &self.retry)
            .field("lyrics", &self.lyrics)
            .field("existing", &self.existing)
            .field("on_complete", &self.on_complete.is_some())
            .finish_non_exhaustive()
    }
}

/// Where a task got to, for failure reports.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    state: TaskState,
    last_level: Option<QualityLevel>,
}

impl DownloadManager {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self::builder(source).build()
    }

    pub fn builder(source: Arc<dyn MediaSource>) -> DownloaderBuilder {
        DownloaderBuilder::new(source)
    }

    /// Run `tasks` with at most `concurrency` in flight (minimum 1).
    ///
    /// Returns one result per task, in completion order.
    pub async fn download_all(
        &self,
        tasks: Vec<DownloadTask>,
        concurrency: usize,
    ) -> Vec<DownloadResult> {
        self.download_all_with_cancel(tasks, concurrency, &CancellationToken::new())
            .await
    }

    /// Like [`download_all`](Self::download_all), stopping early once
    /// `token` is cancelled. Tasks that never started report
    /// [`NeteaseError::Cancelled`] in state `Created`.
    pub async fn download_all_with_cancel(
        &self,
        tasks: Vec<DownloadTask>,
        concurrency: usize,
        token: &CancellationToken,
    ) -> Vec<DownloadResult> {
        let concurrency = concurrency.max(1);
        info!(tasks = tasks.len(), concurrency, existing = %self.existing, "starting download batch");

        let claims = Claims::default();
        let results: Vec<DownloadResult> = stream::iter(tasks)
            .map(|task| self.run(task, token, &claims))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let ok = results.iter().filter(|r| r.is_success()).count();
        info!(completed = ok, failed = results.len() - ok, "download batch finished");
        results
    }

    async fn run(&self, task: DownloadTask, token: &CancellationToken, claims: &Claims) -> DownloadResult {
        let span = info_span!("download", track_id = task.track_id, requested = %task.quality);
        let mut checkpoint = Checkpoint {
            state: TaskState::Created,
            last_level: None,
        };

        let outcome = self
            .execute(&task, token, claims, &mut checkpoint)
            .instrument(span.clone())
            .await
            .map_err(|error| {
                span.in_scope(|| match &error {
                    NeteaseError::Cancelled => info!(stage = %checkpoint.state, "cancelled"),
                    e => warn!(stage = %checkpoint.state, error = %e, "download failed"),
                });
                DownloadFailure {
                    error,
                    stage: checkpoint.state,
                    last_level: checkpoint.last_level,
                }
            });

        let result = DownloadResult {
            track_id: task.track_id,
            outcome,
        };
        if let Some(callback) = &self.on_complete {
            callback(&result);
        }
        result
    }

    async fn execute(
        &self,
        task: &DownloadTask,
        token: &CancellationToken,
        claims: &Claims,
        checkpoint: &mut Checkpoint,
    ) -> Result<DownloadedTrack> {
        if token.is_cancelled() {
            return Err(NeteaseError::Cancelled);
        }
        let id = task.track_id;

        checkpoint.state = TaskState::Resolving;
        let track = retry_with_backoff(&self.retry, token, "track detail", |_| {
            self.source.track(id)
        })
        .await?;
        let (level, url) = self.resolve(task, token, checkpoint).await?;

        checkpoint.state = TaskState::Fetching;
        let stem = task.template.render(&track, level);
        let target = task
            .directory
            .join(format!("{stem}.{}", url.extension(level)));
        tokio::fs::create_dir_all(&task.directory).await?;

        if self.existing == ExistingFiles::Skip
            && !is_claimed(claims, &target)
            && tokio::fs::try_exists(&target).await?
        {
            info!(path = %target.display(), "already on disk, skipping");
            if self.lyrics {
                self.save_lyrics(id, &target, token).await;
            }
            return Ok(DownloadedTrack {
                track,
                achieved_quality: level,
                bytes_written: 0,
                final_path: target,
                skipped: true,
            });
        }

        let (final_path, bytes_written) = retry_with_backoff(&self.retry, token, "transfer", |_| {
            self.transfer(&url, &task.directory, &target, claims)
        })
        .await?;
        info!(path = %final_path.display(), bytes = bytes_written, quality = %level, "download complete");

        if self.lyrics {
            self.save_lyrics(id, &final_path, token).await;
        }

        Ok(DownloadedTrack {
            track,
            achieved_quality: level,
            bytes_written,
            final_path,
            skipped: false,
        })
    }

    /// Walk the fallback chain and return the first available URL.
    ///
    /// The achieved level is the lower of the chain level and whatever the
    /// server reports granting.
    async fn resolve(
        &self,
        task: &DownloadTask,
        token: &CancellationToken,
        checkpoint: &mut Checkpoint,
    ) -> Result<(QualityLevel, TrackUrl)> {
        for level in task.quality.fallback_chain() {
            checkpoint.last_level = Some(level);
            let found = retry_with_backoff(&self.retry, token, "resolve url", |_| {
                self.source.resolve(task.track_id, level)
            })
            .await?;

            match found {
                Some(url) => {
                    let achieved = url.level.map_or(level, |granted| granted.min(level));
                    if achieved < level {
                        debug!(requested = %level, granted = %achieved, "server granted a lower level");
                    }
                    return Ok((achieved, url));
                }
                None => debug!(quality = %level, "level unavailable, falling back"),
            }
        }
        Err(NeteaseError::QualityUnavailable {
            track_id: task.track_id,
            requested: task.quality,
        })
    }

    /// One transfer attempt. Any early return drops the staged file.
    ///
    /// Only the first task of the batch to claim `target` may replace a
    /// file there; later ones get a suffixed name.
    async fn transfer(
        &self,
        url: &TrackUrl,
        dir: &Path,
        target: &Path,
        claims: &Claims,
    ) -> Result<(PathBuf, u64)> {
        let link = url
            .url
            .as_deref()
            .ok_or_else(|| NeteaseError::MalformedResponse("resolved url is empty".into()))?;

        let mut staged = StagedFile::create(dir).await?;
        let mut stream = self.source.open(link).await?;
        while let Some(chunk) = stream.next().await {
            staged.write(&chunk?).await?;
        }
        let verified = staged.finish(url.size, url.md5.as_deref()).await?;
        let bytes = verified.bytes();
        let replace = claim(claims, target) && self.existing == ExistingFiles::Overwrite;
        Ok((verified.publish(target, replace).await?, bytes))
    }

    /// Write `<stem>.lrc` next to the track. An existing `.lrc` is only
    /// replaced under [`ExistingFiles::Overwrite`]. Failures are logged, not
    /// fatal.
    async fn save_lyrics(&self, id: u64, media: &Path, token: &CancellationToken) {
        let lyric = match retry_with_backoff(&self.retry, token, "lyric", |_| self.source.lyric(id)).await {
            Ok(lyric) => lyric,
            Err(e) => {
                warn!(error = %e, "failed to fetch lyrics");
                return;
            }
        };
        let Some(text) = lyric.lrc else {
            debug!("track has no lyrics");
            return;
        };
        let replace = self.existing == ExistingFiles::Overwrite;
        match write_sidecar(media.with_extension("lrc"), text, replace).await {
            Ok(true) => {}
            Ok(false) => debug!("lyrics already on disk"),
            Err(e) => warn!(error = %e, "failed to write lyrics"),
        }
    }
}

/// A builder used to create a [`DownloadManager`].
///
/// ```no_run
/// # fn build(client: std::sync::Arc<netease_api::NeteaseClient>) {
/// use netease_api::download::{DownloadManager, RetryPolicy};
///
/// let manager = DownloadManager::builder(client)
///     .retry(RetryPolicy::default())
///     .lyrics(true)
///     .on_complete(|r| println!("{} done", r.track_id))
///     .build();
/// # }
/// ```
#[must_use]
pub struct DownloaderBuilder {
    source: Arc<dyn MediaSource>,
    retry: RetryPolicy,
    lyrics: bool,
    existing: ExistingFiles,
    on_complete: Option<Arc<DownloadCallback>>,
}

impl DownloaderBuilder {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            lyrics: false,
            existing: ExistingFiles::default(),
            on_complete: None,
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Also save lyrics as a `.lrc` file next to each track.
    pub fn lyrics(mut self, enabled: bool) -> Self {
        self.lyrics = enabled;
        self
    }

    /// How to treat final names already on disk. Defaults to
    /// [`ExistingFiles::Skip`].
    pub fn existing(mut self, policy: ExistingFiles) -> Self {
        self.existing = policy;
        self
    }

    /// Called once per task as soon as it finishes.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DownloadResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(Box::new(callback)));
        self
    }

    pub fn build(self) -> DownloadManager {
        DownloadManager {
            source: self.source,
            retry: self.retry,
            lyrics: self.lyrics,
            existing: self.existing,
            on_complete: self.on_complete,
        }
    }
}
