//! Tests for the download manager: fallback, concurrency, retries,
//! integrity checks, naming and cancellation.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netease_api::download::{
    DownloadManager, DownloadTask, ExistingFiles, NameTemplate, RetryPolicy, TaskState,
};
use netease_api::{ErrorCategory, NeteaseError, QualityLevel};
use tokio_util::sync::CancellationToken;

mod common;
use common::*;

use QualityLevel::{Exhigh, Higher, Hires, Lossless, Standard};

fn manager(source: &Arc<StubSource>) -> DownloadManager {
    DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(3))
        .build()
}

#[tokio::test]
async fn falls_back_to_first_available_level() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(StubSource::new(&[Exhigh, Higher, Standard]));

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(7, Hires, dir.path())], 4)
        .await;

    let done = results[0].outcome.as_ref().unwrap();
    assert_eq!(done.achieved_quality, Exhigh);
    assert_eq!(done.bytes_written, PAYLOAD.len() as u64);
    assert_eq!(done.final_path, dir.path().join("Artist - Song 7.mp3"));
    assert_eq!(std::fs::read(&done.final_path).unwrap(), PAYLOAD);
    assert_eq!(source.resolved_levels(7), [Hires, Lossless, Exhigh]);
    assert_eq!(entries(dir.path()), ["Artist - Song 7.mp3"]);
}

#[tokio::test]
async fn never_tries_above_requested_level() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(StubSource::new(&[Hires, Lossless, Higher]));

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    assert_eq!(results[0].outcome.as_ref().unwrap().achieved_quality, Higher);
    assert_eq!(source.resolved_levels(1), [Exhigh, Higher]);
}

#[tokio::test]
async fn server_grant_caps_achieved_level() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Lossless]);
    stub.granted = Some(Exhigh);
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Lossless, dir.path())], 1)
        .await;

    let done = results[0].outcome.as_ref().unwrap();
    assert_eq!(done.achieved_quality, Exhigh);
    assert_eq!(done.final_path.extension().unwrap(), "mp3");

    // A grant above the request never raises the reported level.
    let mut stub = StubSource::new(&[Higher]);
    stub.granted = Some(Hires);
    let source = Arc::new(stub);
    let results = manager(&source)
        .download_all(vec![DownloadTask::new(2, Higher, dir.path())], 1)
        .await;
    assert_eq!(results[0].outcome.as_ref().unwrap().achieved_quality, Higher);
}

#[tokio::test]
async fn exhausted_chain_reports_quality_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(StubSource::new(&[]));

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(9, Lossless, dir.path())], 1)
        .await;

    let failure = results[0].outcome.as_ref().unwrap_err();
    assert!(matches!(
        failure.error,
        NeteaseError::QualityUnavailable { track_id: 9, requested: Lossless }
    ));
    assert_eq!(failure.error.category(), ErrorCategory::QualityUnavailable);
    assert_eq!(failure.stage, TaskState::Resolving);
    assert_eq!(failure.last_level, Some(Standard));
    assert_eq!(results[0].state(), TaskState::Failed);
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn concurrency_bound_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.chunk_delay = Duration::from_millis(10);
    let source = Arc::new(stub);

    let tasks: Vec<_> = (1..=10)
        .map(|id| DownloadTask::new(id, Exhigh, dir.path()))
        .collect();
    let results = manager(&source).download_all(tasks, 3).await;

    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r.is_success()));
    let max = source.max_in_flight.load(Ordering::SeqCst);
    assert!((2..=3).contains(&max), "max in flight was {max}");
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(entries(dir.path()).len(), 10);
}

#[tokio::test]
async fn zero_concurrency_still_runs() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(StubSource::new(&[Standard]));
    let tasks = vec![
        DownloadTask::new(1, Standard, dir.path()),
        DownloadTask::new(2, Standard, dir.path()),
    ];
    let results = manager(&source).download_all(tasks, 0).await;
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubSource::new(&[Exhigh]);
    stub.open_failures.store(2, Ordering::SeqCst);
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    assert!(results[0].is_success());
    assert_eq!(source.open_calls.load(Ordering::SeqCst), 3);
    assert_eq!(entries(dir.path()), ["Artist - Song 1.mp3"]);
}

#[tokio::test]
async fn retries_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubSource::new(&[Exhigh]);
    stub.open_failures.store(10, Ordering::SeqCst);
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    let failure = results[0].outcome.as_ref().unwrap_err();
    assert_eq!(failure.error.category(), ErrorCategory::Transport);
    assert_eq!(failure.stage, TaskState::Fetching);
    assert_eq!(failure.last_level, Some(Exhigh));
    assert_eq!(source.open_calls.load(Ordering::SeqCst), 3);
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.resolve_error = Some(|| NeteaseError::NotLoggedIn);
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    let failure = results[0].outcome.as_ref().unwrap_err();
    assert_eq!(failure.error.category(), ErrorCategory::AuthRequired);
    assert_eq!(source.resolved_levels(1), [Exhigh]);
}

#[tokio::test]
async fn integrity_mismatch_is_retried_then_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.advertised_md5 = Some("0123456789abcdef0123456789abcdef".into());
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    let failure = results[0].outcome.as_ref().unwrap_err();
    assert!(matches!(failure.error, NeteaseError::IntegrityMismatch(_)));
    assert_eq!(source.open_calls.load(Ordering::SeqCst), 3);
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn truncated_transfer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.advertised_size = Some(PAYLOAD.len() as u64 + 100);
    let source = Arc::new(stub);

    let results = manager(&source)
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    assert!(matches!(
        results[0].outcome.as_ref().unwrap_err().error,
        NeteaseError::IntegrityMismatch(_)
    ));
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn colliding_names_get_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    for id in 1..=3 {
        stub.titles.insert(id, ("Same".into(), "Band".into()));
    }
    let source = Arc::new(stub);

    let tasks: Vec<_> = (1..=3)
        .map(|id| DownloadTask::new(id, Exhigh, dir.path()))
        .collect();
    let results = manager(&source).download_all(tasks, 3).await;

    let paths: HashSet<_> = results
        .iter()
        .map(|r| r.outcome.as_ref().unwrap().final_path.clone())
        .collect();
    assert_eq!(paths.len(), 3);
    assert_eq!(
        entries(dir.path()),
        ["Band - Same (1).mp3", "Band - Same (2).mp3", "Band - Same.mp3"]
    );
}

#[tokio::test]
async fn rerun_skips_tracks_already_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(StubSource::new(&[Exhigh]));
    let manager = manager(&source);

    let first = manager
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;
    let second = manager
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    assert!(!first[0].outcome.as_ref().unwrap().skipped);
    let again = second[0].outcome.as_ref().unwrap();
    assert!(again.skipped);
    assert_eq!(again.bytes_written, 0);
    assert_eq!(again.final_path, dir.path().join("Artist - Song 1.mp3"));
    assert_eq!(entries(dir.path()), ["Artist - Song 1.mp3"]);
    assert_eq!(source.open_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overwrite_replaces_files_from_earlier_runs() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("Artist - Song 1.mp3");
    std::fs::write(&existing, b"stale").unwrap();
    let source = Arc::new(StubSource::new(&[Exhigh]));

    let results = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .existing(ExistingFiles::Overwrite)
        .build()
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    let done = results[0].outcome.as_ref().unwrap();
    assert!(!done.skipped);
    assert_eq!(done.final_path, existing);
    assert_eq!(std::fs::read(&existing).unwrap(), PAYLOAD);
    assert_eq!(entries(dir.path()), ["Artist - Song 1.mp3"]);
}

#[tokio::test]
async fn overwrite_still_suffixes_clashes_within_a_batch() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    for id in 1..=2 {
        stub.titles.insert(id, ("Same".into(), "Band".into()));
    }
    let source = Arc::new(stub);

    let tasks: Vec<_> = (1..=2)
        .map(|id| DownloadTask::new(id, Exhigh, dir.path()))
        .collect();
    let results = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .existing(ExistingFiles::Overwrite)
        .build()
        .download_all(tasks, 2)
        .await;

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(entries(dir.path()), ["Band - Same (1).mp3", "Band - Same.mp3"]);
}

#[tokio::test]
async fn rename_keeps_files_from_earlier_runs() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("Artist - Song 1.mp3");
    std::fs::write(&existing, b"keep me").unwrap();
    let source = Arc::new(StubSource::new(&[Exhigh]));

    let results = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .existing(ExistingFiles::Rename)
        .build()
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    let done = results[0].outcome.as_ref().unwrap();
    assert_eq!(done.final_path, dir.path().join("Artist - Song 1 (1).mp3"));
    assert_eq!(std::fs::read(&existing).unwrap(), b"keep me");
}

#[tokio::test]
async fn skipped_track_gets_missing_lyrics_without_touching_existing_ones() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Artist - Song 1.mp3"), b"old").unwrap();
    std::fs::write(dir.path().join("Artist - Song 2.mp3"), b"old").unwrap();
    std::fs::write(dir.path().join("Artist - Song 2.lrc"), "[00:00.00]mine").unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.lyric = Some("[00:01.00]hello".into());
    let source = Arc::new(stub);

    let results = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .lyrics(true)
        .build()
        .download_all(
            vec![
                DownloadTask::new(1, Exhigh, dir.path()),
                DownloadTask::new(2, Exhigh, dir.path()),
            ],
            2,
        )
        .await;

    assert!(results.iter().all(|r| r.outcome.as_ref().unwrap().skipped));
    let lrc = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
    assert_eq!(lrc("Artist - Song 1.lrc"), "[00:01.00]hello");
    assert_eq!(lrc("Artist - Song 2.lrc"), "[00:00.00]mine");
}

#[tokio::test]
async fn custom_template_and_missing_directory() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("nested").join("out");
    let source = Arc::new(StubSource::new(&[Lossless]));
    let template = NameTemplate::parse("{id} {title} [{quality}]").unwrap();

    let results = manager(&source)
        .download_all(
            vec![DownloadTask::new(5, Lossless, &dir).with_template(template)],
            1,
        )
        .await;

    let done = results[0].outcome.as_ref().unwrap();
    assert_eq!(done.final_path, dir.join("5 Song 5 [lossless].flac"));
}

#[tokio::test]
async fn failures_are_isolated_per_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.missing = vec![2];
    let source = Arc::new(stub);

    let tasks: Vec<_> = (1..=3)
        .map(|id| DownloadTask::new(id, Exhigh, dir.path()))
        .collect();
    let mut results = manager(&source).download_all(tasks, 2).await;
    results.sort_by_key(|r| r.track_id);

    assert!(results[0].is_success());
    assert!(matches!(
        results[1].outcome.as_ref().unwrap_err().error,
        NeteaseError::TrackNotFound(2)
    ));
    assert_eq!(results[1].outcome.as_ref().unwrap_err().last_level, None);
    assert!(results[2].is_success());
    assert_eq!(entries(dir.path()).len(), 2);
}

#[tokio::test]
async fn on_complete_fires_once_per_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.missing = vec![3];
    let source = Arc::new(stub);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let manager = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let tasks: Vec<_> = (1..=4)
        .map(|id| DownloadTask::new(id, Exhigh, dir.path()))
        .collect();
    manager.download_all(tasks, 2).await;

    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn lyrics_are_saved_next_to_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.lyric = Some("[00:01.00]hello".into());
    let source = Arc::new(stub);

    let manager = DownloadManager::builder(source.clone())
        .retry(RetryPolicy::immediate(1))
        .lyrics(true)
        .build();
    let results = manager
        .download_all(vec![DownloadTask::new(1, Exhigh, dir.path())], 1)
        .await;

    assert!(results[0].is_success());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("Artist - Song 1.lrc")).unwrap(),
        "[00:01.00]hello"
    );
}

#[tokio::test]
async fn cancel_mid_transfer_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.stall = true;
    let source = Arc::new(stub);
    let token = CancellationToken::new();
    let manager = manager(&source);

    let tasks = vec![
        DownloadTask::new(1, Exhigh, dir.path()),
        DownloadTask::new(2, Exhigh, dir.path()),
    ];
    let (mut results, ()) = tokio::join!(
        manager.download_all_with_cancel(tasks, 1, &token),
        async {
            source.stalled.notified().await;
            // Only the hidden temp file exists mid-transfer.
            let names = entries(dir.path());
            assert_eq!(names.len(), 1);
            assert!(names[0].starts_with(".ncm-"));
            token.cancel();
        }
    );
    results.sort_by_key(|r| r.track_id);

    let first = results[0].outcome.as_ref().unwrap_err();
    assert_eq!(first.error.category(), ErrorCategory::Cancelled);
    assert_eq!(first.stage, TaskState::Fetching);
    let second = results[1].outcome.as_ref().unwrap_err();
    assert!(matches!(second.error, NeteaseError::Cancelled));
    assert_eq!(second.stage, TaskState::Created);
    assert!(entries(dir.path()).is_empty());
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn aborting_the_batch_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut stub = StubSource::new(&[Exhigh]);
    stub.stall = true;
    let source = Arc::new(stub);
    let manager = manager(&source);

    let path = dir.path().to_path_buf();
    let handle = tokio::spawn(async move {
        manager
            .download_all(vec![DownloadTask::new(1, Exhigh, path)], 1)
            .await
    });
    source.stalled.notified().await;
    assert_eq!(entries(dir.path()).len(), 1);

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    assert!(entries(dir.path()).is_empty());
}
