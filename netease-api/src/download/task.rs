use std::fmt;
use std::path::PathBuf;

use crate::download::template::NameTemplate;
use crate::error::NeteaseError;
use crate::quality::QualityLevel;
use crate::types::Track;

/// Lifecycle of one download.
///
/// `Created -> Resolving -> Fetching -> Completed`, with `Failed` reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Resolving,
    Fetching,
    Completed,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One track to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub track_id: u64,
    /// Highest acceptable level; lower levels are tried in order.
    pub quality: QualityLevel,
    pub directory: PathBuf,
    pub template: NameTemplate,
}

impl DownloadTask {
    pub fn new(track_id: u64, quality: QualityLevel, directory: impl Into<PathBuf>) -> Self {
        Self {
            track_id,
            quality,
            directory: directory.into(),
            template: NameTemplate::default(),
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: NameTemplate) -> Self {
        self.template = template;
        self
    }
}

/// What to do when a track's final name already exists on disk from an
/// earlier run.
///
/// Name clashes between tasks of the same batch always get a ` (n)` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFiles {
    /// Keep the file and report it as the result without transferring.
    #[default]
    Skip,
    /// Download again and replace it.
    Overwrite,
    /// Download again and keep both.
    Rename,
}

impl fmt::Display for ExistingFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
        })
    }
}

/// A successfully published track.
#[derive(Debug, Clone)]
pub struct DownloadedTrack {
    pub track: Track,
    /// May be lower than requested.
    pub achieved_quality: QualityLevel,
    pub bytes_written: u64,
    pub final_path: PathBuf,
    /// The file was already there and nothing was transferred.
    pub skipped: bool,
}

/// Why a task did not complete.
#[derive(Debug)]
pub struct DownloadFailure {
    pub error: NeteaseError,
    /// State the task was in when it failed.
    pub stage: TaskState,
    /// Last quality level attempted, if resolution had started.
    pub last_level: Option<QualityLevel>,
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}", self.error, self.stage)?;
        if let Some(level) = self.last_level {
            write!(f, " (last level {level})")?;
        }
        Ok(())
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub struct DownloadResult {
    pub track_id: u64,
    pub outcome: Result<DownloadedTrack, DownloadFailure>,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Terminal state: `Completed` or `Failed`.
    pub fn state(&self) -> TaskState {
        if self.is_success() {
            TaskState::Completed
        } else {
            TaskState::Failed
        }
    }
}
