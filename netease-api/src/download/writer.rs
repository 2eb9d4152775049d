//! Staged writes into the destination directory.
//!
//! Bytes go to a hidden temp file next to the final path. Only a fully
//! written, verified file is renamed into place; a dropped [`StagedFile`]
//! removes its temp file, so cancelled or failed transfers leave nothing
//! behind.

use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{NeteaseError, Result};

const TEMP_PREFIX: &str = ".ncm-";
const TEMP_SUFFIX: &str = ".part";

/// Give up on finding a free name after this many suffixes.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// A temp file being filled with downloaded bytes.
pub(crate) struct StagedFile {
    path: TempPath,
    file: BufWriter<tokio::fs::File>,
    hasher: Md5,
    written: u64,
}

impl StagedFile {
    /// Create an empty temp file inside `dir`.
    pub(crate) async fn create(dir: &Path) -> Result<Self> {
        let dir = dir.to_path_buf();
        let (file, path) = blocking(move || {
            Ok(tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(dir)?
                .into_parts())
        })
        .await?;
        Ok(Self {
            path,
            file: BufWriter::new(tokio::fs::File::from_std(file)),
            hasher: Md5::new(),
            written: 0,
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and check the content against what the server promised.
    ///
    /// `expected_size == 0` and `expected_md5 == None` skip the respective
    /// check.
    pub(crate) async fn finish(
        mut self,
        expected_size: u64,
        expected_md5: Option<&str>,
    ) -> Result<VerifiedFile> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;

        if expected_size != 0 && expected_size != self.written {
            return Err(NeteaseError::IntegrityMismatch(format!(
                "expected {expected_size} bytes, received {}",
                self.written
            )));
        }
        let digest = format!("{:x}", self.hasher.finalize());
        if let Some(expected) = expected_md5 {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(NeteaseError::IntegrityMismatch(format!(
                    "md5 {digest} does not match {expected}"
                )));
            }
        }
        debug!(bytes = self.written, md5 = %digest, "transfer verified");

        Ok(VerifiedFile {
            path: self.path,
            bytes: self.written,
        })
    }
}

/// A complete temp file, ready to be published.
pub(crate) struct VerifiedFile {
    path: TempPath,
    bytes: u64,
}

impl VerifiedFile {
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Rename into `target`. With `replace` an existing file there is
    /// swapped out; otherwise the first free `name (n).ext` variant is used.
    pub(crate) async fn publish(self, target: &Path, replace: bool) -> Result<PathBuf> {
        let temp = self.path;
        let target = target.to_path_buf();
        blocking(move || {
            if replace {
                temp.persist(&target).map_err(|e| e.error)?;
                Ok(target)
            } else {
                persist_unique(temp, &target)
            }
        })
        .await
    }
}

/// Run filesystem work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NeteaseError::Io(io::Error::other(e)))?
}

fn persist_unique(mut temp: TempPath, target: &Path) -> Result<PathBuf> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = if n == 0 {
            target.to_path_buf()
        } else {
            suffixed(target, n)
        };
        match temp.persist_noclobber(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => temp = e.path,
            Err(e) => return Err(e.error.into()),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", target.display()),
    )
    .into())
}

/// `dir/stem (n).ext`
pub(crate) fn suffixed(target: &Path, n: u32) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    target.with_file_name(name)
}

/// Atomically write a small text file next to a published track.
///
/// Without `replace` an existing file is left alone and `false` is
/// returned.
pub(crate) async fn write_sidecar(path: PathBuf, contents: String, replace: bool) -> Result<bool> {
    blocking(move || {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)?;
        io::Write::write_all(&mut file, contents.as_bytes())?;
        let persisted = if replace {
            file.persist(&path)
        } else {
            file.persist_noclobber(&path)
        };
        match persisted {
            Ok(_) => Ok(true),
            Err(e) if !replace && e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    })
    .await
}
