//! Directory transfer engine.
//!
//! Providers enumerate their source into a [`TransferPlan`] and hand it a
//! per-file copy function; the plan turns that into a lazy
//! [`TransferStream`] with the progress protocol every backend shares:
//!
//! 1. one opening value with totals and nothing transferred,
//! 2. one value before each file, in plan order,
//! 3. one closing value with `completed_files == total_files`.
//!
//! An error ends the stream. Files already copied stay where they are.

use futures::future::BoxFuture;
use futures::{Future, FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ossnav_common::{Error, Result, TransferProgress};

use crate::provider::TransferStream;

/// Show a progress indicator above this many files.
pub const PROGRESS_FILE_COUNT_THRESHOLD: u64 = 5;

/// Show a progress indicator above this many bytes.
pub const PROGRESS_SIZE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// A single file scheduled for transfer.
#[derive(Debug, Clone)]
pub struct TransferItem<S, D> {
    /// Where the content is read from (object key or local path).
    pub source: S,
    /// Where the content is written to (local path or object key).
    pub destination: D,
    /// Path relative to the transfer root, `/`-separated.
    pub relative: String,
    /// Size in bytes as seen during enumeration.
    pub size: u64,
}

/// Copies one item; resolves once the whole file is written.
pub type CopyFn<S, D> = Box<dyn FnMut(TransferItem<S, D>) -> BoxFuture<'static, Result<()>> + Send>;

/// Box a per-file copy closure into a [`CopyFn`].
pub fn copy_fn<S, D, F, Fut>(mut copy: F) -> CopyFn<S, D>
where
    F: FnMut(TransferItem<S, D>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |item| copy(item).boxed())
}

/// The enumerated source of a directory transfer.
#[derive(Debug)]
pub struct TransferPlan<S, D> {
    items: Vec<TransferItem<S, D>>,
    total_bytes: u64,
}

impl<S, D> TransferPlan<S, D>
where
    S: Send + 'static,
    D: Send + 'static,
{
    pub fn new(items: Vec<TransferItem<S, D>>) -> Self {
        let total_bytes = items.iter().map(|item| item.size).sum();
        Self { items, total_bytes }
    }

    pub fn total_files(&self) -> u64 {
        self.items.len() as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Turn the plan into a lazy progress stream driven by `copy`.
    pub fn into_stream(self, copy: CopyFn<S, D>) -> TransferStream {
        info!(
            files = self.items.len(),
            bytes = self.total_bytes,
            "starting transfer"
        );

        let cursor = Cursor {
            total_files: self.total_files(),
            total_bytes: self.total_bytes,
            items: self.items.into_iter(),
            pending: None,
            completed: 0,
            transferred: 0,
            stage: Stage::Opening,
            copy,
        };

        futures::stream::try_unfold(cursor, |mut cursor| async move {
            let next = cursor.step().await?;
            Ok(next.map(|progress| (progress, cursor)))
        })
        .boxed()
    }
}

enum Stage {
    Opening,
    Copying,
    Closed,
}

struct Cursor<S, D> {
    total_files: u64,
    total_bytes: u64,
    items: std::vec::IntoIter<TransferItem<S, D>>,
    /// Announced by the last value, copied on the next poll.
    pending: Option<TransferItem<S, D>>,
    completed: u64,
    transferred: u64,
    stage: Stage,
    copy: CopyFn<S, D>,
}

impl<S, D> Cursor<S, D> {
    async fn step(&mut self) -> Result<Option<TransferProgress>> {
        match self.stage {
            Stage::Opening => {
                self.stage = Stage::Copying;
                Ok(Some(self.snapshot(String::new())))
            }
            Stage::Copying => {
                if let Some(item) = self.pending.take() {
                    let size = item.size;
                    debug!(file = %item.relative, size, "copying");
                    (self.copy)(item).await?;
                    self.completed += 1;
                    self.transferred += size;
                }

                match self.items.next() {
                    Some(item) => {
                        let progress = self.snapshot(item.relative.clone());
                        self.pending = Some(item);
                        Ok(Some(progress))
                    }
                    None => {
                        self.stage = Stage::Closed;
                        info!(files = self.completed, bytes = self.transferred, "transfer complete");
                        Ok(Some(self.snapshot(String::new())))
                    }
                }
            }
            Stage::Closed => Ok(None),
        }
    }

    fn snapshot(&self, current_file: String) -> TransferProgress {
        TransferProgress {
            total_files: self.total_files,
            completed_files: self.completed,
            current_file,
            total_bytes: self.total_bytes,
            transferred_bytes: self.transferred,
        }
    }
}

/// How a driven transfer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The closing value was observed.
    Completed(TransferProgress),
    /// The source had no files.
    Empty,
    /// The token fired; carries the last value observed, if any.
    Cancelled(Option<TransferProgress>),
}

/// Whether a transfer is large enough to deserve a progress indicator.
pub fn should_show_progress(first: &TransferProgress) -> bool {
    first.total_files > PROGRESS_FILE_COUNT_THRESHOLD || first.total_bytes > PROGRESS_SIZE_THRESHOLD
}

/// Pull a transfer to completion, checking `cancel` between files.
///
/// A file that is already being copied always finishes. Every observed
/// value is passed to `on_progress`.
pub async fn drive_transfer<F>(
    mut stream: TransferStream,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<TransferOutcome>
where
    F: FnMut(&TransferProgress),
{
    let mut last: Option<TransferProgress> = None;

    loop {
        if cancel.is_cancelled() {
            info!("transfer cancelled");
            return Ok(TransferOutcome::Cancelled(last));
        }

        let Some(progress) = stream.next().await.transpose()? else {
            return Err(Error::Storage(
                "Transfer ended before its final progress".to_string(),
            ));
        };
        on_progress(&progress);

        let opening = last.is_none();
        if opening && progress.total_files == 0 {
            return Ok(TransferOutcome::Empty);
        }
        if !opening && progress.is_complete() {
            return Ok(TransferOutcome::Completed(progress));
        }
        last = Some(progress);
    }
}

/// A regular file found under a local transfer root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the walk root.
    pub relative: String,
    pub size: u64,
}

/// Names starting with `.` are hidden.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// UTF-8 name of a directory entry; other names are skipped with a warning.
pub fn entry_name(entry: &fs::DirEntry) -> Option<String> {
    let name = entry.file_name().to_str().map(str::to_string);
    if name.is_none() {
        warn!(path = %entry.path().display(), "skipping non UTF-8 name");
    }
    name
}

/// Metadata of a directory entry, following symlinks.
///
/// A symlink whose target is gone yields `None` with a warning.
pub async fn entry_metadata(entry: &fs::DirEntry) -> Result<Option<std::fs::Metadata>> {
    let path = entry.path();
    match fs::metadata(&path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "skipping dangling symlink");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Recursively list the regular files under `root`, sorted by relative path.
///
/// Hidden files and hidden directories are skipped, as are symlinked
/// directories.
pub async fn walk_files(root: &Path) -> Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, relative_dir)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry_name(&entry) else {
                continue;
            };
            if is_hidden(&name) {
                continue;
            }

            let relative = if relative_dir.is_empty() {
                name
            } else {
                format!("{}/{}", relative_dir, name)
            };

            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push((path, relative));
            } else {
                let Some(metadata) = entry_metadata(&entry).await? else {
                    continue;
                };
                if metadata.is_file() {
                    files.push(LocalFile {
                        path,
                        relative,
                        size: metadata.len(),
                    });
                }
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Normalise a prefix to either empty or ending in exactly one `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Key relative to a download prefix.
///
/// The trailing-slash-stripped prefix is removed from the front of `key`,
/// then any leading `/`.
pub fn relative_key<'a>(key: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_end_matches('/');
    key.strip_prefix(prefix)
        .unwrap_or(key)
        .trim_start_matches('/')
}

/// Destination key base for uploading `local_dir` under `prefix`.
///
/// The directory's own name is always kept: `foo/bar` uploaded to `x/`
/// lands under `x/bar/`.
pub async fn upload_base(prefix: &str, local_dir: &Path) -> Result<String> {
    let resolved = fs::canonicalize(local_dir).await?;
    let name = resolved
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Cannot upload a directory without a name: {}",
                local_dir.display()
            ))
        })?;

    Ok(format!("{}{}/", normalize_prefix(prefix), name))
}

/// Check that `relative` stays inside the directory it is joined onto.
pub fn ensure_contained(relative: &str) -> Result<()> {
    if relative.is_empty() || relative.split('/').any(|segment| segment == "..") {
        return Err(Error::InvalidInput(format!(
            "Refusing to write outside the destination: {}",
            relative
        )));
    }
    Ok(())
}

/// Check that `path` exists and is a directory.
pub async fn ensure_local_dir(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotADirectory(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
            "Local directory not found: {}",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Write `data` to `path`, creating parent directories.
pub async fn write_local_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}

/// Copy a local file, creating parent directories of the destination.
pub async fn copy_local_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(from, to).await?;
    Ok(())
}
