//! Storage provider trait definition.

use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use tracing::debug;

use ossnav_common::{Bucket, Error, ListResult, Object, Result, TransferProgress};

use crate::transfer::normalize_prefix;

/// Default page size for object listings.
pub const DEFAULT_MAX_KEYS: usize = 100;

/// Page size used when a provider enumerates a whole prefix for itself.
pub const ENUMERATION_PAGE_SIZE: usize = 1000;

/// Lazy sequence of transfer progress values.
///
/// No file is copied until the stream is polled, and each poll after a
/// "before-file" value copies that file. Dropping the stream stops the
/// transfer between files.
pub type TransferStream = Pin<Box<dyn Stream<Item = Result<TransferProgress>> + Send>>;

/// Parameters of a `list_objects` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Only keys starting with this prefix are listed.
    pub prefix: String,
    /// `"/"` lists direct children; an empty delimiter lists every nested key.
    pub delimiter: String,
    /// Upper bound on the page size.
    pub max_keys: usize,
    /// Exclusive lower bound on returned keys.
    pub marker: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            delimiter: "/".to_string(),
            max_keys: DEFAULT_MAX_KEYS,
            marker: None,
        }
    }
}

impl ListOptions {
    /// Directory-style listing of `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Flat listing of every key under `prefix`.
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            delimiter: String::new(),
            ..Self::new(prefix)
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn with_marker(mut self, marker: Option<String>) -> Self {
        self.marker = marker;
        self
    }

    /// Whether nested keys are listed instead of being grouped.
    pub fn is_recursive(&self) -> bool {
        self.delimiter.is_empty()
    }

    /// Reject options no page can satisfy.
    ///
    /// # Errors
    /// - `InvalidInput` if `max_keys` is zero
    pub fn validate(&self) -> Result<()> {
        if self.max_keys == 0 {
            return Err(Error::InvalidInput(
                "max_keys must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage provider trait for bucket-style backends.
///
/// Remote object stores and the local filesystem both implement this, so
/// consumers drive every backend through the same operations.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "filesystem", "aliyun").
    fn name(&self) -> &str;

    /// List every bucket. Not paginated.
    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    /// List one page of objects in a bucket.
    ///
    /// Results are key-ordered. When the page is truncated, `next_marker`
    /// is the last returned key and feeding it back as `marker` resumes
    /// strictly after it.
    ///
    /// # Errors
    /// - `BucketNotFound` if the bucket does not exist
    async fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListResult>;

    /// Read a whole object into memory.
    ///
    /// # Errors
    /// - `BucketNotFound`, `ObjectNotFound`
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Write an object, creating parent path segments as needed.
    ///
    /// Returns metadata reflecting the state after the write.
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Object>;

    /// Delete a single key. Directories must already be empty.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Copy an object, possibly into another bucket of the same backend.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<Object>;

    /// Download every object under `prefix` into `local_path`.
    ///
    /// Awaiting this checks preconditions and enumerates the source; the
    /// returned stream then emits an opening value with the totals, one
    /// value before each file, and a closing value once all files are
    /// copied. Keys are re-rooted with `prefix` stripped.
    ///
    /// # Errors
    /// - `BucketNotFound` if the bucket does not exist
    /// - `ObjectNotFound` if nothing exists under `prefix`
    async fn download_directory(
        &self,
        bucket: &str,
        prefix: &str,
        local_path: &Path,
    ) -> Result<TransferStream>;

    /// Upload the directory at `local_path` under `prefix`.
    ///
    /// The directory's own name is kept as an extra segment: uploading
    /// `foo/bar` to `x/` writes keys under `x/bar/`.
    ///
    /// # Errors
    /// - `BucketNotFound` if the bucket does not exist
    /// - `NotFound` / `NotADirectory` for a bad `local_path`
    async fn upload_directory(
        &self,
        bucket: &str,
        local_path: &Path,
        prefix: &str,
    ) -> Result<TransferStream>;

    /// Delete every key under `prefix`, deepest first.
    ///
    /// `prefix` names a directory: `img` covers `img/...` but not `imgs/`
    /// or `img.txt`. An empty prefix covers the whole bucket.
    ///
    /// Returns the number of keys deleted.
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let prefix = normalize_prefix(prefix);
        let mut keys = Vec::new();
        let mut marker = None;

        loop {
            let options = ListOptions::recursive(prefix.as_str())
                .with_max_keys(ENUMERATION_PAGE_SIZE)
                .with_marker(marker);
            let page = self.list_objects(bucket, &options).await?;
            keys.extend(page.objects.into_iter().map(|obj| obj.key));

            match page.next_marker {
                Some(next) if page.is_truncated => marker = Some(next),
                _ => break,
            }
        }

        // Reverse key order puts "a/b.txt" before "a/".
        keys.sort_unstable_by(|a, b| b.cmp(a));
        for key in &keys {
            debug!(bucket, key = %key, "deleting");
            self.delete_object(bucket, key).await?;
        }

        Ok(keys.len())
    }
}
