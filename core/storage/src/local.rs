//! Local filesystem storage provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use ossnav_common::{Bucket, Error, ListResult, Object, Result};

use crate::provider::{ListOptions, StorageProvider, TransferStream};
use crate::transfer::{
    copy_fn, copy_local_file, ensure_local_dir, entry_metadata, entry_name, is_hidden,
    normalize_prefix, upload_base, walk_files, LocalFile, TransferItem, TransferPlan,
};

/// Filesystem storage provider.
///
/// Top-level directories under the root are buckets; nested paths are
/// object keys, with directories listed as `name/`.
pub struct FilesystemProvider {
    root: PathBuf,
}

impl FilesystemProvider {
    /// Create a provider rooted at `root`. A leading `~` is expanded.
    ///
    /// # Errors
    /// - `NotFound` if the root does not exist
    /// - `NotADirectory` if it is not a directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = expand_home(root.as_ref());

        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => Ok(Self { root }),
            Ok(_) => Err(Error::NotADirectory(root.display().to_string())),
            Err(_) => Err(Error::NotFound(format!(
                "Root directory not found: {}",
                root.display()
            ))),
        }
    }

    /// Create a provider rooted at the user's home directory.
    pub fn home() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::NotFound("Home directory not found".to_string()))?;
        Self::new(home)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a bucket to its directory, failing if it is missing.
    async fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." || bucket == "." {
            return Err(Error::InvalidInput(format!("Invalid bucket name: {}", bucket)));
        }

        let path = self.root.join(bucket);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            _ => Err(Error::BucketNotFound(bucket.to_string())),
        }
    }

    /// Map a key onto a path inside the bucket directory.
    fn key_path(bucket_path: &Path, key: &str) -> Result<PathBuf> {
        let trimmed = key.trim_matches('/');
        if trimmed.split('/').any(|segment| segment == "..") {
            return Err(Error::InvalidInput(format!("Invalid object key: {}", key)));
        }
        Ok(bucket_path.join(trimmed))
    }

    /// Build the object entry for a path inside a bucket.
    fn create_object(key: String, fs_meta: &std::fs::Metadata) -> Object {
        let modified: Option<DateTime<Utc>> = fs_meta.modified().ok().map(Into::into);

        if fs_meta.is_dir() {
            let mut obj = Object::directory(key);
            obj.last_modified = modified;
            return obj;
        }

        Object {
            etag: modified.map(|m| format!("{}-{}", m.timestamp(), fs_meta.len())),
            last_modified: modified,
            ..Object::file(key, fs_meta.len())
        }
    }

    /// Collect non-hidden entries of `dir`, descending when `recursive`.
    async fn collect_entries(
        dir: &Path,
        key_base: &str,
        recursive: bool,
        out: &mut Vec<Object>,
    ) -> Result<()> {
        let mut pending = vec![(dir.to_path_buf(), key_base.to_string())];

        while let Some((dir, base)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry_name(&entry) else {
                    continue;
                };
                if is_hidden(&name) {
                    continue;
                }

                let Some(fs_meta) = entry_metadata(&entry).await? else {
                    continue;
                };
                let key = format!("{}{}", base, name);

                if fs_meta.is_dir() {
                    let dir_key = format!("{}/", key);
                    out.push(Self::create_object(dir_key.clone(), &fs_meta));
                    if recursive && !entry.file_type().await?.is_symlink() {
                        pending.push((entry.path(), dir_key));
                    }
                } else {
                    out.push(Self::create_object(key, &fs_meta));
                }
            }
        }

        Ok(())
    }
}

/// Expand a leading `~` to the home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[async_trait]
impl StorageProvider for FilesystemProvider {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry_name(&entry) else {
                continue;
            };
            if is_hidden(&name) {
                continue;
            }

            let Some(fs_meta) = entry_metadata(&entry).await? else {
                continue;
            };
            if !fs_meta.is_dir() {
                continue;
            }

            let created = fs_meta.created().or_else(|_| fs_meta.modified()).ok();
            buckets.push(Bucket {
                name,
                creation_time: created.map(Into::into),
                location: Some(self.root.display().to_string()),
            });
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListResult> {
        options.validate()?;
        let bucket_path = self.bucket_path(bucket).await?;
        let key_base = normalize_prefix(&options.prefix);
        let target = Self::key_path(&bucket_path, &key_base)?;

        let target_meta = match fs::metadata(&target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListResult::complete(Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };
        if !target_meta.is_dir() {
            return Err(Error::NotADirectory(options.prefix.clone()));
        }

        let mut objects = Vec::new();
        if options.is_recursive() && !key_base.is_empty() {
            // The prefix matches its own directory entry, like a placeholder key.
            objects.push(Self::create_object(key_base.clone(), &target_meta));
        }
        Self::collect_entries(&target, &key_base, options.is_recursive(), &mut objects).await?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        debug!(bucket, prefix = %options.prefix, found = objects.len(), "listed directory");
        Ok(ListResult::paginate(
            objects,
            options.marker.as_deref(),
            options.max_keys,
        ))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let bucket_path = self.bucket_path(bucket).await?;
        let path = Self::key_path(&bucket_path, key)?;

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Err(Error::InvalidInput(format!(
                "Cannot read a directory: {}",
                key
            ))),
            Ok(_) => Ok(fs::read(&path).await?),
            Err(_) => Err(Error::ObjectNotFound(key.to_string())),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Object> {
        let bucket_path = self.bucket_path(bucket).await?;
        let path = Self::key_path(&bucket_path, key)?;

        if key.ends_with('/') {
            fs::create_dir_all(&path).await?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, &data).await?;
        }

        let fs_meta = fs::metadata(&path).await?;
        Ok(Self::create_object(key.to_string(), &fs_meta))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let bucket_path = self.bucket_path(bucket).await?;
        let path = Self::key_path(&bucket_path, key)?;
        if path == bucket_path {
            return Err(Error::InvalidInput("Cannot delete the bucket itself".to_string()));
        }

        let fs_meta = fs::metadata(&path)
            .await
            .map_err(|_| Error::ObjectNotFound(key.to_string()))?;

        if fs_meta.is_dir() {
            let mut entries = fs::read_dir(&path).await?;
            if entries.next_entry().await?.is_some() {
                return Err(Error::InvalidInput(format!("Directory not empty: {}", key)));
            }
            fs::remove_dir(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<Object> {
        let src_path = Self::key_path(&self.bucket_path(src_bucket).await?, src_key)?;
        let dst_path = Self::key_path(&self.bucket_path(dst_bucket).await?, dst_key)?;

        match fs::metadata(&src_path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::InvalidInput(format!(
                    "Cannot copy a directory: {}",
                    src_key
                )));
            }
            Ok(_) => {}
            Err(_) => return Err(Error::ObjectNotFound(src_key.to_string())),
        }

        copy_local_file(&src_path, &dst_path).await?;

        let fs_meta = fs::metadata(&dst_path).await?;
        Ok(Self::create_object(dst_key.to_string(), &fs_meta))
    }

    async fn download_directory(
        &self,
        bucket: &str,
        prefix: &str,
        local_path: &Path,
    ) -> Result<TransferStream> {
        let bucket_path = self.bucket_path(bucket).await?;
        let src_dir = Self::key_path(&bucket_path, prefix)?;

        match fs::metadata(&src_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(Error::NotADirectory(prefix.to_string())),
            Err(_) => {
                return Err(Error::ObjectNotFound(format!(
                    "Directory not found: {}",
                    prefix
                )));
            }
        }

        let dst_dir = expand_home(local_path);
        fs::create_dir_all(&dst_dir).await?;

        let files = walk_files(&src_dir).await?;
        debug!(bucket, prefix, files = files.len(), "enumerated download");
        Ok(local_plan(files, &dst_dir).into_stream(copy_fn(|item: TransferItem<PathBuf, PathBuf>| async move {
            copy_local_file(&item.source, &item.destination).await
        })))
    }

    async fn upload_directory(
        &self,
        bucket: &str,
        local_path: &Path,
        prefix: &str,
    ) -> Result<TransferStream> {
        let bucket_path = self.bucket_path(bucket).await?;
        let src_dir = expand_home(local_path);
        ensure_local_dir(&src_dir).await?;

        let base = upload_base(prefix, &src_dir).await?;
        let dst_dir = Self::key_path(&bucket_path, &base)?;
        fs::create_dir_all(&dst_dir).await?;

        let files = walk_files(&src_dir).await?;
        debug!(bucket, base = %base, files = files.len(), "enumerated upload");
        Ok(local_plan(files, &dst_dir).into_stream(copy_fn(|item: TransferItem<PathBuf, PathBuf>| async move {
            copy_local_file(&item.source, &item.destination).await
        })))
    }
}

/// Plan a local-to-local copy of `files` re-rooted under `dst_dir`.
fn local_plan(files: Vec<LocalFile>, dst_dir: &Path) -> TransferPlan<PathBuf, PathBuf> {
    TransferPlan::new(
        files
            .into_iter()
            .map(|file| TransferItem {
                destination: dst_dir.join(&file.relative),
                source: file.path,
                relative: file.relative,
                size: file.size,
            })
            .collect(),
    )
}
