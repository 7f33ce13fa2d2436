//! Aliyun OSS storage provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use ossnav_common::{Bucket, Error, ListResult, Object, Result};

use super::api::{BucketHandle, ListObjectsQuery, ObjectHead, ObjectSummary, OssApi};
use super::client::{regional_endpoint, OssClient, OssConfig};
use crate::local::expand_home;
use crate::provider::{ListOptions, StorageProvider, TransferStream, ENUMERATION_PAGE_SIZE};
use crate::transfer::{
    copy_fn, ensure_contained, ensure_local_dir, normalize_prefix, relative_key, upload_base,
    walk_files, write_local_file, TransferItem, TransferPlan,
};

/// Storage provider for Alibaba Cloud OSS.
///
/// Buckets may live in any region. The first operation on a bucket looks
/// up its location through the default endpoint; the location and a
/// handle bound to the regional endpoint are cached for the lifetime of
/// the provider.
pub struct OssProvider<A: OssApi = OssClient> {
    api: Arc<A>,
    endpoint: String,
    regional_endpoints: bool,
    /// Bucket name -> location.
    locations: RwLock<HashMap<String, String>>,
    /// Bucket name -> handle on the bucket's endpoint.
    handles: RwLock<HashMap<String, BucketHandle>>,
}

impl OssProvider<OssClient> {
    /// Create a provider talking to the service described by `config`.
    pub fn new(config: OssConfig) -> Result<Self> {
        let regional = config.regional_endpoints;
        let client = OssClient::new(config)?;
        let endpoint = client.endpoint().to_string();
        Ok(Self::with_api(client, endpoint).regional_endpoints(regional))
    }
}

impl<A: OssApi> OssProvider<A> {
    /// Create a provider over any [`OssApi`].
    pub fn with_api(api: A, endpoint: impl Into<String>) -> Self {
        Self {
            api: Arc::new(api),
            endpoint: endpoint.into(),
            regional_endpoints: true,
            locations: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Whether buckets are routed to their regional endpoint.
    pub fn regional_endpoints(mut self, enabled: bool) -> Self {
        self.regional_endpoints = enabled;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Location of `bucket`, resolved once.
    async fn location(&self, bucket: &str) -> Result<String> {
        if let Some(location) = self.locations.read().await.get(bucket) {
            return Ok(location.clone());
        }

        debug!(bucket, "resolving bucket location");
        let location = self.api.bucket_location(bucket).await?;
        self.locations
            .write()
            .await
            .insert(bucket.to_string(), location.clone());
        Ok(location)
    }

    /// Handle for `bucket`, bound to the endpoint it should be reached on.
    pub async fn bucket_handle(&self, bucket: &str) -> Result<BucketHandle> {
        if let Some(handle) = self.handles.read().await.get(bucket) {
            return Ok(handle.clone());
        }

        let endpoint = if self.regional_endpoints {
            regional_endpoint(&self.location(bucket).await?)
        } else {
            self.endpoint.clone()
        };

        let handle = BucketHandle::new(bucket, endpoint);
        self.handles
            .write()
            .await
            .insert(bucket.to_string(), handle.clone());
        Ok(handle)
    }

    /// Fail with `BucketNotFound` before a transfer starts.
    ///
    /// Resolving the location already proves the bucket exists; otherwise
    /// probe it with a one-key listing.
    async fn ensure_bucket(&self, handle: &BucketHandle) -> Result<()> {
        if !self.regional_endpoints {
            let probe = ListObjectsQuery {
                max_keys: 1,
                ..Default::default()
            };
            self.api.list_objects(handle, &probe).await?;
        }
        Ok(())
    }

    /// Every key under `prefix`, following pagination.
    async fn enumerate(&self, handle: &BucketHandle, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let query = ListObjectsQuery {
                prefix: prefix.to_string(),
                delimiter: String::new(),
                marker: marker.take(),
                max_keys: ENUMERATION_PAGE_SIZE,
            };
            let page = self.api.list_objects(handle, &query).await?;
            let last = page.objects.last().map(|o| o.key.clone());
            objects.extend(page.objects);

            if !page.is_truncated {
                break;
            }
            match page.next_marker.or(last) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn head(&self, handle: &BucketHandle, key: &str) -> Result<Object> {
        let head = self.api.head_object(handle, key).await?;
        Ok(object_from_head(key, head))
    }
}

fn strip_etag(etag: Option<String>) -> Option<String> {
    etag.map(|e| e.trim_matches('"').to_string())
}

fn is_placeholder(key: &str, size: u64) -> bool {
    key.ends_with('/') && size == 0
}

fn object_from_summary(summary: ObjectSummary) -> Object {
    Object {
        is_directory: is_placeholder(&summary.key, summary.size),
        key: summary.key,
        size: summary.size,
        last_modified: summary.last_modified,
        etag: strip_etag(summary.etag),
        content_type: None,
    }
}

fn object_from_head(key: &str, head: ObjectHead) -> Object {
    Object {
        key: key.to_string(),
        size: head.content_length,
        last_modified: head.last_modified,
        etag: strip_etag(head.etag),
        content_type: head.content_type,
        is_directory: is_placeholder(key, head.content_length),
    }
}

#[async_trait]
impl<A: OssApi> StorageProvider for OssProvider<A> {
    fn name(&self) -> &str {
        "aliyun"
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .api
                .list_buckets(marker.as_deref(), ENUMERATION_PAGE_SIZE)
                .await?;
            let last = page.buckets.last().map(|b| b.name.clone());

            {
                let mut locations = self.locations.write().await;
                for summary in &page.buckets {
                    if let Some(location) = &summary.location {
                        locations.insert(summary.name.clone(), location.clone());
                    }
                }
            }

            buckets.extend(page.buckets.into_iter().map(|summary| Bucket {
                name: summary.name,
                creation_time: summary.creation_date,
                location: summary.location,
            }));

            if !page.is_truncated {
                break;
            }
            match page.next_marker.or(last) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!(count = buckets.len(), "listed buckets");
        Ok(buckets)
    }

    async fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListResult> {
        options.validate()?;
        let handle = self.bucket_handle(bucket).await?;
        let query = ListObjectsQuery {
            prefix: options.prefix.clone(),
            delimiter: options.delimiter.clone(),
            marker: options.marker.clone().filter(|m| !m.is_empty()),
            max_keys: options.max_keys,
        };

        let listing = self.api.list_objects(&handle, &query).await?;

        let mut objects: Vec<Object> = listing
            .common_prefixes
            .into_iter()
            .map(Object::directory)
            .chain(listing.objects.into_iter().map(object_from_summary))
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        let next_marker = if listing.is_truncated {
            listing
                .next_marker
                .or_else(|| objects.last().map(|o| o.key.clone()))
        } else {
            None
        };

        Ok(ListResult {
            objects,
            is_truncated: listing.is_truncated,
            next_marker,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let handle = self.bucket_handle(bucket).await?;
        Ok(self.api.get_object(&handle, key).await?)
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<Object> {
        let handle = self.bucket_handle(bucket).await?;
        self.api.put_object(&handle, key, data).await?;
        self.head(&handle, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let handle = self.bucket_handle(bucket).await?;
        self.api.delete_object(&handle, key).await?;
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<Object> {
        let handle = self.bucket_handle(dst_bucket).await?;
        self.api
            .copy_object(&handle, src_bucket, src_key, dst_key)
            .await?;
        self.head(&handle, dst_key).await
    }

    async fn download_directory(
        &self,
        bucket: &str,
        prefix: &str,
        local_path: &Path,
    ) -> Result<TransferStream> {
        let local_path = expand_home(local_path);
        let handle = self.bucket_handle(bucket).await?;
        let list_prefix = normalize_prefix(prefix);
        let listed = self.enumerate(&handle, &list_prefix).await?;

        if !list_prefix.is_empty() && listed.is_empty() {
            return Err(Error::ObjectNotFound(format!(
                "Directory not found: {}",
                prefix
            )));
        }

        let mut items = Vec::new();
        for summary in listed {
            if summary.key.ends_with('/') {
                continue;
            }
            let relative = relative_key(&summary.key, prefix).to_string();
            ensure_contained(&relative)?;
            items.push(TransferItem {
                destination: local_path.join(&relative),
                source: summary.key,
                relative,
                size: summary.size,
            });
        }

        fs::create_dir_all(&local_path).await?;
        info!(bucket, prefix, files = items.len(), "downloading directory");

        let api = Arc::clone(&self.api);
        let copy = copy_fn(move |item: TransferItem<String, PathBuf>| {
            let api = Arc::clone(&api);
            let handle = handle.clone();
            async move {
                let data = api.get_object(&handle, &item.source).await?;
                write_local_file(&item.destination, &data).await
            }
        });

        Ok(TransferPlan::new(items).into_stream(copy))
    }

    async fn upload_directory(
        &self,
        bucket: &str,
        local_path: &Path,
        prefix: &str,
    ) -> Result<TransferStream> {
        let local_path = expand_home(local_path);
        ensure_local_dir(&local_path).await?;
        let handle = self.bucket_handle(bucket).await?;
        self.ensure_bucket(&handle).await?;

        let base = upload_base(prefix, &local_path).await?;
        let items: Vec<TransferItem<PathBuf, String>> = walk_files(&local_path)
            .await?
            .into_iter()
            .map(|file| TransferItem {
                destination: format!("{}{}", base, file.relative),
                source: file.path,
                relative: file.relative,
                size: file.size,
            })
            .collect();

        info!(bucket, base = %base, files = items.len(), "uploading directory");

        let api = Arc::clone(&self.api);
        let copy = copy_fn(move |item: TransferItem<PathBuf, String>| {
            let api = Arc::clone(&api);
            let handle = handle.clone();
            async move {
                let data = fs::read(&item.source).await?;
                api.put_object(&handle, &item.destination, data).await?;
                Ok(())
            }
        });

        Ok(TransferPlan::new(items).into_stream(copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oss::memory::MemoryOssApi;
    use crate::transfer::{drive_transfer, TransferOutcome};
    use futures::StreamExt;
    use ossnav_common::TransferProgress;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn setup() -> OssProvider<MemoryOssApi> {
        let api = MemoryOssApi::new();
        api.create_bucket("photos", "oss-cn-hangzhou").await;
        api.create_bucket("backup", "oss-cn-beijing").await;
        api.insert("photos", "docs/a.txt", "alpha").await;
        api.insert("photos", "docs/b.txt", "bravo!").await;
        api.insert("photos", "img/", "").await;
        api.insert("photos", "img/c.png", "png").await;
        api.insert("photos", "top.txt", "top").await;
        OssProvider::with_api(api, "https://oss-cn-hangzhou.aliyuncs.com")
    }

    async fn collect(stream: TransferStream) -> Vec<TransferProgress> {
        stream.map(|p| p.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_location_resolved_once() {
        let provider = setup().await;
        let handle = provider.bucket_handle("backup").await.unwrap();
        assert_eq!(handle.endpoint, "https://oss-cn-beijing.aliyuncs.com");

        provider.list_objects("backup", &ListOptions::default()).await.unwrap();
        provider.get_object("photos", "top.txt").await.unwrap();
        provider.get_object("photos", "docs/a.txt").await.unwrap();
        assert_eq!(provider.api().location_lookups(), 2);
    }

    #[tokio::test]
    async fn test_list_buckets_fills_location_cache() {
        let provider = setup().await;
        let buckets = provider.list_buckets().await.unwrap();
        let names: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["backup", "photos"]);
        assert_eq!(buckets[1].location.as_deref(), Some("oss-cn-hangzhou"));

        provider.get_object("photos", "top.txt").await.unwrap();
        assert_eq!(provider.api().location_lookups(), 0);
    }

    #[tokio::test]
    async fn test_without_regional_endpoints() {
        let provider = setup().await.regional_endpoints(false);
        let handle = provider.bucket_handle("backup").await.unwrap();
        assert_eq!(handle.endpoint, "https://oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(provider.api().location_lookups(), 0);
    }

    #[tokio::test]
    async fn test_error_translation() {
        let provider = setup().await;

        let err = provider.get_object("nope", "a").await.unwrap_err();
        assert!(matches!(err, Error::BucketNotFound(ref b) if b == "nope"));

        let err = provider.get_object("photos", "missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(ref k) if k == "missing.txt"));

        provider.api().fail("list_objects", "SignatureDoesNotMatch").await;
        let err = provider
            .list_objects("photos", &ListOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));

        provider.api().fail("delete_object", "InvalidAccessKeyId").await;
        let err = provider.delete_object("photos", "top.txt").await.unwrap_err();
        match err {
            Error::Authentication(msg) => assert_eq!(msg, "Invalid access key ID"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_max_keys_rejected() {
        let provider = setup().await;
        let result = provider
            .list_objects("photos", &ListOptions::default().with_max_keys(0))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_listing_merges_prefixes_and_objects() {
        let provider = setup().await;
        let first = provider
            .list_objects("photos", &ListOptions::default().with_max_keys(2))
            .await
            .unwrap();

        let keys: Vec<&str> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["docs/", "img/"]);
        assert!(first.objects.iter().all(|o| o.is_directory && o.size == 0));
        assert!(first.is_truncated);
        assert_eq!(first.next_marker.as_deref(), Some("img/"));

        let second = provider
            .list_objects(
                "photos",
                &ListOptions::default().with_max_keys(2).with_marker(first.next_marker),
            )
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "top.txt");
        assert!(!second.is_truncated);
        assert!(second.next_marker.is_none());
    }

    #[tokio::test]
    async fn test_listing_converts_placeholder_and_etag() {
        let provider = setup().await;
        let page = provider
            .list_objects("photos", &ListOptions::new("img/"))
            .await
            .unwrap();

        assert_eq!(page.objects.len(), 2);
        assert!(page.objects[0].is_directory);
        assert!(!page.objects[1].is_directory);
        let etag = page.objects[1].etag.as_deref().unwrap();
        assert!(!etag.contains('"'));
    }

    #[tokio::test]
    async fn test_put_and_copy_return_metadata() {
        let provider = setup().await;
        let put = provider
            .put_object("photos", "new/readme.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(put.size, 5);
        assert_eq!(put.content_type.as_deref(), Some("text/plain"));
        assert!(put.etag.is_some());

        let copied = provider
            .copy_object("photos", "new/readme.txt", "backup", "readme.txt")
            .await
            .unwrap();
        assert_eq!(copied.key, "readme.txt");
        assert_eq!(copied.size, 5);
        assert_eq!(
            provider.get_object("backup", "readme.txt").await.unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let provider = setup().await;
        let deleted = provider.delete_prefix("photos", "img/").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            provider.api().keys("photos").await,
            ["docs/a.txt", "docs/b.txt", "top.txt"]
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_stays_inside_directory() {
        let provider = setup().await;
        provider.api().insert("photos", "imgs/keep.png", "keep").await;
        provider.api().insert("photos", "img.txt", "keep").await;

        let deleted = provider.delete_prefix("photos", "img").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            provider.api().keys("photos").await,
            ["docs/a.txt", "docs/b.txt", "img.txt", "imgs/keep.png", "top.txt"]
        );
    }

    #[tokio::test]
    async fn test_download_directory() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");

        let stream = provider.download_directory("photos", "docs", &dest).await.unwrap();
        let events = collect(stream).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].total_files, 2);
        assert_eq!(events[0].total_bytes, 11);
        assert_eq!(events[1].current_file, "a.txt");
        assert!(events[3].is_complete());
        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(dest.join("b.txt")).unwrap(), "bravo!");
    }

    #[tokio::test]
    async fn test_download_skips_placeholders() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();

        let stream = provider
            .download_directory("photos", "img/", temp.path())
            .await
            .unwrap();
        let outcome = drive_transfer(stream, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        match outcome {
            TransferOutcome::Completed(last) => assert_eq!(last.total_files, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(temp.path().join("c.png").is_file());
    }

    #[tokio::test]
    async fn test_download_missing_prefix() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();
        let result = provider
            .download_directory("photos", "doc", temp.path())
            .await;
        assert!(matches!(result, Err(Error::ObjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_download_enumeration_error_is_translated() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();
        provider.api().fail("list_objects", "AccessDenied").await;

        let result = provider
            .download_directory("photos", "docs", &temp.path().join("out"))
            .await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
        assert!(!temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_transfers_expand_home() {
        let provider = setup().await;
        let Some(home) = dirs::home_dir() else {
            return;
        };

        let result = provider
            .upload_directory("photos", Path::new("~/ossnav-no-such-upload-source"), "")
            .await;
        match result {
            Err(Error::NotFound(message)) => {
                assert!(message.contains(&home.display().to_string()));
                assert!(!message.contains('~'));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_download_error_is_translated_mid_stream() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();
        let mut stream = provider
            .download_directory("photos", "docs", temp.path())
            .await
            .unwrap();

        provider.api().fail("get_object", "AccessDenied").await;
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_upload_keeps_leaf_directory_name() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("foo").join("bar");
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("x.txt"), b"x").unwrap();
        std::fs::write(source.join("sub/y.txt"), b"yy").unwrap();

        let stream = provider.upload_directory("backup", &source, "up/").await.unwrap();
        let events = collect(stream).await;
        assert_eq!(events.first().unwrap().total_bytes, 3);
        assert!(events.last().unwrap().is_complete());

        assert_eq!(
            provider.api().keys("backup").await,
            ["up/bar/sub/y.txt", "up/bar/x.txt"]
        );
    }

    #[tokio::test]
    async fn test_upload_preconditions() {
        let provider = setup().await;
        let temp = TempDir::new().unwrap();

        let result = provider.upload_directory("nope", temp.path(), "").await;
        assert!(matches!(result, Err(Error::BucketNotFound(_))));

        let result = provider
            .upload_directory("photos", &temp.path().join("missing"), "")
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let provider = setup().await.regional_endpoints(false);
        let result = provider.upload_directory("nope", temp.path(), "").await;
        assert!(matches!(result, Err(Error::BucketNotFound(_))));
    }
}
