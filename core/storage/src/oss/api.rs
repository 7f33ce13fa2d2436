//! The OSS operations the provider is built on.
//!
//! [`OssClient`](super::client::OssClient) speaks these over HTTP;
//! [`MemoryOssApi`](super::memory::MemoryOssApi) keeps them in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::OssResult;

/// A bucket bound to the endpoint of the region it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHandle {
    pub name: String,
    /// Scheme-qualified endpoint, e.g. `https://oss-cn-hangzhou.aliyuncs.com`.
    pub endpoint: String,
}

impl BucketHandle {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// A bucket as reported by the bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

/// One page of the bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketPage {
    pub buckets: Vec<BucketSummary>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Query of a single object listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsQuery {
    pub prefix: String,
    /// Empty for a flat listing.
    pub delimiter: String,
    pub marker: Option<String>,
    pub max_keys: usize,
}

/// An object as reported by the object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// As sent by the service, usually quoted.
    pub etag: Option<String>,
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Object metadata from a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

/// Raw OSS operations.
///
/// Service-level calls go to the default endpoint; object calls go to
/// the endpoint carried by the [`BucketHandle`].
#[async_trait]
pub trait OssApi: Send + Sync + 'static {
    /// List buckets starting after `marker`.
    async fn list_buckets(&self, marker: Option<&str>, max_keys: usize) -> OssResult<BucketPage>;

    /// Location (region id) of a bucket, e.g. `oss-cn-hangzhou`.
    async fn bucket_location(&self, bucket: &str) -> OssResult<String>;

    async fn list_objects(
        &self,
        bucket: &BucketHandle,
        query: &ListObjectsQuery,
    ) -> OssResult<ObjectListing>;

    async fn get_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<Vec<u8>>;

    async fn put_object(&self, bucket: &BucketHandle, key: &str, data: Vec<u8>) -> OssResult<()>;

    async fn head_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<ObjectHead>;

    async fn delete_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<()>;

    /// Server-side copy of `src_bucket/src_key` into `bucket/dst_key`.
    async fn copy_object(
        &self,
        bucket: &BucketHandle,
        src_bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> OssResult<()>;
}
