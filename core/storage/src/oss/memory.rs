//! In-memory OSS service for tests and offline use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::api::{
    BucketHandle, BucketPage, BucketSummary, ListObjectsQuery, ObjectHead, ObjectListing,
    ObjectSummary, OssApi,
};
use super::error::{OssError, OssResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
    etag: String,
}

impl StoredObject {
    fn new(data: Vec<u8>) -> Self {
        let etag = format!("\"{:x}-{}\"", Utc::now().timestamp_micros(), data.len());
        Self {
            data,
            last_modified: Utc::now(),
            etag,
        }
    }
}

#[derive(Debug)]
struct MemoryBucket {
    location: String,
    created: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

/// An [`OssApi`] backed by maps in memory.
///
/// Listing follows the service: keys are ordered, a delimiter folds
/// deeper keys into common prefixes, and the marker is exclusive.
#[derive(Debug, Default)]
pub struct MemoryOssApi {
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
    /// Error codes to answer with, per operation name.
    faults: RwLock<HashMap<&'static str, String>>,
    location_lookups: AtomicUsize,
}

impl MemoryOssApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty bucket in `location`.
    pub async fn create_bucket(&self, name: &str, location: &str) {
        self.buckets.write().await.insert(
            name.to_string(),
            MemoryBucket {
                location: location.to_string(),
                created: Utc::now(),
                objects: BTreeMap::new(),
            },
        );
    }

    /// Store an object directly, bypassing fault injection.
    ///
    /// Panics if the bucket does not exist.
    pub async fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        let mut buckets = self.buckets.write().await;
        let Some(entry) = buckets.get_mut(bucket) else {
            panic!("bucket {} does not exist", bucket);
        };
        entry
            .objects
            .insert(key.to_string(), StoredObject::new(data.into()));
    }

    /// Keys stored in a bucket, in order.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every later call to `operation` fail with `code`.
    pub async fn fail(&self, operation: &'static str, code: &str) {
        self.faults
            .write()
            .await
            .insert(operation, code.to_string());
    }

    /// Number of `bucket_location` calls served so far.
    pub fn location_lookups(&self) -> usize {
        self.location_lookups.load(Ordering::SeqCst)
    }

    async fn check_fault(&self, operation: &'static str) -> OssResult<()> {
        match self.faults.read().await.get(operation) {
            Some(code) => Err(OssError::service(400, code.clone(), format!("injected {}", code))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OssApi for MemoryOssApi {
    async fn list_buckets(&self, marker: Option<&str>, max_keys: usize) -> OssResult<BucketPage> {
        self.check_fault("list_buckets").await?;
        let buckets = self.buckets.read().await;

        let mut page: Vec<BucketSummary> = buckets
            .iter()
            .filter(|(name, _)| marker.is_none_or(|m| name.as_str() > m))
            .map(|(name, bucket)| BucketSummary {
                name: name.clone(),
                creation_date: Some(bucket.created),
                location: Some(bucket.location.clone()),
            })
            .collect();

        let is_truncated = page.len() > max_keys;
        page.truncate(max_keys);
        let next_marker = if is_truncated {
            page.last().map(|b| b.name.clone())
        } else {
            None
        };

        Ok(BucketPage {
            buckets: page,
            is_truncated,
            next_marker,
        })
    }

    async fn bucket_location(&self, bucket: &str) -> OssResult<String> {
        self.check_fault("bucket_location").await?;
        self.location_lookups.fetch_add(1, Ordering::SeqCst);
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.location.clone())
            .ok_or_else(|| OssError::no_such_bucket(bucket))
    }

    async fn list_objects(
        &self,
        bucket: &BucketHandle,
        query: &ListObjectsQuery,
    ) -> OssResult<ObjectListing> {
        self.check_fault("list_objects").await?;
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;

        let mut objects = Vec::new();
        let mut prefixes = BTreeSet::new();
        // Entries in key order, each counted once towards max_keys.
        let mut entries: Vec<&str> = Vec::new();

        for (key, object) in stored.objects.range(query.prefix.clone()..) {
            if !key.starts_with(&query.prefix) {
                break;
            }

            let rest = &key[query.prefix.len()..];
            let folded = if query.delimiter.is_empty() {
                None
            } else {
                rest.find(query.delimiter.as_str())
                    .map(|i| &key[..query.prefix.len() + i + query.delimiter.len()])
            };

            let entry = folded.unwrap_or(key.as_str());
            if query.marker.as_deref().is_some_and(|m| entry <= m) {
                continue;
            }
            if entries.last() == Some(&entry) {
                continue;
            }
            if entries.len() == query.max_keys {
                return Ok(ObjectListing {
                    objects,
                    common_prefixes: prefixes.into_iter().collect(),
                    is_truncated: true,
                    next_marker: entries.last().map(|e| e.to_string()),
                });
            }

            entries.push(entry);
            match folded {
                Some(prefix) => {
                    prefixes.insert(prefix.to_string());
                }
                None => objects.push(ObjectSummary {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.last_modified),
                    etag: Some(object.etag.clone()),
                }),
            }
        }

        Ok(ObjectListing {
            objects,
            common_prefixes: prefixes.into_iter().collect(),
            is_truncated: false,
            next_marker: None,
        })
    }

    async fn get_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<Vec<u8>> {
        self.check_fault("get_object").await?;
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;
        stored
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| OssError::no_such_key(key))
    }

    async fn put_object(&self, bucket: &BucketHandle, key: &str, data: Vec<u8>) -> OssResult<()> {
        self.check_fault("put_object").await?;
        let mut buckets = self.buckets.write().await;
        let stored = buckets
            .get_mut(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;
        stored.objects.insert(key.to_string(), StoredObject::new(data));
        Ok(())
    }

    async fn head_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<ObjectHead> {
        self.check_fault("head_object").await?;
        let buckets = self.buckets.read().await;
        let stored = buckets
            .get(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;
        let object = stored
            .objects
            .get(key)
            .ok_or_else(|| OssError::no_such_key(key))?;

        Ok(ObjectHead {
            content_length: object.data.len() as u64,
            last_modified: Some(object.last_modified),
            etag: Some(object.etag.clone()),
            content_type: Some(
                mime_guess::from_path(key)
                    .first_or_octet_stream()
                    .to_string(),
            ),
        })
    }

    async fn delete_object(&self, bucket: &BucketHandle, key: &str) -> OssResult<()> {
        self.check_fault("delete_object").await?;
        let mut buckets = self.buckets.write().await;
        let stored = buckets
            .get_mut(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;
        // Deleting a missing key succeeds, as on the service.
        stored.objects.remove(key);
        Ok(())
    }

    async fn copy_object(
        &self,
        bucket: &BucketHandle,
        src_bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> OssResult<()> {
        self.check_fault("copy_object").await?;
        let mut buckets = self.buckets.write().await;
        let data = buckets
            .get(src_bucket)
            .ok_or_else(|| OssError::no_such_bucket(src_bucket))?
            .objects
            .get(src_key)
            .map(|o| o.data.clone())
            .ok_or_else(|| OssError::no_such_key(src_key))?;

        let target = buckets
            .get_mut(&bucket.name)
            .ok_or_else(|| OssError::no_such_bucket(&bucket.name))?;
        target
            .objects
            .insert(dst_key.to_string(), StoredObject::new(data));
        Ok(())
    }
}
