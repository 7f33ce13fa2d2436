//! Entity models passed between providers and their consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A top-level storage container.
///
/// For the filesystem backend this is a top-level directory under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket name.
    pub name: String,
    /// Creation time, when the backend reports one.
    pub creation_time: Option<DateTime<Utc>>,
    /// Region or location string.
    pub location: Option<String>,
}

impl Bucket {
    /// Create a bucket with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_time: None,
            location: None,
        }
    }
}

/// A stored object (file) or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    /// Key, unique within the bucket. Directory keys end in `/`.
    pub key: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag without surrounding quotes.
    pub etag: Option<String>,
    /// MIME type, when known.
    pub content_type: Option<String>,
    /// Whether this entry is a directory.
    pub is_directory: bool,
}

impl Object {
    /// Create a file entry.
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
            content_type: None,
            is_directory: false,
        }
    }

    /// Create a directory entry.
    pub fn directory(key: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            ..Self::file(key, 0)
        }
    }

    /// Last non-empty path segment of the key.
    pub fn name(&self) -> &str {
        self.key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// One page of an object listing.
///
/// When `is_truncated` is set, `next_marker` holds the key of the last
/// object in `objects`; the next page starts strictly after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub objects: Vec<Object>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

impl ListResult {
    /// A final page holding `objects`.
    pub fn complete(objects: Vec<Object>) -> Self {
        Self {
            objects,
            is_truncated: false,
            next_marker: None,
        }
    }

    /// Apply marker-exclusive filtering and `max_keys` truncation to a
    /// key-sorted sequence of objects. A `max_keys` of zero is treated as 1
    /// so a truncated page always carries a marker.
    pub fn paginate(sorted: Vec<Object>, marker: Option<&str>, max_keys: usize) -> Self {
        let max_keys = max_keys.max(1);
        let mut remaining: Vec<Object> = match marker {
            Some(marker) if !marker.is_empty() => sorted
                .into_iter()
                .filter(|obj| obj.key.as_str() > marker)
                .collect(),
            _ => sorted,
        };

        let is_truncated = remaining.len() > max_keys;
        remaining.truncate(max_keys);

        let next_marker = if is_truncated {
            remaining.last().map(|obj| obj.key.clone())
        } else {
            None
        };

        Self {
            objects: remaining,
            is_truncated,
            next_marker,
        }
    }
}

/// Point-in-time snapshot of a directory transfer.
///
/// `completed_files` is authoritative; byte counts are best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub total_files: u64,
    pub completed_files: u64,
    /// Relative path of the file about to be copied, empty for the opening
    /// and closing events.
    pub current_file: String,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
}

impl TransferProgress {
    /// Completion percentage by file count.
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.completed_files as f64 / self.total_files as f64 * 100.0
    }

    /// Whether this is the closing event of a transfer.
    pub fn is_complete(&self) -> bool {
        self.completed_files == self.total_files
            && self.transferred_bytes == self.total_bytes
            && self.current_file.is_empty()
    }
}
