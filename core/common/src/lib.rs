//! Common types shared across ossnav crates.
//!
//! Provides the storage error taxonomy and the immutable entity models
//! (buckets, objects, listing pages, transfer progress) that providers
//! return to their consumers.

pub mod error;
pub mod format;
pub mod types;

pub use error::{Error, Result};
pub use format::{format_size, format_time};
pub use types::{Bucket, ListResult, Object, TransferProgress};
