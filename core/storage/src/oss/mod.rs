//! Alibaba Cloud OSS backend.

pub mod api;
pub mod client;
pub mod error;
pub mod memory;
pub mod provider;

pub use api::{BucketHandle, OssApi};
pub use client::{normalize_endpoint, regional_endpoint, Addressing, OssClient, OssConfig};
pub use error::{OssError, OssResult};
pub use memory::MemoryOssApi;
pub use provider::OssProvider;
