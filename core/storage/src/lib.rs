//! Storage providers for ossnav.
//!
//! Every backend implements [`StorageProvider`]: a bucket/key view over
//! either a local directory tree ([`FilesystemProvider`]) or Alibaba Cloud
//! OSS ([`OssProvider`]). Directory transfers share one engine in
//! [`transfer`], and accounts from the configuration file are turned into
//! providers through the [`ProviderRegistry`].

pub mod config;
pub mod local;
pub mod oss;
pub mod provider;
pub mod registry;
pub mod transfer;

pub use config::{find_config_file, load_config, AccountConfig, AppConfig, DefaultConfig};
pub use local::FilesystemProvider;
pub use oss::{MemoryOssApi, OssClient, OssConfig, OssProvider};
pub use provider::{ListOptions, StorageProvider, TransferStream, DEFAULT_MAX_KEYS};
pub use registry::{create_default_registry, ProviderFactory, ProviderRegistry};
pub use transfer::{drive_transfer, should_show_progress, TransferOutcome};
