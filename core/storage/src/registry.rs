//! Provider registry for resolving accounts into providers.

use std::collections::HashMap;
use std::sync::Arc;

use ossnav_common::{Error, Result};

use crate::config::AccountConfig;
use crate::local::FilesystemProvider;
use crate::oss::{Addressing, OssConfig, OssProvider};
use crate::provider::StorageProvider;

/// Factory function type for creating providers.
pub type ProviderFactory =
    Box<dyn Fn(&AccountConfig) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Registry for storage provider factories.
///
/// Maps provider type names (the `provider` field of an account) to the
/// factory that builds them.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build the provider an account asks for.
    ///
    /// # Errors
    /// - `Configuration` for an unknown provider type or incomplete account
    pub fn resolve(&self, account: &AccountConfig) -> Result<Arc<dyn StorageProvider>> {
        let factory = self.factories.get(&account.provider).ok_or_else(|| {
            let available = self.providers();
            let available = if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            };
            Error::Configuration(format!(
                "Unknown provider type: {}. Available: {}",
                account.provider, available
            ))
        })?;
        factory(account)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Configuration(format!(
            "Aliyun provider requires '{}'",
            field
        ))),
    }
}

fn filesystem_provider(account: &AccountConfig) -> Result<Arc<dyn StorageProvider>> {
    let provider = match account.root_path() {
        Some(root) => FilesystemProvider::new(root)?,
        None => FilesystemProvider::home()?,
    };
    Ok(Arc::new(provider))
}

fn aliyun_provider(account: &AccountConfig) -> Result<Arc<dyn StorageProvider>> {
    let endpoint = required(&account.endpoint, "endpoint")?;
    let access_key_id = required(&account.access_key_id, "access_key_id")?;
    let access_key_secret = required(&account.access_key_secret, "access_key_secret")?;

    let mut config = OssConfig::new(endpoint, access_key_id, access_key_secret);
    if account.path_style {
        config.addressing = Addressing::Path;
        config.regional_endpoints = false;
    }
    Ok(Arc::new(OssProvider::new(config)?))
}

/// Create a registry with default providers.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry
        .register("filesystem", Box::new(filesystem_provider))
        .expect("Failed to register filesystem provider");

    registry
        .register("aliyun", Box::new(aliyun_provider))
        .expect("Failed to register aliyun provider");

    registry
}
