//! Account configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use ossnav_common::{Error, Result};

use crate::local::expand_home;

/// Directory and file stem used for configuration lookups.
pub const APP_NAME: &str = "ossnav";

fn default_provider() -> String {
    "filesystem".to_string()
}

fn default_account() -> String {
    "local".to_string()
}

/// The `[default]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_account")]
    pub account: String,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            account: default_account(),
        }
    }
}

/// One `[accounts.<name>]` table.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Provider type, e.g. `filesystem` or `aliyun`.
    pub provider: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    /// Root directory of a filesystem account.
    pub root: Option<String>,
    /// Address buckets by path instead of by host name.
    #[serde(default)]
    pub path_style: bool,
}

impl AccountConfig {
    /// A filesystem account rooted at `root`, or at the home directory.
    pub fn filesystem(root: Option<String>) -> Self {
        Self {
            provider: "filesystem".to_string(),
            root,
            ..Default::default()
        }
    }

    /// `root` with a leading `~` expanded.
    pub fn root_path(&self) -> Option<PathBuf> {
        self.root.as_deref().map(|root| expand_home(Path::new(root)))
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "access_key_secret",
                &self.access_key_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("root", &self.root)
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub default: DefaultConfig,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl AppConfig {
    /// Look up an account, falling back to `default.account`.
    ///
    /// # Errors
    /// - `Configuration` if the account is not configured
    pub fn account(&self, name: Option<&str>) -> Result<(String, &AccountConfig)> {
        let name = name.unwrap_or(&self.default.account);

        match self.accounts.get(name) {
            Some(account) => Ok((name.to_string(), account)),
            None => {
                let available = if self.accounts.is_empty() {
                    "none".to_string()
                } else {
                    self.account_names().join(", ")
                };
                Err(Error::Configuration(format!(
                    "Account '{}' not found. Available accounts: {}",
                    name, available
                )))
            }
        }
    }

    /// Account used when none is configured: `default.provider` with its
    /// own defaults, so a filesystem provider browses the home directory.
    pub fn fallback_account(&self) -> AccountConfig {
        AccountConfig {
            provider: self.default.provider.clone(),
            ..Default::default()
        }
    }

    /// Configured account names, sorted.
    pub fn account_names(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }
}

/// Candidate configuration files, in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    match dirs::home_dir() {
        Some(home) => vec![
            home.join(".config").join(APP_NAME).join("config.toml"),
            home.join(format!(".{}.toml", APP_NAME)),
        ],
        None => Vec::new(),
    }
}

/// The first candidate configuration file that exists.
pub fn find_config_file() -> Option<PathBuf> {
    config_paths().into_iter().find(|path| path.exists())
}

/// Load the configuration at `path`, or from the default locations.
///
/// A missing file yields the defaults.
///
/// # Errors
/// - `Configuration` if the file cannot be read or is not valid TOML
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match find_config_file() {
            Some(found) => found,
            None => {
                debug!("no configuration file found, using defaults");
                return Ok(AppConfig::default());
            }
        },
    };

    let text = std::fs::read_to_string(&path).map_err(|e| {
        Error::Configuration(format!(
            "Failed to load config from {}: {}",
            path.display(),
            e
        ))
    })?;

    let config = toml::from_str(&text).map_err(|e| {
        Error::Configuration(format!("Invalid TOML in {}: {}", path.display(), e))
    })?;

    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_fallback_account_uses_default_provider() {
        let config = AppConfig::default();
        let account = config.fallback_account();
        assert_eq!(account.provider, "filesystem");
        assert!(account.root.is_none());

        let mut config = AppConfig::default();
        config.default.provider = "aliyun".to_string();
        assert_eq!(config.fallback_account().provider, "aliyun");
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default.provider, "filesystem");
        assert_eq!(config.default.account, "local");
        assert!(config.accounts.is_empty());
    }

    #[test]
    fn test_load_accounts() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[default]
provider = "aliyun"
account = "prod"

[accounts.prod]
provider = "aliyun"
endpoint = "oss-cn-hangzhou.aliyuncs.com"
access_key_id = "id"
access_key_secret = "secret"

[accounts.local]
provider = "filesystem"
root = "/tmp"
"#,
        );

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.default.account, "prod");
        assert_eq!(config.account_names(), ["local", "prod"]);

        let (name, account) = config.account(None).unwrap();
        assert_eq!(name, "prod");
        assert_eq!(account.endpoint.as_deref(), Some("oss-cn-hangzhou.aliyuncs.com"));
        assert!(!account.path_style);

        let (_, local) = config.account(Some("local")).unwrap();
        assert_eq!(local.root_path(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_missing_default_section_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[accounts.local]\nprovider = \"filesystem\"\n");
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.default, DefaultConfig::default());
        assert!(config.account(None).is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[default\nprovider = ");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.starts_with("Invalid TOML")));
    }

    #[test]
    fn test_unknown_account_lists_available() {
        let config = AppConfig::default();
        match config.account(Some("prod")) {
            Err(Error::Configuration(msg)) => {
                assert_eq!(msg, "Account 'prod' not found. Available accounts: none")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_root_expands_home() {
        let account = AccountConfig::filesystem(Some("~/data".to_string()));
        let root = account.root_path().unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(root, home.join("data"));
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let account = AccountConfig {
            access_key_secret: Some("hunter2".to_string()),
            ..AccountConfig::filesystem(None)
        };
        assert!(!format!("{:?}", account).contains("hunter2"));
    }
}
