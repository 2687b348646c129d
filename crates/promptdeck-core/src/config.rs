//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/promptdeck/config.toml)
//! 3. Environment variables (PROMPTDECK_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Collection;

/// Environment variable prefix
const ENV_PREFIX: &str = "PROMPTDECK";

/// Project id shipped in the sample configuration
pub const PLACEHOLDER_PROJECT_ID: &str = "your-project-id";

/// API key shipped in the sample configuration
pub const PLACEHOLDER_API_KEY: &str = "your-api-key";

/// Default timeout applied to every document store call
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Connection parameters for the hosted document store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirebaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// REST endpoint override (e.g. a local emulator)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl FirebaseConfig {
    /// Whether real (non-placeholder) credentials are present
    pub fn is_configured(&self) -> bool {
        let project_ok = matches!(
            self.project_id.as_deref(),
            Some(id) if !id.is_empty() && id != PLACEHOLDER_PROJECT_ID
        );
        project_ok && self.api_key.as_deref() != Some(PLACEHOLDER_API_KEY)
    }
}

/// Routing and timeout decisions handed to the persistence service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Serve every call from the local fallback store
    pub use_fallback: bool,
    /// Upper bound for a single store call
    pub timeout: Duration,
}

impl StoreSettings {
    /// Settings that route everything to the fallback store
    pub fn fallback() -> Self {
        Self {
            use_fallback: true,
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    /// Settings that route everything to the remote store
    pub fn remote() -> Self {
        Self {
            use_fallback: false,
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (fallback store file, logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Collection used when none is given on the command line
    #[serde(default)]
    pub collection: Collection,

    /// Timeout for each document store call, in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Always use the local fallback store, even with real credentials
    #[serde(default)]
    pub force_fallback: bool,

    /// Log file path (optional, logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Hosted document store connection
    #[serde(default)]
    pub firebase: FirebaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection: Collection::default(),
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            force_fallback: false,
            log_file: None,
            firebase: FirebaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (PROMPTDECK_DATA_DIR, PROMPTDECK_FIREBASE_PROJECT_ID, ...)
    /// 2. Config file (~/.config/promptdeck/config.toml or PROMPTDECK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = env_var("COLLECTION") {
            match val.parse() {
                Ok(collection) => self.collection = collection,
                Err(e) => tracing::warn!("Ignoring {}_COLLECTION: {}", ENV_PREFIX, e),
            }
        }

        if let Some(val) = env_var("STORE_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => self.store_timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid {}_STORE_TIMEOUT_SECS", ENV_PREFIX),
            }
        }

        if let Some(val) = env_var("FORCE_FALLBACK") {
            self.force_fallback = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Some(val) = env_var("LOG_FILE") {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        let firebase = &mut self.firebase;
        for (suffix, slot) in [
            ("FIREBASE_API_KEY", &mut firebase.api_key),
            ("FIREBASE_AUTH_DOMAIN", &mut firebase.auth_domain),
            ("FIREBASE_PROJECT_ID", &mut firebase.project_id),
            ("FIREBASE_STORAGE_BUCKET", &mut firebase.storage_bucket),
            ("FIREBASE_MESSAGING_SENDER_ID", &mut firebase.messaging_sender_id),
            ("FIREBASE_APP_ID", &mut firebase.app_id),
            ("FIREBASE_ENDPOINT", &mut firebase.endpoint),
        ] {
            if let Some(val) = env_var(suffix) {
                // Empty string clears the value
                *slot = if val.is_empty() { None } else { Some(val) };
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with PROMPTDECK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promptdeck")
            .join("config.toml")
    }

    /// Get the path of the on-device fallback store
    pub fn fallback_store_path(&self) -> PathBuf {
        self.data_dir.join("fallback_store.json")
    }

    /// Timeout applied to each store call
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Whether calls should be served by the local fallback store
    pub fn uses_fallback(&self) -> bool {
        self.force_fallback || !self.firebase.is_configured()
    }

    /// Snapshot the routing decision for a persistence service
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            use_fallback: self.uses_fallback(),
            timeout: self.store_timeout(),
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptdeck")
}

fn default_store_timeout_secs() -> u64 {
    DEFAULT_STORE_TIMEOUT_SECS
}
