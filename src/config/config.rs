//! Folio configuration management

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::plan::FailurePolicy;

/// Env var overriding the config file location
pub const CONFIG_ENV: &str = "FOLIO_CONFIG";
/// Env var overriding the chat API key
pub const API_KEY_ENV: &str = "FOLIO_API_KEY";

/// Folio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database path
    #[serde(default = "default_db_path")]
    pub database_path: String,

    /// Chat endpoint settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Media storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Plan execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_db_path() -> String {
    "~/.folio/folio.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            chat: ChatConfig::default(),
            storage: StorageConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Chat endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// URL of the streaming chat function
    #[serde(default)]
    pub endpoint: String,

    /// Bearer key; `FOLIO_API_KEY` wins when set
    #[serde(default)]
    pub api_key: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Rows per table included in the site content digest
    #[serde(default = "default_site_content_rows")]
    pub site_content_rows: usize,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_site_content_rows() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            site_content_rows: default_site_content_rows(),
        }
    }
}

impl ChatConfig {
    pub fn resolve_api_key(&self) -> String {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.api_key.clone())
    }
}

/// Media storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_storage_root() -> String {
    "~/.folio/media".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080/storage".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// What to do when an action fails: compensate, halt or continue
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl Config {
    /// Load config from the default location or specified path
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = Self::config_path(path)?;

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = Self::from_yaml(&raw)?;

        debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse config file")
    }

    /// Save config to the default location
    pub fn save(&self, path: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(path)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(&self)?;
        fs::write(&config_path, content).context("Failed to write config file")?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Get the config file path
    fn config_path(path: Option<&str>) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(env_path));
        }

        if let Some(p) = path {
            return Ok(PathBuf::from(p));
        }

        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".folio").join("config.yml"))
    }

    /// Resolve database path (expand ~)
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.database_path)
    }

    /// Resolve media root (expand ~)
    pub fn resolve_storage_root(&self) -> Result<PathBuf> {
        expand_home(&self.storage.root)
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = dirs::home_dir().context("Cannot find home directory")?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        None => Ok(PathBuf::from(path)),
    }
}
