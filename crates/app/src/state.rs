use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use url::Url;

use common::crypto::SecretKey;
use common::keystore::{KeyStore, KeyStoreError, KEY_FILE_NAME};

pub const APP_NAME: &str = "dropkey";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ACCOUNT_FILE_NAME: &str = "account.toml";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8081";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the paste service
    #[serde(default = "default_server_url")]
    pub server_url: Url,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Default log directive, `RUST_LOG` still wins
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write daily rolling log files here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

pub fn default_server_url() -> Url {
    Url::parse(DEFAULT_SERVER_URL).expect("hardcoded URL must parse")
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Unparseable levels fall back to `warn`
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }
}

/// The registered user id for the local identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub server_url: Url,
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the dropkey directory (~/.dropkey)
    pub dropkey_dir: PathBuf,
    /// Path to the identity key PEM file
    pub key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    pub account_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the dropkey directory path (custom or default ~/.dropkey)
    pub fn dropkey_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new dropkey directory with either a fresh or an
    /// imported identity.
    pub async fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
        import: Option<&Path>,
    ) -> Result<Self, StateError> {
        let dropkey_dir = Self::dropkey_dir(custom_path)?;

        // a key without a config is a half finished init, keep the key
        if dropkey_dir.join(CONFIG_FILE_NAME).exists() || dropkey_dir.join(KEY_FILE_NAME).exists()
        {
            return Err(StateError::AlreadyInitialized);
        }

        tokio::fs::create_dir_all(&dropkey_dir).await?;

        let key = match import {
            Some(path) => KeyStore::import_identity(path).await?,
            None => KeyStore::generate_identity()?,
        };
        let store = KeyStore::open(&dropkey_dir).await?;
        match store.persist_identity(&key).await {
            Ok(()) => {}
            Err(KeyStoreError::IdentityExists) => return Err(StateError::AlreadyInitialized),
            Err(e) => return Err(e.into()),
        }

        let config = config.unwrap_or_default();
        let config_path = dropkey_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        tokio::fs::write(&config_path, config_toml).await?;

        tracing::info!("INIT: initialized {}", dropkey_dir.display());

        Ok(Self {
            key_path: dropkey_dir.join(KEY_FILE_NAME),
            account_path: dropkey_dir.join(ACCOUNT_FILE_NAME),
            dropkey_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the dropkey directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dropkey_dir = Self::dropkey_dir(custom_path)?;

        if !dropkey_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = dropkey_dir.join(KEY_FILE_NAME);
        let config_path = dropkey_dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = std::fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            account_path: dropkey_dir.join(ACCOUNT_FILE_NAME),
            dropkey_dir,
            key_path,
            config_path,
            config,
        })
    }

    pub async fn key_store(&self) -> Result<KeyStore, StateError> {
        Ok(KeyStore::open(&self.dropkey_dir).await?)
    }

    /// Open the key store and load the identity it holds
    pub async fn open_identity(&self) -> Result<(KeyStore, SecretKey), StateError> {
        let store = self.key_store().await?;
        let key = store
            .load_identity()
            .await?
            .ok_or_else(|| StateError::MissingFile(KEY_FILE_NAME.to_string()))?;
        Ok((store, key))
    }

    /// `None` until `register` has succeeded
    pub fn load_account(&self) -> Result<Option<Account>, StateError> {
        if !self.account_path.exists() {
            return Ok(None);
        }
        let account_toml = std::fs::read_to_string(&self.account_path)?;
        Ok(Some(toml::from_str(&account_toml)?))
    }

    pub fn save_account(&self, account: &Account) -> Result<(), StateError> {
        let account_toml = toml::to_string_pretty(account)?;
        std::fs::write(&self.account_path, account_toml)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("dropkey directory not initialized. Run 'dropkey init' first")]
    NotInitialized,

    #[error("dropkey directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
