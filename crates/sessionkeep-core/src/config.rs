//! Application configuration management.
//!
//! Configuration is resolved once at startup: an optional JSON file at
//! `~/.config/sessionkeep/config.json`, then environment overrides. The base
//! API address must come from one of the two.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, FileBackend, KeyringBackend, MemoryBackend};

/// Application name used for config/store directory paths
const APP_NAME: &str = "sessionkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Base API address
pub const ENV_API_BASE: &str = "SESSIONKEEP_API_BASE";
/// Credential backend: `file`, `keyring` or `memory`
pub const ENV_STORE: &str = "SESSIONKEEP_STORE";
/// Directory for the file backend
pub const ENV_STORE_DIR: &str = "SESSIONKEEP_STORE_DIR";
/// HTTP timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "SESSIONKEEP_TIMEOUT_SECS";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backend contract: endpoint paths relative to the base address and the
/// name of the login identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub token: String,
    pub refresh: String,
    pub register: String,
    pub probe: String,
    /// `username`, or `email` for backends that log in by address
    pub identifier_field: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: "token/".to_string(),
            refresh: "token/refresh/".to_string(),
            register: "register/".to_string(),
            probe: "protected-view/".to_string(),
            identifier_field: "username".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "keyring" => Ok(StoreKind::Keyring),
            "memory" => Ok(StoreKind::Memory),
            other => bail!("Unknown credential store '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: Option<String>,
    pub endpoints: Endpoints,
    pub store: StoreKind,
    pub store_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Where the guard sends unauthenticated navigation
    pub home_route: String,
    /// Route prefixes that need a session
    pub protected_routes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: None,
            endpoints: Endpoints::default(),
            store: StoreKind::default(),
            store_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            home_route: "/".to_string(),
            protected_routes: vec!["/dashboard".to_string()],
        }
    }
}

impl Config {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: Some(api_base.into()),
            ..Self::default()
        }
    }

    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides from a variable lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE) {
            self.api_base = Some(base);
        }
        if let Some(store) = lookup(ENV_STORE) {
            self.store = store.parse()?;
        }
        if let Some(dir) = lookup(ENV_STORE_DIR) {
            self.store_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))?;
        }
        Ok(())
    }

    /// Base API address, always ending in `/` so endpoint paths join under it
    pub fn base_url(&self) -> Result<Url> {
        let base = self
            .api_base
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| anyhow!("Base API address not configured (set {})", ENV_API_BASE))?;

        let mut url = Url::parse(base).with_context(|| format!("Invalid base API address {}", base))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured credential store
    pub fn open_store(&self) -> Result<CredentialStore> {
        Ok(match self.store {
            StoreKind::File => CredentialStore::open(FileBackend::new(self.store_dir()?)),
            StoreKind::Keyring => CredentialStore::open(KeyringBackend::default()),
            StoreKind::Memory => CredentialStore::open(MemoryBackend::new()),
        })
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
