//! Configuration for the credits ledger, its storage and the removal engine

use crate::{
    backends::command::DEFAULT_ENGINE_BINARY,
    error::{CreditsError, Result},
    history::DEFAULT_HISTORY_LIMIT,
    plans::PlanTier,
    store::{CreditStore, FileCreditStore, HttpCreditStore, MemoryCreditStore},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Overrides the storage directory of the file backend
pub const STORAGE_DIR_ENV: &str = "BGREMOVE_CREDITS_DIR";

/// Overrides the credit service URL and selects the HTTP backend
pub const SERVICE_URL_ENV: &str = "BGREMOVE_CREDITS_URL";

/// Overrides the engine binary
pub const ENGINE_BIN_ENV: &str = "BGREMOVE_ENGINE_BIN";

/// Where the ledger keeps its records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files in the storage directory
    #[default]
    File,
    /// Process memory, lost on exit
    Memory,
    /// Remote credit service
    Http,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Memory => write!(f, "memory"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for a metered removal setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudioConfig {
    /// Storage backend
    pub storage: StorageBackend,

    /// Directory for the file backend (None = platform data directory)
    pub storage_dir: Option<PathBuf>,

    /// Base URL of the credit service (HTTP backend only)
    pub service_url: Option<String>,

    /// Request timeout of the HTTP backend in seconds (1-300)
    pub http_timeout_secs: u64,

    /// Plan of the account synthesized on first run
    pub default_plan: PlanTier,

    /// Background removal engine binary
    pub engine_binary: String,

    /// Model name, URL or asset folder passed to the engine
    pub model_path: Option<String>,

    /// Usage history entries to keep
    pub history_limit: usize,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            storage_dir: None,
            service_url: None,
            http_timeout_secs: 30,
            default_plan: PlanTier::Free,
            engine_binary: DEFAULT_ENGINE_BINARY.to_string(),
            model_path: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl StudioConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_credits::{StudioConfig, StorageBackend, PlanTier};
    ///
    /// let config = StudioConfig::builder()
    ///     .storage(StorageBackend::Memory)
    ///     .default_plan(PlanTier::Pro)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.default_plan, PlanTier::Pro);
    /// ```
    #[must_use]
    pub fn builder() -> StudioConfigBuilder {
        StudioConfigBuilder::default()
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this structure
    /// - Values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = std::fs::read_to_string(path_ref)
            .map_err(|e| CreditsError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            CreditsError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BGREMOVE_CREDITS_DIR`, `BGREMOVE_CREDITS_URL` and `BGREMOVE_ENGINE_BIN`
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (testable form of `with_env_overrides`)
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(STORAGE_DIR_ENV).filter(|v| !v.is_empty()) {
            self.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(SERVICE_URL_ENV).filter(|v| !v.is_empty()) {
            self.service_url = Some(url);
            self.storage = StorageBackend::Http;
        }
        if let Some(bin) = lookup(ENGINE_BIN_ENV).filter(|v| !v.is_empty()) {
            self.engine_binary = bin;
        }
        self
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - HTTP backend without a service URL
    /// - HTTP timeout outside 1-300 seconds
    /// - Empty engine binary
    /// - History limit of zero
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Http && self.service_url.is_none() {
            return Err(CreditsError::invalid_config(format!(
                "HTTP storage requires a service URL (set serviceUrl or {})",
                SERVICE_URL_ENV
            )));
        }

        if !(1..=300).contains(&self.http_timeout_secs) {
            return Err(CreditsError::config_value_error(
                "HTTP timeout",
                self.http_timeout_secs,
                "1-300 seconds",
                Some(30),
            ));
        }

        if self.engine_binary.trim().is_empty() {
            return Err(CreditsError::invalid_config("Engine binary must not be empty"));
        }

        if self.history_limit == 0 {
            return Err(CreditsError::config_value_error(
                "history limit",
                self.history_limit,
                "1 or more",
                Some(DEFAULT_HISTORY_LIMIT),
            ));
        }

        Ok(())
    }

    /// Directory used by the file backend.
    ///
    /// Defaults to `<data dir>/bgremove-credits`:
    /// - Linux: `~/.local/share/bgremove-credits/`
    /// - macOS: `~/Library/Application Support/bgremove-credits/`
    /// - Windows: `%APPDATA%/bgremove-credits/`
    ///
    /// # Errors
    /// - No directory configured and the platform data directory is unknown
    pub fn resolve_storage_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("bgremove-credits"))
            .ok_or_else(|| {
                CreditsError::invalid_config(format!(
                    "Failed to determine data directory. Set {} environment variable.",
                    STORAGE_DIR_ENV
                ))
            })
    }

    /// Instantiate the configured storage backend
    ///
    /// # Errors
    /// - Storage directory cannot be resolved
    /// - HTTP client cannot be created
    pub fn build_store(&self) -> Result<Arc<dyn CreditStore>> {
        self.validate()?;
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileCreditStore::new(self.resolve_storage_dir()?)),
            StorageBackend::Memory => Arc::new(MemoryCreditStore::new()),
            StorageBackend::Http => {
                let url = self.service_url.as_deref().ok_or_else(|| {
                    CreditsError::invalid_config("HTTP storage requires a service URL")
                })?;
                Arc::new(HttpCreditStore::new(
                    url,
                    Duration::from_secs(self.http_timeout_secs),
                )?)
            },
        })
    }
}

/// Builder for `StudioConfig`
#[derive(Debug, Default)]
pub struct StudioConfigBuilder {
    config: StudioConfig,
}

impl StudioConfigBuilder {
    #[must_use]
    pub fn storage(mut self, storage: StorageBackend) -> Self {
        self.config.storage = storage;
        self
    }

    #[must_use]
    pub fn storage_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.storage_dir = Some(dir.into());
        self
    }

    /// Set the credit service URL and switch to the HTTP backend
    #[must_use]
    pub fn service_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.service_url = Some(url.into());
        self.config.storage = StorageBackend::Http;
        self
    }

    #[must_use]
    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn default_plan(mut self, plan: PlanTier) -> Self {
        self.config.default_plan = plan;
        self
    }

    #[must_use]
    pub fn engine_binary<S: Into<String>>(mut self, binary: S) -> Self {
        self.config.engine_binary = binary.into();
        self
    }

    #[must_use]
    pub fn model_path(mut self, model_path: Option<String>) -> Self {
        self.config.model_path = model_path;
        self
    }

    #[must_use]
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule of [`StudioConfig::validate`] fails
    pub fn build(self) -> Result<StudioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
