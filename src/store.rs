//! Persistence backends for the credits ledger and usage history
//!
//! A store is a small key-value surface over JSON documents, the same shape as
//! browser local storage: one document per fixed key. The ledger keeps its
//! account under [`CREDITS_KEY`], the usage history under [`HISTORY_KEY`].
//!
//! Three backends are provided:
//! - [`FileCreditStore`]: one `<key>.json` file per key in a storage directory
//! - [`MemoryCreditStore`]: process-local map, used by tests and embedders
//! - [`HttpCreditStore`]: `GET`/`PUT {base_url}/{key}` against a remote service

use crate::error::{CreditsError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

/// Storage key of the credits account
pub const CREDITS_KEY: &str = "userCredits";

/// Storage key of the usage history
pub const HISTORY_KEY: &str = "usageHistory";

/// Key-value persistence for JSON documents
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Read the document stored under `key`, `None` if there is none
    ///
    /// # Errors
    /// - Storage unreachable or unreadable
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document stored under `key`
    ///
    /// # Errors
    /// - Storage unreachable or not writable
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Human-readable location, for logs and `--show-storage-dir`
    fn describe(&self) -> String;
}

/// Keys become file names and URL segments, so keep them to a safe alphabet
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CreditsError::invalid_config(format!(
            "Invalid storage key '{}': use ASCII letters, digits, '_' or '-'",
            key
        )));
    }
    Ok(())
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileCreditStore {
    dir: PathBuf,
}

impl FileCreditStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CreditStore for FileCreditStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                trace!(path = %path.display(), bytes = contents.len(), "Read stored document");
                Ok(Some(contents))
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CreditsError::file_io_error("read", &path, &e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CreditsError::file_io_error("create storage directory", &self.dir, &e))?;

        // Write to a sibling and rename so readers never see a partial record
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&tmp_path, value)
            .await
            .map_err(|e| CreditsError::file_io_error("write", &tmp_path, &e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| CreditsError::file_io_error("replace", &path, &e))?;

        debug!(path = %path.display(), "Persisted document");
        Ok(())
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// In-process store with switchable failures for exercising error paths
#[derive(Debug, Default)]
pub struct MemoryCreditStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryCreditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls so far
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `set` calls so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw document under `key`, bypassing failure injection
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Seed a raw document, bypassing failure injection
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CreditsError::internal("memory store read failure"));
        }
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CreditsError::internal("memory store write failure"));
        }
        self.insert_raw(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Remote store speaking plain JSON over HTTP.
///
/// `GET {base_url}/{key}` returns the document (404 when absent) and
/// `PUT {base_url}/{key}` replaces it.
#[derive(Debug, Clone)]
pub struct HttpCreditStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCreditStore {
    /// Create an HTTP store
    ///
    /// # Errors
    /// - Base URL is not http(s)
    /// - Failed to create HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(CreditsError::invalid_config(format!(
                "Credit service URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CreditsError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: trimmed.to_string(),
        })
    }

    /// URL of the document for `key`
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl CreditStore for HttpCreditStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let url = self.url_for(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CreditsError::network_error(&format!("GET {}", url), e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| CreditsError::network_error(&format!("GET {}", url), e))?;
        let body = response
            .text()
            .await
            .map_err(|e| CreditsError::network_error(&format!("GET {}", url), e))?;
        Ok(Some(body))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let url = self.url_for(key);
        self.client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(value.to_string())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CreditsError::network_error(&format!("PUT {}", url), e))?;
        debug!(url = %url, "Persisted document remotely");
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
