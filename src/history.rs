//! Usage history of background removals
//!
//! Kept under its own storage key so the credits record keeps its layout.

use crate::{
    error::Result,
    store::{CreditStore, HISTORY_KEY},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entries kept before the oldest are dropped
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Outcome of one removal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Success,
    Failed,
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One removal attempt that spent a credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub file_name: String,
    pub size_bytes: u64,
    pub status: UsageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UsageRecord {
    pub fn success<S: Into<String>>(file_name: S, size_bytes: u64, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            file_name: file_name.into(),
            size_bytes,
            status: UsageStatus::Success,
            error: None,
        }
    }

    pub fn failed<S: Into<String>, E: Into<String>>(
        file_name: S,
        size_bytes: u64,
        date: DateTime<Utc>,
        error: E,
    ) -> Self {
        Self {
            error: Some(error.into()),
            status: UsageStatus::Failed,
            ..Self::success(file_name, size_bytes, date)
        }
    }

    /// Size as shown in the dashboard, e.g. "1.2MB"
    #[must_use]
    pub fn display_size(&self) -> String {
        format!("{:.1}MB", self.size_bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Append-only log of removal attempts, capped at a fixed length
pub struct UsageHistory {
    store: Arc<dyn CreditStore>,
    limit: usize,
    lock: Mutex<()>,
}

impl UsageHistory {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self::with_limit(store, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(store: Arc<dyn CreditStore>, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Append a record, dropping the oldest beyond the limit
    ///
    /// # Errors
    /// - Storage read or write failure
    pub async fn record(&self, record: UsageRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.push(record);
        if records.len() > self.limit {
            let excess = records.len() - self.limit;
            records.drain(..excess);
        }
        let json = serde_json::to_string(&records)?;
        self.store.set(HISTORY_KEY, &json).await?;
        debug!(entries = records.len(), "Usage history updated");
        Ok(())
    }

    /// Up to `limit` records, newest first
    ///
    /// # Errors
    /// - Storage read failure
    pub async fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let mut records = self.read_all().await?;
        records.sort_by(|a, b| b.date.cmp(&a.date));
        records.truncate(limit);
        Ok(records)
    }

    async fn read_all(&self) -> Result<Vec<UsageRecord>> {
        let Some(raw) = self.store.get(HISTORY_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(error = %e, "Stored usage history is malformed, starting a new one");
                Ok(Vec::new())
            },
        }
    }
}
