//! Background removal engines
//!
//! The segmentation itself is done by an external engine; this crate only
//! decides whether an upload may be processed and what it costs. Engines
//! implement [`RemovalEngine`]:
//! - [`CommandEngine`]: runs the `imgly-bgremove` command-line tool
//! - [`test_utils::MockEngine`]: scripted engine for tests

pub mod command;
pub mod test_utils;

pub use self::command::CommandEngine;

use crate::{error::Result, plans::PlanLimits, validation::UploadFile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Settings handed to the engine with every image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model name, URL or asset folder (`None` = engine default)
    pub model_path: Option<String>,
    /// Limits of the caller's plan
    pub limits: PlanLimits,
}

impl EngineConfig {
    #[must_use]
    pub fn new(model_path: Option<String>, limits: PlanLimits) -> Self {
        Self { model_path, limits }
    }
}

/// Result of a successful removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Encoded image with transparency
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime_type: String,
}

impl ProcessedImage {
    #[must_use]
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".to_string(),
        }
    }
}

/// An external background removal engine
#[async_trait]
pub trait RemovalEngine: Send + Sync {
    /// Remove the background of `file`
    ///
    /// # Errors
    /// - Engine unavailable or crashed
    /// - Input not decodable by the engine
    /// Error messages are shown to the user as-is.
    async fn remove(&self, file: &UploadFile, config: &EngineConfig) -> Result<ProcessedImage>;

    /// Short engine name for logs
    fn name(&self) -> &str;
}
