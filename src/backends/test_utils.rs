//! Test utilities and a mock engine for testing removal workflows
//!
//! [`MockEngine`] implements [`RemovalEngine`] without any model files or
//! external binaries. It records every call and can be told to fail.

use super::{EngineConfig, ProcessedImage, RemovalEngine};
use crate::{
    error::{CreditsError, Result},
    validation::UploadFile,
};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Scripted engine for tests
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// File names passed to `remove`, in call order
    call_history: Arc<Mutex<Vec<String>>>,
    /// Configs passed to `remove`, in call order
    configs: Arc<Mutex<Vec<EngineConfig>>>,
    /// Error message to fail with, if any
    failure: Option<String>,
}

impl MockEngine {
    /// Create a mock engine that succeeds with a small transparent PNG
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_history: Arc::new(Mutex::new(Vec::new())),
            configs: Arc::new(Mutex::new(Vec::new())),
            failure: None,
        }
    }

    /// Create a mock engine that fails every call with `message`
    #[must_use]
    pub fn new_failing<S: Into<String>>(message: S) -> Self {
        let mut engine = Self::new();
        engine.failure = Some(message.into());
        engine
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    /// Configs received so far
    pub fn get_configs(&self) -> Vec<EngineConfig> {
        self.configs.lock().unwrap().clone()
    }

    /// Number of `remove` calls so far
    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    /// Clear the call history
    pub fn clear_call_history(&self) {
        self.call_history.lock().unwrap().clear();
        self.configs.lock().unwrap().clear();
    }

    /// A 2x2 PNG with one transparent pixel
    pub fn sample_png() -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([200, 40, 40, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .expect("encoding a 2x2 PNG into memory cannot fail");
        out.into_inner()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemovalEngine for MockEngine {
    async fn remove(&self, file: &UploadFile, config: &EngineConfig) -> Result<ProcessedImage> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(file.name.clone());
        }
        if let Ok(mut configs) = self.configs.lock() {
            configs.push(config.clone());
        }

        if let Some(message) = &self.failure {
            return Err(CreditsError::engine(message.clone()));
        }

        Ok(ProcessedImage::png(Self::sample_png()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
