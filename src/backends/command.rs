//! Engine that shells out to the `imgly-bgremove` command-line tool

use super::{EngineConfig, ProcessedImage, RemovalEngine};
use crate::{
    error::{CreditsError, Result},
    validation::UploadFile,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default engine binary looked up on `PATH`
pub const DEFAULT_ENGINE_BINARY: &str = "imgly-bgremove";

/// Runs `<binary> <input> -o <output> -f png [-m <model>]` once per image
#[derive(Debug, Clone)]
pub struct CommandEngine {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_BINARY)
    }
}

impl CommandEngine {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append arguments to every invocation (e.g. `--execution-provider onnx:cpu`)
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments for one invocation
    fn build_args(&self, input: &Path, output: &Path, config: &EngineConfig) -> Vec<String> {
        let mut args = vec![
            input.display().to_string(),
            "-o".to_string(),
            output.display().to_string(),
            "-f".to_string(),
            "png".to_string(),
        ];
        if let Some(model) = &config.model_path {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl RemovalEngine for CommandEngine {
    async fn remove(&self, file: &UploadFile, config: &EngineConfig) -> Result<ProcessedImage> {
        let work_dir = tempfile::Builder::new()
            .prefix("bgremove-credits-")
            .tempdir()
            .map_err(|e| CreditsError::engine_failure("prepare", &e.to_string(), Some(&file.name)))?;

        let input = work_dir
            .path()
            .join(format!("input.{}", file.extension().unwrap_or("img")));
        let output = work_dir.path().join("output.png");
        tokio::fs::write(&input, &file.bytes)
            .await
            .map_err(|e| CreditsError::file_io_error("stage upload", &input, &e))?;

        let args = self.build_args(&input, &output, config);
        debug!(binary = %self.binary.display(), ?args, "Running removal engine");

        let result = tokio::process::Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CreditsError::engine_failure(
                    "spawn",
                    &format!("could not run '{}': {}", self.binary.display(), e),
                    Some(&file.name),
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let details = match stderr.trim() {
                "" => format!("engine exited with {}", result.status),
                text => text.to_string(),
            };
            return Err(CreditsError::engine_failure("inference", &details, Some(&file.name)));
        }
        trace!(stdout = %String::from_utf8_lossy(&result.stdout), "Engine output");

        let bytes = tokio::fs::read(&output).await.map_err(|e| {
            CreditsError::engine_failure(
                "read output",
                &format!("engine produced no output: {}", e),
                Some(&file.name),
            )
        })?;

        if image::guess_format(&bytes).ok() != Some(image::ImageFormat::Png) {
            return Err(CreditsError::engine_failure(
                "read output",
                "engine output is not a PNG image",
                Some(&file.name),
            ));
        }

        Ok(ProcessedImage::png(bytes))
    }

    fn name(&self) -> &str {
        "command"
    }
}
