//! Upload validation
//!
//! Uploads are checked before the ledger is consulted: a rejected file never
//! costs a credit. Messages are user-facing and returned verbatim in
//! [`CreditsError::Validation`].

use crate::{
    error::{CreditsError, Result},
    plans::PlanLimits,
};
use std::io::Cursor;
use std::path::Path;

/// Message for anything that is not an image
pub const INVALID_TYPE_MESSAGE: &str = "Invalid file type. Please upload an image.";

/// An uploaded file: name, declared MIME type and contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Build an upload from memory with a declared MIME type
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mime_type: M, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an upload from disk.
    ///
    /// The MIME type comes from the file extension, falling back to the
    /// content signature, and finally to `application/octet-stream`.
    ///
    /// # Errors
    /// - File cannot be read
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let bytes = tokio::fs::read(path_ref)
            .await
            .map_err(|e| CreditsError::file_io_error("read upload", path_ref, &e))?;
        let name = path_ref
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime_type = detect_mime_type(path_ref, &bytes).to_string();
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }

    /// Size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the declared type is an image type
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Preferred file extension for the declared type, if it is a known image format
    #[must_use]
    pub fn extension(&self) -> Option<&'static str> {
        image::ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|format| format.extensions_str().first().copied())
    }
}

/// MIME type for a file on disk
#[must_use]
pub fn detect_mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::ImageFormat::from_path(path) {
        return format.to_mime_type();
    }
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("txt" | "md" | "csv") => "text/plain",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Pixel dimensions read from the image header
#[must_use]
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Checks uploads against a plan's limits
#[derive(Debug, Clone, Copy)]
pub struct UploadValidator {
    limits: PlanLimits,
}

impl UploadValidator {
    #[must_use]
    pub fn new(limits: PlanLimits) -> Self {
        Self { limits }
    }

    /// Message for a file over the size limit
    #[must_use]
    pub fn size_limit_message(&self) -> String {
        format!(
            "File size exceeds the {}MB limit. Please upload a smaller image or upgrade your plan.",
            self.limits.max_file_size_mb
        )
    }

    /// Dimensions of an image larger than the plan's resolution cap.
    ///
    /// `None` when it fits or when the header cannot be read; the engine is
    /// the one that decodes the full image.
    #[must_use]
    pub fn oversized_dimensions(&self, file: &UploadFile) -> Option<(u32, u32)> {
        let (width, height) = image_dimensions(&file.bytes)?;
        (!self.limits.fits_resolution(width, height)).then_some((width, height))
    }

    /// Accept or reject an upload. Type is checked before size.
    ///
    /// # Errors
    /// - `CreditsError::Validation` when the file is not an image or is too large
    pub fn validate(&self, file: &UploadFile) -> Result<()> {
        if !file.is_image() {
            return Err(CreditsError::validation(INVALID_TYPE_MESSAGE));
        }

        if file.size_bytes() > self.limits.max_file_size_bytes() {
            return Err(CreditsError::validation(self.size_limit_message()));
        }

        Ok(())
    }
}
