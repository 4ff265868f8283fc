//! Credit-metered removal session
//!
//! [`RemovalSession`] is the caller-side contract around the ledger and the
//! engine, used by the CLI and by embedders alike:
//!
//! 1. an upload is validated when selected, so a rejected file never costs a credit
//! 2. `debit(1)` must succeed before the engine is called
//! 3. an engine failure after the debit keeps the credit spent
//!
//! The session also keeps the view state a frontend renders: the selected
//! image, the processed result, a loading flag and the last error.

use crate::{
    account::CreditsAccount,
    backends::{EngineConfig, ProcessedImage, RemovalEngine},
    error::{CreditsError, Result},
    history::{UsageHistory, UsageRecord},
    ledger::CreditsLedger,
    services::{Notification, NoOpNotifier, Notifier, PROCESSING_ID},
    tracing_config::{events, spans},
    validation::{UploadFile, UploadValidator},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Credits charged per background removal
pub const CREDITS_PER_REMOVAL: u32 = 1;

/// Shown when `remove_background` is called without a selected file
pub const NO_IMAGE_MESSAGE: &str = "No image selected.";

/// Shown when the ledger refuses the debit
pub const INSUFFICIENT_CREDITS_MESSAGE: &str =
    "Insufficient credits. Please upgrade your plan to continue.";

/// Fallback when the engine fails without a message
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to remove background. Please try again.";

/// One user's removal workflow over a shared ledger
pub struct RemovalSession {
    ledger: Arc<CreditsLedger>,
    engine: Arc<dyn RemovalEngine>,
    notifier: Arc<dyn Notifier>,
    history: Option<Arc<UsageHistory>>,
    model_path: Option<String>,
    selected: Option<Arc<UploadFile>>,
    processed: Option<ProcessedImage>,
    is_loading: bool,
    error: Option<String>,
}

impl RemovalSession {
    /// Create a session with no notifier and no usage history
    pub fn new(ledger: Arc<CreditsLedger>, engine: Arc<dyn RemovalEngine>) -> Self {
        Self {
            ledger,
            engine,
            notifier: Arc::new(NoOpNotifier),
            history: None,
            model_path: None,
            selected: None,
            processed: None,
            is_loading: false,
            error: None,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<UsageHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Model name, URL or asset folder passed to the engine
    #[must_use]
    pub fn with_model_path<S: Into<String>>(mut self, model_path: S) -> Self {
        self.model_path = Some(model_path.into());
        self
    }

    /// Select an upload, replacing any previous selection and result.
    ///
    /// The file is validated against the limits of the current plan. A ledger
    /// that was never loaded is loaded first, so the stored plan applies
    /// rather than the default one.
    ///
    /// # Errors
    /// - `CreditsError::Validation` if the file is not an image or too large;
    ///   the selection is then empty
    pub async fn select_file(&mut self, file: UploadFile) -> Result<()> {
        self.processed = None;
        self.error = None;

        let tier = if self.ledger.is_loaded() {
            self.ledger.snapshot().plan_tier
        } else {
            self.ledger.load().await.plan_tier
        };
        let validator = UploadValidator::new(tier.limits());
        if let Err(e) = validator.validate(&file) {
            debug!(file = %file.name, mime = %file.mime_type, size = file.size_bytes(), "Upload rejected");
            self.fail(&e.to_string(), None);
            self.selected = None;
            return Err(e);
        }

        if let Some((width, height)) = validator.oversized_dimensions(&file) {
            let (max_w, max_h) = tier.limits().max_resolution;
            events::warning_with_recommendation(
                &format!(
                    "{} is {}x{}, above the {} plan's {}x{}",
                    file.name,
                    width,
                    height,
                    tier.display_name(),
                    max_w,
                    max_h
                ),
                "Upgrade your plan to process full-resolution images",
            );
        }

        self.selected = Some(Arc::new(file));
        Ok(())
    }

    /// Spend one credit and run the engine on the selected file.
    ///
    /// # Errors
    /// - `CreditsError::Validation` when nothing is selected (no debit)
    /// - `CreditsError::InsufficientCredits` when the ledger refuses (no engine call)
    /// - `CreditsError::Engine` when the engine fails (credit stays spent)
    pub async fn remove_background(&mut self) -> Result<&ProcessedImage> {
        let Some(file) = self.selected.clone() else {
            self.error = Some(NO_IMAGE_MESSAGE.to_string());
            self.notifier
                .notify(Notification::error("Please select an image first."));
            return Err(CreditsError::validation(NO_IMAGE_MESSAGE));
        };

        let span = spans::removal(&file.name, file.size_bytes());
        self.run_removal(file).instrument(span).await
    }

    async fn run_removal(&mut self, file: Arc<UploadFile>) -> Result<&ProcessedImage> {
        self.error = None;
        self.processed = None;

        if !self.ledger.debit(CREDITS_PER_REMOVAL).await {
            let available = self.ledger.snapshot().available;
            self.fail(INSUFFICIENT_CREDITS_MESSAGE, None);
            return Err(CreditsError::InsufficientCredits {
                requested: CREDITS_PER_REMOVAL,
                available,
            });
        }

        self.is_loading = true;
        self.notifier
            .notify(Notification::info("Processing image...").with_id(PROCESSING_ID));

        let config = EngineConfig::new(
            self.model_path.clone(),
            self.ledger.snapshot().plan_tier.limits(),
        );
        let start = Instant::now();
        let outcome = self.engine.remove(&file, &config).await;
        self.is_loading = false;

        match outcome {
            Ok(image) => {
                info!(
                    engine = self.engine.name(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    output_bytes = image.bytes.len(),
                    "Background removed"
                );
                self.notifier.notify(
                    Notification::success("Background removed successfully!")
                        .with_id(PROCESSING_ID),
                );
                self.record_usage(UsageRecord::success(
                    file.name.clone(),
                    file.size_bytes(),
                    Utc::now(),
                ))
                .await;
                Ok(self.processed.insert(image))
            },
            Err(e) => {
                let message = match e.to_string() {
                    m if m.trim().is_empty() => GENERIC_FAILURE_MESSAGE.to_string(),
                    m => m,
                };
                warn!(engine = self.engine.name(), error = %message, "Background removal failed, credit not refunded");
                self.fail(&message, Some(PROCESSING_ID));
                self.record_usage(UsageRecord::failed(
                    file.name.clone(),
                    file.size_bytes(),
                    Utc::now(),
                    message.clone(),
                ))
                .await;
                Err(CreditsError::engine(message))
            },
        }
    }

    /// Forget the selection, the result and the last error
    pub fn clear(&mut self) {
        self.selected = None;
        self.processed = None;
        self.error = None;
    }

    /// Currently selected upload
    #[must_use]
    pub fn original(&self) -> Option<&UploadFile> {
        self.selected.as_deref()
    }

    /// Result of the last successful removal
    #[must_use]
    pub fn processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }

    /// Whether the engine is running
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Last user-facing error
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current credits as last published by the ledger
    #[must_use]
    pub fn credits(&self) -> CreditsAccount {
        self.ledger.snapshot()
    }

    fn fail(&mut self, message: &str, id: Option<&str>) {
        self.error = Some(message.to_string());
        let notification = Notification::error(message);
        self.notifier.notify(match id {
            Some(id) => notification.with_id(id),
            None => notification,
        });
    }

    async fn record_usage(&self, record: UsageRecord) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record(record).await {
                warn!(error = %e, "Failed to record usage history");
            }
        }
    }
}
