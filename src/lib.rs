#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Credit-metered background removal
//!
//! A credits ledger and the removal workflow around it. Every background
//! removal costs one credit; the ledger tracks what is left for the current
//! billing period, persists it, and refuses any debit it cannot cover.
//!
//! ## Features
//!
//! - **Serialized ledger**: concurrent debits can never overspend
//! - **Pluggable storage**: JSON files, memory, or a remote HTTP service
//! - **Plan tiers**: Free, Pro and Business with their credit and upload limits
//! - **Reset on read**: an ended period restores the full allowance
//! - **Upload validation**: rejected files never cost a credit
//! - **External engine**: runs `imgly-bgremove`, or any [`RemovalEngine`]
//! - **Usage history**: every attempt that spent a credit is logged
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_credits::{
//!     CommandEngine, CreditsLedger, RemovalSession, StudioConfig, UploadFile,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = StudioConfig::default().with_env_overrides();
//! let ledger = Arc::new(
//!     CreditsLedger::new(config.build_store()?).with_default_tier(config.default_plan),
//! );
//! let credits = ledger.load().await;
//! println!("{} of {} credits left", credits.available, credits.max_credits);
//!
//! let mut session = RemovalSession::new(ledger, Arc::new(CommandEngine::default()));
//! session.select_file(UploadFile::from_path("input.jpg").await?).await?;
//! let result = session.remove_background().await?;
//! std::fs::write("output.png", &result.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the ledger directly
//!
//! ```rust
//! use bgremove_credits::{CreditsLedger, MemoryCreditStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ledger = CreditsLedger::new(Arc::new(MemoryCreditStore::new()));
//! assert_eq!(ledger.load().await.available, 5);
//! assert!(ledger.debit(5).await);
//! assert!(!ledger.debit(1).await);
//! # }
//! ```

pub mod account;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod plans;
pub mod processor;
pub mod services;
pub mod store;
pub mod tracing_config;
pub mod validation;

// Public API exports
pub use account::CreditsAccount;
pub use backends::{CommandEngine, EngineConfig, ProcessedImage, RemovalEngine};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{StorageBackend, StudioConfig, StudioConfigBuilder};
pub use error::{CreditsError, Result};
pub use history::{UsageHistory, UsageRecord, UsageStatus};
pub use ledger::CreditsLedger;
pub use plans::{PlanLimits, PlanTier};
pub use processor::{RemovalSession, CREDITS_PER_REMOVAL};
pub use services::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use store::{CreditStore, FileCreditStore, HttpCreditStore, MemoryCreditStore};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
pub use validation::{UploadFile, UploadValidator};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
