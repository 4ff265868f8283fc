//! Credit-metered background removal CLI
//!
//! Spends one credit per image and runs the configured background removal
//! engine on it.

#[cfg(feature = "cli")]
use bgremove_credits::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
