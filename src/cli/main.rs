//! Credit-metered background removal CLI
//!
//! Every processed image costs one credit from the local (or remote) ledger.

use super::config::CliConfigBuilder;
use crate::{
    account::CreditsAccount,
    backends::CommandEngine,
    config::StudioConfig,
    error::CreditsError,
    history::UsageHistory,
    ledger::CreditsLedger,
    plans::PlanTier,
    processor::RemovalSession,
    services::TracingNotifier,
    store::CreditStore,
    tracing_config::{events, init_cli_tracing, spans},
    validation::UploadFile,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Extensions picked up when an input is a directory
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif", "gif"];

/// History entries shown by a bare `--history`
const DEFAULT_HISTORY_ENTRIES: &str = "10";

/// Credit-metered background removal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-credits")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present_any = &["show_credits", "history", "show_storage_dir"])]
    pub input: Vec<String>,

    /// Output file (single input) or directory (several inputs)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Plan of the account created on first run
    #[arg(long, value_name = "PLAN")]
    pub plan: Option<PlanTier>,

    /// Model name, URL, or path to model folder passed to the engine
    #[arg(short, long)]
    pub model: Option<String>,

    /// Background removal engine binary [default: imgly-bgremove]
    #[arg(long, value_name = "PATH")]
    pub engine_bin: Option<String>,

    /// Load settings from a JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the credits record
    #[arg(long, value_name = "PATH")]
    pub storage_dir: Option<PathBuf>,

    /// Keep credits on a remote service instead of local files
    #[arg(long, value_name = "URL")]
    pub service_url: Option<String>,

    /// Show remaining credits and exit
    #[arg(long)]
    pub show_credits: bool,

    /// Show the most recent removals and exit
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = DEFAULT_HISTORY_ENTRIES)]
    pub history: Option<usize>,

    /// Show where credits are stored and exit
    #[arg(long)]
    pub show_storage_dir: bool,

    /// Print credits and history as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let store = config
        .build_store()
        .context("Failed to open credit storage")?;

    let span = spans::session(&session_id, &store.describe());
    run(cli, config, store).instrument(span).await
}

async fn run(cli: Cli, config: StudioConfig, store: Arc<dyn CreditStore>) -> Result<()> {
    if cli.show_storage_dir {
        println!("{}", store.describe());
        return Ok(());
    }

    let ledger = Arc::new(CreditsLedger::new(store.clone()).with_default_tier(config.default_plan));
    let account = ledger.load().await;
    let history = Arc::new(UsageHistory::with_limit(store, config.history_limit));

    if cli.show_credits {
        return print_credits(&account, cli.json);
    }

    if let Some(entries) = cli.history {
        return print_history(&history, entries, cli.json).await;
    }

    if cli.input.is_empty() {
        bail!("At least one input is required");
    }

    let files = collect_inputs(&cli.input, cli.recursive)?;
    if files.is_empty() {
        bail!("No image files found in: {}", cli.input.join(", "));
    }

    if let Some(limit) = account.plan_tier.limits().batch_limit {
        if files.len() > limit {
            bail!(
                "The {} plan processes at most {} image(s) per run, got {}. Upgrade your plan for larger batches.",
                account.plan_tier.display_name(),
                limit,
                files.len()
            );
        }
    }

    let output_dir = prepare_output_dir(cli.output.as_deref(), files.len())?;

    info!(
        inputs = files.len(),
        available = account.available,
        plan = %account.plan_tier,
        "Starting credit-metered background removal"
    );

    let engine = Arc::new(CommandEngine::new(&config.engine_binary));
    let mut session = RemovalSession::new(ledger.clone(), engine)
        .with_notifier(Arc::new(TracingNotifier))
        .with_history(history);
    if let Some(model) = &config.model_path {
        session = session.with_model_path(model.clone());
    }

    let progress_bar = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut processed = 0usize;
    let mut failures: Vec<(PathBuf, anyhow::Error)> = Vec::new();

    for (index, input_path) in files.iter().enumerate() {
        if let Some(pb) = &progress_bar {
            pb.set_message(format!("Processing {}", input_path.display()));
        }

        let output_path = output_path_for(input_path, cli.output.as_deref(), output_dir.as_deref());
        match process_file(&mut session, input_path, &output_path).await {
            Ok(()) => {
                processed += 1;
                debug!(input = %input_path.display(), output = %output_path.display(), "Saved result");
            },
            Err(e) => {
                let out_of_credits = matches!(
                    e.downcast_ref::<CreditsError>(),
                    Some(CreditsError::InsufficientCredits { .. })
                );
                events::error_with_context(&*e, &input_path.display().to_string());
                failures.push((input_path.clone(), e));
                if out_of_credits {
                    let skipped = files.len() - index - 1;
                    if skipped > 0 {
                        warn!(skipped, "Out of credits, skipping remaining files");
                    }
                    break;
                }
            },
        }

        if let Some(pb) = &progress_bar {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Done");
    }

    let credits = ledger.snapshot();
    println!(
        "Processed {} of {} image(s) in {:.2}s. Credits: {}/{} left ({} plan)",
        processed,
        files.len(),
        start.elapsed().as_secs_f64(),
        credits.available,
        credits.max_credits,
        credits.plan_tier.display_name()
    );
    if credits.is_low() {
        events::low_credits(credits.available, credits.max_credits);
    }

    if !failures.is_empty() {
        for (path, error) in &failures {
            eprintln!("{}: {:#}", path.display(), error);
        }
        bail!("{} of {} file(s) failed", failures.len(), files.len());
    }

    Ok(())
}

async fn process_file(
    session: &mut RemovalSession,
    input_path: &Path,
    output_path: &Path,
) -> Result<()> {
    let file = UploadFile::from_path(input_path)
        .await
        .with_context(|| format!("Failed to read {}", input_path.display()))?;
    session.select_file(file).await?;
    let image = session.remove_background().await?;
    tokio::fs::write(output_path, &image.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(())
}

fn print_credits(account: &CreditsAccount, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(account).context("Failed to serialize credits")?
        );
        return Ok(());
    }

    println!("Plan:        {}", account.plan_tier.display_name());
    println!("Available:   {} / {}", account.available, account.max_credits);
    println!("Used:        {} ({}%)", account.used, account.percent_used());
    println!("Resets on:   {}", account.reset_date.format("%Y-%m-%d"));
    if account.is_low() {
        println!("Running low on credits. Upgrade your plan for more.");
    }
    Ok(())
}

async fn print_history(history: &UsageHistory, entries: usize, json: bool) -> Result<()> {
    let records = history
        .recent(entries)
        .await
        .context("Failed to read usage history")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize history")?
        );
        return Ok(());
    }

    if records.is_empty() {
        println!("No background removals yet.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:<7}  {:>7}  {}",
            record.date.format("%Y-%m-%d %H:%M"),
            record.status,
            record.display_size(),
            record.file_name
        );
    }
    Ok(())
}

/// Resolve CLI inputs to a sorted, de-duplicated list of files.
///
/// Files named explicitly are kept whatever their type, so an unsupported
/// upload is reported by validation. Directories contribute only files with
/// an image extension, descending into subdirectories when `recursive`.
///
/// # Errors
/// - An input does not exist
/// - A directory cannot be read
pub fn collect_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            all_files.push(path);
        } else if path.is_dir() {
            let walker = walkdir::WalkDir::new(&path).min_depth(1);
            let walker = if recursive { walker } else { walker.max_depth(1) };
            for entry in walker {
                let entry = entry
                    .with_context(|| format!("Failed to read directory {}", path.display()))?;
                if entry.file_type().is_file() && has_image_extension(entry.path()) {
                    all_files.push(entry.into_path());
                }
            }
        } else {
            bail!("Input path does not exist: {}", input);
        }
    }

    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Where the result for `input_path` is written.
///
/// A single input with `-o` writes exactly there, unless `-o` is an existing
/// directory. Otherwise results are named `<stem>_bg_removed.png`, inside the
/// output directory if there is one and next to the input if not.
#[must_use]
pub fn output_path_for(input_path: &Path, output: Option<&str>, output_dir: Option<&Path>) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    let file_name = format!("{}_bg_removed.png", stem.to_string_lossy());

    match (output, output_dir) {
        (_, Some(dir)) => dir.join(file_name),
        (Some(output), None) if Path::new(output).is_dir() => Path::new(output).join(file_name),
        (Some(output), None) => PathBuf::from(output),
        (None, None) => input_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(file_name),
    }
}

/// With several inputs, `-o` names a directory that is created on demand
fn prepare_output_dir(output: Option<&str>, file_count: usize) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };
    if file_count <= 1 {
        return Ok(None);
    }

    let dir = PathBuf::from(output);
    if dir.is_file() {
        bail!(
            "Output path {} is a file, but {} inputs need a directory",
            dir.display(),
            file_count
        );
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(Some(dir))
}
