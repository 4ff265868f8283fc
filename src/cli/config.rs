//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{StorageBackend, StudioConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated `StudioConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Layer the configuration: JSON file (or defaults), then environment,
    /// then explicit flags.
    pub(crate) fn from_cli(cli: &Cli) -> Result<StudioConfig> {
        let base = match &cli.config {
            Some(path) => StudioConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => StudioConfig::default(),
        };

        let config = Self::apply_flags(base.with_env_overrides(), cli);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn apply_flags(mut config: StudioConfig, cli: &Cli) -> StudioConfig {
        if let Some(dir) = &cli.storage_dir {
            config.storage_dir = Some(dir.clone());
            config.storage = StorageBackend::File;
        }
        if let Some(url) = &cli.service_url {
            config.service_url = Some(url.clone());
            config.storage = StorageBackend::Http;
        }
        if let Some(plan) = cli.plan {
            config.default_plan = plan;
        }
        if let Some(bin) = &cli.engine_bin {
            config.engine_binary = bin.clone();
        }
        if let Some(model) = &cli.model {
            config.model_path = Some(model.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanTier;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["bgremove-credits"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--plan",
            "business",
            "--engine-bin",
            "/opt/bgremove",
            "--model",
            "isnet-fp16",
            "--storage-dir",
            "/tmp/credits",
            "in.png",
        ]);
        let config = CliConfigBuilder::apply_flags(StudioConfig::default(), &cli);

        assert_eq!(config.default_plan, PlanTier::Business);
        assert_eq!(config.engine_binary, "/opt/bgremove");
        assert_eq!(config.model_path.as_deref(), Some("isnet-fp16"));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/tmp/credits")));
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_service_url_selects_http_backend() {
        let cli = parse(&["--service-url", "https://credits.example.com/api", "--show-credits"]);
        let config = CliConfigBuilder::apply_flags(StudioConfig::default(), &cli);
        assert_eq!(config.storage, StorageBackend::Http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_flags_win_over_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"defaultPlan":"pro","engineBinary":"from-file","historyLimit":7}"#,
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--engine-bin",
            "from-flag",
            "--show-credits",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.default_plan, PlanTier::Pro);
        assert_eq!(config.history_limit, 7);
        assert_eq!(config.engine_binary, "from-flag");
    }

    #[test]
    fn test_unreadable_config_file_is_an_error() {
        let cli = parse(&["--config", "/definitely/missing.json", "--show-credits"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
