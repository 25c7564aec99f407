//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use hypo_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, remote_url, remote_api_key, access_token, owner_id, \
                          remote_table, sync_enabled, log_file, log_level";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "remote_url": config.remote_url,
                    "remote_api_key": config.remote_api_key.as_deref().map(mask),
                    "access_token": config.access_token.as_deref().map(mask),
                    "owner_id": config.owner_id,
                    "remote_table": config.remote_table,
                    "sync_enabled": config.sync_enabled,
                    "log_file": config.log_file,
                    "log_level": config.log_level
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let not_set = || "(not set)".to_string();
            println!("Configuration:");
            println!("  data_dir:       {}", config.data_dir.display());
            println!(
                "  remote_url:     {}",
                config.remote_url.clone().unwrap_or_else(not_set)
            );
            println!(
                "  remote_api_key: {}",
                config.remote_api_key.as_deref().map(mask).unwrap_or_else(not_set)
            );
            println!(
                "  access_token:   {}",
                config.access_token.as_deref().map(mask).unwrap_or_else(not_set)
            );
            println!(
                "  owner_id:       {}",
                config.owner_id.clone().unwrap_or_else(not_set)
            );
            println!("  remote_table:   {}", config.remote_table);
            println!("  sync_enabled:   {}", config.sync_enabled);
            println!(
                "  log_file:       {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(not_set)
            );
            println!("  log_level:      {}", config.log_level());
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
///
/// An empty value or "none" clears optional settings.
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = match key.as_str() {
        "remote_api_key" | "access_token" => mask(&value),
        _ => value,
    };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "remote_url" => config.remote_url = optional(value),
        "remote_api_key" => config.remote_api_key = optional(value),
        "access_token" => config.access_token = optional(value),
        "owner_id" => config.owner_id = optional(value),
        "remote_table" => {
            if value.is_empty() {
                bail!("remote_table cannot be empty");
            }
            config.remote_table = value.to_string();
        }
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        "log_level" => {
            let level = optional(value);
            if let Some(ref level) = level {
                if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
                    bail!("Invalid log level '{}'. Use error, warn, info, debug or trace.", level);
                }
            }
            config.log_level = level;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Show only the last four characters of a secret
fn mask(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();
        apply(&mut config, "remote_url", "https://example.supabase.co").unwrap();
        apply(&mut config, "owner_id", "user-1").unwrap();
        apply(&mut config, "sync_enabled", "true").unwrap();
        apply(&mut config, "log_level", "debug").unwrap();

        assert_eq!(config.remote_url.as_deref(), Some("https://example.supabase.co"));
        assert!(config.remote_configured());
        assert_eq!(config.log_level(), "debug");

        apply(&mut config, "owner_id", "none").unwrap();
        assert!(config.owner_id.is_none());
        assert!(!config.remote_configured());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();
        assert!(apply(&mut config, "favorite_tag", "x").is_err());
        assert!(apply(&mut config, "sync_enabled", "maybe").is_err());
        assert!(apply(&mut config, "log_level", "loud").is_err());
        assert!(apply(&mut config, "remote_table", "").is_err());
    }

    #[test]
    fn test_set_writes_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("data_dir = {:?}\n", dir.path().join("data").display().to_string()),
        )
        .unwrap();
        let output = Output::new(OutputFormat::Quiet);

        set("owner_id".into(), "user-9".into(), Some(&path), &output).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.owner_id.as_deref(), Some("user-9"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("secret-key-1234"), "****1234");
    }
}
