//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use promptdeck_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, collection, store_timeout_secs, force_fallback, log_file, \
     firebase.api_key, firebase.auth_domain, firebase.project_id, firebase.storage_bucket, \
     firebase.messaging_sender_id, firebase.app_id, firebase.endpoint";

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
                    "collection": config.collection,
                    "store_timeout_secs": config.store_timeout_secs,
                    "force_fallback": config.force_fallback,
                    "log_file": config.log_file,
                    "firebase": {
                        "project_id": config.firebase.project_id,
                        "api_key": config.firebase.api_key.as_deref().map(mask),
                        "endpoint": config.firebase.endpoint,
                        "configured": config.firebase.is_configured(),
                    },
                    "backend": if config.uses_fallback() { "local" } else { "firestore" },
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
            println!("Configuration:");
            println!("  data_dir:           {}", config.data_dir.display());
            println!("  collection:         {}", config.collection);
            println!("  store_timeout_secs: {}", config.store_timeout_secs);
            println!("  force_fallback:     {}", config.force_fallback);
            println!(
                "  log_file:           {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Firebase:");
            println!("  project_id: {}", or_unset(config.firebase.project_id.as_deref()));
            println!(
                "  api_key:    {}",
                config
                    .firebase
                    .api_key
                    .as_deref()
                    .map(mask)
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            if let Some(ref endpoint) = config.firebase.endpoint {
                println!("  endpoint:   {}", endpoint);
            }
            println!();
            println!(
                "Backend: {}",
                if config.uses_fallback() {
                    "local fallback store"
                } else {
                    "firestore"
                }
            );
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "collection" => {
            config.collection = value.parse().map_err(anyhow::Error::msg)?;
        }
        "store_timeout_secs" => {
            let secs: u64 = value
                .parse()
                .context("Invalid value for store_timeout_secs. Use a whole number of seconds.")?;
            if secs == 0 {
                bail!("store_timeout_secs must be greater than zero");
            }
            config.store_timeout_secs = secs;
        }
        "force_fallback" => {
            config.force_fallback = value
                .parse()
                .context("Invalid value for force_fallback. Use 'true' or 'false'.")?;
        }
        "log_file" => {
            config.log_file = optional(value).map(PathBuf::from);
        }
        "firebase.api_key" => config.firebase.api_key = optional(value),
        "firebase.auth_domain" => config.firebase.auth_domain = optional(value),
        "firebase.project_id" => config.firebase.project_id = optional(value),
        "firebase.storage_bucket" => config.firebase.storage_bucket = optional(value),
        "firebase.messaging_sender_id" => config.firebase.messaging_sender_id = optional(value),
        "firebase.app_id" => config.firebase.app_id = optional(value),
        "firebase.endpoint" => config.firebase.endpoint = optional(value),
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

/// Empty string or "none" clears a value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
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
