//! Status command handler

use anyhow::{Context, Result};

use promptdeck_core::{Config, PromptService};

use crate::output::{Output, OutputFormat};

/// Show which store is in use and whether it answers
pub async fn show(service: &PromptService, config: &Config, output: &Output) -> Result<()> {
    let report = service
        .check_connection()
        .await
        .with_context(|| format!("The {} store did not answer", service.backend_name()))?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "backend": report.backend,
                    "collection": report.collection,
                    "records": report.records,
                    "timeout_secs": service.settings().timeout.as_secs(),
                    "fallback_path": config.fallback_store_path(),
                    "project_id": config.firebase.project_id,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", report.backend);
        }
        OutputFormat::Human => {
            println!("promptdeck Status");
            println!("=================");
            println!();
            println!("Store:");
            println!("  Backend:    {}", report.backend);
            if service.uses_fallback() {
                println!(
                    "  Location:   {}",
                    config.fallback_store_path().display()
                );
                if !config.firebase.is_configured() {
                    println!("  Firebase is not configured. Set it with:");
                    println!("    promptdeck config set firebase.project_id <id>");
                    println!("    promptdeck config set firebase.api_key <key>");
                }
            } else if let Some(ref project) = config.firebase.project_id {
                println!("  Project:    {}", project);
            }
            println!("  Timeout:    {}s", service.settings().timeout.as_secs());
            println!();
            println!("Contents:");
            println!("  Collection: {}", report.collection);
            println!("  Records:    {}", report.records);
        }
    }

    Ok(())
}
