//! promptdeck CLI
//!
//! Command-line interface for managing AI prompt buttons and topics.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use promptdeck_core::{Collection, Config, PromptQueries, PromptService, StoreError};

mod commands;
mod editor;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "promptdeck")]
#[command(about = "promptdeck - AI prompt buttons for the news reader")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (overrides PROMPTDECK_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Collection to work on (prompts or topics)
    #[arg(short, long, global = true)]
    collection: Option<Collection>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all prompts
    #[command(alias = "ls")]
    List,
    /// Show prompt details
    Show {
        /// Prompt ID (full ID or prefix)
        id: String,
    },
    /// Add a new prompt
    #[command(alias = "create")]
    Add {
        /// Button label
        #[arg(short, long)]
        label: String,
        /// Prompt text
        #[arg(short, long)]
        prompt: String,
        /// Button color (e.g. #007AFF)
        #[arg(long)]
        color: Option<String>,
    },
    /// Edit a prompt
    Edit {
        /// Prompt ID (full ID or prefix)
        id: String,
        /// New label
        #[arg(short, long)]
        label: Option<String>,
        /// New prompt text
        #[arg(short, long)]
        prompt: Option<String>,
        /// New color
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a prompt
    #[command(alias = "rm")]
    Delete {
        /// Prompt ID (full ID or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Move prompts to the front of the list
    Reorder {
        /// Prompt IDs in their new order
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Seed the default prompts into an empty collection
    Init,
    /// Show which store is in use and whether it answers
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, collection, firebase.project_id, ...)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need a store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let collection = cli.collection.unwrap_or(config.collection);
    let service = Arc::new(PromptService::from_config(&config, collection)?);
    info!(
        backend = service.backend_name(),
        collection = %collection,
        "Prompt service ready"
    );
    let queries = PromptQueries::new(Arc::clone(&service));

    let result = match cli.command {
        Commands::List => commands::prompt::list(&queries, &output).await,
        Commands::Show { id } => commands::prompt::show(&queries, id, &output).await,
        Commands::Add {
            label,
            prompt,
            color,
        } => commands::prompt::create(&queries, label, prompt, color, &output).await,
        Commands::Edit {
            id,
            label,
            prompt,
            color,
        } => commands::prompt::edit(&queries, id, label, prompt, color, &output).await,
        Commands::Delete { id, yes } => commands::prompt::delete(&queries, id, yes, &output).await,
        Commands::Reorder { ids } => commands::prompt::reorder(&queries, ids, &output).await,
        Commands::Init => commands::prompt::init(&queries, &output).await,
        Commands::Status => commands::status::show(&service, &config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    };

    if let Err(ref err) = result {
        if let Some(hint) = recovery_hint(err) {
            eprintln!("Hint: {}", hint);
        }
    }

    result
}

/// Recovery suggestion of the first store error in the chain
fn recovery_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StoreError>())
        .and_then(StoreError::recovery_suggestion)
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only enabled when PROMPTDECK_LOG is set. Logs go to `log_file` when
/// configured, otherwise to stderr so stdout stays clean for --json.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("PROMPTDECK_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "promptdeck_core={},promptdeck_cli={}",
        log_level, log_level
    ));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match config.log_file {
        Some(ref log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };
            // Ignore error if already initialized
            let _ = builder
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
