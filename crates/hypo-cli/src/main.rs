//! hypo CLI
//!
//! Command-line interface for hypo - local-first notes, quotes and
//! reflections with remote sync and full-text search.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hypo_core::Config;

mod commands;
mod editor;
mod output;
mod session;

use output::{Output, OutputFormat};
use session::Session;

#[derive(Parser)]
#[command(name = "hypo")]
#[command(about = "hypo - Local-first notes, quotes and reflections")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add an entry (opens the editor when no text is given)
    Add {
        /// Entry text; #hashtags become tags
        text: Vec<String>,
        /// Attribution, e.g. "Seneca, Letters"
        #[arg(short, long)]
        source: Option<String>,
        /// Tags to add
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// List entries
    #[command(alias = "ls")]
    List {
        /// Filter by tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show an entry
    Show {
        /// Entry ID (full UUID or prefix)
        id: String,
    },
    /// Edit an entry (opens the editor when no field is given)
    Edit {
        /// Entry ID (full UUID or prefix)
        id: String,
        /// Replace the text
        #[arg(long)]
        text: Option<String>,
        /// Replace the source
        #[arg(short, long)]
        source: Option<String>,
        /// Replace the tags
        #[arg(short, long)]
        tag: Option<Vec<String>>,
    },
    /// Delete an entry
    #[command(alias = "rm")]
    Delete {
        /// Entry ID (full UUID or prefix)
        id: String,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Search entries
    Search {
        /// Search query
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// List all tags
    Tags,
    /// Show a random entry
    Random,
    /// Sync with the remote store
    Sync,
    /// Remove duplicate entries
    Dedup,
    /// Export entries as JSON
    Export {
        /// Output file (stdout if omitted)
        path: Option<PathBuf>,
    },
    /// Import entries from a JSON export
    Import {
        /// Export file to read
        path: PathBuf,
        /// Keep existing entries and add only new ones
        #[arg(long)]
        merge: bool,
    },
    /// Move legacy [tag] groups out of entry text
    Migrate,
    /// Show status (storage, sync configuration)
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Remove every entry from this device
    Clear {
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (remote_url, owner_id, sync_enabled, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work without opening the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let mut session = Session::open(config).await?;

    // Pull the latest rows before read commands
    let is_read = matches!(
        cli.command,
        Commands::List { .. }
            | Commands::Show { .. }
            | Commands::Search { .. }
            | Commands::Tags
            | Commands::Random
    );
    if is_read && session.config.sync_enabled {
        session.auto_sync(&output).await;
    }

    let result = run(cli.command, &mut session, &output).await;

    session.close(&output).await;
    result
}

async fn run(command: Commands, session: &mut Session, output: &Output) -> Result<()> {
    let journal = &mut session.journal;
    match command {
        Commands::Add { text, source, tag } => {
            commands::entry::add(journal, text, source, tag, output).await
        }
        Commands::List { tag } => commands::entry::list(journal, tag, output).await,
        Commands::Show { id } => commands::entry::show(journal, id, output).await,
        Commands::Edit {
            id,
            text,
            source,
            tag,
        } => commands::entry::edit(journal, id, text, source, tag, output).await,
        Commands::Delete { id, yes } => commands::entry::delete(journal, id, yes, output).await,
        Commands::Search { query } => commands::entry::search(journal, query, output).await,
        Commands::Tags => commands::tag::list(journal, output).await,
        Commands::Random => commands::entry::random(journal, output).await,
        Commands::Clear { yes } => commands::entry::clear(journal, yes, output).await,
        Commands::Sync => commands::sync::sync(session, output).await,
        Commands::Dedup => commands::sync::dedup(session, output).await,
        Commands::Migrate => commands::sync::migrate(session, output).await,
        Commands::Export { path } => commands::transfer::export(session, path, output).await,
        Commands::Import { path, merge } => {
            commands::transfer::import(session, path, merge, output).await
        }
        Commands::Status => commands::status::show(session, output).await,
        Commands::Config { .. } => unreachable!(), // Handled in main
    }
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

/// Set up tracing
///
/// `RUST_LOG` wins over the configured level. Logs go to `log_file` when
/// set, otherwise to stderr, where only warnings show unless a level is
/// configured.
fn init_logging(config: &Config) {
    let level = match (&config.log_level, &config.log_file) {
        (None, None) => "warn",
        _ => config.log_level(),
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hypo_core={},hypo_cli={}", level, level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match &config.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }

    debug!("Logging initialized at {}", level);
}
