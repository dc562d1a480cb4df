//! persistor CLI - inspect and edit a persisted storage registry.
//!
//! Opens the backing store named in the configuration and operates on the
//! registry stored in it, exactly as an embedding application would see it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use persistor::config::Settings;
use std::path::PathBuf;
use tracing::warn;

mod commands;

/// Inspect and edit a persistor registry
#[derive(Debug, Parser)]
#[command(name = "persistor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./persistor.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the value stored under a key
    Get {
        /// Storage instance name
        instance: String,
        /// Entry key
        key: String,
    },
    /// Store a value (parsed as JSON, or taken as a plain string)
    Set {
        /// Storage instance name
        instance: String,
        /// Entry key
        key: String,
        /// Value, e.g. 42, '{"a": 1}' or hello
        value: String,
        /// Lifetime of the entry in seconds
        #[arg(long)]
        ttl_secs: Option<f64>,
        /// Lifetime of the instance in seconds, if it has to be created
        #[arg(long)]
        instance_ttl_secs: Option<f64>,
    },
    /// Remove a key
    Remove {
        /// Storage instance name
        instance: String,
        /// Entry key
        key: String,
    },
    /// Remove every key of an instance
    Clear {
        /// Storage instance name
        instance: String,
    },
    /// List the keys of an instance
    Keys {
        /// Storage instance name
        instance: String,
    },
    /// List instances with their entry counts and expiry
    List,
    /// Print the persisted registry document
    Dump,
}

/// Initialize stdout logging. `RUST_LOG` wins over the configured level.
fn init_logging(default_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings.log_level);

    let validation = settings.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    commands::execute(cli.command, &settings).await
}
