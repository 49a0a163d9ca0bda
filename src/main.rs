//! Bookshelf CLI - query the book-metadata provider through the resilient gateway.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search <query> [max]` | Search volumes, printing the results as JSON |
//! | `get <id>` | Fetch one volume and import it into the store |
//! | `status` | Print limiter and circuit state as JSON |

use std::path::PathBuf;

use anyhow::{Context, Result};
use bookshelf::{BookshelfConfig, GoogleBooksClient, Library, LoggingConfig, MemoryStore};
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "bookshelf")]
#[command(about = "Search and import book metadata", long_about = None)]
struct Cli {
    /// YAML config file. Without it, `bookshelf.yaml` and BOOKSHELF__* variables are used.
    #[arg(long, short, global = true, value_name = "FILE", env = "BOOKSHELF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the provider's volumes
    Search {
        /// Free-text query
        query: String,
        /// Number of results, clamped into 1..=40
        #[arg(default_value_t = 10, allow_negative_numbers = true)]
        max: i64,
    },
    /// Fetch a single volume by provider id
    Get {
        id: String,
    },
    /// Show rate limiter and circuit breaker state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BookshelfConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BookshelfConfig::load().context("loading bookshelf config")?,
    };
    init_logging(&config.logging);

    let client = GoogleBooksClient::new(&config.provider)?;
    let library = Library::new(client, MemoryStore::new(), &config);

    match cli.command {
        Command::Search { query, max } => {
            let results = library.search(&query, max).await?;
            print_json(&*results)?;
        }
        Command::Get { id } => {
            let book = library.import_volume(&id).await?;
            print_json(&*book)?;
        }
        Command::Status => print_json(&library.status())?,
    }

    tracing::debug!(status = ?library.status(), "done");
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.level.as_str())
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
