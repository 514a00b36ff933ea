//! Customer search CLI.
//!
//! Opens the configured storage, runs one search and prints the rows as
//! JSON on stdout.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use query_kernel::config::BuilderKind;
use query_kernel::{Config, FilterRequest, ResultSet, SearchService, Strategy, storage};

#[derive(Debug, Parser)]
#[command(name = "customer-search", about = "Search customers by field")]
struct Cli {
    /// Override SEARCH_STATEMENT_BUILDER.
    #[arg(long, value_enum, global = true)]
    builder: Option<BuilderKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Customers whose FIELD contains VALUE (case-insensitive).
    Search {
        /// One of: name, email, city.
        field: String,
        /// Substring to look for; blank lists everyone.
        #[arg(default_value = "")]
        value: String,
        /// Match the value exactly instead of as a substring.
        #[arg(long)]
        exact: bool,
    },
    /// Every customer.
    List,
    /// Check that the database answers.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(builder) = cli.builder {
        config.statement_builder = builder;
    }

    let storage = storage::connect(&config)
        .await
        .context("failed to open storage")?;
    info!(dialect = %storage.dialect(), "storage opened");

    let service = SearchService::from_config(storage.clone(), &config);
    let outcome = run(&service, cli.command, storage.as_ref()).await;

    storage.close().await;
    info!("storage closed");

    outcome
}

async fn run(
    service: &SearchService,
    command: Command,
    storage: &dyn storage::Storage,
) -> Result<()> {
    match command {
        Command::Search {
            field,
            value,
            exact,
        } => {
            let filter = if exact {
                FilterRequest::equals(field, value)
            } else {
                FilterRequest::contains(field, value)
            };
            let rows = service
                .search(vec![filter], Strategy::Builder)
                .await
                .context("search failed")?;
            print_rows(&rows)
        }
        Command::List => {
            let rows = service
                .search(Vec::new(), Strategy::Builder)
                .await
                .context("search failed")?;
            print_rows(&rows)
        }
        Command::Check => {
            if !storage.ping().await {
                bail!("database did not answer");
            }
            println!("ok");
            Ok(())
        }
    }
}

fn print_rows(rows: &ResultSet) -> Result<()> {
    let json = serde_json::to_string_pretty(rows).context("failed to serialize rows")?;
    println!("{json}");
    info!(rows = rows.len(), "search completed");
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
