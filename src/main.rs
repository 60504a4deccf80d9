use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod bands;
mod db;
mod error;
mod loader;
mod models;
mod normalize;
mod pipeline;
mod publish;
mod report;

use crate::loader::Loader;
use crate::normalize::Schema;
use crate::publish::{FileCachePublisher, SnapshotPublisher};

const DEFAULT_CACHE: &str = "/tmp/dashboard_data.json";

#[derive(Parser)]
#[command(name = "cobranca-dashboard")]
#[command(about = "Builds and publishes the collections dashboard snapshot", long_about = None)]
struct Cli {
    /// Seconds to wait for the spreadsheet download before giving up
    #[arg(long, global = true, default_value_t = 120)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Process a spreadsheet and write the snapshot to a file
    Build {
        /// Spreadsheet URL or local path
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "dashboard_data.json")]
        out: PathBuf,
    },
    /// Process a spreadsheet and publish it as the current snapshot
    Update {
        #[arg(long)]
        source: String,
        #[arg(long, default_value = DEFAULT_CACHE)]
        cache: PathBuf,
    },
    /// Print the current snapshot JSON
    Show {
        #[arg(long, default_value = DEFAULT_CACHE)]
        cache: PathBuf,
        #[arg(long, default_value_t = 300)]
        max_age_secs: u64,
    },
    /// Print the days-overdue breakdown of the current snapshot
    Faixas,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cobranca_dashboard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the dashboard Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Build { source, out } => {
            let loader = Loader::new(timeout)?;
            let output = pipeline::run(&loader, &source, &Schema::STANDARD).await?;
            FileCachePublisher::new(&out).publish(&output.snapshot).await?;
            println!(
                "Snapshot with {} records written to {}.",
                output.record_count,
                out.display()
            );
        }
        Commands::Update { source, cache } => {
            let pool = connect().await?;
            let loader = Loader::new(timeout)?;

            let output = match pipeline::run(&loader, &source, &Schema::STANDARD).await {
                Ok(output) => output,
                Err(err) => {
                    error!(kind = err.kind(), "update: {err}");
                    println!("{}", report::update_failure(&err));
                    std::process::exit(1);
                }
            };

            let store = db::PgSnapshotPublisher::new(pool);
            let cache = FileCachePublisher::new(cache);
            pipeline::publish_all(&output.snapshot, &[&store, &cache]).await?;
            info!("update: published snapshot from {source}");
            println!("{}", report::update_success(&output));
        }
        Commands::Show {
            cache,
            max_age_secs,
        } => {
            let max_age = Duration::from_secs(max_age_secs);
            if let Some(body) = publish::read_fresh_cache(&cache, max_age).await? {
                println!("{body}");
                return Ok(());
            }

            let pool = connect().await?;
            let snapshot = db::latest_snapshot(&pool)
                .await?
                .context("no snapshot has been published yet")?;
            let body = serde_json::to_string_pretty(&snapshot)?;
            publish::write_atomic(&cache, body.as_bytes()).await?;
            println!("{body}");
        }
        Commands::Faixas => {
            let pool = connect().await?;
            let snapshot = db::latest_snapshot(&pool)
                .await?
                .context("no snapshot has been published yet")?;
            print!("{}", report::build_band_table(&snapshot));
        }
    }

    Ok(())
}
