use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use plume::routes;
use plume::state::AppState;
use plume_core::transform::DEFAULT_CHUNK_SIZE;
use plume_repository::SqliteRepository;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Ingestion service for environmental sensor exports.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Import one export file from disk and print the receipt.
    Ingest {
        #[arg(short, long)]
        file: PathBuf,
    },
}

struct Config {
    database_url: String,
    chunk_size: usize,
    bind: SocketAddr,
}

fn config() -> Result<Config> {
    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("PLUME_DATABASE_URL"))
        .context("DATABASE_URL or PLUME_DATABASE_URL must be set")?;
    let chunk_size = match std::env::var("PLUME_CHUNK_SIZE") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid PLUME_CHUNK_SIZE '{raw}'"))?,
        Err(_) => DEFAULT_CHUNK_SIZE,
    };
    let bind = match std::env::var("PLUME_BIND") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid PLUME_BIND '{raw}'"))?,
        Err(_) => SocketAddr::from(([0, 0, 0, 0], 3000)),
    };
    Ok(Config {
        database_url,
        chunk_size,
        bind,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = config()?;

    match cli.command {
        Commands::Serve => {
            let state = AppState::connect(&config.database_url, config.chunk_size).await?;
            let router = routes::router(state);
            let listener = TcpListener::bind(config.bind).await?;
            info!("listening on {}", listener.local_addr()?);
            axum::serve(listener, router.into_make_service()).await?;
        }
        Commands::Migrate => {
            let repository = SqliteRepository::connect(&config.database_url, 1).await?;
            repository.run_migrations().await?;
            info!("migrations applied");
        }
        Commands::Ingest { file } => {
            let state = AppState::connect(&config.database_url, config.chunk_size).await?;
            let bytes =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let upload = plume_parser::parse_upload(&name, &bytes)?;
            let receipt = plume_core::import::run_import(
                &state.dispatcher,
                state.repository.as_ref(),
                &state.progress,
                Uuid::new_v4(),
                upload,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}
