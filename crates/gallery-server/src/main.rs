//! # gallery-server
//!
//! Photo gallery web application.
//!
//! This binary provides:
//! - **Uploads** of single images and batches, each stored in its own
//!   directory under the upload root and recorded in SQLite
//! - **Gallery pages** (full-size and thumbnail grid) and per-image comment
//!   threads
//! - **JSON endpoints** mirroring the listings
//! - **Maintenance commands** to reset the schema and to remove upload
//!   directories left behind without a database row

mod api;
mod config;
mod error;
mod flash;
mod pages;
mod upload_store;

use std::collections::HashSet;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gallery_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::GalleryConfig;
use crate::upload_store::UploadStore;

#[derive(Parser)]
#[command(name = "gallery-server", version)]
#[command(about = "Photo gallery with per-image messages")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema if needed, clean up orphaned uploads and serve HTTP.
    Serve,
    /// Drop and recreate every table.
    ResetDb,
    /// Remove upload directories that have no database row.
    Reconcile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gallery_server=debug")),
        )
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = GalleryConfig::from_env();
    info!(?config, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::ResetDb => {
            let mut db = Database::open_at(&config.database_path)?;
            db.reset_schema()?;
            println!("All tables dropped and recreated successfully!");
            Ok(())
        }
        Command::Reconcile => {
            let db = Database::open_at(&config.database_path)?;
            let uploads = UploadStore::new(config.upload_folder.clone()).await?;
            let removed = reconcile(&db, &uploads, config.reconcile_grace).await?;
            println!("Removed {removed} orphaned upload directories");
            Ok(())
        }
    }
}

async fn serve(config: GalleryConfig) -> anyhow::Result<()> {
    info!("Starting gallery server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 3. Initialize storage
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let uploads = UploadStore::new(config.upload_folder.clone()).await?;

    // Nothing is in flight before the listener binds.
    let removed = reconcile(&db, &uploads, Duration::ZERO).await?;
    if removed > 0 {
        info!(removed, "Cleaned up orphaned uploads");
    }

    let http_addr = config.http_addr;
    let app_state = AppState::new(db, uploads, config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Remove upload directories the database does not know about, sparing those
/// modified within `grace`.
async fn reconcile(
    db: &Database,
    uploads: &UploadStore,
    grace: Duration,
) -> anyhow::Result<usize> {
    let known: HashSet<_> = db.list_image_ids()?.into_iter().collect();
    let removed = uploads.reconcile(&known, grace).await?;
    Ok(removed.len())
}
