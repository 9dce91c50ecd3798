use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_board::config::Config;
use file_board::models::{PathMismatch, Stats};
use file_board::services::{ReconcileService, StatsService};
use file_board::AppState;

#[derive(Serialize)]
struct Report {
    storage: &'static str,
    stats: Stats,
    mismatches: Vec<PathMismatch>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_board=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting file-board...");

    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    let state = AppState::init(config).await?;

    let stats = StatsService::collect(&state.db).await?;
    tracing::info!(
        "{} posts ({} active, {} deleted), {} files, {:.2} MB stored",
        stats.total_posts,
        stats.active_posts,
        stats.deleted_posts,
        stats.unique_files,
        stats.total_storage_mb
    );

    let mismatches = ReconcileService::scan(&state.db, state.blobs.as_ref()).await?;
    if mismatches.is_empty() {
        tracing::info!("All recorded objects are present");
    } else {
        tracing::warn!("{} post(s) need reconciliation", mismatches.len());
    }

    let report = Report {
        storage: state.blobs.storage_type(),
        stats,
        mismatches,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
