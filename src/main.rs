//! # Bid Collector
//!
//! Collects public procurement bid announcements from the Korean national
//! e-procurement open API, normalizes them into one schema, drops
//! negotiated contracts, deduplicates across categories, and writes the
//! result as CSV, a JSON statistics report, and optionally a SQLite store.
//!
//! ## Usage
//!
//! ```sh
//! G2B_API_KEY=... bid_collector -o ./output --database bids.db
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: query each category (goods, service, construction, foreign) in turn
//! 2. **Normalizing**: map source field names onto the canonical record
//! 3. **Filtering**: drop negotiated (수의계약) contracts
//! 4. **Aggregating**: first-seen deduplication by announcement number
//! 5. **Output**: CSV, JSON report, SQLite upsert, console summary
//!
//! When no category yields a usable record the run emits a fixed demo
//! dataset instead, unless `--no-demo-fallback` is given.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collect;
mod config;
mod errors;
mod models;
mod outputs;
mod pipeline;
mod report;
mod sources;
mod store;
mod utils;

use cli::Cli;
use collect::{CollectionPlan, CollectionRun, Collector};
use config::CollectorConfig;
use outputs::{csv, json};
use sources::g2b::G2bApiSource;
use store::BidStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("bid_collector starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.output_dir, ?args.config, ?args.database, "Parsed CLI arguments");

    // ---- Load config ----
    let mut config = CollectorConfig::load(args.config.as_deref()).await?;
    config.apply_cli(&args);
    info!(
        categories = ?config.categories,
        search_days = config.search_days,
        schema = ?config.api.schema,
        format = ?config.api.format,
        policy = ?config.empty_result_policy,
        "Configuration ready"
    );
    if config.api.service_key.is_none() {
        warn!("No service key configured (set G2B_API_KEY or --service-key); every category will fail");
    }

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Collect ----
    let source = G2bApiSource::new(config.api.clone())?;
    debug!(?source, "Source adapter ready");
    let plan = CollectionPlan::from_config(&config, Local::now());
    let run = Collector::new(&source, plan).run().await;

    // ---- CSV output ----
    let written_at = Local::now();
    if let Err(e) = csv::write_bids(&run.bids, &config.output_dir, &csv::csv_file_name(written_at)).await {
        error!(error = %e, "Failed to write CSV");
        return Err(e);
    }

    // ---- JSON report ----
    if let Err(e) = json::write_report(&run.report, &config.output_dir, written_at).await {
        error!(error = %e, "Failed to write JSON report");
    }

    // ---- Durable store ----
    if let Some(database) = &config.database {
        if let Err(e) = persist(database, &run, args.export_store, &config.output_dir).await {
            error!(path = %database.display(), error = %e, "Failed to update bid store");
        }
    }

    println!("{}", run.report.summary());

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        outcome = ?run.report.outcome,
        kept = run.report.total_kept,
        "bid_collector finished"
    );

    Ok(())
}

/// Upsert the run into the SQLite store, log its source calls, and optionally
/// dump the whole store next to the run's CSV.
#[instrument(level = "info", skip_all, fields(database = %database.display()))]
async fn persist(
    database: &Path,
    run: &CollectionRun,
    export: bool,
    output_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    let store = BidStore::open(database).await?;
    let summary = store.upsert_bids(&run.bids).await?;
    store.log_api_calls(&run.api_calls).await?;

    let stats = store.statistics().await?;
    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        total = stats.total,
        created_today = stats.created_today,
        by_category = ?stats.by_category,
        by_collection_method = ?stats.by_collection_method,
        "Bid store updated"
    );

    if export {
        let bids = store.load_bids().await?;
        let path = csv::write_bids(&bids, output_dir, &csv::export_file_name(Local::now())).await?;
        info!(path = %path.display(), rows = bids.len(), "Exported bid store");
    }
    Ok(())
}
