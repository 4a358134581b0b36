//! Command-line interface definitions for the bid collector.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option overrides the matching value from the optional YAML config
//! file; the most common ones can also come from environment variables.

use crate::config::{ApiSchema, MAX_SEARCH_DAYS, ResponseFormat};
use crate::models::SourceCategory;
use clap::Parser;

/// Command-line arguments for the bid collector.
///
/// # Examples
///
/// ```sh
/// # Collect the last 7 days of every category into ./output
/// G2B_API_KEY=... bid_collector
///
/// # Services and construction only, upserting into SQLite
/// bid_collector -o ./bids --category service --category construction --database bids.db
///
/// # Older BidPublicInfoService01 endpoint, JSON responses
/// bid_collector --schema legacy --format json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for the CSV and JSON report files
    #[arg(short, long, env = "BID_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// data.go.kr service key (raw or URL-encoded)
    #[arg(long, env = "G2B_API_KEY", hide_env_values = true)]
    pub service_key: Option<String>,

    /// Number of days to look back from now (1 to 3650)
    #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..=MAX_SEARCH_DAYS))]
    pub days: Option<i64>,

    /// Category to collect; repeat for several. Defaults to all four.
    #[arg(long, value_enum)]
    pub category: Vec<SourceCategory>,

    /// Which BidPublicInfoService generation to query
    #[arg(long, value_enum)]
    pub schema: Option<ApiSchema>,

    /// Response format requested from the API
    #[arg(long, value_enum)]
    pub format: Option<ResponseFormat>,

    /// Maximum number of pages fetched per category
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// SQLite database to upsert collected bids into
    #[arg(long, env = "BID_DATABASE")]
    pub database: Option<String>,

    /// Also export the whole database to CSV after upserting
    #[arg(long, requires = "database")]
    pub export_store: bool,

    /// Emit an empty result instead of the demo dataset when nothing is collected
    #[arg(long)]
    pub no_demo_fallback: bool,
}
