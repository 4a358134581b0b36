//! Collection run orchestration.
//!
//! A run walks a fixed sequence of phases:
//!
//! ```text
//! Fetching ─▶ Normalizing ─▶ Filtering ─┐   (per category, in fixed order)
//!     ▲                                 │
//!     └─────────── next category ◀──────┘
//! Aggregating ─▶ Reporting ─▶ Terminal
//! ```
//!
//! Category failures are logged and recorded, never fatal. A run whose
//! aggregate result is empty ends in the terminal state chosen by the
//! [`EmptyResultPolicy`], which is either the demo dataset or nothing.

use crate::config::{CollectorConfig, EmptyResultPolicy};
use crate::errors::SourceError;
use crate::models::{CanonicalBid, SourceCategory};
use crate::pipeline::{DedupOutcome, Normalizer, deduplicate, exclude_negotiated};
use crate::report::{CategoryReport, CollectionReport, RunOutcome};
use crate::sources::demo::demo_dataset;
use crate::sources::{ApiCall, BidSource, DateRange};
use chrono::{DateTime, Local};
use tracing::{error, info, instrument, warn};

/// Format of the inquiry window in the report.
const REPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Fetching,
    Normalizing,
    Filtering,
    Aggregating,
    Reporting,
    Terminal,
}

impl RunPhase {
    fn as_str(self) -> &'static str {
        match self {
            RunPhase::Fetching => "fetching",
            RunPhase::Normalizing => "normalizing",
            RunPhase::Filtering => "filtering",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Reporting => "reporting",
            RunPhase::Terminal => "terminal",
        }
    }
}

/// What to collect in one run.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub categories: Vec<SourceCategory>,
    pub range: DateRange,
    pub detail_url_base: String,
    pub empty_result_policy: EmptyResultPolicy,
}

impl CollectionPlan {
    /// The configured categories over the `search_days` days ending at `now`.
    pub fn from_config(config: &CollectorConfig, now: DateTime<Local>) -> Self {
        Self {
            categories: config.categories.clone(),
            range: DateRange::last_days(now, config.search_days),
            detail_url_base: config.detail_url_base.clone(),
            empty_result_policy: config.empty_result_policy,
        }
    }
}

/// Everything a run hands to the sinks.
#[derive(Debug)]
pub struct CollectionRun {
    pub bids: Vec<CanonicalBid>,
    pub report: CollectionReport,
    pub api_calls: Vec<ApiCall>,
}

pub struct Collector<'a, S> {
    source: &'a S,
    plan: CollectionPlan,
}

impl<'a, S: BidSource> Collector<'a, S> {
    pub fn new(source: &'a S, plan: CollectionPlan) -> Self {
        Self { source, plan }
    }

    /// Execute the run. Never fails: every error is absorbed at category or
    /// item granularity and shows up in the report instead.
    #[instrument(level = "info", skip_all, fields(source = self.source.name(), categories = self.plan.categories.len()))]
    pub async fn run(&self) -> CollectionRun {
        let started_at = Local::now();
        let mut category_reports = Vec::with_capacity(self.plan.categories.len());
        let mut batches = Vec::with_capacity(self.plan.categories.len());
        let mut api_calls = Vec::with_capacity(self.plan.categories.len());

        for &category in &self.plan.categories {
            info!(phase = RunPhase::Fetching.as_str(), %category, label = category.label(), "Collecting category");
            let fetched = self.source.fetch(category, &self.plan.range).await;
            api_calls.push(self.api_call(category, &fetched));

            let raws = match fetched {
                Ok(raws) => raws,
                Err(e) => {
                    error!(%category, kind = %e.kind(), error = %e, "Category failed; continuing with the next one");
                    category_reports.push(CategoryReport::failed(category, &e));
                    continue;
                }
            };

            info!(phase = RunPhase::Normalizing.as_str(), %category, count = raws.len());
            let normalized = Normalizer::new(
                self.source.field_map(),
                category.label(),
                self.source.collection_method(),
                self.plan.detail_url_base.as_str(),
            )
            .normalize_batch(&raws);
            let skipped = normalized.skipped.len();
            let normalized_count = normalized.bids.len();

            info!(phase = RunPhase::Filtering.as_str(), %category, count = normalized_count);
            let filtered = exclude_negotiated(normalized.bids);

            category_reports.push(CategoryReport {
                fetched: raws.len(),
                normalized: normalized_count,
                skipped,
                excluded: filtered.excluded,
                kept: filtered.kept.len(),
                ..CategoryReport::new(category)
            });
            batches.push(filtered.kept);
        }

        info!(phase = RunPhase::Aggregating.as_str(), batches = batches.len());
        let DedupOutcome { bids, duplicates } = deduplicate(batches);

        let (outcome, bids) = self.apply_empty_result_policy(bids);

        info!(phase = RunPhase::Reporting.as_str(), ?outcome, count = bids.len());
        let report = CollectionReport::build(
            outcome,
            started_at,
            self.plan.range.format(REPORT_DATE_FORMAT),
            category_reports,
            duplicates,
            &bids,
        );

        info!(
            phase = RunPhase::Terminal.as_str(),
            ?outcome,
            kept = report.total_kept,
            excluded = report.excluded_negotiated,
            duplicates = report.duplicates_removed,
            failed_categories = report.failed_categories,
            "Collection run finished"
        );
        CollectionRun {
            bids,
            report,
            api_calls,
        }
    }

    fn apply_empty_result_policy(&self, bids: Vec<CanonicalBid>) -> (RunOutcome, Vec<CanonicalBid>) {
        if !bids.is_empty() {
            return (RunOutcome::Collected, bids);
        }
        match self.plan.empty_result_policy {
            EmptyResultPolicy::DemoData => {
                warn!("No usable records from any category; emitting demo dataset");
                (
                    RunOutcome::DemoFallback,
                    demo_dataset(&self.plan.detail_url_base, Local::now()),
                )
            }
            EmptyResultPolicy::Empty => {
                warn!("No usable records from any category; output will be empty");
                (RunOutcome::Empty, bids)
            }
        }
    }

    fn api_call<T>(
        &self,
        category: SourceCategory,
        fetched: &Result<Vec<T>, SourceError>,
    ) -> ApiCall {
        let (status, records, error) = match fetched {
            Ok(raws) => (Some(200), raws.len(), None),
            Err(e) => (e.status(), 0, Some(e.to_string())),
        };
        ApiCall {
            source: self.source.name().to_string(),
            category,
            endpoint: self.source.endpoint(category),
            status,
            records,
            error,
            at: Local::now(),
        }
    }
}
