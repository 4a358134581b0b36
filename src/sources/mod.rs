//! Source adapters that produce raw bid records.
//!
//! Every adapter implements [`BidSource`]: given a category and an inquiry
//! window it returns zero or more [`RawRecord`]s, or a typed
//! [`SourceError`]. The adapter also declares the [`FieldMap`] its records
//! are written in, so the pipeline never cares whether data came from the
//! XML API, the JSON API, or a scraped table.
//!
//! | Source | Module | Notes |
//! |--------|--------|-------|
//! | BidPublicInfoService (data.go.kr) | [`g2b`] | XML or JSON, official or legacy schema |
//! | Demo dataset | [`demo`] | Fixed rows for the empty-result policy |

pub mod demo;
pub mod g2b;

use crate::errors::SourceError;
use crate::models::{RawRecord, SourceCategory};
use crate::pipeline::FieldMap;
use chrono::{DateTime, Duration, Local};
use serde::Serialize;

/// Inclusive inquiry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl DateRange {
    /// The `days` days ending at `end`.
    pub fn last_days(end: DateTime<Local>, days: i64) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Both bounds rendered with a chrono format string.
    pub fn format(&self, fmt: &str) -> (String, String) {
        (
            self.start.format(fmt).to_string(),
            self.end.format(fmt).to_string(),
        )
    }
}

/// One page of a list response.
#[derive(Debug, Default)]
pub struct SourcePage {
    pub records: Vec<RawRecord>,
    /// `totalCount` as reported by the source, when it reports one.
    pub total_count: Option<u64>,
}

/// Outcome of one category fetch, kept for the durable store's call log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
    pub source: String,
    pub category: SourceCategory,
    pub endpoint: String,
    pub status: Option<u16>,
    pub records: usize,
    pub error: Option<String>,
    pub at: DateTime<Local>,
}

/// A producer of raw bid records for one category at a time.
pub trait BidSource {
    /// Short name used in logs and the call log.
    fn name(&self) -> &str;

    /// Field map the returned records are written in.
    fn field_map(&self) -> &FieldMap;

    /// Value stamped into `CanonicalBid::collection_method`.
    fn collection_method(&self) -> &str;

    fn endpoint(&self, category: SourceCategory) -> String;

    async fn fetch(
        &self,
        category: SourceCategory,
        range: &DateRange,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_range_formats() {
        let end = Local.with_ymd_and_hms(2025, 7, 8, 13, 5, 0).unwrap();
        let range = DateRange::last_days(end, 7);
        assert_eq!(
            range.format("%Y%m%d%H%M"),
            ("202507011305".to_string(), "202507081305".to_string())
        );
        assert_eq!(
            range.format("%Y%m%d"),
            ("20250701".to_string(), "20250708".to_string())
        );
    }
}
