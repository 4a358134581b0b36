//! Collection statistics.
//!
//! A [`CollectionReport`] is produced by every run. It serializes to the JSON
//! report file and renders as a plain-text console summary via
//! [`CollectionReport::summary`]. Breakdowns are `BTreeMap`s so identical runs
//! produce byte-identical JSON.

use crate::errors::{SourceError, SourceErrorKind};
use crate::models::{CanonicalBid, SourceCategory};
use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

const TOP_AGENCIES: usize = 10;

/// Terminal state of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// At least one live record survived the pipeline.
    Collected,
    /// Nothing usable was collected; the demo dataset was emitted.
    DemoFallback,
    /// Nothing usable was collected and the policy forbids the fallback.
    Empty,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl From<&SourceError> for CategoryError {
    fn from(e: &SourceError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Per-category counts. `fetched == normalized + skipped` and
/// `normalized == excluded + kept`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub category: SourceCategory,
    pub label: String,
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub kept: usize,
    pub error: Option<CategoryError>,
}

impl CategoryReport {
    pub fn new(category: SourceCategory) -> Self {
        Self {
            category,
            label: category.label().to_string(),
            fetched: 0,
            normalized: 0,
            skipped: 0,
            excluded: 0,
            kept: 0,
            error: None,
        }
    }

    pub fn failed(category: SourceCategory, error: &SourceError) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(category)
        }
    }
}

/// Inquiry window as sent to the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InquiryWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgencyCount {
    pub agency: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub date_range: InquiryWindow,
    /// Records in the final output.
    pub total_kept: usize,
    /// Negotiated contracts dropped across all categories.
    pub excluded_negotiated: usize,
    pub duplicates_removed: usize,
    /// Raw items that could not be normalized.
    pub skipped_items: usize,
    pub failed_categories: usize,
    /// Output records that came from the demo dataset.
    pub demo_records: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_contract_method: BTreeMap<String, usize>,
    pub by_collection_method: BTreeMap<String, usize>,
    /// Keyed by the date part of the announcement date as sent by the source.
    pub by_announcement_date: BTreeMap<String, usize>,
    pub top_agencies: Vec<AgencyCount>,
    pub categories: Vec<CategoryReport>,
}

impl CollectionReport {
    /// Assemble the report from per-category results and the final output set.
    pub fn build(
        outcome: RunOutcome,
        started_at: DateTime<Local>,
        inquiry: (String, String),
        categories: Vec<CategoryReport>,
        duplicates_removed: usize,
        output: &[CanonicalBid],
    ) -> Self {
        Self {
            outcome,
            started_at,
            finished_at: Local::now(),
            date_range: InquiryWindow {
                start: inquiry.0,
                end: inquiry.1,
            },
            total_kept: output.len(),
            excluded_negotiated: categories.iter().map(|c| c.excluded).sum(),
            duplicates_removed,
            skipped_items: categories.iter().map(|c| c.skipped).sum(),
            failed_categories: categories.iter().filter(|c| c.error.is_some()).count(),
            demo_records: output.iter().filter(|b| b.is_demo()).count(),
            by_category: count_by(output, |b| &b.source_category),
            by_contract_method: count_by(output, |b| &b.contract_method),
            by_collection_method: count_by(output, |b| &b.collection_method),
            by_announcement_date: output.iter().fold(BTreeMap::new(), |mut acc, bid| {
                *acc.entry(date_part(&bid.announcement_date).to_string()).or_insert(0) += 1;
                acc
            }),
            top_agencies: top_agencies(output, TOP_AGENCIES),
            categories,
        }
    }

    /// Plain-text summary for the console.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let outcome = match self.outcome {
            RunOutcome::Collected => "collected",
            RunOutcome::DemoFallback => "demo fallback (no live records)",
            RunOutcome::Empty => "empty (no live records)",
        };
        let _ = writeln!(out, "Bid collection summary ({outcome})");
        let _ = writeln!(out, "  inquiry window     : {} ~ {}", self.date_range.start, self.date_range.end);
        let _ = writeln!(out, "  records kept       : {}", self.total_kept);
        let _ = writeln!(out, "  negotiated excluded: {}", self.excluded_negotiated);
        let _ = writeln!(out, "  duplicates removed : {}", self.duplicates_removed);
        let _ = writeln!(out, "  items skipped      : {}", self.skipped_items);
        if self.demo_records > 0 {
            let _ = writeln!(out, "  demo records       : {}", self.demo_records);
        }

        let _ = writeln!(out, "  categories:");
        for c in &self.categories {
            match &c.error {
                Some(e) => {
                    let _ = writeln!(out, "    • {} ({}): failed [{}] {}", c.label, c.category, e.kind, e.message);
                }
                None => {
                    let _ = writeln!(
                        out,
                        "    • {} ({}): fetched {}, kept {}, excluded {}, skipped {}",
                        c.label, c.category, c.fetched, c.kept, c.excluded, c.skipped
                    );
                }
            }
        }

        for (title, map) in [
            ("by category", &self.by_category),
            ("by contract method", &self.by_contract_method),
            ("by collection method", &self.by_collection_method),
            ("by announcement date", &self.by_announcement_date),
        ] {
            if map.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {title}:");
            for (key, count) in map {
                let _ = writeln!(out, "    • {key}: {count}");
            }
        }

        if !self.top_agencies.is_empty() {
            let _ = writeln!(out, "  top agencies:");
            for a in &self.top_agencies {
                let _ = writeln!(out, "    • {}: {}", a.agency, a.count);
            }
        }
        out
    }
}

fn count_by<F>(bids: &[CanonicalBid], key: F) -> BTreeMap<String, usize>
where
    F: Fn(&CanonicalBid) -> &String,
{
    bids.iter().fold(BTreeMap::new(), |mut acc, bid| {
        *acc.entry(key(bid).clone()).or_insert(0) += 1;
        acc
    })
}

/// Leading date of an opaque date string: `2025-07-01 10:00:00` and
/// `2025-07-01T10:00` give `2025-07-01`, `202507011000` gives `20250701`.
/// Anything else is returned as is.
fn date_part(value: &str) -> &str {
    let head = value.split([' ', 'T']).next().unwrap_or(value);
    if head.len() > 8 && head.bytes().all(|b| b.is_ascii_digit()) {
        &head[..8]
    } else {
        head
    }
}

/// Most frequent announcing agencies, ties broken by name.
fn top_agencies(bids: &[CanonicalBid], n: usize) -> Vec<AgencyCount> {
    count_by(bids, |b| &b.announcing_agency)
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(n)
        .map(|(agency, count)| AgencyCount { agency, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::bid;

    fn sample() -> Vec<CanonicalBid> {
        let mut a = bid("1", "a");
        a.announcing_agency = "조달청".into();
        let mut b = bid("2", "b");
        b.announcing_agency = "서울특별시".into();
        b.contract_method = "제한경쟁입찰".into();
        b.source_category = "용역".into();
        let mut c = bid("3", "c");
        c.announcing_agency = "조달청".into();
        a.announcement_date = "2025-07-01 10:00:00".into();
        b.announcement_date = "2025-07-01T15:30".into();
        c.announcement_date = "2025-07-02 09:00:00".into();
        vec![a, b, c]
    }

    fn category(cat: SourceCategory, fetched: usize, skipped: usize, excluded: usize) -> CategoryReport {
        CategoryReport {
            fetched,
            normalized: fetched - skipped,
            skipped,
            excluded,
            kept: fetched - skipped - excluded,
            ..CategoryReport::new(cat)
        }
    }

    #[test]
    fn test_build_totals_and_breakdowns() {
        let cats = vec![
            category(SourceCategory::Goods, 5, 1, 2),
            CategoryReport::failed(SourceCategory::Service, &SourceError::MissingServiceKey),
            category(SourceCategory::Construction, 3, 0, 1),
        ];
        let report = CollectionReport::build(
            RunOutcome::Collected,
            Local::now(),
            ("202507010000".into(), "202507080000".into()),
            cats,
            1,
            &sample(),
        );
        assert_eq!(report.total_kept, 3);
        assert_eq!(report.excluded_negotiated, 3);
        assert_eq!(report.skipped_items, 1);
        assert_eq!(report.failed_categories, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.by_category.get("물품"), Some(&2));
        assert_eq!(report.by_category.get("용역"), Some(&1));
        assert_eq!(report.by_contract_method.get("제한경쟁입찰"), Some(&1));
        assert_eq!(report.by_announcement_date.get("2025-07-01"), Some(&2));
        assert_eq!(report.by_announcement_date.get("2025-07-02"), Some(&1));
        assert_eq!(report.demo_records, 0);
        assert_eq!(
            report.top_agencies[0],
            AgencyCount {
                agency: "조달청".into(),
                count: 2
            }
        );
    }

    #[test]
    fn test_failed_category_keeps_error_kind() {
        let c = CategoryReport::failed(
            SourceCategory::Foreign,
            &SourceError::ResponseFormat("invalid XML".into()),
        );
        let err = c.error.unwrap();
        assert_eq!(err.kind, SourceErrorKind::ResponseFormatError);
        assert!(err.message.contains("invalid XML"));
    }

    #[test]
    fn test_report_json_is_camel_case() {
        let report = CollectionReport::build(
            RunOutcome::DemoFallback,
            Local::now(),
            (String::new(), String::new()),
            vec![],
            0,
            &[],
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "demoFallback");
        assert!(json.get("excludedNegotiated").is_some());
        assert!(json.get("byContractMethod").is_some());
        assert!(json["dateRange"].get("start").is_some());
        assert!(json.get("byAnnouncementDate").is_some());
        assert_eq!(json["demoRecords"], 0);
    }

    #[test]
    fn test_announcement_date_keys_stay_unparsed() {
        assert_eq!(date_part("2025-07-01 10:00:00"), "2025-07-01");
        assert_eq!(date_part("2025-07-01T10:00"), "2025-07-01");
        assert_eq!(date_part("202507011000"), "20250701");
        assert_eq!(date_part("20250701"), "20250701");
        assert_eq!(date_part("2025/07/01"), "2025/07/01");
        assert_eq!(date_part("정보없음"), "정보없음");
        assert_eq!(date_part(""), "");
    }

    #[test]
    fn test_demo_output_is_counted() {
        let now = Local::now();
        let demo = crate::sources::demo::demo_dataset("https://example.invalid/detail?", now);
        let report = CollectionReport::build(
            RunOutcome::DemoFallback,
            now,
            (String::new(), String::new()),
            vec![],
            0,
            &demo,
        );
        assert_eq!(report.demo_records, demo.len());
        assert_eq!(report.by_announcement_date.values().sum::<usize>(), demo.len());
        assert!(report.summary().contains("demo records       : 3"));
    }

    #[test]
    fn test_summary_mentions_failures_and_counts() {
        let report = CollectionReport::build(
            RunOutcome::Collected,
            Local::now(),
            ("20250701".into(), "20250708".into()),
            vec![CategoryReport::failed(
                SourceCategory::Goods,
                &SourceError::Declared {
                    code: "30".into(),
                    message: "SERVICE_KEY_IS_NOT_REGISTERED_ERROR".into(),
                },
            )],
            0,
            &sample(),
        );
        let text = report.summary();
        assert!(text.contains("records kept       : 3"));
        assert!(text.contains("SERVICE_KEY_IS_NOT_REGISTERED_ERROR"));
        assert!(text.contains("조달청: 2"));
        assert!(text.contains("by announcement date:"));
        assert!(text.contains("2025-07-01: 2"));
    }
}
