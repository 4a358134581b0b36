//! Data models for bid announcements and their normalized representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RawRecord`]: One announcement exactly as a source adapter produced it
//! - [`CanonicalBid`]: The schema-stable record every later stage works with
//! - [`CanonicalField`]: The ordered column set shared by the normalizer and the sinks
//! - [`SourceCategory`]: The procurement partitions queried independently
//!
//! Field values stay strings end to end. Dates keep the source-native format
//! and prices keep whatever separators the source used.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Value assigned to any canonical field the source did not provide.
pub const PLACEHOLDER: &str = "정보없음";

/// Timestamp layout used for `collectedAt` in text outputs.
pub const COLLECTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A raw announcement as returned by one source adapter call.
///
/// Keys are source-specific field names (`bidNtceNo`, `공고번호`, ...).
/// Records are ephemeral: created per fetched item and dropped after
/// normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, String>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Return the first of `names` that is present with non-blank text, trimmed.
    pub fn first_present<S: AsRef<str>>(&self, names: &[S]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name.as_ref()))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A procurement partition queried independently from the others.
///
/// The declaration order is the fixed processing order of a collection run,
/// which in turn decides first-seen precedence during deduplication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Goods,
    Service,
    Construction,
    Foreign,
}

impl SourceCategory {
    /// Every category, in processing order.
    pub const ALL: [SourceCategory; 4] = [
        SourceCategory::Goods,
        SourceCategory::Service,
        SourceCategory::Construction,
        SourceCategory::Foreign,
    ];

    /// Korean label stored in `CanonicalBid::source_category`.
    pub fn label(self) -> &'static str {
        match self {
            SourceCategory::Goods => "물품",
            SourceCategory::Service => "용역",
            SourceCategory::Construction => "공사",
            SourceCategory::Foreign => "외자",
        }
    }

    /// Name of the BidPublicInfoService list operation for this category.
    pub fn operation(self) -> &'static str {
        match self {
            SourceCategory::Goods => "getBidPblancListInfoThngPPSSrch",
            SourceCategory::Service => "getBidPblancListInfoServcPPSSrch",
            SourceCategory::Construction => "getBidPblancListInfoCnstwkPPSSrch",
            SourceCategory::Foreign => "getBidPblancListInfoFrgcptPPSSrch",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            SourceCategory::Goods => "goods",
            SourceCategory::Service => "service",
            SourceCategory::Construction => "construction",
            SourceCategory::Foreign => "foreign",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// One column of the canonical schema.
///
/// [`CanonicalField::ALL`] is the column order of every tabular output.
/// All but the last four fields are read from raw records via a field map;
/// detail link, collection time, category and collection method are derived
/// by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    AnnouncementId,
    Title,
    AnnouncingAgency,
    DemandingDepartment,
    ContractMethod,
    AnnouncementDate,
    DeadlineDateTime,
    OpeningDateTime,
    EstimatedPrice,
    BudgetAmount,
    MinimumBidRate,
    Qualification,
    RegionRestriction,
    IndustryRestriction,
    BidMethod,
    AnnouncementType,
    IsInternational,
    IsReAnnouncement,
    ContactName,
    ContactPhone,
    ContactEmail,
    ReferenceNumber,
    DetailLinkUrl,
    CollectedAt,
    SourceCategory,
    CollectionMethod,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 26] = [
        CanonicalField::AnnouncementId,
        CanonicalField::Title,
        CanonicalField::AnnouncingAgency,
        CanonicalField::DemandingDepartment,
        CanonicalField::ContractMethod,
        CanonicalField::AnnouncementDate,
        CanonicalField::DeadlineDateTime,
        CanonicalField::OpeningDateTime,
        CanonicalField::EstimatedPrice,
        CanonicalField::BudgetAmount,
        CanonicalField::MinimumBidRate,
        CanonicalField::Qualification,
        CanonicalField::RegionRestriction,
        CanonicalField::IndustryRestriction,
        CanonicalField::BidMethod,
        CanonicalField::AnnouncementType,
        CanonicalField::IsInternational,
        CanonicalField::IsReAnnouncement,
        CanonicalField::ContactName,
        CanonicalField::ContactPhone,
        CanonicalField::ContactEmail,
        CanonicalField::ReferenceNumber,
        CanonicalField::DetailLinkUrl,
        CanonicalField::CollectedAt,
        CanonicalField::SourceCategory,
        CanonicalField::CollectionMethod,
    ];

    /// Korean column header used by the CSV sink.
    pub fn header(self) -> &'static str {
        match self {
            CanonicalField::AnnouncementId => "공고번호",
            CanonicalField::Title => "공고명",
            CanonicalField::AnnouncingAgency => "공고기관",
            CanonicalField::DemandingDepartment => "수요기관",
            CanonicalField::ContractMethod => "계약방법",
            CanonicalField::AnnouncementDate => "입찰공고일",
            CanonicalField::DeadlineDateTime => "입찰마감일시",
            CanonicalField::OpeningDateTime => "개찰일시",
            CanonicalField::EstimatedPrice => "예정가격",
            CanonicalField::BudgetAmount => "추정가격",
            CanonicalField::MinimumBidRate => "낙찰하한율",
            CanonicalField::Qualification => "참가자격",
            CanonicalField::RegionRestriction => "지역제한",
            CanonicalField::IndustryRestriction => "업종제한",
            CanonicalField::BidMethod => "입찰방식",
            CanonicalField::AnnouncementType => "공고종류",
            CanonicalField::IsInternational => "국제입찰여부",
            CanonicalField::IsReAnnouncement => "재공고여부",
            CanonicalField::ContactName => "공고기관담당자",
            CanonicalField::ContactPhone => "담당자전화번호",
            CanonicalField::ContactEmail => "담당자이메일",
            CanonicalField::ReferenceNumber => "참조번호",
            CanonicalField::DetailLinkUrl => "공고링크",
            CanonicalField::CollectedAt => "수집일시",
            CanonicalField::SourceCategory => "입찰분류",
            CanonicalField::CollectionMethod => "수집방법",
        }
    }

    /// Column name in the SQLite `bids` table.
    pub fn column(self) -> &'static str {
        match self {
            CanonicalField::AnnouncementId => "bid_number",
            CanonicalField::Title => "title",
            CanonicalField::AnnouncingAgency => "agency",
            CanonicalField::DemandingDepartment => "department",
            CanonicalField::ContractMethod => "contract_method",
            CanonicalField::AnnouncementDate => "announcement_date",
            CanonicalField::DeadlineDateTime => "deadline_date",
            CanonicalField::OpeningDateTime => "opening_date",
            CanonicalField::EstimatedPrice => "estimated_price",
            CanonicalField::BudgetAmount => "budget",
            CanonicalField::MinimumBidRate => "min_bid_rate",
            CanonicalField::Qualification => "qualification",
            CanonicalField::RegionRestriction => "region_limit",
            CanonicalField::IndustryRestriction => "industry_limit",
            CanonicalField::BidMethod => "bid_method",
            CanonicalField::AnnouncementType => "announcement_type",
            CanonicalField::IsInternational => "international_bid",
            CanonicalField::IsReAnnouncement => "re_announcement",
            CanonicalField::ContactName => "contact_person",
            CanonicalField::ContactPhone => "contact_phone",
            CanonicalField::ContactEmail => "contact_email",
            CanonicalField::ReferenceNumber => "reference_number",
            CanonicalField::DetailLinkUrl => "link_url",
            CanonicalField::CollectedAt => "collection_date",
            CanonicalField::SourceCategory => "category",
            CanonicalField::CollectionMethod => "collection_method",
        }
    }
}

/// The normalized, schema-stable representation of one announcement.
///
/// Produced by the normalizer and owned by the pipeline for the rest of a
/// collection run. `announcement_id` is never empty and is the dedupe key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBid {
    pub announcement_id: String,
    pub title: String,
    pub announcing_agency: String,
    pub demanding_department: String,
    /// Read by the negotiated-contract filter.
    pub contract_method: String,
    pub announcement_date: String,
    pub deadline_date_time: String,
    pub opening_date_time: String,
    pub estimated_price: String,
    pub budget_amount: String,
    pub minimum_bid_rate: String,
    pub qualification: String,
    pub region_restriction: String,
    pub industry_restriction: String,
    pub bid_method: String,
    pub announcement_type: String,
    pub is_international: String,
    pub is_re_announcement: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: String,
    pub reference_number: String,
    /// Detail page base URL followed by the announcement id.
    pub detail_link_url: String,
    /// Stamped at normalization time, not at fetch time.
    pub collected_at: DateTime<Local>,
    /// Korean label of the category that produced the record (`물품`, `용역`, ...).
    pub source_category: String,
    /// How the record was obtained (`공공데이터 API`, `데모 데이터`).
    pub collection_method: String,
}

impl CanonicalBid {
    /// Text value of `field`, as written to tabular outputs.
    pub fn value(&self, field: CanonicalField) -> Cow<'_, str> {
        let s: &str = match field {
            CanonicalField::AnnouncementId => &self.announcement_id,
            CanonicalField::Title => &self.title,
            CanonicalField::AnnouncingAgency => &self.announcing_agency,
            CanonicalField::DemandingDepartment => &self.demanding_department,
            CanonicalField::ContractMethod => &self.contract_method,
            CanonicalField::AnnouncementDate => &self.announcement_date,
            CanonicalField::DeadlineDateTime => &self.deadline_date_time,
            CanonicalField::OpeningDateTime => &self.opening_date_time,
            CanonicalField::EstimatedPrice => &self.estimated_price,
            CanonicalField::BudgetAmount => &self.budget_amount,
            CanonicalField::MinimumBidRate => &self.minimum_bid_rate,
            CanonicalField::Qualification => &self.qualification,
            CanonicalField::RegionRestriction => &self.region_restriction,
            CanonicalField::IndustryRestriction => &self.industry_restriction,
            CanonicalField::BidMethod => &self.bid_method,
            CanonicalField::AnnouncementType => &self.announcement_type,
            CanonicalField::IsInternational => &self.is_international,
            CanonicalField::IsReAnnouncement => &self.is_re_announcement,
            CanonicalField::ContactName => &self.contact_name,
            CanonicalField::ContactPhone => &self.contact_phone,
            CanonicalField::ContactEmail => &self.contact_email,
            CanonicalField::ReferenceNumber => &self.reference_number,
            CanonicalField::DetailLinkUrl => &self.detail_link_url,
            CanonicalField::CollectedAt => {
                return Cow::Owned(self.collected_at.format(COLLECTED_AT_FORMAT).to_string());
            }
            CanonicalField::SourceCategory => &self.source_category,
            CanonicalField::CollectionMethod => &self.collection_method,
        };
        Cow::Borrowed(s)
    }

    /// Whether this record came from the demo dataset rather than a live source.
    pub fn is_demo(&self) -> bool {
        self.announcement_id.starts_with(crate::sources::demo::DEMO_ID_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_present_skips_blank_values() {
        let record = RawRecord::from_pairs([("cntrctCnclsMthdNm", "   "), ("cntrctMthd", " 일반경쟁입찰 ")]);
        assert_eq!(
            record.first_present(&["cntrctCnclsMthdNm", "cntrctMthd"]),
            Some("일반경쟁입찰")
        );
        assert_eq!(record.first_present(&["missing"]), None);
    }

    #[test]
    fn test_first_present_respects_priority() {
        let record = RawRecord::from_pairs([("a", "first"), ("b", "second")]);
        assert_eq!(record.first_present(&["b", "a"]), Some("second"));
    }

    #[test]
    fn test_raw_record_deserializes_from_json_object() {
        let record: RawRecord = serde_json::from_str(r#"{"bidNtceNo": "R25BK0001"}"#).unwrap();
        assert_eq!(record.get("bidNtceNo"), Some("R25BK0001"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_category_order_and_labels() {
        let labels: Vec<_> = SourceCategory::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["물품", "용역", "공사", "외자"]);
        assert_eq!(
            SourceCategory::Foreign.operation(),
            "getBidPblancListInfoFrgcptPPSSrch"
        );
    }

    #[test]
    fn test_headers_and_columns_are_unique() {
        use std::collections::HashSet;
        let headers: HashSet<_> = CanonicalField::ALL.iter().map(|f| f.header()).collect();
        let columns: HashSet<_> = CanonicalField::ALL.iter().map(|f| f.column()).collect();
        assert_eq!(headers.len(), CanonicalField::ALL.len());
        assert_eq!(columns.len(), CanonicalField::ALL.len());
    }
}
