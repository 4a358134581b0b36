//! Normalization of raw source records into [`CanonicalBid`]s.
//!
//! Every source speaks its own field-naming dialect: the current
//! BidPublicInfoService uses `cntrctCnclsMthdNm` where the older `01` service
//! uses `cntrctMthd`, and portal tables use Korean column headers. Instead of
//! one code path per dialect, each source declares a [`FieldMap`] (canonical
//! field → source names in priority order) and a single [`Normalizer`] applies
//! it.
//!
//! Absent fields are data, not errors: they become [`PLACEHOLDER`]. The one
//! exception is the announcement number, which is the dedupe key; an item
//! without one is reported as an [`ItemParseError`] and skipped.

use crate::errors::ItemParseError;
use crate::models::{CanonicalBid, CanonicalField, PLACEHOLDER, RawRecord};
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Canonical field → acceptable source field names, checked in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    name: String,
    entries: BTreeMap<CanonicalField, Vec<String>>,
}

impl FieldMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add (or replace) the candidate source names for `field`.
    pub fn with(mut self, field: CanonicalField, names: &[&str]) -> Self {
        self.entries
            .insert(field, names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Candidate source names for `field`; empty when the map does not cover it.
    pub fn names(&self, field: CanonicalField) -> &[String] {
        self.entries.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    fn from_table(name: &str, table: &[(CanonicalField, &[&str])]) -> Self {
        table
            .iter()
            .fold(FieldMap::new(name), |map, (field, names)| map.with(*field, names))
    }

    /// Current `ad/BidPublicInfoService` names, with legacy names as alternates.
    pub fn official() -> &'static FieldMap {
        &OFFICIAL
    }

    /// `BidPublicInfoService01` names, with current names as alternates.
    pub fn legacy() -> &'static FieldMap {
        &LEGACY
    }

    /// Korean column headers of the portal's result tables.
    pub fn portal() -> &'static FieldMap {
        &PORTAL
    }
}

use CanonicalField as F;

static OFFICIAL: Lazy<FieldMap> = Lazy::new(|| {
    FieldMap::from_table(
        "official",
        &[
            (F::AnnouncementId, &["bidNtceNo"]),
            (F::Title, &["bidNtceNm"]),
            (F::AnnouncingAgency, &["ntceInsttNm"]),
            (F::DemandingDepartment, &["dminsttNm", "dmndInsttNm"]),
            (F::ContractMethod, &["cntrctCnclsMthdNm", "cntrctMthd"]),
            (F::AnnouncementDate, &["bidNtceDt"]),
            (F::DeadlineDateTime, &["bidClseDt"]),
            (F::OpeningDateTime, &["opengDt"]),
            (F::EstimatedPrice, &["presmptPrc"]),
            (F::BudgetAmount, &["assmtUprc", "asignBdgtAmt"]),
            (F::MinimumBidRate, &["scsbdAmt", "sucsfbidLwltRate"]),
            (F::Qualification, &["prtcptLmtYn"]),
            (F::RegionRestriction, &["rgstTyNm"]),
            (F::IndustryRestriction, &["indstryClNm"]),
            (F::BidMethod, &["bidMethdNm"]),
            (F::AnnouncementType, &["ntceKindNm"]),
            (F::IsInternational, &["intrbidYn"]),
            (F::IsReAnnouncement, &["reNtceYn"]),
            (F::ContactName, &["ntceInsttOfclNm"]),
            (F::ContactPhone, &["ntceInsttOfclTelNo"]),
            (F::ContactEmail, &["ntceInsttOfclEmailAdrs"]),
            (F::ReferenceNumber, &["refNo"]),
        ],
    )
});

static LEGACY: Lazy<FieldMap> = Lazy::new(|| {
    (*OFFICIAL)
        .clone()
        .with(F::DemandingDepartment, &["dmndInsttNm", "dminsttNm"])
        .with(F::ContractMethod, &["cntrctMthd", "cntrctCnclsMthdNm"])
        .renamed("legacy")
});

static PORTAL: Lazy<FieldMap> = Lazy::new(|| {
    FieldMap::from_table(
        "portal",
        &[
            (F::AnnouncementId, &["공고번호", "입찰공고번호"]),
            (F::Title, &["공고명", "입찰공고명"]),
            (F::AnnouncingAgency, &["공고기관"]),
            (F::DemandingDepartment, &["수요기관"]),
            (F::ContractMethod, &["계약방법"]),
            (F::AnnouncementDate, &["입찰공고일", "공고일자"]),
            (F::DeadlineDateTime, &["입찰마감일시", "마감일시"]),
            (F::OpeningDateTime, &["개찰일시"]),
            (F::EstimatedPrice, &["예정가격"]),
            (F::BudgetAmount, &["추정가격"]),
            (F::MinimumBidRate, &["낙찰하한율"]),
            (F::Qualification, &["참가자격"]),
            (F::RegionRestriction, &["지역제한"]),
            (F::IndustryRestriction, &["업종제한"]),
            (F::BidMethod, &["입찰방식", "입찰방법"]),
            (F::AnnouncementType, &["공고종류"]),
            (F::IsInternational, &["국제입찰여부", "국제입찰"]),
            (F::IsReAnnouncement, &["재공고여부"]),
            (F::ContactName, &["공고기관담당자", "담당자"]),
            (F::ContactPhone, &["담당자전화번호", "연락처"]),
            (F::ContactEmail, &["담당자이메일", "이메일"]),
            (F::ReferenceNumber, &["참조번호"]),
        ],
    )
});

impl FieldMap {
    fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Output of normalizing one batch.
///
/// `bids.len() + skipped.len()` always equals the number of raw items.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub bids: Vec<CanonicalBid>,
    pub skipped: Vec<ItemParseError>,
}

/// Applies a [`FieldMap`] to raw records and fills in the derived columns.
#[derive(Debug, Clone)]
pub struct Normalizer<'a> {
    field_map: &'a FieldMap,
    source_category: String,
    collection_method: String,
    detail_url_base: String,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        field_map: &'a FieldMap,
        source_category: impl Into<String>,
        collection_method: impl Into<String>,
        detail_url_base: impl Into<String>,
    ) -> Self {
        Self {
            field_map,
            source_category: source_category.into(),
            collection_method: collection_method.into(),
            detail_url_base: detail_url_base.into(),
        }
    }

    /// Normalize every raw item, stamping the batch with the current time.
    pub fn normalize_batch(&self, raws: &[RawRecord]) -> NormalizedBatch {
        self.normalize_batch_at(raws, Local::now())
    }

    pub fn normalize_batch_at(
        &self,
        raws: &[RawRecord],
        collected_at: DateTime<Local>,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for (index, raw) in raws.iter().enumerate() {
            match self.normalize(index, raw, collected_at) {
                Ok(bid) => batch.bids.push(bid),
                Err(e) if raw.is_empty() => {
                    warn!(error = %e, map = self.field_map.name(), "Skipping unreadable raw item");
                    batch.skipped.push(e);
                }
                Err(e) => {
                    warn!(error = %e, fields = raw.len(), map = self.field_map.name(), "Skipping raw item");
                    batch.skipped.push(e);
                }
            }
        }
        debug!(
            map = self.field_map.name(),
            category = %self.source_category,
            normalized = batch.bids.len(),
            skipped = batch.skipped.len(),
            "Normalized batch"
        );
        batch
    }

    /// Normalize a single raw item. `index` is its position in the batch.
    pub fn normalize(
        &self,
        index: usize,
        raw: &RawRecord,
        collected_at: DateTime<Local>,
    ) -> Result<CanonicalBid, ItemParseError> {
        let announcement_id = raw
            .first_present(self.field_map.names(F::AnnouncementId))
            .ok_or(ItemParseError::MissingAnnouncementId { index })?
            .to_string();

        let get = |field: CanonicalField| -> String {
            raw.first_present(self.field_map.names(field))
                .unwrap_or(PLACEHOLDER)
                .to_string()
        };

        Ok(CanonicalBid {
            detail_link_url: format!("{}{}", self.detail_url_base, announcement_id),
            announcement_id,
            title: get(F::Title),
            announcing_agency: get(F::AnnouncingAgency),
            demanding_department: get(F::DemandingDepartment),
            contract_method: get(F::ContractMethod),
            announcement_date: get(F::AnnouncementDate),
            deadline_date_time: get(F::DeadlineDateTime),
            opening_date_time: get(F::OpeningDateTime),
            estimated_price: get(F::EstimatedPrice),
            budget_amount: get(F::BudgetAmount),
            minimum_bid_rate: get(F::MinimumBidRate),
            qualification: get(F::Qualification),
            region_restriction: get(F::RegionRestriction),
            industry_restriction: get(F::IndustryRestriction),
            bid_method: get(F::BidMethod),
            announcement_type: get(F::AnnouncementType),
            is_international: get(F::IsInternational),
            is_re_announcement: get(F::IsReAnnouncement),
            contact_name: get(F::ContactName),
            contact_phone: get(F::ContactPhone),
            contact_email: get(F::ContactEmail),
            reference_number: get(F::ReferenceNumber),
            collected_at,
            source_category: self.source_category.clone(),
            collection_method: self.collection_method.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DETAIL: &str = "https://www.g2b.go.kr/pt/menu/selectSubFrame.do?bidNtceNo=";

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 7, 1, 9, 30, 0).unwrap()
    }

    fn official(category: &str) -> Normalizer<'static> {
        Normalizer::new(FieldMap::official(), category, "공공데이터 API", DETAIL)
    }

    #[test]
    fn test_missing_title_becomes_placeholder() {
        let raw = RawRecord::from_pairs([("bidNtceNo", "R25BK00000001")]);
        let bid = official("용역").normalize(0, &raw, ts()).unwrap();
        assert_eq!(bid.title, PLACEHOLDER);
        assert_eq!(bid.contract_method, PLACEHOLDER);
        assert_eq!(bid.announcement_id, "R25BK00000001");
    }

    #[test]
    fn test_derived_columns() {
        let raw = RawRecord::from_pairs([("bidNtceNo", "R25BK00000001"), ("bidNtceNm", "청사 보수공사")]);
        let bid = official("공사").normalize(0, &raw, ts()).unwrap();
        assert_eq!(bid.detail_link_url, format!("{DETAIL}R25BK00000001"));
        assert_eq!(bid.source_category, "공사");
        assert_eq!(bid.collection_method, "공공데이터 API");
        assert_eq!(bid.collected_at, ts());
    }

    #[test]
    fn test_official_map_accepts_legacy_contract_field() {
        let raw = RawRecord::from_pairs([("bidNtceNo", "1"), ("cntrctMthd", "제한경쟁입찰")]);
        let bid = official("물품").normalize(0, &raw, ts()).unwrap();
        assert_eq!(bid.contract_method, "제한경쟁입찰");
    }

    #[test]
    fn test_legacy_map_prefers_legacy_names() {
        let raw = RawRecord::from_pairs([
            ("bidNtceNo", "1"),
            ("dmndInsttNm", "legacy"),
            ("dminsttNm", "official"),
        ]);
        let legacy = Normalizer::new(FieldMap::legacy(), "용역", "공공데이터 API", DETAIL);
        assert_eq!(legacy.normalize(0, &raw, ts()).unwrap().demanding_department, "legacy");
        assert_eq!(official("용역").normalize(0, &raw, ts()).unwrap().demanding_department, "official");
        assert_eq!(FieldMap::legacy().name(), "legacy");
    }

    #[test]
    fn test_portal_map_reads_korean_headers() {
        let raw = RawRecord::from_pairs([
            ("공고번호", "20250700001-00"),
            ("공고명", "전산장비 구매"),
            ("입찰방법", "전자입찰"),
        ]);
        let n = Normalizer::new(FieldMap::portal(), "물품", "포털 조회", DETAIL);
        let bid = n.normalize(0, &raw, ts()).unwrap();
        assert_eq!(bid.title, "전산장비 구매");
        assert_eq!(bid.bid_method, "전자입찰");
    }

    #[test]
    fn test_missing_id_is_item_error() {
        let raw = RawRecord::from_pairs([("bidNtceNm", "번호 없는 공고"), ("bidNtceNo", "  ")]);
        let err = official("물품").normalize(3, &raw, ts()).unwrap_err();
        assert_eq!(err, ItemParseError::MissingAnnouncementId { index: 3 });
    }

    #[test]
    fn test_batch_accounts_for_every_item() {
        let raws = vec![
            RawRecord::from_pairs([("bidNtceNo", "A")]),
            RawRecord::new(),
            RawRecord::from_pairs([("bidNtceNo", "B")]),
        ];
        let batch = official("물품").normalize_batch_at(&raws, ts());
        assert_eq!(batch.bids.len() + batch.skipped.len(), raws.len());
        assert_eq!(batch.skipped, vec![ItemParseError::MissingAnnouncementId { index: 1 }]);
    }

    #[test]
    fn test_every_mapped_field_is_covered_by_builtin_maps() {
        for map in [FieldMap::official(), FieldMap::legacy(), FieldMap::portal()] {
            for field in &CanonicalField::ALL[..CanonicalField::ALL.len() - 4] {
                assert!(!map.names(*field).is_empty(), "{} lacks {:?}", map.name(), field);
            }
        }
    }
}
