//! Fixed demo dataset for the empty-result policy.
//!
//! When no category yields a usable record, a run hands downstream these
//! rows instead, so CSV consumers, the store, and the report always see a
//! non-empty, well-formed batch. Ids carry the [`DEMO_ID_PREFIX`] so they
//! can never be mistaken for real announcement numbers.
//!
//! Records are written with portal column headers and go through the normal
//! [`Normalizer`], so they exercise the same code path as live data.

use crate::models::{CanonicalBid, RawRecord, SourceCategory};
use crate::pipeline::{FieldMap, Normalizer};
use chrono::{DateTime, Duration, Local};

pub const DEMO_ID_PREFIX: &str = "DEMO-";
pub const COLLECTION_METHOD: &str = "데모 데이터";

struct DemoBid {
    id: &'static str,
    category: SourceCategory,
    title: &'static str,
    agency: &'static str,
    department: &'static str,
    contract_method: &'static str,
    estimated_price: &'static str,
    budget: &'static str,
    min_bid_rate: &'static str,
    qualification: &'static str,
    region: &'static str,
    industry: &'static str,
    contact: (&'static str, &'static str, &'static str),
    deadline_days: i64,
}

const DEMO_BIDS: [DemoBid; 3] = [
    DemoBid {
        id: "DEMO-0001",
        category: SourceCategory::Service,
        title: "[데모] 인공지능 기반 업무시스템 구축 용역",
        agency: "서울특별시",
        department: "서울특별시 정보통신담당관",
        contract_method: "일반경쟁입찰",
        estimated_price: "500,000,000",
        budget: "450,000,000",
        min_bid_rate: "87.745%",
        qualification: "일반",
        region: "서울특별시",
        industry: "정보통신업",
        contact: ("김담당", "02-1234-5678", "demo@seoul.go.kr"),
        deadline_days: 14,
    },
    DemoBid {
        id: "DEMO-0002",
        category: SourceCategory::Construction,
        title: "[데모] 청사 통합보안시스템 구축",
        agency: "경기도",
        department: "경기도 디지털정책관",
        contract_method: "제한경쟁입찰",
        estimated_price: "450,000,000",
        budget: "420,000,000",
        min_bid_rate: "85.5%",
        qualification: "중소기업",
        region: "경기도",
        industry: "보안업",
        contact: ("박담당", "031-1234-5678", "demo@gg.go.kr"),
        deadline_days: 12,
    },
    DemoBid {
        id: "DEMO-0003",
        category: SourceCategory::Goods,
        title: "[데모] 사무용 소프트웨어 구매",
        agency: "조달청",
        department: "조달청 정보기술용역과",
        contract_method: "일반경쟁입찰",
        estimated_price: "120,000,000",
        budget: "110,000,000",
        min_bid_rate: "88.0%",
        qualification: "일반",
        region: "전국",
        industry: "소프트웨어사업자",
        contact: ("이담당", "042-1234-5678", "demo@pps.go.kr"),
        deadline_days: 10,
    },
];

/// Demo rows in portal column form, dated relative to `now`.
pub fn demo_records(now: DateTime<Local>) -> Vec<(SourceCategory, RawRecord)> {
    DEMO_BIDS
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let deadline = now + Duration::days(d.deadline_days);
            let opening = deadline + Duration::days(1);
            let record = RawRecord::from_pairs([
                ("공고번호", d.id.to_string()),
                ("공고명", d.title.to_string()),
                ("공고기관", d.agency.to_string()),
                ("수요기관", d.department.to_string()),
                ("계약방법", d.contract_method.to_string()),
                ("입찰공고일", now.format("%Y-%m-%d").to_string()),
                ("입찰마감일시", deadline.format("%Y-%m-%d 18:00").to_string()),
                ("개찰일시", opening.format("%Y-%m-%d 14:00").to_string()),
                ("예정가격", d.estimated_price.to_string()),
                ("추정가격", d.budget.to_string()),
                ("낙찰하한율", d.min_bid_rate.to_string()),
                ("참가자격", d.qualification.to_string()),
                ("지역제한", d.region.to_string()),
                ("업종제한", d.industry.to_string()),
                ("입찰방식", "전자입찰".to_string()),
                ("공고종류", "일반공고".to_string()),
                ("국제입찰여부", "N".to_string()),
                ("재공고여부", "N".to_string()),
                ("공고기관담당자", d.contact.0.to_string()),
                ("담당자전화번호", d.contact.1.to_string()),
                ("담당자이메일", d.contact.2.to_string()),
                ("참조번호", format!("REF-DEMO-{:03}", i + 1)),
            ]);
            (d.category, record)
        })
        .collect()
}

/// The demo dataset as canonical records, stamped with `now`.
pub fn demo_dataset(detail_url_base: &str, now: DateTime<Local>) -> Vec<CanonicalBid> {
    demo_records(now)
        .into_iter()
        .enumerate()
        .filter_map(|(index, (category, raw))| {
            Normalizer::new(FieldMap::portal(), category.label(), COLLECTION_METHOD, detail_url_base)
                .normalize(index, &raw, now)
                .ok()
        })
        .collect()
}
