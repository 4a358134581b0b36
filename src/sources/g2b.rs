//! data.go.kr BidPublicInfoService adapter.
//!
//! Queries the per-category list operations (`getBidPblancListInfo*PPSSrch`)
//! of the public procurement service and turns each `<item>` (or JSON item
//! object) into a [`RawRecord`].
//!
//! # Response shapes
//!
//! The service answers in XML or JSON depending on the `type` parameter,
//! but gateway-level failures (unregistered key, quota exceeded) always come
//! back as an XML `OpenAPI_ServiceResponse`, so the body is sniffed rather
//! than trusted to match the requested format.
//!
//! ```text
//! <response>
//!   <header><resultCode>00</resultCode><resultMsg>정상</resultMsg></header>
//!   <body>
//!     <items><item><bidNtceNo>…</bidNtceNo>…</item>…</items>
//!     <numOfRows>100</numOfRows><pageNo>1</pageNo><totalCount>253</totalCount>
//!   </body>
//! </response>
//! ```

use crate::config::ApiConfig;
use crate::errors::SourceError;
use crate::models::{RawRecord, SourceCategory};
use crate::pipeline::FieldMap;
use crate::sources::{BidSource, DateRange, SourcePage};
use crate::utils::{decode_service_key, truncate_for_log};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// `collectionMethod` of records fetched through the API.
pub const COLLECTION_METHOD: &str = "공공데이터 API";

const RESULT_OK: &str = "00";
/// `NODATA_ERROR`: the query was valid but matched nothing.
const RESULT_NO_DATA: &str = "03";

/// Adapter for the data.go.kr bid announcement service.
pub struct G2bApiSource {
    client: Client,
    base: Url,
    service_key: Option<String>,
    config: ApiConfig,
}

impl fmt::Debug for G2bApiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("G2bApiSource")
            .field("base", &self.base.as_str())
            .field("schema", &self.config.schema)
            .field("format", &self.config.format)
            .field("has_service_key", &self.service_key.is_some())
            .finish()
    }
}

impl G2bApiSource {
    /// Build the adapter and its HTTP client from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/xml, text/xml, application/json, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        // Trailing slash so `join` appends the operation instead of replacing the last segment.
        let base = Url::parse(&format!("{}/", config.base_url().trim_end_matches('/')))?;

        let service_key = config
            .service_key
            .as_deref()
            .map(|k| decode_service_key(k).into_owned())
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            base,
            service_key,
            config,
        })
    }

    #[instrument(level = "debug", skip(self, key, begin, end))]
    async fn fetch_page(
        &self,
        url: &str,
        key: &str,
        page: u32,
        begin: &str,
        end: &str,
    ) -> Result<SourcePage, SourceError> {
        let rows = self.config.rows_per_page.to_string();
        let page_no = page.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[
                ("serviceKey", key),
                ("numOfRows", rows.as_str()),
                ("pageNo", page_no.as_str()),
                ("type", self.config.format.as_param()),
                ("inqryDiv", "1"),
                ("inqryBgnDt", begin),
                ("inqryEndDt", end),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(%status, bytes = body.len(), "Received response");

        if status != StatusCode::OK {
            return Err(SourceError::HttpStatus {
                status,
                endpoint: url.to_string(),
                preview: truncate_for_log(&body, 300),
            });
        }
        parse_page(&body)
    }
}

impl BidSource for G2bApiSource {
    fn name(&self) -> &str {
        "g2b_api"
    }

    fn field_map(&self) -> &FieldMap {
        self.config.schema.field_map()
    }

    fn collection_method(&self) -> &str {
        COLLECTION_METHOD
    }

    fn endpoint(&self, category: SourceCategory) -> String {
        match self.base.join(category.operation()) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{}", self.base, category.operation()),
        }
    }

    /// Fetch every page of `category` within `range`, up to `max_pages`.
    ///
    /// Paging stops early on an empty page or once `totalCount` items are in.
    #[instrument(level = "info", skip_all, fields(%category))]
    async fn fetch(
        &self,
        category: SourceCategory,
        range: &DateRange,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let key = self
            .service_key
            .as_deref()
            .ok_or(SourceError::MissingServiceKey)?;
        let url = self.endpoint(category);
        let (begin, end) = range.format(self.config.schema.inquiry_date_format());
        info!(%url, %begin, %end, "Querying bid announcements");

        let mut records = Vec::new();
        for page in 1..=page_limit(self.config.max_pages) {
            let SourcePage {
                records: batch,
                total_count,
            } = self.fetch_page(&url, key, page, &begin, &end).await?;
            let received = batch.len();
            records.extend(batch);
            debug!(page, received, ?total_count, "Fetched page");

            if page_exhausted(received, records.len(), total_count) {
                break;
            }
        }

        info!(count = records.len(), "Fetched raw records");
        Ok(records)
    }
}

/// At least one page is always requested.
fn page_limit(max_pages: u32) -> u32 {
    max_pages.max(1)
}

/// Whether paging should stop after a page of `received` items, with
/// `collected` items in so far. A response without `totalCount` gives no way
/// to know more pages exist, so it ends paging as well.
fn page_exhausted(received: usize, collected: usize, total: Option<u64>) -> bool {
    received == 0 || total.is_none_or(|total| collected as u64 >= total)
}

/// Parse one list response body, XML or JSON.
pub fn parse_page(body: &str) -> Result<SourcePage, SourceError> {
    let body = body.trim_start_matches('\u{feff}').trim_start();
    if body.is_empty() {
        return Err(SourceError::ResponseFormat("empty response body".into()));
    }
    if body.starts_with('<') {
        parse_xml_page(body)
    } else {
        parse_json_page(body)
    }
}

/// Returns `Ok(false)` for the no-data code, which is not an error.
fn check_result(code: Option<&str>, message: Option<&str>) -> Result<bool, SourceError> {
    match code.map(str::trim) {
        None | Some(RESULT_OK) => Ok(true),
        Some(RESULT_NO_DATA) => Ok(false),
        Some(code) => Err(SourceError::Declared {
            code: code.to_string(),
            message: message.unwrap_or("unknown error").trim().to_string(),
        }),
    }
}

// The root element name is not checked, so one envelope covers both
// `<response>` and the gateway's `<OpenAPI_ServiceResponse>`.
#[derive(Debug, Deserialize)]
struct XmlEnvelope {
    header: Option<XmlHeader>,
    body: Option<XmlBody>,
    #[serde(rename = "cmmMsgHeader")]
    gateway: Option<GatewayHeader>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlHeader {
    result_code: Option<String>,
    result_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct XmlBody {
    total_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayHeader {
    err_msg: Option<String>,
    return_auth_msg: Option<String>,
    return_reason_code: Option<String>,
}

fn parse_xml_page(body: &str) -> Result<SourcePage, SourceError> {
    let envelope: XmlEnvelope = quick_xml::de::from_str(body)?;

    if let Some(gw) = envelope.gateway {
        return Err(SourceError::Declared {
            code: gw.return_reason_code.unwrap_or_else(|| "gateway".into()),
            message: gw
                .return_auth_msg
                .or(gw.err_msg)
                .unwrap_or_else(|| "gateway error".into()),
        });
    }

    let header = envelope.header;
    let has_data = check_result(
        header.as_ref().and_then(|h| h.result_code.as_deref()),
        header.as_ref().and_then(|h| h.result_msg.as_deref()),
    )?;
    if !has_data {
        return Ok(SourcePage::default());
    }

    let envelope_body = envelope
        .body
        .ok_or_else(|| SourceError::ResponseFormat("response has no body".into()))?;
    Ok(SourcePage {
        records: xml_items(body)?,
        total_count: envelope_body.total_count.and_then(|t| t.trim().parse().ok()),
    })
}

/// Every `<item>` under `<items>`, each deserialized on its own. An item that
/// is not a flat list of text fields becomes an empty record, which the
/// normalizer reports and skips.
fn xml_items(body: &str) -> Result<Vec<RawRecord>, SourceError> {
    let mut reader = Reader::from_str(body);
    let mut records = Vec::new();
    let mut in_items = false;
    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"items" => in_items = true,
            Event::End(e) if e.name().as_ref() == b"items" => in_items = false,
            Event::Start(e) if in_items && e.name().as_ref() == b"item" => {
                reader.read_to_end(e.name())?;
                let end = reader.buffer_position() as usize;
                let index = records.len();
                records.push(xml_record(body.get(start..end).unwrap_or_default(), index));
            }
            Event::Empty(e) if in_items && e.name().as_ref() == b"item" => {
                records.push(RawRecord::new());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(records)
}

fn xml_record(fragment: &str, index: usize) -> RawRecord {
    quick_xml::de::from_str(fragment).unwrap_or_else(|e| {
        warn!(index, error = %e, "Unreadable XML item");
        RawRecord::new()
    })
}

fn parse_json_page(body: &str) -> Result<SourcePage, SourceError> {
    let root: Value = serde_json::from_str(body)?;
    let response = root.get("response").unwrap_or(&root);

    let header = response.get("header");
    let has_data = check_result(
        header.and_then(|h| h.get("resultCode")).and_then(Value::as_str),
        header.and_then(|h| h.get("resultMsg")).and_then(Value::as_str),
    )?;
    if !has_data {
        return Ok(SourcePage::default());
    }

    let body = response
        .get("body")
        .ok_or_else(|| SourceError::ResponseFormat("response has no body".into()))?;
    let total_count = match body.get("totalCount") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    let records = json_items(body.get("items"))
        .into_iter()
        .map(json_record)
        .collect();

    Ok(SourcePage {
        records,
        total_count,
    })
}

/// `items` is an array, `{"item": [...]}`, `{"item": {...}}`, or `""` when empty.
fn json_items(items: Option<&Value>) -> Vec<&Value> {
    match items {
        Some(Value::Array(list)) => list.iter().collect(),
        Some(Value::Object(obj)) => match obj.get("item") {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Non-object items yield an empty record, which the normalizer reports and skips.
fn json_record(item: &Value) -> RawRecord {
    let Some(obj) = item.as_object() else {
        return RawRecord::new();
    };
    RawRecord::from_pairs(obj.iter().filter_map(|(k, v)| {
        let text = match v {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some((k.clone(), text))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiSchema, LEGACY_BASE_URL};
    use crate::errors::SourceErrorKind;
    use chrono::{Local, TimeZone};

    const XML_OK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<response>
  <header><resultCode>00</resultCode><resultMsg>정상</resultMsg></header>
  <body>
    <items>
      <item>
        <bidNtceNo>R25BK00900001</bidNtceNo>
        <bidNtceNm>청사 전기설비 개선공사</bidNtceNm>
        <cntrctCnclsMthdNm>일반경쟁</cntrctCnclsMthdNm>
        <refNo></refNo>
      </item>
      <item>
        <bidNtceNo>R25BK00900002</bidNtceNo>
        <bidNtceNm>소모품 구매 &amp; 납품</bidNtceNm>
        <cntrctCnclsMthdNm>수의계약</cntrctCnclsMthdNm>
      </item>
    </items>
    <numOfRows>100</numOfRows>
    <pageNo>1</pageNo>
    <totalCount>2</totalCount>
  </body>
</response>"#;

    #[test]
    fn test_parse_xml_items() {
        let page = parse_page(XML_OK).unwrap();
        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].get("bidNtceNo"), Some("R25BK00900001"));
        assert_eq!(page.records[1].get("bidNtceNm"), Some("소모품 구매 & 납품"));
        assert_eq!(page.records[0].first_present(&["refNo"]), None);
    }

    #[test]
    fn test_parse_xml_single_item() {
        let xml = "<response><header><resultCode>00</resultCode></header><body><items><item><bidNtceNo>A</bidNtceNo></item></items><totalCount>1</totalCount></body></response>";
        let page = parse_page(xml).unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn test_parse_xml_nested_item_does_not_sink_page() {
        let xml = "<response><header><resultCode>00</resultCode></header><body><items>\
            <item><bidNtceNo>A</bidNtceNo><x><y>1</y></x></item>\
            <item><bidNtceNo>B</bidNtceNo></item>\
            <item/>\
            </items><totalCount>3</totalCount></body></response>";
        let page = parse_page(xml).unwrap();
        assert_eq!(page.total_count, Some(3));
        assert_eq!(page.records.len(), 3);
        assert!(page.records[0].is_empty());
        assert_eq!(page.records[1].get("bidNtceNo"), Some("B"));
        assert!(page.records[2].is_empty());
    }

    #[test]
    fn test_parse_xml_items_outside_list_are_ignored() {
        let xml = "<response><header><resultCode>00</resultCode></header><body>\
            <item><bidNtceNo>stray</bidNtceNo></item><items></items><totalCount>0</totalCount>\
            </body></response>";
        let page = parse_page(xml).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total_count, Some(0));
    }

    #[test]
    fn test_page_limit_requests_at_least_one_page() {
        assert_eq!(page_limit(0), 1);
        assert_eq!(page_limit(1), 1);
        assert_eq!(page_limit(5), 5);
    }

    #[test]
    fn test_paging_stops_on_empty_page() {
        assert!(page_exhausted(0, 100, Some(500)));
        assert!(page_exhausted(0, 0, None));
    }

    #[test]
    fn test_paging_stops_once_total_is_collected() {
        assert!(!page_exhausted(100, 100, Some(253)));
        assert!(!page_exhausted(100, 200, Some(253)));
        assert!(page_exhausted(53, 253, Some(253)));
        // Exact multiple of the page size: page 2 completes the set.
        assert!(!page_exhausted(100, 100, Some(200)));
        assert!(page_exhausted(100, 200, Some(200)));
        // Source reported fewer than it returned.
        assert!(page_exhausted(100, 100, Some(10)));
    }

    #[test]
    fn test_paging_stops_without_total_count() {
        assert!(page_exhausted(100, 100, None));
        assert!(page_exhausted(1, 1, None));
    }

    #[test]
    fn test_parse_xml_declared_error() {
        let xml = "<response><header><resultCode>07</resultCode><resultMsg>입력범위값 초과 에러</resultMsg></header></response>";
        match parse_page(xml) {
            Err(SourceError::Declared { code, message }) => {
                assert_eq!(code, "07");
                assert_eq!(message, "입력범위값 초과 에러");
            }
            other => panic!("expected declared error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_xml_no_data_is_empty_page() {
        let xml = "<response><header><resultCode>03</resultCode><resultMsg>NODATA_ERROR</resultMsg></header></response>";
        let page = parse_page(xml).unwrap();
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_parse_gateway_error() {
        let xml = "<OpenAPI_ServiceResponse><cmmMsgHeader><errMsg>SERVICE ERROR</errMsg><returnAuthMsg>SERVICE_KEY_IS_NOT_REGISTERED_ERROR</returnAuthMsg><returnReasonCode>30</returnReasonCode></cmmMsgHeader></OpenAPI_ServiceResponse>";
        let err = parse_page(xml).unwrap_err();
        assert_eq!(err.kind(), SourceErrorKind::DeclaredSourceError);
        assert!(err.to_string().contains("SERVICE_KEY_IS_NOT_REGISTERED_ERROR"));
    }

    #[test]
    fn test_parse_malformed_bodies() {
        assert_eq!(
            parse_page("").unwrap_err().kind(),
            SourceErrorKind::ResponseFormatError
        );
        assert_eq!(
            parse_page("<response><body><items><item><bidNtceNo>A</item></items></body></response>")
                .unwrap_err()
                .kind(),
            SourceErrorKind::ResponseFormatError
        );
        assert_eq!(
            parse_page("{\"response\": ").unwrap_err().kind(),
            SourceErrorKind::ResponseFormatError
        );
    }

    #[test]
    fn test_parse_json_array_items() {
        let json = r#"{"response":{"header":{"resultCode":"00","resultMsg":"정상"},
            "body":{"items":[{"bidNtceNo":"A","presmptPrc":150000000,"refNo":null},"junk"],
            "numOfRows":100,"pageNo":1,"totalCount":2}}}"#;
        let page = parse_page(json).unwrap();
        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].get("presmptPrc"), Some("150000000"));
        assert_eq!(page.records[0].get("refNo"), None);
        assert!(page.records[1].is_empty());
    }

    #[test]
    fn test_parse_json_item_object_forms() {
        let nested = r#"{"response":{"header":{"resultCode":"00"},"body":{"items":{"item":{"bidNtceNo":"A"}},"totalCount":"1"}}}"#;
        let page = parse_page(nested).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total_count, Some(1));

        let empty = r#"{"response":{"header":{"resultCode":"00"},"body":{"items":"","totalCount":0}}}"#;
        assert!(parse_page(empty).unwrap().records.is_empty());
    }

    #[test]
    fn test_parse_json_declared_error() {
        let json = r#"{"response":{"header":{"resultCode":"12","resultMsg":"NO_OPENAPI_SERVICE_ERROR"}}}"#;
        let err = parse_page(json).unwrap_err();
        assert_eq!(err.kind(), SourceErrorKind::DeclaredSourceError);
    }

    #[test]
    fn test_endpoint_appends_operation() {
        let source = G2bApiSource::new(ApiConfig::default()).unwrap();
        assert_eq!(
            source.endpoint(SourceCategory::Goods),
            "https://apis.data.go.kr/1230000/ad/BidPublicInfoService/getBidPblancListInfoThngPPSSrch"
        );

        let legacy = G2bApiSource::new(ApiConfig {
            schema: ApiSchema::Legacy,
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(
            legacy.endpoint(SourceCategory::Construction),
            format!("{LEGACY_BASE_URL}/getBidPblancListInfoCnstwkPPSSrch")
        );
        assert_eq!(legacy.field_map().name(), "legacy");
    }

    #[tokio::test]
    async fn test_fetch_without_key_is_declared_error() {
        let source = G2bApiSource::new(ApiConfig::default()).unwrap();
        let end = Local.with_ymd_and_hms(2025, 7, 8, 12, 0, 0).unwrap();
        let err = source
            .fetch(SourceCategory::Service, &DateRange::last_days(end, 7))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingServiceKey));
    }

    #[test]
    fn test_encoded_key_is_decoded_once() {
        let source = G2bApiSource::new(ApiConfig {
            service_key: Some("abc%2Bdef%3D%3D".into()),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(source.service_key.as_deref(), Some("abc+def=="));
    }
}
