//! Delimited-text output.
//!
//! One row per [`CanonicalBid`], columns in [`CanonicalField::ALL`] order
//! under Korean headers. Files start with a UTF-8 byte-order mark so
//! spreadsheet tools open Hangul text without guessing the encoding.

use crate::models::{CanonicalBid, CanonicalField};
use chrono::{DateTime, Local};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `G2B_Bids_{YYYYMMDD_HHMM}.csv`, the output of a collection run.
pub fn csv_file_name(now: DateTime<Local>) -> String {
    format!("G2B_Bids_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// `G2B_DB_Export_{YYYYMMDD_HHMM}.csv`, a dump of the durable store.
pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("G2B_DB_Export_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// Render `bids` as a BOM-prefixed CSV document. An empty slice yields the header row only.
pub fn render_csv(bids: &[CanonicalBid]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = ::csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer.write_record(CanonicalField::ALL.iter().map(|f| f.header()))?;
    for bid in bids {
        writer.write_record(CanonicalField::ALL.iter().map(|f| bid.value(*f).into_owned()))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

/// Write `bids` to `{output_dir}/{file_name}` and return the path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = bids.len()))]
pub async fn write_bids(
    bids: &[CanonicalBid],
    output_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let bytes = render_csv(bids)?;

    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(error = %e, "Failed to create CSV dir");
        return Err(e.into());
    }

    let path = output_dir.join(file_name);
    info!(path = %path.display(), "Writing CSV");
    fs::write(&path, bytes).await?;
    info!(path = %path.display(), rows = bids.len(), "Wrote CSV file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::bid;
    use chrono::TimeZone;

    fn read_rows(bytes: &[u8]) -> Vec<Vec<String>> {
        assert!(bytes.starts_with(UTF8_BOM));
        ::csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&bytes[UTF8_BOM.len()..])
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_header_follows_canonical_order() {
        let rows = read_rows(&render_csv(&[]).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), CanonicalField::ALL.len());
        assert_eq!(rows[0][0], "공고번호");
        assert_eq!(rows[0][4], "계약방법");
        assert_eq!(rows[0][25], "수집방법");
    }

    #[test]
    fn test_rows_preserve_hangul_and_commas() {
        let mut b = bid("20250701001", "청사, 보안시스템 구축");
        b.estimated_price = "1,000,000".into();
        let rows = read_rows(&render_csv(&[b]).unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "20250701001");
        assert_eq!(rows[1][1], "청사, 보안시스템 구축");
        assert_eq!(rows[1][8], "1,000,000");
        assert_eq!(rows[1][23], "2025-07-01 09:00:00");
    }

    #[test]
    fn test_file_name_uses_minute_precision() {
        let now = Local.with_ymd_and_hms(2025, 7, 8, 9, 30, 12).unwrap();
        assert_eq!(csv_file_name(now), "G2B_Bids_20250708_0930.csv");
        assert_eq!(export_file_name(now), "G2B_DB_Export_20250708_0930.csv");
    }

    #[tokio::test]
    async fn test_write_bids_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let now = Local.with_ymd_and_hms(2025, 7, 8, 9, 30, 0).unwrap();
        let path = write_bids(&[bid("A", "a")], &out, &csv_file_name(now)).await.unwrap();
        assert_eq!(path, out.join("G2B_Bids_20250708_0930.csv"));
        let rows = read_rows(&std::fs::read(&path).unwrap());
        assert_eq!(rows.len(), 2);
    }
}
