//! JSON output of the collection report.
//!
//! Reports are grouped by the local date of the run:
//!
//! ```text
//! output_dir/
//! └── 2025-07-08/
//!     ├── report_093012.json
//!     └── report_180455.json
//! ```

use crate::report::CollectionReport;
use chrono::{DateTime, Local};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`CollectionReport`] to a JSON file with date-based directory structure.
///
/// # Output Path
///
/// The file is written to: `{output_dir}/{YYYY-MM-DD}/report_{HHMMSS}.json`
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_report(
    report: &CollectionReport,
    output_dir: &Path,
    now: DateTime<Local>,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_json_dir = output_dir.join(now.format("%Y-%m-%d").to_string());
    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = full_json_dir.join(format!("report_{}.json", now.format("%H%M%S")));
    info!(path = %path.display(), "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON report");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::bid;
    use crate::report::RunOutcome;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_write_report_layout_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2025, 7, 8, 9, 30, 12).unwrap();
        let report = CollectionReport::build(
            RunOutcome::Collected,
            now,
            ("2025-07-01 09:30".into(), "2025-07-08 09:30".into()),
            vec![],
            2,
            &[bid("A", "a"), bid("B", "b")],
        );

        let path = write_report(&report, dir.path(), now).await.unwrap();
        assert_eq!(path, dir.path().join("2025-07-08").join("report_093012.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["outcome"], "collected");
        assert_eq!(value["totalKept"], 2);
        assert_eq!(value["duplicatesRemoved"], 2);
        assert_eq!(value["byCategory"]["물품"], 2);
    }
}
