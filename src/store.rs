//! Durable SQLite store.
//!
//! The `bids` table holds one row per announcement number. Writing a batch
//! is an upsert: a bid that is already stored has its columns replaced and
//! `updated_at` bumped, and its `created_at` is left alone. The `api_logs`
//! table keeps one row per source call, successful or not.

use crate::models::{COLLECTED_AT_FORMAT, CanonicalBid, CanonicalField};
use crate::sources::ApiCall;
use chrono::{Local, NaiveDateTime};
use once_cell::sync::Lazy;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

const CREATE_BIDS: &str = r#"
CREATE TABLE IF NOT EXISTS bids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bid_number TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    agency TEXT NOT NULL,
    department TEXT NOT NULL,
    contract_method TEXT NOT NULL,
    announcement_date TEXT NOT NULL,
    deadline_date TEXT NOT NULL,
    opening_date TEXT NOT NULL,
    estimated_price TEXT NOT NULL,
    budget TEXT NOT NULL,
    min_bid_rate TEXT NOT NULL,
    qualification TEXT NOT NULL,
    region_limit TEXT NOT NULL,
    industry_limit TEXT NOT NULL,
    bid_method TEXT NOT NULL,
    announcement_type TEXT NOT NULL,
    international_bid TEXT NOT NULL,
    re_announcement TEXT NOT NULL,
    contact_person TEXT NOT NULL,
    contact_phone TEXT NOT NULL,
    contact_email TEXT NOT NULL,
    reference_number TEXT NOT NULL,
    link_url TEXT NOT NULL,
    collection_date TEXT NOT NULL,
    category TEXT NOT NULL,
    collection_method TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#;

const CREATE_BIDS_CATEGORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_bids_category ON bids (category)";

const CREATE_API_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS api_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    api_source TEXT NOT NULL,
    category TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    status_code INTEGER,
    record_count INTEGER NOT NULL,
    error_message TEXT,
    called_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#;

/// Column list in `CanonicalField::ALL` order.
static COLUMNS: Lazy<String> = Lazy::new(|| {
    CanonicalField::ALL
        .iter()
        .map(|f| f.column())
        .collect::<Vec<_>>()
        .join(", ")
});

static UPSERT_BID: Lazy<String> = Lazy::new(|| {
    let placeholders = vec!["?"; CanonicalField::ALL.len()].join(", ");
    let updates = CanonicalField::ALL
        .iter()
        .filter(|f| **f != CanonicalField::AnnouncementId)
        .map(|f| format!("{0} = excluded.{0}", f.column()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO bids ({}) VALUES ({placeholders}) \
         ON CONFLICT(bid_number) DO UPDATE SET {updates}, updated_at = CURRENT_TIMESTAMP",
        *COLUMNS
    )
});

static SELECT_BIDS: Lazy<String> =
    Lazy::new(|| format!("SELECT {} FROM bids ORDER BY id", *COLUMNS));

/// Counts of one `upsert_bids` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// Aggregate view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub total: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_collection_method: BTreeMap<String, i64>,
    /// Rows first stored today (UTC).
    pub created_today: i64,
    pub api_calls: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct BidRow {
    bid_number: String,
    title: String,
    agency: String,
    department: String,
    contract_method: String,
    announcement_date: String,
    deadline_date: String,
    opening_date: String,
    estimated_price: String,
    budget: String,
    min_bid_rate: String,
    qualification: String,
    region_limit: String,
    industry_limit: String,
    bid_method: String,
    announcement_type: String,
    international_bid: String,
    re_announcement: String,
    contact_person: String,
    contact_phone: String,
    contact_email: String,
    reference_number: String,
    link_url: String,
    collection_date: String,
    category: String,
    collection_method: String,
}

impl TryFrom<BidRow> for CanonicalBid {
    type Error = chrono::ParseError;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        let naive = NaiveDateTime::parse_from_str(&row.collection_date, COLLECTED_AT_FORMAT)?;
        let collected_at = naive
            .and_local_timezone(Local)
            .earliest()
            .unwrap_or_else(|| naive.and_utc().with_timezone(&Local));
        Ok(CanonicalBid {
            announcement_id: row.bid_number,
            title: row.title,
            announcing_agency: row.agency,
            demanding_department: row.department,
            contract_method: row.contract_method,
            announcement_date: row.announcement_date,
            deadline_date_time: row.deadline_date,
            opening_date_time: row.opening_date,
            estimated_price: row.estimated_price,
            budget_amount: row.budget,
            minimum_bid_rate: row.min_bid_rate,
            qualification: row.qualification,
            region_restriction: row.region_limit,
            industry_restriction: row.industry_limit,
            bid_method: row.bid_method,
            announcement_type: row.announcement_type,
            is_international: row.international_bid,
            is_re_announcement: row.re_announcement,
            contact_name: row.contact_person,
            contact_phone: row.contact_phone,
            contact_email: row.contact_email,
            reference_number: row.reference_number,
            detail_link_url: row.link_url,
            collected_at,
            source_category: row.category,
            collection_method: row.collection_method,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BidStore {
    pool: SqlitePool,
}

impl BidStore {
    /// Open (creating if needed) the database file at `path` and ensure the schema exists.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Opened bid store");
        Ok(store)
    }

    /// A private in-memory database. The pool never recycles its one connection.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        use std::str::FromStr;
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        for ddl in [CREATE_BIDS, CREATE_BIDS_CATEGORY_INDEX, CREATE_API_LOGS] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        debug!("Schema ready");
        Ok(())
    }

    /// Insert or replace `bids` keyed by announcement number, in one transaction.
    #[instrument(level = "info", skip_all, fields(count = bids.len()))]
    pub async fn upsert_bids(&self, bids: &[CanonicalBid]) -> Result<UpsertSummary, sqlx::Error> {
        let mut summary = UpsertSummary::default();
        let mut tx = self.pool.begin().await?;

        for bid in bids {
            let existing: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM bids WHERE bid_number = ?")
                    .bind(&bid.announcement_id)
                    .fetch_one(&mut *tx)
                    .await?;

            let query = CanonicalField::ALL
                .iter()
                .fold(sqlx::query(UPSERT_BID.as_str()), |q, f| {
                    q.bind(bid.value(*f).into_owned())
                });
            query.execute(&mut *tx).await?;

            if existing > 0 {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;
        info!(inserted = summary.inserted, updated = summary.updated, "Upserted bids");
        Ok(summary)
    }

    /// Append the source calls of a run to `api_logs`.
    #[instrument(level = "info", skip_all, fields(count = calls.len()))]
    pub async fn log_api_calls(&self, calls: &[ApiCall]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for call in calls {
            sqlx::query(
                "INSERT INTO api_logs (api_source, category, endpoint, status_code, record_count, error_message, called_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&call.source)
            .bind(call.category.slug())
            .bind(&call.endpoint)
            .bind(call.status.map(i64::from))
            .bind(call.records as i64)
            .bind(call.error.as_deref())
            .bind(call.at.format(COLLECTED_AT_FORMAT).to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn statistics(&self) -> Result<StoreStatistics, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bids")
            .fetch_one(&self.pool)
            .await?;
        let by_category = self.grouped_count("category").await?;
        let by_collection_method = self.grouped_count("collection_method").await?;
        let created_today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bids WHERE DATE(created_at) = DATE('now')")
                .fetch_one(&self.pool)
                .await?;
        let api_calls: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStatistics {
            total,
            by_category,
            by_collection_method,
            created_today,
            api_calls,
        })
    }

    async fn grouped_count(&self, column: &str) -> Result<BTreeMap<String, i64>, sqlx::Error> {
        let sql = format!("SELECT {column}, COUNT(*) FROM bids GROUP BY {column}");
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    /// Every stored bid, oldest first.
    pub async fn load_bids(&self) -> Result<Vec<CanonicalBid>, sqlx::Error> {
        let rows: Vec<BidRow> = sqlx::query_as(SELECT_BIDS.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| CanonicalBid::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .collect()
    }
}
