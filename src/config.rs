//! Runtime configuration.
//!
//! A [`CollectorConfig`] is built once in `main` from an optional YAML file
//! and the command line, then handed by value to the components that need
//! it. Every field has a serde default, so a config file only has to name
//! what it changes:
//!
//! ```yaml
//! search_days: 14
//! categories: [service, construction]
//! api:
//!   schema: legacy
//!   format: json
//!   max_pages: 3
//! ```

use crate::cli::Cli;
use crate::errors::ConfigError;
use crate::models::SourceCategory;
use crate::pipeline::FieldMap;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

pub const OFFICIAL_BASE_URL: &str = "https://apis.data.go.kr/1230000/ad/BidPublicInfoService";
pub const LEGACY_BASE_URL: &str = "http://apis.data.go.kr/1230000/BidPublicInfoService01";
pub const DETAIL_URL_BASE: &str = "https://www.g2b.go.kr/pt/menu/selectSubFrame.do?bidNtceNo=";

/// Which generation of BidPublicInfoService the adapter talks to.
///
/// The schema decides the inquiry date format and the field map; both
/// services publish the same announcements under different field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApiSchema {
    #[default]
    Official,
    Legacy,
}

impl ApiSchema {
    /// chrono format for `inqryBgnDt` / `inqryEndDt`.
    pub fn inquiry_date_format(self) -> &'static str {
        match self {
            ApiSchema::Official => "%Y%m%d%H%M",
            ApiSchema::Legacy => "%Y%m%d",
        }
    }

    pub fn field_map(self) -> &'static FieldMap {
        match self {
            ApiSchema::Official => FieldMap::official(),
            ApiSchema::Legacy => FieldMap::legacy(),
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ApiSchema::Official => OFFICIAL_BASE_URL,
            ApiSchema::Legacy => LEGACY_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Xml,
    Json,
}

impl ResponseFormat {
    /// Value of the `type` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            ResponseFormat::Xml => "xml",
            ResponseFormat::Json => "json",
        }
    }
}

/// What a run hands downstream when no category produced a usable record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Emit the fixed demo dataset so downstream consumers always get rows.
    #[default]
    DemoData,
    /// Emit nothing.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Overrides the schema's default service URL.
    pub base_url: Option<String>,
    /// data.go.kr service key, either raw or URL-encoded.
    pub service_key: Option<String>,
    pub schema: ApiSchema,
    pub format: ResponseFormat,
    pub rows_per_page: u32,
    pub max_pages: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            service_key: None,
            schema: ApiSchema::default(),
            format: ResponseFormat::default(),
            rows_per_page: 100,
            max_pages: 1,
            timeout_secs: 30,
            user_agent: concat!("bid_collector/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.schema.default_base_url())
    }
}

/// Longest accepted inquiry window, in days.
pub const MAX_SEARCH_DAYS: i64 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub api: ApiConfig,
    /// Size of the inquiry window, ending now.
    pub search_days: i64,
    pub categories: Vec<SourceCategory>,
    pub detail_url_base: String,
    pub output_dir: PathBuf,
    /// SQLite file to upsert into; no durable store when unset.
    pub database: Option<PathBuf>,
    pub empty_result_policy: EmptyResultPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            search_days: 7,
            categories: SourceCategory::ALL.to_vec(),
            detail_url_base: DETAIL_URL_BASE.to_string(),
            output_dir: PathBuf::from("output"),
            database: None,
            empty_result_policy: EmptyResultPolicy::default(),
        }
    }
}

impl CollectorConfig {
    /// Load from a YAML file, or return defaults when `path` is `None`.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).await?;
        let config = Self::from_yaml(&text)?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(text)?;
        config.categories = ordered_categories(&config.categories);
        config.validate()?;
        Ok(config)
    }

    /// `search_days` must lie in `1..=MAX_SEARCH_DAYS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SEARCH_DAYS).contains(&self.search_days) {
            return Err(ConfigError::SearchDays {
                days: self.search_days,
                max: MAX_SEARCH_DAYS,
            });
        }
        Ok(())
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.output_dir {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(key) = &cli.service_key {
            self.api.service_key = Some(key.clone());
        }
        if let Some(days) = cli.days {
            self.search_days = days;
        }
        if let Some(db) = &cli.database {
            self.database = Some(PathBuf::from(db));
        }
        if !cli.category.is_empty() {
            self.categories = ordered_categories(&cli.category);
        }
        if let Some(schema) = cli.schema {
            self.api.schema = schema;
        }
        if let Some(format) = cli.format {
            self.api.format = format;
        }
        if let Some(pages) = cli.max_pages {
            self.api.max_pages = pages;
        }
        if cli.no_demo_fallback {
            self.empty_result_policy = EmptyResultPolicy::Empty;
        }
    }
}

/// Deduplicate and sort into the fixed processing order, whatever order the user gave.
fn ordered_categories(requested: &[SourceCategory]) -> Vec<SourceCategory> {
    SourceCategory::ALL
        .into_iter()
        .filter(|c| requested.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_match_reference_behaviour() {
        let config = CollectorConfig::default();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.rows_per_page, 100);
        assert_eq!(config.search_days, 7);
        assert_eq!(config.categories, SourceCategory::ALL.to_vec());
        assert_eq!(config.api.base_url(), OFFICIAL_BASE_URL);
        assert_eq!(config.empty_result_policy, EmptyResultPolicy::DemoData);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "search_days: 14\ncategories: [construction, goods]\napi:\n  schema: legacy\n  format: json\n";
        let config = CollectorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.search_days, 14);
        assert_eq!(
            config.categories,
            vec![SourceCategory::Goods, SourceCategory::Construction]
        );
        assert_eq!(config.api.schema, ApiSchema::Legacy);
        assert_eq!(config.api.format, ResponseFormat::Json);
        assert_eq!(config.api.base_url(), LEGACY_BASE_URL);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_search_days_out_of_range_is_rejected() {
        for yaml in ["search_days: 0\n", "search_days: -7\n", "search_days: 99999\n"] {
            let err = CollectorConfig::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, ConfigError::SearchDays { max: MAX_SEARCH_DAYS, .. }), "{yaml}");
        }
        let config = CollectorConfig::from_yaml("search_days: 3650\n").unwrap();
        assert_eq!(config.search_days, MAX_SEARCH_DAYS);
        assert!(matches!(
            CollectorConfig::from_yaml("search_days: [1]\n").unwrap_err(),
            ConfigError::Yaml(_)
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = CollectorConfig::from_yaml("search_days: 14\n").unwrap();
        let cli = Cli::parse_from([
            "bid_collector",
            "-o",
            "/tmp/bids",
            "--days",
            "3",
            "--category",
            "foreign",
            "--category",
            "service",
            "--no-demo-fallback",
        ]);
        config.apply_cli(&cli);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/bids"));
        assert_eq!(config.search_days, 3);
        assert_eq!(
            config.categories,
            vec![SourceCategory::Service, SourceCategory::Foreign]
        );
        assert_eq!(config.empty_result_policy, EmptyResultPolicy::Empty);
    }

    #[test]
    fn test_schema_date_formats() {
        assert_eq!(ApiSchema::Official.inquiry_date_format(), "%Y%m%d%H%M");
        assert_eq!(ApiSchema::Legacy.inquiry_date_format(), "%Y%m%d");
    }
}
