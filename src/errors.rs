use std::fmt;

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failure of one source adapter call. Recoverable at category granularity:
/// the collection run logs it and moves on to the next category.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} from {endpoint}: {preview}")]
    HttpStatus {
        status: StatusCode,
        endpoint: String,
        preview: String,
    },
    #[error("malformed response: {0}")]
    ResponseFormat(String),
    #[error("source rejected the request ({code}): {message}")]
    Declared { code: String, message: String },
    #[error("no service key configured")]
    MissingServiceKey,
}

/// Rejected configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("search_days must be between 1 and {max}, got {days}")]
    SearchDays { days: i64, max: i64 },
}

/// Coarse classification of a [`SourceError`], surfaced in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceErrorKind {
    TransportError,
    ResponseFormatError,
    DeclaredSourceError,
}

impl SourceError {
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            SourceError::Transport(_) | SourceError::HttpStatus { .. } => {
                SourceErrorKind::TransportError
            }
            SourceError::ResponseFormat(_) => SourceErrorKind::ResponseFormatError,
            SourceError::Declared { .. } | SourceError::MissingServiceKey => {
                SourceErrorKind::DeclaredSourceError
            }
        }
    }

    /// HTTP status associated with the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Transport(e) => e.status().map(|s| s.as_u16()),
            SourceError::HttpStatus { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::ResponseFormat(format!("invalid JSON: {e}"))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(e: quick_xml::Error) -> Self {
        SourceError::ResponseFormat(format!("invalid XML: {e}"))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(e: quick_xml::DeError) -> Self {
        SourceError::ResponseFormat(format!("invalid XML: {e}"))
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceErrorKind::TransportError => "transport",
            SourceErrorKind::ResponseFormatError => "response-format",
            SourceErrorKind::DeclaredSourceError => "declared",
        };
        f.write_str(s)
    }
}

/// A single raw item that could not become a canonical record.
/// Recoverable at item granularity: the item is skipped, the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemParseError {
    #[error("item {index} has no announcement number")]
    MissingAnnouncementId { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let declared = SourceError::Declared {
            code: "30".into(),
            message: "SERVICE_KEY_IS_NOT_REGISTERED_ERROR".into(),
        };
        assert_eq!(declared.kind(), SourceErrorKind::DeclaredSourceError);
        assert_eq!(
            SourceError::ResponseFormat("x".into()).kind(),
            SourceErrorKind::ResponseFormatError
        );
        let http = SourceError::HttpStatus {
            status: StatusCode::BAD_GATEWAY,
            endpoint: "https://example.invalid/op".into(),
            preview: String::new(),
        };
        assert_eq!(http.kind(), SourceErrorKind::TransportError);
        assert_eq!(http.status(), Some(502));
        assert_eq!(SourceError::MissingServiceKey.status(), None);
    }

    #[test]
    fn test_declared_message_is_surfaced() {
        let e = SourceError::Declared {
            code: "03".into(),
            message: "NODATA_ERROR".into(),
        };
        assert_eq!(e.to_string(), "source rejected the request (03): NODATA_ERROR");
    }

    #[test]
    fn test_json_error_maps_to_response_format() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: SourceError = err.into();
        assert_eq!(e.kind(), SourceErrorKind::ResponseFormatError);
    }
}
