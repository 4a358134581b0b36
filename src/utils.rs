//! Utility functions for logging, credentials, and file system checks.
//!
//! - String truncation for quoting response bodies in logs
//! - Service-key decoding for keys copied in URL-encoded form
//! - File system validation for output directories

use std::borrow::Cow;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary at or below `max`
/// bytes, with an ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Decode a service key that was copied in its URL-encoded form.
///
/// data.go.kr shows every key twice, raw and percent-encoded. The HTTP client
/// encodes query parameters itself, so an already-encoded key would be encoded
/// twice and rejected. Keys without `%` escapes are returned unchanged.
pub fn decode_service_key(key: &str) -> Cow<'_, str> {
    let key = key.trim();
    if !key.contains('%') {
        return Cow::Borrowed(key);
    }
    match urlencoding::decode(key) {
        Ok(decoded) => {
            debug!("Decoded URL-encoded service key");
            decoded
        }
        Err(_) => Cow::Borrowed(key),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
