//! Hashing, time helpers, and input validation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::error::{AttestError, Result};

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Today's UTC calendar date as `YYYY-MM-DD`.
pub fn today_utc_date() -> String {
    OffsetDateTime::now_utc()
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_string())
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Report numbers: starts with alphanumeric, then up to 63 more
/// alphanumeric / hyphen / dot / underscore characters.
static REPORT_NO_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_.]{0,63}$").unwrap()
});

/// Validate a report number format.
pub fn validate_report_no(report_no: &str) -> Result<()> {
    if report_no.is_empty() {
        return Err(AttestError::Validation(
            "report number must not be empty".into(),
        ));
    }
    if !REPORT_NO_RE.is_match(report_no) {
        return Err(AttestError::Validation(format!(
            "invalid report number '{report_no}': 1-64 chars, alphanumeric/hyphen/dot/underscore"
        )));
    }
    Ok(())
}

/// Validate an ISO-8601 calendar date (`YYYY-MM-DD`).
pub fn validate_iso_date(date: &str) -> Result<()> {
    if date.len() != 10 {
        return Err(AttestError::Validation(format!(
            "invalid date '{date}': expected YYYY-MM-DD"
        )));
    }
    Date::parse(date, format_description!("[year]-[month]-[day]"))
        .map(|_| ())
        .map_err(|e| AttestError::Validation(format!("invalid date '{date}': {e}")))
}

/// Validate that a path is not empty and does not contain null bytes.
pub fn validate_path(p: &Path, label: &str) -> Result<()> {
    let s = p.to_string_lossy();
    if s.is_empty() {
        return Err(AttestError::Validation(format!("{label} path is empty")));
    }
    if s.contains('\0') {
        return Err(AttestError::Validation(format!(
            "{label} path contains null byte"
        )));
    }
    Ok(())
}

/// Canonicalize a path if it exists, otherwise return it unchanged.
pub fn canonicalize_if_exists(p: &Path, label: &str) -> Result<PathBuf> {
    validate_path(p, label)?;
    if p.exists() {
        std::fs::canonicalize(p).map_err(|e| {
            AttestError::Validation(format!("{label} path invalid: {e}"))
        })
    } else {
        Ok(p.to_path_buf())
    }
}

/// Maximum number of shipment rows accepted from a single input file.
pub const MAX_CSV_ROWS: usize = 10_000;

// ---------------------------------------------------------------------------
// Version constants (set by build.rs)
// ---------------------------------------------------------------------------

pub const GIT_HASH: &str = env!("CO2ATTEST_GIT_HASH");
pub const BUILD_TS: &str = env!("CO2ATTEST_BUILD_TS");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-line version string for display.
pub fn version_string() -> String {
    format!("co2attest v{VERSION} (git {GIT_HASH}, built {BUILD_TS})")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
