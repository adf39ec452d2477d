//! Report bundle handoff for rendering.
//!
//! A bundle is a directory holding the exact signed bytes plus a manifest
//! with the human-facing figures and the public verification URL.  Layout
//! and typography are left to whatever renders the bundle.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::calc::{ProcessedRow, RejectedRow};
use crate::canonical::PAYLOAD_SCHEMA;
use crate::error::{AttestError, Result, ResultExt as _};
use crate::factors::{FACTOR_TABLE_ID, UNCERTAINTY_PCT};
use crate::issue::IssuedReport;
use crate::signing::SignerDescriptor;
use crate::util;

pub const BUNDLE_FORMAT: &str = "co2attest report-bundle v1";

#[derive(Debug, Clone, Serialize)]
pub struct BundleManifest<'a> {
    pub format: &'static str,
    pub generated_at_utc: String,
    pub payload_schema: &'static str,
    pub report_no: &'a str,
    pub company: &'a str,
    pub date: &'a str,
    pub factor_table: &'static str,
    pub uncertainty_pct: f64,
    pub total_tco2e: f64,
    pub rows: &'a [ProcessedRow],
    pub rejected: &'a [RejectedRow],
    pub signer: &'a SignerDescriptor,
    pub signer_name: Option<&'a str>,
    pub signer_position: &'a str,
    pub payload_sha256: String,
    pub verify_url: String,
}

/// Public URL at which `report_no` can be verified.
pub fn verify_url(base: &str, report_no: &str) -> String {
    format!("{}/verify/{report_no}", base.trim_end_matches('/'))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .map_err(|e| AttestError::Report(format!("write {}: {e}", path.display())))
}

/// Write `out_dir/<report_no>/{manifest.json,payload.json,signature.hex}`
/// and return the bundle directory.
///
/// `payload.json` holds the canonical payload byte for byte; it is never
/// pretty-printed.
pub fn write_report_bundle(
    out_dir: &Path,
    issued: &IssuedReport,
    verify_base_url: &str,
) -> Result<PathBuf> {
    let report = &issued.report;
    let dir = out_dir.join(report.report_no());
    std::fs::create_dir_all(&dir)
        .map_err(|e| AttestError::Report(format!("create out dir {}: {e}", dir.display())))?;

    let payload = issued.signed.payload();
    let manifest = BundleManifest {
        format: BUNDLE_FORMAT,
        generated_at_utc: util::now_utc_rfc3339(),
        payload_schema: PAYLOAD_SCHEMA,
        report_no: report.report_no(),
        company: report.company(),
        date: report.date(),
        factor_table: FACTOR_TABLE_ID,
        uncertainty_pct: UNCERTAINTY_PCT,
        total_tco2e: report.total_tco2e(),
        rows: report.rows(),
        rejected: &issued.rejected,
        signer: &issued.signer,
        signer_name: issued.signer_name.as_deref(),
        signer_position: &issued.signer_position,
        payload_sha256: util::sha256_hex(payload.as_bytes()),
        verify_url: verify_url(verify_base_url, report.report_no()),
    };

    let manifest_json = serde_json::to_vec_pretty(&manifest).ctx_report("serialize manifest")?;
    write_file(&dir.join("manifest.json"), &manifest_json)?;
    write_file(&dir.join("payload.json"), payload.as_bytes())?;
    write_file(
        &dir.join("signature.hex"),
        issued.signed.signature_hex().as_bytes(),
    )?;

    Ok(dir)
}
