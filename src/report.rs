//! Report model and its lifecycle types.
//!
//! A report moves through `Report` (computed, in memory) →
//! [`CanonicalPayload`] (deterministic bytes) → [`SignedReport`] (detached
//! signature attached) → stored.  Each step consumes or borrows the previous
//! one; none of them can be edited afterwards.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calc::{Calculation, ProcessedRow};
use crate::canonical::{self, CanonicalPayload};
use crate::error::{AttestError, Result};
use crate::signing::{self, Signer};
use crate::util;

/// Longest accepted company name, in characters.
pub const MAX_COMPANY_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Report metadata
// ---------------------------------------------------------------------------

/// Caller-supplied report header.  Missing numbers and dates are generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMeta {
    pub company: String,
    #[serde(default)]
    pub report_no: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Generate a fresh report number of the form `R<yyyymmdd>-<8 hex>`.
pub fn generate_report_no() -> String {
    let date = util::today_utc_date().replace('-', "");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("R{date}-{}", &suffix[..8])
}

fn validate_company(company: &str) -> Result<()> {
    if company.trim().is_empty() {
        return Err(AttestError::Validation("company must not be empty".into()));
    }
    if company.chars().count() > MAX_COMPANY_LEN {
        return Err(AttestError::Validation(format!(
            "company name exceeds {MAX_COMPANY_LEN} characters"
        )));
    }
    if company.chars().any(char::is_control) {
        return Err(AttestError::Validation(
            "company name contains control characters".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Report (computed state)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    report_no: String,
    company: String,
    date: String,
    rows: Vec<ProcessedRow>,
    total_tco2e: f64,
}

impl Report {
    pub fn new(
        report_no: impl Into<String>,
        company: impl Into<String>,
        date: impl Into<String>,
        calculation: Calculation,
    ) -> Result<Self> {
        let report_no = report_no.into();
        let company = company.into();
        let date = date.into();
        util::validate_report_no(&report_no)?;
        validate_company(&company)?;
        util::validate_iso_date(&date)?;

        Ok(Self {
            report_no,
            company,
            date,
            rows: calculation.rows,
            total_tco2e: calculation.total_tco2e,
        })
    }

    /// Build a report, generating the report number and date when absent.
    pub fn from_meta(meta: ReportMeta, calculation: Calculation) -> Result<Self> {
        let report_no = meta.report_no.unwrap_or_else(generate_report_no);
        let date = meta.date.unwrap_or_else(util::today_utc_date);
        Self::new(report_no, meta.company, date, calculation)
    }

    pub fn report_no(&self) -> &str {
        &self.report_no
    }
    pub fn company(&self) -> &str {
        &self.company
    }
    pub fn date(&self) -> &str {
        &self.date
    }
    pub fn rows(&self) -> &[ProcessedRow] {
        &self.rows
    }
    pub fn total_tco2e(&self) -> f64 {
        self.total_tco2e
    }

    pub fn canonicalize(&self) -> Result<CanonicalPayload> {
        canonical::canonicalize(self)
    }
}

// ---------------------------------------------------------------------------
// Signed report
// ---------------------------------------------------------------------------

/// A canonical payload together with its detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedReport {
    report_no: String,
    payload: CanonicalPayload,
    signature_hex: String,
}

impl SignedReport {
    /// Sign a canonical payload.  The payload is moved in, so the same
    /// payload value cannot be signed twice.
    pub fn sign(payload: CanonicalPayload, signer: &dyn Signer) -> Result<Self> {
        let signature_hex = signing::sign_hex(signer, payload.as_bytes())?;
        Ok(Self {
            report_no: payload.report_no().to_string(),
            payload,
            signature_hex,
        })
    }

    pub fn report_no(&self) -> &str {
        &self.report_no
    }
    pub fn payload(&self) -> &CanonicalPayload {
        &self.payload
    }
    pub fn signature_hex(&self) -> &str {
        &self.signature_hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{calculate, ShipmentRow};

    fn calc() -> Calculation {
        calculate(&[ShipmentRow::new("Widget", 2.0, 500.0, 100.0, Some("Air"))])
    }

    #[test]
    fn generated_numbers_are_valid_and_distinct() {
        let a = generate_report_no();
        let b = generate_report_no();
        assert!(util::validate_report_no(&a).is_ok(), "{a}");
        assert_ne!(a, b);
        assert!(a.starts_with('R'));
    }

    #[test]
    fn meta_defaults_are_filled() {
        let report = Report::from_meta(
            ReportMeta {
                company: "ACME GmbH".into(),
                ..Default::default()
            },
            calc(),
        )
        .unwrap();
        assert!(util::validate_iso_date(report.date()).is_ok());
        assert_eq!(report.rows().len(), 1);
    }

    #[test]
    fn bad_header_fields_rejected() {
        assert!(Report::new("R1", "", "2026-10-18", calc()).is_err());
        assert!(Report::new("R1", "ACME", "2026-13-01", calc()).is_err());
        assert!(Report::new("R 1", "ACME", "2026-10-18", calc()).is_err());
        assert!(Report::new("R1", "AC\u{0007}ME", "2026-10-18", calc()).is_err());
    }
}
