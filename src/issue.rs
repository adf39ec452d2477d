//! End-to-end issuing: shipments in, signed and stored report out.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calc::{self, RejectedRow, ShipmentRow};
use crate::error::Result;
use crate::report::{Report, ReportMeta, SignedReport};
use crate::signing::{Signer, SignerDescriptor};
use crate::store::ReportStore;

/// Position printed next to the signer when the request names none.
pub const DEFAULT_SIGNER_POSITION: &str = "Environmental Manager";

/// Everything needed to issue one report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub company: String,
    #[serde(default)]
    pub report_no: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Billing account whose usage counter is bumped on success.
    #[serde(default)]
    pub account: Option<String>,
    /// Person attesting the report; carried into the bundle, not the payload.
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default)]
    pub signer_position: Option<String>,
    pub rows: Vec<ShipmentRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum StorageStatus {
    Stored,
    Failed(String),
}

impl StorageStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, StorageStatus::Stored)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedReport {
    pub report: Report,
    pub signed: SignedReport,
    pub rejected: Vec<RejectedRow>,
    pub storage: StorageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u64>,
    pub signer: SignerDescriptor,
    pub signer_name: Option<String>,
    pub signer_position: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Calculate, canonicalize, sign and store.
///
/// Validation, canonicalization and signing failures abort.  A storage
/// failure does not: the signed report is still returned, with
/// [`StorageStatus::Failed`], and the usage counter is left alone.
pub fn issue_report(
    req: IssueRequest,
    signer: &dyn Signer,
    store: &dyn ReportStore,
) -> Result<IssuedReport> {
    let signer_name = non_blank(req.signer_name);
    let signer_position =
        non_blank(req.signer_position).unwrap_or_else(|| DEFAULT_SIGNER_POSITION.to_string());
    let calculation = calc::calculate(&req.rows);
    let rejected = calculation.rejected.clone();

    let report = Report::from_meta(
        ReportMeta {
            company: req.company,
            report_no: req.report_no,
            date: req.date,
        },
        calculation,
    )?;
    let payload = report.canonicalize()?;
    let signed = SignedReport::sign(payload, signer)?;

    let storage = match store.put_signed(&signed) {
        Ok(_) => StorageStatus::Stored,
        Err(e) => {
            warn!(report_no = signed.report_no(), error = %e, "report signed but not stored");
            StorageStatus::Failed(e.to_string())
        }
    };

    let usage_count = match (&storage, req.account.as_deref()) {
        (StorageStatus::Stored, Some(account)) => match store.increment_usage(account) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(account, error = %e, "usage counter not updated");
                None
            }
        },
        _ => None,
    };

    info!(
        report_no = signed.report_no(),
        rows = report.rows().len(),
        rejected = rejected.len(),
        total_tco2e = report.total_tco2e(),
        stored = storage.is_stored(),
        "report issued"
    );

    Ok(IssuedReport {
        report,
        signed,
        rejected,
        storage,
        usage_count,
        signer: signer.descriptor().clone(),
        signer_name,
        signer_position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttestError;
    use crate::signing::{generate_rsa_pem, RsaPemSigner};
    use crate::store::{MemoryReportStore, StoredReport};
    use crate::verify;
    use std::sync::LazyLock;

    static SIGNER: LazyLock<RsaPemSigner> = LazyLock::new(|| {
        let (private_pem, _) = generate_rsa_pem(2048).unwrap();
        RsaPemSigner::from_pem(&private_pem).unwrap()
    });

    fn request(report_no: &str) -> IssueRequest {
        IssueRequest {
            company: "ACME GmbH".into(),
            report_no: Some(report_no.into()),
            date: Some("2026-10-18".into()),
            account: Some("Ops@Acme".into()),
            signer_name: None,
            signer_position: None,
            rows: vec![
                ShipmentRow::new("Widget", 2.0, 500.0, 100.0, Some("Air")),
                ShipmentRow::new("Broken", f64::NAN, 1.0, 1.0, None),
            ],
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore;

    impl ReportStore for ReadOnlyStore {
        fn put(&self, _: &str, _: &str, _: &str) -> Result<StoredReport> {
            Err(AttestError::Persistence("disk full".into()))
        }
        fn get(&self, _: &str) -> Result<Option<StoredReport>> {
            Ok(None)
        }
        fn increment_usage(&self, _: &str) -> Result<u64> {
            panic!("usage must not be counted for unstored reports")
        }
    }

    #[test]
    fn issued_report_is_stored_and_verifiable() {
        let store = MemoryReportStore::new();
        let issued = issue_report(request("R-ISSUE-1"), &*SIGNER, &store).unwrap();
        assert_eq!(issued.storage, StorageStatus::Stored);
        assert_eq!(issued.rejected.len(), 1);
        assert_eq!(issued.usage_count, Some(1));
        assert!((issued.report.total_tco2e() - 0.0927).abs() < 1e-12);

        let key = SIGNER.public_key().unwrap();
        let verdict = verify::verify_stored(&store, "R-ISSUE-1", &key).unwrap();
        assert!(verdict.valid);
    }

    #[test]
    fn duplicate_number_is_reported_not_overwritten() {
        let store = MemoryReportStore::new();
        let first = issue_report(request("R-DUP"), &*SIGNER, &store).unwrap();
        let mut again = request("R-DUP");
        again.company = "Other Co".into();
        let second = issue_report(again, &*SIGNER, &store).unwrap();
        assert!(matches!(second.storage, StorageStatus::Failed(_)));
        assert_eq!(second.usage_count, None);
        let kept = store.fetch("R-DUP").unwrap();
        assert_eq!(kept.payload, first.signed.payload().as_str());
    }

    #[test]
    fn storage_failure_keeps_signature() {
        let issued = issue_report(request("R-RO"), &*SIGNER, &ReadOnlyStore).unwrap();
        assert_eq!(
            issued.storage,
            StorageStatus::Failed("persistence: disk full".into())
        );
        let key = SIGNER.public_key().unwrap();
        let v = verify::verify(
            "R-RO",
            issued.signed.payload().as_bytes(),
            issued.signed.signature_hex(),
            &key,
        );
        assert!(v.valid);
    }

    #[test]
    fn signer_identity_defaults_and_trims() {
        let store = MemoryReportStore::new();
        let plain = issue_report(request("R-SIG-1"), &*SIGNER, &store).unwrap();
        assert_eq!(plain.signer_name, None);
        assert_eq!(plain.signer_position, DEFAULT_SIGNER_POSITION);

        let mut named = request("R-SIG-2");
        named.signer_name = Some("  Dana Weber ".into());
        named.signer_position = Some("   ".into());
        let named = issue_report(named, &*SIGNER, &store).unwrap();
        assert_eq!(named.signer_name.as_deref(), Some("Dana Weber"));
        assert_eq!(named.signer_position, DEFAULT_SIGNER_POSITION);
        assert!(!named.signed.payload().as_str().contains("Dana"));
    }

    #[test]
    fn invalid_header_aborts_before_signing() {
        let store = MemoryReportStore::new();
        let mut req = request("R-BAD");
        req.company = "   ".into();
        assert!(issue_report(req, &*SIGNER, &store).is_err());
        assert!(store.is_empty());
    }
}
