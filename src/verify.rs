//! Report verification.
//!
//! Verification is total: every call produces a [`Verdict`] that is exactly
//! one of valid, invalid, or not found.  Only a failing store lookup is an
//! error, and it is never reported as "invalid".

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::canonical;
use crate::error::{AttestError, Result};
use crate::signing::PublicKeyMaterial;
use crate::store::ReportStore;

pub const MSG_VALID: &str = "Signature is valid.";
pub const MSG_INVALID: &str = "Signature INVALID!";
pub const MSG_NOT_FOUND: &str = "Report not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Valid,
    Invalid,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub status: VerificationStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            status: VerificationStatus::Valid,
            message: MSG_VALID.to_string(),
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            status: VerificationStatus::Invalid,
            message: MSG_INVALID.to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            valid: false,
            status: VerificationStatus::NotFound,
            message: MSG_NOT_FOUND.to_string(),
            reason: None,
        }
    }
}

/// Check `signature_hex` against the exact `payload` bytes.
pub fn verify_signature(payload: &[u8], signature_hex: &str, key: &PublicKeyMaterial) -> Verdict {
    let sig = match hex::decode(signature_hex) {
        Ok(sig) if !sig.is_empty() => sig,
        Ok(_) => return Verdict::invalid("empty signature"),
        Err(e) => return Verdict::invalid(format!("malformed signature hex: {e}")),
    };
    if key.verify(payload, &sig) {
        Verdict::valid()
    } else {
        Verdict::invalid("signature does not match payload")
    }
}

/// Verify a fetched `(payload, signature)` pair claimed to belong to
/// `report_no`.
///
/// A cryptographically valid pair is still rejected when the payload is a
/// canonical payload issued for a different report number.
pub fn verify(
    report_no: &str,
    payload: &[u8],
    signature_hex: &str,
    key: &PublicKeyMaterial,
) -> Verdict {
    let verdict = verify_signature(payload, signature_hex, key);
    if !verdict.valid {
        warn!(report_no, reason = ?verdict.reason, "signature verification failed");
        return verdict;
    }
    if let Some(header) = canonical::parse_header(payload) {
        if header.report_no != report_no {
            warn!(report_no, payload_report_no = %header.report_no, "payload bound to another report");
            return Verdict::invalid(format!(
                "payload was issued for report {}",
                header.report_no
            ));
        }
    }
    info!(report_no, key_id = key.key_id(), "signature verified");
    verdict
}

/// Look `report_no` up in `store` and verify what is there.
pub fn verify_stored(
    store: &dyn ReportStore,
    report_no: &str,
    key: &PublicKeyMaterial,
) -> Result<Verdict> {
    match store.fetch(report_no) {
        Ok(record) => Ok(verify(
            report_no,
            record.payload.as_bytes(),
            &record.signature_hex,
            key,
        )),
        Err(AttestError::NotFound(_)) => {
            info!(report_no, "verification requested for unknown report");
            Ok(Verdict::not_found())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{generate_rsa_pem, sign_hex, RsaPemSigner};
    use crate::store::MemoryReportStore;
    use std::sync::LazyLock;

    static SIGNER: LazyLock<RsaPemSigner> = LazyLock::new(|| {
        let (private_pem, _) = generate_rsa_pem(2048).unwrap();
        RsaPemSigner::from_pem(&private_pem).unwrap()
    });

    #[test]
    fn valid_pair_verifies() {
        let key = SIGNER.public_key().unwrap();
        let sig = sign_hex(&*SIGNER, b"hello").unwrap();
        let v = verify("R1", b"hello", &sig, &key);
        assert!(v.valid);
        assert_eq!(v.status, VerificationStatus::Valid);
        assert_eq!(v.message, MSG_VALID);
    }

    #[test]
    fn malformed_hex_is_invalid_not_error() {
        let key = SIGNER.public_key().unwrap();
        for bad in ["zz", "abc", ""] {
            let v = verify_signature(b"hello", bad, &key);
            assert!(!v.valid);
            assert_eq!(v.status, VerificationStatus::Invalid);
        }
    }

    #[test]
    fn uppercase_hex_of_a_good_signature_still_verifies() {
        let key = SIGNER.public_key().unwrap();
        let sig = sign_hex(&*SIGNER, b"hello").unwrap().to_uppercase();
        assert!(verify_signature(b"hello", &sig, &key).valid);
    }

    #[test]
    fn swapped_report_number_is_invalid() {
        let key = SIGNER.public_key().unwrap();
        let payload = br#"{"schema":"co2attest.payload.v1","report_no":"R-A"}"#;
        let sig = sign_hex(&*SIGNER, payload).unwrap();
        assert!(verify("R-A", payload, &sig, &key).valid);
        let v = verify("R-B", payload, &sig, &key);
        assert!(!v.valid);
        assert!(v.reason.unwrap().contains("R-A"));
    }

    #[test]
    fn unknown_report_is_not_found() {
        let key = SIGNER.public_key().unwrap();
        let store = MemoryReportStore::new();
        let v = verify_stored(&store, "R-404", &key).unwrap();
        assert_eq!(v, Verdict::not_found());
        assert!(!v.valid);
    }

    #[test]
    fn tampered_stored_payload_is_invalid() {
        let key = SIGNER.public_key().unwrap();
        let store = MemoryReportStore::new();
        let sig = sign_hex(&*SIGNER, b"original").unwrap();
        store.put("R1", "originaL", &sig).unwrap();
        let v = verify_stored(&store, "R1", &key).unwrap();
        assert_eq!(v.status, VerificationStatus::Invalid);
    }
}
